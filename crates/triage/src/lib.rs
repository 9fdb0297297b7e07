//! shopcheck failure triage
//!
//! Turns a failed test into a short, actionable explanation. The remote path
//! asks an OpenAI-compatible chat-completion endpoint (Groq by default) for
//! guidance; every failure on that path degrades to a deterministic,
//! network-free fallback so triage can never affect a test run's outcome.
//!
//! ```text
//! FailureContext ──► FailureHelpProvider::get_failure_help
//!                      ├── no credential ─────────────► fallback
//!                      ├── build_prompt (bounded)
//!                      ├── ChatCompletion::complete ──► error ─► fallback
//!                      └── first choice, trimmed ─────► empty ─► fallback
//! ```
//!
//! A static [`FailureCategory`] classifier is also provided for labelling
//! failures in reports.

pub mod classify;
pub mod client;
pub mod config;
pub mod context;
pub mod error;
pub mod prompt;
pub mod provider;

pub use classify::{FailureCategory, FailureExplanation};
pub use client::{ChatCompletion, ChatMessage, ChatRequest, ChatResponse, GroqClient};
pub use config::TriageConfig;
pub use context::FailureContext;
pub use error::{TriageError, TriageResult};
pub use provider::FailureHelpProvider;
