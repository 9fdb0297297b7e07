//! shopcheck E2E test framework
//!
//! This crate runs the storefront and API test suite from Rust:
//! - Parses declarative YAML test specs
//! - Drives Playwright (Node) with one generated script per test
//! - Runs HTTP request steps natively
//! - Retries, parallel workers and per-test timeouts
//! - Attaches failure help from `shopcheck-triage` to every failed attempt
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    E2E Test Runner (Rust)                   │
//! ├─────────────────────────────────────────────────────────────┤
//! │  TestRunner                                                 │
//! │    ├── select(specs, filter)   only / tag / name            │
//! │    ├── run_specs(specs)        JoinSet + Semaphore(workers) │
//! │    │     └── run_spec(spec)    attempts 0..=retries         │
//! │    │           ├── PlaywrightHandle::run   browser steps    │
//! │    │           ├── ApiClient::run          request steps    │
//! │    │           └── on failure: artifacts + failure help     │
//! │    └── write_results()         JSON + JUnit                 │
//! ├─────────────────────────────────────────────────────────────┤
//! │  SpecFile (YAML)                                            │
//! │    ├── suite, tags                                          │
//! │    └── tests: [TestSpec]                                    │
//! │          ├── name, tags, only, skip, viewport               │
//! │          └── steps: [TestStep]                              │
//! │                ├── navigate / click / fill / press / ...    │
//! │                ├── assert { locator, visible?, text? }      │
//! │                └── request { method, path, expect }         │
//! └─────────────────────────────────────────────────────────────┘
//! ```

pub mod api;
pub mod config;
pub mod error;
pub mod playwright;
pub mod report;
pub mod runner;
pub mod spec;

pub use config::SuiteConfig;
pub use error::{E2eError, E2eResult};
pub use runner::{RunFilter, TestRunner, TestStatus, TestSuiteResult};
pub use spec::{SpecFile, TestSpec, TestStep};
