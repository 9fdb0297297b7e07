//! Error types for failure triage

use thiserror::Error;

/// Reasons the remote guidance path can fail.
///
/// These never leave [`crate::FailureHelpProvider`]; their display text
/// becomes the reason line of the fallback explanation.
#[derive(Error, Debug)]
pub enum TriageError {
    #[error("{0} credential not set")]
    MissingCredential(String),

    #[error("empty response")]
    EmptyResponse,

    #[error("inference endpoint returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("inference request timed out after {0:?}")]
    Timeout(std::time::Duration),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("malformed response: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("{0}")]
    Client(String),
}

pub type TriageResult<T> = Result<T, TriageError>;
