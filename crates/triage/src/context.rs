//! Description of a single failed test

use serde::{Deserialize, Serialize};

/// Substituted when a failure carries no usable message.
pub const NO_ERROR_MESSAGE: &str = "No error message captured";

/// Everything the provider knows about one failed test.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailureContext {
    /// Logical section the test belongs to
    pub suite: String,

    /// The test's description
    pub test_title: String,

    /// Originating spec file, for display only
    pub file: String,

    /// Captured failure message, never empty
    pub error_message: String,

    /// Captured stack trace, if any
    pub stack: Option<String>,
}

impl FailureContext {
    /// Build a context, substituting [`NO_ERROR_MESSAGE`] for a missing or
    /// blank error message.
    pub fn new(
        suite: impl Into<String>,
        test_title: impl Into<String>,
        file: impl Into<String>,
        error_message: Option<String>,
        stack: Option<String>,
    ) -> Self {
        let error_message = error_message
            .filter(|m| !m.trim().is_empty())
            .unwrap_or_else(|| NO_ERROR_MESSAGE.to_string());

        Self {
            suite: suite.into(),
            test_title: test_title.into(),
            file: file.into(),
            error_message,
            stack: stack.filter(|s| !s.trim().is_empty()),
        }
    }
}
