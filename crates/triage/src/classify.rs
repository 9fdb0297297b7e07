//! Static failure classification
//!
//! Each category owns exactly one matching rule. Rules are evaluated in
//! [`FailureCategory::PRIORITY`] order and the first match wins;
//! [`FailureCategory::Unclassified`] is the explicit default.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureCategory {
    Timeout,
    Locator,
    Network,
    Assertion,
    Unclassified,
}

/// Canned explanation for a category
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailureExplanation {
    pub category: FailureCategory,
    pub summary: String,
    pub likely_cause: String,
    pub next_action: String,
}

static TIMEOUT_RULE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)timeout|timed out").expect("valid timeout rule"));

static LOCATOR_RULE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)locator|(element|selector|node)s? (was |were )?not found|strict mode violation|no element")
        .expect("valid locator rule")
});

static ASSERTION_RULE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)expect\(|\bto(have|be|contain)\w*|assertion").expect("valid assertion rule")
});

static NETWORK_RULE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)net::err_|econnrefused|econnreset|enotfound|error sending request|connection refused|\bstatus:? 5\d\d\b")
        .expect("valid network rule")
});

impl FailureCategory {
    /// Evaluation order for [`FailureCategory::classify`].
    pub const PRIORITY: [FailureCategory; 4] = [
        FailureCategory::Timeout,
        FailureCategory::Locator,
        FailureCategory::Network,
        FailureCategory::Assertion,
    ];

    fn rule(self) -> Option<&'static Regex> {
        match self {
            FailureCategory::Timeout => Some(&TIMEOUT_RULE),
            FailureCategory::Locator => Some(&LOCATOR_RULE),
            FailureCategory::Assertion => Some(&ASSERTION_RULE),
            FailureCategory::Network => Some(&NETWORK_RULE),
            FailureCategory::Unclassified => None,
        }
    }

    /// Categorise a failure message.
    pub fn classify(message: &str) -> Self {
        Self::PRIORITY
            .into_iter()
            .find(|category| category.rule().is_some_and(|rule| rule.is_match(message)))
            .unwrap_or(FailureCategory::Unclassified)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            FailureCategory::Timeout => "timeout",
            FailureCategory::Locator => "locator",
            FailureCategory::Assertion => "assertion",
            FailureCategory::Network => "network",
            FailureCategory::Unclassified => "unclassified",
        }
    }

    pub fn explanation(self) -> FailureExplanation {
        let (summary, likely_cause, next_action) = match self {
            FailureCategory::Timeout => (
                "Test timed out before completing expected actions.",
                "Slow page load, missing wait condition, or unstable locator.",
                "Validate locators and add a targeted wait for the blocked step.",
            ),
            FailureCategory::Locator => (
                "Element lookup failed.",
                "Selector mismatch or UI changed.",
                "Update the locator to a stable role/text/test-id based selector.",
            ),
            FailureCategory::Assertion => (
                "Assertion did not match.",
                "The page reached a different state than the test expected.",
                "Compare the expected value with the trace snapshot at the failing step.",
            ),
            FailureCategory::Network => (
                "Network request failed.",
                "The site or API was unreachable or returned a server error.",
                "Check the base URL and service status, then re-run.",
            ),
            FailureCategory::Unclassified => (
                "Test failed with an unclassified error.",
                "Unexpected app behavior or environment issue.",
                "Review trace and console logs, then isolate the first failing action.",
            ),
        };

        FailureExplanation {
            category: self,
            summary: summary.to_string(),
            likely_cause: likely_cause.to_string(),
            next_action: next_action.to_string(),
        }
    }
}

impl fmt::Display for FailureCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FailureExplanation {
    pub fn for_message(message: &str) -> Self {
        FailureCategory::classify(message).explanation()
    }
}
