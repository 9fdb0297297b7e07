//! Suite configuration
//!
//! Resolved in three layers: built-in defaults, an optional TOML file
//! (`shopcheck.toml`), then the environment (`BASE_URL`, `CI`,
//! `GROQ_API_KEY`, `GROQ_MODEL`). CLI flags are applied last by the harness.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use shopcheck_triage::TriageConfig;

use crate::error::{E2eError, E2eResult};
use crate::playwright::{Browser, PlaywrightConfig};
use crate::spec::Viewport;

pub const DEFAULT_CONFIG_FILE: &str = "shopcheck.toml";
pub const DEFAULT_BASE_URL: &str = "https://www.saucedemo.com";

/// Configuration for a suite run
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SuiteConfig {
    /// Site under test
    pub base_url: String,

    /// Directory holding YAML spec files
    pub specs_dir: PathBuf,

    /// Reports are written here
    pub output_dir: PathBuf,

    /// Per-attempt screenshots, traces, videos and failure help
    pub artifacts_dir: PathBuf,

    /// Running on CI; changes retry, worker and focus defaults
    pub ci: bool,

    pub test_timeout_ms: u64,
    pub expect_timeout_ms: u64,
    pub action_timeout_ms: u64,
    pub navigation_timeout_ms: u64,

    /// Retries per test; defaults to 2 on CI and 1 locally
    pub retries: Option<u32>,

    /// Parallel workers; defaults to 2 on CI and the CPU count locally
    pub workers: Option<usize>,

    /// Reject `only: true` specs; defaults to on for CI
    pub forbid_only: Option<bool>,

    pub browser: Browser,
    pub headless: bool,
    pub viewport: Viewport,
    pub test_id_attribute: String,
    pub node_modules: PathBuf,

    /// Failure triage settings; the credential always comes from the environment
    pub triage: TriageConfig,
}

impl Default for SuiteConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            specs_dir: PathBuf::from("tests/e2e/specs"),
            output_dir: PathBuf::from("test-results"),
            artifacts_dir: PathBuf::from("test-results/artifacts"),
            ci: false,
            test_timeout_ms: 60_000,
            expect_timeout_ms: 10_000,
            action_timeout_ms: 15_000,
            navigation_timeout_ms: 20_000,
            retries: None,
            workers: None,
            forbid_only: None,
            browser: Browser::Chromium,
            headless: true,
            viewport: Viewport::default(),
            test_id_attribute: "data-test".to_string(),
            node_modules: PathBuf::from("node_modules"),
            triage: TriageConfig::default(),
        }
    }
}

impl SuiteConfig {
    /// Parse a TOML config
    pub fn from_toml(content: &str) -> E2eResult<Self> {
        let mut config: Self = toml::from_str(content)?;
        // Never read from a file.
        config.triage.api_key = None;
        Ok(config)
    }

    /// Load configuration from `path` (or `shopcheck.toml` if present),
    /// then overlay the process environment.
    pub fn load(path: Option<&Path>) -> E2eResult<Self> {
        let mut config = match path {
            Some(path) => {
                let content = std::fs::read_to_string(path).map_err(|e| {
                    E2eError::Config(format!("cannot read {}: {}", path.display(), e))
                })?;
                Self::from_toml(&content)?
            }
            None if Path::new(DEFAULT_CONFIG_FILE).is_file() => {
                Self::from_toml(&std::fs::read_to_string(DEFAULT_CONFIG_FILE)?)?
            }
            None => Self::default(),
        };

        config.apply_env(|key| std::env::var(key).ok());
        Ok(config)
    }

    /// Overlay environment variables from an arbitrary lookup.
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = lookup("BASE_URL").filter(|u| !u.trim().is_empty()) {
            self.base_url = url;
        }
        if let Some(ci) = lookup("CI") {
            self.ci = is_truthy(&ci);
        }
        self.triage.apply_env(&lookup);
    }

    pub fn retries(&self) -> u32 {
        self.retries.unwrap_or(if self.ci { 2 } else { 1 })
    }

    pub fn workers(&self) -> usize {
        let workers = self.workers.unwrap_or_else(|| {
            if self.ci {
                2
            } else {
                std::thread::available_parallelism().map(|n| n.get()).unwrap_or(1)
            }
        });
        workers.max(1)
    }

    pub fn forbid_only(&self) -> bool {
        self.forbid_only.unwrap_or(self.ci)
    }

    pub fn test_timeout(&self) -> Duration {
        Duration::from_millis(self.test_timeout_ms)
    }

    pub fn screenshot_dir(&self) -> PathBuf {
        self.output_dir.join("screenshots")
    }

    /// Playwright settings derived from this config
    pub fn playwright(&self) -> PlaywrightConfig {
        PlaywrightConfig {
            base_url: self.base_url.clone(),
            screenshot_dir: self.screenshot_dir(),
            viewport: self.viewport,
            browser: self.browser,
            headless: self.headless,
            action_timeout_ms: self.action_timeout_ms,
            navigation_timeout_ms: self.navigation_timeout_ms,
            expect_timeout_ms: self.expect_timeout_ms,
            test_id_attribute: self.test_id_attribute.clone(),
            node_modules: self.node_modules.clone(),
        }
    }
}

/// `CI=false` and `CI=0` are treated as unset, as most CI tooling does.
fn is_truthy(value: &str) -> bool {
    let value = value.trim();
    !(value.is_empty() || value == "0" || value.eq_ignore_ascii_case("false"))
}
