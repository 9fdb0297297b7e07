//! Main test runner that orchestrates Playwright, API checks and failure triage

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use shopcheck_triage::{FailureCategory, FailureContext, FailureHelpProvider};

use crate::api::ApiClient;
use crate::config::SuiteConfig;
use crate::error::{E2eError, E2eResult};
use crate::playwright::{PlaywrightHandle, FAILURE_SCREENSHOT, TRACE_FILE, VIDEO_DIR};
use crate::report;
use crate::spec::{SpecFile, TestSpec};

/// Failure help is written to this file inside the attempt directory
pub const FAILURE_HELP_FILE: &str = "failure-help.txt";

/// Attachment name for failure help
pub const FAILURE_HELP_ATTACHMENT: &str = "failure-help";

/// Result of executing a test step
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepResult {
    pub success: bool,
    pub step_name: String,
    pub duration_ms: u64,
    pub error: Option<String>,
}

/// What a single attempt produced, before triage
#[derive(Debug, Clone, Default)]
pub struct RunOutcome {
    pub steps: Vec<StepResult>,
    pub error: Option<String>,
    pub stack: Option<String>,
}

impl RunOutcome {
    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            error: Some(error.into()),
            ..Default::default()
        }
    }

    pub fn passed(&self) -> bool {
        self.error.is_none()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TestStatus {
    Passed,
    /// Failed at least once, then passed on retry
    Flaky,
    Failed,
    Skipped,
}

/// A file attached to a test attempt
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attachment {
    pub name: String,
    pub path: PathBuf,
    pub content_type: String,
}

/// One run of a test; retries produce further attempts
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttemptResult {
    pub attempt: u32,
    pub success: bool,
    pub duration_ms: u64,
    pub steps: Vec<StepResult>,
    pub error: Option<String>,
    pub category: Option<FailureCategory>,
    pub attachments: Vec<Attachment>,
}

/// Result of running a single test
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestResult {
    pub name: String,
    pub suite: String,
    pub file: String,
    pub status: TestStatus,
    pub duration_ms: u64,
    pub attempts: Vec<AttemptResult>,
    pub error: Option<String>,
    pub category: Option<FailureCategory>,
}

impl TestResult {
    fn new(spec: &TestSpec, status: TestStatus) -> Self {
        Self {
            name: spec.name.clone(),
            suite: spec.suite.clone(),
            file: spec.file_name(),
            status,
            duration_ms: 0,
            attempts: Vec::new(),
            error: None,
            category: None,
        }
    }

    /// The last attempt's failure help, if any
    pub fn failure_help(&self) -> Option<&Attachment> {
        self.attempts
            .last()?
            .attachments
            .iter()
            .find(|a| a.name == FAILURE_HELP_ATTACHMENT)
    }
}

/// Result of running all tests
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestSuiteResult {
    pub total: usize,
    pub passed: usize,
    pub failed: usize,
    pub flaky: usize,
    pub skipped: usize,
    pub duration_ms: u64,
    pub started_at: DateTime<Utc>,
    pub results: Vec<TestResult>,
}

impl TestSuiteResult {
    pub fn from_results(results: Vec<TestResult>, duration_ms: u64, started_at: DateTime<Utc>) -> Self {
        let count = |status: TestStatus| results.iter().filter(|r| r.status == status).count();
        Self {
            total: results.len(),
            passed: count(TestStatus::Passed),
            failed: count(TestStatus::Failed),
            flaky: count(TestStatus::Flaky),
            skipped: count(TestStatus::Skipped),
            duration_ms,
            started_at,
            results,
        }
    }

    pub fn success(&self) -> bool {
        self.failed == 0
    }
}

/// Narrows which tests run
#[derive(Debug, Clone, Default)]
pub struct RunFilter {
    pub tag: Option<String>,
    /// Test name or `suite › name`
    pub name: Option<String>,
}

/// Main E2E test runner
#[derive(Clone)]
pub struct TestRunner {
    config: SuiteConfig,
    triage: FailureHelpProvider,
    api: ApiClient,
    playwright: Arc<PlaywrightHandle>,
}

impl TestRunner {
    /// Create a runner; failure help uses the config's triage settings.
    pub fn new(config: SuiteConfig) -> E2eResult<Self> {
        let triage = FailureHelpProvider::new(config.triage.clone())?;
        Self::with_triage(config, triage)
    }

    /// Create a runner with a specific failure help provider
    pub fn with_triage(config: SuiteConfig, triage: FailureHelpProvider) -> E2eResult<Self> {
        let api = ApiClient::new(
            config.base_url.clone(),
            Duration::from_millis(config.navigation_timeout_ms),
        )?;
        let playwright = Arc::new(PlaywrightHandle::new(config.playwright())?);

        Ok(Self {
            config,
            triage,
            api,
            playwright,
        })
    }

    pub fn config(&self) -> &SuiteConfig {
        &self.config
    }

    /// Load every spec from the configured directory
    pub fn load_specs(&self) -> E2eResult<Vec<TestSpec>> {
        SpecFile::load_all(&self.config.specs_dir)
    }

    /// Apply focus (`only`) and filters.
    pub fn select(&self, specs: Vec<TestSpec>, filter: &RunFilter) -> E2eResult<Vec<TestSpec>> {
        let focused: Vec<String> = specs
            .iter()
            .filter(|s| s.only)
            .map(TestSpec::full_title)
            .collect();

        let specs = if focused.is_empty() {
            specs
        } else if self.config.forbid_only() {
            return Err(E2eError::ForbiddenOnly(focused.join(", ")));
        } else {
            info!("Running {} focused test(s)", focused.len());
            specs.into_iter().filter(|s| s.only).collect()
        };

        let selected: Vec<TestSpec> = specs
            .into_iter()
            .filter(|s| filter.tag.as_ref().map_or(true, |tag| s.tags.contains(tag)))
            .filter(|s| {
                filter
                    .name
                    .as_ref()
                    .map_or(true, |name| &s.name == name || &s.full_title() == name)
            })
            .collect();

        if let Some(name) = &filter.name {
            if selected.is_empty() {
                return Err(E2eError::SpecParse(format!("Test not found: {}", name)));
            }
        }

        Ok(selected)
    }

    /// Load, select and run
    pub async fn run(&self, filter: &RunFilter) -> E2eResult<TestSuiteResult> {
        let specs = self.load_specs()?;
        let specs = self.select(specs, filter)?;
        self.run_specs(specs).await
    }

    /// Run tests across the configured number of workers.
    ///
    /// Results keep the order of `specs`.
    pub async fn run_specs(&self, specs: Vec<TestSpec>) -> E2eResult<TestSuiteResult> {
        let started_at = Utc::now();
        let start = Instant::now();

        if specs.iter().any(|s| !s.skip && s.needs_browser()) {
            PlaywrightHandle::check_playwright_installed()?;
        }

        let workers = self.config.workers();
        info!("Running {} test(s) using {} worker(s)", specs.len(), workers);

        let permits = Arc::new(Semaphore::new(workers));
        let mut tasks: JoinSet<(usize, TestResult)> = JoinSet::new();
        let mut slots: Vec<Option<TestResult>> = vec![None; specs.len()];

        for (index, spec) in specs.iter().cloned().enumerate() {
            let runner = self.clone();
            let permits = permits.clone();
            tasks.spawn(async move {
                let _permit = permits.acquire_owned().await.ok();
                (index, runner.run_spec(&spec).await)
            });
        }

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((index, result)) => {
                    log_result(&result);
                    slots[index] = Some(result);
                }
                Err(e) => error!("Test worker crashed: {}", e),
            }
        }

        let results: Vec<TestResult> = slots
            .into_iter()
            .zip(&specs)
            .map(|(slot, spec)| {
                slot.unwrap_or_else(|| {
                    let mut result = TestResult::new(spec, TestStatus::Failed);
                    result.error = Some("test worker crashed".to_string());
                    result
                })
            })
            .collect();

        let duration_ms = start.elapsed().as_millis() as u64;
        let suite = TestSuiteResult::from_results(results, duration_ms, started_at);

        info!(
            "Test Results: {} passed, {} failed, {} flaky, {} skipped ({} ms)",
            suite.passed, suite.failed, suite.flaky, suite.skipped, suite.duration_ms
        );

        Ok(suite)
    }

    /// Run a single test with retries
    pub async fn run_spec(&self, spec: &TestSpec) -> TestResult {
        if spec.skip {
            return TestResult::new(spec, TestStatus::Skipped);
        }

        let start = Instant::now();
        let mut attempts = Vec::new();

        for attempt in 0..=self.config.retries() {
            if attempt > 0 {
                info!("Retrying {} (retry #{})", spec.full_title(), attempt);
            }

            let result = self.run_attempt(spec, attempt).await;
            let success = result.success;
            attempts.push(result);
            if success {
                break;
            }
        }

        let last = attempts.last();
        let status = match last {
            Some(a) if a.success && attempts.len() > 1 => TestStatus::Flaky,
            Some(a) if a.success => TestStatus::Passed,
            _ => TestStatus::Failed,
        };

        let mut result = TestResult::new(spec, status);
        result.error = last.and_then(|a| a.error.clone());
        result.category = last.and_then(|a| a.category);
        result.duration_ms = start.elapsed().as_millis() as u64;
        result.attempts = attempts;
        result
    }

    async fn run_attempt(&self, spec: &TestSpec, attempt: u32) -> AttemptResult {
        let dir = self.attempt_dir(spec, attempt);
        let start = Instant::now();
        debug!("Running test: {} (attempt {})", spec.full_title(), attempt);

        // Leftovers from a previous run must not be attached to this one
        clear_dir(&dir);

        let run = async {
            if spec.needs_browser() {
                self.playwright.run(&spec.steps, spec.viewport, &dir).await
            } else {
                Ok(self.api.run(&spec.steps).await)
            }
        };

        let outcome = match tokio::time::timeout(self.config.test_timeout(), run).await {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(e)) => RunOutcome::failed(e.to_string()),
            Err(_) => RunOutcome::failed(
                E2eError::Timeout(format!(
                    "test to finish, timeout of {}ms exceeded",
                    self.config.test_timeout_ms
                ))
                .to_string(),
            ),
        };

        let duration_ms = start.elapsed().as_millis() as u64;

        if outcome.passed() {
            // Artifacts are only retained on failure
            clear_dir(&dir);
            return AttemptResult {
                attempt,
                success: true,
                duration_ms,
                steps: outcome.steps,
                error: None,
                category: None,
                attachments: Vec::new(),
            };
        }

        let category = outcome.error.as_deref().map(FailureCategory::classify);
        let mut attachments = if spec.needs_browser() {
            collect_artifacts(&dir)
        } else {
            Vec::new()
        };
        if let Some(help) = self.attach_failure_help(spec, &dir, &outcome).await {
            attachments.push(help);
        }

        AttemptResult {
            attempt,
            success: false,
            duration_ms,
            steps: outcome.steps,
            error: outcome.error,
            category,
            attachments,
        }
    }

    /// Teardown hook for a failed attempt: explain the failure, log it and
    /// attach it. Never affects the test's outcome.
    async fn attach_failure_help(
        &self,
        spec: &TestSpec,
        dir: &Path,
        outcome: &RunOutcome,
    ) -> Option<Attachment> {
        let context = FailureContext::new(
            spec.suite.clone(),
            spec.name.clone(),
            spec.file_name(),
            outcome.error.clone(),
            outcome.stack.clone(),
        );

        let help = self.triage.get_failure_help(&context).await;
        info!("[{}] {}", spec.name, help);

        let path = dir.join(FAILURE_HELP_FILE);
        let written = std::fs::create_dir_all(dir).and_then(|_| std::fs::write(&path, &help));
        match written {
            Ok(()) => Some(Attachment {
                name: FAILURE_HELP_ATTACHMENT.to_string(),
                path,
                content_type: "text/plain".to_string(),
            }),
            Err(e) => {
                warn!("Could not attach failure help for '{}': {}", spec.name, e);
                None
            }
        }
    }

    /// `<artifacts>/<suite>-<test>/attempt-<n>`
    pub fn attempt_dir(&self, spec: &TestSpec, attempt: u32) -> PathBuf {
        self.config
            .artifacts_dir
            .join(format!("{}-{}", slug(&spec.suite), slug(&spec.name)))
            .join(format!("attempt-{}", attempt))
    }

    /// Write JSON and JUnit reports to the output directory
    pub fn write_results(&self, results: &TestSuiteResult) -> E2eResult<Vec<PathBuf>> {
        std::fs::create_dir_all(&self.config.output_dir)?;

        let json = report::write_json(results, &self.config.output_dir.join(report::JSON_REPORT))?;
        let junit = report::write_junit(results, &self.config.output_dir.join(report::JUNIT_REPORT))?;

        info!("Results written to: {}", self.config.output_dir.display());
        Ok(vec![json, junit])
    }
}

/// `list` reporter line
fn log_result(result: &TestResult) {
    let title = format!("{} › {}", result.suite, result.name);
    match result.status {
        TestStatus::Passed => info!("✓ {} ({} ms)", title, result.duration_ms),
        TestStatus::Flaky => warn!("~ {} passed on retry ({} ms)", title, result.duration_ms),
        TestStatus::Skipped => info!("- {} (skipped)", title),
        TestStatus::Failed => error!(
            "✗ {} [{}] - {}",
            title,
            result.category.unwrap_or(FailureCategory::Unclassified),
            result.error.as_deref().unwrap_or("unknown error")
        ),
    }
}

fn clear_dir(dir: &Path) {
    match std::fs::remove_dir_all(dir) {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => warn!("Could not remove {}: {}", dir.display(), e),
    }
}

/// Screenshot, trace and video left behind by a failed browser attempt
fn collect_artifacts(dir: &Path) -> Vec<Attachment> {
    let mut attachments = Vec::new();

    let screenshot = dir.join(FAILURE_SCREENSHOT);
    if screenshot.is_file() {
        attachments.push(Attachment {
            name: "screenshot".to_string(),
            path: screenshot,
            content_type: "image/png".to_string(),
        });
    }

    let trace = dir.join(TRACE_FILE);
    if trace.is_file() {
        attachments.push(Attachment {
            name: "trace".to_string(),
            path: trace,
            content_type: "application/zip".to_string(),
        });
    }

    if let Ok(entries) = std::fs::read_dir(dir.join(VIDEO_DIR)) {
        for path in entries.filter_map(|e| e.ok()).map(|e| e.path()) {
            if path.extension().map(|e| e == "webm").unwrap_or(false) {
                attachments.push(Attachment {
                    name: "video".to_string(),
                    path,
                    content_type: "video/webm".to_string(),
                });
            }
        }
    }

    attachments
}

/// Lowercase, dash-separated, at most 60 characters
fn slug(text: &str) -> String {
    let mut out = String::new();
    for c in text.chars() {
        if c.is_ascii_alphanumeric() {
            out.push(c.to_ascii_lowercase());
        } else if !out.ends_with('-') && !out.is_empty() {
            out.push('-');
        }
    }
    let out: String = out.chars().take(60).collect();
    out.trim_end_matches('-').to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec(name: &str, only: bool, tags: &[&str]) -> TestSpec {
        TestSpec {
            name: name.to_string(),
            description: String::new(),
            tags: tags.iter().map(|t| t.to_string()).collect(),
            only,
            skip: false,
            viewport: None,
            steps: vec![crate::spec::TestStep::Sleep { ms: 1 }],
            suite: "Login flow".to_string(),
            file: PathBuf::from("tests/e2e/specs/login.yaml"),
        }
    }

    fn runner(config: SuiteConfig) -> TestRunner {
        TestRunner::with_triage(config, FailureHelpProvider::new(Default::default()).unwrap()).unwrap()
    }

    fn local_config(dir: &Path) -> SuiteConfig {
        SuiteConfig {
            output_dir: dir.to_path_buf(),
            artifacts_dir: dir.join("artifacts"),
            ..Default::default()
        }
    }

    #[test]
    fn test_slug() {
        assert_eq!(slug("Login flow"), "login-flow");
        assert_eq!(slug("shows error for invalid password!"), "shows-error-for-invalid-password");
        assert_eq!(slug("  --Weird__name--  "), "weird-name");
        assert!(slug(&"x".repeat(200)).len() <= 60);
    }

    #[test]
    fn test_attempt_dir_layout() {
        let dir = tempfile::tempdir().unwrap();
        let runner = runner(local_config(dir.path()));
        let path = runner.attempt_dir(&spec("valid login", false, &[]), 1);
        assert_eq!(path, dir.path().join("artifacts/login-flow-valid-login/attempt-1"));
    }

    #[test]
    fn test_select_by_tag_and_name() {
        let dir = tempfile::tempdir().unwrap();
        let runner = runner(local_config(dir.path()));
        let specs = vec![spec("a", false, &["smoke"]), spec("b", false, &[])];

        let tagged = runner
            .select(specs.clone(), &RunFilter { tag: Some("smoke".into()), name: None })
            .unwrap();
        assert_eq!(tagged.len(), 1);
        assert_eq!(tagged[0].name, "a");

        let named = runner
            .select(specs.clone(), &RunFilter { tag: None, name: Some("Login flow › b".into()) })
            .unwrap();
        assert_eq!(named[0].name, "b");

        let missing = runner.select(specs, &RunFilter { tag: None, name: Some("zzz".into()) });
        assert!(missing.is_err());
    }

    #[test]
    fn test_only_focuses_locally_and_fails_on_ci() {
        let dir = tempfile::tempdir().unwrap();
        let specs = vec![spec("a", false, &[]), spec("b", true, &[])];

        let local = runner(local_config(dir.path()));
        let focused = local.select(specs.clone(), &RunFilter::default()).unwrap();
        assert_eq!(focused.len(), 1);
        assert_eq!(focused[0].name, "b");

        let ci = runner(SuiteConfig { ci: true, ..local_config(dir.path()) });
        let err = ci.select(specs, &RunFilter::default()).unwrap_err();
        assert!(matches!(err, E2eError::ForbiddenOnly(ref names) if names.contains("Login flow › b")));
    }

    #[test]
    fn test_suite_counts() {
        let s = spec("a", false, &[]);
        let mut results = Vec::new();
        for status in [TestStatus::Passed, TestStatus::Flaky, TestStatus::Failed, TestStatus::Skipped] {
            results.push(TestResult::new(&s, status));
        }
        let suite = TestSuiteResult::from_results(results, 10, Utc::now());
        assert_eq!((suite.total, suite.passed, suite.flaky, suite.failed, suite.skipped), (4, 1, 1, 1, 1));
        assert!(!suite.success());
    }

    #[tokio::test]
    async fn test_skipped_spec_does_not_run() {
        let dir = tempfile::tempdir().unwrap();
        let runner = runner(local_config(dir.path()));
        let mut s = spec("skipped", false, &[]);
        s.skip = true;

        let result = runner.run_spec(&s).await;
        assert_eq!(result.status, TestStatus::Skipped);
        assert!(result.attempts.is_empty());
    }
}
