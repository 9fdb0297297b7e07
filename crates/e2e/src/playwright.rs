//! Playwright browser automation
//!
//! Each browser test is compiled into a standalone Node script that drives
//! the Playwright library and reports progress as JSON lines on stdout:
//!
//! ```text
//! {"event":"step","index":0,"duration_ms":412}
//! {"event":"log","message":"..."}
//! {"event":"failure","index":3,"error":"...","stack":"..."}
//! {"event":"passed"}
//! ```

use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use serde::{Deserialize, Serialize};
use tokio::process::Command as TokioCommand;
use tracing::{debug, info};

use crate::error::{E2eError, E2eResult};
use crate::runner::{RunOutcome, StepResult};
use crate::spec::{Locator, TestStep, Viewport};

/// File names inside an attempt's artifact directory
pub const FAILURE_SCREENSHOT: &str = "test-failed-1.png";
pub const TRACE_FILE: &str = "trace.zip";
pub const VIDEO_DIR: &str = "video";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Browser {
    #[default]
    Chromium,
    Firefox,
    Webkit,
}

impl Browser {
    pub fn as_str(&self) -> &'static str {
        match self {
            Browser::Chromium => "chromium",
            Browser::Firefox => "firefox",
            Browser::Webkit => "webkit",
        }
    }
}

/// Configuration for Playwright
#[derive(Debug, Clone)]
pub struct PlaywrightConfig {
    pub base_url: String,
    pub screenshot_dir: PathBuf,
    pub viewport: Viewport,
    pub browser: Browser,
    pub headless: bool,
    pub action_timeout_ms: u64,
    pub navigation_timeout_ms: u64,
    pub expect_timeout_ms: u64,
    pub test_id_attribute: String,
    /// `node_modules` holding `playwright` and `@playwright/test`
    pub node_modules: PathBuf,
}

impl Default for PlaywrightConfig {
    fn default() -> Self {
        Self {
            base_url: "https://www.saucedemo.com".to_string(),
            screenshot_dir: PathBuf::from("test-results/screenshots"),
            viewport: Viewport::default(),
            browser: Browser::Chromium,
            headless: true,
            action_timeout_ms: 15_000,
            navigation_timeout_ms: 20_000,
            expect_timeout_ms: 10_000,
            test_id_attribute: "data-test".to_string(),
            node_modules: PathBuf::from("node_modules"),
        }
    }
}

/// Progress line written by a generated script
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
enum ScriptEvent {
    Step { index: usize, duration_ms: u64 },
    Log { message: String },
    Failure {
        index: Option<usize>,
        error: Option<String>,
        #[serde(default)]
        stack: Option<String>,
    },
    Passed,
}

/// Playwright browser handle
pub struct PlaywrightHandle {
    config: PlaywrightConfig,
}

impl PlaywrightHandle {
    /// Create a new Playwright handle
    pub fn new(config: PlaywrightConfig) -> E2eResult<Self> {
        std::fs::create_dir_all(&config.screenshot_dir)?;
        Ok(Self { config })
    }

    /// Check if Playwright is installed
    pub fn check_playwright_installed() -> E2eResult<()> {
        let output = Command::new("npx")
            .args(["playwright", "--version"])
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status();

        match output {
            Ok(status) if status.success() => Ok(()),
            _ => Err(E2eError::PlaywrightNotFound),
        }
    }

    /// Run a browser test; artifacts land in `attempt_dir`.
    ///
    /// A failing step is reported in the returned outcome. Errors are
    /// reserved for the script itself not running.
    pub async fn run(
        &self,
        steps: &[TestStep],
        viewport: Option<Viewport>,
        attempt_dir: &Path,
    ) -> E2eResult<RunOutcome> {
        std::fs::create_dir_all(attempt_dir)?;

        let script = self.build_script(steps, viewport.unwrap_or(self.config.viewport), attempt_dir);
        let temp_dir = tempfile::tempdir()?;
        let script_path = temp_dir.path().join("test.js");
        std::fs::write(&script_path, &script)?;

        debug!("Running Playwright script: {}", script_path.display());

        let output = TokioCommand::new("node")
            .arg(&script_path)
            .env("NODE_PATH", &self.config.node_modules)
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await?;

        let stdout = String::from_utf8_lossy(&output.stdout);
        let (outcome, reported) = parse_events(&stdout, steps);

        if !reported || (!output.status.success() && outcome.passed()) {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(E2eError::Playwright(format!(
                "Script failed:\nstdout: {}\nstderr: {}",
                stdout, stderr
            )));
        }

        Ok(outcome)
    }

    /// Build the Playwright script for a set of steps
    pub fn build_script(&self, steps: &[TestStep], viewport: Viewport, attempt_dir: &Path) -> String {
        let mut script = String::new();

        // Header
        script.push_str(&format!(r#"
const {{ chromium, firefox, webkit, selectors }} = require('playwright');
const {{ expect: baseExpect }} = require('@playwright/test');

const expect = baseExpect.configure({{ timeout: {expect_timeout} }});
const emit = (event) => console.log(JSON.stringify(event));

(async () => {{
  selectors.setTestIdAttribute({test_id});
  const browser = await {browser}.launch({{ headless: {headless} }});
  const context = await browser.newContext({{
    baseURL: {base_url},
    viewport: {{ width: {width}, height: {height} }},
    recordVideo: {{ dir: {video_dir} }},
  }});
  context.setDefaultTimeout({action_timeout});
  context.setDefaultNavigationTimeout({navigation_timeout});
  await context.tracing.start({{ screenshots: true, snapshots: true }});
  const page = await context.newPage();
  let step = null;
  let started = Date.now();
  let failed = false;

  try {{
"#,
            expect_timeout = self.config.expect_timeout_ms,
            test_id = js(&self.config.test_id_attribute),
            browser = self.config.browser.as_str(),
            headless = self.config.headless,
            base_url = js(&self.config.base_url),
            width = viewport.width,
            height = viewport.height,
            video_dir = js_path(&attempt_dir.join(VIDEO_DIR)),
            action_timeout = self.config.action_timeout_ms,
            navigation_timeout = self.config.navigation_timeout_ms,
        ));

        for (i, step) in steps.iter().enumerate() {
            script.push_str(&format!("\n    // Step {}: {}\n", i + 1, step.name()));
            script.push_str(&format!("    step = {}; started = Date.now();\n", i));
            script.push_str(&self.step_to_js(step));
            script.push_str(&format!(
                "\n    emit({{ event: 'step', index: {}, duration_ms: Date.now() - started }});\n",
                i
            ));
        }

        // Footer
        script.push_str(&format!(r#"
    emit({{ event: 'passed' }});
  }} catch (error) {{
    failed = true;
    emit({{
      event: 'failure',
      index: step,
      error: String((error && error.message) || error),
      stack: (error && error.stack) || null,
    }});
    await page.screenshot({{ path: {screenshot}, fullPage: true }}).catch(() => {{}});
  }} finally {{
    await context.tracing.stop(failed ? {{ path: {trace} }} : {{}}).catch(() => {{}});
    await context.close();
    await browser.close();
  }}
  process.exit(failed ? 1 : 0);
}})();
"#,
            screenshot = js_path(&attempt_dir.join(FAILURE_SCREENSHOT)),
            trace = js_path(&attempt_dir.join(TRACE_FILE)),
        ));

        script
    }

    /// Convert a step to JavaScript code
    fn step_to_js(&self, step: &TestStep) -> String {
        match step {
            TestStep::Navigate { url, wait_for } => {
                let wait = wait_for
                    .as_ref()
                    .map(|l| format!("\n    await {}.waitFor();", locator_js(l)))
                    .unwrap_or_default();
                format!("    await page.goto({});{}", js(url), wait)
            }
            TestStep::Click { locator, timeout_ms } => match timeout_ms {
                Some(t) => format!("    await {}.click({{ timeout: {} }});", locator_js(locator), t),
                None => format!("    await {}.click();", locator_js(locator)),
            },
            TestStep::Fill { locator, value } => {
                format!("    await {}.fill({});", locator_js(locator), js(value))
            }
            TestStep::Press { locator, key } => match locator {
                Some(l) => format!("    await {}.press({});", locator_js(l), js(key)),
                None => format!("    await page.keyboard.press({});", js(key)),
            },
            TestStep::Hover { locator } => format!("    await {}.hover();", locator_js(locator)),
            TestStep::Select { locator, value } => {
                format!("    await {}.selectOption({});", locator_js(locator), js(value))
            }
            TestStep::Wait { locator, state, timeout_ms } => {
                let timeout = timeout_ms
                    .map(|t| format!(", timeout: {}", t))
                    .unwrap_or_default();
                format!(
                    "    await {}.waitFor({{ state: '{}'{} }});",
                    locator_js(locator),
                    state.as_str(),
                    timeout
                )
            }
            TestStep::Sleep { ms } => format!("    await page.waitForTimeout({});", ms),
            TestStep::Assert { locator, visible, text, text_contains, attribute, count } => {
                let target = locator_js(locator);
                let mut assertions = Vec::new();

                match visible {
                    Some(true) => assertions.push(format!("    await expect({}).toBeVisible();", target)),
                    Some(false) => assertions.push(format!("    await expect({}).toBeHidden();", target)),
                    None => {}
                }
                if let Some(t) = text {
                    assertions.push(format!("    await expect({}).toHaveText({});", target, js(t)));
                }
                if let Some(tc) = text_contains {
                    assertions.push(format!("    await expect({}).toContainText({});", target, js(tc)));
                }
                if let Some(attr) = attribute {
                    assertions.push(format!(
                        "    await expect({}).toHaveAttribute({}, {});",
                        target,
                        js(&attr.name),
                        js(&attr.value)
                    ));
                }
                if let Some(c) = count {
                    assertions.push(format!("    await expect({}).toHaveCount({});", target, c));
                }

                // A bare assert means "is visible"
                if assertions.is_empty() {
                    assertions.push(format!("    await expect({}).toBeVisible();", target));
                }

                assertions.join("\n")
            }
            TestStep::AssertUrl { pattern } => {
                format!("    await expect(page).toHaveURL(new RegExp({}));", js(pattern))
            }
            TestStep::Screenshot { name, full_page } => {
                let path = self.config.screenshot_dir.join(format!("{}.png", name));
                format!(
                    "    await page.screenshot({{ path: {}, fullPage: {} }});",
                    js_path(&path),
                    full_page
                )
            }
            TestStep::Log { message } => {
                format!("    emit({{ event: 'log', message: {} }});", js(message))
            }
            TestStep::Request { method, path, .. } => {
                // Rejected at load time; keep the script well-formed regardless.
                format!(
                    "    throw new Error({});",
                    js(&format!("request step {} {} cannot run in a browser test", method, path))
                )
            }
        }
    }
}

/// Playwright locator expression for a [`Locator`]
pub fn locator_js(locator: &Locator) -> String {
    match locator {
        Locator::TestId { test_id } => format!("page.getByTestId({})", js(test_id)),
        Locator::Role { role, name: Some(name) } => {
            format!("page.getByRole({}, {{ name: {} }})", js(role), js(name))
        }
        Locator::Role { role, name: None } => format!("page.getByRole({})", js(role)),
        Locator::Placeholder { placeholder } => format!("page.getByPlaceholder({})", js(placeholder)),
        Locator::Label { label } => format!("page.getByLabel({})", js(label)),
        Locator::Text { text, exact } => {
            format!("page.getByText({}, {{ exact: {} }})", js(text), exact)
        }
        Locator::Css { css } => format!("page.locator({})", js(css)),
    }
}

/// Quote a string as a JavaScript literal.
fn js(value: &str) -> String {
    serde_json::Value::String(value.to_string()).to_string()
}

fn js_path(path: &Path) -> String {
    js(&path.to_string_lossy())
}

/// Fold script output into an outcome. The flag reports whether the script
/// reached a verdict (`passed` or `failure`).
fn parse_events(stdout: &str, steps: &[TestStep]) -> (RunOutcome, bool) {
    let mut outcome = RunOutcome::default();
    let mut reported = false;
    let step_name = |index: Option<usize>| {
        index
            .and_then(|i| steps.get(i))
            .map(TestStep::name)
            .unwrap_or_else(|| "setup".to_string())
    };

    for line in stdout.lines().map(str::trim).filter(|l| l.starts_with('{')) {
        let event: ScriptEvent = match serde_json::from_str(line) {
            Ok(event) => event,
            Err(_) => {
                debug!("Ignoring script output: {}", line);
                continue;
            }
        };

        match event {
            ScriptEvent::Step { index, duration_ms } => outcome.steps.push(StepResult {
                success: true,
                step_name: step_name(Some(index)),
                duration_ms,
                error: None,
            }),
            ScriptEvent::Log { message } => info!("[TEST LOG] {}", message),
            ScriptEvent::Failure { index, error, stack } => {
                reported = true;
                outcome.steps.push(StepResult {
                    success: false,
                    step_name: step_name(index),
                    duration_ms: 0,
                    error: error.clone(),
                });
                outcome.error = Some(error.unwrap_or_default());
                outcome.stack = stack;
            }
            ScriptEvent::Passed => reported = true,
        }
    }

    (outcome, reported)
}
