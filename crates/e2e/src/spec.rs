//! Declarative YAML test specification
//!
//! One YAML file describes one suite:
//!
//! ```yaml
//! suite: Login flow
//! tags: [auth]
//! tests:
//!   - name: user can log in with valid credentials
//!     steps:
//!       - action: navigate
//!         url: /
//!       - action: fill
//!         locator: { placeholder: Username }
//!         value: standard_user
//! ```

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::error::{E2eError, E2eResult};

/// A spec file: a named suite of tests
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpecFile {
    /// Suite label used in reports and failure triage
    pub suite: String,

    /// Tags applied to every test in the file
    #[serde(default)]
    pub tags: Vec<String>,

    pub tests: Vec<TestSpec>,
}

/// A single test
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestSpec {
    /// Test title, unique within its suite
    pub name: String,

    /// Human-readable description
    #[serde(default)]
    pub description: String,

    /// Tags for filtering tests
    #[serde(default)]
    pub tags: Vec<String>,

    /// Focus this test; forbidden on CI
    #[serde(default)]
    pub only: bool,

    /// Report as skipped without running
    #[serde(default)]
    pub skip: bool,

    /// Viewport override for browser tests
    #[serde(default)]
    pub viewport: Option<Viewport>,

    /// Steps to execute in order
    pub steps: Vec<TestStep>,

    /// Owning suite, filled in on load
    #[serde(skip)]
    pub suite: String,

    /// Originating file, filled in on load
    #[serde(skip)]
    pub file: PathBuf,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Viewport {
    pub width: u32,
    pub height: u32,
}

impl Default for Viewport {
    fn default() -> Self {
        Viewport { width: 1280, height: 720 }
    }
}

/// How a browser step finds its element.
///
/// Written as a one-key map, e.g. `{ test_id: username }` or
/// `{ role: button, name: Login }`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Locator {
    TestId { test_id: String },
    Role {
        role: String,
        #[serde(default)]
        name: Option<String>,
    },
    Placeholder { placeholder: String },
    Label { label: String },
    Text {
        text: String,
        #[serde(default)]
        exact: bool,
    },
    Css { css: String },
}

/// A single step in a test
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum TestStep {
    /// Navigate to a URL (relative to base)
    Navigate {
        url: String,
        #[serde(default)]
        wait_for: Option<Locator>,
    },

    /// Click an element
    Click {
        locator: Locator,
        #[serde(default)]
        timeout_ms: Option<u64>,
    },

    /// Fill an input field
    Fill {
        locator: Locator,
        value: String,
    },

    /// Press a key, on an element or the page
    Press {
        #[serde(default)]
        locator: Option<Locator>,
        key: String,
    },

    /// Hover over an element
    Hover {
        locator: Locator,
    },

    /// Select an option from a dropdown
    Select {
        locator: Locator,
        value: String,
    },

    /// Wait for an element to reach a state
    Wait {
        locator: Locator,
        #[serde(default)]
        state: WaitState,
        #[serde(default)]
        timeout_ms: Option<u64>,
    },

    /// Wait for a fixed amount of time (use sparingly)
    Sleep {
        ms: u64,
    },

    /// Assert something about an element
    Assert {
        locator: Locator,
        #[serde(default)]
        visible: Option<bool>,
        #[serde(default)]
        text: Option<String>,
        #[serde(default)]
        text_contains: Option<String>,
        #[serde(default)]
        attribute: Option<AttributeAssertion>,
        #[serde(default)]
        count: Option<usize>,
    },

    /// Assert the page URL matches a regular expression
    AssertUrl {
        pattern: String,
    },

    /// Take a screenshot
    Screenshot {
        name: String,
        #[serde(default)]
        full_page: bool,
    },

    /// Log a message (for debugging)
    Log {
        message: String,
    },

    /// Issue an HTTP request against the base URL
    Request {
        #[serde(default = "default_method")]
        method: String,
        path: String,
        #[serde(default)]
        headers: BTreeMap<String, String>,
        #[serde(default)]
        body: Option<serde_json::Value>,
        #[serde(default)]
        expect: ResponseExpectation,
    },
}

fn default_method() -> String {
    "GET".to_string()
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WaitState {
    #[default]
    Visible,
    Hidden,
    Attached,
    Detached,
}

impl WaitState {
    pub fn as_str(&self) -> &'static str {
        match self {
            WaitState::Visible => "visible",
            WaitState::Hidden => "hidden",
            WaitState::Attached => "attached",
            WaitState::Detached => "detached",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttributeAssertion {
    pub name: String,
    pub value: String,
}

/// Checks applied to an HTTP response
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ResponseExpectation {
    /// Status is in the 2xx range
    #[serde(default)]
    pub ok: Option<bool>,

    /// Exact status code
    #[serde(default)]
    pub status: Option<u16>,

    /// Substring of the response body
    #[serde(default)]
    pub body_contains: Option<String>,
}

impl TestStep {
    /// Whether this step runs through the HTTP client rather than the browser.
    pub fn is_request(&self) -> bool {
        matches!(self, TestStep::Request { .. })
    }

    /// Short label used in logs and reports
    pub fn name(&self) -> String {
        match self {
            TestStep::Navigate { url, .. } => format!("navigate:{}", url),
            TestStep::Click { locator, .. } => format!("click:{}", locator),
            TestStep::Fill { locator, .. } => format!("fill:{}", locator),
            TestStep::Press { key, .. } => format!("press:{}", key),
            TestStep::Hover { locator } => format!("hover:{}", locator),
            TestStep::Select { locator, .. } => format!("select:{}", locator),
            TestStep::Wait { locator, .. } => format!("wait:{}", locator),
            TestStep::Sleep { ms } => format!("sleep:{}ms", ms),
            TestStep::Assert { locator, .. } => format!("assert:{}", locator),
            TestStep::AssertUrl { pattern } => format!("assert_url:{}", pattern),
            TestStep::Screenshot { name, .. } => format!("screenshot:{}", name),
            TestStep::Log { message } => {
                format!("log:{}", message.chars().take(30).collect::<String>())
            }
            TestStep::Request { method, path, .. } => {
                format!("request:{} {}", method.to_uppercase(), path)
            }
        }
    }
}

impl std::fmt::Display for Locator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Locator::TestId { test_id } => write!(f, "test_id={}", test_id),
            Locator::Role { role, name: Some(name) } => write!(f, "role={}[name={}]", role, name),
            Locator::Role { role, name: None } => write!(f, "role={}", role),
            Locator::Placeholder { placeholder } => write!(f, "placeholder={}", placeholder),
            Locator::Label { label } => write!(f, "label={}", label),
            Locator::Text { text, .. } => write!(f, "text={}", text),
            Locator::Css { css } => write!(f, "css={}", css),
        }
    }
}

impl TestSpec {
    /// Whether any step needs a browser
    pub fn needs_browser(&self) -> bool {
        self.steps.iter().any(|s| !s.is_request())
    }

    /// Stable identifier: `suite › name`
    pub fn full_title(&self) -> String {
        format!("{} › {}", self.suite, self.name)
    }

    /// File name for display, e.g. `login.yaml`
    pub fn file_name(&self) -> String {
        self.file
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| self.file.display().to_string())
    }

    fn validate(&self, file: &str) -> E2eResult<()> {
        let invalid = |reason: String| E2eError::InvalidSpec {
            file: file.to_string(),
            reason,
        };

        if self.name.trim().is_empty() {
            return Err(invalid("test with empty name".to_string()));
        }
        if self.steps.is_empty() {
            return Err(invalid(format!("'{}' has no steps", self.name)));
        }
        if self.needs_browser() && self.steps.iter().any(TestStep::is_request) {
            return Err(invalid(format!(
                "'{}' mixes browser and request steps",
                self.name
            )));
        }
        Ok(())
    }
}

impl SpecFile {
    /// Parse a spec file from YAML string
    pub fn from_yaml(yaml: &str) -> E2eResult<Self> {
        serde_yaml::from_str(yaml).map_err(E2eError::from)
    }

    /// Parse and validate a spec file, returning its tests with suite,
    /// file and inherited tags filled in.
    pub fn load(path: &Path) -> E2eResult<Vec<TestSpec>> {
        let content = std::fs::read_to_string(path)?;
        let file = Self::from_yaml(&content).map_err(|e| {
            E2eError::SpecParse(format!("{}: {}", path.display(), e))
        })?;
        file.into_tests(path)
    }

    fn into_tests(self, path: &Path) -> E2eResult<Vec<TestSpec>> {
        let display = path.display().to_string();
        let mut seen = std::collections::HashSet::new();
        let mut tests = Vec::with_capacity(self.tests.len());

        for mut test in self.tests {
            test.validate(&display)?;
            if !seen.insert(test.name.clone()) {
                return Err(E2eError::InvalidSpec {
                    file: display,
                    reason: format!("duplicate test name '{}'", test.name),
                });
            }

            test.suite = self.suite.clone();
            test.file = path.to_path_buf();
            for tag in &self.tags {
                if !test.tags.contains(tag) {
                    test.tags.push(tag.clone());
                }
            }
            tests.push(test);
        }

        Ok(tests)
    }

    /// Load all tests from every `.yaml`/`.yml` file under a directory,
    /// in path order.
    pub fn load_all(dir: &Path) -> E2eResult<Vec<TestSpec>> {
        if !dir.is_dir() {
            return Err(E2eError::SpecParse(format!(
                "specs directory not found: {}",
                dir.display()
            )));
        }

        let mut tests = Vec::new();

        for entry in walkdir::WalkDir::new(dir)
            .sort_by_file_name()
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| {
                e.path()
                    .extension()
                    .map(|ext| ext == "yaml" || ext == "yml")
                    .unwrap_or(false)
            })
        {
            tests.extend(Self::load(entry.path())?);
        }

        Ok(tests)
    }
}
