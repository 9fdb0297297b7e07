//! JSON and JUnit reporters

use std::fmt::Write as _;
use std::path::{Path, PathBuf};

use crate::error::E2eResult;
use crate::runner::{TestStatus, TestSuiteResult};

pub const JSON_REPORT: &str = "test-results.json";
pub const JUNIT_REPORT: &str = "junit-results.xml";

/// Write the full result tree as pretty JSON
pub fn write_json(results: &TestSuiteResult, path: &Path) -> E2eResult<PathBuf> {
    let json = serde_json::to_string_pretty(results)?;
    std::fs::write(path, json)?;
    Ok(path.to_path_buf())
}

/// Write a JUnit XML report, one `<testsuite>` per suite
pub fn write_junit(results: &TestSuiteResult, path: &Path) -> E2eResult<PathBuf> {
    std::fs::write(path, render_junit(results))?;
    Ok(path.to_path_buf())
}

pub fn render_junit(results: &TestSuiteResult) -> String {
    let mut suites: Vec<&str> = Vec::new();
    for result in &results.results {
        if !suites.contains(&result.suite.as_str()) {
            suites.push(&result.suite);
        }
    }

    let mut xml = String::from("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n");
    let _ = writeln!(
        xml,
        "<testsuites name=\"shopcheck\" tests=\"{}\" failures=\"{}\" skipped=\"{}\" time=\"{}\">",
        results.total,
        results.failed,
        results.skipped,
        seconds(results.duration_ms)
    );

    for suite in suites {
        let cases: Vec<_> = results.results.iter().filter(|r| r.suite == suite).collect();
        let failures = cases.iter().filter(|r| r.status == TestStatus::Failed).count();
        let skipped = cases.iter().filter(|r| r.status == TestStatus::Skipped).count();
        let time: u64 = cases.iter().map(|r| r.duration_ms).sum();

        let _ = writeln!(
            xml,
            "  <testsuite name=\"{}\" timestamp=\"{}\" tests=\"{}\" failures=\"{}\" skipped=\"{}\" time=\"{}\">",
            escape(suite),
            results.started_at.to_rfc3339(),
            cases.len(),
            failures,
            skipped,
            seconds(time)
        );

        for case in cases {
            let _ = write!(
                xml,
                "    <testcase name=\"{}\" classname=\"{}\" time=\"{}\"",
                escape(&case.name),
                escape(&case.file),
                seconds(case.duration_ms)
            );

            match case.status {
                TestStatus::Passed | TestStatus::Flaky => xml.push_str("/>\n"),
                TestStatus::Skipped => xml.push_str(">\n      <skipped/>\n    </testcase>\n"),
                TestStatus::Failed => {
                    let message = case.error.as_deref().unwrap_or("unknown error");
                    let first_line = message.lines().next().unwrap_or_default();
                    let category = case.category.map(|c| c.as_str()).unwrap_or("unclassified");
                    let _ = write!(
                        xml,
                        ">\n      <failure message=\"{}\" type=\"{}\">{}</failure>\n",
                        escape(first_line),
                        category,
                        escape(message)
                    );

                    if let Some(help) = case.failure_help() {
                        let _ = writeln!(
                            xml,
                            "      <system-out>[[ATTACHMENT|{}]]</system-out>",
                            escape(&help.path.to_string_lossy())
                        );
                    }
                    xml.push_str("    </testcase>\n");
                }
            }
        }

        xml.push_str("  </testsuite>\n");
    }

    xml.push_str("</testsuites>\n");
    xml
}

fn seconds(ms: u64) -> String {
    format!("{:.3}", ms as f64 / 1000.0)
}

fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            // Not representable in XML 1.0; ANSI colour codes from expect() land here
            c if (c as u32) < 0x20 && !matches!(c, '\n' | '\r' | '\t') => {}
            c => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runner::{AttemptResult, Attachment, TestResult};
    use chrono::Utc;
    use shopcheck_triage::FailureCategory;

    fn result(suite: &str, name: &str, status: TestStatus) -> TestResult {
        TestResult {
            name: name.to_string(),
            suite: suite.to_string(),
            file: "login.yaml".to_string(),
            status,
            duration_ms: 1500,
            attempts: Vec::new(),
            error: None,
            category: None,
        }
    }

    fn suite() -> TestSuiteResult {
        let mut failed = result("Login flow", "shows error for <invalid> password", TestStatus::Failed);
        failed.error = Some("Timeout 15000ms exceeded\n\u{1b}[2mcall log\u{1b}[22m".to_string());
        failed.category = Some(FailureCategory::Timeout);
        failed.attempts.push(AttemptResult {
            attempt: 0,
            success: false,
            duration_ms: 1500,
            steps: Vec::new(),
            error: failed.error.clone(),
            category: failed.category,
            attachments: vec![Attachment {
                name: "failure-help".to_string(),
                path: PathBuf::from("artifacts/login/attempt-0/failure-help.txt"),
                content_type: "text/plain".to_string(),
            }],
        });

        TestSuiteResult::from_results(
            vec![
                result("Login flow", "valid login", TestStatus::Passed),
                failed,
                result("API", "homepage is reachable", TestStatus::Skipped),
            ],
            4500,
            Utc::now(),
        )
    }

    #[test]
    fn test_junit_structure() {
        let xml = render_junit(&suite());

        assert!(xml.starts_with("<?xml"));
        assert!(xml.contains("<testsuites name=\"shopcheck\" tests=\"3\" failures=\"1\" skipped=\"1\" time=\"4.500\">"));
        assert_eq!(xml.matches("<testsuite ").count(), 2);
        assert!(xml.contains("name=\"shows error for &lt;invalid&gt; password\""));
        assert!(xml.contains("<failure message=\"Timeout 15000ms exceeded\" type=\"timeout\">"));
        assert!(xml.contains("[[ATTACHMENT|artifacts/login/attempt-0/failure-help.txt]]"));
        assert!(xml.contains("<skipped/>"));
        assert!(!xml.contains('\u{1b}'));
    }

    #[test]
    fn test_write_reports() {
        let dir = tempfile::tempdir().unwrap();
        let results = suite();

        let json_path = write_json(&results, &dir.path().join(JSON_REPORT)).unwrap();
        let parsed: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(json_path).unwrap()).unwrap();
        assert_eq!(parsed["failed"], 1);
        assert_eq!(parsed["results"][1]["category"], "timeout");

        let junit_path = write_junit(&results, &dir.path().join(JUNIT_REPORT)).unwrap();
        assert!(std::fs::read_to_string(junit_path).unwrap().contains("<testsuites"));
    }
}
