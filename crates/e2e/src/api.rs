//! HTTP request steps, run natively without a browser

use std::time::{Duration, Instant};
use reqwest::Method;
use tracing::debug;

use crate::error::{E2eError, E2eResult};
use crate::runner::{RunOutcome, StepResult};
use crate::spec::{ResponseExpectation, TestStep};

/// Client for `request` steps, resolving paths against the base URL
#[derive(Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    base_url: String,
}

impl ApiClient {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> E2eResult<Self> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http,
            base_url: base_url.into(),
        })
    }

    /// Absolute URL for a step path
    pub fn url(&self, path: &str) -> String {
        if path.starts_with("http://") || path.starts_with("https://") {
            return path.to_string();
        }
        format!(
            "{}/{}",
            self.base_url.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }

    /// Run request steps in order, stopping at the first failure.
    pub async fn run(&self, steps: &[TestStep]) -> RunOutcome {
        let mut outcome = RunOutcome::default();

        for step in steps {
            let start = Instant::now();
            let result = self.execute(step).await;
            let duration_ms = start.elapsed().as_millis() as u64;

            match result {
                Ok(()) => outcome.steps.push(StepResult {
                    success: true,
                    step_name: step.name(),
                    duration_ms,
                    error: None,
                }),
                Err(e) => {
                    let message = e.to_string();
                    outcome.steps.push(StepResult {
                        success: false,
                        step_name: step.name(),
                        duration_ms,
                        error: Some(message.clone()),
                    });
                    outcome.error = Some(message);
                    break; // Stop on first failure
                }
            }
        }

        outcome
    }

    async fn execute(&self, step: &TestStep) -> E2eResult<()> {
        let TestStep::Request { method, path, headers, body, expect } = step else {
            return Err(E2eError::StepFailed {
                step: step.name(),
                reason: "not a request step".to_string(),
            });
        };

        let method = Method::from_bytes(method.to_uppercase().as_bytes()).map_err(|_| {
            E2eError::StepFailed {
                step: step.name(),
                reason: format!("invalid HTTP method '{}'", method),
            }
        })?;
        let url = self.url(path);
        debug!("{} {}", method, url);

        let mut request = self.http.request(method.clone(), &url);
        for (name, value) in headers {
            request = request.header(name, value);
        }
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request.send().await.map_err(|e| E2eError::StepFailed {
            step: step.name(),
            reason: format!("{} {} failed: {}", method, url, e),
        })?;
        let status = response.status();
        let text = response.text().await?;

        check_response(expect, status, &text)
    }
}

fn check_response(
    expect: &ResponseExpectation,
    status: reqwest::StatusCode,
    body: &str,
) -> E2eResult<()> {
    if let Some(ok) = expect.ok {
        if status.is_success() != ok {
            return Err(E2eError::AssertionFailed(format!(
                "expect(response.ok()).toBe({})\n\nReceived status: {}",
                ok, status
            )));
        }
    }

    if let Some(expected) = expect.status {
        if status.as_u16() != expected {
            return Err(E2eError::AssertionFailed(format!(
                "expect(response.status()).toBe({})\n\nReceived: {}",
                expected,
                status.as_u16()
            )));
        }
    }

    if let Some(needle) = &expect.body_contains {
        if !body.contains(needle.as_str()) {
            return Err(E2eError::AssertionFailed(format!(
                "expect(response body).toContain({:?})\n\nReceived {} bytes without it",
                needle,
                body.len()
            )));
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::prelude::*;
    use std::collections::BTreeMap;

    fn request(path: &str, expect: ResponseExpectation) -> TestStep {
        TestStep::Request {
            method: "get".into(),
            path: path.into(),
            headers: BTreeMap::new(),
            body: None,
            expect,
        }
    }

    #[test]
    fn test_url_joining() {
        let client = ApiClient::new("https://www.saucedemo.com/", Duration::from_secs(1)).unwrap();
        assert_eq!(client.url("/"), "https://www.saucedemo.com/");
        assert_eq!(client.url("inventory.html"), "https://www.saucedemo.com/inventory.html");
        assert_eq!(client.url("https://example.com/x"), "https://example.com/x");
    }

    #[tokio::test]
    async fn test_ok_expectation_passes() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/");
                then.status(200).body("<title>Swag Labs</title>");
            })
            .await;

        let client = ApiClient::new(server.base_url(), Duration::from_secs(5)).unwrap();
        let outcome = client
            .run(&[request(
                "/",
                ResponseExpectation {
                    ok: Some(true),
                    status: Some(200),
                    body_contains: Some("Swag Labs".into()),
                },
            )])
            .await;

        assert!(outcome.passed(), "{:?}", outcome.error);
        assert_eq!(outcome.steps.len(), 1);
        assert_eq!(outcome.steps[0].step_name, "request:GET /");
    }

    #[tokio::test]
    async fn test_server_error_fails_and_stops() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/");
                then.status(503);
            })
            .await;

        let client = ApiClient::new(server.base_url(), Duration::from_secs(5)).unwrap();
        let ok = ResponseExpectation { ok: Some(true), ..Default::default() };
        let outcome = client.run(&[request("/", ok.clone()), request("/", ok)]).await;

        assert!(!outcome.passed());
        assert_eq!(outcome.steps.len(), 1);
        let error = outcome.error.unwrap();
        assert!(error.contains("expect(response.ok()).toBe(true)"), "{error}");
        assert!(error.contains("503"), "{error}");
    }

    #[test]
    fn test_body_expectation() {
        let expect = ResponseExpectation {
            body_contains: Some("Products".into()),
            ..Default::default()
        };
        assert!(check_response(&expect, reqwest::StatusCode::OK, "All Products").is_ok());
        assert!(check_response(&expect, reqwest::StatusCode::OK, "nothing").is_err());
    }
}
