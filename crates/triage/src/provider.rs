//! Failure help provider

use std::sync::Arc;
use tracing::{debug, warn};

use crate::client::{ChatCompletion, ChatMessage, ChatRequest, GroqClient};
use crate::config::{TriageConfig, API_KEY_ENV};
use crate::context::FailureContext;
use crate::error::{TriageError, TriageResult};
use crate::prompt::{build_prompt, SYSTEM_PROMPT};

/// Produces a plain-text explanation for a failed test.
///
/// Cheap to clone and safe to share between workers.
#[derive(Clone)]
pub struct FailureHelpProvider {
    config: TriageConfig,
    client: Option<Arc<dyn ChatCompletion>>,
}

impl FailureHelpProvider {
    /// Create a provider backed by [`GroqClient`].
    ///
    /// Without a credential no client is built and every call falls back.
    pub fn new(config: TriageConfig) -> TriageResult<Self> {
        let client = match config.credential() {
            Some(key) => {
                let client = GroqClient::new(config.endpoint.clone(), key, config.request_timeout)?;
                Some(Arc::new(client) as Arc<dyn ChatCompletion>)
            }
            None => None,
        };
        Ok(Self { config, client })
    }

    /// Create a provider with an injected completion client.
    pub fn with_client(config: TriageConfig, client: Arc<dyn ChatCompletion>) -> Self {
        Self { config, client: Some(client) }
    }

    pub fn config(&self) -> &TriageConfig {
        &self.config
    }

    /// Explain a failure. Never fails; remote problems become the reason
    /// line of the fallback text.
    pub async fn get_failure_help(&self, context: &FailureContext) -> String {
        match self.remote_help(context).await {
            Ok(text) => text,
            Err(TriageError::MissingCredential(var)) => {
                debug!("{} not set, using static guidance", var);
                fallback_explanation(context, &TriageError::MissingCredential(var).to_string())
            }
            Err(e) => {
                warn!("Failure help unavailable for '{}': {}", context.test_title, e);
                fallback_explanation(context, &e.to_string())
            }
        }
    }

    async fn remote_help(&self, context: &FailureContext) -> TriageResult<String> {
        let client = match (self.config.credential(), &self.client) {
            (Some(_), Some(client)) => client,
            (Some(_), None) => {
                return Err(TriageError::Client("no completion client configured".to_string()))
            }
            (None, _) => return Err(TriageError::MissingCredential(API_KEY_ENV.to_string())),
        };

        let request = ChatRequest {
            model: self.config.model.clone(),
            temperature: self.config.temperature,
            max_tokens: self.config.max_tokens,
            messages: vec![
                ChatMessage::system(SYSTEM_PROMPT),
                ChatMessage::user(build_prompt(context)),
            ],
        };

        let response = client.complete(&request).await?;
        response
            .first_text()
            .map(str::to_string)
            .ok_or(TriageError::EmptyResponse)
    }
}

/// Static guidance used whenever remote help cannot be obtained.
pub fn fallback_explanation(context: &FailureContext, reason: &str) -> String {
    format!(
        "Could not fetch Groq guidance. Reason: {reason}\n\
         \n\
         Generic debugging tips:\n\
         - Check that the locators used in {file} are still stable (prefer test ids or roles).\n\
         - Confirm the app is in the expected state before the failing assertion.\n\
         - Open the recorded trace or video for this test to see the last successful action.\n\
         - Retry with an explicit wait on the element or URL the test depends on.",
        reason = reason,
        file = context.file,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::ChatResponse;
    use async_trait::async_trait;
    use std::sync::Mutex;

    /// Completion client returning a canned outcome and recording requests.
    struct FakeClient {
        outcome: fn() -> TriageResult<ChatResponse>,
        requests: Mutex<Vec<ChatRequest>>,
    }

    impl FakeClient {
        fn new(outcome: fn() -> TriageResult<ChatResponse>) -> Arc<Self> {
            Arc::new(Self { outcome, requests: Mutex::new(Vec::new()) })
        }

        fn calls(&self) -> usize {
            self.requests.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl ChatCompletion for FakeClient {
        async fn complete(&self, request: &ChatRequest) -> TriageResult<ChatResponse> {
            self.requests.lock().unwrap().push(request.clone());
            (self.outcome)()
        }
    }

    fn login_context() -> FailureContext {
        FailureContext::new(
            "Login flow",
            "shows error for invalid password",
            "login.spec",
            Some("Timeout 15000ms exceeded".into()),
            None,
        )
    }

    fn keyed() -> TriageConfig {
        TriageConfig::default().with_api_key("gsk_test")
    }

    fn bullets(text: &str) -> usize {
        text.lines().filter(|l| l.starts_with("- ")).count()
    }

    #[tokio::test]
    async fn test_no_credential_falls_back_without_calling_client() {
        let fake = FakeClient::new(|| Ok(ChatResponse::from_text("should not be used")));
        let provider = FailureHelpProvider::with_client(TriageConfig::default(), fake.clone());

        let help = provider.get_failure_help(&login_context()).await;

        assert!(help.starts_with("Could not fetch Groq guidance. Reason: "));
        assert!(help.contains("credential not set"));
        assert_eq!(bullets(&help), 4);
        assert!(help.contains("login.spec"));
        assert_eq!(fake.calls(), 0);
    }

    #[tokio::test]
    async fn test_default_provider_without_key_is_deterministic() {
        let provider = FailureHelpProvider::new(TriageConfig::default()).unwrap();
        let first = provider.get_failure_help(&login_context()).await;
        let second = provider.get_failure_help(&login_context()).await;

        assert_eq!(first, second);
        assert_eq!(
            first,
            fallback_explanation(&login_context(), "GROQ_API_KEY credential not set")
        );
    }

    #[tokio::test]
    async fn test_client_error_reason_is_embedded() {
        let fake = FakeClient::new(|| Err(TriageError::Client("connection reset by peer".into())));
        let provider = FailureHelpProvider::with_client(keyed(), fake.clone());

        let help = provider.get_failure_help(&login_context()).await;

        assert!(help.starts_with("Could not fetch Groq guidance. Reason: connection reset by peer"));
        assert_eq!(bullets(&help), 4);
        assert_eq!(fake.calls(), 1);
    }

    #[tokio::test]
    async fn test_empty_completion_falls_back() {
        for outcome in [
            (|| Ok(ChatResponse::from_text("  \n "))) as fn() -> TriageResult<ChatResponse>,
            || Ok(ChatResponse::default()),
        ] {
            let provider = FailureHelpProvider::with_client(keyed(), FakeClient::new(outcome));
            let help = provider.get_failure_help(&login_context()).await;
            assert!(help.contains("Reason: empty response"), "{help}");
        }
    }

    #[tokio::test]
    async fn test_completion_returned_trimmed_verbatim() {
        let fake = FakeClient::new(|| Ok(ChatResponse::from_text("\n  X  \n")));
        let provider = FailureHelpProvider::with_client(keyed(), fake.clone());

        assert_eq!(provider.get_failure_help(&login_context()).await, "X");
    }

    #[tokio::test]
    async fn test_request_parameters() {
        let fake = FakeClient::new(|| Ok(ChatResponse::from_text("ok")));
        let provider = FailureHelpProvider::with_client(keyed(), fake.clone());
        provider.get_failure_help(&login_context()).await;

        let requests = fake.requests.lock().unwrap();
        assert_eq!(requests.len(), 1);
        let request = &requests[0];
        assert_eq!(request.model, "llama-3.1-8b-instant");
        assert_eq!(request.temperature, 0.2);
        assert_eq!(request.max_tokens, 450);
        assert_eq!(request.messages.len(), 2);
        assert_eq!(request.messages[0].role, "system");
        assert!(request.messages[0].content.contains("Playwright"));
        assert_eq!(request.messages[1].role, "user");
        assert!(request.messages[1].content.contains("Timeout 15000ms exceeded"));
    }
}
