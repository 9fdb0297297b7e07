//! Chat-completion client

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{TriageError, TriageResult};

/// One message in a chat conversation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self { role: "system".to_string(), content: content.into() }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self { role: "user".to_string(), content: content.into() }
    }
}

/// Request body for an OpenAI-compatible chat-completion endpoint
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatRequest {
    pub model: String,
    pub temperature: f32,
    pub max_tokens: u32,
    pub messages: Vec<ChatMessage>,
}

/// Response body; only the fields triage reads are modelled.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChatResponse {
    #[serde(default)]
    pub choices: Vec<ChatChoice>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChatChoice {
    #[serde(default)]
    pub message: Option<ChoiceMessage>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChoiceMessage {
    #[serde(default)]
    pub content: Option<String>,
}

impl ChatResponse {
    /// Build a response carrying a single completion.
    pub fn from_text(text: impl Into<String>) -> Self {
        Self {
            choices: vec![ChatChoice {
                message: Some(ChoiceMessage { content: Some(text.into()) }),
            }],
        }
    }

    /// The first choice's text, trimmed; `None` when absent or blank.
    pub fn first_text(&self) -> Option<&str> {
        self.choices
            .first()
            .and_then(|c| c.message.as_ref())
            .and_then(|m| m.content.as_deref())
            .map(str::trim)
            .filter(|t| !t.is_empty())
    }
}

/// Capability to complete a chat conversation.
#[async_trait]
pub trait ChatCompletion: Send + Sync {
    async fn complete(&self, request: &ChatRequest) -> TriageResult<ChatResponse>;
}

/// Groq (OpenAI-compatible) chat-completion client
pub struct GroqClient {
    http: reqwest::Client,
    endpoint: String,
    api_key: String,
    timeout: Option<std::time::Duration>,
}

impl GroqClient {
    pub fn new(
        endpoint: impl Into<String>,
        api_key: impl Into<String>,
        timeout: Option<std::time::Duration>,
    ) -> TriageResult<Self> {
        let mut builder = reqwest::Client::builder();
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }

        Ok(Self {
            http: builder.build()?,
            endpoint: endpoint.into(),
            api_key: api_key.into(),
            timeout,
        })
    }

    /// Client-side timeouts are reported with the configured limit.
    fn http_error(&self, err: reqwest::Error) -> TriageError {
        match self.timeout {
            Some(timeout) if err.is_timeout() => TriageError::Timeout(timeout),
            _ => TriageError::Http(err),
        }
    }
}

#[async_trait]
impl ChatCompletion for GroqClient {
    async fn complete(&self, request: &ChatRequest) -> TriageResult<ChatResponse> {
        debug!("POST {} (model {})", self.endpoint, request.model);

        let resp = self
            .http
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(request)
            .send()
            .await
            .map_err(|e| self.http_error(e))?;

        let status = resp.status();
        let body = resp.text().await.map_err(|e| self.http_error(e))?;

        if !status.is_success() {
            return Err(TriageError::Status {
                status: status.as_u16(),
                body: body.chars().take(200).collect(),
            });
        }

        Ok(serde_json::from_str(&body)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::prelude::*;
    use serde_json::json;

    fn request() -> ChatRequest {
        ChatRequest {
            model: "llama-3.1-8b-instant".into(),
            temperature: 0.2,
            max_tokens: 450,
            messages: vec![ChatMessage::system("sys"), ChatMessage::user("why?")],
        }
    }

    #[test]
    fn test_first_text_variants() {
        assert_eq!(ChatResponse::from_text("  hint \n").first_text(), Some("hint"));
        assert_eq!(ChatResponse::from_text("   ").first_text(), None);
        assert_eq!(ChatResponse::default().first_text(), None);

        let no_content: ChatResponse =
            serde_json::from_value(json!({"choices": [{"message": {}}]})).unwrap();
        assert_eq!(no_content.first_text(), None);
    }

    #[tokio::test]
    async fn test_groq_client_posts_chat_request() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/openai/v1/chat/completions")
                    .header("authorization", "Bearer gsk_test")
                    .body_contains("\"model\":\"llama-3.1-8b-instant\"")
                    .body_contains("\"max_tokens\":450")
                    .body_contains("\"role\":\"system\"");
                then.status(200).json_body(json!({
                    "choices": [{"message": {"role": "assistant", "content": "Likely cause: slow page"}}]
                }));
            })
            .await;

        let client = GroqClient::new(server.url("/openai/v1/chat/completions"), "gsk_test", None).unwrap();
        let resp = client.complete(&request()).await.unwrap();

        assert_eq!(resp.first_text(), Some("Likely cause: slow page"));
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_groq_client_reports_status() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/chat");
                then.status(401).body("invalid api key");
            })
            .await;

        let client = GroqClient::new(server.url("/chat"), "bad", None).unwrap();
        let err = client.complete(&request()).await.unwrap_err();

        assert!(matches!(err, TriageError::Status { status: 401, .. }));
        assert!(err.to_string().contains("invalid api key"));
    }

    #[tokio::test]
    async fn test_groq_client_rejects_malformed_body() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/chat");
                then.status(200).body("<html>gateway</html>");
            })
            .await;

        let client = GroqClient::new(server.url("/chat"), "gsk_test", None).unwrap();
        let err = client.complete(&request()).await.unwrap_err();

        assert!(matches!(err, TriageError::Decode(_)));
    }
}
