use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, error, instrument};

use crate::message::Message;

const COMPLETIONS_PATH: &str = "/chat/completions";

#[derive(Debug, Error)]
pub enum CompletionError {
    #[error("request to completion endpoint failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("completion endpoint returned {status}: {body}")]
    Api { status: u16, body: String },
    #[error("failed to parse completion response: {0}")]
    Decode(#[source] serde_json::Error),
    #[error("completion response contained no choices")]
    NoChoices,
}

/// Anything that can turn a system instruction plus a message history into assistant text.
#[async_trait]
pub trait CompletionClient: Send + Sync {
    /// Returns the text of the first completion. An empty string means the
    /// endpoint answered without content.
    async fn complete(&self, system: &str, history: &[Message]) -> Result<String, CompletionError>;
}

// Structures matching the OpenAI-compatible /chat/completions endpoint
#[derive(Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: Vec<&'a Message>,
}

#[derive(Deserialize, Debug)]
struct ChatCompletionResponse {
    choices: Vec<Choice>,
}

#[derive(Deserialize, Debug)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Deserialize, Debug)]
struct ChoiceMessage {
    // DeepSeek sends `null` here on some refusals
    content: Option<String>,
}

/// HTTP client for DeepSeek's chat-completion API (or any OpenAI-compatible server).
pub struct DeepSeekClient {
    client: Client,
    api_key: String,
    model: String,
    url: String,
}

impl DeepSeekClient {
    pub fn new(
        api_key: impl Into<String>,
        base_url: impl Into<String>,
        model: impl Into<String>,
    ) -> Self {
        let base: String = base_url.into();
        let url = format!("{}{}", base.trim_end_matches('/'), COMPLETIONS_PATH);
        Self {
            client: Client::new(),
            api_key: api_key.into(),
            model: model.into(),
            url,
        }
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl CompletionClient for DeepSeekClient {
    #[instrument(skip_all, fields(model = %self.model, messages = history.len() + 1))]
    async fn complete(&self, system: &str, history: &[Message]) -> Result<String, CompletionError> {
        let system_message = Message::system(system);
        let mut messages = Vec::with_capacity(history.len() + 1);
        messages.push(&system_message);
        messages.extend(history.iter());

        let request_payload = ChatCompletionRequest {
            model: &self.model,
            messages,
        };

        let response = self
            .client
            .post(&self.url)
            .bearer_auth(&self.api_key)
            .json(&request_payload)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "Failed to read error body".to_string());
            error!(%status, %body, "Completion API request failed");
            return Err(CompletionError::Api {
                status: status.as_u16(),
                body,
            });
        }

        let bytes = response.bytes().await?;
        let parsed: ChatCompletionResponse =
            serde_json::from_slice(&bytes).map_err(CompletionError::Decode)?;

        let content = parsed
            .choices
            .into_iter()
            .next()
            .ok_or(CompletionError::NoChoices)?
            .message
            .content
            .unwrap_or_default();

        debug!(chars = content.len(), "Received completion");
        Ok(content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_url_joins_without_double_slash() {
        let client = DeepSeekClient::new("key", "https://api.deepseek.com/", "deepseek-chat");
        assert_eq!(client.url(), "https://api.deepseek.com/chat/completions");
        assert_eq!(client.model(), "deepseek-chat");
    }

    #[test]
    fn test_null_content_deserializes() {
        let body = r#"{"choices":[{"index":0,"message":{"role":"assistant","content":null}}]}"#;
        let parsed: ChatCompletionResponse = serde_json::from_str(body).unwrap();
        assert!(parsed.choices[0].message.content.is_none());
    }

    #[test]
    fn test_request_serializes_messages_in_order() {
        let system = Message::system("be nice");
        let user = Message::user("hi");
        let request = ChatCompletionRequest {
            model: "deepseek-chat",
            messages: vec![&system, &user],
        };
        let value = serde_json::to_value(&request).unwrap();
        assert_eq!(
            value,
            serde_json::json!({
                "model": "deepseek-chat",
                "messages": [
                    {"role": "system", "content": "be nice"},
                    {"role": "user", "content": "hi"}
                ]
            })
        );
    }
}
