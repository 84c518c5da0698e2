//! Blocking client for an OpenAI-compatible chat-completions endpoint.

use crate::config::ServiceConfig;
use deck_core::{Error, ServiceError, ServiceResult};
use reqwest::blocking::Client;
use serde::{Deserialize, Serialize};

/// Speaker of a chat message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }
}

/// Anything that turns a conversation into a single reply.
pub trait Completion: Send + Sync {
    fn complete(&self, messages: &[ChatMessage]) -> ServiceResult<String>;
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    temperature: f32,
    messages: &'a [ChatMessage],
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    content: Option<String>,
}

/// HTTP client for the chat-completions API.
#[derive(Debug, Clone)]
pub struct ChatClient {
    client: Client,
    url: String,
    api_key: String,
    model: String,
    temperature: f32,
}

impl ChatClient {
    pub fn new(config: &ServiceConfig) -> deck_core::Result<Self> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| Error::Config(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            url: config.completions_url(),
            api_key: config.api_key.clone(),
            model: config.model.clone(),
            temperature: config.temperature,
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }
}

impl Completion for ChatClient {
    fn complete(&self, messages: &[ChatMessage]) -> ServiceResult<String> {
        let request = ChatRequest {
            model: &self.model,
            temperature: self.temperature,
            messages,
        };

        let response = self
            .client
            .post(&self.url)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .map_err(|e| ServiceError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let message = response
                .text()
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(ServiceError::Status {
                status: status.as_u16(),
                message,
            });
        }

        let body = response
            .text()
            .map_err(|e| ServiceError::Transport(e.to_string()))?;
        reply_content(&body)
    }
}

/// Content of the first choice of a chat-completions response body.
fn reply_content(body: &str) -> ServiceResult<String> {
    let response: ChatResponse =
        serde_json::from_str(body).map_err(|e| ServiceError::Malformed(e.to_string()))?;

    let content = response
        .choices
        .into_iter()
        .next()
        .and_then(|choice| choice.message.content)
        .unwrap_or_default();

    if content.trim().is_empty() {
        return Err(ServiceError::EmptyResponse);
    }
    Ok(content)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_shape() {
        let messages = vec![ChatMessage::system("be brief"), ChatMessage::user("hi")];
        let request = ChatRequest {
            model: "gpt-4o",
            temperature: 0.1,
            messages: &messages,
        };
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["model"], "gpt-4o");
        assert_eq!(json["messages"][0]["role"], "system");
        assert_eq!(json["messages"][1]["content"], "hi");
    }

    #[test]
    fn test_reply_content() {
        let body = r#"{"id":"x","choices":[{"index":0,"message":{"role":"assistant","content":"Hello"}}]}"#;
        assert_eq!(reply_content(body).unwrap(), "Hello");
    }

    #[test]
    fn test_reply_without_content() {
        assert_eq!(
            reply_content(r#"{"choices":[]}"#),
            Err(ServiceError::EmptyResponse)
        );
        assert_eq!(
            reply_content(r#"{"choices":[{"message":{"content":null}}]}"#),
            Err(ServiceError::EmptyResponse)
        );
        assert_eq!(
            reply_content(r#"{"choices":[{"message":{"content":"  "}}]}"#),
            Err(ServiceError::EmptyResponse)
        );
    }

    #[test]
    fn test_reply_not_json() {
        assert!(matches!(
            reply_content("<html>bad gateway</html>"),
            Err(ServiceError::Malformed(_))
        ));
    }
}
