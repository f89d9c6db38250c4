//! Hosted chat-completion model.
//!
//! [`ChatModel`] is the seam between the retrieval session and whatever
//! produces answers. [`OpenAIChat`] calls an OpenAI-compatible
//! `/chat/completions` endpoint with a fixed temperature; tests swap in
//! scripted fakes.

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::config::ChatConfig;
use crate::http::{self, ServiceError};
use crate::models::{Speaker, Turn};

/// Failure of a chat completion call.
pub type ChatError = ServiceError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// One message of a chat-completion request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
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

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

impl From<&Turn> for ChatMessage {
    fn from(turn: &Turn) -> Self {
        match turn.speaker {
            Speaker::User => ChatMessage::user(turn.text.clone()),
            Speaker::Assistant => ChatMessage::assistant(turn.text.clone()),
        }
    }
}

#[async_trait]
pub trait ChatModel: Send + Sync {
    fn model_name(&self) -> &str;
    /// Complete `messages` and return the assistant's reply text.
    async fn complete(&self, messages: &[ChatMessage]) -> Result<String, ChatError>;
}

/// Chat model backed by the OpenAI chat-completions API.
///
/// Calls `POST {base_url}/chat/completions` with a bearer token. Requests
/// are never retried.
pub struct OpenAIChat {
    client: reqwest::Client,
    api_key: String,
    url: String,
    model: String,
    temperature: f32,
}

impl OpenAIChat {
    pub fn new(config: &ChatConfig, api_key: &str) -> Result<Self> {
        Ok(Self {
            client: http::client(config.timeout_secs)?,
            api_key: api_key.to_string(),
            url: format!(
                "{}/chat/completions",
                config.base_url.trim_end_matches('/')
            ),
            model: config.model.clone(),
            temperature: config.temperature,
        })
    }
}

#[derive(Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    temperature: f32,
}

#[derive(Deserialize)]
struct CompletionResponse {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ReplyMessage,
}

#[derive(Deserialize)]
struct ReplyMessage {
    #[serde(default)]
    content: Option<String>,
}

#[async_trait]
impl ChatModel for OpenAIChat {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn complete(&self, messages: &[ChatMessage]) -> Result<String, ChatError> {
        let body = serde_json::to_value(CompletionRequest {
            model: &self.model,
            messages,
            temperature: self.temperature,
        })
        .map_err(|e| ServiceError::InvalidResponse(e.to_string()))?;

        let json = http::post_json(&self.client, &self.url, Some(&self.api_key), &body, 0).await?;
        parse_completion(json)
    }
}

fn parse_completion(json: serde_json::Value) -> Result<String, ChatError> {
    let response: CompletionResponse = serde_json::from_value(json)
        .map_err(|e| ServiceError::InvalidResponse(e.to_string()))?;
    response
        .choices
        .into_iter()
        .next()
        .and_then(|c| c.message.content)
        .ok_or_else(|| ServiceError::InvalidResponse("completion has no content".to_string()))
}
