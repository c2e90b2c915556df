pub mod http;

use async_trait::async_trait;
use serde::Serialize;

use crate::error::ConsultError;

/// Generation settings shared by every call in a run.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GenerationParams {
    pub max_tokens: u32,
    /// Sampling temperature (0 = deterministic, higher = more varied).
    pub temperature: f64,
}

impl GenerationParams {
    pub const DEFAULT_MAX_TOKENS: u32 = 2000;
    pub const DEFAULT_TEMPERATURE: f64 = 0.7;
}

impl Default for GenerationParams {
    fn default() -> Self {
        Self {
            max_tokens: Self::DEFAULT_MAX_TOKENS,
            temperature: Self::DEFAULT_TEMPERATURE,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }
}

/// One chat-completion call. Serializes directly as the OpenAI-compatible request body.
#[derive(Debug, Clone, Serialize)]
pub struct ChatRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    pub max_tokens: u32,
    pub temperature: f64,
}

impl ChatRequest {
    /// Single-turn request carrying `prompt` as the only user message.
    pub fn single_turn(model: &str, prompt: &str, params: &GenerationParams) -> Self {
        Self {
            model: model.to_string(),
            messages: vec![ChatMessage::user(prompt)],
            max_tokens: params.max_tokens,
            temperature: params.temperature,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ChatResponse {
    /// Text of the first completion.
    pub text: String,
    /// Total token usage, when the backend reports it.
    pub total_tokens: Option<u64>,
}

/// The chat-completion backend consumed by the runner.
#[async_trait]
pub trait ChatClient: Send + Sync {
    async fn complete(&self, req: &ChatRequest) -> Result<ChatResponse, ConsultError>;
}
