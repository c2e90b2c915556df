use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;

use crate::config::Config;
use crate::dispatch::{ChatClient, ChatRequest, ChatResponse};
use crate::error::ConsultError;

pub const MAX_RESPONSE_BYTES: usize = 2 * 1024 * 1024; // 2MB

/// Error bodies are only quoted in messages, so keep them short.
const MAX_ERROR_BODY_CHARS: usize = 500;

/// Read limit for non-2xx bodies; only `error.message` is needed from them.
const MAX_ERROR_BODY_BYTES: usize = 64 * 1024;

pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// OpenAI-compatible chat-completions client (OpenRouter by default).
pub struct HttpClient {
    client: Client,
    provider: String,
    endpoint: String,
    api_key: Option<String>,
}

#[derive(Deserialize)]
struct ChatCompletion {
    #[serde(default)]
    choices: Vec<Choice>,
    usage: Option<Usage>,
    error: Option<ApiError>,
}

#[derive(Deserialize)]
struct Choice {
    message: Message,
}

#[derive(Deserialize)]
struct Message {
    content: Option<String>,
}

#[derive(Deserialize)]
struct Usage {
    total_tokens: Option<u64>,
}

#[derive(Deserialize)]
struct ApiError {
    message: Option<String>,
    code: Option<serde_json::Value>,
}

impl std::fmt::Debug for HttpClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpClient")
            .field("provider", &self.provider)
            .field("endpoint", &self.endpoint)
            .field("api_key", &self.api_key.as_ref().map(|_| "[REDACTED]"))
            .finish()
    }
}

impl HttpClient {
    pub fn new(
        provider: impl Into<String>,
        base_url: &str,
        api_key: Option<String>,
    ) -> Result<Self, ConsultError> {
        let client = Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .build()?;

        Ok(Self {
            client,
            provider: provider.into(),
            endpoint: completions_endpoint(base_url),
            api_key,
        })
    }

    pub fn from_config(config: &Config) -> Result<Self, ConsultError> {
        Self::new("openrouter", &config.base_url, config.api_key.clone())
    }

    fn upstream(&self, message: String, status: Option<u16>) -> ConsultError {
        ConsultError::Upstream {
            provider: self.provider.clone(),
            message,
            status,
        }
    }
}

#[async_trait]
impl ChatClient for HttpClient {
    async fn complete(&self, req: &ChatRequest) -> Result<ChatResponse, ConsultError> {
        let mut builder = self
            .client
            .post(&self.endpoint)
            .header("Content-Type", "application/json")
            .json(req);
        if let Some(key) = &self.api_key {
            builder = builder.bearer_auth(key);
        }

        let response = builder.send().await?;
        let status = response.status();

        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(ConsultError::RateLimited {
                provider: self.provider.clone(),
            });
        }

        if status == reqwest::StatusCode::UNAUTHORIZED
            || status == reqwest::StatusCode::FORBIDDEN
        {
            let body = read_error_body(response).await;
            let message = match error_message(&body) {
                Some(detail) => format!("{status}: {detail}"),
                None => format!("{status}"),
            };
            return Err(ConsultError::AuthFailed {
                provider: self.provider.clone(),
                message,
            });
        }

        if !status.is_success() {
            let text = read_error_body(response).await;
            let detail = error_message(&text).unwrap_or_else(|| truncate_chars(&text));
            return Err(self.upstream(format!("{status}: {detail}"), Some(status.as_u16())));
        }

        if let Some(len) = response.content_length()
            && len > MAX_RESPONSE_BYTES as u64
        {
            return Err(self.upstream(
                format!("response too large: {len} bytes (max {MAX_RESPONSE_BYTES})"),
                None,
            ));
        }

        let bytes = match read_capped(response, MAX_RESPONSE_BYTES)
            .await
            .map_err(|e| self.upstream(format!("failed to read response body: {e}"), None))?
        {
            CappedBody::Complete(bytes) => bytes,
            CappedBody::Exceeded(_) => {
                return Err(self.upstream(
                    format!("response too large: exceeded {MAX_RESPONSE_BYTES} bytes"),
                    None,
                ));
            }
        };

        let completion: ChatCompletion = serde_json::from_slice(&bytes)
            .map_err(|e| ConsultError::SchemaParse(format!("failed to parse response: {e}")))?;

        // OpenRouter reports some upstream failures with a 200 and an error object.
        if let Some(err) = completion.error {
            let mut message = err.message.unwrap_or_else(|| "unknown error".to_string());
            if let Some(code) = err.code {
                message = format!("{code}: {message}");
            }
            return Err(self.upstream(message, None));
        }

        let total_tokens = completion.usage.and_then(|u| u.total_tokens);
        let text = completion
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| self.upstream("empty choices or null content".to_string(), None))?;

        Ok(ChatResponse { text, total_tokens })
    }
}

enum CappedBody {
    Complete(Vec<u8>),
    /// Reading stopped once the cap was passed; holds the first `max` bytes.
    Exceeded(Vec<u8>),
}

/// Read the body chunk by chunk, stopping as soon as it grows past `max`.
async fn read_capped(
    mut response: reqwest::Response,
    max: usize,
) -> Result<CappedBody, reqwest::Error> {
    let mut buf = Vec::new();
    while let Some(chunk) = response.chunk().await? {
        let room = max.saturating_sub(buf.len());
        if chunk.len() > room {
            buf.extend_from_slice(&chunk[..room]);
            return Ok(CappedBody::Exceeded(buf));
        }
        buf.extend_from_slice(&chunk);
    }
    Ok(CappedBody::Complete(buf))
}

/// Best-effort error body text, capped at `MAX_ERROR_BODY_BYTES`.
async fn read_error_body(response: reqwest::Response) -> String {
    match read_capped(response, MAX_ERROR_BODY_BYTES).await {
        Ok(CappedBody::Complete(bytes) | CappedBody::Exceeded(bytes)) => {
            String::from_utf8_lossy(&bytes).into_owned()
        }
        Err(_) => String::new(),
    }
}

/// `{base_url}/chat/completions`, tolerating a trailing slash on the base.
pub fn completions_endpoint(base_url: &str) -> String {
    format!("{}/chat/completions", base_url.trim_end_matches('/'))
}

/// Pull `error.message` out of an OpenAI-style error body.
fn error_message(body: &str) -> Option<String> {
    let value: serde_json::Value = serde_json::from_str(body).ok()?;
    value
        .get("error")
        .and_then(|e| e.get("message"))
        .and_then(|m| m.as_str())
        .map(str::to_string)
}

fn truncate_chars(text: &str) -> String {
    let mut out: String = text.chars().take(MAX_ERROR_BODY_CHARS).collect();
    if text.chars().count() > MAX_ERROR_BODY_CHARS {
        out.push_str("...");
    }
    out
}
