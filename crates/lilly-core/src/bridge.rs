//! OpenAI completion bridge used by the gateway.
//!
//! One system turn (the persona preamble) plus one user turn per request.
//! Provider failures are folded into three categories so the gateway can hand
//! the client an Arabic message it can show verbatim.
//!
//! API key: `OPENAI_API_KEY` in `.env`. Default model: `gpt-4o`.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

const OPENAI_API_BASE: &str = "https://api.openai.com/v1";

/// Model used when `OPENAI_MODEL` is unset.
pub const DEFAULT_MODEL: &str = "gpt-4o";

// OpenAI chat-completions request/response shapes.
#[derive(Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
}

#[derive(Serialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatMessageResponse,
}

#[derive(Deserialize)]
struct ChatMessageResponse {
    content: String,
}

/// Provider failure, categorized for client display.
#[derive(Debug, thiserror::Error)]
pub enum UpstreamError {
    /// The provider rejected our key (HTTP 401 or an "invalid api key" body).
    #[error("provider rejected the configured api key")]
    InvalidCredential,
    /// The provider throttled us (HTTP 429 or a "rate limit" body).
    #[error("provider rate limit reached")]
    RateLimited,
    /// Everything else: transport errors, 5xx, unparseable replies.
    #[error("provider request failed: {0}")]
    Other(String),
}

impl UpstreamError {
    /// Categorize a provider error body by status and text.
    fn categorize(status: u16, body: &str) -> Self {
        let lower = body.to_lowercase();
        if status == 401 || lower.contains("invalid api key") || lower.contains("incorrect api key") {
            UpstreamError::InvalidCredential
        } else if status == 429 || lower.contains("rate limit") {
            UpstreamError::RateLimited
        } else {
            UpstreamError::Other(format!("OpenAI API error {}: {}", status, body))
        }
    }

    /// The Arabic message the client shows for this failure.
    pub fn user_message(&self) -> &'static str {
        match self {
            UpstreamError::InvalidCredential => "مامي، مفتاح OpenAI غير صحيح لدى الخادم.",
            UpstreamError::RateLimited => "مامي، تم بلوغ حد المزود مؤقتًا. أعيدي المحاولة بعد قليل.",
            UpstreamError::Other(_) => "عذرًا مامي، حدث خطأ من المزود.",
        }
    }
}

/// OpenAI chat-completions client. Construct once at startup and share.
pub struct CompletionBridge {
    api_key: String,
    model: String,
    client: reqwest::Client,
}

impl CompletionBridge {
    /// Create a bridge from `OPENAI_API_KEY`. Returns `None` when the key is
    /// missing or blank so the gateway can start without chat and say so.
    pub fn from_env() -> Option<Self> {
        let key = std::env::var("OPENAI_API_KEY").ok()?.trim().to_string();
        if key.is_empty() {
            return None;
        }
        Some(Self::new(key))
    }

    /// Create a bridge with an explicit API key.
    pub fn new(api_key: String) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(60))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self {
            api_key: api_key.trim().to_string(),
            model: DEFAULT_MODEL.to_string(),
            client,
        }
    }

    /// Set the model (e.g. `gpt-4o`, `gpt-4o-mini`).
    pub fn with_model(mut self, model: &str) -> Self {
        self.model = model.to_string();
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// One completion turn: the persona preamble as the system message, the
    /// user's line as the user message.
    pub async fn complete(&self, system: &str, user: &str) -> Result<String, UpstreamError> {
        let url = format!("{}/chat/completions", OPENAI_API_BASE);
        let body = ChatRequest {
            model: self.model.clone(),
            messages: vec![
                ChatMessage {
                    role: "system".to_string(),
                    content: system.to_string(),
                },
                ChatMessage {
                    role: "user".to_string(),
                    content: user.to_string(),
                },
            ],
            temperature: Some(0.7),
            max_tokens: Some(800),
        };

        let res = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| UpstreamError::Other(format!("OpenAI request failed: {}", e)))?;

        if !res.status().is_success() {
            let status = res.status().as_u16();
            let body = res.text().await.unwrap_or_default();
            debug!(target: "lilly::bridge", status, "provider returned an error body");
            return Err(UpstreamError::categorize(status, &body));
        }

        let parsed: ChatResponse = res
            .json()
            .await
            .map_err(|e| UpstreamError::Other(format!("OpenAI response parse failed: {}", e)))?;

        let text = parsed
            .choices
            .first()
            .map(|c| c.message.content.trim().to_string())
            .unwrap_or_default();

        if text.is_empty() {
            return Err(UpstreamError::Other("empty completion".to_string()));
        }
        Ok(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_categorization() {
        assert!(matches!(
            UpstreamError::categorize(401, "whatever"),
            UpstreamError::InvalidCredential
        ));
        assert!(matches!(
            UpstreamError::categorize(400, "Incorrect API key provided"),
            UpstreamError::InvalidCredential
        ));
        assert!(matches!(
            UpstreamError::categorize(429, ""),
            UpstreamError::RateLimited
        ));
        assert!(matches!(
            UpstreamError::categorize(400, "You exceeded your rate limit"),
            UpstreamError::RateLimited
        ));
        assert!(matches!(
            UpstreamError::categorize(500, "boom"),
            UpstreamError::Other(_)
        ));
    }

    #[test]
    fn test_model_defaults_and_override() {
        let bridge = CompletionBridge::new("  sk-test  ".to_string());
        assert_eq!(bridge.model(), DEFAULT_MODEL);
        let bridge = bridge.with_model("gpt-4o-mini");
        assert_eq!(bridge.model(), "gpt-4o-mini");
    }
}
