use std::time::Duration;

use async_trait::async_trait;
use once_cell::sync::Lazy;
use reqwest::{Client, ClientBuilder, StatusCode};

use crate::retry::{self, Backoff};

/// Hard ceiling for one generation attempt.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

const MAX_ATTEMPTS: u32 = 3;

static CLIENT: Lazy<Client> = Lazy::new(|| {
    ClientBuilder::new()
        .timeout(REQUEST_TIMEOUT)
        .connect_timeout(Duration::from_secs(5))
        .build()
        .expect("Failed to build HTTP client")
});

#[derive(Debug, thiserror::Error)]
pub enum GenerationError {
    #[error("rate limited by the generation service")]
    RateLimited,

    #[error("generation service error (HTTP {0})")]
    ServerError(u16),

    #[error("generation request timed out after {0:?}")]
    Timeout(Duration),

    #[error("connection to the generation service failed: {0}")]
    Connection(String),

    #[error("generation request rejected (HTTP {status}): {message}")]
    Rejected { status: u16, message: String },

    #[error("unusable generation response: {0}")]
    Malformed(String),
}

impl GenerationError {
    /// Transient failures are worth another attempt; everything else aborts
    /// the retry loop.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            GenerationError::RateLimited
                | GenerationError::ServerError(_)
                | GenerationError::Timeout(_)
                | GenerationError::Connection(_)
        )
    }
}

#[derive(Debug, Clone, Copy)]
pub struct GenerationOptions {
    pub temperature: f32,
    pub max_output_tokens: Option<u32>,
}

#[async_trait]
pub trait TextGenerator: Send + Sync {
    async fn generate(
        &self,
        prompt: &str,
        options: GenerationOptions,
    ) -> Result<String, GenerationError>;

    /// Token count for usage accounting. Implementations with a real counting
    /// endpoint override this; the default is the character estimate.
    async fn count_tokens(&self, text: &str) -> u64 {
        estimate_tokens(text)
    }
}

/// Four characters per token, rounded up.
pub fn estimate_tokens(text: &str) -> u64 {
    (text.chars().count() as u64).div_ceil(4)
}

fn classify_transport(err: reqwest::Error) -> GenerationError {
    if err.is_timeout() {
        GenerationError::Timeout(REQUEST_TIMEOUT)
    } else {
        GenerationError::Connection(err.to_string())
    }
}

fn classify_status(status: StatusCode, message: String) -> GenerationError {
    if status == StatusCode::TOO_MANY_REQUESTS {
        GenerationError::RateLimited
    } else if status.is_server_error() {
        GenerationError::ServerError(status.as_u16())
    } else {
        GenerationError::Rejected {
            status: status.as_u16(),
            message,
        }
    }
}

pub struct GeminiClient {
    api_key: String,
    model: String,
    base_url: String,
}

impl GeminiClient {
    pub fn new(
        api_key: impl Into<String>,
        model: impl Into<String>,
        base_url: impl Into<String>,
    ) -> Self {
        GeminiClient {
            api_key: api_key.into(),
            model: model.into(),
            base_url: base_url.into(),
        }
    }

    async fn generate_once(
        &self,
        prompt: &str,
        options: GenerationOptions,
    ) -> Result<String, GenerationError> {
        let url = format!(
            "{}/v1beta/models/{}:generateContent",
            self.base_url, self.model
        );

        let mut generation_config = serde_json::Map::new();
        generation_config.insert(
            "temperature".to_string(),
            serde_json::json!(options.temperature),
        );
        if let Some(max) = options.max_output_tokens {
            generation_config.insert("maxOutputTokens".to_string(), serde_json::json!(max));
        }

        let body = serde_json::json!({
            "contents": [{ "role": "user", "parts": [{ "text": prompt }] }],
            "generationConfig": generation_config,
        });

        let response = CLIENT
            .post(&url)
            .header("x-goog-api-key", &self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(classify_transport)?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(classify_status(status, message));
        }

        let json: serde_json::Value = response
            .json()
            .await
            .map_err(|e| GenerationError::Malformed(e.to_string()))?;

        let text = json["candidates"][0]["content"]["parts"][0]["text"]
            .as_str()
            .ok_or_else(|| GenerationError::Malformed("missing candidate text".to_string()))?
            .to_string();

        Ok(text)
    }

    // One shot, no retry; callers fall back to the estimate on failure
    async fn count_tokens_remote(&self, text: &str) -> Result<u64, GenerationError> {
        let url = format!("{}/v1beta/models/{}:countTokens", self.base_url, self.model);
        let body = serde_json::json!({
            "contents": [{ "role": "user", "parts": [{ "text": text }] }],
        });

        let response = CLIENT
            .post(&url)
            .header("x-goog-api-key", &self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(classify_transport)?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(classify_status(status, message));
        }

        let json: serde_json::Value = response
            .json()
            .await
            .map_err(|e| GenerationError::Malformed(e.to_string()))?;

        json["totalTokens"]
            .as_u64()
            .ok_or_else(|| GenerationError::Malformed("missing totalTokens".to_string()))
    }
}

#[async_trait]
impl TextGenerator for GeminiClient {
    async fn generate(
        &self,
        prompt: &str,
        options: GenerationOptions,
    ) -> Result<String, GenerationError> {
        retry::run(
            || self.generate_once(prompt, options),
            GenerationError::is_transient,
            MAX_ATTEMPTS,
            Backoff {
                base: Duration::from_millis(500),
                max_jitter: Duration::from_millis(200),
            },
        )
        .await
    }

    async fn count_tokens(&self, text: &str) -> u64 {
        match self.count_tokens_remote(text).await {
            Ok(count) => count,
            Err(err) => {
                tracing::debug!("token count endpoint unavailable, estimating: {}", err);
                estimate_tokens(text)
            }
        }
    }
}
