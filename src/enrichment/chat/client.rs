//! Chat-completion HTTP client
//!
//! Sends a single user message and returns the assistant's text. Status
//! codes are classified into transient and fatal [`ProviderError`]s here so
//! the retry layer never has to look at HTTP details.

use std::time::Duration;

use super::{adapter, dto};
use crate::enrichment::domain::ProviderError;

/// Client for one OpenAI-compatible endpoint
pub struct ChatClient {
    provider: String,
    http_client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
}

impl ChatClient {
    /// Create a client for `base_url` (e.g. `https://api.openai.com/v1`).
    ///
    /// `provider` names the service for rate limiting and cache keys.
    pub fn new(
        provider: impl Into<String>,
        base_url: impl Into<String>,
        api_key: Option<String>,
        timeout: Duration,
    ) -> Result<Self, ProviderError> {
        let http_client = reqwest::Client::builder()
            .gzip(true)
            .timeout(timeout)
            .user_agent(concat!(
                env!("CARGO_PKG_NAME"),
                "/",
                env!("CARGO_PKG_VERSION")
            ))
            .build()
            .map_err(|e| ProviderError::Network(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            provider: provider.into(),
            http_client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key,
        })
    }

    pub fn provider(&self) -> &str {
        &self.provider
    }

    /// Ask `model` to answer `prompt` with a JSON object; returns the raw text.
    pub async fn complete(&self, model: &str, prompt: &str) -> Result<String, ProviderError> {
        let request = dto::ChatRequest::json_prompt(model, prompt);

        let mut builder = self
            .http_client
            .post(format!("{}/chat/completions", self.base_url))
            .json(&request);
        if let Some(key) = &self.api_key {
            builder = builder.bearer_auth(key);
        }

        let response = builder.send().await.map_err(transport_error)?;

        let status = response.status();
        if !status.is_success() {
            let retry_after = response
                .headers()
                .get(reqwest::header::RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.trim().parse::<u64>().ok())
                .map(Duration::from_secs);
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::from_status(
                status.as_u16(),
                retry_after,
                adapter::error_message(&body),
            ));
        }

        let body = response
            .json::<dto::ChatResponse>()
            .await
            .map_err(|e| ProviderError::Malformed(e.to_string()))?;
        adapter::first_message(body)
    }
}

/// Map a reqwest failure that happened before a status was received.
pub(crate) fn transport_error(e: reqwest::Error) -> ProviderError {
    if e.is_timeout() {
        ProviderError::Timeout
    } else {
        ProviderError::Network(e.to_string())
    }
}
