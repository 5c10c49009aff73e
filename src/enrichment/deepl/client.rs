//! DeepL HTTP client and its [`TaskRuntime`] for the translation stage.

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

use super::dto;
use crate::enrichment::chat::transport_error;
use crate::enrichment::domain::{ProviderError, TranslationRequest, TranslationResponse};
use crate::enrichment::tasks::TranslationTask;
use crate::enrichment::traits::TaskRuntime;

const FREE_API_URL: &str = "https://api-free.deepl.com";
const PRO_API_URL: &str = "https://api.deepl.com";

/// DeepL signals an exhausted character quota with this non-standard status.
const QUOTA_EXCEEDED: u16 = 456;

/// DeepL API client
pub struct DeepLClient {
    api_key: String,
    http_client: reqwest::Client,
    base_url: String,
}

impl DeepLClient {
    /// Create a client. Free-tier keys (suffix `:fx`) use the free endpoint
    /// unless `base_url` overrides it.
    pub fn new(
        api_key: impl Into<String>,
        base_url: Option<String>,
        timeout: Duration,
    ) -> Result<Self, ProviderError> {
        let api_key = api_key.into();
        let base_url = base_url.unwrap_or_else(|| {
            if api_key.ends_with(":fx") {
                FREE_API_URL.to_string()
            } else {
                PRO_API_URL.to_string()
            }
        });
        let http_client = reqwest::Client::builder()
            .gzip(true)
            .timeout(timeout)
            .build()
            .map_err(|e| ProviderError::Network(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            api_key,
            http_client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    /// Translate one text between ISO 639-1 language codes.
    pub async fn translate(
        &self,
        text: &str,
        source_language: &str,
        target_language: &str,
    ) -> Result<String, ProviderError> {
        let request = dto::TranslateRequest {
            text: vec![text],
            source_lang: source_language.to_ascii_uppercase(),
            target_lang: target_code(target_language),
        };

        let response = self
            .http_client
            .post(format!("{}/v2/translate", self.base_url))
            .header("Authorization", format!("DeepL-Auth-Key {}", self.api_key))
            .json(&request)
            .send()
            .await
            .map_err(transport_error)?;

        let status = response.status().as_u16();
        if !response.status().is_success() {
            let body = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<dto::ApiError>(&body)
                .map(|e| e.message)
                .unwrap_or_else(|_| body.chars().take(200).collect());
            if status == QUOTA_EXCEEDED {
                return Err(ProviderError::QuotaExceeded(message));
            }
            return Err(ProviderError::from_status(status, None, message));
        }

        let body = response
            .json::<dto::TranslateResponse>()
            .await
            .map_err(|e| ProviderError::Malformed(e.to_string()))?;
        body.translations
            .into_iter()
            .next()
            .map(|t| t.text)
            .ok_or_else(|| ProviderError::Malformed("no translations in response".to_string()))
    }
}

/// DeepL wants a regional variant for some target languages.
fn target_code(language: &str) -> String {
    match language.to_ascii_lowercase().as_str() {
        "en" => "EN-US".to_string(),
        "pt" => "PT-PT".to_string(),
        other => other.to_ascii_uppercase(),
    }
}

/// Translation stage backed by DeepL.
pub struct DeepLRuntime {
    client: Arc<DeepLClient>,
}

impl DeepLRuntime {
    pub fn new(client: Arc<DeepLClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl TaskRuntime<TranslationTask> for DeepLRuntime {
    fn provider_id(&self) -> String {
        "deepl:v2".to_string()
    }

    fn provider(&self) -> &str {
        "deepl"
    }

    fn prompt_version(&self) -> &str {
        // No prompt; the request format is the template
        "api"
    }

    async fn invoke(
        &self,
        request: &TranslationRequest,
    ) -> Result<TranslationResponse, ProviderError> {
        let translation = self
            .client
            .translate(
                &request.sentence,
                &request.source_language,
                &request.target_language,
            )
            .await?;
        Ok(TranslationResponse { translation })
    }
}
