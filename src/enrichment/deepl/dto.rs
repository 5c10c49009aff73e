//! DeepL API Data Transfer Objects
//!
//! Example response:
//! ```json
//! {"translations": [{"detected_source_language": "PL", "text": "The castle on the hill."}]}
//! ```

use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize)]
pub struct TranslateRequest<'a> {
    pub text: Vec<&'a str>,
    pub source_lang: String,
    pub target_lang: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TranslateResponse {
    #[serde(default)]
    pub translations: Vec<Translation>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Translation {
    #[serde(default)]
    pub detected_source_language: Option<String>,
    pub text: String,
}

/// Error body (`{"message": "..."}`)
#[derive(Debug, Clone, Deserialize)]
pub struct ApiError {
    pub message: String,
}
