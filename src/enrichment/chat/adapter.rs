//! Adapter layer: chat-completion DTOs to stage responses
//!
//! Models wrap JSON in Markdown fences, truncate output, or return JSON of
//! the wrong shape. Unparseable output is transient (the next sample is
//! usually fine); well-formed JSON of the wrong shape is a contract
//! violation and fatal for the record.

use serde::de::DeserializeOwned;

use super::dto;
use crate::enrichment::domain::ProviderError;

/// Extract the assistant message from a completion.
pub fn first_message(response: dto::ChatResponse) -> Result<String, ProviderError> {
    let choice = response
        .choices
        .into_iter()
        .next()
        .ok_or_else(|| ProviderError::Malformed("no choices in response".to_string()))?;

    if choice.finish_reason.as_deref() == Some("length") {
        return Err(ProviderError::Malformed(
            "response truncated at token limit".to_string(),
        ));
    }

    match choice.message.content {
        Some(content) if !content.trim().is_empty() => Ok(content),
        _ => Err(ProviderError::Malformed("empty message content".to_string())),
    }
}

/// Human-readable message from an error body, falling back to the raw text.
pub fn error_message(body: &str) -> String {
    match serde_json::from_str::<dto::ApiError>(body) {
        Ok(error) => error.error.message,
        Err(_) => body.chars().take(200).collect(),
    }
}

/// Remove a surrounding Markdown code fence (```json ... ```), if any.
pub fn strip_code_fence(content: &str) -> &str {
    let trimmed = content.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    // Drop the info string ("json") up to the first newline
    let body = match rest.find('\n') {
        Some(newline) => &rest[newline + 1..],
        None => rest,
    };
    body.trim_end()
        .strip_suffix("```")
        .unwrap_or(body)
        .trim()
}

/// Parse message content into a typed stage response.
pub fn parse_content<R: DeserializeOwned>(content: &str) -> Result<R, ProviderError> {
    let body = strip_code_fence(content);
    let value: serde_json::Value = serde_json::from_str(body).map_err(|e| {
        ProviderError::Malformed(format!(
            "{}: {}",
            e,
            body.chars().take(120).collect::<String>()
        ))
    })?;

    serde_json::from_value(value).map_err(|e| {
        let expected = std::any::type_name::<R>()
            .rsplit("::")
            .next()
            .unwrap_or("response");
        ProviderError::contract(expected, e.to_string())
    })
}
