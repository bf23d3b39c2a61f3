//! Turns raw model text into typed results.
//!
//! Target lists are parsed strictly: a decode failure is an error. Task id
//! lists are advisory, so anything unreadable degrades to an empty list.

use crate::domain::models::AiGeneratedTarget;
use crate::infrastructure::error::InfraError;

/// Removes a surrounding triple-backtick fence, with or without a language tag.
pub fn strip_code_fence(raw: &str) -> &str {
    let mut text = raw.trim();
    if let Some(rest) = text.strip_prefix("```") {
        let tag_len = rest
            .find(|ch: char| !ch.is_ascii_alphanumeric())
            .unwrap_or(rest.len());
        text = &rest[tag_len..];
    }
    if let Some(rest) = text.trim_end().strip_suffix("```") {
        text = rest;
    }
    text.trim()
}

pub fn parse_generated_targets(raw: &str) -> Result<Vec<AiGeneratedTarget>, InfraError> {
    let json = strip_code_fence(raw);
    serde_json::from_str(json).map_err(|error| {
        InfraError::AiService(format!("could not read generated targets: {error}"))
    })
}

pub fn parse_task_ids(raw: &str) -> Vec<String> {
    let text = raw.trim();
    let (Some(first), Some(last)) = (text.find('['), text.rfind(']')) else {
        return Vec::new();
    };
    if last < first {
        return Vec::new();
    }
    match serde_json::from_str::<Vec<String>>(&text[first..=last]) {
        Ok(ids) => ids,
        Err(error) => {
            tracing::warn!(%error, "cleanup response was not a JSON array of ids");
            Vec::new()
        }
    }
}
