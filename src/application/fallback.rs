use crate::infrastructure::config::{DEFAULT_MAX_OUTPUT_TOKENS, DEFAULT_TEMPERATURE};
use crate::infrastructure::error::InfraError;
use crate::infrastructure::gemini_client::{GenerateRequest, ModelClient, ModelOutcome};
use crate::infrastructure::settings_store::SettingsStore;
use std::sync::Arc;

pub const FALLBACK_MODELS: [&str; 4] = [
    "gemini-2.0-flash-exp",
    "gemini-1.5-flash",
    "gemini-1.5-pro",
    "gemini-1.0-pro",
];

/// Preferred model first, then the fixed fallback list without duplicates.
pub fn candidate_models(preferred_model: &str) -> Vec<String> {
    let mut candidates: Vec<String> = Vec::with_capacity(FALLBACK_MODELS.len() + 1);
    let preferred_model = preferred_model.trim();
    if !preferred_model.is_empty() {
        candidates.push(preferred_model.to_string());
    }
    for model in FALLBACK_MODELS {
        if !candidates.iter().any(|candidate| candidate == model) {
            candidates.push(model.to_string());
        }
    }
    candidates
}

#[derive(Debug, Clone, PartialEq)]
pub struct FallbackSuccess<T> {
    pub value: T,
    /// Model that produced `value`; pass it as the preferred model of the next call.
    pub model: String,
}

pub struct FallbackOrchestrator<C>
where
    C: ModelClient + ?Sized,
{
    client: Arc<C>,
    settings: SettingsStore,
    temperature: f64,
    max_output_tokens: u32,
}

impl<C> FallbackOrchestrator<C>
where
    C: ModelClient + ?Sized,
{
    pub fn new(client: Arc<C>, settings: SettingsStore) -> Self {
        Self {
            client,
            settings,
            temperature: DEFAULT_TEMPERATURE,
            max_output_tokens: DEFAULT_MAX_OUTPUT_TOKENS,
        }
    }

    pub fn with_generation_config(mut self, temperature: f64, max_output_tokens: u32) -> Self {
        self.temperature = temperature;
        self.max_output_tokens = max_output_tokens;
        self
    }

    /// Tries each candidate in order until one returns text that `parse` accepts.
    ///
    /// Rate limits advance silently; every other failure, including a parse
    /// error, is remembered and also advances. Candidates are never called in
    /// parallel.
    pub async fn execute<T, P>(
        &self,
        operation: &str,
        prompt: &str,
        api_key: &str,
        preferred_model: &str,
        parse: P,
    ) -> Result<FallbackSuccess<T>, InfraError>
    where
        P: Fn(&str) -> Result<T, InfraError>,
    {
        let mut last_error: Option<String> = None;

        for model in candidate_models(preferred_model) {
            tracing::info!(operation, model = %model, "calling model");
            let request = GenerateRequest {
                api_key: api_key.to_string(),
                model_id: model.clone(),
                prompt: prompt.to_string(),
                max_output_tokens: self.max_output_tokens,
                temperature: self.temperature,
            };

            let text = match self.client.generate(&request).await {
                Ok(ModelOutcome::Success(text)) => text,
                Ok(ModelOutcome::RateLimited) => {
                    tracing::warn!(operation, model = %model, "model rate limited, trying next");
                    continue;
                }
                Ok(ModelOutcome::Failure(message)) => {
                    tracing::warn!(operation, model = %model, error = %message, "model failed");
                    last_error = Some(message);
                    continue;
                }
                Err(error) => {
                    tracing::warn!(operation, model = %model, %error, "model call failed");
                    last_error = Some(error.to_string());
                    continue;
                }
            };

            tracing::debug!(operation, model = %model, raw = %text, "model response");
            let value = match parse(&text) {
                Ok(value) => value,
                Err(error) => {
                    tracing::warn!(operation, model = %model, %error, "unusable model response");
                    last_error = Some(error.to_string());
                    continue;
                }
            };

            if model != preferred_model.trim() {
                match self.settings.set_preferred_model(&model) {
                    Ok(()) => tracing::info!(model = %model, "switched preferred model"),
                    Err(error) => {
                        tracing::warn!(model = %model, %error, "could not store preferred model")
                    }
                }
            }
            return Ok(FallbackSuccess { value, model });
        }

        Err(InfraError::AiService(
            last_error.unwrap_or_else(|| format!("All models failed for {operation}")),
        ))
    }
}
