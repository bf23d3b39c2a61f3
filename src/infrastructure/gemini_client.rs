use crate::infrastructure::config::DEFAULT_AI_ENDPOINT;
use crate::infrastructure::error::InfraError;
use async_trait::async_trait;
use reqwest::Client;
use url::Url;

const RESOURCE_EXHAUSTED_PHRASE: &str = "resource has been exhausted";
const RESOURCE_EXHAUSTED_STATUS: &str = "RESOURCE_EXHAUSTED";

#[derive(Debug, Clone, PartialEq)]
pub struct GenerateRequest {
    pub api_key: String,
    pub model_id: String,
    pub prompt: String,
    pub max_output_tokens: u32,
    pub temperature: f64,
}

/// Classified result of one model call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModelOutcome {
    Success(String),
    RateLimited,
    Failure(String),
}

#[async_trait]
pub trait ModelClient: Send + Sync {
    /// `Err` is reserved for transport failures; HTTP-level problems are
    /// reported through [`ModelOutcome`].
    async fn generate(&self, request: &GenerateRequest) -> Result<ModelOutcome, InfraError>;

    /// Whether `model_id` accepts requests with `api_key`.
    async fn check_model(&self, api_key: &str, model_id: &str) -> Result<bool, InfraError> {
        let outcome = self
            .generate(&GenerateRequest {
                api_key: api_key.to_string(),
                model_id: model_id.to_string(),
                prompt: "Hello".to_string(),
                max_output_tokens: 1,
                temperature: 0.0,
            })
            .await?;
        Ok(matches!(outcome, ModelOutcome::Success(_)))
    }
}

#[derive(Debug, Clone)]
pub struct ReqwestGeminiClient {
    client: Client,
    base_url: String,
}

impl Default for ReqwestGeminiClient {
    fn default() -> Self {
        Self::new(DEFAULT_AI_ENDPOINT)
    }
}

impl ReqwestGeminiClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.into(),
        }
    }

    fn ensure_non_empty(value: &str, field: &str) -> Result<(), InfraError> {
        if value.trim().is_empty() {
            return Err(InfraError::InvalidConfig(format!("{field} must not be empty")));
        }
        Ok(())
    }

    fn generate_endpoint(&self, model_id: &str, api_key: &str) -> Result<Url, InfraError> {
        let mut url = Url::parse(&self.base_url).map_err(|error| {
            InfraError::InvalidConfig(format!("invalid ai endpoint url: {error}"))
        })?;
        {
            let mut segments = url.path_segments_mut().map_err(|_| {
                InfraError::InvalidConfig("ai endpoint URL cannot be a base".to_string())
            })?;
            segments.pop_if_empty();
            segments.push("v1beta");
            segments.push("models");
            segments.push(&format!("{model_id}:generateContent"));
        }
        url.query_pairs_mut().append_pair("key", api_key);
        Ok(url)
    }

    async fn post(
        &self,
        request: &GenerateRequest,
    ) -> Result<(reqwest::StatusCode, String), InfraError> {
        Self::ensure_non_empty(&request.api_key, "api key")?;
        Self::ensure_non_empty(&request.model_id, "model id")?;

        let endpoint = self.generate_endpoint(&request.model_id, &request.api_key)?;
        let body = GenerateContentBody {
            contents: vec![Content {
                parts: vec![Part {
                    text: &request.prompt,
                }],
            }],
            generation_config: GenerationConfig {
                temperature: request.temperature,
                max_output_tokens: request.max_output_tokens,
            },
        };

        let response = self
            .client
            .post(endpoint)
            .json(&body)
            .send()
            .await
            .map_err(|error| {
                InfraError::Transport(format!(
                    "network error while calling {}: {}",
                    request.model_id,
                    error.without_url()
                ))
            })?;

        let status = response.status();
        let text = response.text().await.map_err(|error| {
            InfraError::Transport(format!(
                "failed reading response from {}: {}",
                request.model_id,
                error.without_url()
            ))
        })?;
        Ok((status, text))
    }
}

#[derive(Debug, serde::Serialize)]
struct GenerateContentBody<'a> {
    contents: Vec<Content<'a>>,
    #[serde(rename = "generationConfig")]
    generation_config: GenerationConfig,
}

#[derive(Debug, serde::Serialize)]
struct Content<'a> {
    parts: Vec<Part<'a>>,
}

#[derive(Debug, serde::Serialize)]
struct Part<'a> {
    text: &'a str,
}

#[derive(Debug, serde::Serialize)]
struct GenerationConfig {
    temperature: f64,
    #[serde(rename = "maxOutputTokens")]
    max_output_tokens: u32,
}

#[derive(Debug, Default, serde::Deserialize)]
struct GenerateContentResponse {
    candidates: Option<Vec<Candidate>>,
}

#[derive(Debug, serde::Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Debug, serde::Deserialize)]
struct CandidateContent {
    parts: Option<Vec<CandidatePart>>,
}

#[derive(Debug, serde::Deserialize)]
struct CandidatePart {
    text: Option<String>,
}

#[derive(Debug, Default, serde::Deserialize)]
struct ErrorEnvelope {
    error: Option<ErrorDetail>,
}

#[derive(Debug, serde::Deserialize)]
struct ErrorDetail {
    message: Option<String>,
    status: Option<String>,
}

/// Maps an HTTP status and body onto a [`ModelOutcome`].
pub fn classify_response(status: u16, body: &str) -> ModelOutcome {
    if (200..300).contains(&status) {
        let parsed: GenerateContentResponse = match serde_json::from_str(body) {
            Ok(parsed) => parsed,
            Err(error) => return ModelOutcome::Failure(format!("invalid response payload: {error}")),
        };
        let text = parsed
            .candidates
            .and_then(|candidates| candidates.into_iter().next())
            .and_then(|candidate| candidate.content)
            .and_then(|content| content.parts)
            .and_then(|parts| parts.into_iter().next())
            .and_then(|part| part.text)
            .filter(|text| !text.trim().is_empty());
        return match text {
            Some(text) => ModelOutcome::Success(text),
            None => ModelOutcome::Failure("Empty response from AI".to_string()),
        };
    }

    let detail = serde_json::from_str::<ErrorEnvelope>(body)
        .unwrap_or_default()
        .error;
    let message = detail
        .as_ref()
        .and_then(|detail| detail.message.clone())
        .filter(|message| !message.trim().is_empty())
        .unwrap_or_else(|| format!("Status {status}"));
    let exhausted_status = detail
        .as_ref()
        .and_then(|detail| detail.status.as_deref())
        .map(|value| value == RESOURCE_EXHAUSTED_STATUS)
        .unwrap_or(false);

    if status == 429
        || exhausted_status
        || message.to_ascii_lowercase().contains(RESOURCE_EXHAUSTED_PHRASE)
    {
        return ModelOutcome::RateLimited;
    }
    ModelOutcome::Failure(message)
}

#[async_trait]
impl ModelClient for ReqwestGeminiClient {
    async fn generate(&self, request: &GenerateRequest) -> Result<ModelOutcome, InfraError> {
        let (status, body) = self.post(request).await?;
        Ok(classify_response(status.as_u16(), &body))
    }

    async fn check_model(&self, api_key: &str, model_id: &str) -> Result<bool, InfraError> {
        let (status, _) = self
            .post(&GenerateRequest {
                api_key: api_key.to_string(),
                model_id: model_id.to_string(),
                prompt: "Hello".to_string(),
                max_output_tokens: 1,
                temperature: 0.0,
            })
            .await?;
        Ok(status.is_success())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn success_body(text: &str) -> String {
        serde_json::json!({
            "candidates": [{ "content": { "parts": [{ "text": text }, { "text": "ignored" }] } }]
        })
        .to_string()
    }

    #[test]
    fn endpoint_includes_model_action_and_key() {
        let client = ReqwestGeminiClient::new("https://ai.example.test/");
        let url = client
            .generate_endpoint("gemini-1.5-flash", "k-123")
            .expect("endpoint");
        assert_eq!(
            url.as_str(),
            "https://ai.example.test/v1beta/models/gemini-1.5-flash:generateContent?key=k-123"
        );
    }

    #[test]
    fn default_client_targets_configured_default_endpoint() {
        let client = ReqwestGeminiClient::default();
        let url = client
            .generate_endpoint("gemini-2.5-flash", "k")
            .expect("endpoint");
        assert!(url.as_str().starts_with(DEFAULT_AI_ENDPOINT));
        assert_eq!(
            client.base_url,
            crate::infrastructure::config::AppConfig::default().ai_endpoint
        );
    }

    #[test]
    fn request_body_matches_wire_shape() {
        let body = GenerateContentBody {
            contents: vec![Content {
                parts: vec![Part { text: "hi" }],
            }],
            generation_config: GenerationConfig {
                temperature: 0.7,
                max_output_tokens: 10_000,
            },
        };
        assert_eq!(
            serde_json::to_value(&body).expect("serialize"),
            serde_json::json!({
                "contents": [{ "parts": [{ "text": "hi" }] }],
                "generationConfig": { "temperature": 0.7, "maxOutputTokens": 10000 }
            })
        );
    }

    #[test]
    fn success_reads_first_text_part_of_first_candidate() {
        assert_eq!(
            classify_response(200, &success_body("[\"1\"]")),
            ModelOutcome::Success("[\"1\"]".to_string())
        );
    }

    #[test]
    fn success_without_text_is_a_failure() {
        assert_eq!(
            classify_response(200, r#"{"candidates":[]}"#),
            ModelOutcome::Failure("Empty response from AI".to_string())
        );
        assert_eq!(
            classify_response(200, r#"{"candidates":[{"content":{"parts":[{}]}}]}"#),
            ModelOutcome::Failure("Empty response from AI".to_string())
        );
    }

    #[test]
    fn status_429_is_rate_limited() {
        assert_eq!(classify_response(429, ""), ModelOutcome::RateLimited);
    }

    #[test]
    fn exhaustion_message_is_rate_limited_regardless_of_status() {
        let body = r#"{"error":{"code":503,"message":"Resource has been exhausted (e.g. check quota)."}}"#;
        assert_eq!(classify_response(503, body), ModelOutcome::RateLimited);

        let body = r#"{"error":{"code":400,"message":"quota","status":"RESOURCE_EXHAUSTED"}}"#;
        assert_eq!(classify_response(400, body), ModelOutcome::RateLimited);
    }

    #[test]
    fn other_errors_carry_service_message_or_status() {
        let body = r#"{"error":{"code":400,"message":"API key not valid."}}"#;
        assert_eq!(
            classify_response(400, body),
            ModelOutcome::Failure("API key not valid.".to_string())
        );
        assert_eq!(
            classify_response(502, "<html>bad gateway</html>"),
            ModelOutcome::Failure("Status 502".to_string())
        );
    }
}
