use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::{
    Availability, Completion, CompletionRequest, LlmError, LlmProvider, ProviderKind, ProviderStatus, TokenUsage,
    api_error_message,
};

/// Gemini has no rate-limit header on the listing call; this is the
/// documented free-tier requests-per-minute.
const GEMINI_REMAINING_REQUESTS: u32 = 60;

/// Client for the Generative Language API (`models/{model}:generateContent`).
#[derive(Debug, Clone)]
pub struct GeminiClient {
    http: Client,
    base_url: String,
    api_key: String,
}

impl GeminiClient {
    pub fn new(http: Client, base_url: &str, api_key: &str) -> Self {
        Self {
            http,
            base_url: base_url.trim_end_matches('/').to_owned(),
            api_key: api_key.to_owned(),
        }
    }

    fn generate_url(&self, model: &str) -> String {
        // Model ids with a tag suffix (`name:tag`) are addressed as `name-tag`.
        let model = model.replacen(':', "-", 1);
        format!("{}/models/{}:generateContent", self.base_url, model)
    }
}

#[async_trait]
impl LlmProvider for GeminiClient {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Gemini
    }

    async fn complete(&self, model: &str, request: &CompletionRequest) -> Result<Completion, LlmError> {
        let body = GenerateRequest {
            contents: vec![Content {
                parts: vec![Part {
                    text: request.prompt.clone(),
                }],
            }],
            generation_config: GenerationConfig {
                temperature: request.temperature,
                max_output_tokens: request.max_tokens,
                top_p: request.top_p,
                top_k: request.top_k,
            },
            system_instruction: request.system.as_ref().map(|text| Content {
                parts: vec![Part { text: text.clone() }],
            }),
        };

        debug!(model, "gemini generateContent");
        let response = self
            .http
            .post(self.generate_url(model))
            .query(&[("key", self.api_key.as_str())])
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(LlmError::Api {
                provider: ProviderKind::Gemini,
                status: status.as_u16(),
                message: api_error_message(&text, status),
            });
        }

        let data: GenerateResponse = response.json().await?;
        let candidate = data
            .candidates
            .into_iter()
            .next()
            .ok_or(LlmError::EmptyResponse(ProviderKind::Gemini))?;
        let text = candidate
            .content
            .and_then(|c| c.parts.into_iter().find_map(|p| p.text))
            .filter(|t| !t.is_empty())
            .ok_or(LlmError::EmptyResponse(ProviderKind::Gemini))?;

        let usage = data.usage_metadata.map_or_else(TokenUsage::default, |u| TokenUsage {
            prompt_tokens: u.prompt_token_count,
            completion_tokens: u.candidates_token_count,
            total_tokens: u.total_token_count,
        });

        Ok(Completion {
            text,
            usage,
            finish_reason: candidate.finish_reason,
        })
    }

    async fn status(&self) -> ProviderStatus {
        let url = format!("{}/models", self.base_url);
        let result = self.http.get(url).query(&[("key", self.api_key.as_str())]).send().await;

        match result {
            Ok(resp) if resp.status().is_success() => ProviderStatus {
                name: ProviderKind::Gemini,
                status: Availability::Available,
                remaining: Some(GEMINI_REMAINING_REQUESTS),
                error: None,
            },
            Ok(resp) if resp.status() == reqwest::StatusCode::TOO_MANY_REQUESTS => ProviderStatus {
                name: ProviderKind::Gemini,
                status: Availability::RateLimited,
                remaining: Some(0),
                error: None,
            },
            Ok(resp) => {
                let status = resp.status();
                let text = resp.text().await.unwrap_or_default();
                warn!(status = status.as_u16(), "gemini status probe failed");
                ProviderStatus {
                    name: ProviderKind::Gemini,
                    status: Availability::Error,
                    remaining: Some(0),
                    error: Some(api_error_message(&text, status)),
                }
            }
            Err(e) => {
                warn!(error = %e, "gemini status probe failed");
                ProviderStatus {
                    name: ProviderKind::Gemini,
                    status: Availability::Error,
                    remaining: Some(0),
                    error: Some(e.to_string()),
                }
            }
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateRequest {
    contents: Vec<Content>,
    generation_config: GenerationConfig,
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<Content>,
}

#[derive(Debug, Serialize)]
struct Content {
    parts: Vec<Part>,
}

#[derive(Debug, Serialize)]
struct Part {
    text: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    temperature: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_output_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    top_p: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    top_k: Option<u32>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    usage_metadata: Option<UsageMetadata>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    content: Option<CandidateContent>,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Debug, Deserialize)]
struct CandidatePart {
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UsageMetadata {
    #[serde(default)]
    prompt_token_count: u32,
    #[serde(default)]
    candidates_token_count: u32,
    #[serde(default)]
    total_token_count: u32,
}
