use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::{
    Availability, Completion, CompletionRequest, LlmError, LlmProvider, ProviderKind, ProviderStatus, TokenUsage,
    api_error_message,
};

/// Assumed request budget when the listing call omits the rate-limit header.
const DEFAULT_REMAINING_REQUESTS: u32 = 50;

/// Client for the Chat Completions API.
#[derive(Debug, Clone)]
pub struct OpenAiClient {
    http: Client,
    base_url: String,
    api_key: String,
}

impl OpenAiClient {
    pub fn new(http: Client, base_url: &str, api_key: &str) -> Self {
        Self {
            http,
            base_url: base_url.trim_end_matches('/').to_owned(),
            api_key: api_key.to_owned(),
        }
    }
}

#[async_trait]
impl LlmProvider for OpenAiClient {
    fn kind(&self) -> ProviderKind {
        ProviderKind::OpenAi
    }

    async fn complete(&self, model: &str, request: &CompletionRequest) -> Result<Completion, LlmError> {
        let mut messages = Vec::with_capacity(2);
        if let Some(system) = &request.system {
            messages.push(ChatMessage {
                role: "system",
                content: system,
            });
        }
        messages.push(ChatMessage {
            role: "user",
            content: &request.prompt,
        });

        let body = ChatRequest {
            model,
            messages,
            temperature: request.temperature,
            max_tokens: request.max_tokens,
            top_p: request.top_p,
            response_format: request.json_mode.then_some(ResponseFormat { kind: "json_object" }),
        };

        debug!(model, "openai chat completion");
        let response = self
            .http
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(LlmError::Api {
                provider: ProviderKind::OpenAi,
                status: status.as_u16(),
                message: api_error_message(&text, status),
            });
        }

        let data: ChatResponse = response.json().await?;
        let choice = data
            .choices
            .into_iter()
            .next()
            .ok_or(LlmError::EmptyResponse(ProviderKind::OpenAi))?;
        let text = choice
            .message
            .content
            .filter(|t| !t.is_empty())
            .ok_or(LlmError::EmptyResponse(ProviderKind::OpenAi))?;

        let usage = data.usage.map_or_else(TokenUsage::default, |u| TokenUsage {
            prompt_tokens: u.prompt_tokens,
            completion_tokens: u.completion_tokens,
            total_tokens: u.total_tokens,
        });

        Ok(Completion {
            text,
            usage,
            finish_reason: choice.finish_reason,
        })
    }

    async fn status(&self) -> ProviderStatus {
        let result = self
            .http
            .get(format!("{}/models", self.base_url))
            .bearer_auth(&self.api_key)
            .send()
            .await;

        match result {
            Ok(resp) if resp.status().is_success() => {
                let remaining = resp
                    .headers()
                    .get("x-ratelimit-remaining-requests")
                    .and_then(|v| v.to_str().ok())
                    .and_then(|v| v.trim().parse().ok())
                    .unwrap_or(DEFAULT_REMAINING_REQUESTS);
                ProviderStatus {
                    name: ProviderKind::OpenAi,
                    status: Availability::Available,
                    remaining: Some(remaining),
                    error: None,
                }
            }
            Ok(resp) if resp.status() == reqwest::StatusCode::TOO_MANY_REQUESTS => ProviderStatus {
                name: ProviderKind::OpenAi,
                status: Availability::RateLimited,
                remaining: Some(0),
                error: None,
            },
            Ok(resp) => {
                let status = resp.status();
                let text = resp.text().await.unwrap_or_default();
                warn!(status = status.as_u16(), "openai status probe failed");
                ProviderStatus {
                    name: ProviderKind::OpenAi,
                    status: Availability::Error,
                    remaining: Some(0),
                    error: Some(api_error_message(&text, status)),
                }
            }
            Err(e) => {
                warn!(error = %e, "openai status probe failed");
                ProviderStatus {
                    name: ProviderKind::OpenAi,
                    status: Availability::Error,
                    remaining: Some(0),
                    error: Some(e.to_string()),
                }
            }
        }
    }
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    top_p: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<ResponseFormat>,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    kind: &'static str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
    usage: Option<Usage>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Usage {
    #[serde(default)]
    prompt_tokens: u32,
    #[serde(default)]
    completion_tokens: u32,
    #[serde(default)]
    total_tokens: u32,
}
