use std::time::Instant;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use super::{AiError, AiService, elapsed_ms, reprompt};
use crate::backend::UsageLog;
use crate::catalog::{DEFAULT_MODEL, ModelConfig, resolve};
use crate::llm::decode::{Payload, decode_payload, strip_code_fences};
use crate::llm::{CompletionRequest, LlmError, ProviderKind, TokenUsage};

const DEFAULT_MAX_TOKENS: u32 = 4096;
const DEFAULT_FEATURE: &str = "text-generation";
const EMAIL_MODEL: &str = "gemma-2-9b-it";

const INSIGHTS_SYSTEM_PROMPT: &str = "You are a CRM analytics expert. Provide concise, actionable insights in valid \
                                      JSON format only. Do not wrap the JSON in markdown code blocks.";
const EMAIL_SYSTEM_PROMPT: &str = "You are a professional email writing assistant. Write clear, engaging emails \
                                   that drive action. Return only valid JSON without markdown formatting.";

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateRequest {
    pub prompt: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub temperature: Option<f64>,
    #[serde(default)]
    pub max_tokens: Option<u32>,
    /// Dropped for models without the `system-instructions` capability.
    #[serde(default)]
    pub system_instruction: Option<String>,
    #[serde(default)]
    pub customer_id: Option<String>,
    #[serde(default)]
    pub feature_used: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateResponse {
    pub content: String,
    pub model: String,
    pub usage: TokenUsage,
    pub finish_reason: String,
    pub response_time: u64,
}

/// Usage rows are only written for real customers: demo and placeholder ids
/// are skipped.
fn billable_customer(customer_id: Option<&str>) -> Option<&str> {
    customer_id.filter(|id| !id.is_empty() && !id.contains("demo") && !id.contains("placeholder"))
}

impl AiService {
    /// Free-form generation against the catalog's configuration for the
    /// requested model. Errors propagate to the caller.
    pub async fn generate(&self, request: GenerateRequest) -> Result<GenerateResponse, AiError> {
        if request.prompt.trim().is_empty() {
            return Err(AiError::InvalidRequest("prompt is required".to_owned()));
        }
        let started = Instant::now();
        let model_id = request.model.clone().unwrap_or_else(|| DEFAULT_MODEL.to_owned());
        let config = resolve(self.catalog.as_ref(), &model_id).await?;

        let outcome = self.run_generation(&config, &request).await;
        let response_time = elapsed_ms(started);

        let log = match &outcome {
            Ok((_, usage, _)) => UsageLog {
                tokens_used: usage.total_tokens,
                cost: config.cost(usage.total_tokens),
                success: true,
                error_message: None,
                ..self.usage_row(&request, &model_id, response_time)
            },
            Err(e) => UsageLog {
                error_message: Some(e.to_string()),
                ..self.usage_row(&request, &model_id, response_time)
            },
        };
        self.record_usage(request.customer_id.as_deref(), log).await;

        let (content, usage, finish_reason) = outcome?;
        Ok(GenerateResponse {
            content,
            model: model_id,
            usage,
            finish_reason,
            response_time,
        })
    }

    async fn run_generation(
        &self,
        config: &ModelConfig,
        request: &GenerateRequest,
    ) -> Result<(String, TokenUsage, String), AiError> {
        let provider = self.provider(config.provider)?;

        let max_tokens = request
            .max_tokens
            .or(config.max_tokens)
            .unwrap_or(DEFAULT_MAX_TOKENS);
        let mut completion = CompletionRequest::new(request.prompt.as_str())
            .temperature(request.temperature.unwrap_or(0.7))
            .max_tokens(max_tokens);
        if config.provider == ProviderKind::Gemini {
            completion = completion.sampling(0.8, 10);
        }
        if let Some(system) = &request.system_instruction {
            if config.supports("system-instructions") {
                completion = completion.system(system.as_str());
            } else {
                debug!(model = %config.id, "model takes no system instruction, dropping it");
            }
        }

        let reply = provider.complete(&config.model_name, &completion).await?;
        let content = strip_code_fences(&reply.text).to_owned();
        let finish_reason = reply.finish_reason.unwrap_or_else(|| "completed".to_owned());
        Ok((content, reply.usage, finish_reason))
    }

    fn usage_row(&self, request: &GenerateRequest, model_id: &str, response_time: u64) -> UsageLog {
        UsageLog {
            customer_id: request.customer_id.clone().unwrap_or_default(),
            model_id: model_id.to_owned(),
            feature_used: request
                .feature_used
                .clone()
                .unwrap_or_else(|| DEFAULT_FEATURE.to_owned()),
            tokens_used: 0,
            cost: 0.0,
            response_time_ms: response_time,
            success: false,
            error_message: None,
        }
    }

    async fn record_usage(&self, customer_id: Option<&str>, log: UsageLog) {
        let (Some(sink), Some(customer)) = (&self.usage, billable_customer(customer_id)) else {
            return;
        };
        if let Err(e) = sink.record(&log).await {
            warn!(customer, model = %log.model_id, error = %e, "failed to record AI usage");
        }
    }

    /// [`generate`](Self::generate) followed by typed decoding, with one
    /// re-prompt when the reply does not decode.
    async fn generate_json<T: Payload>(&self, request: GenerateRequest) -> Result<T, AiError> {
        let reply = self.generate(request.clone()).await?;
        match decode_payload(&reply.content) {
            Ok(payload) => Ok(payload),
            Err(e) => {
                warn!(model = %reply.model, error = %e, "undecodable reply, asking again");
                let retry = GenerateRequest {
                    prompt: reprompt(&request.prompt, &reply.content),
                    ..request
                };
                let reply = self.generate(retry).await?;
                Ok(decode_payload(&reply.content)?)
            }
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InsightsRequest {
    /// Pipeline snapshot: deals, contacts, tasks, in any shape.
    #[serde(default)]
    pub data: Value,
    #[serde(default)]
    pub customer_id: Option<String>,
    #[serde(default)]
    pub model: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InsightsReport {
    pub health_score: f64,
    pub key_insights: Vec<String>,
    #[serde(default)]
    pub bottlenecks: Vec<String>,
    #[serde(default)]
    pub opportunities: Vec<String>,
    #[serde(default)]
    pub forecast_accuracy: f64,
}

impl Payload for InsightsReport {
    fn check(&self) -> Result<(), String> {
        if !(0.0..=100.0).contains(&self.health_score) {
            return Err(format!("healthScore {} is outside 0-100", self.health_score));
        }
        Ok(())
    }
}

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| (*s).to_owned()).collect()
}

impl InsightsReport {
    fn not_configured() -> Self {
        Self {
            health_score: 75.0,
            key_insights: strings(&["API key not configured - unable to generate AI insights"]),
            bottlenecks: strings(&["Please configure an AI provider API key"]),
            opportunities: strings(&["Set up API keys to enable AI analysis"]),
            forecast_accuracy: 0.0,
        }
    }

    fn unavailable() -> Self {
        Self {
            health_score: 0.0,
            key_insights: strings(&["Unable to generate insights at this time."]),
            bottlenecks: strings(&["Analysis service unavailable"]),
            opportunities: strings(&["Manual review required"]),
            forecast_accuracy: 0.0,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EmailRequest {
    #[serde(default)]
    pub recipient: String,
    #[serde(default)]
    pub purpose: String,
    #[serde(default)]
    pub tone: Option<String>,
    #[serde(default)]
    pub context: Option<String>,
    #[serde(default)]
    pub customer_id: Option<String>,
    #[serde(default)]
    pub model: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmailDraft {
    pub subject: String,
    pub body: String,
}

impl Payload for EmailDraft {
    fn check(&self) -> Result<(), String> {
        if self.subject.trim().is_empty() || self.body.trim().is_empty() {
            return Err("email needs a subject and a body".to_owned());
        }
        Ok(())
    }
}

impl EmailDraft {
    fn canned(request: &EmailRequest, note: &str) -> Self {
        Self {
            subject: format!("Following up: {}", request.purpose),
            body: format!(
                "Dear {},\n\nI hope this email finds you well.\n\n[{note}]\n\nBest regards",
                request.recipient
            ),
        }
    }
}

fn is_not_configured(error: &AiError) -> bool {
    matches!(error, AiError::Llm(LlmError::NotConfigured(_)))
}

impl AiService {
    /// Pipeline health report. Never fails: missing keys and generation
    /// errors produce canned reports.
    pub async fn insights(&self, request: InsightsRequest) -> InsightsReport {
        let data = serde_json::to_string_pretty(&request.data).unwrap_or_else(|_| request.data.to_string());
        let prompt = format!(
            "Analyze the following CRM data and provide actionable insights:\n\n{data}\n\n\
             Please provide:\n\
             1. Key insights about the sales pipeline\n\
             2. Recommendations for improving conversion rates\n\
             3. Identification of high-priority opportunities\n\
             4. Potential risks or concerns\n\n\
             Format your response as JSON with the following structure:\n\
             {{\n  \"healthScore\": 75,\n  \"keyInsights\": [\"Pipeline shows strong growth\"],\n  \
             \"bottlenecks\": [\"3 deals stalled in negotiation stage\"],\n  \
             \"opportunities\": [\"Focus on the highest-value opportunity\"],\n  \"forecastAccuracy\": 85\n}}"
        );

        let generate = GenerateRequest {
            prompt,
            model: request.model,
            system_instruction: Some(INSIGHTS_SYSTEM_PROMPT.to_owned()),
            customer_id: request.customer_id,
            feature_used: Some("business_analysis".to_owned()),
            ..Default::default()
        };
        match self.generate_json(generate).await {
            Ok(report) => report,
            Err(e) if is_not_configured(&e) => InsightsReport::not_configured(),
            Err(e) => {
                warn!(error = %e, "insights generation failed");
                InsightsReport::unavailable()
            }
        }
    }

    /// Drafts an email. Only missing recipient or purpose is an error.
    pub async fn email(&self, request: EmailRequest) -> Result<EmailDraft, AiError> {
        if request.recipient.trim().is_empty() || request.purpose.trim().is_empty() {
            return Err(AiError::InvalidRequest("recipient and purpose are required".to_owned()));
        }
        let tone = request.tone.as_deref().unwrap_or("professional");
        let prompt = format!(
            "Generate a {tone} email for the following context:\n\n\
             Recipient: {}\nPurpose: {}\nAdditional Context: {}\n\n\
             Format as JSON:\n{{\n  \"subject\": \"string\",\n  \"body\": \"string\"\n}}",
            request.recipient,
            request.purpose,
            request.context.as_deref().unwrap_or("None"),
        );

        let generate = GenerateRequest {
            prompt,
            model: Some(request.model.clone().unwrap_or_else(|| EMAIL_MODEL.to_owned())),
            system_instruction: Some(EMAIL_SYSTEM_PROMPT.to_owned()),
            customer_id: request.customer_id.clone(),
            feature_used: Some("email-generation".to_owned()),
            ..Default::default()
        };
        Ok(match self.generate_json(generate).await {
            Ok(draft) => draft,
            Err(e) if is_not_configured(&e) => EmailDraft::canned(
                &request,
                "Please configure an AI provider API key to enable AI-generated content",
            ),
            Err(e) => {
                warn!(error = %e, "email generation failed");
                EmailDraft::canned(&request, "Generated content unavailable - please try again")
            }
        })
    }
}
