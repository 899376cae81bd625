//! AI features built on top of the LLM providers: contact analysis and
//! enrichment, free-form generation, pipeline insights and email drafts.
//!
//! Every JSON-producing feature goes through the same decode path: strict
//! typed decode with substring repair, then one re-prompt asking the model to
//! resend only the JSON object. Callers that cannot surface errors substitute
//! a canned payload.

use std::sync::Arc;
use std::time::Instant;

use thiserror::Error;
use tracing::warn;

use crate::backend::UsageSink;
use crate::catalog::{CatalogError, ModelCatalog};
use crate::llm::decode::{DecodeError, Payload, decode_payload};
use crate::llm::{CompletionRequest, LlmError, LlmProvider, ProviderKind, ProviderStatus, Providers};

mod analyze;
mod content;
mod enrich;

pub use analyze::{
    AnalysisPayload, AnalysisType, AnalyzeOptions, AnalyzeRequest, BulkAnalysis, BulkAnalyzeRequest, BulkSummary,
    ContactAnalysis, FailedAnalysis, MAX_BULK_CONTACTS,
};
pub use content::{EmailDraft, EmailRequest, GenerateRequest, GenerateResponse, InsightsReport, InsightsRequest};
pub use enrich::{ContactEnrichment, EnrichRequest, EnrichmentQuery, Location, SocialProfiles};

const REPROMPT: &str = "Your previous reply could not be parsed. Reply again with only the JSON object: \
                        no markdown fences, no commentary.";

#[derive(Debug, Error)]
pub enum AiError {
    #[error("{0}")]
    InvalidRequest(String),

    #[error(transparent)]
    Llm(#[from] LlmError),

    #[error(transparent)]
    Decode(#[from] DecodeError),

    #[error(transparent)]
    Catalog(#[from] CatalogError),
}

fn elapsed_ms(start: Instant) -> u64 {
    u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX)
}

/// Builds the follow-up prompt sent when a reply fails to decode.
fn reprompt(original: &str, reply: &str) -> String {
    format!("{original}\n\nYour previous reply was:\n{reply}\n\n{REPROMPT}")
}

pub struct AiService {
    providers: Providers,
    catalog: Arc<dyn ModelCatalog>,
    usage: Option<Arc<dyn UsageSink>>,
}

impl AiService {
    pub fn new(providers: Providers, catalog: Arc<dyn ModelCatalog>) -> Self {
        Self {
            providers,
            catalog,
            usage: None,
        }
    }

    /// Records a usage row after every generation.
    #[must_use]
    pub fn with_usage_sink(mut self, sink: Arc<dyn UsageSink>) -> Self {
        self.usage = Some(sink);
        self
    }

    pub fn providers(&self) -> &Providers {
        &self.providers
    }

    fn provider(&self, kind: ProviderKind) -> Result<Arc<dyn LlmProvider>, LlmError> {
        self.providers.get(kind).ok_or(LlmError::NotConfigured(kind))
    }

    fn ensure_any_provider(&self) -> Result<(), AiError> {
        if self.providers.is_empty() {
            return Err(AiError::InvalidRequest("No AI provider API keys configured".to_owned()));
        }
        Ok(())
    }

    /// Picks a vendor: an explicit choice wins, then the model name, then
    /// Gemini when it is configured, else OpenAI.
    fn choose_provider(&self, explicit: Option<&str>, model: Option<&str>) -> Result<ProviderKind, AiError> {
        if let Some(name) = explicit {
            return name
                .parse()
                .map_err(|_| AiError::InvalidRequest(format!("Selected provider {name} is not available")));
        }
        if let Some(kind) = model.and_then(ProviderKind::for_model) {
            return Ok(kind);
        }
        if self.providers.is_configured(ProviderKind::Gemini) {
            Ok(ProviderKind::Gemini)
        } else {
            Ok(ProviderKind::OpenAi)
        }
    }

    /// Sends `request` and decodes the reply as `T`, re-prompting once when
    /// the first reply does not decode.
    async fn complete_json<T: Payload>(
        &self,
        provider: &dyn LlmProvider,
        model: &str,
        request: CompletionRequest,
    ) -> Result<T, AiError> {
        let completion = provider.complete(model, &request).await?;
        match decode_payload(&completion.text) {
            Ok(payload) => Ok(payload),
            Err(e) => {
                warn!(provider = %provider.kind(), model, error = %e, "undecodable reply, asking again");
                let retry = CompletionRequest {
                    prompt: reprompt(&request.prompt, &completion.text),
                    ..request
                };
                let completion = provider.complete(model, &retry).await?;
                Ok(decode_payload(&completion.text)?)
            }
        }
    }

    /// Probes both vendors concurrently. Unconfigured vendors are reported
    /// without a network call.
    pub async fn provider_status(&self) -> Vec<ProviderStatus> {
        let probe = |kind| async move {
            match self.providers.get(kind) {
                Some(provider) => provider.status().await,
                None => ProviderStatus::not_configured(kind),
            }
        };
        let (openai, gemini) = futures::join!(probe(ProviderKind::OpenAi), probe(ProviderKind::Gemini));
        vec![openai, gemini]
    }
}


#[cfg(test)]
mod tests {
    use super::testing::ScriptedProvider;
    use super::*;
    use crate::catalog::StaticCatalog;
    use serde::Deserialize;

    #[derive(Debug, Deserialize)]
    struct Answer {
        value: u32,
    }

    impl Payload for Answer {
        fn check(&self) -> Result<(), String> {
            if self.value > 10 {
                return Err("value out of range".to_owned());
            }
            Ok(())
        }
    }

    fn service(provider: Arc<ScriptedProvider>) -> AiService {
        AiService::new(Providers::default().with(provider), Arc::new(StaticCatalog))
    }

    #[tokio::test]
    async fn second_attempt_rescues_a_bad_reply() {
        let provider = Arc::new(ScriptedProvider::replying(
            ProviderKind::Gemini,
            &["Sure! Here you go: value = 3", "```json\n{\"value\": 3}\n```"],
        ));
        let svc = service(provider.clone());

        let answer: Answer = svc
            .complete_json(provider.as_ref(), "gemini-1.5-flash", CompletionRequest::new("q"))
            .await
            .unwrap();

        assert_eq!(answer.value, 3);
        let requests = provider.requests.lock().unwrap();
        assert_eq!(requests.len(), 2);
        assert!(requests[1].1.prompt.starts_with("q\n\n"));
        assert!(requests[1].1.prompt.contains("value = 3"));
    }

    #[tokio::test]
    async fn retry_is_bounded_to_one() {
        let provider = Arc::new(ScriptedProvider::replying(
            ProviderKind::Gemini,
            &[r#"{"value": 99}"#, r#"{"value": 42}"#, r#"{"value": 1}"#],
        ));
        let svc = service(provider.clone());

        let err = svc
            .complete_json::<Answer>(provider.as_ref(), "m", CompletionRequest::new("q"))
            .await
            .unwrap_err();
        assert!(matches!(err, AiError::Decode(DecodeError::Invalid(_))));
        assert_eq!(provider.calls(), 2);
    }

    #[tokio::test]
    async fn status_lists_both_vendors_in_order() {
        let svc = service(Arc::new(ScriptedProvider::replying(ProviderKind::Gemini, &[])));
        let statuses = svc.provider_status().await;

        assert_eq!(statuses.len(), 2);
        assert_eq!(statuses[0], ProviderStatus::not_configured(ProviderKind::OpenAi));
        assert_eq!(statuses[1].name, ProviderKind::Gemini);
        assert_eq!(statuses[1].remaining, Some(1));
    }

    #[test]
    fn provider_choice_follows_explicit_then_model_then_keys() {
        let gemini = Arc::new(ScriptedProvider::replying(ProviderKind::Gemini, &[]));
        let svc = service(gemini);

        assert_eq!(svc.choose_provider(Some("openai"), None).unwrap(), ProviderKind::OpenAi);
        assert_eq!(svc.choose_provider(None, Some("gpt-4o")).unwrap(), ProviderKind::OpenAi);
        assert_eq!(svc.choose_provider(None, Some("llama-3")).unwrap(), ProviderKind::Gemini);

        let err = svc.choose_provider(Some("azure"), None).unwrap_err();
        assert_eq!(err.to_string(), "Selected provider azure is not available");

        let openai_only = service(Arc::new(ScriptedProvider::replying(ProviderKind::OpenAi, &[])));
        assert_eq!(openai_only.choose_provider(None, None).unwrap(), ProviderKind::OpenAi);
    }
}
