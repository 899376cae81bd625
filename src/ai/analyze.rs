use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::{info, warn};

use super::{AiError, AiService, elapsed_ms};
use crate::llm::decode::Payload;
use crate::llm::{CompletionRequest, LlmProvider, ProviderKind};

pub const MAX_BULK_CONTACTS: usize = 50;
const BULK_BATCH_SIZE: usize = 10;

const ANALYST_SYSTEM_PROMPT: &str = "You are an expert CRM analyst with deep expertise in sales, marketing, and \
                                     customer relationship management. Analyze the contact information provided \
                                     and return a structured JSON response.";

const ANALYSIS_SHAPE: &str = r#"{
  "score": number between 0-100 representing lead quality,
  "confidence": number between 0-100 representing confidence in the analysis,
  "insights": array of strings with key observations,
  "recommendations": array of strings with action recommendations,
  "categories": array of category strings,
  "tags": array of suggested tag strings
}"#;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AnalysisType {
    Scoring,
    Enrichment,
    Categorization,
    Tagging,
    Relationships,
}

impl AnalysisType {
    const ALL: [Self; 5] = [
        Self::Scoring,
        Self::Enrichment,
        Self::Categorization,
        Self::Tagging,
        Self::Relationships,
    ];

    fn instruction(self, kind: ProviderKind) -> Option<&'static str> {
        match (self, kind) {
            (Self::Scoring, ProviderKind::Gemini) => Some("Score this contact's potential value (0-100) and explain why."),
            (Self::Scoring, ProviderKind::OpenAi) => Some("Assign a lead score from 0-100 based on potential value."),
            (Self::Categorization, _) => Some("Categorize this contact into relevant business categories."),
            (Self::Tagging, _) => Some("Suggest relevant tags for this contact."),
            (Self::Relationships, _) => Some("Describe how this contact relates to their company and network."),
            (Self::Enrichment, _) => None,
        }
    }
}

/// Relationship analysis gets the stronger model of the vendor.
fn default_model(kind: ProviderKind, types: &[AnalysisType]) -> &'static str {
    let deep = types.contains(&AnalysisType::Relationships);
    match (kind, deep) {
        (ProviderKind::OpenAi, true) => "gpt-4o",
        (ProviderKind::OpenAi, false) => "gpt-4o-mini",
        (ProviderKind::Gemini, true) => "gemini-1.5-pro",
        (ProviderKind::Gemini, false) => "gemini-1.5-flash",
    }
}

fn default_confidence(kind: ProviderKind) -> f64 {
    match kind {
        ProviderKind::OpenAi => 80.0,
        ProviderKind::Gemini => 70.0,
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalyzeOptions {
    #[serde(default)]
    pub provider: Option<String>,
    #[serde(default)]
    pub model: Option<String>,
    /// Accepted for client compatibility; results are never cached.
    #[serde(default)]
    pub force_refresh: bool,
    #[serde(default)]
    pub include_confidence: bool,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalyzeRequest {
    #[serde(default)]
    pub contact_id: String,
    /// Free-form contact record. `industry`, when present, seeds the
    /// fallback category.
    #[serde(default)]
    pub contact: Option<Value>,
    #[serde(default)]
    pub analysis_types: Vec<AnalysisType>,
    #[serde(default)]
    pub options: AnalyzeOptions,
}

/// What the model is asked to return for one contact.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisPayload {
    #[serde(default)]
    pub score: Option<f64>,
    #[serde(default)]
    pub confidence: Option<f64>,
    pub insights: Vec<String>,
    pub recommendations: Vec<String>,
    #[serde(default)]
    pub categories: Vec<String>,
    #[serde(default)]
    pub tags: Vec<String>,
}

fn percentage(name: &str, value: Option<f64>) -> Result<(), String> {
    match value {
        Some(v) if !(0.0..=100.0).contains(&v) => Err(format!("{name} {v} is outside 0-100")),
        _ => Ok(()),
    }
}

impl Payload for AnalysisPayload {
    fn check(&self) -> Result<(), String> {
        percentage("score", self.score)?;
        percentage("confidence", self.confidence)
    }
}

impl AnalysisPayload {
    /// Canned analysis returned when the model cannot be reached or keeps
    /// replying with garbage.
    pub fn fallback(contact: &Value) -> Self {
        let industry = contact
            .get("industry")
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
            .unwrap_or("Unknown");
        Self {
            score: Some(60.0),
            confidence: Some(40.0),
            insights: vec![
                "Analysis could not be completed with full confidence".to_owned(),
                "Based on available data, this contact appears to be a potential lead".to_owned(),
            ],
            recommendations: vec!["Follow up to gather more information".to_owned()],
            categories: vec![industry.to_owned()],
            tags: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContactAnalysis {
    pub contact_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub score: Option<f64>,
    pub confidence: f64,
    pub insights: Vec<String>,
    pub recommendations: Vec<String>,
    pub categories: Vec<String>,
    pub tags: Vec<String>,
    pub provider: ProviderKind,
    pub model: String,
    pub timestamp: DateTime<Utc>,
    pub processing_time: u64,
}

impl ContactAnalysis {
    fn new(contact_id: String, payload: AnalysisPayload, provider: ProviderKind, model: String, started: Instant) -> Self {
        Self {
            contact_id,
            score: payload.score,
            confidence: payload
                .confidence
                .filter(|c| *c > 0.0)
                .unwrap_or_else(|| default_confidence(provider)),
            insights: payload.insights,
            recommendations: payload.recommendations,
            categories: payload.categories,
            tags: payload.tags,
            provider,
            model,
            timestamp: Utc::now(),
            processing_time: elapsed_ms(started),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BulkAnalyzeRequest {
    #[serde(default)]
    pub contact_ids: Vec<String>,
    #[serde(default)]
    pub analysis_types: Vec<AnalysisType>,
    #[serde(default)]
    pub options: AnalyzeOptions,
    /// Contact records by id. Ids without a record are analyzed as `{"id": id}`.
    #[serde(default)]
    pub contacts: HashMap<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FailedAnalysis {
    pub contact_id: String,
    pub error: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BulkSummary {
    pub total: usize,
    pub successful: usize,
    pub failed: usize,
    pub average_score: f64,
    pub processing_time: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BulkAnalysis {
    pub results: Vec<ContactAnalysis>,
    pub failed: Vec<FailedAnalysis>,
    pub summary: BulkSummary,
}

fn analysis_request(kind: ProviderKind, contact: &Value, types: &[AnalysisType]) -> CompletionRequest {
    let pretty = serde_json::to_string_pretty(contact).unwrap_or_else(|_| contact.to_string());
    let mut prompt = match kind {
        ProviderKind::Gemini => format!("Analyze this contact information and provide insights:\n\n{pretty}\n\n"),
        ProviderKind::OpenAi => format!("Analyze this contact:\n\n{pretty}\n\n"),
    };
    for line in AnalysisType::ALL
        .into_iter()
        .filter(|t| types.contains(t))
        .filter_map(|t| t.instruction(kind))
    {
        prompt.push_str(line);
        prompt.push('\n');
    }

    match kind {
        ProviderKind::Gemini => {
            prompt.push_str("\nReturn a JSON object with the following structure:\n");
            prompt.push_str(ANALYSIS_SHAPE);
            CompletionRequest::new(prompt)
                .temperature(0.2)
                .max_tokens(1024)
                .sampling(0.8, 32)
        }
        ProviderKind::OpenAi => {
            prompt.push_str("Provide key insights and recommendations. Return ONLY a JSON object with no other text, ");
            prompt.push_str("using this structure:\n");
            prompt.push_str(ANALYSIS_SHAPE);
            CompletionRequest::new(prompt)
                .system(ANALYST_SYSTEM_PROMPT)
                .temperature(0.3)
                .json()
        }
    }
}

impl AiService {
    /// Analyzes one contact. Provider and decode failures yield the fallback
    /// analysis; only request validation and provider selection fail.
    pub async fn analyze(&self, request: AnalyzeRequest) -> Result<ContactAnalysis, AiError> {
        self.ensure_any_provider()?;
        let AnalyzeRequest {
            contact_id,
            contact,
            analysis_types,
            options,
        } = request;
        let contact = match contact {
            Some(contact) if !contact_id.is_empty() && !analysis_types.is_empty() => contact,
            _ => {
                return Err(AiError::InvalidRequest(
                    "Invalid request: missing required parameters".to_owned(),
                ));
            }
        };

        let kind = self.choose_provider(options.provider.as_deref(), options.model.as_deref())?;
        let provider = self.provider(kind)?;
        let model = options
            .model
            .unwrap_or_else(|| default_model(kind, &analysis_types).to_owned());

        let started = Instant::now();
        let request = analysis_request(kind, &contact, &analysis_types);
        let payload = match self.complete_json(provider.as_ref(), &model, request).await {
            Ok(payload) => payload,
            Err(e) => {
                warn!(contact_id = %contact_id, provider = %kind, model = %model, error = %e, "analysis failed, using fallback");
                AnalysisPayload::fallback(&contact)
            }
        };

        Ok(ContactAnalysis::new(contact_id, payload, kind, model, started))
    }

    /// Analyzes up to [`MAX_BULK_CONTACTS`] contacts, ten at a time.
    /// Per-contact failures are reported in `failed` rather than replaced
    /// by a fallback.
    pub async fn analyze_bulk(&self, request: BulkAnalyzeRequest) -> Result<BulkAnalysis, AiError> {
        self.ensure_any_provider()?;
        if request.contact_ids.is_empty() {
            return Err(AiError::InvalidRequest("Contact IDs are required".to_owned()));
        }
        if request.analysis_types.is_empty() {
            return Err(AiError::InvalidRequest("Analysis types are required".to_owned()));
        }
        if request.contact_ids.len() > MAX_BULK_CONTACTS {
            return Err(AiError::InvalidRequest(format!(
                "Bulk analysis is limited to {MAX_BULK_CONTACTS} contacts at a time"
            )));
        }

        let started = Instant::now();
        let options = &request.options;
        let selection = self
            .choose_provider(options.provider.as_deref(), options.model.as_deref())
            .and_then(|kind| {
                self.providers
                    .get(kind)
                    .map(|provider| (kind, provider))
                    .ok_or_else(|| AiError::InvalidRequest(format!("Selected provider {kind} has no API key configured")))
            });

        let mut results = Vec::with_capacity(request.contact_ids.len());
        let mut failed = Vec::new();
        for batch in request.contact_ids.chunks(BULK_BATCH_SIZE) {
            let outcomes = join_all(batch.iter().map(|id| {
                let contact = request
                    .contacts
                    .get(id)
                    .cloned()
                    .unwrap_or_else(|| json!({ "id": id }));
                self.analyze_one(id, contact, &selection, &request)
            }))
            .await;

            for (id, outcome) in batch.iter().zip(outcomes) {
                match outcome {
                    Ok(analysis) => results.push(analysis),
                    Err(e) => {
                        warn!(contact_id = %id, error = %e, "bulk analysis failed for contact");
                        failed.push(FailedAnalysis {
                            contact_id: id.clone(),
                            error: e.to_string(),
                        });
                    }
                }
            }
        }

        let average_score = if results.is_empty() {
            0.0
        } else {
            let total: f64 = results.iter().map(|r| r.score.unwrap_or(0.0)).sum();
            total / results.len() as f64
        };
        let summary = BulkSummary {
            total: request.contact_ids.len(),
            successful: results.len(),
            failed: failed.len(),
            average_score,
            processing_time: elapsed_ms(started),
        };
        info!(
            total = summary.total,
            successful = summary.successful,
            failed = summary.failed,
            "bulk analysis finished"
        );

        Ok(BulkAnalysis {
            results,
            failed,
            summary,
        })
    }

    async fn analyze_one(
        &self,
        contact_id: &str,
        contact: Value,
        selection: &Result<(ProviderKind, Arc<dyn LlmProvider>), AiError>,
        request: &BulkAnalyzeRequest,
    ) -> Result<ContactAnalysis, AiError> {
        let (kind, provider) = match selection {
            Ok((kind, provider)) => (*kind, provider),
            Err(e) => return Err(AiError::InvalidRequest(e.to_string())),
        };
        let model = request
            .options
            .model
            .clone()
            .unwrap_or_else(|| default_model(kind, &request.analysis_types).to_owned());

        let started = Instant::now();
        let completion = analysis_request(kind, &contact, &request.analysis_types);
        let payload = self.complete_json(provider.as_ref(), &model, completion).await?;
        Ok(ContactAnalysis::new(contact_id.to_owned(), payload, kind, model, started))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ai::testing::ScriptedProvider;
    use crate::catalog::StaticCatalog;
    use crate::llm::{LlmError, Providers};

    fn service(providers: impl IntoIterator<Item = Arc<ScriptedProvider>>) -> AiService {
        let providers = providers
            .into_iter()
            .fold(Providers::default(), |acc, p| acc.with(p));
        AiService::new(providers, Arc::new(StaticCatalog))
    }

    fn request(types: &[AnalysisType]) -> AnalyzeRequest {
        AnalyzeRequest {
            contact_id: "c-42".into(),
            contact: Some(json!({"id": "c-42", "name": "Jane Doe", "industry": "Fintech"})),
            analysis_types: types.to_vec(),
            options: AnalyzeOptions::default(),
        }
    }

    #[tokio::test]
    async fn gemini_reply_is_decoded_with_default_confidence() {
        let gemini = Arc::new(ScriptedProvider::replying(
            ProviderKind::Gemini,
            &["```json\n{\"score\": 82, \"insights\": [\"CFO\"], \"recommendations\": [\"Call\"], \"tags\": [\"vip\"]}\n```"],
        ));
        let svc = service([gemini.clone()]);

        let analysis = svc
            .analyze(request(&[AnalysisType::Scoring, AnalysisType::Tagging]))
            .await
            .unwrap();

        assert_eq!(analysis.contact_id, "c-42");
        assert_eq!(analysis.score, Some(82.0));
        assert_eq!(analysis.confidence, 70.0);
        assert_eq!(analysis.tags, vec!["vip"]);
        assert_eq!(analysis.provider, ProviderKind::Gemini);
        assert_eq!(analysis.model, "gemini-1.5-flash");

        let requests = gemini.requests.lock().unwrap();
        let (_, sent) = &requests[0];
        assert!(sent.prompt.contains("Score this contact's potential value"));
        assert!(sent.prompt.contains("Suggest relevant tags"));
        assert!(!sent.prompt.contains("Categorize"));
        assert_eq!((sent.temperature, sent.top_k, sent.max_tokens), (0.2, Some(32), Some(1024)));
    }

    #[tokio::test]
    async fn openai_gets_system_prompt_and_json_mode() {
        let openai = Arc::new(ScriptedProvider::replying(
            ProviderKind::OpenAi,
            &[r#"{"insights": [], "recommendations": []}"#],
        ));
        let svc = service([openai.clone()]);
        let mut req = request(&[AnalysisType::Relationships]);
        req.options.provider = Some("openai".into());

        let analysis = svc.analyze(req).await.unwrap();
        assert_eq!(analysis.model, "gpt-4o");
        assert_eq!(analysis.confidence, 80.0);
        assert_eq!(analysis.score, None);

        let requests = openai.requests.lock().unwrap();
        assert!(requests[0].1.json_mode);
        assert!(requests[0].1.system.as_deref().unwrap().starts_with("You are an expert CRM analyst"));
    }

    #[tokio::test]
    async fn provider_failure_yields_fallback_analysis() {
        let gemini = Arc::new(ScriptedProvider::new(
            ProviderKind::Gemini,
            [Err(LlmError::Api {
                provider: ProviderKind::Gemini,
                status: 500,
                message: "boom".into(),
            })],
        ));
        let svc = service([gemini]);

        let analysis = svc.analyze(request(&[AnalysisType::Scoring])).await.unwrap();
        assert_eq!(analysis.score, Some(60.0));
        assert_eq!(analysis.confidence, 40.0);
        assert_eq!(analysis.categories, vec!["Fintech"]);
        assert_eq!(analysis.recommendations, vec!["Follow up to gather more information"]);
        assert!(analysis.tags.is_empty());
    }

    #[tokio::test]
    async fn out_of_range_scores_fail_closed() {
        let gemini = Arc::new(ScriptedProvider::replying(
            ProviderKind::Gemini,
            &[
                r#"{"score": 140, "insights": [], "recommendations": []}"#,
                r#"{"score": 140, "insights": [], "recommendations": []}"#,
            ],
        ));
        let svc = service([gemini.clone()]);

        let analysis = svc.analyze(request(&[AnalysisType::Scoring])).await.unwrap();
        assert_eq!(analysis.score, Some(60.0));
        assert_eq!(gemini.calls(), 2);
    }

    #[tokio::test]
    async fn validation_errors_are_reported() {
        let svc = service([Arc::new(ScriptedProvider::replying(ProviderKind::Gemini, &[]))]);
        let err = svc.analyze(request(&[])).await.unwrap_err();
        assert_eq!(err.to_string(), "Invalid request: missing required parameters");

        let mut req = request(&[AnalysisType::Scoring]);
        req.options.provider = Some("openai".into());
        let err = svc.analyze(req).await.unwrap_err();
        assert_eq!(err.to_string(), "Selected provider openai is not available");

        let err = service(Vec::new()).analyze(request(&[AnalysisType::Scoring])).await.unwrap_err();
        assert_eq!(err.to_string(), "No AI provider API keys configured");
    }

    #[tokio::test]
    async fn bulk_collects_failures_and_averages_scores() {
        let gemini = Arc::new(ScriptedProvider::new(
            ProviderKind::Gemini,
            [
                Ok(r#"{"score": 80, "insights": [], "recommendations": []}"#.to_owned()),
                Err(LlmError::EmptyResponse(ProviderKind::Gemini)),
                Ok(r#"{"score": 40, "insights": [], "recommendations": []}"#.to_owned()),
            ],
        ));
        let svc = service([gemini.clone()]);

        let report = svc
            .analyze_bulk(BulkAnalyzeRequest {
                contact_ids: vec!["a".into(), "b".into(), "c".into()],
                analysis_types: vec![AnalysisType::Scoring],
                contacts: HashMap::from([("a".to_owned(), json!({"id": "a", "name": "Ann"}))]),
                ..Default::default()
            })
            .await
            .unwrap();

        assert_eq!(report.summary.total, 3);
        assert_eq!(report.summary.successful, 2);
        assert_eq!(report.summary.failed, 1);
        assert_eq!(report.summary.average_score, 60.0);
        assert_eq!(report.failed[0].contact_id, "b");
        assert_eq!(report.failed[0].error, "invalid response from gemini");

        let requests = gemini.requests.lock().unwrap();
        assert!(requests[0].1.prompt.contains("\"Ann\""));
        assert!(requests[1].1.prompt.contains("\"id\": \"b\""));
    }

    #[tokio::test]
    async fn bulk_without_selected_key_fails_every_contact() {
        let svc = service([Arc::new(ScriptedProvider::replying(ProviderKind::Gemini, &[]))]);
        let options = AnalyzeOptions {
            model: Some("gpt-4o-mini".into()),
            ..Default::default()
        };

        let report = svc
            .analyze_bulk(BulkAnalyzeRequest {
                contact_ids: vec!["a".into(), "b".into()],
                analysis_types: vec![AnalysisType::Tagging],
                options,
                ..Default::default()
            })
            .await
            .unwrap();

        assert!(report.results.is_empty());
        assert_eq!(report.summary.average_score, 0.0);
        assert!(report
            .failed
            .iter()
            .all(|f| f.error == "Selected provider openai has no API key configured"));
    }

    #[tokio::test]
    async fn bulk_limits_are_enforced() {
        let svc = service([Arc::new(ScriptedProvider::replying(ProviderKind::Gemini, &[]))]);

        let err = svc.analyze_bulk(BulkAnalyzeRequest::default()).await.unwrap_err();
        assert_eq!(err.to_string(), "Contact IDs are required");

        let err = svc
            .analyze_bulk(BulkAnalyzeRequest {
                contact_ids: (0..51).map(|i| i.to_string()).collect(),
                analysis_types: vec![AnalysisType::Scoring],
                ..Default::default()
            })
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "Bulk analysis is limited to 50 contacts at a time");
    }
}
