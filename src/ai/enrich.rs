use serde::{Deserialize, Serialize};
use tracing::warn;

use super::{AiError, AiService};
use crate::llm::decode::Payload;
use crate::llm::{CompletionRequest, ProviderKind};

const RESEARCH_SYSTEM_PROMPT: &str = "You are an AI assistant that helps with contact research. Given information \
                                      about a person, infer likely details and return structured data.";

const ENRICHMENT_SHAPE: &str = r#"{
  "firstName": "first name",
  "lastName": "last name",
  "name": "full name",
  "email": "likely email based on name and company",
  "phone": "likely phone if available",
  "title": "job title",
  "company": "company name",
  "industry": "industry",
  "location": {"city": "city", "state": "state", "country": "country"},
  "socialProfiles": {
    "linkedin": "LinkedIn URL",
    "twitter": "Twitter URL if available",
    "website": "company or personal website"
  },
  "bio": "brief professional bio",
  "confidence": number between 40 and 90 indicating confidence level
}"#;

/// The identifiers a caller knows about a person.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnrichmentQuery {
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub last_name: Option<String>,
    #[serde(default)]
    pub company: Option<String>,
    #[serde(default)]
    pub linkedin_url: Option<String>,
}

fn present(field: &Option<String>) -> Option<&str> {
    field.as_deref().map(str::trim).filter(|s| !s.is_empty())
}

impl EnrichmentQuery {
    fn has_identifier(&self) -> bool {
        present(&self.email).is_some()
            || present(&self.linkedin_url).is_some()
            || present(&self.first_name).is_some()
            || present(&self.last_name).is_some()
    }

    /// LinkedIn beats email beats name.
    fn subject(&self, kind: ProviderKind) -> String {
        if let Some(url) = present(&self.linkedin_url) {
            return format!("Research a professional from this LinkedIn URL: {url}.");
        }
        if let Some(email) = present(&self.email) {
            return match kind {
                ProviderKind::Gemini => format!("Research information about a professional with email: {email}."),
                ProviderKind::OpenAi => format!("Research information for this contact email: {email}."),
            };
        }
        let name = [present(&self.first_name), present(&self.last_name)]
            .into_iter()
            .flatten()
            .collect::<Vec<_>>()
            .join(" ");
        match present(&self.company) {
            Some(company) => format!("Research information about a professional named {name} who works at {company}."),
            None => format!("Research information about a professional named {name}."),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnrichRequest {
    #[serde(default)]
    pub enrichment_request: Option<EnrichmentQuery>,
    #[serde(default)]
    pub provider: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Location {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub city: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub country: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SocialProfiles {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub linkedin: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub twitter: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub facebook: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub website: Option<String>,
}

/// Inferred contact details. Every field is optional; the model fills what
/// it can.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContactEnrichment {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub first_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub company: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub industry: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<Location>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub social_profiles: Option<SocialProfiles>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bio: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,
}

impl Payload for ContactEnrichment {
    fn check(&self) -> Result<(), String> {
        if self.name.is_none() && self.first_name.is_none() && self.last_name.is_none() && self.company.is_none() {
            return Err("reply names neither a person nor a company".to_owned());
        }
        match self.confidence {
            Some(c) if !(0.0..=100.0).contains(&c) => Err(format!("confidence {c} is outside 0-100")),
            _ => Ok(()),
        }
    }
}

impl ContactEnrichment {
    /// Echoes what the caller already knew.
    pub fn fallback(query: &EnrichmentQuery) -> Self {
        let first = present(&query.first_name).unwrap_or_default();
        let last = present(&query.last_name).unwrap_or_default();
        let name = if !first.is_empty() && !last.is_empty() {
            format!("{first} {last}")
        } else {
            String::new()
        };
        Self {
            first_name: Some(first.to_owned()),
            last_name: Some(last.to_owned()),
            name: Some(name),
            email: Some(present(&query.email).unwrap_or_default().to_owned()),
            company: Some(present(&query.company).unwrap_or_default().to_owned()),
            confidence: Some(30.0),
            notes: Some("API research failed, showing basic information".to_owned()),
            ..Self::default()
        }
    }
}

fn enrichment_request(kind: ProviderKind, query: &EnrichmentQuery) -> (&'static str, CompletionRequest) {
    let subject = query.subject(kind);
    match kind {
        ProviderKind::Gemini => {
            let prompt = format!("{subject}\n\nReturn a JSON object with the following structure:\n{ENRICHMENT_SHAPE}");
            let request = CompletionRequest::new(prompt)
                .temperature(0.2)
                .max_tokens(1024)
                .sampling(0.8, 32);
            ("gemini-1.5-flash", request)
        }
        ProviderKind::OpenAi => {
            let prompt = format!(
                "{subject} Return ONLY a JSON object with no other text, using this structure:\n{ENRICHMENT_SHAPE}"
            );
            let request = CompletionRequest::new(prompt)
                .system(RESEARCH_SYSTEM_PROMPT)
                .temperature(0.3)
                .json();
            ("gpt-4o-mini", request)
        }
    }
}

impl AiService {
    /// Infers profile details from an email, a LinkedIn URL or a name.
    pub async fn enrich(&self, request: EnrichRequest) -> Result<ContactEnrichment, AiError> {
        self.ensure_any_provider()?;
        let query = request
            .enrichment_request
            .ok_or_else(|| AiError::InvalidRequest("Missing enrichment request data".to_owned()))?;
        if !query.has_identifier() {
            return Err(AiError::InvalidRequest(
                "At least one identifier (email, name, or LinkedIn URL) is required".to_owned(),
            ));
        }

        let kind = match request.provider.as_deref() {
            Some(name) => self.choose_provider(Some(name), None)?,
            None if self.providers.is_configured(ProviderKind::Gemini) => ProviderKind::Gemini,
            None => ProviderKind::OpenAi,
        };
        let provider = self.provider(kind)?;

        let (model, completion) = enrichment_request(kind, &query);
        match self
            .complete_json::<ContactEnrichment>(provider.as_ref(), model, completion)
            .await
        {
            Ok(mut enrichment) => {
                let default = match kind {
                    ProviderKind::Gemini => 60.0,
                    ProviderKind::OpenAi => 75.0,
                };
                enrichment.confidence = enrichment.confidence.filter(|c| *c > 0.0).or(Some(default));
                Ok(enrichment)
            }
            Err(e) => {
                warn!(provider = %kind, error = %e, "enrichment failed, echoing known fields");
                Ok(ContactEnrichment::fallback(&query))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::ai::testing::ScriptedProvider;
    use crate::catalog::StaticCatalog;
    use crate::llm::{LlmError, Providers};

    fn service(provider: Arc<ScriptedProvider>) -> AiService {
        AiService::new(Providers::default().with(provider), Arc::new(StaticCatalog))
    }

    fn by_name() -> EnrichRequest {
        EnrichRequest {
            enrichment_request: Some(EnrichmentQuery {
                first_name: Some("Jane".into()),
                last_name: Some("Doe".into()),
                company: Some("Globex".into()),
                ..Default::default()
            }),
            provider: None,
        }
    }

    #[test]
    fn linkedin_wins_over_email_and_name() {
        let query = EnrichmentQuery {
            email: Some("jane@globex.test".into()),
            linkedin_url: Some("https://linkedin.com/in/jane".into()),
            first_name: Some("Jane".into()),
            ..Default::default()
        };
        assert_eq!(
            query.subject(ProviderKind::Gemini),
            "Research a professional from this LinkedIn URL: https://linkedin.com/in/jane."
        );

        let query = EnrichmentQuery {
            first_name: Some("Jane".into()),
            last_name: Some("Doe".into()),
            company: Some("Globex".into()),
            ..Default::default()
        };
        assert_eq!(
            query.subject(ProviderKind::OpenAi),
            "Research information about a professional named Jane Doe who works at Globex."
        );
    }

    #[tokio::test]
    async fn gemini_enrichment_defaults_confidence() {
        let gemini = Arc::new(ScriptedProvider::replying(
            ProviderKind::Gemini,
            &[r#"Here is what I found: {"name": "Jane Doe", "title": "CFO", "location": {"city": "Austin"}} Hope it helps"#],
        ));
        let svc = service(gemini.clone());

        let enrichment = svc.enrich(by_name()).await.unwrap();
        assert_eq!(enrichment.title.as_deref(), Some("CFO"));
        assert_eq!(enrichment.location.unwrap().city.as_deref(), Some("Austin"));
        assert_eq!(enrichment.confidence, Some(60.0));
        assert_eq!(gemini.requests.lock().unwrap()[0].0, "gemini-1.5-flash");
    }

    #[tokio::test]
    async fn failure_echoes_known_identifiers() {
        let openai = Arc::new(ScriptedProvider::new(
            ProviderKind::OpenAi,
            [Err(LlmError::EmptyResponse(ProviderKind::OpenAi))],
        ));
        let svc = service(openai);

        let enrichment = svc.enrich(by_name()).await.unwrap();
        assert_eq!(enrichment.name.as_deref(), Some("Jane Doe"));
        assert_eq!(enrichment.email.as_deref(), Some(""));
        assert_eq!(enrichment.company.as_deref(), Some("Globex"));
        assert_eq!(enrichment.confidence, Some(30.0));
        assert_eq!(
            enrichment.notes.as_deref(),
            Some("API research failed, showing basic information")
        );
    }

    #[tokio::test]
    async fn an_identifier_is_required() {
        let svc = service(Arc::new(ScriptedProvider::replying(ProviderKind::Gemini, &[])));

        let err = svc
            .enrich(EnrichRequest {
                enrichment_request: Some(EnrichmentQuery {
                    company: Some("Globex".into()),
                    ..Default::default()
                }),
                provider: None,
            })
            .await
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "At least one identifier (email, name, or LinkedIn URL) is required"
        );

        let err = svc.enrich(EnrichRequest::default()).await.unwrap_err();
        assert_eq!(err.to_string(), "Missing enrichment request data");
    }
}
