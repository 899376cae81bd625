//! Hosted LLM providers and the plumbing shared between them.
//!
//! [`LlmProvider`] is the seam between the AI services and the vendor REST
//! APIs. [`openai::OpenAiClient`] and [`gemini::GeminiClient`] implement it
//! over one shared `reqwest` client; [`decode`] turns raw completion text into
//! typed payloads.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;

pub mod decode;
pub mod gemini;
pub mod openai;

pub use gemini::GeminiClient;
pub use openai::OpenAiClient;

use crate::config::Config;

/// The LLM vendors the gateway can talk to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    OpenAi,
    Gemini,
}

impl ProviderKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::OpenAi => "openai",
            Self::Gemini => "gemini",
        }
    }

    /// Guesses the vendor from a model id: `gpt*` models are OpenAI,
    /// `gemini*`/`gemma*` are Google.
    pub fn for_model(model: &str) -> Option<Self> {
        if model.contains("gpt") {
            Some(Self::OpenAi)
        } else if model.contains("gemini") || model.contains("gemma") {
            Some(Self::Gemini)
        } else {
            None
        }
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProviderKind {
    type Err = LlmError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "openai" => Ok(Self::OpenAi),
            "gemini" => Ok(Self::Gemini),
            other => Err(LlmError::UnknownProvider(other.to_owned())),
        }
    }
}

#[derive(Debug, Error)]
pub enum LlmError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("{provider} API error ({status}): {message}")]
    Api {
        provider: ProviderKind,
        status: u16,
        message: String,
    },

    #[error("invalid response from {0}")]
    EmptyResponse(ProviderKind),

    #[error("unknown provider: {0}")]
    UnknownProvider(String),

    #[error("Selected provider {0} is not available")]
    NotConfigured(ProviderKind),
}

/// One prompt plus sampling parameters, vendor-neutral.
#[derive(Debug, Clone, PartialEq)]
pub struct CompletionRequest {
    pub prompt: String,
    pub system: Option<String>,
    pub temperature: f64,
    pub max_tokens: Option<u32>,
    pub top_p: Option<f64>,
    pub top_k: Option<u32>,
    /// Ask for a JSON object on vendors with a native switch (OpenAI only;
    /// Gemma models reject Gemini's mime-type option).
    pub json_mode: bool,
}

impl CompletionRequest {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            system: None,
            temperature: 0.7,
            max_tokens: None,
            top_p: None,
            top_k: None,
            json_mode: false,
        }
    }

    #[must_use]
    pub fn system(mut self, system: impl Into<String>) -> Self {
        self.system = Some(system.into());
        self
    }

    #[must_use]
    pub fn temperature(mut self, temperature: f64) -> Self {
        self.temperature = temperature;
        self
    }

    #[must_use]
    pub fn max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    #[must_use]
    pub fn sampling(mut self, top_p: f64, top_k: u32) -> Self {
        self.top_p = Some(top_p);
        self.top_k = Some(top_k);
        self
    }

    #[must_use]
    pub fn json(mut self) -> Self {
        self.json_mode = true;
        self
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenUsage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

/// Raw completion text as returned by the vendor.
#[derive(Debug, Clone, PartialEq)]
pub struct Completion {
    pub text: String,
    pub usage: TokenUsage,
    pub finish_reason: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Availability {
    Available,
    RateLimited,
    Error,
    NotConfigured,
}

/// Health of one provider as reported by `/ai-providers-status`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderStatus {
    pub name: ProviderKind,
    pub status: Availability,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remaining: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ProviderStatus {
    pub fn not_configured(name: ProviderKind) -> Self {
        Self {
            name,
            status: Availability::NotConfigured,
            remaining: None,
            error: None,
        }
    }
}

#[async_trait]
pub trait LlmProvider: Send + Sync {
    fn kind(&self) -> ProviderKind;

    /// Sends one completion request to `model`.
    async fn complete(&self, model: &str, request: &CompletionRequest) -> Result<Completion, LlmError>;

    /// Probes the vendor with a cheap listing call. Never fails; problems are
    /// reported in the returned status.
    async fn status(&self) -> ProviderStatus;
}

/// Rejects empty, short, and template placeholder keys before any request
/// is made with them.
pub fn is_valid_api_key(key: &str) -> bool {
    key.len() > 10
        && !key.starts_with("your_")
        && !key.contains("placeholder")
        && !key.contains("your_google_ai_api_key")
}

/// Configured providers, keyed by vendor.
#[derive(Clone, Default)]
pub struct Providers {
    openai: Option<Arc<dyn LlmProvider>>,
    gemini: Option<Arc<dyn LlmProvider>>,
}

impl Providers {
    pub fn from_config(config: &Config) -> Result<Self, LlmError> {
        let http = reqwest::Client::builder()
            .timeout(config.llm_timeout)
            .connect_timeout(Duration::from_secs(10))
            .build()?;

        let openai = usable_key(ProviderKind::OpenAi, config.openai_api_key.as_deref()).map(|key| {
            Arc::new(OpenAiClient::new(http.clone(), &config.openai_base_url, key)) as Arc<dyn LlmProvider>
        });
        let gemini = usable_key(ProviderKind::Gemini, config.gemini_api_key.as_deref()).map(|key| {
            Arc::new(GeminiClient::new(http.clone(), &config.gemini_base_url, key)) as Arc<dyn LlmProvider>
        });

        Ok(Self { openai, gemini })
    }

    #[must_use]
    pub fn with(mut self, provider: Arc<dyn LlmProvider>) -> Self {
        match provider.kind() {
            ProviderKind::OpenAi => self.openai = Some(provider),
            ProviderKind::Gemini => self.gemini = Some(provider),
        }
        self
    }

    pub fn get(&self, kind: ProviderKind) -> Option<Arc<dyn LlmProvider>> {
        match kind {
            ProviderKind::OpenAi => self.openai.clone(),
            ProviderKind::Gemini => self.gemini.clone(),
        }
    }

    pub fn is_configured(&self, kind: ProviderKind) -> bool {
        self.get(kind).is_some()
    }

    pub fn is_empty(&self) -> bool {
        self.openai.is_none() && self.gemini.is_none()
    }
}

fn usable_key(kind: ProviderKind, key: Option<&str>) -> Option<&str> {
    let key = key?;
    if is_valid_api_key(key) {
        Some(key)
    } else {
        warn!(provider = %kind, "ignoring placeholder API key");
        None
    }
}

/// Reads `error.message` out of a vendor error body, falling back to the
/// HTTP reason phrase.
pub(crate) fn api_error_message(body: &str, status: reqwest::StatusCode) -> String {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| v["error"]["message"].as_str().map(str::to_owned))
        .unwrap_or_else(|| status.canonical_reason().unwrap_or("Unknown error").to_owned())
}
