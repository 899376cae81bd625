//! AI model configurations: pricing, limits and capabilities per model id.
//!
//! The backend table `ai_model_configs` is authoritative. When it is
//! unreachable or has no row for an id, the built-in table is used instead.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};

use crate::backend::{BackendClient, BackendError};
use crate::llm::ProviderKind;

mod fallback;

pub use fallback::{DEFAULT_MODEL, fallback_model, fallback_models};

const MODEL_TABLE: &str = "ai_model_configs";

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Pricing {
    pub input_per_1m_tokens: f64,
    pub output_per_1m_tokens: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelConfig {
    pub id: String,
    pub provider: ProviderKind,
    pub model_name: String,
    pub display_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub pricing: Option<Pricing>,
    #[serde(default)]
    pub context_window: u32,
    #[serde(default)]
    pub max_tokens: Option<u32>,
    #[serde(default)]
    pub capabilities: Vec<String>,
    #[serde(default)]
    pub use_cases: Vec<String>,
    #[serde(default)]
    pub is_recommended: bool,
    #[serde(default = "active")]
    pub is_active: bool,
}

fn active() -> bool {
    true
}

impl ModelConfig {
    pub fn supports(&self, capability: &str) -> bool {
        self.capabilities.iter().any(|c| c == capability)
    }

    /// Estimated cost of `total_tokens`, split 70/30 between input and output.
    pub fn cost(&self, total_tokens: u32) -> f64 {
        let Some(pricing) = self.pricing else {
            return 0.0;
        };
        let input = (f64::from(total_tokens) * 0.7).floor();
        let output = f64::from(total_tokens) - input;
        input / 1_000_000.0 * pricing.input_per_1m_tokens + output / 1_000_000.0 * pricing.output_per_1m_tokens
    }
}

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("Model {0} not found in configuration and no fallback available")]
    UnknownModel(String),

    #[error(transparent)]
    Backend(#[from] BackendError),
}

/// Read access to model configurations.
#[async_trait]
pub trait ModelCatalog: Send + Sync {
    async fn model(&self, id: &str) -> Result<Option<ModelConfig>, CatalogError>;

    async fn models_by_provider(&self, provider: Option<ProviderKind>) -> Result<Vec<ModelConfig>, CatalogError>;

    async fn recommended_for(&self, use_case: &str) -> Result<Vec<ModelConfig>, CatalogError>;
}

/// Finds the configuration for `id`: catalog first, then the built-in table,
/// then the default model. Catalog errors are logged and treated as a miss.
pub async fn resolve(catalog: &dyn ModelCatalog, id: &str) -> Result<ModelConfig, CatalogError> {
    match catalog.model(id).await {
        Ok(Some(config)) => return Ok(config),
        Ok(None) => {}
        Err(e) => warn!(model = id, error = %e, "model lookup failed, using built-in configuration"),
    }

    if let Some(config) = fallback_model(id) {
        info!(model = id, "using built-in configuration");
        return Ok(config);
    }

    warn!(model = id, default = DEFAULT_MODEL, "unknown model, using default");
    fallback_model(DEFAULT_MODEL).ok_or_else(|| CatalogError::UnknownModel(id.to_owned()))
}

/// Catalog backed only by the built-in table.
#[derive(Debug, Clone, Copy, Default)]
pub struct StaticCatalog;

#[async_trait]
impl ModelCatalog for StaticCatalog {
    async fn model(&self, id: &str) -> Result<Option<ModelConfig>, CatalogError> {
        Ok(fallback_model(id))
    }

    async fn models_by_provider(&self, provider: Option<ProviderKind>) -> Result<Vec<ModelConfig>, CatalogError> {
        Ok(fallback_models()
            .into_iter()
            .filter(|m| provider.is_none_or(|p| m.provider == p))
            .collect())
    }

    async fn recommended_for(&self, use_case: &str) -> Result<Vec<ModelConfig>, CatalogError> {
        Ok(fallback_models()
            .into_iter()
            .filter(|m| m.use_cases.iter().any(|u| u == use_case))
            .collect())
    }
}

/// Catalog reading `ai_model_configs`. Listing calls fall back to the
/// built-in table on backend failure; single lookups report the error so
/// [`resolve`] can log it.
#[derive(Clone)]
pub struct BackendCatalog {
    backend: Arc<BackendClient>,
}

impl BackendCatalog {
    pub fn new(backend: Arc<BackendClient>) -> Self {
        Self { backend }
    }
}

#[async_trait]
impl ModelCatalog for BackendCatalog {
    async fn model(&self, id: &str) -> Result<Option<ModelConfig>, CatalogError> {
        let filter = format!("eq.{id}");
        let rows: Vec<ModelConfig> = self
            .backend
            .select(MODEL_TABLE, &[("id", filter.as_str()), ("is_active", "eq.true")])
            .await?;
        Ok(rows.into_iter().next())
    }

    async fn models_by_provider(&self, provider: Option<ProviderKind>) -> Result<Vec<ModelConfig>, CatalogError> {
        let provider_filter = provider.map(|p| format!("eq.{p}"));
        let mut filters = vec![("is_active", "eq.true"), ("order", "display_name.asc")];
        if let Some(filter) = &provider_filter {
            filters.push(("provider", filter.as_str()));
        }

        match self.backend.select(MODEL_TABLE, &filters).await {
            Ok(rows) => Ok(rows),
            Err(e) => {
                warn!(error = %e, "listing models failed, using built-in configurations");
                StaticCatalog.models_by_provider(provider).await
            }
        }
    }

    async fn recommended_for(&self, use_case: &str) -> Result<Vec<ModelConfig>, CatalogError> {
        let filter = format!("cs.{{{use_case}}}");
        let filters = [
            ("is_active", "eq.true"),
            ("use_cases", filter.as_str()),
            ("order", "is_recommended.desc"),
        ];

        match self.backend.select(MODEL_TABLE, &filters).await {
            Ok(rows) => Ok(rows),
            Err(e) => {
                warn!(error = %e, use_case, "recommended model lookup failed, using built-in configurations");
                StaticCatalog.recommended_for(use_case).await
            }
        }
    }
}
