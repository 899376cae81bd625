//! HTTP surface: shared application state and the route table.
//!
//! | Route                                   | Handler                          |
//! |-----------------------------------------|----------------------------------|
//! | `GET /health`                           | liveness plus configured vendors |
//! | `POST /ai/generate`                     | free-form generation             |
//! | `POST /ai/insights`, `POST /ai/email`   | pipeline insights, email drafts  |
//! | `POST /ai-analyze`, `/ai-bulk-analyze`  | contact analysis                 |
//! | `POST /ai-enrich`                       | contact enrichment               |
//! | `GET /ai-providers-status`              | vendor availability              |
//! | `GET /ai/recommendations[/:task]`       | model recommender                |
//! | `GET /ai/suitability`                   | model/task fit                   |
//! | `GET /models`                           | model catalog                    |
//! | `/customers`, `/customers/:id[/logo]`   | tenants and logo uploads         |
//! | `/contacts`, `/deals`, `/tasks`, `/appointments` | in-memory CRM records   |

use std::future::Future;
use std::sync::Arc;

use futures::future::BoxFuture;
use tracing::{info, warn};

use crate::ai::AiService;
use crate::backend::BackendClient;
use crate::catalog::{BackendCatalog, ModelCatalog, StaticCatalog};
use crate::config::Config;
use crate::context::Context;
use crate::crm::{
    Appointment, BackendCustomers, Contact, Customer, Deal, InMemoryRepository, LogoUploader, Repository, Task,
    UploadError,
};
use crate::error::ApiError;
use crate::http::{Method, Request, Response, StatusCode};
use crate::llm::{LlmError, ProviderKind, Providers};
use crate::router::Router;

mod ai;
mod crm;
mod models;

/// Everything the handlers share. Built once at startup.
pub struct AppState {
    pub ai: AiService,
    pub catalog: Arc<dyn ModelCatalog>,
    /// `None` when no backend is configured.
    pub customers: Option<Arc<dyn Repository<Customer>>>,
    pub logos: Option<LogoUploader>,
    pub contacts: Arc<dyn Repository<Contact>>,
    pub deals: Arc<dyn Repository<Deal>>,
    pub tasks: Arc<dyn Repository<Task>>,
    pub appointments: Arc<dyn Repository<Appointment>>,
}

impl AppState {
    /// State with the given AI service and catalog, no backend, and empty
    /// in-memory CRM stores.
    pub fn new(ai: AiService, catalog: Arc<dyn ModelCatalog>) -> Self {
        Self {
            ai,
            catalog,
            customers: None,
            logos: None,
            contacts: Arc::new(InMemoryRepository::new()),
            deals: Arc::new(InMemoryRepository::new()),
            tasks: Arc::new(InMemoryRepository::new()),
            appointments: Arc::new(InMemoryRepository::new()),
        }
    }

    #[must_use]
    pub fn with_customers(mut self, customers: Arc<dyn Repository<Customer>>) -> Self {
        self.customers = Some(customers);
        self
    }

    #[must_use]
    pub fn with_logos(mut self, logos: LogoUploader) -> Self {
        self.logos = Some(logos);
        self
    }

    /// Wires providers, catalog, usage logging and the customer store from
    /// configuration. Without a backend the built-in model table is used
    /// and customer routes answer 503.
    pub fn from_config(config: &Config) -> Result<Self, LlmError> {
        let providers = Providers::from_config(config)?;
        for kind in [ProviderKind::OpenAi, ProviderKind::Gemini] {
            if !providers.is_configured(kind) {
                warn!(provider = %kind, "no API key configured");
            }
        }

        let Some(backend_config) = &config.backend else {
            info!("no backend configured, using built-in model table");
            let catalog: Arc<dyn ModelCatalog> = Arc::new(StaticCatalog);
            return Ok(Self::new(AiService::new(providers, Arc::clone(&catalog)), catalog));
        };

        let http = reqwest::Client::builder().timeout(config.llm_timeout).build()?;
        let backend = Arc::new(BackendClient::new(http, backend_config));
        let catalog: Arc<dyn ModelCatalog> = Arc::new(BackendCatalog::new(Arc::clone(&backend)));
        let ai = AiService::new(providers, Arc::clone(&catalog)).with_usage_sink(backend.clone());
        let customers: Arc<dyn Repository<Customer>> = Arc::new(BackendCustomers::new(Arc::clone(&backend)));
        let logos = LogoUploader::new(
            backend,
            Arc::clone(&customers),
            config.logo_bucket.as_str(),
            config.logo_max_size_mb,
        );

        Ok(Self::new(ai, catalog).with_customers(customers).with_logos(logos))
    }
}

/// Adapts `f(state, ctx) -> Result<Response, ApiError>` to a router handler,
/// rendering errors as JSON.
fn with_state<S, F, Fut>(state: &Arc<S>, f: F) -> impl Fn(Context) -> BoxFuture<'static, Response> + Send + Sync + 'static
where
    S: ?Sized + Send + Sync + 'static,
    F: Fn(Arc<S>, Context) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Response, ApiError>> + Send + 'static,
{
    let state = Arc::clone(state);
    move |ctx| {
        let fut = f(Arc::clone(&state), ctx);
        Box::pin(async move { fut.await.unwrap_or_else(ApiError::into_response) })
    }
}

fn ok_json<T: serde::Serialize + ?Sized>(value: &T) -> Result<Response, ApiError> {
    Ok(Response::json(StatusCode::Ok, value))
}

pub fn build_router(state: Arc<AppState>) -> Router {
    let mut router = Router::new();

    router.get("/health", with_state(&state, health));

    router.post("/ai/generate", with_state(&state, ai::generate));
    router.post("/ai/insights", with_state(&state, ai::insights));
    router.post("/ai/email", with_state(&state, ai::email));
    router.post("/ai-analyze", with_state(&state, ai::analyze));
    router.post("/ai-bulk-analyze", with_state(&state, ai::bulk_analyze));
    router.post("/ai-enrich", with_state(&state, ai::enrich));
    router.get("/ai-providers-status", with_state(&state, ai::providers_status));

    router.get("/ai/recommendations", with_state(&state, models::recommendations));
    router.get("/ai/recommendations/:task", with_state(&state, models::recommendation));
    router.get("/ai/suitability", with_state(&state, models::suitability));
    router.get("/models", with_state(&state, models::list));

    router.get("/customers", with_state(&state, crm::list_customers));
    router.post("/customers", with_state(&state, crm::create_customer));
    router.get("/customers/:id", with_state(&state, crm::get_customer));
    router.patch("/customers/:id", with_state(&state, crm::update_customer));
    router.delete("/customers/:id", with_state(&state, crm::delete_customer));
    router.post("/customers/:id/logo", with_state(&state, crm::upload_logo));

    crm::records(&mut router, "/contacts", &state.contacts);
    crm::records(&mut router, "/deals", &state.deals);
    crm::records(&mut router, "/tasks", &state.tasks);
    crm::records(&mut router, "/appointments", &state.appointments);

    router
}

/// Reply for requests the server refuses before routing because their
/// declared body is over the cap. Logo uploads name the logo limit.
pub fn payload_too_large(config: &Config) -> impl Fn(&Request) -> Response + Send + Sync + 'static {
    let max_mb = config.logo_max_size_mb;
    move |req| {
        let error = if is_logo_upload(req) {
            ApiError::from(UploadError::TooLarge { max_mb })
        } else {
            ApiError::PayloadTooLarge("Request entity too large".to_owned())
        };
        error.into_response()
    }
}

fn is_logo_upload(req: &Request) -> bool {
    let segments: Vec<&str> = req.path().trim_matches('/').split('/').collect();
    *req.method() == Method::Post && matches!(segments.as_slice(), ["customers", id, "logo"] if !id.is_empty())
}

async fn health(state: Arc<AppState>, _ctx: Context) -> Result<Response, ApiError> {
    let providers = state.ai.providers();
    ok_json(&serde_json::json!({
        "status": "ok",
        "providers": {
            "openai": providers.is_configured(ProviderKind::OpenAi),
            "gemini": providers.is_configured(ProviderKind::Gemini),
        },
        "backend": state.customers.is_some(),
    }))
}
