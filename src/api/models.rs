use std::sync::Arc;

use super::{AppState, ok_json};
use crate::context::Context;
use crate::error::ApiError;
use crate::http::Response;
use crate::llm::{LlmError, ProviderKind};
use crate::recommender::{TaskType, all_recommendations, model_suitability, recommend};

pub(super) async fn recommendations(_state: Arc<AppState>, _ctx: Context) -> Result<Response, ApiError> {
    ok_json(&all_recommendations())
}

/// `GET /ai/recommendations/:task?provider=`
pub(super) async fn recommendation(_state: Arc<AppState>, ctx: Context) -> Result<Response, ApiError> {
    let task: TaskType = ctx.params().get("task").unwrap_or_default().parse()?;
    let provider = ctx.request().query_param("provider");
    ok_json(&recommend(task, provider))
}

/// `GET /ai/suitability?model=&task=`. Unknown models and tasks are reported
/// as unsuitable rather than rejected.
pub(super) async fn suitability(_state: Arc<AppState>, ctx: Context) -> Result<Response, ApiError> {
    let request = ctx.request();
    let (Some(model), Some(task)) = (request.query_param("model"), request.query_param("task")) else {
        return Err(ApiError::BadRequest("model and task query parameters are required".to_owned()));
    };
    ok_json(&model_suitability(model, task))
}

/// `GET /models?provider=`
pub(super) async fn list(state: Arc<AppState>, ctx: Context) -> Result<Response, ApiError> {
    let provider = ctx
        .request()
        .query_param("provider")
        .map(str::parse::<ProviderKind>)
        .transpose()
        .map_err(|e: LlmError| ApiError::BadRequest(e.to_string()))?;
    ok_json(&state.catalog.models_by_provider(provider).await?)
}
