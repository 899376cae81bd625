use std::sync::Arc;

use super::{AppState, ok_json};
use crate::ai::{AnalyzeRequest, BulkAnalyzeRequest, EmailRequest, EnrichRequest, GenerateRequest, InsightsRequest};
use crate::context::Context;
use crate::error::ApiError;
use crate::http::Response;

pub(super) async fn generate(state: Arc<AppState>, ctx: Context) -> Result<Response, ApiError> {
    let request: GenerateRequest = ctx.json()?;
    ok_json(&state.ai.generate(request).await?)
}

pub(super) async fn insights(state: Arc<AppState>, ctx: Context) -> Result<Response, ApiError> {
    let request: InsightsRequest = ctx.json()?;
    ok_json(&state.ai.insights(request).await)
}

pub(super) async fn email(state: Arc<AppState>, ctx: Context) -> Result<Response, ApiError> {
    let request: EmailRequest = ctx.json()?;
    ok_json(&state.ai.email(request).await?)
}

pub(super) async fn analyze(state: Arc<AppState>, ctx: Context) -> Result<Response, ApiError> {
    let request: AnalyzeRequest = ctx.json()?;
    ok_json(&state.ai.analyze(request).await?)
}

pub(super) async fn bulk_analyze(state: Arc<AppState>, ctx: Context) -> Result<Response, ApiError> {
    let request: BulkAnalyzeRequest = ctx.json()?;
    ok_json(&state.ai.analyze_bulk(request).await?)
}

pub(super) async fn enrich(state: Arc<AppState>, ctx: Context) -> Result<Response, ApiError> {
    let request: EnrichRequest = ctx.json()?;
    ok_json(&state.ai.enrich(request).await?)
}

pub(super) async fn providers_status(state: Arc<AppState>, _ctx: Context) -> Result<Response, ApiError> {
    ok_json(&state.ai.provider_status().await)
}
