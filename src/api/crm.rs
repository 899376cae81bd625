use std::sync::Arc;

use chrono::Utc;
use serde::{Serialize, de::DeserializeOwned};
use serde_json::Value;
use uuid::Uuid;

use super::{AppState, ok_json, with_state};
use crate::backend::BackendError;
use crate::context::Context;
use crate::crm::{Customer, Entity, NewCustomer, Repository};
use crate::error::ApiError;
use crate::http::{Response, StatusCode};
use crate::router::Router;

fn id_param(ctx: &Context) -> String {
    ctx.params().get("id").unwrap_or_default().to_owned()
}

fn customers(state: &AppState) -> Result<Arc<dyn Repository<Customer>>, ApiError> {
    state.customers.clone().ok_or_else(|| BackendError::NotConfigured.into())
}

pub(super) async fn list_customers(state: Arc<AppState>, _ctx: Context) -> Result<Response, ApiError> {
    ok_json(&customers(&state)?.list().await?)
}

pub(super) async fn create_customer(state: Arc<AppState>, ctx: Context) -> Result<Response, ApiError> {
    let repo = customers(&state)?;
    let new: NewCustomer = ctx.json()?;
    let created = repo
        .insert(new.into_customer(Uuid::new_v4().to_string(), Utc::now()))
        .await?;
    Ok(Response::json(StatusCode::Created, &created))
}

pub(super) async fn get_customer(state: Arc<AppState>, ctx: Context) -> Result<Response, ApiError> {
    let id = id_param(&ctx);
    match customers(&state)?.get(&id).await? {
        Some(customer) => ok_json(&customer),
        None => Err(ApiError::NotFound(format!("Customer {id} not found"))),
    }
}

pub(super) async fn update_customer(state: Arc<AppState>, ctx: Context) -> Result<Response, ApiError> {
    let repo = customers(&state)?;
    let patch: Value = ctx.json()?;
    ok_json(&repo.update(&id_param(&ctx), patch).await?)
}

pub(super) async fn delete_customer(state: Arc<AppState>, ctx: Context) -> Result<Response, ApiError> {
    customers(&state)?.delete(&id_param(&ctx)).await?;
    Ok(Response::new(StatusCode::NoContent))
}

/// `POST /customers/:id/logo` with the raw image as the body.
pub(super) async fn upload_logo(state: Arc<AppState>, ctx: Context) -> Result<Response, ApiError> {
    let Some(logos) = &state.logos else {
        return Err(BackendError::NotConfigured.into());
    };
    let request = ctx.request();
    let content_type = request.headers().get("content-type");
    let customer = logos
        .upload(&id_param(&ctx), content_type, request.body().clone())
        .await?;
    ok_json(&serde_json::json!({
        "logoUrl": customer.customization.logo,
        "customer": customer,
    }))
}

/// Registers list/create/get/update/delete routes for one in-memory store.
pub(super) fn records<T>(router: &mut Router, base: &str, repo: &Arc<dyn Repository<T>>)
where
    T: Entity + Serialize + DeserializeOwned,
{
    let item = format!("{base}/:id");
    router.get(base, with_state(repo, list_records::<T>));
    router.post(base, with_state(repo, create_record::<T>));
    router.get(&item, with_state(repo, get_record::<T>));
    router.patch(&item, with_state(repo, update_record::<T>));
    router.delete(&item, with_state(repo, delete_record::<T>));
}

async fn list_records<T>(repo: Arc<dyn Repository<T>>, _ctx: Context) -> Result<Response, ApiError>
where
    T: Entity + Serialize,
{
    ok_json(&repo.list().await?)
}

/// Fills in `id`, `createdAt` and `updatedAt` when the client left them out.
fn stamp(mut body: Value) -> Result<Value, ApiError> {
    let Value::Object(fields) = &mut body else {
        return Err(ApiError::BadRequest("body must be a JSON object".to_owned()));
    };
    let now = Value::String(Utc::now().to_rfc3339());
    fields
        .entry("id")
        .or_insert_with(|| Value::String(Uuid::new_v4().to_string()));
    fields.entry("createdAt").or_insert_with(|| now.clone());
    fields.entry("updatedAt").or_insert(now);
    Ok(body)
}

async fn create_record<T>(repo: Arc<dyn Repository<T>>, ctx: Context) -> Result<Response, ApiError>
where
    T: Entity + Serialize + DeserializeOwned,
{
    let item: T = serde_json::from_value(stamp(ctx.json()?)?)?;
    let created = repo.insert(item).await?;
    Ok(Response::json(StatusCode::Created, &created))
}

async fn get_record<T>(repo: Arc<dyn Repository<T>>, ctx: Context) -> Result<Response, ApiError>
where
    T: Entity + Serialize,
{
    let id = id_param(&ctx);
    match repo.get(&id).await? {
        Some(item) => ok_json(&item),
        None => Err(ApiError::NotFound(format!("{id} not found"))),
    }
}

async fn update_record<T>(repo: Arc<dyn Repository<T>>, ctx: Context) -> Result<Response, ApiError>
where
    T: Entity + Serialize,
{
    let patch: Value = ctx.json()?;
    ok_json(&repo.update(&id_param(&ctx), patch).await?)
}

async fn delete_record<T>(repo: Arc<dyn Repository<T>>, ctx: Context) -> Result<Response, ApiError>
where
    T: Entity,
{
    repo.delete(&id_param(&ctx)).await?;
    Ok(Response::new(StatusCode::NoContent))
}
