//! Client for the hosted backend-as-a-service: PostgREST tables and object
//! storage behind one project URL and anon key.

use reqwest::{Client, RequestBuilder, Response};
use serde::{Serialize, de::DeserializeOwned};
use thiserror::Error;
use tracing::debug;

use crate::config::BackendConfig;

mod storage;
mod usage;

pub use storage::ObjectStorage;
pub use usage::{UsageLog, UsageSink};

#[derive(Debug, Error)]
pub enum BackendError {
    #[error("backend request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("backend returned {status}: {message}")]
    Api { status: u16, message: String },

    #[error("backend is not configured")]
    NotConfigured,
}

/// Thin REST client. Cheap to clone; the inner `reqwest::Client` is shared.
#[derive(Debug, Clone)]
pub struct BackendClient {
    http: Client,
    url: String,
    anon_key: String,
}

impl BackendClient {
    pub fn new(http: Client, config: &BackendConfig) -> Self {
        Self {
            http,
            url: config.url.trim_end_matches('/').to_owned(),
            anon_key: config.anon_key.clone(),
        }
    }

    fn table_url(&self, table: &str) -> String {
        format!("{}/rest/v1/{}", self.url, table)
    }

    fn authorized(&self, builder: RequestBuilder) -> RequestBuilder {
        builder
            .header("apikey", &self.anon_key)
            .bearer_auth(&self.anon_key)
    }

    /// `GET /rest/v1/<table>?<filters>`. Filters use PostgREST syntax, for
    /// example `("id", "eq.42")` or `("order", "created_at.desc")`.
    pub async fn select<T>(&self, table: &str, filters: &[(&str, &str)]) -> Result<Vec<T>, BackendError>
    where
        T: DeserializeOwned,
    {
        debug!(table, ?filters, "backend select");
        let request = self
            .authorized(self.http.get(self.table_url(table)))
            .query(&[("select", "*")])
            .query(filters);
        let response = check(request.send().await?).await?;
        Ok(response.json().await?)
    }

    /// Inserts one row and returns the stored representation.
    pub async fn insert<B, T>(&self, table: &str, row: &B) -> Result<Vec<T>, BackendError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        debug!(table, "backend insert");
        let request = self
            .authorized(self.http.post(self.table_url(table)))
            .header("Prefer", "return=representation")
            .json(row);
        let response = check(request.send().await?).await?;
        Ok(response.json().await?)
    }

    /// Inserts without reading anything back.
    pub async fn insert_minimal<B>(&self, table: &str, row: &B) -> Result<(), BackendError>
    where
        B: Serialize + ?Sized,
    {
        let request = self
            .authorized(self.http.post(self.table_url(table)))
            .header("Prefer", "return=minimal")
            .json(row);
        check(request.send().await?).await?;
        Ok(())
    }

    /// Patches the row whose `id` equals `id`, returning the updated rows.
    pub async fn update<B, T>(&self, table: &str, id: &str, patch: &B) -> Result<Vec<T>, BackendError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        debug!(table, id, "backend update");
        let filter = format!("eq.{id}");
        let request = self
            .authorized(self.http.patch(self.table_url(table)))
            .header("Prefer", "return=representation")
            .query(&[("id", filter.as_str())])
            .json(patch);
        let response = check(request.send().await?).await?;
        Ok(response.json().await?)
    }

    /// Deletes the row whose `id` equals `id`, returning the deleted rows.
    pub async fn delete<T>(&self, table: &str, id: &str) -> Result<Vec<T>, BackendError>
    where
        T: DeserializeOwned,
    {
        debug!(table, id, "backend delete");
        let filter = format!("eq.{id}");
        let request = self
            .authorized(self.http.delete(self.table_url(table)))
            .header("Prefer", "return=representation")
            .query(&[("id", filter.as_str())]);
        let response = check(request.send().await?).await?;
        Ok(response.json().await?)
    }
}

/// Turns a non-2xx response into [`BackendError::Api`], reading the
/// PostgREST `message` field when present.
async fn check(response: Response) -> Result<Response, BackendError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    let message = serde_json::from_str::<serde_json::Value>(&body)
        .ok()
        .and_then(|v| {
            v.get("message")
                .or_else(|| v.get("error"))
                .and_then(|m| m.as_str())
                .map(str::to_owned)
        })
        .unwrap_or_else(|| status.canonical_reason().unwrap_or("Unknown error").to_owned());
    Err(BackendError::Api {
        status: status.as_u16(),
        message,
    })
}
