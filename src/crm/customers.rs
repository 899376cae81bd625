use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value;

use super::{Customer, Repository, RepositoryError};
use crate::backend::BackendClient;

const CUSTOMER_TABLE: &str = "customers";

/// Customers stored in the backend `customers` table, newest first.
#[derive(Clone)]
pub struct BackendCustomers {
    backend: Arc<BackendClient>,
}

impl BackendCustomers {
    pub fn new(backend: Arc<BackendClient>) -> Self {
        Self { backend }
    }
}

#[async_trait]
impl Repository<Customer> for BackendCustomers {
    async fn list(&self) -> Result<Vec<Customer>, RepositoryError> {
        Ok(self
            .backend
            .select(CUSTOMER_TABLE, &[("order", "created_at.desc")])
            .await?)
    }

    async fn get(&self, id: &str) -> Result<Option<Customer>, RepositoryError> {
        let filter = format!("eq.{id}");
        let rows: Vec<Customer> = self
            .backend
            .select(CUSTOMER_TABLE, &[("id", filter.as_str())])
            .await?;
        Ok(rows.into_iter().next())
    }

    async fn insert(&self, item: Customer) -> Result<Customer, RepositoryError> {
        let rows: Vec<Customer> = self.backend.insert(CUSTOMER_TABLE, &item).await?;
        rows.into_iter()
            .next()
            .ok_or(RepositoryError::NotFound(item.id))
    }

    async fn update(&self, id: &str, patch: Value) -> Result<Customer, RepositoryError> {
        let Value::Object(mut patch) = patch else {
            return Err(RepositoryError::InvalidPatch("patch must be a JSON object".to_owned()));
        };
        patch.remove("id");
        patch.insert("updated_at".to_owned(), Value::String(Utc::now().to_rfc3339()));

        let rows: Vec<Customer> = self.backend.update(CUSTOMER_TABLE, id, &patch).await?;
        rows.into_iter()
            .next()
            .ok_or_else(|| RepositoryError::NotFound(id.to_owned()))
    }

    async fn delete(&self, id: &str) -> Result<(), RepositoryError> {
        let rows: Vec<Customer> = self.backend.delete(CUSTOMER_TABLE, id).await?;
        if rows.is_empty() {
            return Err(RepositoryError::NotFound(id.to_owned()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BackendConfig;
    use mockito::{Matcher, Server};

    const ROW: &str = r##"{
        "id": "c1",
        "company_name": "Acme",
        "contact_name": "Road Runner",
        "email": "rr@acme.test",
        "plan": "pro",
        "status": "active",
        "customization": {"colors": {"primary": "#000", "secondary": "#fff"}},
        "created_at": "2024-01-01T00:00:00Z",
        "updated_at": "2024-01-01T00:00:00Z"
    }"##;

    fn repo(url: &str) -> BackendCustomers {
        BackendCustomers::new(Arc::new(BackendClient::new(
            reqwest::Client::new(),
            &BackendConfig {
                url: url.to_owned(),
                anon_key: "anon".into(),
            },
        )))
    }

    #[tokio::test]
    async fn list_orders_newest_first() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("GET", "/rest/v1/customers")
            .match_query(Matcher::UrlEncoded("order".into(), "created_at.desc".into()))
            .with_status(200)
            .with_body(format!("[{ROW}]"))
            .create_async()
            .await;

        let customers = repo(&server.url()).list().await.unwrap();
        mock.assert_async().await;
        assert_eq!(customers[0].company_name, "Acme");
        assert_eq!(customers[0].customization.colors.as_ref().unwrap().primary, "#000");
    }

    #[tokio::test]
    async fn update_stamps_updated_at_and_drops_id() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("PATCH", "/rest/v1/customers")
            .match_query(Matcher::UrlEncoded("id".into(), "eq.c1".into()))
            .match_body(Matcher::AllOf(vec![
                Matcher::PartialJson(serde_json::json!({"plan": "pro"})),
                Matcher::Regex("updated_at".into()),
            ]))
            .with_status(200)
            .with_body(format!("[{ROW}]"))
            .create_async()
            .await;

        let customer = repo(&server.url())
            .update("c1", serde_json::json!({"plan": "pro", "id": "other"}))
            .await
            .unwrap();
        mock.assert_async().await;
        assert_eq!(customer.id, "c1");
    }

    #[tokio::test]
    async fn missing_rows_are_not_found() {
        let mut server = Server::new_async().await;
        server
            .mock("DELETE", "/rest/v1/customers")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body("[]")
            .create_async()
            .await;
        server
            .mock("GET", "/rest/v1/customers")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body("[]")
            .create_async()
            .await;

        let repo = repo(&server.url());
        assert!(matches!(repo.delete("ghost").await, Err(RepositoryError::NotFound(_))));
        assert!(repo.get("ghost").await.unwrap().is_none());
    }
}
