use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::{BackendClient, BackendError};

const USAGE_TABLE: &str = "ai_usage_logs";

/// One row of AI usage accounting.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UsageLog {
    pub customer_id: String,
    pub model_id: String,
    pub feature_used: String,
    pub tokens_used: u32,
    pub cost: f64,
    pub response_time_ms: u64,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

/// Destination for usage rows. Callers treat failures as non-fatal.
#[async_trait]
pub trait UsageSink: Send + Sync {
    async fn record(&self, log: &UsageLog) -> Result<(), BackendError>;
}

#[async_trait]
impl UsageSink for BackendClient {
    async fn record(&self, log: &UsageLog) -> Result<(), BackendError> {
        self.insert_minimal(USAGE_TABLE, log).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BackendConfig;
    use mockito::{Matcher, Server};

    #[tokio::test]
    async fn usage_rows_go_to_the_usage_table() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("POST", "/rest/v1/ai_usage_logs")
            .match_body(Matcher::PartialJson(serde_json::json!({
                "customer_id": "8d1f",
                "model_id": "gemini-2.5-flash",
                "tokens_used": 120,
                "success": true
            })))
            .with_status(201)
            .create_async()
            .await;

        let client = BackendClient::new(
            reqwest::Client::new(),
            &BackendConfig {
                url: server.url(),
                anon_key: "anon".into(),
            },
        );
        let log = UsageLog {
            customer_id: "8d1f".into(),
            model_id: "gemini-2.5-flash".into(),
            feature_used: "text-generation".into(),
            tokens_used: 120,
            cost: 0.0001,
            response_time_ms: 420,
            success: true,
            error_message: None,
        };
        client.record(&log).await.unwrap();
        mock.assert_async().await;
    }
}
