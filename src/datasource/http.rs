//! JSON-over-HTTP backend client
//!
//! Forwards sub-requests to a remote backend speaking the same request and
//! response shapes as this service, so meta layers can be stacked in front
//! of any compatible HTTP endpoint.

use async_trait::async_trait;
use reqwest::Client;

use crate::datasource::{Datasource, DatasourceError};
use crate::model::{QueryData, QueryRequest};

/// Configuration for an HTTP backend
#[derive(Debug, Clone)]
pub struct HttpDatasourceConfig {
    /// Base URL of the backend (e.g. "http://localhost:9090")
    pub base_url: String,
    /// Path the backend answers queries on
    pub query_path: String,
    /// Request timeout in milliseconds
    pub request_timeout_ms: u64,
}

impl Default for HttpDatasourceConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:9090".to_string(),
            query_path: "/api/v1/query".to_string(),
            request_timeout_ms: 30_000,
        }
    }
}

/// HTTP client for a single remote backend
pub struct HttpDatasource {
    client: Client,
    config: HttpDatasourceConfig,
}

impl HttpDatasource {
    /// Create a client with the given configuration
    pub fn new(config: HttpDatasourceConfig) -> Result<Self, DatasourceError> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_millis(config.request_timeout_ms))
            .build()?;

        Ok(Self { client, config })
    }

    /// The configured query endpoint URL
    fn query_url(&self) -> String {
        format!(
            "{}{}",
            self.config.base_url.trim_end_matches('/'),
            self.config.query_path
        )
    }
}

#[async_trait]
impl Datasource for HttpDatasource {
    async fn query(&self, request: QueryRequest) -> Result<QueryData, DatasourceError> {
        let url = self.query_url();

        let response = self.client.post(&url).json(&request).send().await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(DatasourceError::Status {
                status: status.as_u16(),
                body,
            });
        }

        response
            .json::<QueryData>()
            .await
            .map_err(|e| DatasourceError::Decode(e.to_string()))
    }
}
