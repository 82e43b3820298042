//! HTTP transport for the signal ingestion API
//!
//! `POST <base>/api/v1/apps/{appID}/signals/multiple/` with a JSON array of
//! signals as the body.

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, CONTENT_TYPE};

use crate::config::{ClientConfig, DeliveryConfig};
use crate::error::{DeliveryError, Error, Result};
use crate::signal::Signal;

use super::transport::Transport;

/// HTTP client for the ingestion endpoint
#[derive(Debug, Clone)]
pub struct HttpTransport {
    http_client: reqwest::Client,
    endpoint: String,
    show_debug_logs: bool,
}

impl HttpTransport {
    /// Create a transport from configuration
    ///
    /// Returns an error if the app id or base URL is invalid.
    pub fn new(client: &ClientConfig, delivery: &DeliveryConfig) -> Result<Self> {
        client.validate()?;
        let app_id = client.app_uuid()?;

        let endpoint = format!(
            "{}/api/v1/apps/{}/signals/multiple/",
            client.api_base_url.trim_end_matches('/'),
            app_id
        );

        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        let http_client = reqwest::Client::builder()
            .timeout(delivery.timeout())
            .default_headers(headers)
            .build()
            .map_err(|e| Error::Config(format!("failed to create HTTP client: {}", e)))?;

        Ok(Self {
            http_client,
            endpoint,
            show_debug_logs: client.show_debug_logs,
        })
    }

    /// Full URL batches are posted to
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(&self, batch: &[Signal]) -> std::result::Result<(), DeliveryError> {
        if self.show_debug_logs {
            if let Ok(body) = serde_json::to_string(batch) {
                tracing::info!(url = %self.endpoint, body = %body, "Posting signals");
            }
        }

        let response = self
            .http_client
            .post(&self.endpoint)
            .json(batch)
            .send()
            .await
            .map_err(|e| DeliveryError::Transport(format!("HTTP request failed: {}", e)))?;

        let status = response.status();

        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "unknown".to_string());
            tracing::debug!(status = %status, body = %error_text, "Ingestion API rejected batch");
            return Err(DeliveryError::from_status(status.as_u16()));
        }

        if self.show_debug_logs {
            if let Ok(text) = response.text().await {
                tracing::info!(status = %status, body = %text, "Ingestion API response");
            }
        }

        Ok(())
    }
}
