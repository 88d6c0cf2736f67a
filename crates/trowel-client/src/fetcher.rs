//! HTTP fetcher using reqwest.

use std::time::Duration;

use reqwest::header::ACCEPT;
use reqwest::Client;
use serde_json::Value;

use trowel_core::traits::Fetcher;
use trowel_core::AppError;

/// Fetches JSON payloads over HTTP, asking the service explicitly for a
/// JSON representation via the accept header.
#[derive(Clone)]
pub struct ReqwestFetcher {
    client: Client,
}

impl ReqwestFetcher {
    pub fn new() -> Result<Self, AppError> {
        Self::with_timeout(Duration::from_secs(120))
    }

    pub fn with_timeout(timeout: Duration) -> Result<Self, AppError> {
        let client = Client::builder()
            .user_agent("trowel/0.2 (Open Context API client)")
            .timeout(timeout)
            .build()
            .map_err(|e| AppError::Http(e.to_string()))?;
        Ok(Self { client })
    }
}

impl Fetcher for ReqwestFetcher {
    async fn fetch(&self, url: &str, params: &[(String, String)]) -> Result<Value, AppError> {
        let response = self
            .client
            .get(url)
            .query(params)
            .header(ACCEPT, "application/json")
            .send()
            .await
            .map_err(|e| AppError::FetchFailure {
                url: url.to_string(),
                reason: e.to_string(),
            })?;

        let resolved_url = response.url().to_string();
        let status = response.status();
        if !status.is_success() {
            return Err(AppError::FetchFailure {
                url: resolved_url,
                reason: format!("HTTP {}", status.as_u16()),
            });
        }

        let payload: Value = response.json().await.map_err(|e| AppError::FetchFailure {
            url: resolved_url.clone(),
            reason: format!("unparseable response body: {e}"),
        })?;

        // A null body would otherwise masquerade as a valid payload.
        if payload.is_null() {
            return Err(AppError::FetchFailure {
                url: resolved_url,
                reason: "empty response body".to_string(),
            });
        }

        tracing::info!(url = %resolved_url, "GET success for JSON data");
        Ok(payload)
    }
}
