//! Request pacing for polite fetching.
//!
//! Wraps any [`Fetcher`] with a fixed delay before every delegated call,
//! bounding the request rate against the upstream API. Cache hits are
//! resolved before the fetcher is ever reached, so cached reads pay no
//! delay.

use std::time::Duration;

use serde_json::Value;

use crate::error::AppError;
use crate::traits::Fetcher;

/// A [`Fetcher`] wrapper that sleeps a fixed interval before each request.
#[derive(Clone)]
pub struct PacedFetcher<F> {
    inner: F,
    pace: Duration,
}

impl<F: Fetcher> PacedFetcher<F> {
    /// Wrap an existing fetcher with a pre-request delay.
    pub fn new(inner: F, pace: Duration) -> Self {
        Self { inner, pace }
    }
}

impl<F: Fetcher> Fetcher for PacedFetcher<F> {
    async fn fetch(&self, url: &str, params: &[(String, String)]) -> Result<Value, AppError> {
        if !self.pace.is_zero() {
            tracing::debug!(
                pace_ms = %self.pace.as_millis(),
                "Pacing before live request"
            );
            tokio::time::sleep(self.pace).await;
        }
        self.inner.fetch(url, params).await
    }
}
