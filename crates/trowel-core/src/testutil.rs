//! Test utilities: a mock [`Fetcher`] for dependency injection.
//!
//! Handwritten mock using `Arc<Mutex<_>>` for interior mutability so
//! tests can assert on recorded requests.

use std::sync::{Arc, Mutex};

use serde_json::Value;

use crate::error::AppError;
use crate::traits::Fetcher;

/// One recorded request: the URL and the effective query parameters.
pub type RecordedRequest = (String, Vec<(String, String)>);

/// Mock fetcher that pops queued responses and records every request.
#[derive(Clone)]
pub struct MockFetcher {
    /// Queue of responses. Each call pops the first element; when empty,
    /// an empty JSON object is returned.
    responses: Arc<Mutex<Vec<Result<Value, AppError>>>>,
    pub requests: Arc<Mutex<Vec<RecordedRequest>>>,
}

impl MockFetcher {
    pub fn new(payload: Value) -> Self {
        Self::with_responses(vec![Ok(payload)])
    }

    pub fn with_error(error: AppError) -> Self {
        Self::with_responses(vec![Err(error)])
    }

    pub fn with_responses(responses: Vec<Result<Value, AppError>>) -> Self {
        Self {
            responses: Arc::new(Mutex::new(responses)),
            requests: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Number of live requests the mock has served.
    pub fn request_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
}

impl Fetcher for MockFetcher {
    async fn fetch(&self, url: &str, params: &[(String, String)]) -> Result<Value, AppError> {
        self.requests
            .lock()
            .unwrap()
            .push((url.to_string(), params.to_vec()));
        let mut responses = self.responses.lock().unwrap();
        if responses.is_empty() {
            Ok(serde_json::json!({}))
        } else {
            responses.remove(0)
        }
    }
}
