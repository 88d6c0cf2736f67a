use std::future::Future;

use serde_json::Value;

use crate::error::AppError;

/// Fetches a JSON payload from a URL with extra query parameters.
///
/// Implementations must treat an empty or null body as a failure —
/// callers rely on `Ok` always carrying usable JSON.
pub trait Fetcher: Send + Sync + Clone {
    fn fetch(
        &self,
        url: &str,
        params: &[(String, String)],
    ) -> impl Future<Output = Result<Value, AppError>> + Send;
}
