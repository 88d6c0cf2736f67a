use thiserror::Error;

/// Application-wide error types for trowel.
///
/// Cache *read* failures are deliberately not represented here: a missing,
/// unreadable, or malformed cache file is recovered silently as a cache
/// miss and never surfaced to callers.
#[derive(Error, Debug)]
pub enum AppError {
    /// A live request failed: transport error, non-2xx status,
    /// unparseable body, or an empty/null payload.
    #[error("fetch failed for {url}: {reason}")]
    FetchFailure { url: String, reason: String },

    /// HTTP client could not be constructed.
    #[error("HTTP client error: {0}")]
    Http(String),

    /// Invalid configuration, e.g. an unknown multi-value policy name.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Cache write or directory I/O failed.
    #[error("cache I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization failed.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// CSV output failed.
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
}
