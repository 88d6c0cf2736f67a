//! Immutable client configuration.
//!
//! Built once and threaded through every operation so that caching and
//! normalization stay deterministic within a single table build.

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use crate::normalize::{MultiValuePolicy, DEFAULT_MULTI_VALUE_DELIM};

/// Default directory for file-caching JSON responses.
pub const DEFAULT_CACHE_DIR: &str = "oc-api-cache";

/// Records to request per page.
pub const DEFAULT_ROWS_PER_PAGE: u32 = 200;

/// Pause before each live request, to not overwhelm the API.
pub const DEFAULT_PACE: Duration = Duration::from_millis(250);

/// Minimum portion of matched records for a "common" attribute.
pub const DEFAULT_MIN_PORTION: f64 = 0.2;

/// Configuration for the Open Context client and normalizer.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Page size for search requests (`rows` parameter).
    pub rows_per_page: u32,

    /// Delay before every live request. Skipped on cache hits.
    pub pace: Duration,

    /// Response detail flags (`response` parameter, comma-joined).
    pub response_types: Vec<String>,

    /// Ask the API to flatten multi-valued attributes server-side.
    pub flatten_attributes: bool,

    /// Directory holding one JSON file per cached request.
    pub cache_dir: PathBuf,

    /// Prefix for cache file names. Defaults to today's date, so a new
    /// day naturally starts with fresh fetches while old entries remain
    /// available for explicit prefix-scoped eviction.
    pub cache_prefix: String,

    /// Policy for multi-valued attributes where every element is numeric.
    pub numeric_policy: MultiValuePolicy,

    /// Policy for multi-valued attributes with non-numeric elements.
    pub non_numeric_policy: MultiValuePolicy,

    /// Per-attribute-key policy overrides, applied before the defaults.
    pub policy_overrides: HashMap<String, MultiValuePolicy>,

    /// Minimum portion of records for common-attribute discovery.
    pub min_portion: f64,
}

impl Default for ClientConfig {
    fn default() -> Self {
        let mut policy_overrides = HashMap::new();
        // Bone fusion is best handled with the fusion options in the
        // column names and `true` marking presence.
        policy_overrides.insert(
            "Has fusion character".to_string(),
            MultiValuePolicy::ColumnVal,
        );

        Self {
            rows_per_page: DEFAULT_ROWS_PER_PAGE,
            pace: DEFAULT_PACE,
            response_types: vec!["metadata".to_string(), "uri-meta".to_string()],
            flatten_attributes: false,
            cache_dir: PathBuf::from(DEFAULT_CACHE_DIR),
            cache_prefix: chrono::Local::now().format("%Y-%m-%d").to_string(),
            numeric_policy: MultiValuePolicy::First,
            non_numeric_policy: MultiValuePolicy::Concat(DEFAULT_MULTI_VALUE_DELIM.to_string()),
            policy_overrides,
            min_portion: DEFAULT_MIN_PORTION,
        }
    }
}

impl ClientConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_rows_per_page(mut self, rows: u32) -> Self {
        self.rows_per_page = rows;
        self
    }

    pub fn with_pace(mut self, pace: Duration) -> Self {
        self.pace = pace;
        self
    }

    pub fn with_flatten_attributes(mut self, flatten: bool) -> Self {
        self.flatten_attributes = flatten;
        self
    }

    pub fn with_cache_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cache_dir = dir.into();
        self
    }

    /// Set a slug-normalized cache file prefix.
    pub fn with_cache_prefix(mut self, prefix: &str) -> Self {
        self.cache_prefix = slugify(prefix);
        self
    }

    pub fn with_numeric_policy(mut self, policy: MultiValuePolicy) -> Self {
        self.numeric_policy = policy;
        self
    }

    pub fn with_non_numeric_policy(mut self, policy: MultiValuePolicy) -> Self {
        self.non_numeric_policy = policy;
        self
    }

    pub fn with_policy_override(mut self, key: &str, policy: MultiValuePolicy) -> Self {
        self.policy_overrides.insert(key.to_string(), policy);
        self
    }

    pub fn with_min_portion(mut self, min_portion: f64) -> Self {
        self.min_portion = min_portion;
        self
    }
}

/// Reduce arbitrary text to a lowercase, dash-separated slug.
fn slugify(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut pending_dash = false;
    for c in text.chars() {
        if c.is_ascii_alphanumeric() {
            if pending_dash && !out.is_empty() {
                out.push('-');
            }
            pending_dash = false;
            out.push(c.to_ascii_lowercase());
        } else {
            pending_dash = true;
        }
    }
    out
}
