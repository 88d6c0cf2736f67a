//! Disk-backed response cache keyed by request identity.
//!
//! Every JSON response is cached as a file named
//! `{prefix}-{sha256 of the effective request}.json`. The effective
//! request is the fragment-stripped URL plus the extra parameters not
//! already encoded in its query string, so the same effective request is
//! never cached twice. Entries never expire on their own; eviction is
//! explicit and prefix-scoped.

use std::fs;
use std::path::PathBuf;

use serde_json::Value;
use sha2::{Digest, Sha256};
use url::Url;

use trowel_core::AppError;

/// Compute the extra parameters NOT already present in the URL's query
/// string. The repeatable `prop` parameter is re-added when its exact
/// `prop=value` pair is absent, since multiple instances are valid.
pub(crate) fn effective_params(url: &str, params: &[(String, String)]) -> Vec<(String, String)> {
    if params.is_empty() {
        return Vec::new();
    }
    let query = url_query(url);
    let mut effective: Vec<(String, String)> = params
        .iter()
        .filter(|(key, _)| !query.contains(&format!("{key}=")))
        .cloned()
        .collect();

    if let Some((_, value)) = params.iter().find(|(key, _)| key == "prop") {
        let already_added = effective.iter().any(|(key, _)| key == "prop");
        if !already_added && !query.contains(&format!("prop={value}")) {
            effective.push(("prop".to_string(), value.clone()));
        }
    }
    effective
}

fn url_query(url: &str) -> String {
    if let Ok(parsed) = Url::parse(url) {
        return parsed.query().unwrap_or("").to_string();
    }
    // Not an absolute URL; fall back to everything after '?', fragment
    // stripped.
    strip_fragment(url)
        .split_once('?')
        .map(|(_, query)| query.to_string())
        .unwrap_or_default()
}

fn strip_fragment(url: &str) -> &str {
    // The '#' portion only matters for browsers, never for the server.
    url.split('#').next().unwrap_or(url)
}

/// Derive the cache file name for a request. Deterministic for identical
/// (prefix, URL, extra params); distinct effective requests collide only
/// with negligible probability.
pub fn cache_file_name(prefix: &str, url: &str, extra_params: &[(String, String)]) -> String {
    let clean_url = strip_fragment(url);
    let mut identity = clean_url.to_string();

    let effective = effective_params(clean_url, extra_params);
    if !effective.is_empty() {
        // Not a real URL, just a stable serialization of the parameters
        // that captures the full request identity.
        let mut pairs: Vec<String> = effective
            .iter()
            .map(|(key, value)| format!("{key}={value}"))
            .collect();
        pairs.sort();
        identity.push('|');
        identity.push_str(&pairs.join("&"));
    }

    let mut hasher = Sha256::new();
    hasher.update(identity.as_bytes());
    format!("{prefix}-{:x}.json", hasher.finalize())
}

/// One directory holding one pretty-printed JSON file per cached request.
#[derive(Debug, Clone)]
pub struct ResponseCache {
    dir: PathBuf,
    prefix: String,
}

impl ResponseCache {
    pub fn new(dir: impl Into<PathBuf>, prefix: impl Into<String>) -> Self {
        Self {
            dir: dir.into(),
            prefix: prefix.into(),
        }
    }

    pub fn dir(&self) -> &std::path::Path {
        &self.dir
    }

    /// Cache file name for a request under this cache's prefix.
    pub fn file_name(&self, url: &str, extra_params: &[(String, String)]) -> String {
        cache_file_name(&self.prefix, url, extra_params)
    }

    /// Read a cached payload. Any failure — missing file, unreadable
    /// bytes, malformed JSON — is a cache miss, never an error.
    pub fn read(&self, name: &str) -> Option<Value> {
        let bytes = fs::read(self.dir.join(name)).ok()?;
        let text = String::from_utf8(bytes).ok()?;
        // Tolerate a UTF-8 BOM left by other tooling.
        serde_json::from_str(text.trim_start_matches('\u{feff}')).ok()
    }

    /// Write a payload, creating the cache directory if needed.
    /// Overwrites any existing entry.
    pub fn write(&self, name: &str, payload: &Value) -> Result<(), AppError> {
        fs::create_dir_all(&self.dir)?;
        let rendered = serde_json::to_string_pretty(payload)?;
        fs::write(self.dir.join(name), rendered)?;
        Ok(())
    }

    /// Delete cache entries scoped by prefix. With `keep_prefix`, entries
    /// whose name does NOT start with the active prefix are deleted;
    /// otherwise entries that DO start with it are. Non-file entries are
    /// skipped. Returns the number of deleted entries.
    pub fn clear(&self, keep_prefix: bool) -> Result<usize, AppError> {
        if !self.dir.exists() {
            return Ok(0);
        }
        let mut deleted = 0;
        for entry in fs::read_dir(&self.dir)? {
            let entry = entry?;
            let path = entry.path();
            if !path.is_file() {
                continue;
            }
            let name = entry.file_name();
            let matches_prefix = name.to_string_lossy().starts_with(&self.prefix);
            let delete = if keep_prefix {
                !matches_prefix
            } else {
                matches_prefix
            };
            if delete {
                fs::remove_file(path)?;
                deleted += 1;
            }
        }
        Ok(deleted)
    }
}
