//! Supabase connection configuration.
//!
//! The store client needs a project URL and an anon key. Both can be supplied
//! explicitly, read from the environment, or decoded from a single
//! connection string (plain JSON or url-safe base64 JSON `{url, key}`)
//! handed out by the back office during onboarding.

use base64::engine::general_purpose::STANDARD as BASE64_STANDARD;
use base64::Engine as _;
use serde_json::Value;

pub const ENV_SUPABASE_URL: &str = "CETAK_SUPABASE_URL";
pub const ENV_SUPABASE_ANON_KEY: &str = "CETAK_SUPABASE_ANON_KEY";

/// Connection settings for the remote data store.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    pub project_url: String,
    pub anon_key: String,
}

impl StoreConfig {
    /// Build a config from explicit values, normalising the URL.
    pub fn new(project_url: &str, anon_key: &str) -> Self {
        Self {
            project_url: normalize_project_url(project_url),
            anon_key: anon_key.trim().to_string(),
        }
    }

    /// Read `CETAK_SUPABASE_URL` / `CETAK_SUPABASE_ANON_KEY`. Returns `None`
    /// when either is missing or blank.
    pub fn from_env() -> Option<Self> {
        let url = std::env::var(ENV_SUPABASE_URL).ok()?;
        let key = std::env::var(ENV_SUPABASE_ANON_KEY).ok()?;
        if url.trim().is_empty() || key.trim().is_empty() {
            return None;
        }
        Some(Self::new(&url, &key))
    }

    /// Decode a connection string into a config.
    pub fn from_connection_string(raw: &str) -> Option<Self> {
        let url = extract_url_from_connection_string(raw)?;
        let key = extract_key_from_connection_string(raw)?;
        Some(Self {
            project_url: url,
            anon_key: key,
        })
    }
}

// ---------------------------------------------------------------------------
// URL normalisation
// ---------------------------------------------------------------------------

/// Normalise the Supabase project URL:
/// - strip trailing slashes
/// - strip a trailing `/rest/v1` segment (the client appends it itself)
/// - ensure a scheme is present (https, or http for localhost)
pub fn normalize_project_url(url: &str) -> String {
    let mut url = url.trim().to_string();

    // Ensure scheme
    if !url.starts_with("http://") && !url.starts_with("https://") {
        if url.starts_with("localhost") || url.starts_with("127.0.0.1") {
            url = format!("http://{url}");
        } else {
            url = format!("https://{url}");
        }
    }

    // Strip trailing slashes
    while url.ends_with('/') {
        url.pop();
    }

    // Strip trailing /rest/v1
    if url.ends_with("/rest/v1") {
        url.truncate(url.len() - 8);
    }

    while url.ends_with('/') {
        url.pop();
    }

    url
}

// ---------------------------------------------------------------------------
// Connection string decoding
// ---------------------------------------------------------------------------

fn decode_connection_string_payload(raw: &str) -> Option<Value> {
    let trimmed = raw.trim();
    if trimmed.starts_with('{') {
        return serde_json::from_str::<Value>(trimmed).ok();
    }

    let compact: String = trimmed.chars().filter(|c| !c.is_whitespace()).collect();
    if compact.starts_with('{') {
        return serde_json::from_str::<Value>(&compact).ok();
    }
    if compact.len() < 20 {
        return None;
    }

    let base64 = compact.replace('-', "+").replace('_', "/");
    let padded = format!(
        "{}{}",
        base64,
        "=".repeat((4usize.wrapping_sub(base64.len() % 4)) % 4)
    );
    let decoded = BASE64_STANDARD.decode(padded).ok()?;
    serde_json::from_slice::<Value>(&decoded).ok()
}

pub fn extract_url_from_connection_string(raw: &str) -> Option<String> {
    decode_connection_string_payload(raw)
        .and_then(|v| {
            v.get("url")
                .and_then(Value::as_str)
                .map(normalize_project_url)
        })
        .filter(|s| !s.is_empty())
}

pub fn extract_key_from_connection_string(raw: &str) -> Option<String> {
    decode_connection_string_payload(raw)
        .and_then(|v| {
            v.get("key")
                .and_then(Value::as_str)
                .map(|s| s.trim().to_string())
        })
        .filter(|s| !s.is_empty())
}

// ===========================================================================
// Tests
// ===========================================================================
