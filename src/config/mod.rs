//! Configuration module for Spoolr
//!
//! Resolves an immutable [`S3Config`] snapshot from three layers, in
//! precedence order:
//!
//! 1. Caller-supplied [`S3ConfigOverrides`] (non-empty values win)
//! 2. `S3_*` environment variables
//! 3. Hard-coded defaults
//!
//! The merge itself ([`S3Config::resolve`]) is a pure function so precedence
//! can be unit-tested without touching the process environment. Validation
//! fails fast before any network activity: `bucket`, `access_key_id`, and
//! `secret_access_key` are required.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("missing required setting: {0}")]
    MissingRequired(&'static str),
}

/// Immutable snapshot of connection and retry parameters.
///
/// Constructed once per upload invocation; a running [`crate::RetryWorker`]
/// picks up a new snapshot via `update`, never by mutation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct S3Config {
    /// Endpoint URL. Empty means the default public endpoint for `region`.
    pub endpoint: String,
    pub bucket: String,
    pub region: String,
    pub access_key_id: String,
    pub secret_access_key: String,
    pub use_ssl: bool,
    pub force_path_style: bool,
    /// Key prefix, slash-trimmed when keys are built.
    pub prefix: String,
    pub use_timestamp_prefix: bool,
    pub spool_dir: PathBuf,
    pub retry_max: u32,
    pub retry_backoff_seconds: u64,
    pub retry_interval_seconds: u64,
    /// Accepted as configuration; retries run sequentially within a cycle.
    pub retry_concurrency: usize,
}

/// Caller-supplied overrides. `None` or an empty string falls through to the
/// environment default.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct S3ConfigOverrides {
    pub endpoint: Option<String>,
    pub bucket: Option<String>,
    pub region: Option<String>,
    pub access_key_id: Option<String>,
    pub secret_access_key: Option<String>,
    pub use_ssl: Option<bool>,
    pub force_path_style: Option<bool>,
    pub prefix: Option<String>,
    pub use_timestamp_prefix: Option<bool>,
    pub spool_dir: Option<PathBuf>,
    pub retry_max: Option<u32>,
    pub retry_backoff_seconds: Option<u64>,
    pub retry_interval_seconds: Option<u64>,
    pub retry_concurrency: Option<usize>,
}

impl S3Config {
    /// Build a validated config from environment variables alone.
    pub fn from_env(base_dir: &Path) -> Result<Self, ConfigError> {
        let config = Self::env_defaults(base_dir);
        config.validate()?;
        Ok(config)
    }

    /// Build a validated config from environment defaults merged with
    /// caller overrides (override wins when present and non-empty).
    pub fn from_sources(
        base_dir: &Path,
        overrides: &S3ConfigOverrides,
    ) -> Result<Self, ConfigError> {
        let config = Self::resolve(Self::env_defaults(base_dir), overrides);
        config.validate()?;
        Ok(config)
    }

    /// Read environment defaults without validating required fields.
    ///
    /// Malformed booleans and integers fall back to the hard-coded default
    /// rather than erroring; a bad `S3_RETRY_MAX` should not block an upload.
    pub fn env_defaults(base_dir: &Path) -> Self {
        Self {
            endpoint: env_str("S3_ENDPOINT", ""),
            bucket: env_str("S3_BUCKET", ""),
            region: env_str("S3_REGION", "us-east-1"),
            access_key_id: env_str("S3_ACCESS_KEY_ID", ""),
            secret_access_key: env_str("S3_SECRET_ACCESS_KEY", ""),
            use_ssl: env_bool("S3_USE_SSL", true),
            force_path_style: env_bool("S3_FORCE_PATH_STYLE", false),
            prefix: env_str("S3_PREFIX", ""),
            use_timestamp_prefix: env_bool("S3_TIMESTAMP_PREFIX", true),
            spool_dir: std::env::var("S3_SPOOL_DIR")
                .ok()
                .map(PathBuf::from)
                .unwrap_or_else(|| base_dir.join("spool")),
            retry_max: env_int("S3_RETRY_MAX", 5),
            retry_backoff_seconds: env_int("S3_RETRY_BACKOFF_SECONDS", 2),
            retry_interval_seconds: env_int("S3_RETRY_INTERVAL_SECONDS", 5),
            retry_concurrency: env_int("S3_RETRY_CONCURRENCY", 1),
        }
    }

    /// Pure layered merge: overrides take precedence over `defaults` when
    /// present and, for strings/paths, non-empty.
    pub fn resolve(defaults: Self, overrides: &S3ConfigOverrides) -> Self {
        Self {
            endpoint: pick_str(&overrides.endpoint, defaults.endpoint),
            bucket: pick_str(&overrides.bucket, defaults.bucket),
            region: pick_str(&overrides.region, defaults.region),
            access_key_id: pick_str(&overrides.access_key_id, defaults.access_key_id),
            secret_access_key: pick_str(
                &overrides.secret_access_key,
                defaults.secret_access_key,
            ),
            use_ssl: overrides.use_ssl.unwrap_or(defaults.use_ssl),
            force_path_style: overrides
                .force_path_style
                .unwrap_or(defaults.force_path_style),
            prefix: pick_str(&overrides.prefix, defaults.prefix),
            use_timestamp_prefix: overrides
                .use_timestamp_prefix
                .unwrap_or(defaults.use_timestamp_prefix),
            spool_dir: pick_path(&overrides.spool_dir, defaults.spool_dir),
            retry_max: overrides.retry_max.unwrap_or(defaults.retry_max),
            retry_backoff_seconds: overrides
                .retry_backoff_seconds
                .unwrap_or(defaults.retry_backoff_seconds),
            retry_interval_seconds: overrides
                .retry_interval_seconds
                .unwrap_or(defaults.retry_interval_seconds),
            retry_concurrency: overrides
                .retry_concurrency
                .unwrap_or(defaults.retry_concurrency),
        }
    }

    /// Check required fields. Called before any network activity.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.bucket.is_empty() {
            return Err(ConfigError::MissingRequired("S3_BUCKET"));
        }
        if self.access_key_id.is_empty() {
            return Err(ConfigError::MissingRequired("S3_ACCESS_KEY_ID"));
        }
        if self.secret_access_key.is_empty() {
            return Err(ConfigError::MissingRequired("S3_SECRET_ACCESS_KEY"));
        }
        Ok(())
    }
}

fn env_str(name: &str, fallback: &str) -> String {
    match std::env::var(name) {
        Ok(value) => {
            let trimmed = value.trim();
            if trimmed.is_empty() {
                fallback.to_string()
            } else {
                trimmed.to_string()
            }
        }
        Err(_) => fallback.to_string(),
    }
}

fn env_bool(name: &str, fallback: bool) -> bool {
    match std::env::var(name) {
        Ok(value) => parse_bool(&value).unwrap_or(fallback),
        Err(_) => fallback,
    }
}

fn env_int<T: std::str::FromStr>(name: &str, fallback: T) -> T {
    match std::env::var(name) {
        Ok(value) => value.trim().parse().unwrap_or(fallback),
        Err(_) => fallback,
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "y" => Some(true),
        "0" | "false" | "no" | "n" => Some(false),
        _ => None,
    }
}

fn pick_str(value: &Option<String>, fallback: String) -> String {
    match value {
        Some(v) if !v.trim().is_empty() => v.trim().to_string(),
        _ => fallback,
    }
}

fn pick_path(value: &Option<PathBuf>, fallback: PathBuf) -> PathBuf {
    match value {
        Some(v) if !v.as_os_str().is_empty() => v.clone(),
        _ => fallback,
    }
}
