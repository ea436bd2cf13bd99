//! Object key derivation
//!
//! Builds the destination key for a payload from its content hash and the
//! current UTC time: `[prefix/]YYYY/MM/DD/[YYYYMMDDHHMMSS_]<sha256-hex>.png`.
//!
//! With the timestamp prefix disabled the key is a pure function of payload
//! and day, so identical content dedups to a single object. Enabling the
//! timestamp prefix deliberately breaks that determinism for workflows where
//! re-uploads must not collide.

use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};

/// Stateless key-building strategy, built per call from the current config.
#[derive(Debug, Clone)]
pub struct ObjectKeyStrategy {
    prefix: String,
    use_timestamp_prefix: bool,
}

impl ObjectKeyStrategy {
    pub fn new(prefix: impl Into<String>, use_timestamp_prefix: bool) -> Self {
        Self {
            prefix: prefix.into(),
            use_timestamp_prefix,
        }
    }

    /// Derive the object key for `payload` at time `now`.
    ///
    /// # Example
    ///
    /// ```
    /// use chrono::{TimeZone, Utc};
    /// use spoolr::key::ObjectKeyStrategy;
    ///
    /// let strategy = ObjectKeyStrategy::new("renders", false);
    /// let now = Utc.with_ymd_and_hms(2026, 8, 29, 12, 0, 0).unwrap();
    /// let key = strategy.build_key(b"payload", now);
    /// assert!(key.starts_with("renders/2026/08/29/"));
    /// assert!(key.ends_with(".png"));
    /// ```
    pub fn build_key(&self, payload: &[u8], now: DateTime<Utc>) -> String {
        let digest = hex::encode(Sha256::digest(payload));
        let date_path = now.format("%Y/%m/%d");

        let filename = if self.use_timestamp_prefix {
            format!("{}_{digest}.png", now.format("%Y%m%d%H%M%S"))
        } else {
            format!("{digest}.png")
        };

        let prefix = self.prefix.trim_matches('/');
        if prefix.is_empty() {
            format!("{date_path}/{filename}")
        } else {
            format!("{prefix}/{date_path}/{filename}")
        }
    }
}
