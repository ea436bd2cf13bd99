//! S3 Client module
//!
//! Provides the [`ObjectStore`] seam the orchestrator and retry worker upload
//! through, and [`S3ObjectStore`], its AWS SDK implementation.
//!
//! Failures are collapsed into three categories the rest of the crate cares
//! about: [`ObjectStoreError::Transport`] (could not reach the store),
//! [`ObjectStoreError::Auth`] (the store rejected the credentials), and
//! [`ObjectStoreError::Server`] (the store answered with an error). All three
//! are handled identically on the foreground path (spool and retry later);
//! the split exists for logs and operators.
//!
//! # Example
//!
//! ```no_run
//! use std::path::Path;
//! use bytes::Bytes;
//! use spoolr::config::S3Config;
//! use spoolr::s3::{ObjectStore, S3ObjectStore};
//!
//! # async fn example() -> anyhow::Result<()> {
//! let config = S3Config::from_env(Path::new("."))?;
//! let store = S3ObjectStore::new(&config);
//!
//! let receipt = store.put("2026/08/29/abc.png", Bytes::from_static(b"...")).await?;
//! println!("ETag: {:?}", receipt.etag);
//! # Ok(())
//! # }
//! ```

use async_trait::async_trait;
use aws_credential_types::Credentials;
use aws_sdk_s3::config::retry::RetryConfig;
use aws_sdk_s3::config::{BehaviorVersion, Region};
use aws_sdk_s3::error::{DisplayErrorContext, ProvideErrorMetadata, SdkError};
use aws_sdk_s3::primitives::ByteStream;
use bytes::Bytes;
use thiserror::Error;

use crate::config::S3Config;

/// Object store errors
#[derive(Error, Debug)]
pub enum ObjectStoreError {
    #[error("transport error: {0}")]
    Transport(String),

    #[error("authentication rejected: {0}")]
    Auth(String),

    #[error("server error: {0}")]
    Server(String),
}

/// Proof of a completed upload.
#[derive(Debug, Clone)]
pub struct PutReceipt {
    /// ETag reported by the store, when it sent one.
    pub etag: Option<String>,
}

/// Uploads bytes under a key. The single seam between this crate and the
/// wire protocol; tests substitute their own implementations.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn put(&self, key: &str, body: Bytes) -> Result<PutReceipt, ObjectStoreError>;
}

/// [`ObjectStore`] backed by the AWS SDK (PutObject).
///
/// Works against AWS proper or any S3-compatible endpoint (MinIO, Ceph RGW)
/// via the configured endpoint URL and path-style toggle.
pub struct S3ObjectStore {
    client: aws_sdk_s3::Client,
    bucket: String,
}

impl S3ObjectStore {
    /// Build a client from a resolved config snapshot.
    pub fn new(config: &S3Config) -> Self {
        let credentials = Credentials::new(
            config.access_key_id.clone(),
            config.secret_access_key.clone(),
            None,
            None,
            "spoolr-config",
        );
        let sdk_config = aws_sdk_s3::Config::builder()
            .behavior_version(BehaviorVersion::latest())
            .region(Region::new(config.region.clone()))
            .credentials_provider(credentials)
            .endpoint_url(endpoint_url(config))
            .force_path_style(config.force_path_style)
            // One attempt per put: the spool owns retry policy.
            .retry_config(RetryConfig::disabled())
            .build();

        Self {
            client: aws_sdk_s3::Client::from_conf(sdk_config),
            bucket: config.bucket.clone(),
        }
    }

    /// Bucket this client uploads into.
    pub fn bucket(&self) -> &str {
        &self.bucket
    }
}

#[async_trait]
impl ObjectStore for S3ObjectStore {
    #[tracing::instrument(
        name = "s3.put_object",
        skip(self, body),
        fields(
            s3.bucket = %self.bucket,
            s3.key = %key,
            upload.bytes = body.len(),
        ),
        err
    )]
    async fn put(&self, key: &str, body: Bytes) -> Result<PutReceipt, ObjectStoreError> {
        let response = self
            .client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .content_type("image/png")
            .body(ByteStream::from(body))
            .send()
            .await
            .map_err(|err| {
                let message = DisplayErrorContext(&err).to_string();
                match &err {
                    SdkError::TimeoutError(_) | SdkError::DispatchFailure(_) => {
                        ObjectStoreError::Transport(message)
                    }
                    SdkError::ServiceError(context) => match context.err().meta().code() {
                        Some(
                            "AccessDenied" | "InvalidAccessKeyId" | "SignatureDoesNotMatch"
                            | "ExpiredToken",
                        ) => ObjectStoreError::Auth(message),
                        _ => ObjectStoreError::Server(message),
                    },
                    SdkError::ResponseError(_) => ObjectStoreError::Server(message),
                    _ => ObjectStoreError::Transport(message),
                }
            })?;

        let etag = response.e_tag().map(str::to_string);
        tracing::info!(etag = ?etag, "PutObject completed");
        Ok(PutReceipt { etag })
    }
}

/// Endpoint to sign requests against. An empty configured endpoint means the
/// default public endpoint for the region, with the scheme from `use_ssl`.
fn endpoint_url(config: &S3Config) -> String {
    if config.endpoint.is_empty() {
        let scheme = if config.use_ssl { "https" } else { "http" };
        format!("{scheme}://s3.{}.amazonaws.com", config.region)
    } else {
        config.endpoint.clone()
    }
}
