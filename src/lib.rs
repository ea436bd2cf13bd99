//! Spoolr Library
//!
//! Durable upload-or-spool pipeline for S3-compatible object stores.
//!
//! # Features
//!
//! - **Upload or Spool**: a failed upload never loses the payload
//! - **Durable Spool**: crash-recoverable job records + payload files on disk
//! - **Background Retry**: a single cancellable worker drains the spool
//! - **Content-Addressed Keys**: SHA-256 keys with date partitioning
//! - **S3 Compatible**: AWS, MinIO, and friends via endpoint override
//!
//! # Example
//!
//! ```no_run
//! use std::path::Path;
//! use std::sync::Arc;
//! use bytes::Bytes;
//! use spoolr::config::S3Config;
//! use spoolr::s3::S3ObjectStore;
//! use spoolr::spool::SpoolStore;
//! use spoolr::upload::UploadOrchestrator;
//!
//! # async fn example() -> anyhow::Result<()> {
//! let config = S3Config::from_env(Path::new("."))?;
//! let store = Arc::new(S3ObjectStore::new(&config));
//! let spool = SpoolStore::new(config.spool_dir.clone());
//!
//! let orchestrator = UploadOrchestrator::new(config, store, spool);
//! orchestrator.upload_or_spool(Bytes::from_static(b"\x89PNG...")).await?;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod key;
pub mod retry;
pub mod s3;
pub mod spool;
pub mod upload;

// Re-export commonly used types
pub use config::S3Config;
pub use retry::RetryWorker;
pub use s3::{ObjectStore, S3ObjectStore};
pub use spool::{SpoolJob, SpoolStore};
pub use upload::UploadOrchestrator;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
