//! Upload module
//!
//! The foreground upload path: one synchronous put attempt, and on any store
//! failure the payload is persisted to the spool for the background retry
//! worker to drain. A store outage is therefore invisible to the caller; the
//! call only fails when the spool itself cannot be written (in which case the
//! payload is lost: a documented limitation, surfaced as an error and a log
//! line rather than silently swallowed).

use std::sync::Arc;

use bytes::Bytes;
use thiserror::Error;

use crate::config::S3Config;
use crate::key::ObjectKeyStrategy;
use crate::s3::ObjectStore;
use crate::spool::{SpoolError, SpoolJob, SpoolStore};

/// Upload errors visible to the caller.
///
/// Store failures are deliberately absent: those are recovered by spooling.
#[derive(Error, Debug)]
pub enum UploadError {
    #[error("failed to spool payload, payload lost: {0}")]
    Spool(#[from] SpoolError),
}

/// What happened to a payload.
#[derive(Debug, Clone)]
pub enum UploadOutcome {
    /// Delivered on the first attempt; nothing kept on disk.
    Uploaded { key: String, etag: Option<String> },
    /// Store failure; payload persisted, retry scheduled implicitly (the
    /// worker discovers the job on its next scan).
    Spooled { job_id: String, key: String },
}

/// Coordinates upload and spool fallback.
pub struct UploadOrchestrator {
    config: S3Config,
    store: Arc<dyn ObjectStore>,
    spool: SpoolStore,
}

impl UploadOrchestrator {
    pub fn new(config: S3Config, store: Arc<dyn ObjectStore>, spool: SpoolStore) -> Self {
        Self {
            config,
            store,
            spool,
        }
    }

    /// Upload `payload` now, or spool it for background retry.
    ///
    /// The call does not itself retry; all further attempts happen
    /// asynchronously in the [`crate::RetryWorker`].
    #[tracing::instrument(skip(self, payload), fields(bytes = payload.len()))]
    pub async fn upload_or_spool(&self, payload: Bytes) -> Result<UploadOutcome, UploadError> {
        let strategy = ObjectKeyStrategy::new(
            self.config.prefix.clone(),
            self.config.use_timestamp_prefix,
        );
        let key = strategy.build_key(&payload, chrono::Utc::now());

        match self.store.put(&key, payload.clone()).await {
            Ok(receipt) => {
                tracing::info!(key = %key, etag = ?receipt.etag, "uploaded");
                Ok(UploadOutcome::Uploaded {
                    key,
                    etag: receipt.etag,
                })
            }
            Err(err) => {
                tracing::warn!(key = %key, error = %err, "upload failed, spooling");
                self.spool_payload(&payload, key, err.to_string())
            }
        }
    }

    fn spool_payload(
        &self,
        payload: &[u8],
        key: String,
        error: String,
    ) -> Result<UploadOutcome, UploadError> {
        // Destination coordinates are captured now; the retry worker never
        // re-reads live config for a spooled job.
        let job = SpoolJob::new(key.clone(), &self.config.bucket, &self.config.endpoint)
            .increment_retry(error);
        let saved = self.spool.save(payload, job).map_err(|err| {
            tracing::error!(key = %key, error = %err, "spool write failed, payload lost");
            err
        })?;
        tracing::info!(job_id = %saved.job_id, key = %key, "payload spooled for retry");
        Ok(UploadOutcome::Spooled {
            job_id: saved.job_id,
            key,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::s3::{ObjectStoreError, PutReceipt};
    use async_trait::async_trait;
    use std::path::PathBuf;

    struct AlwaysOk;

    #[async_trait]
    impl ObjectStore for AlwaysOk {
        async fn put(&self, _key: &str, _body: Bytes) -> Result<PutReceipt, ObjectStoreError> {
            Ok(PutReceipt {
                etag: Some("\"etag-1\"".into()),
            })
        }
    }

    struct AlwaysDown;

    #[async_trait]
    impl ObjectStore for AlwaysDown {
        async fn put(&self, _key: &str, _body: Bytes) -> Result<PutReceipt, ObjectStoreError> {
            Err(ObjectStoreError::Transport("connection refused".into()))
        }
    }

    fn test_config(spool_dir: PathBuf) -> S3Config {
        S3Config {
            endpoint: "http://minio:9000".into(),
            bucket: "renders".into(),
            region: "us-east-1".into(),
            access_key_id: "AKID".into(),
            secret_access_key: "SECRET".into(),
            use_ssl: false,
            force_path_style: true,
            prefix: "out".into(),
            use_timestamp_prefix: false,
            spool_dir,
            retry_max: 5,
            retry_backoff_seconds: 0,
            retry_interval_seconds: 0,
            retry_concurrency: 1,
        }
    }

    #[tokio::test]
    async fn test_success_keeps_nothing_on_disk() {
        let dir = tempfile::tempdir().unwrap();
        let spool = SpoolStore::new(dir.path());
        let config = test_config(dir.path().to_path_buf());
        let orchestrator = UploadOrchestrator::new(config, Arc::new(AlwaysOk), spool.clone());

        let outcome = orchestrator
            .upload_or_spool(Bytes::from_static(b"payload"))
            .await
            .unwrap();

        match outcome {
            UploadOutcome::Uploaded { key, etag } => {
                assert!(key.starts_with("out/"));
                assert_eq!(etag.as_deref(), Some("\"etag-1\""));
            }
            other => panic!("expected Uploaded, got {other:?}"),
        }
        assert!(spool.list_pending().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_failure_spools_with_one_failed_attempt() {
        let dir = tempfile::tempdir().unwrap();
        let spool = SpoolStore::new(dir.path());
        let config = test_config(dir.path().to_path_buf());
        let orchestrator = UploadOrchestrator::new(config, Arc::new(AlwaysDown), spool.clone());

        let outcome = orchestrator
            .upload_or_spool(Bytes::from_static(b"payload"))
            .await
            .unwrap();

        let UploadOutcome::Spooled { job_id, key } = outcome else {
            panic!("expected Spooled");
        };

        let pending = spool.list_pending().unwrap();
        assert_eq!(pending.len(), 1);
        let job = spool.load(&pending[0]).unwrap();
        assert_eq!(job.job_id, job_id);
        assert_eq!(job.object_key, key);
        assert_eq!(job.bucket, "renders");
        assert_eq!(job.endpoint, "http://minio:9000");
        assert_eq!(job.retry_count, 1);
        assert!(job.last_error.contains("connection refused"));
        assert_eq!(std::fs::read(&job.file_path).unwrap(), b"payload");
    }
}
