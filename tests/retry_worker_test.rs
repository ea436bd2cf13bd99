//! Retry worker integration tests
//!
//! End-to-end scenarios: a store outage spools the payload, the background
//! worker drains it once the store recovers, quarantined jobs are left
//! untouched, and the worker lifecycle (start/stop/update) behaves.

use std::path::PathBuf;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use spoolr::config::S3Config;
use spoolr::retry::RetryWorker;
use spoolr::s3::{ObjectStore, ObjectStoreError, PutReceipt};
use spoolr::spool::{SpoolJob, SpoolStore};
use spoolr::upload::UploadOrchestrator;

/// Fails the first `fail_first` put calls, then succeeds.
struct FlakyStore {
    fail_first: u32,
    calls: AtomicU32,
}

impl FlakyStore {
    fn new(fail_first: u32) -> Self {
        Self {
            fail_first,
            calls: AtomicU32::new(0),
        }
    }

    fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ObjectStore for FlakyStore {
    async fn put(&self, _key: &str, _body: Bytes) -> Result<PutReceipt, ObjectStoreError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        if call < self.fail_first {
            Err(ObjectStoreError::Transport("store down".into()))
        } else {
            Ok(PutReceipt { etag: None })
        }
    }
}

fn test_config(spool_dir: PathBuf, retry_max: u32) -> S3Config {
    S3Config {
        endpoint: "http://minio:9000".into(),
        bucket: "renders".into(),
        region: "us-east-1".into(),
        access_key_id: "AKID".into(),
        secret_access_key: "SECRET".into(),
        use_ssl: false,
        force_path_style: true,
        prefix: String::new(),
        use_timestamp_prefix: false,
        spool_dir,
        retry_max,
        retry_backoff_seconds: 0,
        retry_interval_seconds: 0,
        retry_concurrency: 1,
    }
}

async fn wait_until_empty(spool: &SpoolStore) {
    for _ in 0..100 {
        if spool.list_pending().unwrap().is_empty() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    panic!("spool not drained within 5s");
}

#[tokio::test]
async fn test_outage_then_recovery_drains_spool() {
    let dir = tempfile::tempdir().unwrap();
    let spool = SpoolStore::new(dir.path());
    let config = test_config(dir.path().to_path_buf(), 3);

    // Store fails the orchestrator's attempt and the first worker retry,
    // then recovers on the second retry call.
    let store = Arc::new(FlakyStore::new(2));

    let orchestrator =
        UploadOrchestrator::new(config.clone(), store.clone(), spool.clone());
    orchestrator
        .upload_or_spool(Bytes::from_static(b"ten  bytes"))
        .await
        .unwrap();

    let records = spool.list_pending().unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(spool.load(&records[0]).unwrap().retry_count, 1);

    let worker = RetryWorker::new(config, store.clone(), spool.clone());
    worker.start();
    wait_until_empty(&spool).await;
    worker.stop().await;

    // Orchestrator attempt + failed retry + successful retry.
    assert_eq!(store.calls(), 3);
}

#[tokio::test]
async fn test_quarantined_job_is_never_attempted() {
    let dir = tempfile::tempdir().unwrap();
    let spool = SpoolStore::new(dir.path());
    let config = test_config(dir.path().to_path_buf(), 3);

    let mut job = SpoolJob::new("k.png", "renders", "");
    job.retry_count = 3;
    spool.save(b"x", job).unwrap();

    let store = FlakyStore::new(0);
    RetryWorker::drain_once(&config, &store, &spool).await;

    assert_eq!(store.calls(), 0, "quarantined job must not be retried");
    // Left on disk for the operator, not deleted.
    assert_eq!(spool.list_pending().unwrap().len(), 1);
}

#[tokio::test]
async fn test_job_one_below_budget_gets_final_attempt() {
    let dir = tempfile::tempdir().unwrap();
    let spool = SpoolStore::new(dir.path());
    let config = test_config(dir.path().to_path_buf(), 3);

    let mut job = SpoolJob::new("k.png", "renders", "");
    job.retry_count = 2;
    job.last_error = "store down".into();
    spool.save(b"x", job).unwrap();

    // Final attempt fails, pushing the job into quarantine.
    let store = FlakyStore::new(u32::MAX);
    RetryWorker::drain_once(&config, &store, &spool).await;
    assert_eq!(store.calls(), 1);

    let records = spool.list_pending().unwrap();
    assert_eq!(spool.load(&records[0]).unwrap().retry_count, 3);

    // Now quarantined; a further cycle leaves it alone.
    RetryWorker::drain_once(&config, &store, &spool).await;
    assert_eq!(store.calls(), 1);
}

#[tokio::test]
async fn test_failed_retry_increments_count_and_error() {
    let dir = tempfile::tempdir().unwrap();
    let spool = SpoolStore::new(dir.path());
    let config = test_config(dir.path().to_path_buf(), 10);

    let saved = spool
        .save(b"x", SpoolJob::new("k.png", "renders", "").increment_retry("first"))
        .unwrap();
    let created_at = saved.created_at.clone();

    let store = FlakyStore::new(u32::MAX);
    RetryWorker::drain_once(&config, &store, &spool).await;

    let records = spool.list_pending().unwrap();
    let job = spool.load(&records[0]).unwrap();
    assert_eq!(job.retry_count, 2);
    assert!(job.last_error.contains("store down"));
    assert_eq!(job.created_at, created_at);
}

#[tokio::test]
async fn test_malformed_record_does_not_kill_cycle() {
    let dir = tempfile::tempdir().unwrap();
    let spool = SpoolStore::new(dir.path());
    let config = test_config(dir.path().to_path_buf(), 3);

    let saved = spool
        .save(b"x", SpoolJob::new("k.png", "renders", "").increment_retry("down"))
        .unwrap();
    // A record the foreground path could still be writing.
    std::fs::write(dir.path().join("jobs/partial.json"), "{\"job_id\":").unwrap();

    let store = FlakyStore::new(0);
    RetryWorker::drain_once(&config, &store, &spool).await;

    // The healthy job was still delivered and removed.
    assert_eq!(store.calls(), 1);
    assert!(!std::path::Path::new(&saved.file_path).exists());
}

#[tokio::test]
async fn test_missing_payload_file_skips_job() {
    let dir = tempfile::tempdir().unwrap();
    let spool = SpoolStore::new(dir.path());
    let config = test_config(dir.path().to_path_buf(), 3);

    let saved = spool
        .save(b"x", SpoolJob::new("k.png", "renders", "").increment_retry("down"))
        .unwrap();
    std::fs::remove_file(&saved.file_path).unwrap();

    let store = FlakyStore::new(0);
    RetryWorker::drain_once(&config, &store, &spool).await;

    // No payload, no attempt; the record is left for a later scan.
    assert_eq!(store.calls(), 0);
    assert_eq!(spool.list_pending().unwrap().len(), 1);
}

#[tokio::test]
async fn test_start_is_idempotent_and_stop_joins() {
    let dir = tempfile::tempdir().unwrap();
    let spool = SpoolStore::new(dir.path());
    let mut config = test_config(dir.path().to_path_buf(), 3);
    config.retry_interval_seconds = 1;

    let worker = RetryWorker::new(config, Arc::new(FlakyStore::new(0)), spool);
    assert!(!worker.is_running());

    worker.start();
    worker.start();
    assert!(worker.is_running());

    worker.stop().await;
    assert!(!worker.is_running());

    // Restart after stop works.
    worker.start();
    assert!(worker.is_running());
    worker.stop().await;
}

#[tokio::test]
async fn test_update_swaps_store_for_running_worker() {
    let dir = tempfile::tempdir().unwrap();
    let spool = SpoolStore::new(dir.path());
    let config = test_config(dir.path().to_path_buf(), 1000);

    spool
        .save(b"x", SpoolJob::new("k.png", "renders", "").increment_retry("down"))
        .unwrap();

    let worker = RetryWorker::new(
        config.clone(),
        Arc::new(FlakyStore::new(u32::MAX)),
        spool.clone(),
    );
    worker.start();
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(spool.list_pending().unwrap().len(), 1);

    // Swap in a healthy store; the loop picks it up on its next cycle.
    worker.update(config, Arc::new(FlakyStore::new(0)), spool.clone());
    wait_until_empty(&spool).await;
    worker.stop().await;
}
