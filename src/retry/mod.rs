//! Background retry worker
//!
//! A single long-lived tokio task per process that periodically scans the
//! spool and re-attempts each pending upload. The worker is an explicitly
//! owned handle supervised by the host's lifecycle; start/stop/update
//! transitions are lock-guarded, so there is never more than one loop per
//! [`RetryWorker`] and reconfiguration swaps dependencies in place instead of
//! spawning a second loop.
//!
//! # Loop shape
//!
//! Each cycle: enumerate pending jobs, skip quarantined ones, sleep the fixed
//! backoff before any job that has already failed, attempt the upload, then
//! remove (success) or bump the retry count (failure). The interval between
//! cycles is read from the *current* config at the start of each sleep, so a
//! live `update` takes effect on the next cycle. No single job's error ever
//! terminates the loop: list/load/read failures are logged and skipped.
//!
//! Cancellation is cooperative: [`RetryWorker::stop`] flips a watch channel
//! that is checked between jobs and raced against every sleep, then joins the
//! task with a short timeout. An in-flight upload attempt is not interrupted
//! mid-call.
//!
//! Jobs are processed sequentially within a cycle. The configured
//! `retry_concurrency` is accepted but treated as a hint; sequential
//! processing is the specified behavior.

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use parking_lot::{Mutex, RwLock};
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::config::S3Config;
use crate::s3::ObjectStore;
use crate::spool::{SpoolJob, SpoolStore};

/// Upper bound on how long `stop` waits for the loop to exit.
const JOIN_TIMEOUT: Duration = Duration::from_secs(1);

struct Deps {
    config: S3Config,
    store: Arc<dyn ObjectStore>,
    spool: SpoolStore,
}

struct Running {
    handle: JoinHandle<()>,
    stop: watch::Sender<bool>,
}

/// Singleton background loop that drains the spool.
///
/// # Example
///
/// ```no_run
/// use std::path::Path;
/// use std::sync::Arc;
/// use spoolr::config::S3Config;
/// use spoolr::retry::RetryWorker;
/// use spoolr::s3::S3ObjectStore;
/// use spoolr::spool::SpoolStore;
///
/// # async fn example() -> anyhow::Result<()> {
/// let config = S3Config::from_env(Path::new("."))?;
/// let store = Arc::new(S3ObjectStore::new(&config));
/// let spool = SpoolStore::new(config.spool_dir.clone());
///
/// let worker = RetryWorker::new(config, store, spool);
/// worker.start();
/// // ... application runs ...
/// worker.stop().await;
/// # Ok(())
/// # }
/// ```
pub struct RetryWorker {
    deps: Arc<RwLock<Deps>>,
    running: Mutex<Option<Running>>,
}

impl RetryWorker {
    pub fn new(config: S3Config, store: Arc<dyn ObjectStore>, spool: SpoolStore) -> Self {
        Self {
            deps: Arc::new(RwLock::new(Deps {
                config,
                store,
                spool,
            })),
            running: Mutex::new(None),
        }
    }

    /// Spawn the background loop. No-op when it is already running.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(&self) {
        let mut running = self.running.lock();
        if let Some(current) = running.as_ref() {
            if !current.handle.is_finished() {
                return;
            }
        }
        let (stop_tx, stop_rx) = watch::channel(false);
        let deps = Arc::clone(&self.deps);
        let handle = tokio::spawn(run_loop(deps, stop_rx));
        *running = Some(Running {
            handle,
            stop: stop_tx,
        });
        tracing::info!("retry worker started");
    }

    /// Swap configuration and collaborators for a running (or stopped)
    /// worker. The loop picks up the new values on its next cycle.
    pub fn update(&self, config: S3Config, store: Arc<dyn ObjectStore>, spool: SpoolStore) {
        let mut deps = self.deps.write();
        *deps = Deps {
            config,
            store,
            spool,
        };
        tracing::debug!("retry worker dependencies updated");
    }

    /// Signal the loop to exit and wait for it, bounded by a short timeout.
    /// Best-effort join: an in-flight upload attempt is not interrupted.
    pub async fn stop(&self) {
        let running = self.running.lock().take();
        if let Some(Running { handle, stop }) = running {
            let _ = stop.send(true);
            if tokio::time::timeout(JOIN_TIMEOUT, handle).await.is_err() {
                tracing::warn!(timeout = ?JOIN_TIMEOUT, "retry worker did not stop in time");
            } else {
                tracing::info!("retry worker stopped");
            }
        }
    }

    pub fn is_running(&self) -> bool {
        self.running
            .lock()
            .as_ref()
            .is_some_and(|r| !r.handle.is_finished())
    }

    /// Run exactly one retry cycle against the given dependencies. Used by
    /// the `drain` CLI command and by tests; the background loop runs the
    /// same logic.
    pub async fn drain_once(config: &S3Config, store: &dyn ObjectStore, spool: &SpoolStore) {
        let (_stop_tx, mut stop_rx) = watch::channel(false);
        cycle(config, store, spool, &mut stop_rx).await;
    }
}

async fn run_loop(deps: Arc<RwLock<Deps>>, mut stop: watch::Receiver<bool>) {
    loop {
        if *stop.borrow() {
            return;
        }
        let (config, store, spool) = {
            let current = deps.read();
            (
                current.config.clone(),
                Arc::clone(&current.store),
                current.spool.clone(),
            )
        };
        cycle(&config, store.as_ref(), &spool, &mut stop).await;

        // Re-read the interval so a live update takes effect next cycle.
        let interval = Duration::from_secs(deps.read().config.retry_interval_seconds);
        tokio::select! {
            _ = tokio::time::sleep(interval) => {}
            _ = stop.changed() => {}
        }
    }
}

async fn cycle(
    config: &S3Config,
    store: &dyn ObjectStore,
    spool: &SpoolStore,
    stop: &mut watch::Receiver<bool>,
) {
    let records = match spool.list_pending() {
        Ok(records) => records,
        Err(err) => {
            tracing::warn!(error = %err, "failed to list spool, skipping cycle");
            return;
        }
    };

    for record in records {
        if *stop.borrow() {
            return;
        }
        let job = match spool.load(&record) {
            Ok(job) => job,
            Err(err) => {
                // Also covers a record the foreground path is still writing.
                tracing::warn!(record = %record.display(), error = %err, "skipping unreadable job record");
                continue;
            }
        };
        if job.is_quarantined(config.retry_max) {
            tracing::debug!(
                job_id = %job.job_id,
                retry_count = job.retry_count,
                "job quarantined, operator intervention required"
            );
            continue;
        }
        if job.retry_count > 0 {
            let backoff = Duration::from_secs(config.retry_backoff_seconds);
            tokio::select! {
                _ = tokio::time::sleep(backoff) => {}
                _ = stop.changed() => return,
            }
        }
        retry_job(store, spool, job).await;
    }
}

async fn retry_job(store: &dyn ObjectStore, spool: &SpoolStore, job: SpoolJob) {
    let payload = match tokio::fs::read(&job.file_path).await {
        Ok(bytes) => Bytes::from(bytes),
        Err(err) => {
            tracing::warn!(job_id = %job.job_id, error = %err, "payload unreadable, skipping job");
            return;
        }
    };

    match store.put(&job.object_key, payload).await {
        Ok(receipt) => {
            tracing::info!(
                job_id = %job.job_id,
                key = %job.object_key,
                etag = ?receipt.etag,
                "spooled upload delivered"
            );
            if let Err(err) = spool.remove(&job) {
                tracing::warn!(job_id = %job.job_id, error = %err, "failed to remove delivered job");
            }
        }
        Err(err) => {
            tracing::warn!(
                job_id = %job.job_id,
                retry_count = job.retry_count + 1,
                error = %err,
                "retry failed"
            );
            let updated = job.increment_retry(err.to_string());
            if let Err(err) = spool.update(&updated) {
                tracing::warn!(job_id = %updated.job_id, error = %err, "failed to persist retry state");
            }
        }
    }
}
