//! Durable spool for pending uploads
//!
//! Layout on disk (the operator-visible contract):
//!
//! ```text
//! <spool_dir>/jobs/<job_id>.json    job record
//! <spool_dir>/files/<uuid>.png      payload
//! ```
//!
//! [`SpoolStore::save`] writes the payload first and the record second, so a
//! crash between the two leaves at most an orphaned payload file, never a
//! record pointing at nothing. A job record and its payload file are removed
//! together on successful re-upload.
//!
//! I/O failures propagate to the caller; this layer never retries internally.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Spool persistence errors
#[derive(Error, Debug)]
pub enum SpoolError {
    #[error("spool I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("malformed job record: {0}")]
    Malformed(#[from] serde_json::Error),
}

/// One durable record of a pending upload.
///
/// All fields except `retry_count` and `last_error` are fixed at creation;
/// `file_path` is assigned once by [`SpoolStore::save`]. A job whose
/// `retry_count` has reached the configured `retry_max` is quarantined: it is
/// never retried again and never deleted automatically.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpoolJob {
    pub job_id: String,
    pub object_key: String,
    pub bucket: String,
    pub endpoint: String,
    pub file_path: String,
    pub retry_count: u32,
    pub last_error: String,
    pub created_at: String,
}

impl SpoolJob {
    /// Create a new job with a fresh id and zero failed attempts.
    pub fn new(
        object_key: impl Into<String>,
        bucket: impl Into<String>,
        endpoint: impl Into<String>,
    ) -> Self {
        Self {
            job_id: uuid::Uuid::new_v4().simple().to_string(),
            object_key: object_key.into(),
            bucket: bucket.into(),
            endpoint: endpoint.into(),
            file_path: String::new(),
            retry_count: 0,
            last_error: String::new(),
            created_at: chrono::Utc::now().to_rfc3339(),
        }
    }

    /// Record one failed attempt: `retry_count + 1`, `last_error` replaced,
    /// everything else (including `created_at`) untouched.
    pub fn increment_retry(mut self, error: impl Into<String>) -> Self {
        self.retry_count += 1;
        self.last_error = error.into();
        self
    }

    /// A quarantined job has exhausted its retry budget and is left on disk
    /// for operator intervention.
    pub fn is_quarantined(&self, retry_max: u32) -> bool {
        self.retry_count >= retry_max
    }
}

/// Persists and loads spool jobs and their payload files.
#[derive(Debug, Clone)]
pub struct SpoolStore {
    base_dir: PathBuf,
}

impl SpoolStore {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
        }
    }

    /// Persist `payload` and the job record; returns the job with its real
    /// `file_path` filled in.
    #[tracing::instrument(skip(self, payload, job), fields(job_id = %job.job_id, bytes = payload.len()))]
    pub fn save(&self, payload: &[u8], mut job: SpoolJob) -> Result<SpoolJob, SpoolError> {
        self.ensure_dirs()?;

        let file_path = self
            .files_dir()
            .join(format!("{}.png", uuid::Uuid::new_v4().simple()));
        // Payload first, record second: a crash here orphans the payload at
        // worst, never a record referencing a missing file.
        std::fs::write(&file_path, payload)?;

        job.file_path = file_path.to_string_lossy().into_owned();
        self.write_record(&job)?;

        tracing::debug!(file = %job.file_path, "spooled payload");
        Ok(job)
    }

    /// Paths of all persisted job records. Empty when the jobs directory does
    /// not exist yet. Order is directory-enumeration order, not FIFO.
    pub fn list_pending(&self) -> Result<Vec<PathBuf>, SpoolError> {
        let jobs_dir = self.jobs_dir();
        if !jobs_dir.exists() {
            return Ok(Vec::new());
        }
        let mut paths = Vec::new();
        for entry in std::fs::read_dir(&jobs_dir)? {
            let path = entry?.path();
            if path.extension().is_some_and(|ext| ext == "json") {
                paths.push(path);
            }
        }
        Ok(paths)
    }

    /// Load one job record.
    pub fn load(&self, record_path: &Path) -> Result<SpoolJob, SpoolError> {
        let content = std::fs::read_to_string(record_path)?;
        Ok(serde_json::from_str(&content)?)
    }

    /// Overwrite the record for `job.job_id` with the job's current state.
    pub fn update(&self, job: &SpoolJob) -> Result<(), SpoolError> {
        self.write_record(job)
    }

    /// Delete the job record and its payload file. Idempotent: files already
    /// gone are not an error.
    #[tracing::instrument(skip(self, job), fields(job_id = %job.job_id))]
    pub fn remove(&self, job: &SpoolJob) -> Result<(), SpoolError> {
        remove_if_exists(&self.record_path(&job.job_id))?;
        if !job.file_path.is_empty() {
            remove_if_exists(Path::new(&job.file_path))?;
        }
        Ok(())
    }

    fn write_record(&self, job: &SpoolJob) -> Result<(), SpoolError> {
        let content = serde_json::to_string(job)?;
        std::fs::write(self.record_path(&job.job_id), content)?;
        Ok(())
    }

    fn record_path(&self, job_id: &str) -> PathBuf {
        self.jobs_dir().join(format!("{job_id}.json"))
    }

    fn ensure_dirs(&self) -> Result<(), SpoolError> {
        std::fs::create_dir_all(self.jobs_dir())?;
        std::fs::create_dir_all(self.files_dir())?;
        Ok(())
    }

    fn jobs_dir(&self) -> PathBuf {
        self.base_dir.join("jobs")
    }

    fn files_dir(&self) -> PathBuf {
        self.base_dir.join("files")
    }
}

fn remove_if_exists(path: &Path) -> std::io::Result<()> {
    match std::fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e),
    }
}
