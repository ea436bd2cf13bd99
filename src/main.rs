//! Spoolr - Durable upload-or-spool pipeline for S3-compatible stores
//!
//! Operator CLI: upload a payload now (spooling it if the store is down),
//! inspect the spool, drain it once, or run the background retry worker.

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use spoolr::config::{S3Config, S3ConfigOverrides};
use spoolr::retry::RetryWorker;
use spoolr::s3::S3ObjectStore;
use spoolr::spool::SpoolStore;
use spoolr::upload::{UploadOrchestrator, UploadOutcome};
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

/// Spoolr - upload-or-spool with background retry
#[derive(Parser, Debug)]
#[command(name = "spoolr")]
#[command(author, version, about, long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Command,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info")]
    log_level: String,

    /// Destination bucket (overrides S3_BUCKET)
    #[arg(long)]
    bucket: Option<String>,

    /// Endpoint URL (overrides S3_ENDPOINT)
    #[arg(long)]
    endpoint: Option<String>,

    /// Spool directory (overrides S3_SPOOL_DIR)
    #[arg(long)]
    spool_dir: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Upload a file now; spool it for retry if the store is unreachable
    Upload {
        /// Path to the payload file
        file: PathBuf,
    },
    /// List pending spool jobs
    List,
    /// Run one retry cycle over the spool
    Drain,
    /// Run the background retry worker until Ctrl-C
    Worker,
}

impl Args {
    fn overrides(&self) -> S3ConfigOverrides {
        S3ConfigOverrides {
            bucket: self.bucket.clone(),
            endpoint: self.endpoint.clone(),
            spool_dir: self.spool_dir.clone(),
            ..Default::default()
        }
    }
}


#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Initialize logging
    let level = match args.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(true)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let base_dir = std::env::current_dir()?;

    match &args.command {
        Command::Upload { file } => {
            let config = S3Config::from_sources(&base_dir, &args.overrides())?;
            let payload = bytes::Bytes::from(std::fs::read(file)?);
            let store = Arc::new(S3ObjectStore::new(&config));
            let spool = SpoolStore::new(config.spool_dir.clone());
            let orchestrator = UploadOrchestrator::new(config, store, spool);

            match orchestrator.upload_or_spool(payload).await? {
                UploadOutcome::Uploaded { key, etag } => {
                    println!("uploaded {key} (etag {})", etag.as_deref().unwrap_or("n/a"));
                }
                UploadOutcome::Spooled { job_id, key } => {
                    println!("store unreachable; spooled {key} as job {job_id}");
                }
            }
        }
        Command::List => {
            // Listing only needs the spool directory, not credentials.
            let config = S3Config::resolve(S3Config::env_defaults(&base_dir), &args.overrides());
            let spool = SpoolStore::new(config.spool_dir.clone());
            let records = spool.list_pending()?;
            if records.is_empty() {
                println!("spool is empty");
            }
            for record in records {
                match spool.load(&record) {
                    Ok(job) => {
                        let state = if job.is_quarantined(config.retry_max) {
                            "quarantined"
                        } else {
                            "pending"
                        };
                        println!(
                            "{}  {}  retries={}  {}  {}",
                            job.job_id, state, job.retry_count, job.object_key, job.last_error
                        );
                    }
                    Err(err) => println!("{}: unreadable ({err})", record.display()),
                }
            }
        }
        Command::Drain => {
            let config = S3Config::from_sources(&base_dir, &args.overrides())?;
            let store = S3ObjectStore::new(&config);
            let spool = SpoolStore::new(config.spool_dir.clone());
            RetryWorker::drain_once(&config, &store, &spool).await;
        }
        Command::Worker => {
            let config = S3Config::from_sources(&base_dir, &args.overrides())?;
            let store = Arc::new(S3ObjectStore::new(&config));
            let spool = SpoolStore::new(config.spool_dir.clone());

            info!("Starting spoolr retry worker v{}", spoolr::VERSION);
            let worker = RetryWorker::new(config, store, spool);
            worker.start();

            tokio::signal::ctrl_c().await?;
            info!("shutdown requested");
            worker.stop().await;
        }
    }

    Ok(())
}
