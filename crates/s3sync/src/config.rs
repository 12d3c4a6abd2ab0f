use std::time::Duration;

use clap::Parser;
use s3sync_core::{SyncOptions, DEFAULT_CRAWL_WORKERS};

/// Configuration for the s3sync command.
#[derive(Parser, Debug, Clone)]
#[command(name = "s3sync", version)]
#[command(about = "Sync files from <FROM> to <TO> (local paths or s3://bucket/path)")]
pub struct Config {
    /// Source: local directory or s3://bucket/path
    pub from: String,

    /// Destination: local directory or s3://bucket/path
    pub to: String,

    /// Delete files on the destination that do not exist on the source
    #[arg(short = 'd', long, env = "S3SYNC_DELETE")]
    pub delete: bool,

    /// Make uploaded objects publicly readable
    #[arg(short = 'P', long, env = "S3SYNC_PUBLIC")]
    pub public: bool,

    /// Maximum number of parallel copy/delete operations
    #[arg(long, default_value = "10", env = "S3SYNC_MAX_THREADS")]
    pub max_threads: usize,

    /// Alternate S3-compatible endpoint (forces path-style addressing)
    #[arg(long, env = "S3SYNC_ENDPOINT")]
    pub endpoint: Option<String>,

    /// AWS region (defaults to the standard provider chain)
    #[arg(long, env = "AWS_REGION")]
    pub region: Option<String>,

    /// Log filter used when RUST_LOG is not set (error, warn, info, debug, trace)
    #[arg(long, default_value = "info", env = "S3SYNC_LOG_LEVEL")]
    pub log_level: String,

    /// Number of concurrent listing workers when crawling a bucket
    #[arg(long, default_value_t = DEFAULT_CRAWL_WORKERS, env = "S3SYNC_CRAWL_WORKERS")]
    pub crawl_workers: usize,

    /// Deadline for each copy or delete in seconds (0 disables)
    #[arg(long = "op-timeout", default_value = "300", env = "S3SYNC_OP_TIMEOUT")]
    pub op_timeout_secs: u64,

    /// Deadline for the whole run in seconds
    #[arg(long = "timeout", env = "S3SYNC_TIMEOUT")]
    pub timeout_secs: Option<u64>,

    /// Print the final report as JSON on stdout
    #[arg(long)]
    pub summary_json: bool,
}

impl Config {
    /// Options for the transfer scheduler.
    pub fn sync_options(&self) -> SyncOptions {
        SyncOptions {
            max_concurrency: self.max_threads,
            public: self.public,
            op_timeout: (self.op_timeout_secs > 0).then(|| Duration::from_secs(self.op_timeout_secs)),
        }
    }

    /// Whole-run deadline, if any.
    pub fn run_timeout(&self) -> Option<Duration> {
        self.timeout_secs.map(Duration::from_secs)
    }
}
