mod config;

use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use aws_config::{BehaviorVersion, Region};
use aws_sdk_s3::Client as S3Client;
use clap::Parser;
use s3sync_core::{synchronize, Location, StorageBackend, SyncScheduler};
use s3sync_local::LocalStorage;
use s3sync_s3::{RemoteAddress, S3Storage};
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use config::Config;

/// Exit code when the run finished but some files failed.
const EXIT_PARTIAL_FAILURE: u8 = 2;

#[tokio::main]
async fn main() -> ExitCode {
    let config = Config::parse();

    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&config.log_level)),
        )
        .init();

    match run(config).await {
        Ok(code) => code,
        Err(e) => {
            error!("ERR: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(config: Config) -> anyhow::Result<ExitCode> {
    info!("Starting s3sync: {} -> {}", config.from, config.to);

    let cancel = create_shutdown_signal(config.run_timeout());

    let needs_s3 = RemoteAddress::is_remote(&config.from) || RemoteAddress::is_remote(&config.to);
    let s3 = if needs_s3 {
        let client = build_s3_client(&config).await;
        Some(
            S3Storage::new(client)
                .with_crawl_workers(config.crawl_workers)
                .with_cancellation(cancel.clone()),
        )
    } else {
        None
    };

    let source = Location::resolve(backend_for(&config.from, s3.as_ref())?, &config.from)
        .with_context(|| format!("invalid source {}", config.from))?;
    let destination = Location::resolve(backend_for(&config.to, s3.as_ref())?, &config.to)
        .with_context(|| format!("invalid destination {}", config.to))?;
    info!("  Source: {:?}", source);
    info!("  Destination: {:?}", destination);

    let scheduler = SyncScheduler::new(config.sync_options());
    let report = synchronize(&source, &destination, config.delete, &scheduler, &cancel)
        .await
        .context("sync aborted")?;

    info!(
        copied = report.copied,
        skipped = report.skipped,
        deleted = report.deleted,
        failed = report.failure_count(),
        "Sync complete"
    );

    if config.summary_json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    }

    if report.is_success() {
        Ok(ExitCode::SUCCESS)
    } else {
        warn!("{} file(s) failed to sync", report.failure_count());
        Ok(ExitCode::from(EXIT_PARTIAL_FAILURE))
    }
}

/// Pick the backend serving `address`.
fn backend_for(
    address: &str,
    s3: Option<&S3Storage>,
) -> anyhow::Result<Arc<dyn StorageBackend>> {
    if RemoteAddress::is_remote(address) {
        let s3 = s3.context("S3 backend is not configured")?;
        Ok(Arc::new(s3.clone()))
    } else {
        Ok(Arc::new(LocalStorage::new()))
    }
}

/// Create an S3 client from the standard AWS provider chain.
async fn build_s3_client(config: &Config) -> S3Client {
    let mut loader = aws_config::defaults(BehaviorVersion::latest());
    if let Some(region) = &config.region {
        loader = loader.region(Region::new(region.clone()));
    }
    let sdk_config = loader.load().await;

    let mut builder = aws_sdk_s3::config::Builder::from(&sdk_config);
    if let Some(endpoint) = &config.endpoint {
        info!("  S3 endpoint: {}", endpoint);
        builder = builder.endpoint_url(endpoint).force_path_style(true);
    }

    S3Client::from_conf(builder.build())
}

/// Create a token cancelled on Ctrl+C, SIGTERM or when the run deadline passes.
fn create_shutdown_signal(deadline: Option<Duration>) -> CancellationToken {
    let cancel = CancellationToken::new();
    let token = cancel.clone();

    tokio::spawn(async move {
        let ctrl_c = async {
            match signal::ctrl_c().await {
                Ok(()) => info!("Received Ctrl+C, cancelling"),
                Err(e) => {
                    warn!("Failed to install Ctrl+C handler: {}", e);
                    std::future::pending::<()>().await;
                }
            }
        };

        #[cfg(unix)]
        let terminate = async {
            match signal::unix::signal(signal::unix::SignalKind::terminate()) {
                Ok(mut sigterm) => {
                    sigterm.recv().await;
                    info!("Received SIGTERM, cancelling");
                }
                Err(e) => {
                    warn!("Failed to install SIGTERM handler: {}", e);
                    std::future::pending::<()>().await;
                }
            }
        };

        #[cfg(not(unix))]
        let terminate = std::future::pending::<()>();

        let timeout = async {
            match deadline {
                Some(limit) => {
                    tokio::time::sleep(limit).await;
                    warn!("Run deadline of {}s reached, cancelling", limit.as_secs());
                }
                None => std::future::pending::<()>().await,
            }
        };

        tokio::select! {
            _ = ctrl_c => {},
            _ = terminate => {},
            _ = timeout => {},
        }

        token.cancel();
    });

    cancel
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_local_paths_use_local_backend() {
        let backend = backend_for("/tmp/somewhere", None).unwrap();
        assert_eq!(backend.backend_name(), "local");
    }

    #[test]
    fn test_remote_without_s3_backend_is_an_error() {
        assert!(backend_for("s3://bucket/key", None).is_err());
    }

    #[tokio::test]
    async fn test_deadline_cancels_token() {
        let cancel = create_shutdown_signal(Some(Duration::from_millis(10)));
        tokio::time::timeout(Duration::from_secs(5), cancel.cancelled())
            .await
            .unwrap();
    }
}
