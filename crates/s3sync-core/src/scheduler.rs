use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::diff::SyncPlan;
use crate::error::StorageError;
use crate::storage::{join_path, StorageBackend};

/// Default ceiling for concurrent copy/delete operations.
pub const DEFAULT_MAX_CONCURRENCY: usize = 10;
/// Default deadline for a single copy or delete.
pub const DEFAULT_OP_TIMEOUT: Duration = Duration::from_secs(300);

/// A backend together with the root all relative filenames hang off.
#[derive(Clone)]
pub struct Location {
    pub backend: Arc<dyn StorageBackend>,
    pub root: String,
}

impl Location {
    /// Resolve `path` through the backend into a canonical root.
    pub fn resolve(backend: Arc<dyn StorageBackend>, path: &str) -> Result<Self, StorageError> {
        let root = backend.resolve_path(path)?;
        Ok(Self { backend, root })
    }

    fn path_of(&self, filename: &str) -> String {
        join_path(&self.root, filename)
    }
}

impl std::fmt::Debug for Location {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Location")
            .field("backend", &self.backend.backend_name())
            .field("root", &self.root)
            .finish()
    }
}

/// Options for executing a sync plan.
#[derive(Debug, Clone)]
pub struct SyncOptions {
    /// Maximum number of operations in flight at once
    pub max_concurrency: usize,
    /// Mark uploaded objects publicly readable
    pub public: bool,
    /// Deadline for each copy or delete; `None` waits forever
    pub op_timeout: Option<Duration>,
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self {
            max_concurrency: DEFAULT_MAX_CONCURRENCY,
            public: false,
            op_timeout: Some(DEFAULT_OP_TIMEOUT),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    Copy,
    Delete,
}

/// A single copy or delete that did not succeed.
#[derive(Debug, Clone, Serialize)]
pub struct ItemFailure {
    pub filename: String,
    pub action: ActionKind,
    pub error: String,
}

/// Aggregate outcome of a sync run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SyncReport {
    pub copied: usize,
    pub skipped: usize,
    pub deleted: usize,
    pub failures: Vec<ItemFailure>,
}

impl SyncReport {
    pub fn success_count(&self) -> usize {
        self.copied + self.deleted
    }

    pub fn failure_count(&self) -> usize {
        self.failures.len()
    }

    pub fn is_success(&self) -> bool {
        self.failures.is_empty()
    }
}

struct Outcome {
    filename: String,
    action: ActionKind,
    result: Result<(), StorageError>,
}

/// Executes copy and delete actions under a shared concurrency ceiling.
///
/// Every action holds one semaphore permit for its whole duration. Failures are
/// recorded per file and never abort the rest of the batch. Deletions start
/// only after every copy has finished.
pub struct SyncScheduler {
    semaphore: Arc<Semaphore>,
    options: SyncOptions,
}

impl SyncScheduler {
    pub fn new(options: SyncOptions) -> Self {
        let options = SyncOptions {
            max_concurrency: options.max_concurrency.max(1),
            ..options
        };
        Self {
            semaphore: Arc::new(Semaphore::new(options.max_concurrency)),
            options,
        }
    }

    pub fn options(&self) -> &SyncOptions {
        &self.options
    }

    pub async fn execute(
        &self,
        plan: &SyncPlan,
        source: &Location,
        destination: &Location,
        cancel: &CancellationToken,
    ) -> SyncReport {
        let skipped = plan.to_skip.len();
        let mut report = SyncReport {
            skipped,
            ..Default::default()
        };

        // Skips and copies share one counter, skips first
        let total = skipped + plan.to_copy.len();
        for (i, file) in plan.to_skip.iter().enumerate() {
            debug!("({} / {}) {} Skip", i + 1, total, file.filename);
        }

        let mut tasks = JoinSet::new();
        for (i, action) in plan.to_copy.iter().enumerate() {
            let i = skipped + i;
            let filename = action.file.filename.clone();
            let Some(permit) = self.acquire(cancel).await else {
                error!("({} / {}) {} ERR: {}", i + 1, total, filename, StorageError::Cancelled);
                report.record(Outcome {
                    filename,
                    action: ActionKind::Copy,
                    result: Err(StorageError::Cancelled),
                });
                continue;
            };

            debug!(file = %filename, reason = ?action.reason, "copying");
            let source = source.clone();
            let destination = destination.clone();
            let cancel = cancel.clone();
            let public = self.options.public;
            let op_timeout = self.options.op_timeout;

            tasks.spawn(async move {
                let _permit = permit;
                let result = bounded(op_timeout, &cancel, &filename, async {
                    let reader = source.backend.read_file(&source.path_of(&filename)).await?;
                    destination
                        .backend
                        .write_file(&destination.path_of(&filename), reader, public)
                        .await
                })
                .await;

                match &result {
                    Ok(()) => info!("({} / {}) {} OK", i + 1, total, filename),
                    Err(e) => error!("({} / {}) {} ERR: {}", i + 1, total, filename, e),
                }
                Outcome {
                    filename,
                    action: ActionKind::Copy,
                    result,
                }
            });
        }
        drain(&mut tasks, &mut report, ActionKind::Copy).await;

        for file in &plan.to_delete {
            let filename = file.filename.clone();
            let Some(permit) = self.acquire(cancel).await else {
                error!("delete: {} ERR: {}", filename, StorageError::Cancelled);
                report.record(Outcome {
                    filename,
                    action: ActionKind::Delete,
                    result: Err(StorageError::Cancelled),
                });
                continue;
            };

            let destination = destination.clone();
            let cancel = cancel.clone();
            let op_timeout = self.options.op_timeout;

            tasks.spawn(async move {
                let _permit = permit;
                let result = bounded(op_timeout, &cancel, &filename, async {
                    destination
                        .backend
                        .delete_file(&destination.path_of(&filename))
                        .await
                })
                .await;

                match &result {
                    Ok(()) => info!("delete: {} OK", filename),
                    Err(e) => error!("delete: {} ERR: {}", filename, e),
                }
                Outcome {
                    filename,
                    action: ActionKind::Delete,
                    result,
                }
            });
        }
        drain(&mut tasks, &mut report, ActionKind::Delete).await;

        report
    }

    /// Wait for a free slot, giving up when the run is cancelled.
    async fn acquire(&self, cancel: &CancellationToken) -> Option<tokio::sync::OwnedSemaphorePermit> {
        if cancel.is_cancelled() {
            return None;
        }
        tokio::select! {
            biased;

            _ = cancel.cancelled() => None,
            permit = self.semaphore.clone().acquire_owned() => permit.ok(),
        }
    }
}

impl SyncReport {
    fn record(&mut self, outcome: Outcome) {
        match (outcome.result, outcome.action) {
            (Ok(()), ActionKind::Copy) => self.copied += 1,
            (Ok(()), ActionKind::Delete) => self.deleted += 1,
            (Err(e), action) => self.failures.push(ItemFailure {
                filename: outcome.filename,
                action,
                error: e.to_string(),
            }),
        }
    }
}

/// Collect every task of one phase. A task that panicked is recorded against
/// that phase with no filename.
async fn drain(tasks: &mut JoinSet<Outcome>, report: &mut SyncReport, phase: ActionKind) {
    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok(outcome) => report.record(outcome),
            Err(e) => {
                error!("{:?} task failed: {}", phase, e);
                report.failures.push(ItemFailure {
                    filename: String::new(),
                    action: phase,
                    error: e.to_string(),
                });
            }
        }
    }
}

/// Run one item under the per-operation deadline and the run-wide cancellation.
async fn bounded<F>(
    op_timeout: Option<Duration>,
    cancel: &CancellationToken,
    filename: &str,
    op: F,
) -> Result<(), StorageError>
where
    F: Future<Output = Result<(), StorageError>>,
{
    let limited = async {
        match op_timeout {
            Some(limit) => match tokio::time::timeout(limit, op).await {
                Ok(result) => result,
                Err(_) => Err(StorageError::Timeout(format!(
                    "{} after {}s",
                    filename,
                    limit.as_secs_f64()
                ))),
            },
            None => op.await,
        }
    };

    tokio::select! {
        biased;

        _ = cancel.cancelled() => Err(StorageError::Cancelled),
        result = limited => result,
    }
}
