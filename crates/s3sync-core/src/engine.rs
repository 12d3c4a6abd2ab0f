use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::diff::classify;
use crate::error::StorageError;
use crate::scheduler::{Location, SyncReport, SyncScheduler};

/// List both sides, compute the plan and execute it.
///
/// Listing errors on either side are fatal and nothing is transferred.
/// Transfer errors are per item and end up in the returned report.
pub async fn synchronize(
    source: &Location,
    destination: &Location,
    delete: bool,
    scheduler: &SyncScheduler,
    cancel: &CancellationToken,
) -> Result<SyncReport, StorageError> {
    let listings = async {
        tokio::try_join!(
            source.backend.list_files(&source.root),
            destination.backend.list_files(&destination.root),
        )
    };

    let (source_files, destination_files) = tokio::select! {
        biased;

        _ = cancel.cancelled() => return Err(StorageError::Cancelled),
        listings = listings => listings?,
    };

    let plan = classify(&source_files, &destination_files, delete);
    info!(
        source_files = source_files.len(),
        destination_files = destination_files.len(),
        to_copy = plan.to_copy.len(),
        to_delete = plan.to_delete.len(),
        "Computed sync plan"
    );

    Ok(scheduler.execute(&plan, source, destination, cancel).await)
}
