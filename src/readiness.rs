//! Polling the archive until a dataset group is completely published.

use crate::archive::DirectoryLister;
use crate::error::FetchError;
use crate::types::Listing;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

/// Returns true when `group` is listed and its size is at most `threshold`.
///
/// While files are still being published the group folder reports more than
/// its final size, so completeness is an upper bound.
pub fn is_ready(listing: &Listing, group: &str, threshold: u64) -> bool {
    listing
        .get(group)
        .is_some_and(|entry| entry.size <= threshold)
}

/// Blocks until `group` is ready under `archive_path`.
///
/// Listing failures are logged and treated as "not ready yet". There is no
/// bound on the number of polls; cancel `cancel` to stop waiting.
pub async fn await_ready<L>(
    lister: &L,
    archive_path: &str,
    group: &str,
    threshold: u64,
    poll_interval: Duration,
    cancel: &CancellationToken,
) -> Result<(), FetchError>
where
    L: DirectoryLister + ?Sized,
{
    loop {
        let listed = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(FetchError::Cancelled),
            result = lister.list(archive_path) => result,
        };

        match listed {
            Ok(groups) => {
                debug!("Available groups: {:?}", groups.keys().collect::<Vec<_>>());
                if is_ready(&groups, group, threshold) {
                    info!(dataset = group, "Dataset {} is ready", group);
                    return Ok(());
                }
            }
            Err(e) => {
                error!(dataset = group, "Readiness check failed: {}", e);
            }
        }

        info!(
            dataset = group,
            "Dataset {} not ready, sleeping for {} sec",
            group,
            poll_interval.as_secs()
        );
        tokio::select! {
            _ = cancel.cancelled() => return Err(FetchError::Cancelled),
            _ = tokio::time::sleep(poll_interval) => {}
        }
    }
}
