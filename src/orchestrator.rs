//! Main orchestration logic for fetching a dataset.

use crate::archive::{Archive, DirectoryLister, FileFetcher};
use crate::error::FetchError;
use crate::readiness::await_ready;
use crate::types::{DatasetIdentity, FetchConfig, FetchReport, Listing};
use futures_util::stream::{FuturesUnordered, StreamExt};
use indicatif::ProgressBar;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;
use tokio_retry2::strategy::FixedInterval;
use tokio_retry2::{Retry, RetryError};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, instrument, warn, Instrument, Span};

/// Waits for a dataset to be published and fetches all of its files.
///
/// This is the main entry point. It performs the following steps:
///
/// 1. Polls the archive until the dataset group is complete
/// 2. Lists the cycle folder and keeps the files matching the configured
///    prefix, skipping index files
/// 3. Fetches them with at most `config.concurrency` transfers at a time
/// 4. Re-dispatches only the failed files, for up to `config.attempts` rounds
///
/// Files still failing after the last round are reported in
/// [`FetchReport::unresolved`]; that is not an error.
///
/// # Example
///
/// ```no_run
/// use gfsfetch::{fetch_dataset, DatasetIdentity, FetchConfig, HttpArchive};
/// use std::sync::Arc;
/// use tokio_util::sync::CancellationToken;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let archive = Arc::new(HttpArchive::noaa());
/// let identity = DatasetIdentity::new(2023, 1, 1, 0)?;
/// let report = fetch_dataset(
///     archive,
///     &identity,
///     &FetchConfig::default(),
///     "/gfs/model_data".as_ref(),
///     &indicatif::ProgressBar::hidden(),
///     &CancellationToken::new(),
/// )
/// .await?;
/// println!("{:?}", report.status());
/// # Ok(())
/// # }
/// ```
#[instrument(skip_all, fields(dataset = %identity.group_name()))]
pub async fn fetch_dataset<A>(
    archive: Arc<A>,
    identity: &DatasetIdentity,
    config: &FetchConfig,
    target_dir: &Path,
    pb: &ProgressBar,
    cancel: &CancellationToken,
) -> Result<FetchReport, FetchError>
where
    A: Archive + ?Sized + 'static,
{
    let group = identity.group_name();
    let prefix = config.file_prefix(identity)?;
    let ds_path = archive.dataset_path(identity);
    info!("Fetching {}/{} into {}", group, prefix, target_dir.display());

    tokio::fs::create_dir_all(target_dir).await?;

    await_ready(
        archive.as_ref(),
        archive.base_path(),
        &group,
        config.ready_threshold,
        config.poll_interval,
        cancel,
    )
    .await?;

    let listing = list_until_ok(archive.as_ref(), &ds_path, config.poll_interval, cancel).await?;
    let files = select_candidates(&listing, &prefix, &config.index_suffix);
    if files.is_empty() {
        warn!("No files matching {} found in {}", prefix, ds_path);
    } else {
        info!("Found {} files matching {} in {}", files.len(), prefix, ds_path);
    }

    fetch_files(archive, &ds_path, files, target_dir, config, pb, cancel).await
}

/// Keeps the names starting with `prefix` that are not index files.
pub fn select_candidates(listing: &Listing, prefix: &str, index_suffix: &str) -> Vec<String> {
    listing
        .keys()
        .filter(|name| name.starts_with(prefix) && !name.ends_with(index_suffix))
        .cloned()
        .collect()
}

/// Lists `path`, retrying every `interval` until the listing succeeds.
async fn list_until_ok<L>(
    lister: &L,
    path: &str,
    interval: Duration,
    cancel: &CancellationToken,
) -> Result<Listing, FetchError>
where
    L: DirectoryLister + ?Sized,
{
    let retry_strategy = FixedInterval::from_millis(interval.as_millis() as u64);
    let listing = Retry::spawn(retry_strategy, || async move {
        match lister.list(path).await {
            Ok(listing) => Ok(listing),
            Err(e) => {
                error!("Failed to list {} due to error: {}", path, e);
                RetryError::to_transient(e)
            }
        }
    });

    tokio::select! {
        _ = cancel.cancelled() => Err(FetchError::Cancelled),
        result = listing => result,
    }
}

/// Shared state of the dispatch rounds for one dataset.
struct RoundContext<'a, F: ?Sized> {
    fetcher: &'a Arc<F>,
    remote_path: &'a str,
    target_dir: &'a Path,
    semaphore: &'a Arc<Semaphore>,
    pb: &'a ProgressBar,
    cancel: &'a CancellationToken,
}

/// Fetches `files` from `remote_path` into `target_dir` in retry rounds.
///
/// Each round dispatches every pending name and waits for all of them before
/// the next round starts. Only names that failed in a round are dispatched in
/// the following one.
pub async fn fetch_files<F>(
    fetcher: Arc<F>,
    remote_path: &str,
    mut files: Vec<String>,
    target_dir: &Path,
    config: &FetchConfig,
    pb: &ProgressBar,
    cancel: &CancellationToken,
) -> Result<FetchReport, FetchError>
where
    F: FileFetcher + ?Sized + 'static,
{
    // Two tasks must never write the same local file.
    files.sort();
    files.dedup();

    let semaphore = Arc::new(Semaphore::new(config.concurrency.max(1)));
    let ctx = RoundContext {
        fetcher: &fetcher,
        remote_path,
        target_dir,
        semaphore: &semaphore,
        pb,
        cancel,
    };

    pb.set_length(files.len() as u64);
    let begin = Instant::now();
    let mut report = FetchReport::default();
    let mut pending = files;

    for round in 1..=config.attempts {
        if pending.is_empty() {
            break;
        }
        report.rounds = round;
        pb.set_message(format!("round {}/{}", round, config.attempts));

        pending = run_round(&ctx, &pending, &mut report.fetched).await?;
        if !pending.is_empty() {
            info!(
                round,
                missing = pending.len(),
                "At fetch iteration {} of {}, {} files missing",
                round,
                config.attempts,
                pending.len()
            );
        }
    }

    if pending.is_empty() {
        info!(
            elapsed_secs = begin.elapsed().as_secs_f64(),
            "It took {:.1} secs to fetch {} files",
            begin.elapsed().as_secs_f64(),
            report.fetched.len()
        );
        pb.finish_with_message("done");
    } else {
        error!(
            unresolved = ?pending,
            "Still {} files missing after {} iterations",
            pending.len(),
            config.attempts
        );
        pb.abandon_with_message(format!("{} files missing", pending.len()));
    }

    report.unresolved = pending;
    Ok(report)
}

/// Dispatches one round and returns the names that failed.
async fn run_round<F>(
    ctx: &RoundContext<'_, F>,
    files: &[String],
    fetched: &mut Vec<PathBuf>,
) -> Result<Vec<String>, FetchError>
where
    F: FileFetcher + ?Sized + 'static,
{
    let mut in_flight = FuturesUnordered::new();

    for file_name in files {
        let fetcher = Arc::clone(ctx.fetcher);
        let semaphore = Arc::clone(ctx.semaphore);
        let cancel = ctx.cancel.clone();
        let remote_path = ctx.remote_path.to_string();
        let target_dir = ctx.target_dir.to_path_buf();
        let name = file_name.clone();

        let task = tokio::spawn(
            async move {
                let _permit = tokio::select! {
                    _ = cancel.cancelled() => return Err(FetchError::Cancelled),
                    permit = semaphore.acquire_owned() => {
                        permit.map_err(|e| FetchError::TaskFailed(e.to_string()))?
                    }
                };

                tokio::select! {
                    _ = cancel.cancelled() => Err(FetchError::Cancelled),
                    result = fetcher.fetch(&remote_path, &name, &target_dir) => result,
                }
            }
            .instrument(Span::current()),
        );

        let file_name = file_name.clone();
        in_flight.push(async move { (file_name, task.await) });
    }

    let mut failed = Vec::new();
    while let Some((file_name, joined)) = in_flight.next().await {
        match joined {
            Ok(Ok(path)) => {
                info!("{} saved in {}", file_name, path.display());
                ctx.pb.inc(1);
                fetched.push(path);
            }
            Ok(Err(FetchError::Cancelled)) if ctx.cancel.is_cancelled() => {}
            Ok(Err(e)) => {
                error!(file = %file_name, "{} generated an error: {}", file_name, e);
                failed.push(file_name);
            }
            Err(e) => {
                error!(file = %file_name, "Task join error: {}", e);
                failed.push(file_name);
            }
        }
    }

    if ctx.cancel.is_cancelled() {
        return Err(FetchError::Cancelled);
    }

    failed.sort();
    Ok(failed)
}
