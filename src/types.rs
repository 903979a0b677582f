//! Data structures shared by the transports and the orchestrator.

use crate::error::FetchError;
use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt::Write;
use std::path::PathBuf;
use std::time::Duration;

/// Final size, in bytes, of a fully published GFS dataset folder.
pub const DATASET_FOLDER_SIZE: u64 = 196_608;

/// Number of dispatch rounds before giving up on the remaining files.
pub const FETCH_ATTEMPTS: u32 = 3;

/// One entry of a remote directory listing.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct DirectoryEntry {
    /// Entry name, without a trailing `/` for directories.
    pub name: String,
    /// Size in bytes as reported by the remote listing.
    pub size: u64,
}

impl DirectoryEntry {
    pub fn new(name: impl Into<String>, size: u64) -> Self {
        Self {
            name: name.into(),
            size,
        }
    }
}

/// A remote directory listing keyed by entry name.
pub type Listing = BTreeMap<String, DirectoryEntry>;

/// Identity of one model run, derived from its cycle timestamp.
///
/// # Example
///
/// ```
/// use gfsfetch::DatasetIdentity;
///
/// let id = DatasetIdentity::new(2023, 1, 1, 6).unwrap();
/// assert_eq!(id.group_name(), "gfs.20230101");
/// assert_eq!(id.hour_path(), "gfs.20230101/06");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DatasetIdentity {
    datetime: NaiveDateTime,
}

impl DatasetIdentity {
    /// Builds the identity of the run started at `year-month-day hour:00`.
    pub fn new(year: i32, month: u32, day: u32, hour: u32) -> Result<Self, FetchError> {
        NaiveDate::from_ymd_opt(year, month, day)
            .and_then(|date| date.and_hms_opt(hour, 0, 0))
            .map(|datetime| Self { datetime })
            .ok_or(FetchError::InvalidDate {
                year,
                month,
                day,
                hour,
            })
    }

    /// Cycle timestamp of the run.
    pub fn datetime(&self) -> NaiveDateTime {
        self.datetime
    }

    /// Top-level remote folder of the run, e.g. `gfs.20230101`.
    pub fn group_name(&self) -> String {
        format!("gfs.{}", self.datetime.format("%Y%m%d"))
    }

    /// Cycle folder below the group, e.g. `gfs.20230101/06`.
    pub fn hour_path(&self) -> String {
        format!("{}/{}", self.group_name(), self.datetime.format("%H"))
    }

    /// Renders a strftime-style pattern against the cycle timestamp.
    pub fn format(&self, pattern: &str) -> Result<String, FetchError> {
        let mut rendered = String::new();
        write!(rendered, "{}", self.datetime.format(pattern))
            .map_err(|_| FetchError::InvalidPattern(pattern.to_string()))?;
        Ok(rendered)
    }
}

/// Configuration for fetching one dataset.
///
/// # Example
///
/// ```
/// use gfsfetch::FetchConfig;
///
/// let config = FetchConfig {
///     resolution: "0p50".to_string(),
///     concurrency: 8,
///     ..FetchConfig::default()
/// };
/// assert_eq!(config.attempts, 3);
/// ```
#[derive(Debug, Clone)]
pub struct FetchConfig {
    /// Grid resolution suffix (e.g. `"0p25"`, `"0p50"`, `"1p00"`).
    pub resolution: String,
    /// strftime pattern for the file-name prefix, rendered against the cycle.
    pub pattern: String,
    /// Suffix of the companion index files, which are never fetched.
    pub index_suffix: String,
    /// Maximum number of simultaneous transfers (default: 4).
    pub concurrency: usize,
    /// Number of dispatch rounds (default: 3).
    pub attempts: u32,
    /// Delay between readiness polls (default: 5 minutes).
    pub poll_interval: Duration,
    /// A dataset folder whose reported size is at most this many bytes is
    /// considered completely published.
    pub ready_threshold: u64,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            resolution: "0p25".to_string(),
            pattern: "gfs.t%Hz.pgrb2".to_string(),
            index_suffix: ".idx".to_string(),
            concurrency: 4,
            attempts: FETCH_ATTEMPTS,
            poll_interval: Duration::from_secs(300),
            ready_threshold: DATASET_FOLDER_SIZE,
        }
    }
}

impl FetchConfig {
    /// Prefix every candidate file of `identity` starts with,
    /// e.g. `gfs.t06z.pgrb2.0p25`.
    pub fn file_prefix(&self, identity: &DatasetIdentity) -> Result<String, FetchError> {
        Ok(format!("{}.{}", identity.format(&self.pattern)?, self.resolution))
    }
}

/// Terminal state of a fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchStatus {
    /// Every candidate file was retrieved.
    Done,
    /// Some files were still failing when the rounds ran out.
    Failed,
}

/// Outcome of a fetch over all rounds.
#[derive(Debug, Clone, Default)]
pub struct FetchReport {
    /// Local paths of the files retrieved, in completion order.
    pub fetched: Vec<PathBuf>,
    /// Names still missing after the last round, sorted.
    pub unresolved: Vec<String>,
    /// Number of rounds dispatched.
    pub rounds: u32,
}

impl FetchReport {
    pub fn status(&self) -> FetchStatus {
        if self.unresolved.is_empty() {
            FetchStatus::Done
        } else {
            FetchStatus::Failed
        }
    }
}
