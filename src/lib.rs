//! gfsfetch - wait for NOAA GFS model runs to be published and fetch them
//!
//! This library polls a remote model archive until a dataset is completely
//! published, enumerates its files and retrieves them with bounded
//! concurrency and round-based retry, over FTP or HTTP.
//!
//! # Features
//!
//! - **Two transports**: anonymous FTP (`LIST`/`RETR`) and HTTP directory indexes
//! - **Readiness polling**: waits until the dataset folder reports its final size
//! - **Bounded concurrency**: at most N simultaneous transfers
//! - **Round-based retry**: only failed files are dispatched again
//! - **Cancellation**: every wait and every transfer honours a cancellation token
//!
//! # Example
//!
//! ```no_run
//! use gfsfetch::{fetch_dataset, DatasetIdentity, FetchConfig, FtpArchive};
//! use std::sync::Arc;
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let identity = DatasetIdentity::new(2023, 1, 1, 0)?;
//! let report = fetch_dataset(
//!     Arc::new(FtpArchive::noaa()),
//!     &identity,
//!     &FetchConfig::default(),
//!     "/gfs/model_data".as_ref(),
//!     &indicatif::ProgressBar::hidden(),
//!     &CancellationToken::new(),
//! )
//! .await?;
//! assert!(report.unresolved.is_empty());
//! # Ok(())
//! # }
//! ```

mod archive;
mod error;
mod ftp;
mod http;
mod link;
mod orchestrator;
mod readiness;
mod size;
mod types;

pub use archive::{Archive, DirectoryLister, FileFetcher};
pub use error::FetchError;
pub use ftp::{parse_list_line, FtpArchive, NOAA_FTP_BASE_PATH, NOAA_FTP_HOST};
pub use http::{parse_index, HttpArchive, NOAA_HTTP_BASE_PATH, NOAA_HTTP_SERVER};
pub use link::{grib_link_name, link_grib, MAX_GRIB_FILES};
pub use orchestrator::{fetch_dataset, fetch_files, select_candidates};
pub use readiness::{await_ready, is_ready};
pub use size::parse_size;
pub use types::{
    DatasetIdentity, DirectoryEntry, FetchConfig, FetchReport, FetchStatus, Listing,
    DATASET_FOLDER_SIZE, FETCH_ATTEMPTS,
};
