//! Error types for dataset listing and fetching.

use std::io;
use thiserror::Error;

/// Errors that can occur while waiting for, listing or fetching a dataset.
#[derive(Error, Debug)]
pub enum FetchError {
    /// The run timestamp is not a valid calendar date/hour.
    #[error("Invalid dataset date {year:04}-{month:02}-{day:02} {hour:02}h")]
    InvalidDate {
        year: i32,
        month: u32,
        day: u32,
        hour: u32,
    },

    /// The file-name pattern contains a format specifier chrono cannot render.
    #[error("Invalid file name pattern: {0}")]
    InvalidPattern(String),

    /// A remote directory could not be listed.
    #[error("Unable to list '{path}': {reason}")]
    Listing { path: String, reason: String },

    /// A single remote file could not be retrieved.
    #[error("Unable to fetch '{file}': {reason}")]
    Transfer { file: String, reason: String },

    /// I/O error during file operations.
    #[error(transparent)]
    IoError(#[from] io::Error),

    /// HTTP request error.
    #[error(transparent)]
    ReqwestError(#[from] reqwest::Error),

    /// FTP protocol error.
    #[error(transparent)]
    FtpError(#[from] suppaftp::FtpError),

    /// A worker task panicked or was aborted.
    #[error("Task failed: {0}")]
    TaskFailed(String),

    /// The operation was cancelled by the caller.
    #[error("Operation cancelled")]
    Cancelled,

    /// More GRIB files than `GRIBFILE.AAA`..`GRIBFILE.ZZZ` names.
    #[error("Too many GRIB files to link: found {found}, at most {max} supported")]
    TooManyGribFiles { found: usize, max: usize },
}

impl FetchError {
    pub(crate) fn listing(path: impl Into<String>, reason: impl ToString) -> Self {
        FetchError::Listing {
            path: path.into(),
            reason: reason.to_string(),
        }
    }

    pub(crate) fn transfer(file: impl Into<String>, reason: impl ToString) -> Self {
        FetchError::Transfer {
            file: file.into(),
            reason: reason.to_string(),
        }
    }
}
