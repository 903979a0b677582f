//! Transport-independent access to the remote model archive.

use crate::error::FetchError;
use crate::types::{DatasetIdentity, Listing};
use async_trait::async_trait;
use std::path::{Path, PathBuf};

/// Lists the entries of a remote directory.
#[async_trait]
pub trait DirectoryLister: Send + Sync {
    /// Returns the entries of `path` keyed by name.
    ///
    /// A transport failure or non-success status is an `Err`, never an empty
    /// listing, so callers can tell "not reachable" from "empty".
    async fn list(&self, path: &str) -> Result<Listing, FetchError>;
}

/// Retrieves one remote file into a local directory.
#[async_trait]
pub trait FileFetcher: Send + Sync {
    /// Writes `remote_path/file_name` to `target_dir/file_name` and returns
    /// the local path. An existing local file is overwritten.
    async fn fetch(
        &self,
        remote_path: &str,
        file_name: &str,
        target_dir: &Path,
    ) -> Result<PathBuf, FetchError>;
}

/// A model archive reachable through one transport.
pub trait Archive: DirectoryLister + FileFetcher {
    /// Remote path holding the dataset groups.
    fn base_path(&self) -> &str;

    /// Remote path of the cycle folder of `identity`.
    fn dataset_path(&self, identity: &DatasetIdentity) -> String {
        join_path(self.base_path(), &identity.hour_path())
    }
}

/// Joins two remote path fragments with a single `/`.
pub(crate) fn join_path(base: &str, rest: &str) -> String {
    let rest = rest.trim_start_matches('/');
    if base.is_empty() {
        return rest.to_string();
    }
    if rest.is_empty() {
        return base.to_string();
    }
    format!("{}/{}", base.trim_end_matches('/'), rest)
}
