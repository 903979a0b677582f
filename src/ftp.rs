//! FTP transport: Unix `LIST` parsing and chunked `RETR`.

use crate::archive::{Archive, DirectoryLister, FileFetcher};
use crate::error::FetchError;
use crate::types::{DirectoryEntry, Listing};
use async_trait::async_trait;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::time::Instant;
use suppaftp::types::FileType;
use suppaftp::FtpStream;
use tracing::{debug, info};

/// NOAA NCEP anonymous FTP server.
pub const NOAA_FTP_HOST: &str = "ftp.ncep.noaa.gov";

/// Directory of the GFS production runs on [`NOAA_FTP_HOST`].
pub const NOAA_FTP_BASE_PATH: &str = "/pub/data/nccf/com/gfs/prod/";

/// Size of each read from the data connection.
const CHUNK_SIZE: usize = 1024 * 1024;

/// Archive reached over anonymous FTP.
///
/// Every listing and every fetch opens its own control connection, so one
/// instance can be shared by any number of concurrent tasks.
#[derive(Debug, Clone)]
pub struct FtpArchive {
    host: String,
    port: u16,
    base_path: String,
}

impl FtpArchive {
    pub fn new(host: impl Into<String>, base_path: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port: 21,
            base_path: base_path.into(),
        }
    }

    /// The NOAA GFS production archive.
    pub fn noaa() -> Self {
        Self::new(NOAA_FTP_HOST, NOAA_FTP_BASE_PATH)
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    fn connect(host: &str, port: u16, path: &str) -> Result<FtpStream, FetchError> {
        let mut ftp = FtpStream::connect((host, port))?;
        ftp.login("anonymous", "anonymous@")?;
        ftp.cwd(path)?;
        Ok(ftp)
    }

    fn list_blocking(host: &str, port: u16, path: &str) -> Result<Listing, FetchError> {
        let mut ftp = Self::connect(host, port, path)?;
        let lines = ftp.list(None)?;
        let _ = ftp.quit();
        Ok(lines
            .iter()
            .filter_map(|line| parse_list_line(line))
            .map(|entry| (entry.name.clone(), entry))
            .collect())
    }

    fn retrieve_blocking(
        host: &str,
        port: u16,
        remote_path: &str,
        file_name: &str,
        target: &Path,
    ) -> Result<u64, FetchError> {
        let mut ftp = Self::connect(host, port, remote_path)?;
        ftp.transfer_type(FileType::Binary)?;

        let mut stream = ftp.retr_as_stream(file_name)?;
        let mut file = std::fs::File::create(target)?;
        let mut buffer = vec![0u8; CHUNK_SIZE];
        let mut written = 0u64;
        loop {
            let n = stream.read(&mut buffer)?;
            if n == 0 {
                break;
            }
            file.write_all(&buffer[..n])?;
            written += n as u64;
        }
        file.flush()?;
        ftp.finalize_retr_stream(stream)?;
        let _ = ftp.quit();
        Ok(written)
    }
}

/// Parses one line of a Unix-style `LIST` response.
///
/// The size is the 5th and the name the 9th whitespace-separated field:
///
/// ```text
/// drwxr-xr-x    4 ftp      ftp          4096 Jan 01 03:29 gfs.20230101
/// ```
///
/// Lines with fewer fields (e.g. `total 8`) or a non-numeric size are skipped.
pub fn parse_list_line(line: &str) -> Option<DirectoryEntry> {
    let fields: Vec<&str> = line.split_whitespace().collect();
    if fields.len() < 9 {
        return None;
    }
    let size = fields[4].parse().ok()?;
    Some(DirectoryEntry::new(fields[8], size))
}

#[async_trait]
impl DirectoryLister for FtpArchive {
    async fn list(&self, path: &str) -> Result<Listing, FetchError> {
        debug!("Listing ftp://{}{}", self.host, path);
        let (host, port, owned_path) = (self.host.clone(), self.port, path.to_string());

        tokio::task::spawn_blocking(move || Self::list_blocking(&host, port, &owned_path))
            .await
            .map_err(|e| FetchError::listing(path, e))?
            .map_err(|e| FetchError::listing(path, e))
    }
}

#[async_trait]
impl FileFetcher for FtpArchive {
    async fn fetch(
        &self,
        remote_path: &str,
        file_name: &str,
        target_dir: &Path,
    ) -> Result<PathBuf, FetchError> {
        info!("Fetching {}/{} into {}", remote_path, file_name, target_dir.display());
        let begin = Instant::now();
        let target = target_dir.join(file_name);

        let (host, port) = (self.host.clone(), self.port);
        let (remote_path, name, local) = (
            remote_path.to_string(),
            file_name.to_string(),
            target.clone(),
        );
        let bytes = tokio::task::spawn_blocking(move || {
            Self::retrieve_blocking(&host, port, &remote_path, &name, &local)
        })
        .await
        .map_err(|e| FetchError::transfer(file_name, e))?
        .map_err(|e| FetchError::transfer(file_name, e))?;

        info!(
            file = file_name,
            bytes,
            elapsed_secs = begin.elapsed().as_secs_f64(),
            "Fetched {}",
            file_name
        );
        Ok(target)
    }
}

impl Archive for FtpArchive {
    fn base_path(&self) -> &str {
        &self.base_path
    }
}
