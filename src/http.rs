//! HTTP transport: directory index scraping and streamed downloads.

use crate::archive::{join_path, Archive, DirectoryLister, FileFetcher};
use crate::error::FetchError;
use crate::size::parse_size;
use crate::types::{DirectoryEntry, Listing};
use async_trait::async_trait;
use futures_util::StreamExt;
use regex::Regex;
use reqwest::{Client, StatusCode};
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use std::time::{Duration, Instant};
use tokio::io::{AsyncWriteExt, BufWriter};
use tokio::sync::OnceCell;
use tracing::{debug, info};

/// NOAA NCEP HTTP mirror of the FTP tree.
pub const NOAA_HTTP_SERVER: &str = "http://www.ftp.ncep.noaa.gov";

/// Directory of the GFS production runs on [`NOAA_HTTP_SERVER`].
pub const NOAA_HTTP_BASE_PATH: &str = "data/nccf/com/gfs/prod";

/// An anchor element plus the text that follows it up to the next tag.
fn anchor_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"(?is)<a\b[^>]*>.*?</a>[^<]*").unwrap())
}

/// `<a ...>name</a>   date time size` as rendered by the archive's index pages.
fn entry_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"<a.*>([\w./]+)</a>\s*([\w-]+)\s*([\d:]+)\s*([\dKMGTP-]+)").unwrap()
    })
}

/// Extracts the entries of a directory index page.
///
/// Anchors whose trailing text does not carry a date, a time and a size
/// (column headers, the parent link) are ignored. A trailing `/` marks a
/// directory and is stripped from the name.
pub fn parse_index(html: &str) -> Listing {
    let mut entries = Listing::new();
    for anchor in anchor_pattern().find_iter(html) {
        let Some(caps) = entry_pattern().captures(anchor.as_str()) else {
            continue;
        };
        let raw_name = &caps[1];
        let name = raw_name.strip_suffix('/').unwrap_or(raw_name);
        entries.insert(
            name.to_string(),
            DirectoryEntry::new(name, parse_size(&caps[4])),
        );
    }
    entries
}

/// Archive reached over plain HTTP(S).
///
/// The HTTP client is built on first use and reused for every request made
/// through this instance.
#[derive(Debug)]
pub struct HttpArchive {
    server: String,
    base_path: String,
    client: OnceCell<Client>,
}

impl HttpArchive {
    pub fn new(server: impl Into<String>, base_path: impl Into<String>) -> Self {
        Self {
            server: server.into(),
            base_path: base_path.into(),
            client: OnceCell::new(),
        }
    }

    /// The NOAA GFS production archive.
    pub fn noaa() -> Self {
        Self::new(NOAA_HTTP_SERVER, NOAA_HTTP_BASE_PATH)
    }

    async fn client(&self) -> Result<&Client, FetchError> {
        self.client
            .get_or_try_init(|| async {
                Client::builder()
                    .redirect(reqwest::redirect::Policy::limited(10))
                    .connect_timeout(Duration::from_secs(30))
                    .build()
            })
            .await
            .map_err(FetchError::from)
    }

    fn url(&self, path: &str) -> String {
        join_path(&self.server, path)
    }

    async fn download(&self, url: &str, file_name: &str, target: &Path) -> Result<u64, FetchError> {
        let response = self.client().await?.get(url).send().await?;
        if response.status() != StatusCode::OK {
            return Err(FetchError::transfer(
                file_name,
                format!("{}: HTTP {}", url, response.status()),
            ));
        }

        let mut file = BufWriter::new(tokio::fs::File::create(target).await?);
        let mut byte_stream = response.bytes_stream();
        let mut written = 0u64;
        while let Some(piece) = byte_stream.next().await {
            let chunk = piece?;
            file.write_all(&chunk).await?;
            written += chunk.len() as u64;
        }
        file.flush().await?;
        Ok(written)
    }
}

#[async_trait]
impl DirectoryLister for HttpArchive {
    async fn list(&self, path: &str) -> Result<Listing, FetchError> {
        let url = self.url(path);
        debug!("Listing files in path {}", url);

        let client = self
            .client()
            .await
            .map_err(|e| FetchError::listing(&url, e))?;
        let response = client
            .get(&url)
            .send()
            .await
            .map_err(|e| FetchError::listing(&url, e))?;
        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::listing(&url, format!("HTTP {}", status)));
        }
        let body = response
            .text()
            .await
            .map_err(|e| FetchError::listing(&url, e))?;
        Ok(parse_index(&body))
    }
}

#[async_trait]
impl FileFetcher for HttpArchive {
    async fn fetch(
        &self,
        remote_path: &str,
        file_name: &str,
        target_dir: &Path,
    ) -> Result<PathBuf, FetchError> {
        info!("Fetching {}/{} into {}", remote_path, file_name, target_dir.display());
        let begin = Instant::now();
        let target = target_dir.join(file_name);
        let url = join_path(&self.url(remote_path), file_name);

        let bytes = self
            .download(&url, file_name, &target)
            .await
            .map_err(|e| match e {
                FetchError::Transfer { .. } => e,
                other => FetchError::transfer(file_name, format!("{}: {}", url, other)),
            })?;

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

impl Archive for HttpArchive {
    fn base_path(&self) -> &str {
        &self.base_path
    }
}
