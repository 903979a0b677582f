use anyhow::Context;
use clap::{Parser, Subcommand, ValueEnum};
use gfsfetch::{
    fetch_dataset, link_grib, Archive, DatasetIdentity, DirectoryLister, FetchConfig,
    FetchStatus, FtpArchive, HttpArchive, NOAA_FTP_BASE_PATH, NOAA_FTP_HOST,
    NOAA_HTTP_BASE_PATH, NOAA_HTTP_SERVER,
};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

#[derive(Parser, Debug)]
#[command(name = "gfsfetch")]
#[command(about = "Fetch NOAA GFS model runs over FTP or HTTP", long_about = None)]
#[command(version)]
struct Args {
    /// Verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Wait for a model run to be published and fetch its files
    Fetch(FetchArgs),
    /// Print the listing of a remote archive path as JSON
    List {
        #[command(flatten)]
        remote: RemoteArgs,

        /// Remote path to list (defaults to the archive base path)
        path: Option<String>,
    },
    /// Index GRIB files as GRIBFILE.AAA, GRIBFILE.AAB, ... symlinks for WPS
    LinkGrib {
        /// Directory with the GRIB files
        #[arg(long, default_value = "/gfs/model_data")]
        source_directory: PathBuf,

        /// Directory where the index links are written
        #[arg(long, default_value = "/run")]
        target_directory: PathBuf,
    },
}

#[derive(clap::Args, Debug)]
struct FetchArgs {
    #[command(flatten)]
    remote: RemoteArgs,

    /// Run year
    #[arg(long)]
    year: i32,

    /// Run month
    #[arg(long)]
    month: u32,

    /// Run day
    #[arg(long)]
    day: u32,

    /// Run cycle hour (0, 6, 12 or 18)
    #[arg(long, default_value_t = 0)]
    hour: u32,

    /// Grid resolution suffix
    #[arg(long, default_value = "0p25")]
    resolution: String,

    /// strftime pattern of the file-name prefix
    #[arg(long, default_value = "gfs.t%Hz.pgrb2")]
    pattern: String,

    /// Output directory for the fetched files
    #[arg(short, long, default_value = "/gfs/model_data")]
    output: PathBuf,

    /// Maximum number of simultaneous transfers
    #[arg(long, default_value_t = 4, value_parser = clap::value_parser!(u64).range(1..))]
    threads: u64,

    /// Number of fetch rounds
    #[arg(long, default_value_t = gfsfetch::FETCH_ATTEMPTS, value_parser = clap::value_parser!(u32).range(1..))]
    attempts: u32,

    /// Delay between readiness polls (e.g. "5m", "30s")
    #[arg(long, default_value = "5m", value_parser = humantime::parse_duration)]
    poll_interval: Duration,

    /// Give up after this long (e.g. "6h"); waits forever if not set
    #[arg(long, value_parser = humantime::parse_duration)]
    timeout: Option<Duration>,

    /// Create GRIBFILE.* links in this directory once every file is fetched
    #[arg(long)]
    link_dir: Option<PathBuf>,

    /// Hide the progress bar
    #[arg(short, long)]
    quiet: bool,
}

#[derive(clap::Args, Debug)]
struct RemoteArgs {
    /// Transport used to reach the archive
    #[arg(long, value_enum, default_value_t = Transport::Http)]
    transport: Transport,

    /// Archive server (host for FTP, URL for HTTP); defaults to NOAA
    #[arg(long)]
    server: Option<String>,

    /// Directory holding the dataset groups; defaults to the NOAA GFS path
    #[arg(long)]
    base_path: Option<String>,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum Transport {
    Ftp,
    Http,
}

impl RemoteArgs {
    fn ftp(&self) -> FtpArchive {
        FtpArchive::new(
            self.server.as_deref().unwrap_or(NOAA_FTP_HOST),
            self.base_path.as_deref().unwrap_or(NOAA_FTP_BASE_PATH),
        )
    }

    fn http(&self) -> HttpArchive {
        HttpArchive::new(
            self.server.as_deref().unwrap_or(NOAA_HTTP_SERVER),
            self.base_path.as_deref().unwrap_or(NOAA_HTTP_BASE_PATH),
        )
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Initialize tracing
    let log_level = if args.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(format!("gfsfetch={}", log_level))
        .init();

    match args.command {
        Command::Fetch(fetch) => {
            let status = match fetch.remote.transport {
                Transport::Ftp => run_fetch(Arc::new(fetch.remote.ftp()), &fetch).await?,
                Transport::Http => run_fetch(Arc::new(fetch.remote.http()), &fetch).await?,
            };
            if status == FetchStatus::Failed {
                std::process::exit(1);
            }
        }
        Command::List { remote, path } => {
            let listing = match remote.transport {
                Transport::Ftp => {
                    let archive = remote.ftp();
                    let path = path.unwrap_or_else(|| archive.base_path().to_string());
                    archive.list(&path).await?
                }
                Transport::Http => {
                    let archive = remote.http();
                    let path = path.unwrap_or_else(|| archive.base_path().to_string());
                    archive.list(&path).await?
                }
            };
            println!("{}", serde_json::to_string_pretty(&listing)?);
        }
        Command::LinkGrib {
            source_directory,
            target_directory,
        } => {
            link_grib(&source_directory, &target_directory).with_context(|| {
                format!("Failed to link GRIB files from {}", source_directory.display())
            })?;
        }
    }
    Ok(())
}

async fn run_fetch<A>(archive: Arc<A>, args: &FetchArgs) -> anyhow::Result<FetchStatus>
where
    A: Archive + 'static,
{
    let identity = DatasetIdentity::new(args.year, args.month, args.day, args.hour)?;
    let config = FetchConfig {
        resolution: args.resolution.clone(),
        pattern: args.pattern.clone(),
        concurrency: args.threads as usize,
        attempts: args.attempts,
        poll_interval: args.poll_interval,
        ..FetchConfig::default()
    };

    info!("🚀 gfsfetch - {}", identity.group_name());
    info!("Transport: {:?}", args.remote.transport);
    info!("Output directory: {:?}", args.output);

    let cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("Interrupted, cancelling fetch");
                cancel.cancel();
            }
        });
    }
    if let Some(timeout) = args.timeout {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(timeout).await;
            warn!("Timeout of {} reached, cancelling fetch", humantime::format_duration(timeout));
            cancel.cancel();
        });
    }

    let pb = if args.quiet {
        indicatif::ProgressBar::hidden()
    } else {
        let progress_bar = indicatif::ProgressBar::new(0);
        if let Ok(style) = indicatif::ProgressStyle::default_bar().template(
            "{spinner:.cyan} [{bar:40.cyan/blue}] {pos}/{len} {msg} | {elapsed_precise} elapsed",
        ) {
            progress_bar.set_style(style.progress_chars("█▓▒░ "));
        }
        progress_bar
    };

    let report = fetch_dataset(archive, &identity, &config, &args.output, &pb, &cancel)
        .await
        .with_context(|| format!("Failed to fetch {}", identity.group_name()))?;

    match report.status() {
        FetchStatus::Done => {
            info!(
                "✅ Fetched {} files of {} in {} round(s)",
                report.fetched.len(),
                identity.group_name(),
                report.rounds
            );
            if let Some(link_dir) = &args.link_dir {
                link_grib(&args.output, link_dir)?;
            }
        }
        FetchStatus::Failed => {
            error!(
                "❌ {} files of {} could not be fetched: {:?}",
                report.unresolved.len(),
                identity.group_name(),
                report.unresolved
            );
        }
    }
    Ok(report.status())
}
