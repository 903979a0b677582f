//! FTP transport against a scripted in-process server.

use gfsfetch::{
    fetch_dataset, DatasetIdentity, DirectoryEntry, DirectoryLister, FetchConfig, FetchError,
    FetchStatus, FileFetcher, FtpArchive,
};
use indicatif::ProgressBar;
use std::collections::HashMap;
use std::io::{BufRead, BufReader, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Remote tree served by [`ScriptedFtpServer`]: `LIST` lines per directory
/// and file contents keyed by `directory/name`.
#[derive(Clone, Default)]
struct RemoteTree {
    dirs: HashMap<String, Vec<String>>,
    files: HashMap<String, Vec<u8>>,
}

impl RemoteTree {
    fn dir(mut self, path: &str, lines: &[&str]) -> Self {
        self.dirs
            .insert(path.to_string(), lines.iter().map(|l| l.to_string()).collect());
        self
    }

    fn file(mut self, dir: &str, name: &str, content: Vec<u8>) -> Self {
        self.files.insert(format!("{}/{}", dir, name), content);
        self
    }
}

/// Answers the anonymous passive-mode subset of FTP the archive speaks:
/// USER, PASS, CWD, TYPE, PASV, LIST, RETR and QUIT.
struct ScriptedFtpServer {
    port: u16,
}

impl ScriptedFtpServer {
    fn start(tree: RemoteTree) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        std::thread::spawn(move || {
            for control in listener.incoming() {
                let Ok(control) = control else { break };
                let tree = tree.clone();
                std::thread::spawn(move || {
                    let _ = serve_session(control, &tree);
                });
            }
        });
        Self { port }
    }

    fn archive(&self, base_path: &str) -> FtpArchive {
        FtpArchive::new("127.0.0.1", base_path).with_port(self.port)
    }
}

fn reply(control: &mut TcpStream, line: &str) -> std::io::Result<()> {
    control.write_all(format!("{}\r\n", line).as_bytes())
}

fn send_data(
    control: &mut TcpStream,
    data: &mut Option<TcpListener>,
    payload: &[u8],
) -> std::io::Result<()> {
    let Some(listener) = data.take() else {
        return reply(control, "425 use PASV first");
    };
    reply(control, "150 opening data connection")?;
    let (mut conn, _) = listener.accept()?;
    conn.write_all(payload)?;
    drop(conn);
    reply(control, "226 transfer complete")
}

fn serve_session(mut control: TcpStream, tree: &RemoteTree) -> std::io::Result<()> {
    let mut reader = BufReader::new(control.try_clone()?);
    let mut cwd = String::new();
    let mut data: Option<TcpListener> = None;
    reply(&mut control, "220 scripted server ready")?;

    let mut line = String::new();
    loop {
        line.clear();
        if reader.read_line(&mut line)? == 0 {
            return Ok(());
        }
        let request = line.trim_end();
        let (command, arg) = request.split_once(' ').unwrap_or((request, ""));
        match command {
            "USER" => reply(&mut control, "331 password required")?,
            "PASS" => reply(&mut control, "230 logged in")?,
            "TYPE" => reply(&mut control, "200 type set")?,
            "CWD" if tree.dirs.contains_key(arg) => {
                cwd = arg.to_string();
                reply(&mut control, "250 directory changed")?
            }
            "CWD" => reply(&mut control, "550 no such directory")?,
            "PASV" => {
                let listener = TcpListener::bind("127.0.0.1:0")?;
                let port = listener.local_addr()?.port();
                data = Some(listener);
                reply(
                    &mut control,
                    &format!(
                        "227 Entering Passive Mode (127,0,0,1,{},{})",
                        port / 256,
                        port % 256
                    ),
                )?
            }
            "LIST" => {
                let mut body = tree
                    .dirs
                    .get(&cwd)
                    .map(|lines| lines.join("\r\n"))
                    .unwrap_or_default();
                body.push_str("\r\n");
                send_data(&mut control, &mut data, body.as_bytes())?
            }
            "RETR" => match tree.files.get(&format!("{}/{}", cwd, arg)) {
                Some(content) => send_data(&mut control, &mut data, content)?,
                None => reply(&mut control, "550 file not found")?,
            },
            "QUIT" => {
                reply(&mut control, "221 bye")?;
                return Ok(());
            }
            _ => reply(&mut control, "502 command not implemented")?,
        }
    }
}

const PROD_LINES: &[&str] = &[
    "total 8",
    "drwxr-xr-x    4 ftp      ftp          4096 Dec 31 03:29 gfs.20221231",
    "drwxr-xr-x    4 ftp      ftp          4096 Jan 01 03:29 gfs.20230101",
];

const CYCLE_LINES: &[&str] = &[
    "-rw-r--r--    1 ftp      ftp      3145745 Jan 01 04:01 gfs.t00z.pgrb2.0p25.anl",
    "-rw-r--r--    1 ftp      ftp        38912 Jan 01 04:01 gfs.t00z.pgrb2.0p25.anl.idx",
    "-rw-r--r--    1 ftp      ftp           12 Jan 01 04:12 gfs.t00z.pgrb2.0p25.f000",
];

/// Payload spanning several 1 MiB reads.
fn grib_payload() -> Vec<u8> {
    (0..3 * 1024 * 1024 + 17).map(|i| (i % 251) as u8).collect()
}

fn gfs_tree() -> RemoteTree {
    RemoteTree::default()
        .dir("/prod", PROD_LINES)
        .dir("/prod/gfs.20230101/00", CYCLE_LINES)
        .file("/prod/gfs.20230101/00", "gfs.t00z.pgrb2.0p25.anl", grib_payload())
        .file(
            "/prod/gfs.20230101/00",
            "gfs.t00z.pgrb2.0p25.f000",
            b"GRIB....7777".to_vec(),
        )
}

fn closed_port() -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    listener.local_addr().unwrap().port()
}

#[tokio::test]
async fn test_list_parses_list_response() {
    let server = ScriptedFtpServer::start(gfs_tree());
    let archive = server.archive("/prod");

    let listing = archive.list("/prod").await.unwrap();

    assert_eq!(listing.len(), 2);
    assert_eq!(
        listing["gfs.20230101"],
        DirectoryEntry::new("gfs.20230101", 4096)
    );
    assert!(listing.contains_key("gfs.20221231"));
}

#[tokio::test]
async fn test_list_missing_directory_is_listing_error() {
    let server = ScriptedFtpServer::start(gfs_tree());
    let archive = server.archive("/prod");

    let result = archive.list("/prod/gfs.20230102/00").await;

    match result {
        Err(FetchError::Listing { path, .. }) => assert_eq!(path, "/prod/gfs.20230102/00"),
        other => panic!("expected a listing error, got {:?}", other),
    }
}

#[tokio::test]
async fn test_unreachable_server() {
    let archive = FtpArchive::new("127.0.0.1", "/").with_port(closed_port());
    let dir = tempfile::tempdir().unwrap();

    assert!(matches!(
        archive.list("/").await,
        Err(FetchError::Listing { .. })
    ));
    match archive.fetch("/", "f000", dir.path()).await {
        Err(FetchError::Transfer { file, .. }) => assert_eq!(file, "f000"),
        other => panic!("expected a transfer error, got {:?}", other),
    }
    assert!(!dir.path().join("f000").exists());
}

#[tokio::test]
async fn test_fetch_writes_file_in_chunks() {
    let server = ScriptedFtpServer::start(gfs_tree());
    let archive = server.archive("/prod");
    let dir = tempfile::tempdir().unwrap();

    let local = archive
        .fetch(
            "/prod/gfs.20230101/00",
            "gfs.t00z.pgrb2.0p25.anl",
            dir.path(),
        )
        .await
        .unwrap();

    assert_eq!(local, dir.path().join("gfs.t00z.pgrb2.0p25.anl"));
    assert_eq!(std::fs::read(&local).unwrap(), grib_payload());
}

#[tokio::test]
async fn test_fetch_missing_file_is_transfer_error() {
    let server = ScriptedFtpServer::start(gfs_tree());
    let archive = server.archive("/prod");
    let dir = tempfile::tempdir().unwrap();

    let result = archive
        .fetch("/prod/gfs.20230101/00", "gfs.t00z.pgrb2.0p25.f999", dir.path())
        .await;

    match result {
        Err(FetchError::Transfer { file, .. }) => assert_eq!(file, "gfs.t00z.pgrb2.0p25.f999"),
        other => panic!("expected a transfer error, got {:?}", other),
    }
    assert!(!dir.path().join("gfs.t00z.pgrb2.0p25.f999").exists());
}

#[tokio::test]
async fn test_fetch_dataset_over_ftp() {
    let server = ScriptedFtpServer::start(gfs_tree());
    let archive = Arc::new(server.archive("/prod"));
    let dir = tempfile::tempdir().unwrap();

    let report = fetch_dataset(
        archive,
        &DatasetIdentity::new(2023, 1, 1, 0).unwrap(),
        &FetchConfig::default(),
        dir.path(),
        &ProgressBar::hidden(),
        &CancellationToken::new(),
    )
    .await
    .unwrap();

    assert_eq!(report.status(), FetchStatus::Done);
    assert_eq!(report.rounds, 1);
    let mut on_disk: Vec<String> = std::fs::read_dir(dir.path())
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    on_disk.sort();
    assert_eq!(
        on_disk,
        vec!["gfs.t00z.pgrb2.0p25.anl", "gfs.t00z.pgrb2.0p25.f000"]
    );
    assert_eq!(
        std::fs::read(dir.path().join("gfs.t00z.pgrb2.0p25.f000")).unwrap(),
        b"GRIB....7777"
    );
}
