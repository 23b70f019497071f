use sandfs::config::ServerContext;
use sandfs::constants::SHUTDOWN_NOTICE;
use sandfs::core_client::{Client, ClientCommand, Orchestrator};
use sandfs::core_error::{ClientError, ConnectionError};
use sandfs::core_network::{Connection, Server};
use sandfs::core_protocol::EntryKind;
use std::collections::BTreeMap;
use std::fs;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tempfile::TempDir;
use tokio::net::TcpStream;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

struct TestServer {
    addr: SocketAddr,
    base: PathBuf,
    stop: Option<oneshot::Sender<()>>,
    task: JoinHandle<anyhow::Result<()>>,
    _root: TempDir,
}

impl TestServer {
    async fn start(chunk_size: usize) -> Self {
        let root = tempfile::tempdir().unwrap();
        let base = root.path().join("base");
        fs::create_dir_all(base.join("docs/empty")).unwrap();
        fs::write(base.join("docs/readme.txt"), b"Hello, world!").unwrap();
        let base = base.canonicalize().unwrap();

        let context = ServerContext {
            base_dir: base.clone(),
            chunk_size,
            max_message_size: 1024 * 1024,
            shutdown_grace: Duration::from_secs(1),
        };
        let server = Server::bind("127.0.0.1:0", context).await.unwrap();
        let addr = server.local_addr().unwrap();
        let (stop, stopped) = oneshot::channel::<()>();
        let task = tokio::spawn(server.run_until(async move {
            let _ = stopped.await;
        }));

        Self {
            addr,
            base,
            stop: Some(stop),
            task,
            _root: root,
        }
    }

    async fn client(&self, chunk_size: usize) -> Client<TcpStream> {
        Client::connect("127.0.0.1", self.addr.port(), chunk_size)
            .await
            .unwrap()
    }

    async fn stop(mut self) {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }
        tokio::time::timeout(Duration::from_secs(5), self.task)
            .await
            .expect("server did not stop")
            .unwrap()
            .unwrap();
    }
}

/// Relative path -> contents (`None` for directories) of a local tree.
fn snapshot(root: &Path) -> BTreeMap<String, Option<Vec<u8>>> {
    walkdir::WalkDir::new(root)
        .min_depth(1)
        .into_iter()
        .map(|entry| {
            let entry = entry.unwrap();
            let relative = entry
                .path()
                .strip_prefix(root)
                .unwrap()
                .components()
                .map(|c| c.as_os_str().to_string_lossy().into_owned())
                .collect::<Vec<_>>()
                .join("/");
            let contents = if entry.file_type().is_dir() {
                None
            } else {
                Some(fs::read(entry.path()).unwrap())
            };
            (relative, contents)
        })
        .collect()
}

/// 3 nested directories, 5 files.
fn local_tree(root: &Path) {
    fs::create_dir_all(root.join("a/b/c")).unwrap();
    fs::write(root.join("top.txt"), b"top level").unwrap();
    fs::write(root.join("a/one.txt"), b"first").unwrap();
    fs::write(root.join("a/b/two.txt"), b"").unwrap();
    fs::write(root.join("a/b/c/three.txt"), "x".repeat(10_000)).unwrap();
    fs::write(
        root.join("a/b/c/four.bin"),
        (0..=255u8).cycle().take(3000).collect::<Vec<_>>(),
    )
    .unwrap();
}

#[tokio::test]
async fn test_cd_ls_get_scenario() {
    let server = TestServer::start(4096).await;
    let mut client = server.client(4096).await;
    let local = tempfile::tempdir().unwrap();

    let reply = client.cd("docs").await.unwrap();
    assert_eq!(
        reply,
        format!("Directory changed to: {}", server.base.join("docs").display())
    );

    let listing = client.ls(None).await.unwrap();
    let mut lines: Vec<&str> = listing.lines().collect();
    lines.sort();
    assert_eq!(lines, vec!["empty/", "readme.txt"]);
    assert!(listing.ends_with('\n'));

    let target = local.path().join("readme.txt");
    assert_eq!(client.get("readme.txt", &target).await.unwrap(), 13);
    assert_eq!(fs::read(&target).unwrap(), b"Hello, world!");

    client.exit().await.unwrap();
    server.stop().await;
}

#[tokio::test]
async fn test_traversal_is_denied_and_cwd_kept() {
    let server = TestServer::start(4096).await;
    let mut client = server.client(4096).await;

    match client.cd("../../etc").await {
        Err(ClientError::Remote(message)) => assert_eq!(message, "Error: Access denied."),
        other => panic!("unexpected {:?}", other),
    }
    assert!(client.cd("/etc").await.is_err());
    assert_eq!(
        client.pwd().await.unwrap(),
        server.base.display().to_string()
    );

    let local = tempfile::tempdir().unwrap();
    let target = local.path().join("passwd");
    assert!(client.get("../../etc/passwd", &target).await.is_err());
    assert!(!target.exists());

    client.exit().await.unwrap();
    server.stop().await;
}

#[cfg(unix)]
#[tokio::test]
async fn test_dangling_link_cannot_place_files_outside() {
    let server = TestServer::start(4096).await;
    let mut client = server.client(4096).await;
    let local = tempfile::tempdir().unwrap();
    let payload = local.path().join("payload.txt");
    fs::write(&payload, b"escaped!").unwrap();

    let outside = server.base.parent().unwrap().join("outside_created.txt");
    std::os::unix::fs::symlink("../outside_created.txt", server.base.join("link")).unwrap();

    match client.put(&payload, "link").await {
        Err(ClientError::Remote(message)) => assert_eq!(message, "Error: Access denied."),
        other => panic!("unexpected {:?}", other),
    }
    assert!(!outside.exists());

    client.exit().await.unwrap();
    server.stop().await;
}

#[tokio::test]
async fn test_mkdir_on_existing_directory_keeps_contents() {
    let server = TestServer::start(4096).await;
    let mut client = server.client(4096).await;

    assert_eq!(client.mkdir("fresh").await.unwrap(), "Directory created.");
    assert!(server.base.join("fresh").is_dir());

    assert!(matches!(
        client.mkdir("docs").await,
        Err(ClientError::Remote(_))
    ));
    assert_eq!(
        fs::read(server.base.join("docs/readme.txt")).unwrap(),
        b"Hello, world!"
    );
    assert!(server.base.join("docs/empty").is_dir());

    client.exit().await.unwrap();
    server.stop().await;
}

#[tokio::test]
async fn test_put_then_get_returns_same_bytes() {
    let server = TestServer::start(7).await;
    let mut client = server.client(11).await;
    let local = tempfile::tempdir().unwrap();

    let original: Vec<u8> = (0..=255u8).cycle().take(1000).collect();
    let source = local.path().join("data.bin");
    fs::write(&source, &original).unwrap();

    assert_eq!(
        client.put(&source, "data.bin").await.unwrap(),
        "File received."
    );
    assert_eq!(fs::read(server.base.join("data.bin")).unwrap(), original);

    let copy = local.path().join("copy.bin");
    assert_eq!(client.get("data.bin", &copy).await.unwrap(), 1000);
    assert_eq!(fs::read(&copy).unwrap(), original);

    client.exit().await.unwrap();
    server.stop().await;
}

#[tokio::test]
async fn test_quoted_paths_with_spaces_travel_unchanged() {
    let server = TestServer::start(4096).await;
    let mut client = server.client(4096).await;
    let local = tempfile::tempdir().unwrap();
    let source = local.path().join("my notes.txt");
    fs::write(&source, b"spaced out").unwrap();

    let line = format!(r#"put "{}" "a  b.txt""#, source.display());
    let output = client
        .execute(ClientCommand::parse(&line).unwrap())
        .await
        .unwrap();
    assert_eq!(output, "File received.");
    assert_eq!(
        fs::read(server.base.join("a  b.txt")).unwrap(),
        b"spaced out"
    );

    client.exit().await.unwrap();
    server.stop().await;
}

#[tokio::test]
async fn test_recursive_put_then_manifest() {
    let server = TestServer::start(4096).await;
    let mut client = server.client(512).await;
    let local = tempfile::tempdir().unwrap();
    local_tree(local.path());

    let report = Orchestrator::new(&mut client)
        .upload(local.path(), "upload")
        .await
        .unwrap();
    assert!(report.is_complete(), "{:?}", report.failures);
    assert_eq!(report.files, 5);

    let manifest = Orchestrator::new(&mut client)
        .manifest("upload")
        .await
        .unwrap();
    let mut dirs: Vec<&str> = manifest
        .iter()
        .filter(|e| e.kind == EntryKind::Dir)
        .map(|e| e.name.as_str())
        .collect();
    let mut files: Vec<&str> = manifest
        .iter()
        .filter(|e| e.kind == EntryKind::File)
        .map(|e| e.name.as_str())
        .collect();
    dirs.sort();
    files.sort();
    assert_eq!(dirs, vec!["a", "a/b", "a/b/c"]);
    assert_eq!(
        files,
        vec![
            "a/b/c/four.bin",
            "a/b/c/three.txt",
            "a/b/two.txt",
            "a/one.txt",
            "top.txt"
        ]
    );
    assert_eq!(snapshot(&server.base.join("upload")), snapshot(local.path()));

    client.exit().await.unwrap();
    server.stop().await;
}

#[tokio::test]
async fn test_tree_round_trip() {
    let server = TestServer::start(1000).await;
    let mut client = server.client(333).await;
    let local = tempfile::tempdir().unwrap();
    local_tree(&server.base.join("original"));

    let downloaded = local.path().join("download");
    let output = client
        .execute(ClientCommand::parse(&format!("get -R original {}", downloaded.display())).unwrap())
        .await
        .unwrap();
    assert!(output.contains("5 files"), "{}", output);
    assert_eq!(snapshot(&downloaded), snapshot(&server.base.join("original")));

    let report = Orchestrator::new(&mut client)
        .upload(&downloaded, "copy")
        .await
        .unwrap();
    assert!(report.is_complete(), "{:?}", report.failures);
    assert_eq!(
        snapshot(&server.base.join("copy")),
        snapshot(&server.base.join("original"))
    );

    client.exit().await.unwrap();
    server.stop().await;
}

#[tokio::test]
async fn test_recursive_get_of_missing_tree_reports_failure() {
    let server = TestServer::start(4096).await;
    let mut client = server.client(4096).await;
    let local = tempfile::tempdir().unwrap();

    let report = Orchestrator::new(&mut client)
        .download("nowhere", &local.path().join("out"))
        .await
        .unwrap();
    assert_eq!(report.failures.len(), 1);
    assert_eq!(report.files, 0);

    // The session is still usable afterwards.
    assert_eq!(
        client.pwd().await.unwrap(),
        server.base.display().to_string()
    );
    client.exit().await.unwrap();
    server.stop().await;
}

#[tokio::test]
async fn test_recursive_flag_on_the_wire_is_refused() {
    let server = TestServer::start(4096).await;
    let mut raw = Connection::new(TcpStream::connect(server.addr).await.unwrap());

    raw.send_text("get -R docs").await.unwrap();
    assert_eq!(
        raw.receive_text().await.unwrap(),
        "Error: Recursive transfer is driven by the client."
    );
    raw.send_text("frobnicate").await.unwrap();
    assert_eq!(raw.receive_text().await.unwrap(), "Error: Unknown command.");

    raw.send_text("exit").await.unwrap();
    server.stop().await;
}

#[tokio::test]
async fn test_shutdown_notifies_connected_client() {
    let server = TestServer::start(4096).await;
    let mut raw = Connection::new(TcpStream::connect(server.addr).await.unwrap());
    raw.send_text("pwd").await.unwrap();
    assert_eq!(
        raw.receive_text().await.unwrap(),
        server.base.display().to_string()
    );

    let addr = server.addr;
    server.stop().await;

    assert_eq!(raw.receive_text().await.unwrap(), SHUTDOWN_NOTICE);
    assert!(matches!(
        raw.receive().await,
        Err(ConnectionError::PeerClosed)
    ));
    assert!(TcpStream::connect(addr).await.is_err());
}
