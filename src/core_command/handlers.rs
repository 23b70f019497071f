use super::{cd, get, ls, mkdir, put, pwd, Reply};
use crate::config::ServerContext;
use crate::constants::SENTINEL;
use crate::core_error::{CommandError, ConnectionError};
use crate::core_network::transport::Connection;
use crate::core_protocol::codec::send_stream;
use crate::core_protocol::Command;
use crate::session::Session;
use log::{debug, error, info, warn};
use tokio::io::{AsyncRead, AsyncWrite};

/// Whether the session loop keeps reading commands after this one.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum Flow {
    Continue,
    Close,
}

/// Runs one command line against the session and sends its response.
///
/// Every per-command failure is turned into an `Error:` status line here and
/// the session goes on. Only transport failures leave through the `Err` arm.
pub async fn dispatch_command<S>(
    conn: &mut Connection<S>,
    session: &mut Session,
    context: &ServerContext,
    line: &str,
) -> Result<Flow, ConnectionError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let command = match Command::parse(line) {
        Ok(command) => command,
        Err(e) => {
            warn!("Rejected command line {:?}: {}", line, e);
            conn.send_text(&e.to_response()).await?;
            return Ok(Flow::Continue);
        }
    };
    debug!("Dispatching {:?}", command);

    let outcome = match command {
        Command::Exit => {
            info!("Received exit command. Closing connection.");
            return Ok(Flow::Close);
        }
        Command::Cd { path } => cd::handle_cd_command(session, &path).await,
        Command::Pwd => pwd::handle_pwd_command(session),
        Command::Ls {
            path,
            recursive: false,
        } => ls::handle_ls_command(session, path.as_deref()).await,
        Command::Ls {
            path: Some(path),
            recursive: true,
        } => ls::handle_manifest_command(session, &path).await,
        Command::Ls {
            path: None,
            recursive: true,
        } => Err(CommandError::MissingArgument),
        Command::Mkdir { path } => mkdir::handle_mkdir_command(session, &path).await,
        Command::Get {
            recursive: true, ..
        }
        | Command::Put {
            recursive: true, ..
        } => Err(CommandError::Unsupported),
        Command::Get { path, .. } => get::handle_get_command(session, &path).await,
        Command::Put { path, .. } => put::handle_put_command(conn, session, &path).await?,
    };

    match outcome {
        Ok(reply) => send_reply(conn, reply, context.chunk_size).await?,
        Err(e) => {
            warn!("Command {:?} failed: {}", line.trim_end(), e);
            conn.send_text(&e.to_response()).await?;
        }
    }
    Ok(Flow::Continue)
}

async fn send_reply<S>(
    conn: &mut Connection<S>,
    reply: Reply,
    chunk_size: usize,
) -> Result<(), ConnectionError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    match reply {
        Reply::Status(text) => conn.send_text(&text).await,
        Reply::Manifest(entries) => {
            for entry in &entries {
                conn.send_text(&entry.manifest_line()).await?;
            }
            conn.send(SENTINEL).await
        }
        Reply::File(mut file, path) => {
            let summary = send_stream(conn, &mut file, chunk_size).await?;
            match summary.read_error {
                Some(e) => error!("Transfer of {:?} cut short: {}", path, e),
                None => info!(
                    "File transfer completed successfully: {:?} ({} bytes)",
                    path, summary.bytes
                ),
            }
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::fs;
    use std::path::PathBuf;
    use std::time::Duration;
    use tokio::io::{duplex, DuplexStream};

    struct Harness {
        _tmp: tempfile::TempDir,
        base: PathBuf,
        server: Connection<DuplexStream>,
        client: Connection<DuplexStream>,
        session: Session,
        context: ServerContext,
    }

    impl Harness {
        fn new() -> Self {
            let tmp = tempfile::tempdir().unwrap();
            let base = tmp.path().join("base");
            fs::create_dir_all(base.join("docs/empty")).unwrap();
            fs::write(base.join("docs/readme.txt"), b"Hello, world!").unwrap();
            let base = base.canonicalize().unwrap();

            let (a, b) = duplex(256 * 1024);
            Self {
                _tmp: tmp,
                session: Session::new(base.clone()),
                context: ServerContext {
                    base_dir: base.clone(),
                    chunk_size: 4096,
                    max_message_size: 1024 * 1024,
                    shutdown_grace: Duration::from_secs(1),
                },
                base,
                server: Connection::new(a),
                client: Connection::new(b),
            }
        }

        async fn run(&mut self, line: &str) -> Flow {
            dispatch_command(&mut self.server, &mut self.session, &self.context, line)
                .await
                .unwrap()
        }

        async fn exchange(&mut self, line: &str) -> String {
            assert_eq!(self.run(line).await, Flow::Continue);
            self.client.receive_text().await.unwrap()
        }

        async fn upload(&mut self, line: &str, chunks: &[&[u8]]) -> String {
            for chunk in chunks {
                self.client.send(chunk).await.unwrap();
            }
            self.client.send(SENTINEL).await.unwrap();
            self.exchange(line).await
        }
    }

    fn lines(text: &str) -> HashSet<String> {
        text.lines().map(str::to_string).collect()
    }

    #[tokio::test]
    async fn test_cd_ls_get_scenario() {
        let mut h = Harness::new();

        let reply = h.exchange("cd docs").await;
        assert_eq!(
            reply,
            format!("Directory changed to: {}", h.base.join("docs").display())
        );

        let listing = h.exchange("ls").await;
        assert!(listing.ends_with('\n'));
        assert_eq!(
            lines(&listing),
            lines("readme.txt\nempty/\n"),
            "listing was {:?}",
            listing
        );

        h.run("get readme.txt").await;
        assert_eq!(h.client.receive().await.unwrap(), b"Hello, world!");
        assert_eq!(h.client.receive().await.unwrap(), b"EOF");
    }

    #[tokio::test]
    async fn test_cd_escape_leaves_directory_unchanged() {
        let mut h = Harness::new();
        h.exchange("cd docs").await;
        let before = h.exchange("pwd").await;

        assert_eq!(h.exchange("cd ../../etc").await, "Error: Access denied.");
        assert_eq!(h.exchange("cd /").await, "Error: Access denied.");
        assert_eq!(h.exchange("pwd").await, before);
    }

    #[tokio::test]
    async fn test_cd_rejects_missing_and_files() {
        let mut h = Harness::new();
        assert_eq!(h.exchange("cd nowhere").await, "Error: Invalid directory.");
        assert_eq!(
            h.exchange("cd docs/readme.txt").await,
            "Error: Invalid directory."
        );
        assert_eq!(h.exchange("pwd").await, h.base.display().to_string());
    }

    #[tokio::test]
    async fn test_ls_errors() {
        let mut h = Harness::new();
        assert_eq!(h.exchange("ls nowhere").await, "Error: Path does not exist.");
        assert_eq!(
            h.exchange("ls docs/readme.txt").await,
            "Error: Specified path is not a directory."
        );
        assert_eq!(h.exchange("ls ..").await, "Error: Access denied.");
        assert_eq!(h.exchange("ls docs/empty").await, "");
    }

    #[tokio::test]
    async fn test_manifest_lists_children_then_sentinel() {
        let mut h = Harness::new();
        h.run("ls -R docs").await;

        let mut seen = HashSet::new();
        loop {
            let message = h.client.receive_text().await.unwrap();
            if message == "EOF" {
                break;
            }
            seen.insert(message);
        }
        assert_eq!(seen, lines("FILE readme.txt\nDIR empty"));
    }

    #[tokio::test]
    async fn test_manifest_error_is_single_message() {
        let mut h = Harness::new();
        assert_eq!(h.exchange("ls -R ../..").await, "Error: Access denied.");
        assert_eq!(h.exchange("pwd").await, h.base.display().to_string());
    }

    #[tokio::test]
    async fn test_mkdir() {
        let mut h = Harness::new();
        assert_eq!(h.exchange("mkdir fresh").await, "Directory created.");
        assert!(h.base.join("fresh").is_dir());

        assert_eq!(
            h.exchange("mkdir docs").await,
            "Error: Directory already exists or cannot be created."
        );
        assert!(h.base.join("docs/readme.txt").is_file());
        assert!(h.base.join("docs/empty").is_dir());

        assert_eq!(h.exchange("mkdir ../escape").await, "Error: Access denied.");
        assert!(!h.base.parent().unwrap().join("escape").exists());

        assert!(h
            .exchange("mkdir missing/child")
            .await
            .starts_with("Error:"));
    }

    #[tokio::test]
    async fn test_get_errors() {
        let mut h = Harness::new();
        assert_eq!(
            h.exchange("get nothing.txt").await,
            "Error: File or directory does not exist."
        );
        assert_eq!(
            h.exchange("get docs").await,
            "Error: Cannot fetch directory without -R flag."
        );
        assert_eq!(
            h.exchange("get -R docs").await,
            "Error: Recursive transfer is driven by the client."
        );
        assert_eq!(h.exchange("get ../../etc/passwd").await, "Error: Access denied.");
    }

    #[tokio::test]
    async fn test_get_uses_configured_chunk_size() {
        let mut h = Harness::new();
        h.context.chunk_size = 5;
        h.run("get docs/readme.txt").await;

        let mut sizes = Vec::new();
        loop {
            let message = h.client.receive().await.unwrap();
            if message == b"EOF" {
                break;
            }
            sizes.push(message.len());
        }
        assert_eq!(sizes, vec![5, 5, 3]);
    }

    #[tokio::test]
    async fn test_put_stores_body() {
        let mut h = Harness::new();
        let reply = h.upload("put docs/new.bin", &[b"abc", b"def"]).await;
        assert_eq!(reply, "File received.");
        assert_eq!(fs::read(h.base.join("docs/new.bin")).unwrap(), b"abcdef");

        let reply = h.upload("put docs/readme.txt", &[b"replaced"]).await;
        assert_eq!(reply, "File received.");
        assert_eq!(fs::read(h.base.join("docs/readme.txt")).unwrap(), b"replaced");
    }

    #[tokio::test]
    async fn test_refused_put_drains_body() {
        let mut h = Harness::new();
        let reply = h.upload("put ../stolen.txt", &[b"payload"]).await;
        assert_eq!(reply, "Error: Access denied.");
        assert!(!h.base.parent().unwrap().join("stolen.txt").exists());

        let reply = h.upload("put docs", &[b"payload"]).await;
        assert!(reply.starts_with("Error:"), "{}", reply);

        // The connection is still in step.
        assert_eq!(h.exchange("pwd").await, h.base.display().to_string());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_put_through_dangling_link_is_refused() {
        let mut h = Harness::new();
        let outside = h.base.parent().unwrap().join("outside_created.txt");
        std::os::unix::fs::symlink("../outside_created.txt", h.base.join("link")).unwrap();

        let reply = h.upload("put link", &[b"escaped!"]).await;
        assert_eq!(reply, "Error: Access denied.");
        assert!(!outside.exists());
        assert_eq!(h.exchange("pwd").await, h.base.display().to_string());
    }

    #[tokio::test]
    async fn test_unknown_and_exit() {
        let mut h = Harness::new();
        assert_eq!(h.exchange("rm -rf /").await, "Error: Unknown command.");
        assert_eq!(h.exchange("CD docs").await, "Error: Unknown command.");
        assert_eq!(h.exchange("cd").await, "Error: Missing path argument.");
        assert_eq!(h.run("exit").await, Flow::Close);
    }
}
