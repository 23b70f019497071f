use super::input::{ClientCommand, HELP_TEXT};
use super::orchestrator::Orchestrator;
use crate::constants::{DEFAULT_CHUNK_SIZE, SHUTDOWN_NOTICE};
use crate::core_error::{ClientError, CommandError, ConnectionError};
use crate::core_network::transport::Connection;
use crate::core_protocol::codec::{receive_stream, recv_chunk, send_stream};
use crate::core_protocol::{Chunk, Command, DirectoryEntry};
use log::{debug, info, warn};
use std::path::{Path, PathBuf};
use tokio::fs::{self, File};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;

/// One connection to a server. Every method is one request and its whole
/// response; nothing is pipelined.
pub struct Client<S> {
    conn: Connection<S>,
    chunk_size: usize,
}

impl Client<TcpStream> {
    pub async fn connect(host: &str, port: u16, chunk_size: usize) -> Result<Self, ClientError> {
        let stream = TcpStream::connect((host, port))
            .await
            .map_err(ConnectionError::from)?;
        info!("Connected to server {}:{}", host, port);
        Ok(Self::new(Connection::new(stream), chunk_size))
    }
}

impl<S> Client<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// `chunk_size` is clamped to what one message may carry.
    pub fn new(conn: Connection<S>, chunk_size: usize) -> Self {
        let chunk_size = match chunk_size {
            0 => DEFAULT_CHUNK_SIZE,
            size if size > conn.max_message_size() => {
                warn!(
                    "Chunk size {} exceeds the {} byte message limit, using the limit",
                    size,
                    conn.max_message_size()
                );
                conn.max_message_size()
            }
            size => size,
        };
        Self { conn, chunk_size }
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    pub(crate) fn connection(&mut self) -> &mut Connection<S> {
        &mut self.conn
    }

    async fn request(&mut self, command: &Command) -> Result<(), ConnectionError> {
        debug!("Sending command: {}", command);
        self.conn.send_text(&command.to_line()).await
    }

    /// Reads one status message.
    async fn status(&mut self) -> Result<String, ClientError> {
        let reply = self.conn.receive_text().await?;
        check_status(reply)
    }

    pub async fn cd(&mut self, path: &str) -> Result<String, ClientError> {
        self.request(&Command::Cd {
            path: path.to_string(),
        })
        .await?;
        self.status().await
    }

    pub async fn pwd(&mut self) -> Result<String, ClientError> {
        self.request(&Command::Pwd).await?;
        self.status().await
    }

    /// Raw `ls` response: one line per entry, directories suffixed with `/`.
    pub async fn ls(&mut self, path: Option<&str>) -> Result<String, ClientError> {
        self.request(&Command::Ls {
            path: path.map(str::to_string),
            recursive: false,
        })
        .await?;
        self.status().await
    }

    pub async fn list_entries(
        &mut self,
        path: Option<&str>,
    ) -> Result<Vec<DirectoryEntry>, ClientError> {
        Ok(DirectoryEntry::parse_listing(&self.ls(path).await?))
    }

    /// Children of one remote directory, read from its manifest up to the sentinel.
    pub async fn manifest_level(&mut self, path: &str) -> Result<Vec<DirectoryEntry>, ClientError> {
        self.request(&Command::Ls {
            path: Some(path.to_string()),
            recursive: true,
        })
        .await?;

        let mut entries = Vec::new();
        loop {
            let line = match recv_chunk(&mut self.conn).await? {
                Chunk::End => break,
                Chunk::Data(data) => String::from_utf8_lossy(&data).into_owned(),
            };
            // An error or the shutdown notice replaces the whole manifest.
            let line = if entries.is_empty() {
                check_status(line)?
            } else {
                line
            };
            match DirectoryEntry::parse_manifest_line(&line) {
                Some(entry) => entries.push(entry),
                None => warn!("Unknown manifest line received: {:?}", line),
            }
        }
        Ok(entries)
    }

    pub async fn mkdir(&mut self, path: &str) -> Result<String, ClientError> {
        self.request(&Command::Mkdir {
            path: path.to_string(),
        })
        .await?;
        self.status().await
    }

    /// Sends `get` and returns the first message of the body.
    ///
    /// A first message equal to one of the server's refusal lines is taken as
    /// the refusal, so a file whose first chunk is exactly such a line cannot
    /// be told apart from one.
    pub(crate) async fn begin_get(&mut self, remote: &str) -> Result<Vec<u8>, ClientError> {
        self.request(&Command::Get {
            path: remote.to_string(),
            recursive: false,
        })
        .await?;

        let first = self.conn.receive().await?;
        if let Ok(text) = std::str::from_utf8(&first) {
            check_status(text.to_string())?;
        }
        Ok(first)
    }

    /// Downloads one remote file to `local`, returning the number of bytes.
    pub async fn get(&mut self, remote: &str, local: &Path) -> Result<u64, ClientError> {
        let first = self.begin_get(remote).await?;

        let mut file = match File::create(local).await {
            Ok(file) => file,
            Err(e) => {
                // Keep the connection in step before reporting.
                receive_stream(&mut self.conn, Some(first), &mut tokio::io::sink()).await?;
                return Err(ClientError::local(
                    format!("Cannot create local file {}", local.display()),
                    e,
                ));
            }
        };

        let summary = receive_stream(&mut self.conn, Some(first), &mut file).await?;
        if let Some(e) = summary.write_error {
            return Err(ClientError::local(
                format!("Writing to {} failed", local.display()),
                e,
            ));
        }
        info!("File transfer completed: {}", local.display());
        Ok(summary.bytes)
    }

    /// Uploads one local file. Nothing is sent if the file cannot be opened.
    pub async fn put(&mut self, local: &Path, remote: &str) -> Result<String, ClientError> {
        let metadata = fs::metadata(local).await.map_err(|e| {
            ClientError::local(format!("Error opening local file {}", local.display()), e)
        })?;
        if !metadata.is_file() {
            return Err(ClientError::Usage(format!(
                "{} is not a regular file (use put -R for directories)",
                local.display()
            )));
        }
        let mut file = File::open(local).await.map_err(|e| {
            ClientError::local(format!("Error opening local file {}", local.display()), e)
        })?;

        self.request(&Command::Put {
            path: remote.to_string(),
            recursive: false,
        })
        .await?;
        let summary = send_stream(&mut self.conn, &mut file, self.chunk_size).await?;
        let status = self.status().await?;

        if let Some(e) = summary.read_error {
            return Err(ClientError::local(
                format!("Reading {} failed, upload is incomplete", local.display()),
                e,
            ));
        }
        info!("File uploaded: {} -> {}", local.display(), remote);
        Ok(status)
    }

    /// Sends `exit` and closes the connection. The server sends nothing back.
    pub async fn exit(&mut self) -> Result<(), ClientError> {
        self.request(&Command::Exit).await?;
        self.conn.close().await?;
        Ok(())
    }

    /// Runs one user command and renders its outcome as text.
    pub async fn execute(&mut self, command: ClientCommand) -> Result<String, ClientError> {
        match command {
            ClientCommand::Exit => {
                self.exit().await?;
                Ok("Exiting...".to_string())
            }
            ClientCommand::Help => Ok(HELP_TEXT.to_string()),
            ClientCommand::Cd(path) => self.cd(&path).await,
            ClientCommand::Pwd => Ok(format!("Remote directory: {}", self.pwd().await?)),
            ClientCommand::Ls(path) => {
                let listing = self.ls(path.as_deref()).await?;
                Ok(listing.trim_end_matches('\n').to_string())
            }
            ClientCommand::Mkdir(path) => self.mkdir(&path).await,
            ClientCommand::LocalCd(path) => {
                let target = match path {
                    Some(path) => PathBuf::from(path),
                    None => home_dir()?,
                };
                std::env::set_current_dir(&target).map_err(|e| {
                    ClientError::local(
                        format!("Error changing local directory to {}", target.display()),
                        e,
                    )
                })?;
                Ok(format!(
                    "Local directory changed to: {}",
                    local_dir()?.display()
                ))
            }
            ClientCommand::LocalPwd => Ok(format!("Local directory: {}", local_dir()?.display())),
            ClientCommand::LocalMkdir(path) => {
                fs::create_dir(&path).await.map_err(|e| {
                    ClientError::local(format!("Error creating directory {}", path), e)
                })?;
                Ok(format!("Directory created: {}", path))
            }
            ClientCommand::Get {
                remote,
                local,
                recursive,
            } => {
                let local = local
                    .map(PathBuf::from)
                    .unwrap_or_else(|| default_local_path(&remote));
                if recursive {
                    let report = Orchestrator::new(self).download(&remote, &local).await?;
                    Ok(report.summary(&remote, &local.display().to_string()))
                } else {
                    let bytes = self.get(&remote, &local).await?;
                    Ok(format!(
                        "Fetched {} -> {} ({} bytes)",
                        remote,
                        local.display(),
                        bytes
                    ))
                }
            }
            ClientCommand::Put {
                local,
                remote,
                recursive,
            } => {
                let remote = remote.unwrap_or_else(|| default_remote_path(&local));
                let local = PathBuf::from(local);
                if recursive {
                    let report = Orchestrator::new(self).upload(&local, &remote).await?;
                    Ok(report.summary(&local.display().to_string(), &remote))
                } else {
                    self.put(&local, &remote).await
                }
            }
        }
    }
}

/// Only the exact refusal lines count as errors; a listing or a status that
/// merely starts with `Error:` is passed through.
fn check_status(reply: String) -> Result<String, ClientError> {
    if reply == SHUTDOWN_NOTICE {
        Err(ConnectionError::ServerShutdown.into())
    } else if CommandError::is_response(&reply) {
        Err(ClientError::Remote(reply))
    } else {
        Ok(reply)
    }
}

fn local_dir() -> Result<PathBuf, ClientError> {
    std::env::current_dir()
        .map_err(|e| ClientError::local("Cannot read local working directory", e))
}

fn home_dir() -> Result<PathBuf, ClientError> {
    std::env::var_os("HOME")
        .or_else(|| std::env::var_os("USERPROFILE"))
        .map(PathBuf::from)
        .ok_or_else(|| ClientError::Usage("lcd: no home directory set".to_string()))
}

fn last_component(path: &str) -> Option<String> {
    Path::new(path.trim_end_matches('/'))
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
}

fn default_local_path(remote: &str) -> PathBuf {
    PathBuf::from(last_component(remote).unwrap_or_else(|| remote.to_string()))
}

fn default_remote_path(local: &str) -> String {
    last_component(local).unwrap_or_else(|| local.to_string())
}
