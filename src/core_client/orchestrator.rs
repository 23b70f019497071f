use super::dispatcher::Client;
use crate::core_error::{ClientError, ConnectionError};
use crate::core_protocol::codec::recv_chunk;
use crate::core_protocol::{Chunk, DirectoryEntry, EntryKind};
use log::{debug, info, warn};
use std::io;
use std::path::{Component, Path, PathBuf};
use tokio::fs::{self, File};
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use walkdir::WalkDir;

/// Chunks buffered between the network loop and one file writer.
const WRITER_QUEUE_DEPTH: usize = 32;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Upload,
    Download,
}

/// One file found while walking a tree, and where it goes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferTask {
    pub local_path: PathBuf,
    pub remote_path: String,
    pub direction: Direction,
}

#[derive(Debug)]
pub struct TransferFailure {
    pub path: String,
    pub error: ClientError,
}

#[derive(Debug, Default)]
pub struct TransferReport {
    pub directories: usize,
    pub files: usize,
    pub bytes: u64,
    pub failures: Vec<TransferFailure>,
}

impl TransferReport {
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }

    pub fn summary(&self, from: &str, to: &str) -> String {
        let mut text = format!(
            "Transferred {} -> {}: {} directories, {} files, {} bytes",
            from, to, self.directories, self.files, self.bytes
        );
        for failure in &self.failures {
            text.push_str(&format!("\n  failed {}: {}", failure.path, failure.error));
        }
        text
    }

    /// Records a per-entry failure. Connection failures are handed back instead.
    fn absorb(&mut self, path: impl Into<String>, error: ClientError) -> Result<(), ConnectionError> {
        match error {
            ClientError::Connection(e) => Err(e),
            error => {
                let path = path.into();
                warn!("Skipping {}: {}", path, error);
                self.failures.push(TransferFailure { path, error });
                Ok(())
            }
        }
    }
}

type WriterResult = Result<(PathBuf, u64), (PathBuf, io::Error)>;

/// Replicates directory trees by issuing ordinary `mkdir`, `put`, `ls -R`
/// and `get` commands, one exchange at a time.
pub struct Orchestrator<'a, S> {
    client: &'a mut Client<S>,
}

impl<'a, S> Orchestrator<'a, S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    pub fn new(client: &'a mut Client<S>) -> Self {
        Self { client }
    }

    /// `put -R`: mirrors `local_root` under `remote_root`.
    ///
    /// Directories are created (and their response read) before anything
    /// inside them is sent. A refused entry is recorded and skipped; only a
    /// connection failure stops the walk.
    pub async fn upload(
        &mut self,
        local_root: &Path,
        remote_root: &str,
    ) -> Result<TransferReport, ConnectionError> {
        let mut report = TransferReport::default();

        match fs::metadata(local_root).await {
            Ok(metadata) if metadata.is_dir() => {}
            Ok(_) => {
                report.absorb(
                    local_root.display().to_string(),
                    ClientError::Usage("not a directory".to_string()),
                )?;
                return Ok(report);
            }
            Err(e) => {
                report.absorb(
                    local_root.display().to_string(),
                    ClientError::local("Cannot read local directory", e),
                )?;
                return Ok(report);
            }
        }

        // An existing remote root is fine.
        match self.client.mkdir(remote_root).await {
            Ok(_) => report.directories += 1,
            Err(ClientError::Remote(message)) => {
                info!("Remote root {}: {}", remote_root, message)
            }
            Err(e) => report.absorb(remote_root, e)?,
        }

        for entry in WalkDir::new(local_root).min_depth(1).sort_by_file_name() {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    let path = e
                        .path()
                        .map(|p| p.display().to_string())
                        .unwrap_or_else(|| local_root.display().to_string());
                    report.absorb(path, ClientError::local("Cannot walk", io::Error::from(e)))?;
                    continue;
                }
            };

            let relative = match entry.path().strip_prefix(local_root) {
                Ok(relative) => relative,
                Err(_) => continue,
            };
            let task = TransferTask {
                local_path: entry.path().to_path_buf(),
                remote_path: join_remote(remote_root, &relative_to_remote(relative)),
                direction: Direction::Upload,
            };

            let file_type = entry.file_type();
            if file_type.is_dir() {
                match self.client.mkdir(&task.remote_path).await {
                    Ok(_) => {
                        report.directories += 1;
                        info!("Remote directory created: {}", task.remote_path);
                    }
                    Err(e) => report.absorb(task.remote_path.clone(), e)?,
                }
            } else if file_type.is_file() {
                self.upload_file(&task, &mut report).await?;
            } else {
                info!(
                    "Skipping unsupported file type: {}",
                    task.local_path.display()
                );
            }
        }

        info!("Directory upload complete: {}", local_root.display());
        Ok(report)
    }

    async fn upload_file(
        &mut self,
        task: &TransferTask,
        report: &mut TransferReport,
    ) -> Result<(), ConnectionError> {
        match self.client.put(&task.local_path, &task.remote_path).await {
            Ok(_) => {
                report.files += 1;
                report.bytes += fs::metadata(&task.local_path)
                    .await
                    .map(|m| m.len())
                    .unwrap_or(0);
                debug!(
                    "File uploaded: {} -> {}",
                    task.local_path.display(),
                    task.remote_path
                );
                Ok(())
            }
            Err(e) => report.absorb(task.remote_path.clone(), e),
        }
    }

    /// `get -R`: mirrors `remote_root` under `local_root`.
    ///
    /// Each remote directory's manifest is read to its sentinel before any
    /// entry in it is fetched. File bodies are handed to one writer task per
    /// file; all writers are awaited before the report is returned, also when
    /// the walk stops on a connection failure.
    pub async fn download(
        &mut self,
        remote_root: &str,
        local_root: &Path,
    ) -> Result<TransferReport, ConnectionError> {
        let mut report = TransferReport::default();
        if let Err(e) = fs::create_dir_all(local_root).await {
            report.absorb(
                local_root.display().to_string(),
                ClientError::local("Cannot create local directory", e),
            )?;
            return Ok(report);
        }

        let mut writers = JoinSet::new();
        let walked = self
            .download_tree(remote_root, local_root, &mut writers, &mut report)
            .await;

        while let Some(joined) = writers.join_next().await {
            match joined {
                Ok(Ok((path, bytes))) => {
                    report.files += 1;
                    report.bytes += bytes;
                    debug!("File transfer completed: {}", path.display());
                }
                Ok(Err((path, e))) => {
                    let context = format!("Writing {} failed", path.display());
                    report.absorb(path.display().to_string(), ClientError::local(context, e))?;
                }
                Err(e) => {
                    report.absorb(
                        "writer task",
                        ClientError::local("Writer task failed", io::Error::other(e)),
                    )?;
                }
            }
        }

        walked?;
        info!("Directory download complete: {}", local_root.display());
        Ok(report)
    }

    async fn download_tree(
        &mut self,
        remote_root: &str,
        local_root: &Path,
        writers: &mut JoinSet<WriterResult>,
        report: &mut TransferReport,
    ) -> Result<(), ConnectionError> {
        let mut pending = vec![(remote_root.to_string(), local_root.to_path_buf())];

        while let Some((remote_dir, local_dir)) = pending.pop() {
            let entries = match self.client.manifest_level(&remote_dir).await {
                Ok(entries) => entries,
                Err(e) => {
                    report.absorb(remote_dir, e)?;
                    continue;
                }
            };

            for entry in entries {
                let remote_path = join_remote(&remote_dir, &entry.name);
                if !is_plain_name(&entry.name) {
                    report.absorb(
                        remote_path,
                        ClientError::Usage(format!("unsafe entry name {:?}", entry.name)),
                    )?;
                    continue;
                }
                let local_path = local_dir.join(&entry.name);

                match entry.kind {
                    EntryKind::Dir => match fs::create_dir_all(&local_path).await {
                        Ok(()) => {
                            report.directories += 1;
                            info!("Directory created: {}", local_path.display());
                            pending.push((remote_path, local_path));
                        }
                        Err(e) => report.absorb(
                            remote_path,
                            ClientError::local("Error creating local directory", e),
                        )?,
                    },
                    EntryKind::File => {
                        let task = TransferTask {
                            local_path,
                            remote_path,
                            direction: Direction::Download,
                        };
                        self.download_file(task, writers, report).await?;
                    }
                }
            }
        }
        Ok(())
    }

    /// Pulls one body off the connection and forwards it to a fresh writer
    /// task. The body is always read to its sentinel, even if the writer fails.
    async fn download_file(
        &mut self,
        task: TransferTask,
        writers: &mut JoinSet<WriterResult>,
        report: &mut TransferReport,
    ) -> Result<(), ConnectionError> {
        debug_assert_eq!(task.direction, Direction::Download);
        info!(
            "Fetching file: {} -> {}",
            task.remote_path,
            task.local_path.display()
        );
        let first = match self.client.begin_get(&task.remote_path).await {
            Ok(first) => first,
            Err(e) => return report.absorb(task.remote_path, e),
        };

        let (tx, rx) = mpsc::channel(WRITER_QUEUE_DEPTH);
        writers.spawn(write_file(task.local_path, rx));

        let mut pending = Some(first);
        loop {
            let chunk = match pending.take() {
                Some(message) => Chunk::classify(message),
                None => recv_chunk(self.client.connection()).await?,
            };
            match chunk {
                Chunk::End => break,
                Chunk::Data(data) => {
                    // A closed channel means the writer failed; keep draining.
                    let _ = tx.send(data).await;
                }
            }
        }
        Ok(())
    }

    /// Walks the remote tree below `remote_root` and returns every entry with
    /// its path relative to the root, parents before children.
    pub async fn manifest(&mut self, remote_root: &str) -> Result<Vec<DirectoryEntry>, ClientError> {
        let mut manifest = Vec::new();
        let mut pending = vec![String::new()];

        while let Some(relative_dir) = pending.pop() {
            let remote_dir = if relative_dir.is_empty() {
                remote_root.to_string()
            } else {
                join_remote(remote_root, &relative_dir)
            };
            for entry in self.client.manifest_level(&remote_dir).await? {
                let relative = if relative_dir.is_empty() {
                    entry.name
                } else {
                    join_remote(&relative_dir, &entry.name)
                };
                if entry.kind == EntryKind::Dir {
                    pending.push(relative.clone());
                }
                manifest.push(DirectoryEntry::new(relative, entry.kind));
            }
        }
        Ok(manifest)
    }
}

async fn write_file(path: PathBuf, mut chunks: mpsc::Receiver<Vec<u8>>) -> WriterResult {
    let mut file = match File::create(&path).await {
        Ok(file) => file,
        Err(e) => return Err((path, e)),
    };
    let mut written = 0u64;
    while let Some(chunk) = chunks.recv().await {
        if let Err(e) = file.write_all(&chunk).await {
            return Err((path, e));
        }
        written += chunk.len() as u64;
    }
    if let Err(e) = file.flush().await {
        return Err((path, e));
    }
    Ok((path, written))
}

fn join_remote(base: &str, relative: &str) -> String {
    if base.is_empty() {
        relative.to_string()
    } else {
        format!("{}/{}", base.trim_end_matches('/'), relative)
    }
}

fn relative_to_remote(relative: &Path) -> String {
    relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect::<Vec<_>>()
        .join("/")
}

/// A manifest name must be exactly one normal path component.
fn is_plain_name(name: &str) -> bool {
    let mut components = Path::new(name).components();
    matches!(
        (components.next(), components.next()),
        (Some(Component::Normal(_)), None)
    )
}
