use super::{CommandResult, Reply};
use crate::core_error::{CommandError, FsFailure};
use crate::core_protocol::{DirectoryEntry, EntryKind};
use crate::session::Session;
use log::{error, info, warn};
use std::path::{Path, PathBuf};
use tokio::fs;

/// Handles `ls [path]`: one line per entry, directories suffixed with `/`.
pub async fn handle_ls_command(session: &Session, arg: Option<&str>) -> CommandResult {
    let dir = resolve_listable(session, arg).await?;
    let entries = read_entries(&dir).await?;

    let listing: String = entries
        .iter()
        .map(|entry| format!("{}\n", entry.listing_line()))
        .collect();
    info!("Listed {} entries in {:?}", entries.len(), dir);
    Ok(Reply::Status(listing))
}

/// Handles `ls -R <path>`: the manifest of the direct children of `path`,
/// which the client walks one level at a time.
pub async fn handle_manifest_command(session: &Session, arg: &str) -> CommandResult {
    let dir = resolve_listable(session, Some(arg)).await?;
    let entries = read_entries(&dir).await?;
    info!("Manifest of {:?}: {} entries", dir, entries.len());
    Ok(Reply::Manifest(entries))
}

async fn resolve_listable(session: &Session, arg: Option<&str>) -> Result<PathBuf, CommandError> {
    let dir = match arg {
        Some(arg) => session.resolve(arg)?,
        None => session.current_dir().to_path_buf(),
    };

    match fs::metadata(&dir).await {
        Ok(metadata) if metadata.is_dir() => Ok(dir),
        Ok(_) => Err(CommandError::filesystem(FsFailure::NotADirectory)),
        Err(_) => Err(CommandError::filesystem(FsFailure::PathNotFound)),
    }
}

/// Entries in directory iteration order. Symlinks are classified by their target.
pub async fn read_entries(dir: &Path) -> Result<Vec<DirectoryEntry>, CommandError> {
    let mut reader = fs::read_dir(dir).await.map_err(|e| {
        error!("Error reading directory {:?}: {}", dir, e);
        CommandError::filesystem(FsFailure::CannotReadDirectory)
    })?;

    let mut entries = Vec::new();
    loop {
        let entry = match reader.next_entry().await {
            Ok(Some(entry)) => entry,
            Ok(None) => break,
            Err(e) => {
                warn!("Failed to read directory entry in {:?}: {}", dir, e);
                break;
            }
        };

        let is_dir = match fs::metadata(entry.path()).await {
            Ok(metadata) => metadata.is_dir(),
            Err(_) => entry
                .file_type()
                .await
                .map(|file_type| file_type.is_dir())
                .unwrap_or(false),
        };
        let kind = if is_dir { EntryKind::Dir } else { EntryKind::File };
        entries.push(DirectoryEntry::new(
            entry.file_name().to_string_lossy().into_owned(),
            kind,
        ));
    }
    Ok(entries)
}
