use super::{CommandResult, Reply};
use crate::core_error::{CommandError, FsFailure};
use crate::session::Session;
use log::{error, info};
use tokio::fs::{self, File};

/// Handles the `get` command.
///
/// Only checks preconditions and opens the file; the body itself is streamed
/// by the dispatcher so transport failures stay out of the command result.
pub async fn handle_get_command(session: &Session, arg: &str) -> CommandResult {
    let file_path = session.resolve(arg)?;

    let metadata = match fs::metadata(&file_path).await {
        Ok(metadata) => metadata,
        Err(_) => {
            return Err(CommandError::filesystem(FsFailure::NoSuchEntry))
        }
    };
    if metadata.is_dir() {
        return Err(CommandError::filesystem(FsFailure::DirectoryNeedsRecursion));
    }
    if !metadata.is_file() {
        return Err(CommandError::filesystem(FsFailure::InvalidFileType));
    }

    match File::open(&file_path).await {
        Ok(file) => {
            info!("Sending file: {:?} ({} bytes)", file_path, metadata.len());
            Ok(Reply::File(file, file_path))
        }
        Err(e) => {
            error!(
                "File not found or could not be opened: {:?}, error: {}",
                file_path, e
            );
            Err(CommandError::filesystem(FsFailure::CannotOpen))
        }
    }
}
