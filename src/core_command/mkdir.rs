use super::{CommandResult, Reply};
use crate::core_error::{CommandError, FsFailure};
use crate::session::Session;
use log::{error, info, warn};
use tokio::fs;

/// Handles the `mkdir` command.
///
/// Creates exactly one directory; the parent must exist. An existing entry at
/// the target is an error and is left as it is.
///
/// # Arguments
///
/// * `session` - The connection's session, used to resolve `arg`.
/// * `arg` - The directory to create, relative to the current directory or absolute.
pub async fn handle_mkdir_command(session: &Session, arg: &str) -> CommandResult {
    info!("Received mkdir command with argument: {}", arg);
    let dir_path = session.resolve(arg)?;

    if fs::symlink_metadata(&dir_path).await.is_ok() {
        warn!("Directory already exists: {:?}", dir_path);
        return Err(CommandError::filesystem(FsFailure::AlreadyExists));
    }

    match fs::create_dir(&dir_path).await {
        Ok(()) => {
            info!("Directory created successfully: {:?}", dir_path);
            Ok(Reply::Status("Directory created.".to_string()))
        }
        Err(e) => {
            error!("Failed to create directory: {:?}, error: {}", dir_path, e);
            Err(CommandError::filesystem(FsFailure::AlreadyExists))
        }
    }
}
