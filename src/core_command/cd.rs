use super::{CommandResult, Reply};
use crate::core_error::{CommandError, FsFailure};
use crate::session::Session;
use log::{info, warn};
use tokio::fs;

/// Handles the `cd` command.
///
/// The target must resolve inside the sandbox and be an existing directory.
/// On any failure the current directory is left untouched.
pub async fn handle_cd_command(session: &mut Session, arg: &str) -> CommandResult {
    info!("Received cd command with argument: {}", arg);
    let target = session.resolve(arg)?;

    match fs::metadata(&target).await {
        Ok(metadata) if metadata.is_dir() => {
            session.change_dir(target);
            info!(
                "Directory successfully changed to: {}",
                session.current_dir().display()
            );
            Ok(Reply::Status(format!(
                "Directory changed to: {}",
                session.current_dir().display()
            )))
        }
        _ => {
            warn!("Failed to change directory to: {:?}", target);
            Err(CommandError::filesystem(FsFailure::InvalidDirectory))
        }
    }
}
