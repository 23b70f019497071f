use super::{CommandResult, Reply};
use crate::core_error::{CommandError, ConnectionError, FsFailure};
use crate::core_network::transport::Connection;
use crate::core_protocol::codec::receive_stream;
use crate::session::Session;
use log::{error, info, warn};
use std::io::ErrorKind;
use std::path::PathBuf;
use tokio::fs::{File, OpenOptions};
use tokio::io::{AsyncRead, AsyncWrite};

/// Handles the `put` command.
///
/// The body that follows the command is always drained up to the sentinel,
/// even when the target is refused, so exactly one status line answers the
/// whole exchange and the next message is a command again.
///
/// # Returns
///
/// The outer `Result` carries transport failures only; the inner one is the
/// command outcome reported to the client.
pub async fn handle_put_command<S>(
    conn: &mut Connection<S>,
    session: &Session,
    arg: &str,
) -> Result<CommandResult, ConnectionError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    info!("Received put command with argument: {}", arg);

    let (mut file, file_path) = match open_target(session, arg).await {
        Ok(target) => target,
        Err(e) => {
            let drained = receive_stream(conn, None, &mut tokio::io::sink()).await?;
            warn!("Discarded {} bytes of refused upload", drained.bytes);
            return Ok(Err(e));
        }
    };

    let summary = receive_stream(conn, None, &mut file).await?;
    if let Some(e) = summary.write_error {
        error!("Error writing to file {:?}: {}", file_path, e);
        return Ok(Err(CommandError::filesystem(FsFailure::CannotWrite)));
    }

    info!(
        "File stored successfully: {:?} ({} bytes)",
        file_path, summary.bytes
    );
    Ok(Ok(Reply::Status("File received.".to_string())))
}

async fn open_target(session: &Session, arg: &str) -> Result<(File, PathBuf), CommandError> {
    let file_path = session.resolve(arg)?;

    let mut options = OpenOptions::new();
    options.write(true).create(true).truncate(true);
    // The path was resolved without links; refuse one swapped in since.
    #[cfg(unix)]
    options.custom_flags(libc::O_NOFOLLOW);

    match options.open(&file_path).await {
        Ok(file) => Ok((file, file_path)),
        Err(e) => {
            error!("Failed to create file: {:?}, error: {}", file_path, e);
            let failure = match e.kind() {
                ErrorKind::PermissionDenied => FsFailure::PermissionDenied,
                _ => FsFailure::CannotCreate,
            };
            Err(CommandError::filesystem(failure))
        }
    }
}
