// src/core_command/pwd.rs
use super::{CommandResult, Reply};
use crate::session::Session;

pub fn handle_pwd_command(session: &Session) -> CommandResult {
    Ok(Reply::Status(session.current_dir().display().to_string()))
}
