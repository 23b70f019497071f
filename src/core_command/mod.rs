// Here's the list of the commands implemented by the server
pub mod cd;
pub mod get;
pub mod handlers;
pub mod ls;
pub mod mkdir;
pub mod put;
pub mod pwd;

use crate::core_error::CommandError;
use crate::core_protocol::DirectoryEntry;
use std::path::PathBuf;
use tokio::fs::File;

/// What a successful command sends back.
#[derive(Debug)]
pub enum Reply {
    /// One status or listing message.
    Status(String),
    /// One `DIR`/`FILE` message per entry, then the sentinel.
    Manifest(Vec<DirectoryEntry>),
    /// A file body streamed in chunks, then the sentinel.
    File(File, PathBuf),
}

pub type CommandResult = Result<Reply, CommandError>;
