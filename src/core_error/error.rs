// Error types for the session engine, the transport and the client
use crate::constants::ERROR_PREFIX;
use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Transport-level failure. Fatal to the current session or command.
#[derive(Error, Debug)]
pub enum ConnectionError {
    #[error("connection I/O failure: {0}")]
    Io(#[from] io::Error),

    #[error("peer closed the connection")]
    PeerClosed,

    #[error("message of {size} bytes exceeds the {limit} byte limit")]
    MessageTooLarge { size: usize, limit: usize },

    #[error("server is shutting down")]
    ServerShutdown,
}

/// Failure local to one command. Converted into a status line, the session continues.
#[derive(Error, Debug)]
pub enum CommandError {
    #[error("path escapes the base directory: {0}")]
    SandboxViolation(PathBuf),

    #[error("{}", .0.message())]
    Filesystem(FsFailure),

    #[error("unknown command: {0}")]
    Protocol(String),

    #[error("missing path argument")]
    MissingArgument,

    #[error("recursive transfer is driven by the client")]
    Unsupported,
}

/// Why a filesystem operation was refused. The set is closed so that a client
/// can tell a refusal from data that merely starts with `Error:`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FsFailure {
    InvalidDirectory,
    NotADirectory,
    PathNotFound,
    CannotReadDirectory,
    AlreadyExists,
    NoSuchEntry,
    DirectoryNeedsRecursion,
    InvalidFileType,
    CannotOpen,
    CannotCreate,
    PermissionDenied,
    CannotWrite,
    TooManyLinks,
    CannotResolve,
}

impl FsFailure {
    pub const ALL: [FsFailure; 14] = [
        FsFailure::InvalidDirectory,
        FsFailure::NotADirectory,
        FsFailure::PathNotFound,
        FsFailure::CannotReadDirectory,
        FsFailure::AlreadyExists,
        FsFailure::NoSuchEntry,
        FsFailure::DirectoryNeedsRecursion,
        FsFailure::InvalidFileType,
        FsFailure::CannotOpen,
        FsFailure::CannotCreate,
        FsFailure::PermissionDenied,
        FsFailure::CannotWrite,
        FsFailure::TooManyLinks,
        FsFailure::CannotResolve,
    ];

    pub fn message(self) -> &'static str {
        match self {
            FsFailure::InvalidDirectory => "Invalid directory.",
            FsFailure::NotADirectory => "Specified path is not a directory.",
            FsFailure::PathNotFound => "Path does not exist.",
            FsFailure::CannotReadDirectory => "Cannot read directory.",
            FsFailure::AlreadyExists => "Directory already exists or cannot be created.",
            FsFailure::NoSuchEntry => "File or directory does not exist.",
            FsFailure::DirectoryNeedsRecursion => "Cannot fetch directory without -R flag.",
            FsFailure::InvalidFileType => "Invalid file type.",
            FsFailure::CannotOpen => "File not found.",
            FsFailure::CannotCreate => "Cannot create file.",
            FsFailure::PermissionDenied => "Permission denied.",
            FsFailure::CannotWrite => "Cannot write file.",
            FsFailure::TooManyLinks => "Too many levels of symbolic links.",
            FsFailure::CannotResolve => "Cannot resolve path.",
        }
    }
}

const ACCESS_DENIED: &str = "Access denied.";
const UNKNOWN_COMMAND: &str = "Unknown command.";
const MISSING_ARGUMENT: &str = "Missing path argument.";
const CLIENT_DRIVEN_RECURSION: &str = "Recursive transfer is driven by the client.";

impl CommandError {
    pub fn filesystem(failure: FsFailure) -> Self {
        CommandError::Filesystem(failure)
    }

    fn reason(&self) -> &'static str {
        match self {
            CommandError::SandboxViolation(_) => ACCESS_DENIED,
            CommandError::Filesystem(failure) => failure.message(),
            CommandError::Protocol(_) => UNKNOWN_COMMAND,
            CommandError::MissingArgument => MISSING_ARGUMENT,
            CommandError::Unsupported => CLIENT_DRIVEN_RECURSION,
        }
    }

    pub fn to_response(&self) -> String {
        format!("{} {}", ERROR_PREFIX, self.reason())
    }

    /// Whether `line` is exactly one of the status lines [`to_response`]
    /// can produce.
    ///
    /// [`to_response`]: CommandError::to_response
    pub fn is_response(line: &str) -> bool {
        let reason = match line
            .strip_prefix(ERROR_PREFIX)
            .and_then(|rest| rest.strip_prefix(' '))
        {
            Some(reason) => reason,
            None => return false,
        };
        [
            ACCESS_DENIED,
            UNKNOWN_COMMAND,
            MISSING_ARGUMENT,
            CLIENT_DRIVEN_RECURSION,
        ]
        .contains(&reason)
            || FsFailure::ALL.iter().any(|f| f.message() == reason)
    }
}

/// Everything a client-side command can fail with.
#[derive(Error, Debug)]
pub enum ClientError {
    #[error(transparent)]
    Connection(#[from] ConnectionError),

    /// Error status line sent back by the server, `Error:` prefix included.
    #[error("{0}")]
    Remote(String),

    #[error("{context}: {source}")]
    Local {
        context: String,
        #[source]
        source: io::Error,
    },

    #[error("{0}")]
    Usage(String),
}

impl ClientError {
    pub fn local(context: impl Into<String>, source: io::Error) -> Self {
        ClientError::Local {
            context: context.into(),
            source,
        }
    }

    /// Only connection failures abort a recursive walk.
    pub fn is_fatal(&self) -> bool {
        matches!(self, ClientError::Connection(_))
    }
}
