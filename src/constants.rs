// src/constants.rs

/// Terminates a file body or a directory manifest. Sent in-band as its own message.
pub const SENTINEL: &[u8] = b"EOF";

pub const DEFAULT_LISTEN_ADDRESS: &str = "0.0.0.0";
pub const DEFAULT_LISTEN_PORT: u16 = 2121;
pub const DEFAULT_CHUNK_SIZE: usize = 4096;
pub const DEFAULT_MAX_MESSAGE_SIZE: usize = 16 * 1024 * 1024;
pub const DEFAULT_SHUTDOWN_GRACE_SECS: u64 = 5;

pub const SHUTDOWN_NOTICE: &str = "Server is shutting down.";
pub const ERROR_PREFIX: &str = "Error:";

pub const MANIFEST_DIR_TAG: &str = "DIR";
pub const MANIFEST_FILE_TAG: &str = "FILE";
pub const RECURSIVE_FLAG: &str = "-R";
