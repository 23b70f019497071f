use crate::constants::{DEFAULT_CHUNK_SIZE, DEFAULT_LISTEN_PORT};
use clap::Parser;

/// Command-line arguments of the server
#[derive(Parser, Debug)]
#[command(name = "sandfsd", about = "Sandboxed remote file server.")]
pub struct ServerCli {
    /// Path to the configuration file
    #[arg(short, long)]
    pub config: Option<String>,

    /// Port to listen on, overrides the configuration file
    #[arg(short, long)]
    pub port: Option<u16>,

    /// Base directory to serve, overrides the configuration file
    #[arg(short, long)]
    pub directory: Option<String>,

    /// Enable verbose mode
    #[arg(short, long)]
    pub verbose: bool,
}

/// Command-line arguments of the interactive client
#[derive(Parser, Debug)]
#[command(name = "sandfs", about = "Interactive client for sandfsd.")]
pub struct ClientCli {
    /// Server host name or address
    #[arg(long, default_value = "127.0.0.1")]
    pub host: String,

    /// Server port
    #[arg(short, long, default_value_t = DEFAULT_LISTEN_PORT)]
    pub port: u16,

    /// Bytes per file chunk when uploading
    #[arg(long, default_value_t = DEFAULT_CHUNK_SIZE)]
    pub chunk_size: usize,

    /// Enable verbose mode
    #[arg(short, long)]
    pub verbose: bool,
}
