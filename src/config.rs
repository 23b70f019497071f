use crate::constants::{
    DEFAULT_CHUNK_SIZE, DEFAULT_LISTEN_ADDRESS, DEFAULT_LISTEN_PORT, DEFAULT_MAX_MESSAGE_SIZE,
    DEFAULT_SHUTDOWN_GRACE_SECS,
};
use anyhow::{bail, Context, Result};
use log::info;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_listen_address")]
    pub listen_address: String,
    #[serde(default = "default_listen_port")]
    pub listen_port: u16,
    pub base_dir: String,
    pub chunk_size: Option<usize>, // Optional to allow default value
    pub max_message_size: Option<usize>,
    pub shutdown_grace_secs: Option<u64>,
}

#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct Config {
    pub server: ServerConfig,
}

fn default_listen_address() -> String {
    DEFAULT_LISTEN_ADDRESS.to_string()
}

fn default_listen_port() -> u16 {
    DEFAULT_LISTEN_PORT
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_address: default_listen_address(),
            listen_port: DEFAULT_LISTEN_PORT,
            base_dir: String::from("."),
            chunk_size: Some(DEFAULT_CHUNK_SIZE),
            max_message_size: Some(DEFAULT_MAX_MESSAGE_SIZE),
            shutdown_grace_secs: Some(DEFAULT_SHUTDOWN_GRACE_SECS),
        }
    }
}

impl Config {
    pub fn load_from_file(path: &str) -> Result<Self> {
        let config_str = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read configuration file: {}", path))?;
        Self::from_toml(&config_str)
            .with_context(|| format!("Failed to parse configuration file: {}", path))
    }

    pub fn from_toml(text: &str) -> Result<Self> {
        let mut config: Config = toml::from_str(text)?;

        // Set defaults if not specified
        if config.server.chunk_size.is_none() {
            config.server.chunk_size = Some(DEFAULT_CHUNK_SIZE);
        }
        if config.server.max_message_size.is_none() {
            config.server.max_message_size = Some(DEFAULT_MAX_MESSAGE_SIZE);
        }
        if config.server.shutdown_grace_secs.is_none() {
            config.server.shutdown_grace_secs = Some(DEFAULT_SHUTDOWN_GRACE_SECS);
        }

        Ok(config)
    }

    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.server.listen_address, self.server.listen_port)
    }
}

/// Immutable per-server values every session reads. Built once at startup.
#[derive(Debug, Clone)]
pub struct ServerContext {
    /// Canonical absolute form of the configured base directory.
    pub base_dir: PathBuf,
    pub chunk_size: usize,
    pub max_message_size: usize,
    pub shutdown_grace: Duration,
}

impl ServerContext {
    pub fn from_config(config: &ServerConfig) -> Result<Self> {
        let base_dir = PathBuf::from(&config.base_dir)
            .canonicalize()
            .with_context(|| format!("Failed to resolve base directory: {}", config.base_dir))?;
        if !base_dir.is_dir() {
            bail!("Base directory is not a directory: {}", base_dir.display());
        }

        let chunk_size = config.chunk_size.unwrap_or(DEFAULT_CHUNK_SIZE);
        let max_message_size = config.max_message_size.unwrap_or(DEFAULT_MAX_MESSAGE_SIZE);
        if chunk_size == 0 || chunk_size > max_message_size {
            bail!(
                "chunk_size must be between 1 and max_message_size ({}), got {}",
                max_message_size,
                chunk_size
            );
        }

        Ok(Self {
            base_dir,
            chunk_size,
            max_message_size,
            shutdown_grace: Duration::from_secs(
                config
                    .shutdown_grace_secs
                    .unwrap_or(DEFAULT_SHUTDOWN_GRACE_SECS),
            ),
        })
    }

    pub fn log(&self) {
        info!("  Base Directory: {}", self.base_dir.display());
        info!("  Chunk Size: {} bytes", self.chunk_size);
        info!("  Max Message Size: {} KB", self.max_message_size / 1024);
        info!("  Shutdown Grace: {}s", self.shutdown_grace.as_secs());
    }
}
