use crate::config::{Config, ServerContext};
use crate::core_network::Server;
use anyhow::Result;
use log::{error, info};

/// Runs the server with the provided configuration until ctrl-c.
///
/// The base directory is resolved and checked before the listener is bound,
/// so a bad configuration never accepts a connection.
pub async fn run(config: Config) -> Result<()> {
    let context = ServerContext::from_config(&config.server)?;
    info!("Starting server on {}", config.listen_addr());
    context.log();

    let server = match Server::bind(&config.listen_addr(), context).await {
        Ok(server) => server,
        Err(e) => {
            error!("Failed to start server: {:#}", e);
            return Err(e);
        }
    };
    server.run_until_ctrl_c().await
}
