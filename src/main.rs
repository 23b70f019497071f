use anyhow::Result;
use clap::Parser;
use log::info;
use sandfs::config::Config;
use sandfs::core_cli::ServerCli;
use sandfs::core_log::init_logger;
use sandfs::server;

#[tokio::main]
async fn main() -> Result<()> {
    let args = ServerCli::parse();
    init_logger(args.verbose);

    let mut config = match args.config.as_deref() {
        Some(path) => Config::load_from_file(path)?,
        None => {
            info!("No configuration file given, using defaults");
            Config::default()
        }
    };

    // Command-line values win over the file
    if let Some(port) = args.port {
        config.server.listen_port = port;
    }
    if let Some(directory) = args.directory {
        config.server.base_dir = directory;
    }

    server::run(config).await
}
