use anyhow::Result;
use clap::Parser;
use log::{error, warn};
use sandfs::core_cli::ClientCli;
use sandfs::core_client::{Client, ClientCommand};
use sandfs::core_error::ClientError;
use sandfs::core_log::init_logger;
use std::io::Write;
use tokio::io::{AsyncBufReadExt, BufReader};

#[tokio::main]
async fn main() -> Result<()> {
    let args = ClientCli::parse();
    init_logger(args.verbose);

    let mut client = Client::connect(&args.host, args.port, args.chunk_size).await?;
    println!("Type 'help' for the list of commands.");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        print!("sandfs> ");
        std::io::stdout().flush()?;

        let Some(line) = lines.next_line().await? else {
            // End of input behaves like `exit`.
            if let Err(e) = client.exit().await {
                warn!("Failed to close the connection: {}", e);
            }
            break;
        };
        if line.trim().is_empty() {
            continue;
        }

        let command = match ClientCommand::parse(&line) {
            Ok(command) => command,
            Err(e) => {
                println!("{}", e);
                continue;
            }
        };
        let exiting = command == ClientCommand::Exit;

        match client.execute(command).await {
            Ok(output) => println!("{}", output),
            Err(e @ ClientError::Connection(_)) => {
                error!("{}", e);
                break;
            }
            Err(e) => println!("{}", e),
        }
        if exiting {
            break;
        }
    }
    Ok(())
}
