use clap::Parser;
use log::{error, info};
use tokio::signal;

use address_graph::api::{Cli, CliHandler};
use address_graph::config::AppConfig;
use address_graph::logging::init_logging;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let mut config = AppConfig::load()?;
    if let Some(database) = &cli.database {
        config.database.path = database.clone();
    }

    init_logging(&config.logging)?;
    print_banner();

    let handler = CliHandler::new(config);

    // Ctrl-C stops the traversal; the partial graph is still reported
    let stop = handler.stop_handle();
    tokio::spawn(async move {
        match signal::ctrl_c().await {
            Ok(()) => {
                info!("Received interrupt, finishing current batch");
                stop.stop();
            }
            Err(err) => error!("Unable to listen for shutdown signal: {}", err),
        }
    });

    if let Err(e) = handler.execute_command(&cli.command).await {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }

    Ok(())
}

fn print_banner() {
    println!("+--------------------------------------------------------------+");
    println!("|                    Address Graph Explorer                    |");
    println!("|                                                              |");
    println!("|        Grow transaction graphs from wallets of interest      |");
    println!("+--------------------------------------------------------------+");
    println!();
}
