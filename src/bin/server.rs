use clap::Parser;
use std::sync::Arc;

use address_graph::api::ApiServer;
use address_graph::config::AppConfig;
use address_graph::database::Database;
use address_graph::logging::init_logging;

#[derive(Parser)]
#[command(name = "address-graph-server")]
#[command(about = "HTTP API over saved address graph sessions")]
#[command(version)]
struct Args {
    /// Database path (overrides the configured one)
    #[arg(long)]
    database: Option<String>,

    /// Server port (overrides the configured one)
    #[arg(long)]
    port: Option<u16>,

    /// Bind address (overrides the configured one)
    #[arg(long)]
    host: Option<String>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    print_server_banner();

    let args = Args::parse();
    let config = AppConfig::load()?;
    init_logging(&config.logging)?;

    let db_path = args.database.unwrap_or(config.database.path);
    let host = args.host.unwrap_or(config.api.host);
    let port = args.port.unwrap_or(config.api.port);

    let database = Database::new(&db_path)
        .map_err(|e| format!("Failed to open session database {}: {}", db_path, e))?;
    let server = ApiServer::new(Arc::new(database), &host, port);

    log::info!("Serving sessions from {} on {}:{}", db_path, host, port);

    if let Err(e) = server.start().await {
        log::error!("Server failed: {}", e);
        return Err(e.into());
    }

    Ok(())
}

fn print_server_banner() {
    println!("+--------------------------------------------------------------+");
    println!("|                 Address Graph Explorer API                   |");
    println!("|                                                              |");
    println!("|             Saved sessions, graphs and label flows           |");
    println!("+--------------------------------------------------------------+");
    println!();
}
