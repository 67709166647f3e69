use clap::{Parser, Subcommand};
use std::fs;
use std::sync::Arc;
use thiserror::Error;

use crate::config::{AppConfig, ExpansionConfig, SourceConfig};
use crate::database::Database;
use crate::error::{ConfigError, DatabaseError, ExplorerError, SystemError};
use crate::models::{short_address, FlowCalculator, LabelBook};
use crate::policy::ExpansionPolicy;
use crate::source::{MemorySource, RpcSource, TransactionSource};
use crate::store::GraphStore;
use crate::traversal::{StopHandle, TraversalDriver, TraversalReport};

#[derive(Error, Debug)]
pub enum CliError {
    #[error("{0}")]
    Explorer(#[from] ExplorerError),
    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),
    #[error("CLI operation failed: {0}")]
    Operation(String),
}

impl From<ConfigError> for CliError {
    fn from(error: ConfigError) -> Self {
        CliError::Explorer(error.into())
    }
}

impl From<std::io::Error> for CliError {
    fn from(error: std::io::Error) -> Self {
        CliError::Explorer(SystemError::FileSystem(error).into())
    }
}

#[derive(Parser, Debug)]
#[command(name = "explorer")]
#[command(about = "Grow a transaction graph outward from wallet addresses of interest")]
#[command(version)]
pub struct Cli {
    /// Session database path (overrides the configured one)
    #[arg(long, global = true)]
    pub database: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Expand a graph from seed addresses
    Explore {
        /// Seed addresses
        #[arg(required = true)]
        seeds: Vec<String>,
        #[arg(long)]
        max_depth: Option<u32>,
        #[arg(long)]
        max_nodes: Option<usize>,
        #[arg(long)]
        min_edge_value: Option<f64>,
        /// Address tag as ADDRESS=LABEL, repeatable
        #[arg(long = "tag")]
        tags: Vec<String>,
        /// Address that may appear but is never expanded, repeatable
        #[arg(long)]
        nogrow: Vec<String>,
        /// Write the traversal report as JSON to this file
        #[arg(long, short)]
        output: Option<String>,
        /// Store the result as a session
        #[arg(long)]
        save: bool,
        /// Session name, implies --save
        #[arg(long)]
        name: Option<String>,
    },
    /// Continue a saved session from its pending frontier
    Resume {
        id: i64,
        /// Raise the node ceiling for this run
        #[arg(long)]
        max_nodes: Option<usize>,
        #[arg(long, short)]
        output: Option<String>,
    },
    /// List saved sessions
    Sessions,
    /// Write a session's graph as JSON
    Export {
        id: i64,
        /// Output file; stdout when omitted
        #[arg(long, short)]
        output: Option<String>,
    },
    /// Show value flows between label groups of a session
    Flows { id: i64 },
    /// Print a sample configuration file
    SampleConfig {
        #[arg(long, short)]
        output: Option<String>,
    },
}

/// Build the configured transaction source: the local index when
/// `index_path` is set, otherwise the JSON-RPC endpoint.
pub fn build_source(config: &SourceConfig) -> Result<Arc<dyn TransactionSource>, ExplorerError> {
    match &config.index_path {
        Some(path) => {
            let source = MemorySource::from_json_file(path)?;
            log::info!("Using local index {} with {} addresses", path, source.address_count());
            Ok(Arc::new(source))
        }
        None => Ok(Arc::new(RpcSource::new(config)?)),
    }
}

/// Parse `ADDRESS=LABEL`
fn parse_tag(tag: &str) -> Result<(String, String), ConfigError> {
    match tag.split_once('=') {
        Some((address, label)) if !address.trim().is_empty() && !label.trim().is_empty() => {
            Ok((address.trim().to_string(), label.trim().to_string()))
        }
        _ => Err(ConfigError::InvalidValue {
            key: "tag".to_string(),
            value: tag.to_string(),
        }),
    }
}

pub struct CliHandler {
    config: AppConfig,
    source: Option<Arc<dyn TransactionSource>>,
    stop: StopHandle,
}

impl CliHandler {
    pub fn new(config: AppConfig) -> Self {
        Self {
            config,
            source: None,
            stop: StopHandle::new(),
        }
    }

    /// Use `source` instead of building one from configuration
    pub fn with_source(mut self, source: Arc<dyn TransactionSource>) -> Self {
        self.source = Some(source);
        self
    }

    pub fn stop_handle(&self) -> StopHandle {
        self.stop.clone()
    }

    fn database(&self) -> Result<Database, CliError> {
        Ok(Database::new(&self.config.database.path)?)
    }

    fn source(&self) -> Result<Arc<dyn TransactionSource>, CliError> {
        match &self.source {
            Some(source) => Ok(source.clone()),
            None => Ok(build_source(&self.config.source)?),
        }
    }

    pub async fn execute_command(&self, command: &Commands) -> Result<(), CliError> {
        match command {
            Commands::Explore {
                seeds,
                max_depth,
                max_nodes,
                min_edge_value,
                tags,
                nogrow,
                output,
                save,
                name,
            } => {
                let mut expansion = self.config.expansion.clone();
                if let Some(max_depth) = max_depth {
                    expansion.max_depth = *max_depth;
                }
                if let Some(max_nodes) = max_nodes {
                    expansion.max_nodes = *max_nodes;
                }
                if let Some(min_edge_value) = min_edge_value {
                    expansion.min_edge_value = *min_edge_value;
                }
                for tag in tags {
                    let (address, label) = parse_tag(tag)?;
                    expansion.labels.insert(address, label);
                }
                expansion.nogrow.extend(nogrow.iter().cloned());

                let checked = AppConfig {
                    expansion: expansion.clone(),
                    ..self.config.clone()
                };
                checked.validate()?;

                let report = self.explore(seeds, &expansion, GraphStore::new()).await?;
                print_report(&report);

                if let Some(path) = output {
                    write_json(path, &report)?;
                }
                if *save || name.is_some() {
                    let id = self
                        .database()?
                        .save_session(name.as_deref(), seeds, &expansion, &report)?;
                    println!("Saved session {}", id);
                }
                Ok(())
            }
            Commands::Resume { id, max_nodes, output } => {
                let database = self.database()?;
                let session = database.get_session(*id)?;
                let pending = session.report.pending.clone();
                if pending.is_empty() {
                    println!("Session {} has no pending addresses", id);
                    return Ok(());
                }

                let mut expansion = session.expansion.clone();
                if let Some(max_nodes) = max_nodes {
                    expansion.max_nodes = *max_nodes;
                }

                let previous = session.report;
                let store = GraphStore::from_graph(previous.graph);
                let mut report = self.explore(&pending, &expansion, store).await?;

                let mut skipped = previous.skipped;
                skipped.append(&mut report.skipped);
                report.skipped = skipped;
                report.stats.addresses_expanded += previous.stats.addresses_expanded;
                report.stats.addresses_skipped += previous.stats.addresses_skipped;
                report.stats.edges_accepted += previous.stats.edges_accepted;
                report.stats.edges_rejected += previous.stats.edges_rejected;
                report.stats.edges_capped += previous.stats.edges_capped;
                report.stats.max_depth_reached =
                    report.stats.max_depth_reached.max(previous.stats.max_depth_reached);

                print_report(&report);
                if let Some(path) = output {
                    write_json(path, &report)?;
                }
                database.update_session(*id, &report)?;
                println!("Updated session {}", id);
                Ok(())
            }
            Commands::Sessions => {
                let sessions = self.database()?.list_sessions()?;
                if sessions.is_empty() {
                    println!("No saved sessions");
                    return Ok(());
                }

                println!(
                    "{:>5}  {:<20} {:>7} {:>7} {:>8} {:>8}  {}",
                    "ID", "NAME", "NODES", "EDGES", "SKIPPED", "PENDING", "CREATED"
                );
                for session in sessions {
                    let created = chrono::DateTime::from_timestamp(session.created_at, 0)
                        .map(|dt| dt.format("%Y-%m-%d %H:%M:%S").to_string())
                        .unwrap_or_default();
                    println!(
                        "{:>5}  {:<20} {:>7} {:>7} {:>8} {:>8}  {}",
                        session.id,
                        session.name.unwrap_or_else(|| "-".to_string()),
                        session.node_count,
                        session.edge_count,
                        session.skipped_count,
                        session.pending_count,
                        created
                    );
                }
                Ok(())
            }
            Commands::Export { id, output } => {
                let session = self.database()?.get_session(*id)?;
                match output {
                    Some(path) => {
                        write_json(path, &session.report.graph)?;
                        println!("Wrote graph of session {} to {}", id, path);
                    }
                    None => println!("{}", to_json(&session.report.graph)?),
                }
                Ok(())
            }
            Commands::Flows { id } => {
                let session = self.database()?.get_session(*id)?;
                let flows = FlowCalculator::label_flows(&session.report.graph);
                if flows.is_empty() {
                    println!("Session {} has no edges", id);
                    return Ok(());
                }

                println!(
                    "{:<16} {:<16} {:>16} {:>16} {:>6}",
                    "FROM", "TO", "VOLUME", "NET", "TXS"
                );
                for flow in flows {
                    println!(
                        "{:<16} {:<16} {:>16.4} {:>16.4} {:>6}",
                        flow.from_label, flow.to_label, flow.volume, flow.net_volume, flow.transaction_count
                    );
                }
                Ok(())
            }
            Commands::SampleConfig { output } => {
                let sample = AppConfig::generate_sample_config()?;
                match output {
                    Some(path) => {
                        fs::write(path, sample)?;
                        println!("Wrote sample configuration to {}", path);
                    }
                    None => println!("{}", sample),
                }
                Ok(())
            }
        }
    }

    async fn explore(
        &self,
        seeds: &[String],
        expansion: &ExpansionConfig,
        store: GraphStore,
    ) -> Result<TraversalReport, CliError> {
        let labels = LabelBook::from_tags(&expansion.labels, expansion.builtin_labels);
        let report = TraversalDriver::new(
            self.source()?,
            ExpansionPolicy::new(expansion),
            store,
            &self.config.traversal,
        )
        .with_labels(labels)
        .with_stop_flag(self.stop.clone())
        .run(seeds)
        .await?;
        Ok(report)
    }
}

fn to_json<T: serde::Serialize>(value: &T) -> Result<String, CliError> {
    serde_json::to_string_pretty(value).map_err(|e| CliError::Operation(format!("Serialization failed: {}", e)))
}

fn write_json<T: serde::Serialize>(path: &str, value: &T) -> Result<(), CliError> {
    fs::write(path, to_json(value)?)?;
    Ok(())
}

fn print_report(report: &TraversalReport) {
    println!(
        "Graph: {} nodes, {} edges ({} addresses expanded in {}ms)",
        report.graph.node_count(),
        report.graph.edge_count(),
        report.stats.addresses_expanded,
        report.stats.duration_ms
    );

    if report.stopped {
        println!("Stopped early; {} addresses left pending", report.pending.len());
    } else if !report.pending.is_empty() {
        println!("Node ceiling reached; {} addresses left pending", report.pending.len());
    }

    if !report.skipped.is_empty() {
        println!("Skipped {} addresses:", report.skipped.len());
        for skipped in &report.skipped {
            println!(
                "  {} {:?}: {}",
                short_address(&skipped.address),
                skipped.reason,
                skipped.detail
            );
        }
    }
}
