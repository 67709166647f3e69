use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::env;
use std::fs;
use std::path::Path;
use std::str::FromStr;

use crate::error::ConfigError;
use crate::policy::RankBy;

/// Main application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub source: SourceConfig,
    pub expansion: ExpansionConfig,
    pub traversal: TraversalConfig,
    pub database: DatabaseConfig,
    pub api: ApiConfig,
    pub logging: LoggingConfig,
}

/// Transaction data source configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceConfig {
    /// JSON-RPC endpoint serving `alchemy_getAssetTransfers`
    pub endpoint: String,
    /// Appended to the endpoint path when set
    pub api_key: Option<String>,
    /// Request timeout in seconds
    pub timeout_seconds: u64,
    /// Transfers requested per direction per address
    pub max_transfers: u32,
    /// Look up contract code for newly discovered addresses
    pub detect_contracts: bool,
    /// Local JSON transaction index; replaces the RPC endpoint when set
    pub index_path: Option<String>,
}

/// Stopping and filtering rules for graph growth
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExpansionConfig {
    pub max_depth: u32,
    pub max_nodes: usize,
    pub min_edge_value: f64,
    pub max_neighbors_per_node: Option<usize>,
    pub rank_by: RankBy,
    /// Labelled addresses become leaves (seeds excepted)
    pub stop_at_label: bool,
    /// Contract addresses become leaves
    pub skip_contracts: bool,
    /// Ignore transfers of tokens without a symbol
    pub drop_unnamed_assets: bool,
    /// Recognize well-known exchange wallets
    pub builtin_labels: bool,
    /// Addresses that may appear but are never expanded
    pub nogrow: Vec<String>,
    /// User-supplied tags, address -> label
    pub labels: HashMap<String, String>,
}

/// Traversal driver configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TraversalConfig {
    /// Concurrent fetches per batch
    pub concurrency: usize,
    /// Fetch attempts per address for transient failures
    pub max_retries: u32,
    pub retry_delay_seconds: u64,
    pub max_retry_delay_seconds: u64,
}

/// Session database configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// SQLite database file path
    pub path: String,
}

/// API server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    pub port: u16,
    pub host: String,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (error, warn, info, debug, trace)
    pub level: String,
    /// Log format (json, pretty)
    pub format: String,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            endpoint: "https://eth-mainnet.g.alchemy.com/v2".to_string(),
            api_key: None,
            timeout_seconds: 30,
            max_transfers: 500,
            detect_contracts: true,
            index_path: None,
        }
    }
}

impl Default for ExpansionConfig {
    fn default() -> Self {
        Self {
            max_depth: 2,
            max_nodes: 500,
            min_edge_value: 0.0,
            max_neighbors_per_node: Some(100),
            rank_by: RankBy::Value,
            stop_at_label: true,
            skip_contracts: true,
            drop_unnamed_assets: true,
            builtin_labels: true,
            nogrow: Vec::new(),
            labels: HashMap::new(),
        }
    }
}

impl Default for TraversalConfig {
    fn default() -> Self {
        Self {
            concurrency: 4,
            max_retries: 3,
            retry_delay_seconds: 1,
            max_retry_delay_seconds: 30,
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: "./sessions.db".to_string(),
        }
    }
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            port: 8080,
            host: "127.0.0.1".to_string(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
        }
    }
}

impl SourceConfig {
    /// Endpoint with the API key appended as a path segment
    pub fn request_url(&self) -> String {
        match &self.api_key {
            Some(key) if !key.is_empty() => {
                format!("{}/{}", self.endpoint.trim_end_matches('/'), key)
            }
            _ => self.endpoint.clone(),
        }
    }
}

fn parse_env<T: FromStr>(key: &str) -> Result<Option<T>, ConfigError> {
    match env::var(key) {
        Ok(value) => value
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::InvalidValue {
                key: key.to_string(),
                value,
            }),
        Err(_) => Ok(None),
    }
}

fn invalid(key: &str, value: impl ToString) -> ConfigError {
    ConfigError::InvalidValue {
        key: key.to_string(),
        value: value.to_string(),
    }
}

impl AppConfig {
    /// Load configuration from file and environment variables.
    /// Environment variables take precedence over file values.
    pub fn load() -> Result<Self, ConfigError> {
        let mut config = Self::load_from_file()?;
        config.apply_env_overrides()?;
        config.validate()?;
        Ok(config)
    }

    /// Load from `CONFIG_FILE` (default `config.toml`); defaults if absent
    pub fn load_from_file() -> Result<Self, ConfigError> {
        let config_path = env::var("CONFIG_FILE").unwrap_or_else(|_| "config.toml".to_string());
        if !Path::new(&config_path).exists() {
            return Ok(Self::default());
        }
        Self::load_from_path(&config_path)
    }

    pub fn load_from_path(path: &str) -> Result<Self, ConfigError> {
        let content =
            fs::read_to_string(path).map_err(|_| ConfigError::FileNotFound(path.to_string()))?;
        toml::from_str(&content).map_err(|e| ConfigError::Parsing(e.to_string()))
    }

    /// Apply `EXPLORER_*` environment variable overrides
    pub fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Ok(endpoint) = env::var("EXPLORER_RPC_URL") {
            self.source.endpoint = endpoint;
        }
        if let Ok(api_key) = env::var("EXPLORER_API_KEY") {
            self.source.api_key = Some(api_key);
        }
        if let Ok(index_path) = env::var("EXPLORER_INDEX_PATH") {
            self.source.index_path = Some(index_path);
        }
        if let Some(timeout) = parse_env("EXPLORER_TIMEOUT_SECONDS")? {
            self.source.timeout_seconds = timeout;
        }

        if let Some(max_depth) = parse_env("EXPLORER_MAX_DEPTH")? {
            self.expansion.max_depth = max_depth;
        }
        if let Some(max_nodes) = parse_env("EXPLORER_MAX_NODES")? {
            self.expansion.max_nodes = max_nodes;
        }
        if let Some(min_edge_value) = parse_env("EXPLORER_MIN_EDGE_VALUE")? {
            self.expansion.min_edge_value = min_edge_value;
        }

        if let Some(concurrency) = parse_env("EXPLORER_CONCURRENCY")? {
            self.traversal.concurrency = concurrency;
        }
        if let Some(max_retries) = parse_env("EXPLORER_MAX_RETRIES")? {
            self.traversal.max_retries = max_retries;
        }

        if let Ok(path) = env::var("EXPLORER_DATABASE_PATH") {
            self.database.path = path;
        }
        if let Some(port) = parse_env("EXPLORER_API_PORT")? {
            self.api.port = port;
        }
        if let Ok(host) = env::var("EXPLORER_API_HOST") {
            self.api.host = host;
        }

        if let Ok(level) = env::var("LOG_LEVEL") {
            self.logging.level = level;
        }
        if let Ok(format) = env::var("LOG_FORMAT") {
            self.logging.format = format;
        }

        Ok(())
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.source.endpoint.starts_with("http://") && !self.source.endpoint.starts_with("https://") {
            return Err(ConfigError::InvalidUrl(self.source.endpoint.clone()));
        }
        if self.source.timeout_seconds == 0 || self.source.timeout_seconds > 300 {
            return Err(invalid("source.timeout_seconds", self.source.timeout_seconds));
        }
        // alchemy_getAssetTransfers caps maxCount at 1000
        if self.source.max_transfers == 0 || self.source.max_transfers > 1000 {
            return Err(invalid("source.max_transfers", self.source.max_transfers));
        }

        if self.expansion.max_nodes == 0 {
            return Err(invalid("expansion.max_nodes", self.expansion.max_nodes));
        }
        if !self.expansion.min_edge_value.is_finite() || self.expansion.min_edge_value < 0.0 {
            return Err(invalid("expansion.min_edge_value", self.expansion.min_edge_value));
        }
        if self.expansion.max_neighbors_per_node == Some(0) {
            return Err(invalid("expansion.max_neighbors_per_node", 0));
        }

        if self.traversal.concurrency == 0 || self.traversal.concurrency > 64 {
            return Err(invalid("traversal.concurrency", self.traversal.concurrency));
        }
        if self.traversal.max_retries == 0 || self.traversal.max_retries > 20 {
            return Err(invalid("traversal.max_retries", self.traversal.max_retries));
        }

        if self.database.path.trim().is_empty() {
            return Err(invalid("database.path", &self.database.path));
        }
        if self.api.port == 0 {
            return Err(invalid("api.port", self.api.port));
        }

        let valid_levels = ["error", "warn", "info", "debug", "trace"];
        if !valid_levels.contains(&self.logging.level.as_str()) {
            return Err(invalid("logging.level", &self.logging.level));
        }
        let valid_formats = ["json", "pretty"];
        if !valid_formats.contains(&self.logging.format.as_str()) {
            return Err(invalid("logging.format", &self.logging.format));
        }

        Ok(())
    }

    /// Generate a sample configuration file
    pub fn generate_sample_config() -> Result<String, ConfigError> {
        toml::to_string_pretty(&Self::default()).map_err(|e| ConfigError::Parsing(e.to_string()))
    }

    /// Save configuration to file
    pub fn save_to_file(&self, path: &str) -> Result<(), ConfigError> {
        let content = toml::to_string_pretty(self).map_err(|e| ConfigError::Parsing(e.to_string()))?;
        fs::write(path, content).map_err(|_| ConfigError::FileNotFound(path.to_string()))?;
        Ok(())
    }
}
