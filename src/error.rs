use thiserror::Error;

/// Main error type for the address graph explorer
#[derive(Error, Debug)]
pub enum ExplorerError {
    #[error("Source error: {0}")]
    Source(#[from] SourceError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    #[error("System error: {0}")]
    System(#[from] SystemError),
}

/// Errors raised by a transaction data source
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SourceError {
    #[error("Source unavailable: {0}")]
    Unavailable(String),

    #[error("No transaction history for address {0}")]
    NotFound(String),

    #[error("Rate limit exceeded, retry after {seconds} seconds")]
    RateLimited { seconds: u64 },

    #[error("Invalid response format: {0}")]
    InvalidResponse(String),
}

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("At least one seed address is required")]
    NoSeeds,

    #[error("Invalid seed address: {0:?}")]
    InvalidSeed(String),

    #[error("Invalid configuration value for {key}: {value}")]
    InvalidValue { key: String, value: String },

    #[error("Configuration file not found: {0}")]
    FileNotFound(String),

    #[error("Configuration parsing failed: {0}")]
    Parsing(String),

    #[error("Invalid URL format: {0}")]
    InvalidUrl(String),
}

/// Session store errors
#[derive(Error, Debug)]
pub enum DatabaseError {
    #[error("Connection failed: {0}")]
    Connection(#[from] rusqlite::Error),

    #[error("Serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Lock acquisition failed: {0}")]
    Lock(String),

    #[error("Session not found: {0}")]
    NotFound(i64),
}

/// System-level errors
#[derive(Error, Debug)]
pub enum SystemError {
    #[error("File system error: {0}")]
    FileSystem(#[from] std::io::Error),

    #[error("Resource exhausted: {0}")]
    ResourceExhausted(String),
}

/// Result type alias for convenience
pub type Result<T> = std::result::Result<T, ExplorerError>;

/// Error severity levels for logging
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorSeverity {
    /// Stops the run
    Critical,
    /// Loses data for part of the graph
    High,
    /// Degrades the run but is usually transient
    Medium,
    /// Informational
    Low,
}

impl ExplorerError {
    /// Get the severity level of an error
    pub fn severity(&self) -> ErrorSeverity {
        match self {
            ExplorerError::Config(_) => ErrorSeverity::Critical,
            ExplorerError::Database(DatabaseError::Connection(_)) => ErrorSeverity::Critical,
            ExplorerError::System(SystemError::FileSystem(_)) => ErrorSeverity::Critical,

            ExplorerError::Source(SourceError::InvalidResponse(_)) => ErrorSeverity::High,
            ExplorerError::Database(_) => ErrorSeverity::High,

            ExplorerError::Source(SourceError::Unavailable(_)) => ErrorSeverity::Medium,
            ExplorerError::Source(SourceError::RateLimited { .. }) => ErrorSeverity::Medium,

            ExplorerError::Source(SourceError::NotFound(_)) => ErrorSeverity::Low,
            _ => ErrorSeverity::Medium,
        }
    }

    /// Check if the error is recoverable (can be retried)
    pub fn is_recoverable(&self) -> bool {
        match self {
            ExplorerError::Source(source) => source.is_transient(),
            ExplorerError::Database(DatabaseError::Lock(_)) => true,
            ExplorerError::System(SystemError::ResourceExhausted(_)) => true,
            _ => false,
        }
    }

    /// Get suggested retry delay in seconds for recoverable errors
    pub fn retry_delay(&self) -> Option<u64> {
        if !self.is_recoverable() {
            return None;
        }

        match self {
            ExplorerError::Source(SourceError::RateLimited { seconds }) => Some(*seconds),
            ExplorerError::Source(SourceError::Unavailable(_)) => Some(5),
            ExplorerError::Database(DatabaseError::Lock(_)) => Some(1),
            ExplorerError::System(SystemError::ResourceExhausted(_)) => Some(30),
            _ => Some(5),
        }
    }
}

impl SourceError {
    /// Transient failures are worth retrying; `NotFound` and malformed payloads are not
    pub fn is_transient(&self) -> bool {
        matches!(self, SourceError::Unavailable(_) | SourceError::RateLimited { .. })
    }
}

impl From<reqwest::Error> for SourceError {
    fn from(err: reqwest::Error) -> Self {
        if err.status() == Some(reqwest::StatusCode::TOO_MANY_REQUESTS) {
            SourceError::RateLimited { seconds: 60 }
        } else if err.is_decode() {
            SourceError::InvalidResponse(err.to_string())
        } else {
            SourceError::Unavailable(err.to_string())
        }
    }
}
