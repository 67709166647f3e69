pub mod api;
pub mod config;
pub mod database;
pub mod error;
pub mod logging;
pub mod models;
pub mod policy;
pub mod retry;
pub mod source;
pub mod store;
pub mod traversal;

pub use config::{AppConfig, ApiConfig, DatabaseConfig, ExpansionConfig, LoggingConfig, SourceConfig, TraversalConfig};
pub use error::{ExplorerError, Result};
pub use logging::{ErrorLogger, LogContext, MetricsLogger, PerformanceMonitor};
pub use models::{Address, Edge, Graph, LabelBook, Transaction};
pub use policy::{ExpansionPolicy, RankBy};
pub use retry::{RetryConfig, RetryManager};
pub use source::{MemorySource, RpcSource, TransactionSource};
pub use store::GraphStore;
pub use traversal::{SkipReason, SkippedAddress, StopHandle, TraversalDriver, TraversalReport, TraversalState};
