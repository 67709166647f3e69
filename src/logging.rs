use log::{debug, error, info, trace, warn};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::config::LoggingConfig;
use crate::error::{ErrorSeverity, ExplorerError};

/// Structured logging context; each line is emitted as one JSON object
pub struct LogContext {
    pub component: String,
    pub operation: String,
    pub metadata: HashMap<String, Value>,
}

impl LogContext {
    pub fn new(component: &str, operation: &str) -> Self {
        Self {
            component: component.to_string(),
            operation: operation.to_string(),
            metadata: HashMap::new(),
        }
    }

    pub fn with_metadata(mut self, key: &str, value: Value) -> Self {
        self.metadata.insert(key.to_string(), value);
        self
    }

    pub fn with_address(self, address: &str) -> Self {
        self.with_metadata("address", json!(address))
    }

    pub fn with_depth(self, depth: u32) -> Self {
        self.with_metadata("depth", json!(depth))
    }

    pub fn with_duration_ms(self, duration_ms: u64) -> Self {
        self.with_metadata("duration_ms", json!(duration_ms))
    }

    pub fn with_retry_count(self, retry_count: u32) -> Self {
        self.with_metadata("retry_count", json!(retry_count))
    }

    fn format_message(&self, level: &str, message: &str) -> String {
        let timestamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs();

        let mut log_entry = json!({
            "timestamp": timestamp,
            "level": level,
            "component": self.component,
            "operation": self.operation,
            "message": message,
        });

        for (key, value) in &self.metadata {
            log_entry[key] = value.clone();
        }

        log_entry.to_string()
    }

    pub fn info(&self, message: &str) {
        info!("{}", self.format_message("INFO", message));
    }

    pub fn warn(&self, message: &str) {
        warn!("{}", self.format_message("WARN", message));
    }

    pub fn error(&self, message: &str) {
        error!("{}", self.format_message("ERROR", message));
    }

    pub fn debug(&self, message: &str) {
        debug!("{}", self.format_message("DEBUG", message));
    }

    pub fn trace(&self, message: &str) {
        trace!("{}", self.format_message("TRACE", message));
    }
}

/// Times an operation and logs its duration when finished
pub struct PerformanceMonitor {
    pub start_time: SystemTime,
    operation: String,
    metadata: HashMap<String, Value>,
}

impl PerformanceMonitor {
    pub fn new(operation: &str) -> Self {
        Self {
            start_time: SystemTime::now(),
            operation: operation.to_string(),
            metadata: HashMap::new(),
        }
    }

    pub fn with_metadata(mut self, key: &str, value: Value) -> Self {
        self.metadata.insert(key.to_string(), value);
        self
    }

    pub fn elapsed_ms(&self) -> u64 {
        self.start_time.elapsed().unwrap_or_default().as_millis() as u64
    }

    fn context(&self, duration: u64) -> LogContext {
        let mut context = LogContext::new("performance", &self.operation).with_duration_ms(duration);
        for (key, value) in &self.metadata {
            context = context.with_metadata(key, value.clone());
        }
        context
    }

    pub fn finish(self) -> u64 {
        let duration = self.elapsed_ms();
        self.context(duration)
            .debug(&format!("Operation completed in {}ms", duration));
        duration
    }

    pub fn finish_with_result<T, E>(self, result: &Result<T, E>) -> u64
    where
        E: std::fmt::Display,
    {
        let duration = self.elapsed_ms();
        let context = self.context(duration);

        match result {
            Ok(_) => context.debug(&format!("Operation completed successfully in {}ms", duration)),
            Err(e) => context
                .with_metadata("error", json!(e.to_string()))
                .warn(&format!("Operation failed after {}ms: {}", duration, e)),
        }

        duration
    }
}

pub struct ErrorLogger;

impl ErrorLogger {
    pub fn log_error(error: &ExplorerError, context: Option<LogContext>) {
        let severity = error.severity();

        let mut log_context = context
            .unwrap_or_else(|| LogContext::new("error", "unknown"))
            .with_metadata("error_type", json!(format!("{:?}", error)))
            .with_metadata("severity", json!(format!("{:?}", severity)))
            .with_metadata("recoverable", json!(error.is_recoverable()));

        if let Some(delay) = error.retry_delay() {
            log_context = log_context.with_metadata("retry_delay_seconds", json!(delay));
        }

        let message = format!("Error occurred: {}", error);

        match severity {
            ErrorSeverity::Critical | ErrorSeverity::High => log_context.error(&message),
            ErrorSeverity::Medium => log_context.warn(&message),
            ErrorSeverity::Low => log_context.info(&message),
        }
    }

    pub fn log_recovery_attempt(error: &ExplorerError, attempt: u32, max_attempts: u32) {
        let context = LogContext::new("recovery", "retry_attempt")
            .with_retry_count(attempt)
            .with_metadata("max_attempts", json!(max_attempts))
            .with_metadata("error_type", json!(format!("{:?}", error)));

        if attempt == max_attempts {
            context.error(&format!("Final retry attempt failed: {}", error));
        } else {
            context.warn(&format!("Retry attempt {} of {}: {}", attempt, max_attempts, error));
        }
    }

    pub fn log_recovery_success(operation: &str, attempts: u32, total_duration_ms: u64) {
        LogContext::new("recovery", "success")
            .with_metadata("operation", json!(operation))
            .with_retry_count(attempts)
            .with_duration_ms(total_duration_ms)
            .info(&format!(
                "Operation recovered after {} attempts in {}ms",
                attempts, total_duration_ms
            ));
    }
}

/// Exploration metrics
pub struct MetricsLogger;

impl MetricsLogger {
    pub fn log_address_expanded(address: &str, depth: u32, accepted: usize, rejected: usize, duration_ms: u64) {
        LogContext::new("metrics", "address_expanded")
            .with_address(address)
            .with_depth(depth)
            .with_metadata("accepted_edges", json!(accepted))
            .with_metadata("rejected_edges", json!(rejected))
            .with_duration_ms(duration_ms)
            .info(&format!(
                "Expanded {} at depth {}: {} edges accepted, {} rejected",
                address, depth, accepted, rejected
            ));
    }

    pub fn log_address_skipped(address: &str, reason: &str, detail: &str) {
        LogContext::new("metrics", "address_skipped")
            .with_address(address)
            .with_metadata("reason", json!(reason))
            .warn(&format!("Skipped {} ({}): {}", address, reason, detail));
    }

    pub fn log_source_call(method: &str, duration_ms: u64, success: bool) {
        let context = LogContext::new("metrics", "source_call")
            .with_metadata("method", json!(method))
            .with_duration_ms(duration_ms)
            .with_metadata("success", json!(success));

        if success {
            context.debug(&format!("Source call {} completed in {}ms", method, duration_ms));
        } else {
            context.warn(&format!("Source call {} failed after {}ms", method, duration_ms));
        }
    }

    pub fn log_traversal_summary(
        nodes: usize,
        edges: usize,
        skipped: usize,
        pending: usize,
        duration_ms: u64,
    ) {
        let context = LogContext::new("metrics", "traversal_summary")
            .with_metadata("nodes", json!(nodes))
            .with_metadata("edges", json!(edges))
            .with_metadata("skipped", json!(skipped))
            .with_metadata("pending", json!(pending))
            .with_duration_ms(duration_ms);

        if skipped > 0 {
            context.warn(&format!(
                "Traversal finished with {} nodes, {} edges; {} addresses skipped",
                nodes, edges, skipped
            ));
        } else {
            context.info(&format!("Traversal finished with {} nodes, {} edges", nodes, edges));
        }
    }

    pub fn log_session_saved(session_id: i64, nodes: usize, edges: usize) {
        LogContext::new("metrics", "session_saved")
            .with_metadata("session_id", json!(session_id))
            .with_metadata("nodes", json!(nodes))
            .with_metadata("edges", json!(edges))
            .info(&format!("Saved session {} ({} nodes, {} edges)", session_id, nodes, edges));
    }
}

/// Install the env_logger backend. `RUST_LOG` still overrides the configured level.
pub fn init_logging(config: &LoggingConfig) -> Result<(), log::SetLoggerError> {
    let pretty = config.format == "pretty";

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(config.level.as_str()))
        .format(move |buf, record| {
            use std::io::Write;

            let message = record.args().to_string();
            match serde_json::from_str::<Value>(&message) {
                Ok(json_value) if pretty => {
                    writeln!(buf, "{}", serde_json::to_string_pretty(&json_value)?)
                }
                Ok(json_value) => writeln!(buf, "{}", json_value),
                Err(_) => writeln!(
                    buf,
                    "{} [{}] {}: {}",
                    chrono::Utc::now().format("%Y-%m-%d %H:%M:%S%.3f"),
                    record.level(),
                    record.target(),
                    message
                ),
            }
        })
        .try_init()?;

    info!("Structured logging initialized");
    Ok(())
}
