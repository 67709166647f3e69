use futures_util::stream::{self, StreamExt};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::{BTreeSet, HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::config::TraversalConfig;
use crate::error::{ConfigError, ExplorerError, Result, SourceError};
use crate::logging::{ErrorLogger, LogContext, MetricsLogger, PerformanceMonitor};
use crate::models::{normalize_address, Address, Edge, Graph, LabelBook, Transaction};
use crate::policy::ExpansionPolicy;
use crate::retry::{RetryConfig, RetryManager};
use crate::source::TransactionSource;
use crate::store::GraphStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TraversalState {
    Idle,
    Expanding,
    Done,
}

/// Cooperative stop flag shared with whoever may interrupt a run
#[derive(Debug, Clone, Default)]
pub struct StopHandle(Arc<AtomicBool>);

impl StopHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stop(&self) {
        info!("Stop requested for traversal");
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_stopped(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SkipReason {
    NotFound,
    SourceUnavailable,
}

impl From<&SourceError> for SkipReason {
    fn from(error: &SourceError) -> Self {
        match error {
            SourceError::NotFound(_) => SkipReason::NotFound,
            _ => SkipReason::SourceUnavailable,
        }
    }
}

/// An address whose transactions could not be fetched
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SkippedAddress {
    pub address: String,
    pub reason: SkipReason,
    pub detail: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TraversalStats {
    pub addresses_expanded: usize,
    pub addresses_skipped: usize,
    pub edges_accepted: usize,
    pub edges_rejected: usize,
    /// Accepted edges dropped because their counterpart would exceed the node ceiling
    pub edges_capped: usize,
    pub max_depth_reached: u32,
    pub duration_ms: u64,
}

/// Result of one exploration: the graph (possibly partial) and what was left out
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TraversalReport {
    pub graph: Graph,
    pub skipped: Vec<SkippedAddress>,
    /// Frontier left unexpanded because of the node ceiling or a stop request
    pub pending: Vec<String>,
    pub state: TraversalState,
    pub stopped: bool,
    pub stats: TraversalStats,
}

impl TraversalReport {
    pub fn is_complete(&self) -> bool {
        self.pending.is_empty() && self.skipped.is_empty()
    }
}

/// Breadth-first graph expansion from seed addresses.
///
/// Fetches for a batch of frontier addresses run concurrently up to
/// `concurrency`; results are merged one by one in frontier order, so the
/// resulting graph does not depend on the concurrency setting.
pub struct TraversalDriver<S: TransactionSource + ?Sized> {
    source: Arc<S>,
    policy: ExpansionPolicy,
    store: GraphStore,
    labels: LabelBook,
    retry: RetryManager,
    concurrency: usize,
    stop: StopHandle,
    state: TraversalState,
    expanded: HashSet<String>,
    stats: TraversalStats,
    skipped: Vec<SkippedAddress>,
}

impl<S: TransactionSource + ?Sized> TraversalDriver<S> {
    pub fn new(source: Arc<S>, policy: ExpansionPolicy, store: GraphStore, config: &TraversalConfig) -> Self {
        let expanded = store.expanded_addresses().into_iter().collect();
        Self {
            source,
            policy,
            store,
            labels: LabelBook::new(),
            retry: RetryManager::new("fetch_transactions", RetryConfig::from(config)),
            concurrency: config.concurrency.max(1),
            stop: StopHandle::new(),
            state: TraversalState::Idle,
            expanded,
            stats: TraversalStats::default(),
            skipped: Vec::new(),
        }
    }

    pub fn with_stop_flag(mut self, stop: StopHandle) -> Self {
        self.stop = stop;
        self
    }

    pub fn with_labels(mut self, labels: LabelBook) -> Self {
        self.labels = labels;
        self
    }

    /// Treat `addresses` as already expanded; they are never fetched again
    pub fn with_expanded<I>(mut self, addresses: I) -> Self
    where
        I: IntoIterator<Item = String>,
    {
        self.expanded
            .extend(addresses.into_iter().map(|address| normalize_address(&address)));
        self
    }

    pub fn state(&self) -> TraversalState {
        self.state
    }

    pub fn stop_handle(&self) -> StopHandle {
        self.stop.clone()
    }

    /// Trim, normalize and de-duplicate seeds, keeping first-seen order
    fn validate_seeds(&self, seeds: &[String]) -> Result<Vec<String>> {
        if self.policy.max_nodes() == 0 {
            return Err(ConfigError::InvalidValue {
                key: "max_nodes".to_string(),
                value: "0".to_string(),
            }
            .into());
        }

        let mut seen = HashSet::new();
        let mut validated = Vec::new();
        for seed in seeds {
            let trimmed = seed.trim();
            if trimmed.is_empty() {
                return Err(ConfigError::InvalidSeed(seed.clone()).into());
            }
            let address = normalize_address(trimmed);
            if seen.insert(address.clone()) {
                validated.push(address);
            }
        }

        if validated.is_empty() {
            return Err(ConfigError::NoSeeds.into());
        }
        if validated.len() > self.policy.max_nodes() {
            return Err(ConfigError::InvalidValue {
                key: "seeds".to_string(),
                value: format!(
                    "{} seeds exceed max_nodes {}",
                    validated.len(),
                    self.policy.max_nodes()
                ),
            }
            .into());
        }
        Ok(validated)
    }

    /// Expand from `seeds` until the frontier is empty, the node ceiling is
    /// reached, or the stop flag is raised. Fetch failures are recorded in
    /// the report; only invalid seeds or limits fail the run.
    pub async fn run(mut self, seeds: &[String]) -> Result<TraversalReport> {
        let seeds = self.validate_seeds(seeds)?;
        let monitor = PerformanceMonitor::new("traversal").with_metadata("seeds", json!(seeds.len()));

        self.state = TraversalState::Expanding;
        LogContext::new("traversal", "run")
            .with_metadata("seeds", json!(seeds))
            .with_metadata("max_depth", json!(self.policy.max_depth()))
            .with_metadata("max_nodes", json!(self.policy.max_nodes()))
            .info("Starting traversal");

        let mut frontier: VecDeque<(String, u32)> = VecDeque::new();
        let mut queued: HashSet<String> = HashSet::new();

        for seed in &seeds {
            if !self.store.contains_node(seed) {
                self.store.add_node(self.labels.annotate(Address::new(seed)));
            }
            let depth = self.store.node(seed).map(|node| node.depth).unwrap_or(0);
            self.enqueue(seed, depth, &mut frontier, &mut queued);
        }

        let mut pending = Vec::new();

        while !frontier.is_empty() {
            if self.stop.is_stopped() {
                info!("Traversal stopped with {} addresses in the frontier", frontier.len());
                break;
            }
            if self.policy.at_capacity(&self.store) {
                info!("Node ceiling of {} reached", self.policy.max_nodes());
                break;
            }

            let mut batch = Vec::with_capacity(self.concurrency);
            while batch.len() < self.concurrency {
                let Some((address, depth)) = frontier.pop_front() else {
                    break;
                };
                // rules may have changed since the address was queued
                if self.policy.should_expand(&address, depth, &self.store)
                    && !self.expanded.contains(&address)
                {
                    batch.push((address, depth));
                }
            }
            if batch.is_empty() {
                continue;
            }

            debug!("Fetching batch of {} addresses", batch.len());
            let source = self.source.as_ref();
            let retry = &self.retry;
            let results: Vec<std::result::Result<Vec<Transaction>, ExplorerError>> =
                stream::iter(batch.iter())
                    .map(|(address, _)| fetch_with_retry(source, retry, address))
                    .buffered(self.concurrency)
                    .collect()
                    .await;

            let mut results = batch.into_iter().zip(results);
            while let Some(((address, depth), result)) = results.next() {
                match result {
                    Ok(transactions) => {
                        let discovered = self.merge(&address, depth, &transactions).await;
                        for (counterpart, counterpart_depth) in discovered {
                            self.enqueue(&counterpart, counterpart_depth, &mut frontier, &mut queued);
                        }
                    }
                    Err(error) => self.record_skip(&address, depth, &error),
                }

                // fetched but unmerged addresses go back to the frontier report
                if self.stop.is_stopped() || self.policy.at_capacity(&self.store) {
                    pending.extend(results.by_ref().map(|((address, _), _)| address));
                    break;
                }
            }
        }

        pending.extend(frontier.into_iter().map(|(address, _)| address));
        self.state = TraversalState::Done;
        self.stats.duration_ms = monitor.finish();

        let graph = self.store.export();
        MetricsLogger::log_traversal_summary(
            graph.node_count(),
            graph.edge_count(),
            self.skipped.len(),
            pending.len(),
            self.stats.duration_ms,
        );

        Ok(TraversalReport {
            graph,
            skipped: self.skipped,
            pending,
            state: self.state,
            stopped: self.stop.is_stopped(),
            stats: self.stats,
        })
    }

    fn enqueue(
        &self,
        address: &str,
        depth: u32,
        frontier: &mut VecDeque<(String, u32)>,
        queued: &mut HashSet<String>,
    ) {
        if self.expanded.contains(address) || queued.contains(address) {
            return;
        }
        if self.policy.is_expandable(address, depth, &self.store) {
            queued.insert(address.to_string());
            frontier.push_back((address.to_string(), depth));
        }
    }

    fn record_skip(&mut self, address: &str, depth: u32, error: &ExplorerError) {
        let reason = match error {
            ExplorerError::Source(source_error) => SkipReason::from(source_error),
            _ => SkipReason::SourceUnavailable,
        };
        ErrorLogger::log_error(
            error,
            Some(
                LogContext::new("traversal", "fetch_transactions")
                    .with_address(address)
                    .with_depth(depth),
            ),
        );
        MetricsLogger::log_address_skipped(address, &format!("{:?}", reason), &error.to_string());

        self.stats.addresses_skipped += 1;
        self.skipped.push(SkippedAddress {
            address: address.to_string(),
            reason,
            detail: error.to_string(),
        });
    }

    /// Merge one address's transactions. Returns newly added counterparts
    /// with their depth, in merge order.
    async fn merge(&mut self, address: &str, depth: u32, transactions: &[Transaction]) -> Vec<(String, u32)> {
        let monitor = PerformanceMonitor::new("merge_address").with_metadata("address", json!(address));

        self.store.mark_expanded(address);
        self.expanded.insert(address.to_string());
        self.stats.addresses_expanded += 1;
        self.stats.max_depth_reached = self.stats.max_depth_reached.max(depth);

        let candidates: Vec<Edge> = transactions
            .iter()
            .flat_map(|tx| tx.edges_touching(address))
            .collect();
        let considered = candidates.len();
        let accepted: Vec<Edge> = candidates
            .into_iter()
            .filter(|edge| self.policy.accepts(edge))
            .collect();
        let rejected = considered - accepted.len();
        let ranked = self.policy.rank_neighbors(accepted);

        let unseen: BTreeSet<String> = ranked
            .iter()
            .filter_map(|edge| edge.counterpart(address))
            .filter(|counterpart| !self.store.contains_node(counterpart))
            .map(str::to_string)
            .collect();
        self.lookup_labels(&unseen).await;

        let mut discovered = Vec::new();
        let mut added = 0;
        for edge in ranked {
            let Some(counterpart) = edge.counterpart(address).map(str::to_string) else {
                continue;
            };
            if !self.store.contains_node(&counterpart) {
                if self.policy.at_capacity(&self.store) {
                    self.stats.edges_capped += 1;
                    continue;
                }
                self.store
                    .add_node(self.labels.annotate(Address::at_depth(&counterpart, depth + 1)));
                discovered.push((counterpart, depth + 1));
            }
            if self.store.add_edge(edge) {
                added += 1;
            }
        }

        self.stats.edges_accepted += added;
        self.stats.edges_rejected += rejected;
        MetricsLogger::log_address_expanded(address, depth, added, rejected, monitor.finish());

        discovered
    }

    /// Ask the source about addresses the label book has never seen.
    /// Failures only cost annotations.
    async fn lookup_labels(&mut self, addresses: &BTreeSet<String>) {
        let unknown: Vec<String> = addresses
            .iter()
            .filter(|address| !self.labels.is_known(address))
            .cloned()
            .collect();
        if unknown.is_empty() {
            return;
        }

        match self.source.lookup_labels(&unknown).await {
            Ok(info) => {
                for (address, info) in &info {
                    self.labels.record(address, info);
                }
            }
            Err(error) => {
                warn!(
                    "Label lookup via {} failed for {} addresses: {}",
                    self.source.name(),
                    unknown.len(),
                    error
                );
            }
        }
    }
}

async fn fetch_with_retry<S: TransactionSource + ?Sized>(
    source: &S,
    retry: &RetryManager,
    address: &str,
) -> std::result::Result<Vec<Transaction>, ExplorerError> {
    retry
        .execute(|| async move {
            source
                .fetch_transactions(address)
                .await
                .map_err(ExplorerError::from)
        })
        .await
}
