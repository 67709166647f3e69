use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use crate::config::ExpansionConfig;
use crate::models::{normalize_address, Edge};
use crate::store::GraphStore;

/// Ordering applied to candidate edges before the per-node neighbor limit
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RankBy {
    /// Largest value first
    #[default]
    Value,
    /// Highest block first
    Recency,
}

/// Stopping and filtering rules for graph growth.
///
/// Pure: decisions depend only on the configuration and the graph state
/// passed in, so identical inputs always produce identical graphs.
#[derive(Debug, Clone)]
pub struct ExpansionPolicy {
    max_depth: u32,
    max_nodes: usize,
    min_edge_value: f64,
    max_neighbors: Option<usize>,
    rank_by: RankBy,
    stop_at_label: bool,
    skip_contracts: bool,
    drop_unnamed_assets: bool,
    nogrow: HashSet<String>,
}

impl ExpansionPolicy {
    pub fn new(config: &ExpansionConfig) -> Self {
        Self {
            max_depth: config.max_depth,
            max_nodes: config.max_nodes,
            min_edge_value: config.min_edge_value,
            max_neighbors: config.max_neighbors_per_node,
            rank_by: config.rank_by,
            stop_at_label: config.stop_at_label,
            skip_contracts: config.skip_contracts,
            drop_unnamed_assets: config.drop_unnamed_assets,
            nogrow: config.nogrow.iter().map(|a| normalize_address(a)).collect(),
        }
    }

    /// Depth, node ceiling and value threshold only; every other rule off
    pub fn with_limits(max_depth: u32, max_nodes: usize, min_edge_value: f64) -> Self {
        Self {
            max_depth,
            max_nodes,
            min_edge_value,
            max_neighbors: None,
            rank_by: RankBy::Value,
            stop_at_label: false,
            skip_contracts: false,
            drop_unnamed_assets: false,
            nogrow: HashSet::new(),
        }
    }

    pub fn max_depth(&self) -> u32 {
        self.max_depth
    }

    pub fn max_nodes(&self) -> usize {
        self.max_nodes
    }

    pub fn add_nogrow(&mut self, address: &str) {
        self.nogrow.insert(normalize_address(address));
    }

    pub fn at_capacity(&self, graph: &GraphStore) -> bool {
        graph.node_count() >= self.max_nodes
    }

    /// Whether `address`, reached at `current_depth`, should have its own
    /// transactions fetched.
    pub fn should_expand(&self, address: &str, current_depth: u32, graph: &GraphStore) -> bool {
        !self.at_capacity(graph) && self.is_expandable(address, current_depth, graph)
    }

    /// Per-address rules only, ignoring the node ceiling. Addresses passing
    /// this while the graph is full are left pending rather than dropped.
    pub fn is_expandable(&self, address: &str, current_depth: u32, graph: &GraphStore) -> bool {
        if current_depth >= self.max_depth {
            return false;
        }

        let address = normalize_address(address);
        if self.nogrow.contains(&address) {
            return false;
        }

        match graph.node(&address) {
            Some(node) => {
                if self.skip_contracts && node.is_contract {
                    return false;
                }
                // seeds are explored even when labelled
                !(self.stop_at_label && current_depth > 0 && node.label.is_some())
            }
            None => true,
        }
    }

    /// Whether an edge is worth following at all
    pub fn accepts(&self, edge: &Edge) -> bool {
        if edge.value < self.min_edge_value {
            return false;
        }
        !(self.drop_unnamed_assets && edge.asset.is_none())
    }

    /// Order candidates by the configured ranking and apply the neighbor limit.
    /// Ties fall back to (tx hash, source, destination), which is a total order.
    pub fn rank_neighbors(&self, mut candidates: Vec<Edge>) -> Vec<Edge> {
        candidates.sort_by(|a, b| {
            let primary = match self.rank_by {
                RankBy::Value => b.value.total_cmp(&a.value),
                RankBy::Recency => b.block_height.cmp(&a.block_height),
            };
            primary
                .then_with(|| a.tx_hash.cmp(&b.tx_hash))
                .then_with(|| a.source.cmp(&b.source))
                .then_with(|| a.destination.cmp(&b.destination))
        });

        if let Some(limit) = self.max_neighbors {
            candidates.truncate(limit);
        }
        candidates
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Address;

    fn edge(tx: &str, source: &str, destination: &str, value: f64, height: u64) -> Edge {
        Edge {
            source: source.to_string(),
            destination: destination.to_string(),
            value,
            tx_hash: tx.to_string(),
            block_height: height,
            asset: Some("ETH".to_string()),
        }
    }

    #[test]
    fn test_depth_and_capacity_limits() {
        let policy = ExpansionPolicy::with_limits(2, 2, 0.0);
        let mut graph = GraphStore::new();
        graph.add_node(Address::new("0xa"));

        assert!(policy.should_expand("0xa", 0, &graph));
        assert!(policy.should_expand("0xa", 1, &graph));
        assert!(!policy.should_expand("0xa", 2, &graph));

        graph.add_node(Address::new("0xb"));
        assert!(policy.at_capacity(&graph));
        assert!(!policy.should_expand("0xa", 0, &graph));
        // still a candidate for a later run with a higher ceiling
        assert!(policy.is_expandable("0xa", 0, &graph));
        assert!(!policy.is_expandable("0xa", 2, &graph));
    }

    #[test]
    fn test_nogrow_addresses() {
        let mut config = ExpansionConfig::default();
        config.nogrow = vec!["0xDEAD".to_string()];
        let policy = ExpansionPolicy::new(&config);

        assert!(!policy.should_expand("0xdead", 0, &GraphStore::new()));
        assert!(policy.should_expand("0xbeef", 0, &GraphStore::new()));
    }

    #[test]
    fn test_stop_at_label_exempts_seeds() {
        let policy = ExpansionPolicy::new(&ExpansionConfig::default());
        let mut graph = GraphStore::new();
        graph.add_node(Address::new("0xa").with_label("Binance"));

        assert!(policy.should_expand("0xa", 0, &graph));
        assert!(!policy.should_expand("0xa", 1, &graph));
    }

    #[test]
    fn test_skip_contracts() {
        let policy = ExpansionPolicy::new(&ExpansionConfig::default());
        let mut graph = GraphStore::new();
        graph.add_node(Address::new("0xc").with_contract(true));
        assert!(!policy.should_expand("0xc", 0, &graph));

        let lenient = ExpansionPolicy::with_limits(3, 10, 0.0);
        assert!(lenient.should_expand("0xc", 0, &graph));
    }

    #[test]
    fn test_accepts_value_threshold_and_unnamed_assets() {
        let policy = ExpansionPolicy::new(&ExpansionConfig {
            min_edge_value: 1.0,
            ..ExpansionConfig::default()
        });

        assert!(policy.accepts(&edge("t", "a", "b", 1.0, 1)));
        assert!(!policy.accepts(&edge("t", "a", "b", 0.5, 1)));

        let mut spam = edge("t", "a", "b", 100.0, 1);
        spam.asset = None;
        assert!(!policy.accepts(&spam));
        assert!(ExpansionPolicy::with_limits(1, 10, 1.0).accepts(&spam));
    }

    #[test]
    fn test_rank_by_value_with_limit() {
        let mut config = ExpansionConfig::default();
        config.max_neighbors_per_node = Some(2);
        let policy = ExpansionPolicy::new(&config);

        let ranked = policy.rank_neighbors(vec![
            edge("t1", "a", "b", 1.0, 30),
            edge("t2", "a", "c", 9.0, 10),
            edge("t3", "a", "d", 5.0, 20),
        ]);
        let hashes: Vec<&str> = ranked.iter().map(|e| e.tx_hash.as_str()).collect();
        assert_eq!(hashes, vec!["t2", "t3"]);
    }

    #[test]
    fn test_rank_by_recency() {
        let mut config = ExpansionConfig::default();
        config.rank_by = RankBy::Recency;
        config.max_neighbors_per_node = None;
        let policy = ExpansionPolicy::new(&config);

        let ranked = policy.rank_neighbors(vec![
            edge("t1", "a", "b", 1.0, 30),
            edge("t2", "a", "c", 9.0, 10),
            edge("t3", "a", "d", 5.0, 20),
        ]);
        let hashes: Vec<&str> = ranked.iter().map(|e| e.tx_hash.as_str()).collect();
        assert_eq!(hashes, vec!["t1", "t3", "t2"]);
    }

    #[test]
    fn test_ranking_ties_are_deterministic() {
        let policy = ExpansionPolicy::with_limits(1, 10, 0.0);
        let forward = policy.rank_neighbors(vec![
            edge("tb", "a", "c", 1.0, 1),
            edge("ta", "a", "b", 1.0, 1),
        ]);
        let backward = policy.rank_neighbors(vec![
            edge("ta", "a", "b", 1.0, 1),
            edge("tb", "a", "c", 1.0, 1),
        ]);
        assert_eq!(forward, backward);
        assert_eq!(forward[0].tx_hash, "ta");
    }

    #[test]
    fn test_ranking_with_nan_value_is_order_independent() {
        let policy = ExpansionPolicy::with_limits(1, 10, 0.0);
        let candidates = vec![
            edge("t1", "a", "b", 3.0, 1),
            edge("t2", "a", "c", f64::NAN, 1),
            edge("t3", "a", "d", 7.0, 1),
        ];
        let mut reversed = candidates.clone();
        reversed.reverse();

        let hashes = |edges: Vec<Edge>| -> Vec<String> {
            edges.into_iter().map(|e| e.tx_hash).collect()
        };
        let forward = hashes(policy.rank_neighbors(candidates));
        assert_eq!(forward, hashes(policy.rank_neighbors(reversed)));
        assert_eq!(forward, vec!["t2", "t3", "t1"]);
    }
}
