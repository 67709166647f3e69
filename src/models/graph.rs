use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashSet};

use crate::models::{Address, Edge};

/// Read-only export of an explored graph.
///
/// Nodes are ordered by id and edges by (tx hash, source, destination), so
/// two exports of equal stores compare equal and serialize identically.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Graph {
    pub nodes: Vec<Address>,
    pub edges: Vec<Edge>,
}

impl Graph {
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    pub fn node(&self, id: &str) -> Option<&Address> {
        self.nodes.iter().find(|node| node.id == id)
    }

    pub fn contains_node(&self, id: &str) -> bool {
        self.node(id).is_some()
    }

    pub fn node_ids(&self) -> BTreeSet<String> {
        self.nodes.iter().map(|node| node.id.clone()).collect()
    }

    /// Node id → attributes, the shape most plotting libraries take
    pub fn node_map(&self) -> BTreeMap<&str, &Address> {
        self.nodes.iter().map(|node| (node.id.as_str(), node)).collect()
    }

    /// Every edge endpoint is a node and no edge key repeats
    pub fn is_consistent(&self) -> bool {
        let ids: HashSet<&str> = self.nodes.iter().map(|node| node.id.as_str()).collect();
        let mut keys = HashSet::new();
        self.edges.iter().all(|edge| {
            ids.contains(edge.source.as_str())
                && ids.contains(edge.destination.as_str())
                && keys.insert(edge.key())
        })
    }

    /// Display label → addresses carrying it
    pub fn label_groups(&self) -> BTreeMap<String, Vec<String>> {
        let mut groups: BTreeMap<String, Vec<String>> = BTreeMap::new();
        for node in &self.nodes {
            groups.entry(node.display_label()).or_default().push(node.id.clone());
        }
        groups
    }
}
