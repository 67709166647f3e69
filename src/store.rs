use std::collections::{BTreeMap, BTreeSet};

use crate::models::{normalize_address, Address, Edge, EdgeKey, Graph};

/// De-duplicated in-memory store of address nodes and transfer edges.
///
/// Every edge's endpoints are always present as nodes. Adding the same node
/// or edge twice is a no-op apart from merging node annotations.
#[derive(Debug, Clone, Default)]
pub struct GraphStore {
    nodes: BTreeMap<String, Address>,
    edges: BTreeMap<EdgeKey, Edge>,
    adjacency: BTreeMap<String, BTreeSet<String>>,
}

impl GraphStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild a store from an exported graph, e.g. a saved session
    pub fn from_graph(graph: Graph) -> Self {
        let mut store = Self::new();
        for node in graph.nodes {
            store.add_node(node);
        }
        for edge in graph.edges {
            if store.edges.contains_key(&edge.key()) {
                continue;
            }
            store.ensure_endpoint(&edge.source, &edge.destination);
            store.ensure_endpoint(&edge.destination, &edge.source);
            store.link(&edge);
            store.edges.insert(edge.key(), edge);
        }
        store
    }

    /// Insert a node, or merge annotations into the existing one.
    /// Returns true when the node was new.
    pub fn add_node(&mut self, node: Address) -> bool {
        match self.nodes.get_mut(&node.id) {
            Some(existing) => {
                existing.merge(&node);
                false
            }
            None => {
                self.nodes.insert(node.id.clone(), node);
                true
            }
        }
    }

    /// Insert an edge. Missing endpoints are added as placeholder nodes one
    /// hop further than the endpoint that is present. Returns true when the
    /// edge was new; node value totals only move for new edges.
    pub fn add_edge(&mut self, edge: Edge) -> bool {
        let key = edge.key();
        if self.edges.contains_key(&key) {
            return false;
        }

        self.ensure_endpoint(&edge.source, &edge.destination);
        self.ensure_endpoint(&edge.destination, &edge.source);

        if let Some(source) = self.nodes.get_mut(&edge.source) {
            source.total_out += edge.value;
            source.observe_height(edge.block_height);
        }
        if let Some(destination) = self.nodes.get_mut(&edge.destination) {
            destination.total_in += edge.value;
            destination.observe_height(edge.block_height);
        }

        self.link(&edge);
        self.edges.insert(key, edge);
        true
    }

    fn ensure_endpoint(&mut self, id: &str, other: &str) {
        if self.nodes.contains_key(id) {
            return;
        }
        let depth = self
            .nodes
            .get(other)
            .map(|node| node.depth.saturating_add(1))
            .unwrap_or(0);
        self.nodes.insert(id.to_string(), Address::at_depth(id, depth));
    }

    fn link(&mut self, edge: &Edge) {
        self.adjacency
            .entry(edge.source.clone())
            .or_default()
            .insert(edge.destination.clone());
        self.adjacency
            .entry(edge.destination.clone())
            .or_default()
            .insert(edge.source.clone());
    }

    /// Addresses sharing at least one edge with `address`, in either direction
    pub fn neighbors(&self, address: &str) -> BTreeSet<String> {
        self.adjacency
            .get(&normalize_address(address))
            .cloned()
            .unwrap_or_default()
    }

    pub fn contains_node(&self, address: &str) -> bool {
        self.nodes.contains_key(&normalize_address(address))
    }

    pub fn node(&self, address: &str) -> Option<&Address> {
        self.nodes.get(&normalize_address(address))
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    pub fn mark_expanded(&mut self, address: &str) {
        if let Some(node) = self.nodes.get_mut(&normalize_address(address)) {
            node.expanded = true;
        }
    }

    /// Set a node's label unless it already has one. Returns true when applied.
    pub fn annotate_label(&mut self, address: &str, label: &str) -> bool {
        match self.nodes.get_mut(&normalize_address(address)) {
            Some(node) if node.label.is_none() => {
                node.label = Some(label.to_string());
                true
            }
            _ => false,
        }
    }

    pub fn mark_contract(&mut self, address: &str) {
        if let Some(node) = self.nodes.get_mut(&normalize_address(address)) {
            node.is_contract = true;
        }
    }

    /// Addresses already expanded in this store
    pub fn expanded_addresses(&self) -> BTreeSet<String> {
        self.nodes
            .values()
            .filter(|node| node.expanded)
            .map(|node| node.id.clone())
            .collect()
    }

    pub fn export(&self) -> Graph {
        Graph {
            nodes: self.nodes.values().cloned().collect(),
            edges: self.edges.values().cloned().collect(),
        }
    }
}
