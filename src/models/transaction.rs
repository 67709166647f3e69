use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::models::address::normalize_address;

/// One side of a transaction: an address and the value it sent or received
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TxLeg {
    pub address: String,
    pub value: f64,
}

impl TxLeg {
    pub fn new(address: &str, value: f64) -> Self {
        Self {
            address: normalize_address(address),
            value,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Transaction {
    pub hash: String,
    pub block_height: u64,
    /// Unix seconds, when the source provides it
    pub timestamp: Option<i64>,
    /// Asset symbol; `None` for unnamed tokens
    pub asset: Option<String>,
    pub inputs: Vec<TxLeg>,
    pub outputs: Vec<TxLeg>,
}

/// Edge identity: (tx hash, source, destination)
pub type EdgeKey = (String, String, String);

/// A value transfer between two addresses, derived from a transaction
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Edge {
    pub source: String,
    pub destination: String,
    pub value: f64,
    pub tx_hash: String,
    pub block_height: u64,
    pub asset: Option<String>,
}

impl Transaction {
    /// Single-input single-output transfer, the shape account-based chains produce
    pub fn transfer(hash: &str, block_height: u64, from: &str, to: &str, value: f64) -> Self {
        Self {
            hash: hash.to_lowercase(),
            block_height,
            timestamp: None,
            asset: None,
            inputs: vec![TxLeg::new(from, value)],
            outputs: vec![TxLeg::new(to, value)],
        }
    }

    pub fn with_asset(mut self, asset: &str) -> Self {
        self.asset = Some(asset.to_string());
        self
    }

    pub fn with_timestamp(mut self, timestamp: i64) -> Self {
        self.timestamp = Some(timestamp);
        self
    }

    /// Same transaction with normalized leg addresses and a lowercase hash,
    /// for records that did not go through the constructors (e.g. deserialized)
    pub fn normalized(mut self) -> Self {
        self.hash = self.hash.trim().to_lowercase();
        for leg in self.inputs.iter_mut().chain(self.outputs.iter_mut()) {
            leg.address = normalize_address(&leg.address);
        }
        self
    }

    /// All participant addresses, sorted and de-duplicated
    pub fn participants(&self) -> Vec<String> {
        let mut addresses: Vec<String> = self
            .inputs
            .iter()
            .chain(self.outputs.iter())
            .map(|leg| leg.address.clone())
            .collect();
        addresses.sort();
        addresses.dedup();
        addresses
    }

    /// Derive edges from every (input, output) pair.
    ///
    /// Each output's value is attributed to the inputs in proportion to what
    /// they contributed. With a zero total input the output is split evenly.
    /// Self transfers produce no edge. Repeated pairs are summed.
    pub fn derive_edges(&self) -> Vec<Edge> {
        let total_in: f64 = self.inputs.iter().map(|leg| leg.value).sum();
        let input_count = self.inputs.len() as f64;
        let mut pairs: BTreeMap<(String, String), f64> = BTreeMap::new();

        for input in &self.inputs {
            let share = if self.inputs.len() == 1 {
                1.0
            } else if total_in > 0.0 {
                input.value / total_in
            } else {
                1.0 / input_count
            };

            for output in &self.outputs {
                if input.address == output.address {
                    continue;
                }
                *pairs
                    .entry((input.address.clone(), output.address.clone()))
                    .or_insert(0.0) += output.value * share;
            }
        }

        pairs
            .into_iter()
            .map(|((source, destination), value)| Edge {
                source,
                destination,
                value,
                tx_hash: self.hash.clone(),
                block_height: self.block_height,
                asset: self.asset.clone(),
            })
            .collect()
    }

    /// Edges with `address` at one end
    pub fn edges_touching(&self, address: &str) -> Vec<Edge> {
        self.derive_edges()
            .into_iter()
            .filter(|edge| edge.source == address || edge.destination == address)
            .collect()
    }
}

impl Edge {
    pub fn key(&self) -> EdgeKey {
        (self.tx_hash.clone(), self.source.clone(), self.destination.clone())
    }

    /// The other endpoint, if `address` is one of the two
    pub fn counterpart(&self, address: &str) -> Option<&str> {
        if self.source == address {
            Some(&self.destination)
        } else if self.destination == address {
            Some(&self.source)
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transfer_derives_single_edge() {
        let tx = Transaction::transfer("0xT1", 10, "0xA", "0xB", 5.0).with_asset("ETH");
        let edges = tx.derive_edges();

        assert_eq!(edges.len(), 1);
        assert_eq!(edges[0].source, "0xa");
        assert_eq!(edges[0].destination, "0xb");
        assert_eq!(edges[0].value, 5.0);
        assert_eq!(edges[0].tx_hash, "0xt1");
        assert_eq!(edges[0].asset.as_deref(), Some("ETH"));
    }

    #[test]
    fn test_self_transfer_has_no_edge() {
        let tx = Transaction::transfer("0xt", 1, "0xa", "0xa", 3.0);
        assert!(tx.derive_edges().is_empty());
    }

    #[test]
    fn test_multi_input_split_is_proportional() {
        let tx = Transaction {
            hash: "tx".to_string(),
            block_height: 7,
            timestamp: None,
            asset: Some("BTC".to_string()),
            inputs: vec![TxLeg::new("a", 3.0), TxLeg::new("b", 1.0)],
            outputs: vec![TxLeg::new("c", 2.0), TxLeg::new("a", 2.0)],
        };
        let edges = tx.derive_edges();

        // a->c 1.5, b->a 0.5, b->c 0.5 ; a->a is dropped
        assert_eq!(edges.len(), 3);
        let find = |s: &str, d: &str| {
            edges
                .iter()
                .find(|e| e.source == s && e.destination == d)
                .map(|e| e.value)
        };
        assert_eq!(find("a", "c"), Some(1.5));
        assert_eq!(find("b", "a"), Some(0.5));
        assert_eq!(find("b", "c"), Some(0.5));
    }

    #[test]
    fn test_zero_input_value_splits_evenly() {
        let tx = Transaction {
            hash: "tx".to_string(),
            block_height: 1,
            timestamp: None,
            asset: None,
            inputs: vec![TxLeg::new("a", 0.0), TxLeg::new("b", 0.0)],
            outputs: vec![TxLeg::new("c", 4.0)],
        };
        let edges = tx.derive_edges();
        assert_eq!(edges.len(), 2);
        assert!(edges.iter().all(|e| e.value == 2.0));
    }

    #[test]
    fn test_edges_touching_and_counterpart() {
        let tx = Transaction {
            hash: "tx".to_string(),
            block_height: 1,
            timestamp: None,
            asset: None,
            inputs: vec![TxLeg::new("a", 1.0), TxLeg::new("b", 1.0)],
            outputs: vec![TxLeg::new("c", 2.0)],
        };
        let edges = tx.edges_touching("a");
        assert_eq!(edges.len(), 1);
        assert_eq!(edges[0].counterpart("a"), Some("c"));
        assert_eq!(edges[0].counterpart("c"), Some("a"));
        assert_eq!(edges[0].counterpart("z"), None);
    }

    #[test]
    fn test_normalized_lowercases_hex_legs_and_hash() {
        let raw: Transaction = serde_json::from_value(serde_json::json!({
            "hash": "0xABCD",
            "block_height": 3,
            "timestamp": null,
            "asset": "ETH",
            "inputs": [{ "address": " 0xAbC ", "value": 5.0 }],
            "outputs": [{ "address": "0xDeF", "value": 5.0 }]
        }))
        .unwrap();
        assert_eq!(raw.inputs[0].address, " 0xAbC ");

        let tx = raw.normalized();
        assert_eq!(tx.hash, "0xabcd");
        assert_eq!(tx.participants(), vec!["0xabc".to_string(), "0xdef".to_string()]);
        assert_eq!(tx.edges_touching("0xabc").len(), 1);
    }

    #[test]
    fn test_participants_sorted_unique() {
        let tx = Transaction::transfer("h", 1, "0xb", "0xa", 1.0);
        assert_eq!(tx.participants(), vec!["0xa".to_string(), "0xb".to_string()]);
    }
}
