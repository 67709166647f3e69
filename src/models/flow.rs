use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

use crate::models::Graph;

/// Aggregated flow between two label groups.
///
/// `net_volume` is positive when more value moved from `from_label` to
/// `to_label` than the other way around.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LabelFlow {
    pub from_label: String,
    pub to_label: String,
    pub volume: f64,
    pub net_volume: f64,
    pub transaction_count: u32,
}

pub struct FlowCalculator;

impl FlowCalculator {
    /// Group edges by the display labels of their endpoints.
    ///
    /// Each unordered label pair appears once, oriented so that the net
    /// volume is non-negative. Pairs are sorted by volume, largest first.
    pub fn label_flows(graph: &Graph) -> Vec<LabelFlow> {
        let labels: HashMap<&str, String> = graph
            .nodes
            .iter()
            .map(|node| (node.id.as_str(), node.display_label()))
            .collect();

        // (a, b) with a <= b -> (a to b, b to a, count)
        let mut totals: BTreeMap<(String, String), (f64, f64, u32)> = BTreeMap::new();

        for edge in &graph.edges {
            let (Some(from), Some(to)) = (
                labels.get(edge.source.as_str()),
                labels.get(edge.destination.as_str()),
            ) else {
                continue;
            };

            let forward = from <= to;
            let key = if forward {
                (from.clone(), to.clone())
            } else {
                (to.clone(), from.clone())
            };
            let entry = totals.entry(key).or_insert((0.0, 0.0, 0));
            if forward {
                entry.0 += edge.value;
            } else {
                entry.1 += edge.value;
            }
            entry.2 += 1;
        }

        let mut flows: Vec<LabelFlow> = totals
            .into_iter()
            .map(|((a, b), (a_to_b, b_to_a, count))| {
                let volume = a_to_b + b_to_a;
                if a_to_b >= b_to_a {
                    LabelFlow {
                        from_label: a,
                        to_label: b,
                        volume,
                        net_volume: a_to_b - b_to_a,
                        transaction_count: count,
                    }
                } else {
                    LabelFlow {
                        from_label: b,
                        to_label: a,
                        volume,
                        net_volume: b_to_a - a_to_b,
                        transaction_count: count,
                    }
                }
            })
            .collect();

        flows.sort_by(|a, b| {
            b.volume
                .partial_cmp(&a.volume)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.from_label.cmp(&b.from_label))
                .then_with(|| a.to_label.cmp(&b.to_label))
        });
        flows
    }

    /// Net value received per node: `total_in - total_out`
    pub fn node_net_flows(graph: &Graph) -> BTreeMap<String, f64> {
        graph
            .nodes
            .iter()
            .map(|node| (node.id.clone(), node.total_in - node.total_out))
            .collect()
    }
}
