use serde::{Deserialize, Serialize};

/// Normalize an address identifier.
///
/// Hex addresses (`0x...`) are case-insensitive and are lowercased with a
/// lowercase prefix. Anything else (base58, bech32 with mixed case) is only
/// trimmed, since case carries meaning there.
pub fn normalize_address(address: &str) -> String {
    let trimmed = address.trim();
    if trimmed.starts_with("0x") || trimmed.starts_with("0X") {
        format!("0x{}", trimmed[2..].to_lowercase())
    } else {
        trimmed.to_string()
    }
}

/// Short display form used when no label is known, e.g. `0x1…acec`
pub fn short_address(address: &str) -> String {
    let chars: Vec<char> = address.chars().collect();
    if chars.len() <= 10 {
        return address.to_string();
    }
    let head: String = chars[..3].iter().collect();
    let tail: String = chars[chars.len() - 4..].iter().collect();
    format!("{}…{}", head, tail)
}

/// A graph node: one address plus the annotations gathered while exploring
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Address {
    pub id: String,
    /// Lowest block height at which this address was seen in an accepted edge
    pub first_seen_height: Option<u64>,
    pub total_in: f64,
    pub total_out: f64,
    pub label: Option<String>,
    pub is_contract: bool,
    /// Hops from the nearest seed when the node was first added
    pub depth: u32,
    pub expanded: bool,
}

impl Address {
    pub fn new(id: &str) -> Self {
        Self::at_depth(id, 0)
    }

    pub fn at_depth(id: &str, depth: u32) -> Self {
        Self {
            id: normalize_address(id),
            first_seen_height: None,
            total_in: 0.0,
            total_out: 0.0,
            label: None,
            is_contract: false,
            depth,
            expanded: false,
        }
    }

    pub fn with_label(mut self, label: &str) -> Self {
        self.label = Some(label.to_string());
        self
    }

    pub fn with_contract(mut self, is_contract: bool) -> Self {
        self.is_contract = is_contract;
        self
    }

    /// Label if one is known, otherwise the shortened address
    pub fn display_label(&self) -> String {
        self.label.clone().unwrap_or_else(|| short_address(&self.id))
    }

    pub fn observe_height(&mut self, height: u64) {
        self.first_seen_height = Some(match self.first_seen_height {
            Some(current) => current.min(height),
            None => height,
        });
    }

    /// Merge annotations from a rediscovered copy of the same address.
    /// Existing labels win; value totals are driven by edges, not merged here.
    pub fn merge(&mut self, other: &Address) {
        if self.label.is_none() {
            self.label = other.label.clone();
        }
        self.is_contract |= other.is_contract;
        self.expanded |= other.expanded;
        self.depth = self.depth.min(other.depth);
        if let Some(height) = other.first_seen_height {
            self.observe_height(height);
        }
    }
}
