use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

use crate::models::address::normalize_address;
use crate::models::Address;

/// Well-known exchange hot wallets, lowercase with `0x` prefix
pub const EXCHANGE_ADDRESSES: &[(&str, &str)] = &[
    ("0xf977814e90da44bfa03b6295a0616a897441acec", "Binance"),
    ("0xe7804c37c13166ff0b37f5ae0bb07a3aebb6e245", "Binance"),
    ("0x505e71695e9bc45943c58adec1650577bca68fd9", "Binance"),
    ("0x290275e3db66394c52272398959845170e4dcb88", "Binance"),
    ("0xd5c08681719445a5fdce2bda98b341a49050d821", "Binance"),
    ("0x082489a616ab4d46d1947ee3f912e080815b08da", "Binance"),
];

/// Pre-computed map for O(1) lookups
static EXCHANGE_LABELS: Lazy<HashMap<&'static str, &'static str>> =
    Lazy::new(|| EXCHANGE_ADDRESSES.iter().copied().collect());

/// What a data source knows about an address beyond its transactions
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct AddressInfo {
    pub label: Option<String>,
    pub is_contract: bool,
}

/// Address annotations from three places, in priority order:
/// user tags, source-provided labels, built-in exchange labels.
#[derive(Debug, Clone, Default)]
pub struct LabelBook {
    user_tags: HashMap<String, String>,
    source_labels: HashMap<String, String>,
    contracts: HashSet<String>,
    use_builtin: bool,
}

impl LabelBook {
    pub fn new() -> Self {
        Self::default()
    }

    /// Label book that also recognizes the built-in exchange wallets
    pub fn with_builtin() -> Self {
        Self {
            use_builtin: true,
            ..Self::default()
        }
    }

    pub fn from_tags(tags: &HashMap<String, String>, use_builtin: bool) -> Self {
        let mut book = Self {
            use_builtin,
            ..Self::default()
        };
        for (address, label) in tags {
            book.tag(address, label);
        }
        book
    }

    /// Attach a user-supplied tag
    pub fn tag(&mut self, address: &str, label: &str) {
        self.user_tags.insert(normalize_address(address), label.to_string());
    }

    /// Record what a data source reported about an address
    pub fn record(&mut self, address: &str, info: &AddressInfo) {
        let address = normalize_address(address);
        if let Some(label) = &info.label {
            self.source_labels.insert(address.clone(), label.clone());
        }
        if info.is_contract {
            self.contracts.insert(address);
        }
    }

    pub fn label_for(&self, address: &str) -> Option<String> {
        let address = normalize_address(address);
        self.user_tags
            .get(&address)
            .or_else(|| self.source_labels.get(&address))
            .cloned()
            .or_else(|| {
                if self.use_builtin {
                    EXCHANGE_LABELS.get(address.as_str()).map(|label| label.to_string())
                } else {
                    None
                }
            })
    }

    pub fn is_contract(&self, address: &str) -> bool {
        self.contracts.contains(&normalize_address(address))
    }

    /// Whether the address already has everything a lookup could add
    pub fn is_known(&self, address: &str) -> bool {
        let address = normalize_address(address);
        self.user_tags.contains_key(&address)
            || self.source_labels.contains_key(&address)
            || self.contracts.contains(&address)
    }

    /// Copy known annotations onto a node
    pub fn annotate(&self, mut node: Address) -> Address {
        if node.label.is_none() {
            node.label = self.label_for(&node.id);
        }
        node.is_contract |= self.is_contract(&node.id);
        node
    }

    pub fn is_exchange_address(address: &str) -> bool {
        EXCHANGE_LABELS.contains_key(normalize_address(address).as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exchange_address_detection() {
        assert!(LabelBook::is_exchange_address("0xF977814e90dA44bFA03b6295A0616a897441aceC"));
        assert!(LabelBook::is_exchange_address("0XF977814E90DA44BFA03B6295A0616A897441ACEC"));
        assert!(!LabelBook::is_exchange_address("0x1234567890abcdef1234567890abcdef12345678"));
        assert!(!LabelBook::is_exchange_address(""));
    }

    #[test]
    fn test_builtin_labels_are_opt_in() {
        let binance = "0xe7804c37c13166fF0b37F5aE0BB07A3aEbb6e245";
        assert_eq!(LabelBook::new().label_for(binance), None);
        assert_eq!(LabelBook::with_builtin().label_for(binance).as_deref(), Some("Binance"));
    }

    #[test]
    fn test_user_tag_beats_source_and_builtin() {
        let binance = "0xf977814e90da44bfa03b6295a0616a897441acec";
        let mut book = LabelBook::with_builtin();
        book.record(binance, &AddressInfo { label: Some("Hot wallet".to_string()), is_contract: false });
        assert_eq!(book.label_for(binance).as_deref(), Some("Hot wallet"));

        book.tag(binance, "Suspect");
        assert_eq!(book.label_for(binance).as_deref(), Some("Suspect"));
    }

    #[test]
    fn test_contract_recording_and_annotation() {
        let mut book = LabelBook::new();
        book.record("0xC0FFEE", &AddressInfo { label: Some("USDC".to_string()), is_contract: true });

        assert!(book.is_contract("0xc0ffee"));
        assert!(book.is_known("0xc0ffee"));

        let node = book.annotate(Address::new("0xc0ffee"));
        assert!(node.is_contract);
        assert_eq!(node.label.as_deref(), Some("USDC"));
    }

    #[test]
    fn test_from_tags_normalizes() {
        let mut tags = HashMap::new();
        tags.insert("0xABCDEF".to_string(), "Friend".to_string());
        let book = LabelBook::from_tags(&tags, false);
        assert_eq!(book.label_for("0xabcdef").as_deref(), Some("Friend"));
    }
}
