use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::Path;
use std::sync::Mutex;

use crate::error::{ConfigError, SourceError};
use crate::models::{normalize_address, AddressInfo, Transaction};
use crate::source::TransactionSource;

struct InjectedFailure {
    error: SourceError,
    /// Remaining failing calls; `None` fails forever
    remaining: Option<u32>,
}

/// In-memory transaction index.
///
/// Backs the `index_path` setting with a JSON file of transactions and
/// doubles as a scripted source in tests: failures can be injected per
/// address and every fetch is counted.
#[derive(Default)]
pub struct MemorySource {
    by_address: BTreeMap<String, Vec<Transaction>>,
    info: HashMap<String, AddressInfo>,
    failures: Mutex<HashMap<String, InjectedFailure>>,
    fetches: Mutex<HashMap<String, u32>>,
}

impl MemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_transactions(transactions: Vec<Transaction>) -> Self {
        let mut source = Self::new();
        for tx in transactions {
            source.insert(tx);
        }
        source
    }

    /// Load a JSON array of transactions
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path)
            .map_err(|_| ConfigError::FileNotFound(path.display().to_string()))?;
        let transactions: Vec<Transaction> = serde_json::from_str(&contents)
            .map_err(|e| ConfigError::Parsing(format!("{}: {}", path.display(), e)))?;
        Ok(Self::from_transactions(transactions))
    }

    /// Index a transaction under every participant
    pub fn insert(&mut self, tx: Transaction) {
        let tx = tx.normalized();
        for address in tx.participants() {
            let history = self.by_address.entry(address).or_default();
            if !history.contains(&tx) {
                history.push(tx.clone());
            }
        }
    }

    pub fn with_transaction(mut self, tx: Transaction) -> Self {
        self.insert(tx);
        self
    }

    pub fn with_label(mut self, address: &str, label: &str) -> Self {
        self.info.entry(normalize_address(address)).or_default().label = Some(label.to_string());
        self
    }

    pub fn with_contract(mut self, address: &str) -> Self {
        self.info.entry(normalize_address(address)).or_default().is_contract = true;
        self
    }

    /// Make fetches for `address` fail with `error`, for `times` calls or forever
    pub fn fail(&self, address: &str, error: SourceError, times: Option<u32>) {
        if let Ok(mut failures) = self.failures.lock() {
            failures.insert(
                normalize_address(address),
                InjectedFailure { error, remaining: times },
            );
        }
    }

    /// Number of `fetch_transactions` calls made for `address`
    pub fn fetch_count(&self, address: &str) -> u32 {
        self.fetches
            .lock()
            .map(|fetches| fetches.get(&normalize_address(address)).copied().unwrap_or(0))
            .unwrap_or(0)
    }

    pub fn total_fetches(&self) -> u32 {
        self.fetches
            .lock()
            .map(|fetches| fetches.values().sum())
            .unwrap_or(0)
    }

    pub fn address_count(&self) -> usize {
        self.by_address.len()
    }

    fn injected_failure(&self, address: &str) -> Option<SourceError> {
        let mut failures = self.failures.lock().ok()?;
        let failure = failures.get_mut(address)?;
        match failure.remaining {
            None => Some(failure.error.clone()),
            Some(0) => None,
            Some(ref mut remaining) => {
                *remaining -= 1;
                Some(failure.error.clone())
            }
        }
    }
}

#[async_trait]
impl TransactionSource for MemorySource {
    async fn fetch_transactions(&self, address: &str) -> Result<Vec<Transaction>, SourceError> {
        let address = normalize_address(address);
        if let Ok(mut fetches) = self.fetches.lock() {
            *fetches.entry(address.clone()).or_insert(0) += 1;
        }

        if let Some(error) = self.injected_failure(&address) {
            return Err(error);
        }

        match self.by_address.get(&address) {
            Some(history) if !history.is_empty() => Ok(history.clone()),
            _ => Err(SourceError::NotFound(address)),
        }
    }

    async fn lookup_labels(
        &self,
        addresses: &[String],
    ) -> Result<HashMap<String, AddressInfo>, SourceError> {
        Ok(addresses
            .iter()
            .map(|address| normalize_address(address))
            .filter_map(|address| self.info.get(&address).map(|info| (address, info.clone())))
            .collect())
    }

    fn name(&self) -> &str {
        "memory"
    }
}
