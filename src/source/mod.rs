pub mod memory;
pub mod rpc;

use async_trait::async_trait;
use std::collections::HashMap;

use crate::error::SourceError;
use crate::models::{AddressInfo, Transaction};

pub use memory::MemorySource;
pub use rpc::RpcSource;

/// Where transaction history comes from.
///
/// Implementations report failures as they happen and never retry
/// internally; the traversal driver owns retry policy.
#[async_trait]
pub trait TransactionSource: Send + Sync {
    /// Every transaction the source knows in which `address` is an input or
    /// an output. `NotFound` when the address has no history.
    async fn fetch_transactions(&self, address: &str) -> Result<Vec<Transaction>, SourceError>;

    /// Labels and contract flags for `addresses`. Sources without that
    /// knowledge return an empty map.
    async fn lookup_labels(
        &self,
        _addresses: &[String],
    ) -> Result<HashMap<String, AddressInfo>, SourceError> {
        Ok(HashMap::new())
    }

    /// Short name used in logs
    fn name(&self) -> &str;
}
