pub mod address;
pub mod transaction;
pub mod graph;
pub mod labels;
pub mod flow;

pub use address::{normalize_address, short_address, Address};
pub use transaction::{Edge, EdgeKey, Transaction, TxLeg};
pub use graph::Graph;
pub use labels::{AddressInfo, LabelBook, EXCHANGE_ADDRESSES};
pub use flow::{FlowCalculator, LabelFlow};
