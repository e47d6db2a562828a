pub mod bridge;
pub mod ledger;
pub mod registry;

pub use bridge::{BridgeCommit, CrossChainBridge};
pub use ledger::{InMemoryLedger, Transfer, TransferBatch, ValueLedger};
pub use registry::{AssetRegistry, InMemoryRegistry};
