pub mod amount;
pub mod collateral;
pub mod config;
pub mod errors;
pub mod events;
pub mod external;
pub mod interest;
pub mod lifecycle;
pub mod loan;
pub mod loans;
pub mod settlement;
pub mod state;
pub mod types;

// re-export key types
pub use amount::{Amount, Rate};
pub use collateral::{CollateralCustody, CollateralRecord, CustodyOwner};
pub use config::{BridgeConfig, InterestConfig, LoanConfig, LoanTerms, SettlementAsset};
pub use errors::{ErrorKind, LedgerError, LoanError, RegistryError, Result};
pub use events::{EventStore, LoanEvent};
pub use external::{
    AssetRegistry, BridgeCommit, CrossChainBridge, InMemoryLedger, InMemoryRegistry,
    TransferBatch, ValueLedger,
};
pub use interest::{AccrualCheckpoint, AccrualEngine, DayCountConvention, InterestCalculation};
pub use lifecycle::{Action, Parties, Role};
pub use loan::Loan;
pub use loans::{
    BridgeLoan, BridgeLoanBuilder, BridgeLoanView, LoanView, SimpleLoan, SimpleLoanBuilder,
};
pub use settlement::{CorrelationEntry, OperationKind, SettlementCorrelator, SettlementStatus};
pub use state::{LoanState, StateSnapshot};
pub use types::{
    AccountId, AssetId, BridgeEndpoint, ClaimId, ClaimOutcome, ExternalAccount, FundingStatus,
    LoanId, LoanStatus, LoanVariant, TokenId,
};

// re-export external dependencies that users will need
pub use chrono;
pub use hourglass_rs::{SafeTimeProvider, TimeSource};
pub use rust_decimal::Decimal;
pub use uuid::Uuid;
