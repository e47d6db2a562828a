use thiserror::Error;

use crate::amount::Amount;
use crate::lifecycle::{Action, Role};
use crate::settlement::OperationKind;
use crate::types::{AccountId, AssetId, ClaimId, LoanStatus, TokenId};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LoanError {
    #[error("unauthorized: {caller} cannot {action}, requires {required}")]
    Unauthorized {
        action: Action,
        caller: AccountId,
        required: Role,
    },

    #[error("invalid status: {action} not allowed while loan is {current}")]
    InvalidStatus {
        action: Action,
        current: LoanStatus,
    },

    #[error("invalid transition: {from} -> {to}")]
    InvalidTransition {
        from: LoanStatus,
        to: LoanStatus,
    },

    #[error("principal redemption still awaiting settlement")]
    RedemptionPending,

    #[error("amount must be greater than zero")]
    ZeroAmount,

    #[error("amount exceeds outstanding principal: requested {requested}, outstanding {outstanding}")]
    ExceedsOutstandingPrincipal {
        requested: Amount,
        outstanding: Amount,
    },

    #[error("nothing to claim")]
    NothingToClaim,

    #[error("collateral required for this operation")]
    CollateralRequired,

    #[error("collateral already deposited: {asset} #{token_id}")]
    CollateralAlreadyDeposited {
        asset: AssetId,
        token_id: TokenId,
    },

    #[error("no collateral in custody to release")]
    NothingToRelease,

    #[error("registry rejected transfer: {0}")]
    Registry(#[from] RegistryError),

    #[error("duplicate settlement: claim {claim_id} already used for {kind}")]
    DuplicateSettlement {
        kind: OperationKind,
        claim_id: ClaimId,
    },

    #[error("unknown settlement: no {kind} recorded for claim {claim_id}")]
    UnknownSettlement {
        kind: OperationKind,
        claim_id: ClaimId,
    },

    #[error("insufficient funding: observed {observed}, required {required}")]
    InsufficientFunding {
        observed: Amount,
        required: Amount,
    },

    #[error("ledger rejected transfer: {0}")]
    Ledger(#[from] LedgerError),

    #[error("invalid configuration: {message}")]
    InvalidConfiguration {
        message: String,
    },

    #[error("calculation overflow: {message}")]
    CalculationOverflow {
        message: String,
    },
}

/// coarse error classes callers can branch on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Authorization,
    StatusGuard,
    Amount,
    Custody,
    DuplicateSettlement,
    InsufficientFunding,
    Ledger,
    Configuration,
    Calculation,
}

impl LoanError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            LoanError::Unauthorized { .. } => ErrorKind::Authorization,
            LoanError::InvalidStatus { .. }
            | LoanError::InvalidTransition { .. }
            | LoanError::RedemptionPending => ErrorKind::StatusGuard,
            LoanError::ZeroAmount
            | LoanError::ExceedsOutstandingPrincipal { .. }
            | LoanError::NothingToClaim => ErrorKind::Amount,
            LoanError::CollateralRequired
            | LoanError::CollateralAlreadyDeposited { .. }
            | LoanError::NothingToRelease
            | LoanError::Registry(_) => ErrorKind::Custody,
            LoanError::DuplicateSettlement { .. } | LoanError::UnknownSettlement { .. } => {
                ErrorKind::DuplicateSettlement
            }
            LoanError::InsufficientFunding { .. } => ErrorKind::InsufficientFunding,
            LoanError::Ledger(_) => ErrorKind::Ledger,
            LoanError::InvalidConfiguration { .. } => ErrorKind::Configuration,
            LoanError::CalculationOverflow { .. } => ErrorKind::Calculation,
        }
    }
}

/// failures reported by a value ledger or bridge
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LedgerError {
    #[error("insufficient balance in {account}: available {available}, requested {requested}")]
    InsufficientBalance {
        account: AccountId,
        available: Amount,
        requested: Amount,
    },

    #[error("transfer rejected: {reason}")]
    Rejected {
        reason: String,
    },
}

/// failures reported by an asset registry
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    #[error("unknown token {asset} #{token_id}")]
    UnknownToken {
        asset: AssetId,
        token_id: TokenId,
    },

    #[error("{account} does not own {asset} #{token_id}")]
    NotOwner {
        asset: AssetId,
        token_id: TokenId,
        account: AccountId,
    },
}

pub type Result<T> = std::result::Result<T, LoanError>;
