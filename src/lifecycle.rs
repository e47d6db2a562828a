//! Transition table for loan operations.
//!
//! Every operation is an [`Action`]. An action names the [`Role`] allowed to
//! call it and the statuses it may start from; the loan checks both before
//! touching any state, so guard conditions live here and nowhere else.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::types::{AccountId, LoanStatus, LoanVariant};

/// who may invoke an action
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Role {
    Borrower,
    Lender,
    /// permissionless
    Anyone,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Borrower => write!(f, "borrower"),
            Role::Lender => write!(f, "lender"),
            Role::Anyone => write!(f, "anyone"),
        }
    }
}

/// loan operations
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Action {
    DepositCollateral,
    ApproveLoanTerm,
    Lend,
    StartBorrowing,
    CancelBorrowing,
    RedeemPartialPrincipal,
    RedeemFullPrincipal,
    /// bridge loans: request a cross-ledger repayment
    RedeemPrincipal,
    /// bridge loans: observe that the repayment arrived
    ConfirmRedemption,
    ClaimPrincipal,
    ClaimInterest,
    WithdrawCollateral,
    LiquidateCollateral,
}

impl Action {
    pub fn role(self) -> Role {
        use Action::*;
        match self {
            DepositCollateral
            | StartBorrowing
            | CancelBorrowing
            | RedeemPartialPrincipal
            | RedeemFullPrincipal
            | RedeemPrincipal
            | WithdrawCollateral => Role::Borrower,
            ApproveLoanTerm | Lend | ClaimPrincipal | ClaimInterest => Role::Lender,
            ConfirmRedemption | LiquidateCollateral => Role::Anyone,
        }
    }

    /// statuses this action may be invoked from
    pub fn sources(self) -> &'static [LoanStatus] {
        use Action::*;
        use LoanStatus::*;
        match self {
            DepositCollateral | ApproveLoanTerm => &[Created],
            Lend | StartBorrowing => &[Activated],
            CancelBorrowing => &[Created, Activated],
            RedeemPartialPrincipal | RedeemFullPrincipal | RedeemPrincipal => &[Started],
            ConfirmRedemption => &[PrincipalRedeeming],
            ClaimPrincipal | ClaimInterest => &[Activated, Started, PrincipalRedeeming, Redeemed],
            WithdrawCollateral => &[Redeemed, Completed, Cancelled],
            LiquidateCollateral => &[Defaulted],
        }
    }

    /// whether the settlement variant offers this action at all
    pub fn available_for(self, variant: LoanVariant) -> bool {
        use Action::*;
        match variant {
            LoanVariant::Simple => !matches!(self, RedeemPrincipal | ConfirmRedemption),
            LoanVariant::Bridge => !matches!(self, RedeemPartialPrincipal | RedeemFullPrincipal),
        }
    }

    pub fn allowed_from(self, status: LoanStatus) -> bool {
        self.sources().contains(&status)
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// the two fixed parties of a loan
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Parties {
    pub borrower: AccountId,
    pub lender: AccountId,
    /// destination for liquidated collateral
    pub liquidator: AccountId,
}

impl Parties {
    /// check the caller holds the role
    pub fn permits(&self, role: Role, caller: &AccountId) -> bool {
        match role {
            Role::Borrower => caller == &self.borrower,
            Role::Lender => caller == &self.lender,
            Role::Anyone => true,
        }
    }
}
