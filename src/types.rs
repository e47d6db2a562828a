use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::amount::Amount;

/// unique identifier for a loan
pub type LoanId = Uuid;

/// identifier of a non-fungible token inside its collection
pub type TokenId = u64;

/// identity of an account on the value ledger or asset registry
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct AccountId(String);

impl AccountId {
    pub fn new(id: impl Into<String>) -> Self {
        AccountId(id.into())
    }

    /// escrow account owned by a loan, used as the collateral vault too
    pub fn escrow(loan_id: LoanId) -> Self {
        AccountId(format!("loan:{}", loan_id))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for AccountId {
    fn from(s: &str) -> Self {
        AccountId::new(s)
    }
}

/// reference to an nft collection on the asset registry
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct AssetId(String);

impl AssetId {
    pub fn new(id: impl Into<String>) -> Self {
        AssetId(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AssetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for AssetId {
    fn from(s: &str) -> Self {
        AssetId::new(s)
    }
}

/// opaque correlation token issued by the external ledger
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ClaimId(u64);

impl ClaimId {
    pub fn new(id: u64) -> Self {
        ClaimId(id)
    }

    pub fn value(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for ClaimId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for ClaimId {
    fn from(id: u64) -> Self {
        ClaimId(id)
    }
}

/// account on the far side of the bridge; never interpreted here
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ExternalAccount(String);

impl ExternalAccount {
    pub fn new(account: impl Into<String>) -> Self {
        ExternalAccount(account.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl fmt::Display for ExternalAccount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// bridge door reference forwarded to relayers
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BridgeEndpoint(String);

impl BridgeEndpoint {
    pub fn new(endpoint: impl Into<String>) -> Self {
        BridgeEndpoint(endpoint.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// account on the local ledger that receives committed value
    pub fn door_account(&self) -> AccountId {
        AccountId::new(format!("bridge:{}", self.0))
    }
}

impl fmt::Display for BridgeEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// loan status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LoanStatus {
    /// terms fixed, waiting for collateral and lender approval
    Created,
    /// lender approved the terms
    Activated,
    /// principal handed to the borrower, interest accruing
    Started,
    /// cross-ledger repayment in flight (bridge loans only)
    PrincipalRedeeming,
    /// principal fully repaid, lender still has balances to claim
    Redeemed,
    /// everything claimed
    Completed,
    /// withdrawn by the borrower before start
    Cancelled,
    /// deadline passed with the lender's principal still exposed
    Defaulted,
}

impl LoanStatus {
    /// forward-only transition graph
    pub fn can_transition_to(self, next: LoanStatus) -> bool {
        use LoanStatus::*;
        matches!(
            (self, next),
            (Created, Activated)
                | (Created, Cancelled)
                | (Activated, Started)
                | (Activated, Cancelled)
                | (Activated, Defaulted)
                | (Started, PrincipalRedeeming)
                | (Started, Redeemed)
                | (Started, Defaulted)
                | (PrincipalRedeeming, Redeemed)
                | (PrincipalRedeeming, Defaulted)
                | (Redeemed, Completed)
        )
    }

    /// no further transitions possible
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            LoanStatus::Completed | LoanStatus::Cancelled | LoanStatus::Defaulted
        )
    }

    /// principal is out with the borrower
    pub fn is_outstanding(self) -> bool {
        matches!(self, LoanStatus::Started | LoanStatus::PrincipalRedeeming)
    }
}

impl fmt::Display for LoanStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// which settlement path a loan uses
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LoanVariant {
    /// value moves directly between parties on one ledger
    Simple,
    /// value moves through a cross-ledger bridge
    Bridge,
}

/// result of a lend call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FundingStatus {
    /// lend recorded, required value not yet observed
    Pending,
    /// principal is held for the loan
    Funded,
}

/// result of a lender claim
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ClaimOutcome {
    /// value was paid out to the lender
    Paid { principal: Amount, interest: Amount },
    /// deadline had passed with principal outstanding; nothing moved
    Defaulted,
}
