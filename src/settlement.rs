use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::amount::Amount;
use crate::errors::{LoanError, Result};
use crate::types::ClaimId;

/// bridge operations that carry a claim id
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum OperationKind {
    /// principal sent to the borrower on start
    LendCommit,
    InterestClaim,
    PrincipalClaim,
    /// funding returned to the lender on cancel
    CancelRefund,
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OperationKind::LendCommit => write!(f, "lend commit"),
            OperationKind::InterestClaim => write!(f, "interest claim"),
            OperationKind::PrincipalClaim => write!(f, "principal claim"),
            OperationKind::CancelRefund => write!(f, "cancel refund"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SettlementStatus {
    /// committed to the bridge, not yet acknowledged
    Pending,
    Confirmed,
}

/// one outbound settlement and its correlation id
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CorrelationEntry {
    pub kind: OperationKind,
    pub claim_id: ClaimId,
    pub amount: Amount,
    pub status: SettlementStatus,
    pub recorded_at: DateTime<Utc>,
    pub confirmed_at: Option<DateTime<Utc>>,
}

/// per-loan map of claim ids already consumed
///
/// A `(kind, claim_id)` pair can be recorded once. Callers check
/// [`SettlementCorrelator::ensure_unused`] before any side effect and call
/// [`SettlementCorrelator::record`] after the commit succeeded.
#[derive(Debug, Clone, Default)]
pub struct SettlementCorrelator {
    entries: BTreeMap<(OperationKind, ClaimId), CorrelationEntry>,
}

impl SettlementCorrelator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn ensure_unused(&self, kind: OperationKind, claim_id: ClaimId) -> Result<()> {
        if self.entries.contains_key(&(kind, claim_id)) {
            return Err(LoanError::DuplicateSettlement { kind, claim_id });
        }
        Ok(())
    }

    pub fn record(
        &mut self,
        kind: OperationKind,
        claim_id: ClaimId,
        amount: Amount,
        now: DateTime<Utc>,
    ) -> Result<&CorrelationEntry> {
        self.ensure_unused(kind, claim_id)?;

        Ok(&*self
            .entries
            .entry((kind, claim_id))
            .or_insert(CorrelationEntry {
                kind,
                claim_id,
                amount,
                status: SettlementStatus::Pending,
                recorded_at: now,
                confirmed_at: None,
            }))
    }

    /// acknowledge a settlement; confirming twice is a no-op
    ///
    /// Returns true if the entry moved from pending to confirmed.
    pub fn confirm(
        &mut self,
        kind: OperationKind,
        claim_id: ClaimId,
        now: DateTime<Utc>,
    ) -> Result<bool> {
        let entry = self
            .entries
            .get_mut(&(kind, claim_id))
            .ok_or(LoanError::UnknownSettlement { kind, claim_id })?;

        if entry.status == SettlementStatus::Confirmed {
            return Ok(false);
        }

        entry.status = SettlementStatus::Confirmed;
        entry.confirmed_at = Some(now);
        Ok(true)
    }

    pub fn get(&self, kind: OperationKind, claim_id: ClaimId) -> Option<&CorrelationEntry> {
        self.entries.get(&(kind, claim_id))
    }

    pub fn entries(&self) -> impl Iterator<Item = &CorrelationEntry> {
        self.entries.values()
    }

    pub fn pending(&self) -> impl Iterator<Item = &CorrelationEntry> {
        self.entries
            .values()
            .filter(|e| e.status == SettlementStatus::Pending)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
