use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::amount::Amount;
use crate::errors::{LoanError, Result};
use crate::interest::AccrualCheckpoint;
use crate::types::{LoanId, LoanStatus};

/// loan state
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoanState {
    // identification
    pub loan_id: LoanId,
    pub status: LoanStatus,

    // principal tracking
    /// principal held for the loan once funded
    pub principal: Amount,
    /// principal still out with the borrower
    pub current_principal: Amount,
    /// repaid principal the lender has not claimed yet
    pub withdrawable_principal: Amount,
    pub claimed_principal: Amount,

    // interest tracking
    pub checkpoint: AccrualCheckpoint,
    /// interest the borrower has paid so far
    pub paid_interest: Amount,
    /// interest the lender has withdrawn so far
    pub claimed_interest: Amount,

    // dates
    pub created_at: DateTime<Utc>,
    pub activated_at: Option<DateTime<Utc>>,
    pub started_at: Option<DateTime<Utc>>,
    pub redeemed_at: Option<DateTime<Utc>>,
    pub last_status_change: DateTime<Utc>,

    // bridge settlement
    pub lend_requested: bool,
    /// escrow balance that confirms an in-flight repayment
    pub redemption_target: Option<Amount>,
}

impl LoanState {
    pub fn new(loan_id: LoanId, created_at: DateTime<Utc>) -> Self {
        Self {
            loan_id,
            status: LoanStatus::Created,
            principal: Amount::ZERO,
            current_principal: Amount::ZERO,
            withdrawable_principal: Amount::ZERO,
            claimed_principal: Amount::ZERO,
            checkpoint: AccrualCheckpoint::empty(created_at),
            paid_interest: Amount::ZERO,
            claimed_interest: Amount::ZERO,
            created_at,
            activated_at: None,
            started_at: None,
            redeemed_at: None,
            last_status_change: created_at,
            lend_requested: false,
            redemption_target: None,
        }
    }

    /// move to `next`, rejecting anything off the forward graph
    pub fn update_status(&mut self, next: LoanStatus, timestamp: DateTime<Utc>) -> Result<()> {
        if !self.status.can_transition_to(next) {
            return Err(LoanError::InvalidTransition {
                from: self.status,
                to: next,
            });
        }

        match next {
            LoanStatus::Activated => self.activated_at = Some(timestamp),
            LoanStatus::Started => self.started_at = Some(timestamp),
            LoanStatus::Redeemed => self.redeemed_at = Some(timestamp),
            _ => {}
        }

        self.status = next;
        self.last_status_change = timestamp;
        Ok(())
    }

    pub fn is_funded(&self) -> bool {
        !self.principal.is_zero()
    }

    /// time after which the lender's exposure puts the loan in default
    ///
    /// Counted from the start of borrowing, or from approval for a loan
    /// the borrower never started.
    pub fn deadline(&self, duration: Duration) -> Option<DateTime<Utc>> {
        self.started_at
            .or(self.activated_at)
            .map(|from| from + duration)
    }

    /// past the deadline with funded or outstanding principal
    pub fn is_overdue(&self, duration: Duration, now: DateTime<Utc>) -> bool {
        let exposed = match self.status {
            LoanStatus::Activated => self.is_funded(),
            _ => !self.current_principal.is_zero(),
        };
        exposed && self.deadline(duration).map(|d| now > d).unwrap_or(false)
    }

    /// principal moved from outstanding to withdrawable
    pub fn record_redemption(&mut self, amount: Amount) -> Result<()> {
        self.current_principal = self.current_principal.checked_sub(amount).ok_or(
            LoanError::ExceedsOutstandingPrincipal {
                requested: amount,
                outstanding: self.current_principal,
            },
        )?;
        self.withdrawable_principal += amount;
        Ok(())
    }

    /// principal paid out to the lender
    pub fn record_principal_claim(&mut self, amount: Amount) {
        self.withdrawable_principal = self.withdrawable_principal.saturating_sub(amount);
        self.claimed_principal += amount;
    }

    /// outstanding, withdrawable and claimed principal add back to the original
    pub fn principal_conserved(&self, requested: Amount) -> bool {
        match self.status {
            LoanStatus::Created | LoanStatus::Activated | LoanStatus::Cancelled => true,
            LoanStatus::Defaulted if self.started_at.is_none() => true,
            _ => {
                self.current_principal
                    .checked_add(self.withdrawable_principal)
                    .and_then(|sum| sum.checked_add(self.claimed_principal))
                    == Some(requested)
            }
        }
    }

    /// nothing left for the lender to claim
    pub fn is_settled(&self, claimable_interest: Amount) -> bool {
        self.current_principal.is_zero()
            && self.withdrawable_principal.is_zero()
            && claimable_interest.is_zero()
    }
}

/// state snapshot for audit trail
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateSnapshot {
    pub snapshot_id: Uuid,
    pub loan_id: LoanId,
    pub timestamp: DateTime<Utc>,
    pub state: LoanState,
    pub trigger: String,
}

impl StateSnapshot {
    pub fn capture(state: &LoanState, trigger: String, timestamp: DateTime<Utc>) -> Self {
        Self {
            snapshot_id: Uuid::new_v4(),
            loan_id: state.loan_id,
            timestamp,
            state: state.clone(),
            trigger,
        }
    }
}
