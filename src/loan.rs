use chrono::{DateTime, Utc};
use hourglass_rs::SafeTimeProvider;
use uuid::Uuid;

use crate::amount::Amount;
use crate::collateral::{CollateralCustody, CollateralRecord};
use crate::config::LoanConfig;
use crate::errors::{LoanError, Result};
use crate::events::{EventStore, LoanEvent};
use crate::external::AssetRegistry;
use crate::interest::{AccrualCheckpoint, AccrualEngine, InterestCalculation};
use crate::lifecycle::Action;
use crate::settlement::SettlementCorrelator;
use crate::state::{LoanState, StateSnapshot};
use crate::types::{AccountId, AssetId, LoanId, LoanStatus, LoanVariant, TokenId};

/// core loan struct shared by both settlement variants
///
/// Operations validate everything first, then run external effects, and
/// commit local state last. A failed call leaves the loan untouched.
#[derive(Debug, Clone)]
pub struct Loan {
    pub id: LoanId,
    pub config: LoanConfig,
    pub state: LoanState,
    pub custody: CollateralCustody,
    pub settlements: SettlementCorrelator,
    pub events: EventStore,
    pub snapshots: Vec<StateSnapshot>,
}

impl Loan {
    /// create a loan from validated configuration
    pub fn create(config: LoanConfig, time_provider: &SafeTimeProvider) -> Result<Self> {
        config.validate()?;

        let id = Uuid::new_v4();
        let now = time_provider.now();

        let mut loan = Self {
            id,
            state: LoanState::new(id, now),
            custody: CollateralCustody::new(AccountId::escrow(id)),
            settlements: SettlementCorrelator::new(),
            events: EventStore::new(),
            snapshots: Vec::new(),
            config,
        };

        loan.events.emit(LoanEvent::LoanCreated {
            loan_id: id,
            borrower: loan.config.parties.borrower.clone(),
            lender: loan.config.parties.lender.clone(),
            requested_principal: loan.config.terms.requested_principal,
            timestamp: now,
        });

        tracing::info!(
            loan_id = %id,
            variant = ?loan.config.variant(),
            principal = %loan.config.terms.requested_principal,
            rate = %loan.config.terms.annual_rate,
            "loan created"
        );

        loan.snapshot("created", now);
        Ok(loan)
    }

    pub fn variant(&self) -> LoanVariant {
        self.config.variant()
    }

    pub fn status(&self) -> LoanStatus {
        self.state.status
    }

    /// account holding escrowed value and collateral
    pub fn escrow(&self) -> AccountId {
        AccountId::escrow(self.id)
    }

    /// check the caller's role, then the current status
    pub fn authorize(&self, action: Action, caller: &AccountId) -> Result<()> {
        let required = action.role();
        if !self.config.parties.permits(required, caller) {
            return Err(LoanError::Unauthorized {
                action,
                caller: caller.clone(),
                required,
            });
        }

        if !action.available_for(self.variant()) || !action.allowed_from(self.state.status) {
            return Err(LoanError::InvalidStatus {
                action,
                current: self.state.status,
            });
        }

        Ok(())
    }

    pub fn engine(&self) -> AccrualEngine {
        self.config.accrual_engine()
    }

    /// total interest accrued since start
    pub fn accrued_interest(&self, now: DateTime<Utc>) -> Result<Amount> {
        self.engine().accrued_interest(&self.state.checkpoint, now)
    }

    /// accrued interest the lender has not withdrawn
    pub fn claimable_interest(&self, now: DateTime<Utc>) -> Result<Amount> {
        self.engine()
            .claimable_interest(&self.state.checkpoint, self.state.claimed_interest, now)
    }

    /// accrued interest the borrower has not paid
    pub fn unpaid_interest(&self, now: DateTime<Utc>) -> Result<Amount> {
        Ok(self
            .accrued_interest(now)?
            .saturating_sub(self.state.paid_interest))
    }

    /// interest accrued since the last checkpoint
    pub fn interest_since_checkpoint(&self, now: DateTime<Utc>) -> Result<InterestCalculation> {
        self.engine().calculate_interest(
            self.state.checkpoint.principal,
            self.state.checkpoint.timestamp,
            now,
        )
    }

    pub fn deadline(&self) -> Option<DateTime<Utc>> {
        self.state.deadline(self.config.duration())
    }

    /// lock the borrower's token in the loan vault
    pub fn deposit_collateral(
        &mut self,
        registry: &mut dyn AssetRegistry,
        caller: &AccountId,
        asset: AssetId,
        token_id: TokenId,
        time_provider: &SafeTimeProvider,
    ) -> Result<()> {
        self.authorize(Action::DepositCollateral, caller)?;
        let now = time_provider.now();

        self.custody
            .deposit(registry, asset.clone(), token_id, caller, now)?;

        self.events.emit(LoanEvent::CollateralDeposited {
            loan_id: self.id,
            asset,
            token_id,
            timestamp: now,
        });
        self.snapshot("collateral deposited", now);
        Ok(())
    }

    /// lender accepts the terms; collateral must already be in custody
    pub fn approve_loan_term(
        &mut self,
        caller: &AccountId,
        time_provider: &SafeTimeProvider,
    ) -> Result<()> {
        self.authorize(Action::ApproveLoanTerm, caller)?;
        if !self.custody.is_held() {
            return Err(LoanError::CollateralRequired);
        }

        let now = time_provider.now();
        self.transition(LoanStatus::Activated, "loan term approved", now)?;
        self.events.emit(LoanEvent::LoanTermApproved {
            loan_id: self.id,
            timestamp: now,
        });
        self.snapshot("loan term approved", now);
        Ok(())
    }

    /// borrower takes the token back after redemption or cancellation
    pub fn withdraw_collateral(
        &mut self,
        registry: &mut dyn AssetRegistry,
        caller: &AccountId,
        time_provider: &SafeTimeProvider,
    ) -> Result<CollateralRecord> {
        self.authorize(Action::WithdrawCollateral, caller)?;
        let now = time_provider.now();

        let borrower = self.config.parties.borrower.clone();
        let record = self.release_collateral(registry, &borrower, now)?;
        self.snapshot("collateral withdrawn", now);
        Ok(record)
    }

    /// send a defaulted loan's token to the liquidator
    pub fn liquidate_collateral(
        &mut self,
        registry: &mut dyn AssetRegistry,
        caller: &AccountId,
        time_provider: &SafeTimeProvider,
    ) -> Result<CollateralRecord> {
        self.authorize(Action::LiquidateCollateral, caller)?;
        let now = time_provider.now();

        let liquidator = self.config.parties.liquidator.clone();
        let record = self.custody.release(registry, &liquidator, now)?;

        tracing::warn!(
            loan_id = %self.id,
            asset = %record.asset,
            token_id = record.token_id,
            liquidator = %liquidator,
            "collateral liquidated"
        );
        self.events.emit(LoanEvent::CollateralLiquidated {
            loan_id: self.id,
            asset: record.asset.clone(),
            token_id: record.token_id,
            liquidator,
            timestamp: now,
        });
        self.snapshot("collateral liquidated", now);
        Ok(record)
    }

    pub(crate) fn release_collateral(
        &mut self,
        registry: &mut dyn AssetRegistry,
        to: &AccountId,
        now: DateTime<Utc>,
    ) -> Result<CollateralRecord> {
        let record = self.custody.release(registry, to, now)?;
        self.events.emit(LoanEvent::CollateralReleased {
            loan_id: self.id,
            asset: record.asset.clone(),
            token_id: record.token_id,
            to: to.clone(),
            timestamp: now,
        });
        Ok(record)
    }

    pub(crate) fn transition(
        &mut self,
        next: LoanStatus,
        reason: &str,
        now: DateTime<Utc>,
    ) -> Result<()> {
        let old_status = self.state.status;
        self.state.update_status(next, now)?;

        tracing::info!(loan_id = %self.id, from = %old_status, to = %next, reason, "loan status changed");
        self.events.emit(LoanEvent::StatusChanged {
            loan_id: self.id,
            old_status,
            new_status: next,
            reason: reason.to_string(),
            timestamp: now,
        });
        Ok(())
    }

    /// put the loan in default if its deadline passed with principal exposed
    ///
    /// Only lender claims call this; it moves no value. A loan that was
    /// funded but never started is refunded by the variant before this runs.
    pub(crate) fn default_if_overdue(&mut self, now: DateTime<Utc>) -> Result<bool> {
        if !self.state.status.can_transition_to(LoanStatus::Defaulted)
            || !self.state.is_overdue(self.config.duration(), now)
        {
            return Ok(false);
        }

        let deadline = self.deadline().unwrap_or(now);
        let outstanding_principal = self.state.current_principal;
        self.transition(LoanStatus::Defaulted, "deadline passed", now)?;

        tracing::warn!(
            loan_id = %self.id,
            outstanding = %outstanding_principal,
            deadline = %deadline,
            "loan defaulted"
        );
        self.events.emit(LoanEvent::LoanDefaulted {
            loan_id: self.id,
            outstanding_principal,
            deadline,
            timestamp: now,
        });
        self.snapshot("defaulted", now);
        Ok(true)
    }

    /// funded, never started, and past the deadline
    pub(crate) fn overdue_before_start(&self, now: DateTime<Utc>) -> bool {
        self.state.status == LoanStatus::Activated
            && self.state.is_overdue(self.config.duration(), now)
    }

    /// escrowed funding went back to the lender
    pub(crate) fn record_funding_refund(&mut self, amount: Amount, now: DateTime<Utc>) {
        self.state.principal = Amount::ZERO;
        tracing::info!(loan_id = %self.id, amount = %amount, "funding refunded to lender");
        self.events.emit(LoanEvent::FundingRefunded {
            loan_id: self.id,
            amount,
            timestamp: now,
        });
        self.snapshot("funding refunded", now);
    }

    /// principal handed to the borrower; accrual starts now
    pub(crate) fn begin(&mut self, now: DateTime<Utc>) -> Result<()> {
        let principal = self.config.terms.requested_principal;
        self.transition(LoanStatus::Started, "borrowing started", now)?;

        self.state.current_principal = principal;
        self.state.checkpoint = AccrualCheckpoint {
            timestamp: now,
            principal,
            accumulated: Amount::ZERO,
        };

        self.events.emit(LoanEvent::BorrowingStarted {
            loan_id: self.id,
            principal,
            deadline: now + self.config.duration(),
            timestamp: now,
        });
        Ok(())
    }

    /// settle interest at the current principal and restart from `new_principal`
    pub(crate) fn next_checkpoint(
        &self,
        now: DateTime<Utc>,
        new_principal: Amount,
    ) -> Result<AccrualCheckpoint> {
        self.engine()
            .checkpoint(&self.state.checkpoint, now, new_principal)
    }

    /// commit a redemption computed with [`Loan::next_checkpoint`]
    pub(crate) fn apply_redemption(
        &mut self,
        amount: Amount,
        checkpoint: AccrualCheckpoint,
        now: DateTime<Utc>,
    ) -> Result<()> {
        self.state.record_redemption(amount)?;
        self.state.checkpoint = checkpoint;

        tracing::debug!(
            loan_id = %self.id,
            accumulated = %checkpoint.accumulated,
            principal = %checkpoint.principal,
            "interest checkpointed"
        );
        self.events.emit(LoanEvent::InterestCheckpointed {
            loan_id: self.id,
            accumulated: checkpoint.accumulated,
            principal: checkpoint.principal,
            timestamp: checkpoint.timestamp,
        });
        self.events.emit(LoanEvent::PrincipalRedeemed {
            loan_id: self.id,
            amount,
            remaining: self.state.current_principal,
            timestamp: now,
        });
        Ok(())
    }

    /// mark a redeemed loan completed once the lender has nothing left
    pub(crate) fn try_complete(&mut self, now: DateTime<Utc>) -> Result<bool> {
        if self.state.status != LoanStatus::Redeemed {
            return Ok(false);
        }
        if !self.state.is_settled(self.claimable_interest(now)?) {
            return Ok(false);
        }

        self.transition(LoanStatus::Completed, "all balances claimed", now)?;
        self.events.emit(LoanEvent::LoanCompleted {
            loan_id: self.id,
            timestamp: now,
        });
        Ok(true)
    }

    pub(crate) fn snapshot(&mut self, trigger: &str, now: DateTime<Utc>) {
        self.snapshots
            .push(StateSnapshot::capture(&self.state, trigger.to_string(), now));
    }
}
