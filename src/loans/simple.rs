use chrono::{DateTime, Duration, Utc};
use hourglass_rs::{SafeTimeProvider, TimeSource};

use crate::amount::{Amount, Rate};
use crate::collateral::CollateralRecord;
use crate::config::{LoanConfig, SettlementAsset};
use crate::errors::{LoanError, Result};
use crate::events::LoanEvent;
use crate::external::{AssetRegistry, TransferBatch, ValueLedger};
use crate::interest::DayCountConvention;
use crate::lifecycle::{Action, Parties};
use crate::loan::Loan;
use crate::state::LoanState;
use crate::types::{AccountId, AssetId, ClaimOutcome, FundingStatus, LoanId, LoanStatus, LoanVariant, TokenId};

/// loan settled directly between the parties on one value ledger
#[derive(Debug, Clone)]
pub struct SimpleLoan {
    loan: Loan,
}

/// interest position at one instant
struct InterestDue {
    accrued: Amount,
    /// owed by the borrower, not yet in escrow
    unpaid: Amount,
    /// owed to the lender
    claimable: Amount,
}

impl SimpleLoan {
    pub fn new(loan: Loan) -> Result<Self> {
        if loan.variant() != LoanVariant::Simple {
            return Err(LoanError::InvalidConfiguration {
                message: "Not a simple loan configuration".to_string(),
            });
        }
        Ok(Self { loan })
    }

    pub fn builder() -> SimpleLoanBuilder {
        SimpleLoanBuilder::new()
    }

    pub fn loan(&self) -> &Loan {
        &self.loan
    }

    pub fn id(&self) -> LoanId {
        self.loan.id
    }

    pub fn status(&self) -> LoanStatus {
        self.loan.status()
    }

    pub fn state(&self) -> &LoanState {
        &self.loan.state
    }

    pub fn escrow(&self) -> AccountId {
        self.loan.escrow()
    }

    pub fn accrued_interest(&self, time_provider: &SafeTimeProvider) -> Result<Amount> {
        self.loan.accrued_interest(time_provider.now())
    }

    pub fn claimable_interest(&self, time_provider: &SafeTimeProvider) -> Result<Amount> {
        self.loan.claimable_interest(time_provider.now())
    }

    pub fn take_events(&mut self) -> Vec<LoanEvent> {
        self.loan.events.take_events()
    }

    pub fn deposit_collateral(
        &mut self,
        registry: &mut dyn AssetRegistry,
        caller: &AccountId,
        asset: AssetId,
        token_id: TokenId,
        time_provider: &SafeTimeProvider,
    ) -> Result<()> {
        self.loan
            .deposit_collateral(registry, caller, asset, token_id, time_provider)
    }

    pub fn approve_loan_term(
        &mut self,
        caller: &AccountId,
        time_provider: &SafeTimeProvider,
    ) -> Result<()> {
        self.loan.approve_loan_term(caller, time_provider)
    }

    /// move principal from the lender into escrow; repeated calls are no-ops
    pub fn lend(
        &mut self,
        ledger: &mut dyn ValueLedger,
        caller: &AccountId,
        time_provider: &SafeTimeProvider,
    ) -> Result<FundingStatus> {
        self.loan.authorize(Action::Lend, caller)?;

        if self.loan.state.is_funded() {
            tracing::debug!(loan_id = %self.loan.id, "lend ignored, already funded");
            return Ok(FundingStatus::Funded);
        }

        let principal = self.loan.config.terms.requested_principal;
        let observed = ledger.balance_of(caller);
        if observed < principal {
            return Err(LoanError::InsufficientFunding {
                observed,
                required: principal,
            });
        }

        let now = time_provider.now();
        ledger.transfer(caller, &self.loan.escrow(), principal)?;

        self.loan.state.principal = principal;
        self.loan.events.emit(LoanEvent::LoanFunded {
            loan_id: self.loan.id,
            amount: principal,
            timestamp: now,
        });
        self.loan.snapshot("funded", now);
        Ok(FundingStatus::Funded)
    }

    /// hand the escrowed principal to the borrower
    pub fn start_borrowing(
        &mut self,
        ledger: &mut dyn ValueLedger,
        caller: &AccountId,
        time_provider: &SafeTimeProvider,
    ) -> Result<()> {
        self.loan.authorize(Action::StartBorrowing, caller)?;

        let principal = self.loan.config.terms.requested_principal;
        if !self.loan.state.is_funded() {
            return Err(LoanError::InsufficientFunding {
                observed: ledger.balance_of(&self.loan.escrow()),
                required: principal,
            });
        }
        if !self.loan.custody.is_held() {
            return Err(LoanError::CollateralRequired);
        }

        let now = time_provider.now();
        ledger.transfer(&self.loan.escrow(), caller, principal)?;

        self.loan.begin(now)?;
        self.loan.snapshot("borrowing started", now);
        Ok(())
    }

    /// refund the lender and return the collateral
    pub fn cancel_borrowing(
        &mut self,
        ledger: &mut dyn ValueLedger,
        registry: &mut dyn AssetRegistry,
        caller: &AccountId,
        time_provider: &SafeTimeProvider,
    ) -> Result<()> {
        self.loan.authorize(Action::CancelBorrowing, caller)?;
        let now = time_provider.now();

        let refunded = self.loan.state.principal;
        let mut batch = TransferBatch::new();
        batch.push(&self.loan.escrow(), &self.loan.config.parties.lender, refunded);
        batch.execute(ledger)?;

        if self.loan.custody.is_held() {
            if let Err(err) = self.loan.release_collateral(registry, caller, now) {
                batch.revert(ledger);
                return Err(err);
            }
        }

        self.loan.state.principal = Amount::ZERO;
        self.loan
            .transition(LoanStatus::Cancelled, "borrowing cancelled", now)?;
        self.loan.events.emit(LoanEvent::BorrowingCancelled {
            loan_id: self.loan.id,
            refunded,
            timestamp: now,
        });
        self.loan.snapshot("cancelled", now);
        Ok(())
    }

    /// repay part of the principal; repaying all of it is a full redemption
    pub fn redeem_partial_principal(
        &mut self,
        ledger: &mut dyn ValueLedger,
        registry: &mut dyn AssetRegistry,
        caller: &AccountId,
        amount: Amount,
        time_provider: &SafeTimeProvider,
    ) -> Result<()> {
        self.loan.authorize(Action::RedeemPartialPrincipal, caller)?;

        let outstanding = self.loan.state.current_principal;
        if amount.is_zero() {
            return Err(LoanError::ZeroAmount);
        }
        if amount > outstanding {
            return Err(LoanError::ExceedsOutstandingPrincipal {
                requested: amount,
                outstanding,
            });
        }
        if amount == outstanding {
            return self
                .redeem_full_principal(ledger, registry, caller, time_provider)
                .map(|_| ());
        }

        let now = time_provider.now();
        let checkpoint = self.loan.next_checkpoint(now, outstanding - amount)?;

        ledger.transfer(caller, &self.loan.escrow(), amount)?;

        self.loan.apply_redemption(amount, checkpoint, now)?;
        self.loan.snapshot("partial redemption", now);
        Ok(())
    }

    /// repay all principal and unpaid interest; the collateral goes back
    ///
    /// Returns the total the borrower paid into escrow.
    pub fn redeem_full_principal(
        &mut self,
        ledger: &mut dyn ValueLedger,
        registry: &mut dyn AssetRegistry,
        caller: &AccountId,
        time_provider: &SafeTimeProvider,
    ) -> Result<Amount> {
        self.loan.authorize(Action::RedeemFullPrincipal, caller)?;
        let now = time_provider.now();

        let outstanding = self.loan.state.current_principal;
        let due = self.interest_due(now)?;
        let checkpoint = self.loan.next_checkpoint(now, Amount::ZERO)?;
        let total = outstanding
            .checked_add(due.unpaid)
            .ok_or_else(|| LoanError::CalculationOverflow {
                message: "redemption total exceeds u128".to_string(),
            })?;

        let mut batch = TransferBatch::new();
        batch.push(caller, &self.loan.escrow(), total);
        batch.execute(ledger)?;

        if let Err(err) = self.loan.release_collateral(registry, caller, now) {
            batch.revert(ledger);
            return Err(err);
        }

        self.loan.state.paid_interest = due.accrued;
        self.loan.apply_redemption(outstanding, checkpoint, now)?;
        if !due.unpaid.is_zero() {
            self.loan.events.emit(LoanEvent::InterestPaid {
                loan_id: self.loan.id,
                amount: due.unpaid,
                timestamp: now,
            });
        }
        self.loan
            .transition(LoanStatus::Redeemed, "principal fully repaid", now)?;
        self.loan.snapshot("full redemption", now);
        Ok(total)
    }

    /// collect unpaid interest from the borrower and pay the lender
    pub fn claim_interest(
        &mut self,
        ledger: &mut dyn ValueLedger,
        caller: &AccountId,
        time_provider: &SafeTimeProvider,
    ) -> Result<ClaimOutcome> {
        self.loan.authorize(Action::ClaimInterest, caller)?;
        let now = time_provider.now();

        if self.default_if_overdue(ledger, now)? {
            return Ok(ClaimOutcome::Defaulted);
        }

        self.pay_lender(ledger, Amount::ZERO, now)
    }

    /// pay out withdrawable principal together with claimable interest
    pub fn claim_principal(
        &mut self,
        ledger: &mut dyn ValueLedger,
        caller: &AccountId,
        time_provider: &SafeTimeProvider,
    ) -> Result<ClaimOutcome> {
        self.loan.authorize(Action::ClaimPrincipal, caller)?;
        let now = time_provider.now();

        if self.default_if_overdue(ledger, now)? {
            return Ok(ClaimOutcome::Defaulted);
        }

        let principal = self.loan.state.withdrawable_principal;
        self.pay_lender(ledger, principal, now)
    }

    pub fn withdraw_collateral(
        &mut self,
        registry: &mut dyn AssetRegistry,
        caller: &AccountId,
        time_provider: &SafeTimeProvider,
    ) -> Result<CollateralRecord> {
        self.loan.withdraw_collateral(registry, caller, time_provider)
    }

    pub fn liquidate_collateral(
        &mut self,
        registry: &mut dyn AssetRegistry,
        caller: &AccountId,
        time_provider: &SafeTimeProvider,
    ) -> Result<CollateralRecord> {
        self.loan.liquidate_collateral(registry, caller, time_provider)
    }

    /// default an overdue loan; a loan that never started refunds the lender
    fn default_if_overdue(
        &mut self,
        ledger: &mut dyn ValueLedger,
        now: DateTime<Utc>,
    ) -> Result<bool> {
        if !self.loan.overdue_before_start(now) {
            return self.loan.default_if_overdue(now);
        }

        let refund = self.loan.state.principal;
        let mut batch = TransferBatch::new();
        batch.push(&self.loan.escrow(), &self.loan.config.parties.lender, refund);
        batch.execute(ledger)?;

        if let Err(err) = self.loan.default_if_overdue(now) {
            batch.revert(ledger);
            return Err(err);
        }
        self.loan.record_funding_refund(refund, now);
        Ok(true)
    }

    fn interest_due(&self, now: DateTime<Utc>) -> Result<InterestDue> {
        Ok(InterestDue {
            accrued: self.loan.accrued_interest(now)?,
            unpaid: self.loan.unpaid_interest(now)?,
            claimable: self.loan.claimable_interest(now)?,
        })
    }

    fn payment_batch(&self, principal: Amount, due: &InterestDue) -> Result<TransferBatch> {
        let escrow = self.loan.escrow();
        let parties = &self.loan.config.parties;
        let payout = principal
            .checked_add(due.claimable)
            .ok_or_else(|| LoanError::CalculationOverflow {
                message: "lender payout exceeds u128".to_string(),
            })?;

        let mut batch = TransferBatch::new();
        batch.push(&parties.borrower, &escrow, due.unpaid);
        batch.push(&escrow, &parties.lender, payout);
        Ok(batch)
    }

    fn pay_lender(
        &mut self,
        ledger: &mut dyn ValueLedger,
        principal: Amount,
        now: DateTime<Utc>,
    ) -> Result<ClaimOutcome> {
        let due = self.interest_due(now)?;
        let batch = self.payment_batch(principal, &due)?;
        if batch.is_empty() {
            return Err(LoanError::NothingToClaim);
        }

        batch.execute(ledger)?;

        self.loan.state.paid_interest = due.accrued;
        self.loan.state.claimed_interest = due.accrued;
        self.loan.state.record_principal_claim(principal);

        if !due.unpaid.is_zero() {
            self.loan.events.emit(LoanEvent::InterestPaid {
                loan_id: self.loan.id,
                amount: due.unpaid,
                timestamp: now,
            });
        }
        if !due.claimable.is_zero() {
            self.loan.events.emit(LoanEvent::InterestClaimed {
                loan_id: self.loan.id,
                amount: due.claimable,
                timestamp: now,
            });
        }
        if !principal.is_zero() {
            self.loan.events.emit(LoanEvent::PrincipalClaimed {
                loan_id: self.loan.id,
                amount: principal,
                timestamp: now,
            });
        }

        self.loan.try_complete(now)?;
        self.loan.snapshot("lender claim", now);
        Ok(ClaimOutcome::Paid {
            principal,
            interest: due.claimable,
        })
    }
}

/// builder for simple loans
#[derive(Debug, Clone, Default)]
pub struct SimpleLoanBuilder {
    borrower: Option<AccountId>,
    lender: Option<AccountId>,
    liquidator: Option<AccountId>,
    principal: Option<Amount>,
    rate: Option<Rate>,
    duration: Option<Duration>,
    day_count_convention: DayCountConvention,
    asset: Option<SettlementAsset>,
}

impl SimpleLoanBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn borrower(mut self, account: impl Into<AccountId>) -> Self {
        self.borrower = Some(account.into());
        self
    }

    pub fn lender(mut self, account: impl Into<AccountId>) -> Self {
        self.lender = Some(account.into());
        self
    }

    /// destination for liquidated collateral, defaults to the lender
    pub fn liquidator(mut self, account: impl Into<AccountId>) -> Self {
        self.liquidator = Some(account.into());
        self
    }

    pub fn principal(mut self, amount: Amount) -> Self {
        self.principal = Some(amount);
        self
    }

    pub fn rate(mut self, rate: Rate) -> Self {
        self.rate = Some(rate);
        self
    }

    pub fn duration(mut self, duration: Duration) -> Self {
        self.duration = Some(duration);
        self
    }

    pub fn day_count_convention(mut self, convention: DayCountConvention) -> Self {
        self.day_count_convention = convention;
        self
    }

    pub fn asset(mut self, asset: SettlementAsset) -> Self {
        self.asset = Some(asset);
        self
    }

    /// Build with system time
    pub fn build_now(self) -> Result<SimpleLoan> {
        let time = SafeTimeProvider::new(TimeSource::System);
        self.build(&time)
    }

    pub fn build(self, time_provider: &SafeTimeProvider) -> Result<SimpleLoan> {
        let config = self.config()?;
        SimpleLoan::new(Loan::create(config, time_provider)?)
    }

    pub(crate) fn config(self) -> Result<LoanConfig> {
        let borrower = self.borrower.ok_or(LoanError::InvalidConfiguration {
            message: "Borrower required".to_string(),
        })?;
        let lender = self.lender.ok_or(LoanError::InvalidConfiguration {
            message: "Lender required".to_string(),
        })?;
        let principal = self.principal.ok_or(LoanError::InvalidConfiguration {
            message: "Principal required".to_string(),
        })?;
        let rate = self.rate.ok_or(LoanError::InvalidConfiguration {
            message: "Rate required".to_string(),
        })?;
        let duration = self.duration.ok_or(LoanError::InvalidConfiguration {
            message: "Duration required".to_string(),
        })?;
        if duration <= Duration::zero() {
            return Err(LoanError::InvalidConfiguration {
                message: "Duration must be positive".to_string(),
            });
        }

        let parties = Parties {
            liquidator: self.liquidator.unwrap_or_else(|| lender.clone()),
            borrower,
            lender,
        };

        let mut config =
            LoanConfig::simple(parties, principal, rate, duration.num_seconds() as u64);
        config.interest.day_count_convention = self.day_count_convention;
        if let Some(asset) = self.asset {
            config.asset = asset;
        }
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::ErrorKind;
    use crate::external::{InMemoryLedger, InMemoryRegistry};
    use crate::interest::SECONDS_PER_DAY;
    use chrono::TimeZone;

    const PRINCIPAL: u64 = 100_000;

    struct Harness {
        time: SafeTimeProvider,
        ledger: InMemoryLedger,
        registry: InMemoryRegistry,
        loan: SimpleLoan,
        nft: AssetId,
        token_id: TokenId,
    }

    fn borrower() -> AccountId {
        AccountId::new("borrower")
    }

    fn lender() -> AccountId {
        AccountId::new("lender")
    }

    fn admin() -> AccountId {
        AccountId::new("admin")
    }

    fn harness() -> Harness {
        let time = SafeTimeProvider::new(TimeSource::Test(
            Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
        ));

        let loan = SimpleLoan::builder()
            .borrower(borrower())
            .lender(lender())
            .liquidator(admin())
            .principal(Amount::from_units(PRINCIPAL))
            .rate(Rate::from_bps(1000))
            .duration(Duration::weeks(20))
            .build(&time)
            .unwrap();

        let mut ledger = InMemoryLedger::new();
        ledger.mint(&lender(), Amount::from_units(PRINCIPAL));
        ledger.mint(&borrower(), Amount::from_units(10_000));

        let nft = AssetId::new("my-nft");
        let mut registry = InMemoryRegistry::new();
        let token_id = registry.mint(&nft, &borrower());

        Harness {
            time,
            ledger,
            registry,
            loan,
            nft,
            token_id,
        }
    }

    /// collateral in, terms approved, principal lent
    fn activated() -> Harness {
        let mut h = harness();
        h.loan
            .deposit_collateral(&mut h.registry, &borrower(), h.nft.clone(), h.token_id, &h.time)
            .unwrap();
        h.loan.approve_loan_term(&lender(), &h.time).unwrap();
        assert_eq!(
            h.loan.lend(&mut h.ledger, &lender(), &h.time).unwrap(),
            FundingStatus::Funded
        );
        h
    }

    fn started() -> Harness {
        let mut h = activated();
        h.loan
            .start_borrowing(&mut h.ledger, &borrower(), &h.time)
            .unwrap();
        h
    }

    fn advance(h: &Harness, duration: Duration) {
        h.time.test_control().unwrap().advance(duration);
    }

    #[test]
    fn test_reference_lifecycle() {
        let mut h = started();
        assert_eq!(h.loan.status(), LoanStatus::Started);
        assert_eq!(h.ledger.balance(&h.loan.escrow()), Amount::ZERO);

        advance(&h, Duration::days(10));
        let claimable = h.loan.claimable_interest(&h.time).unwrap();
        assert_eq!(claimable, Amount::from_raw(274_725_274_725_274_725_274));

        let outcome = h.loan.claim_interest(&mut h.ledger, &lender(), &h.time).unwrap();
        assert_eq!(
            outcome,
            ClaimOutcome::Paid {
                principal: Amount::ZERO,
                interest: claimable,
            }
        );
        assert_eq!(h.loan.claimable_interest(&h.time).unwrap(), Amount::ZERO);
        assert_eq!(h.ledger.balance(&lender()), claimable);

        advance(&h, Duration::weeks(5));
        h.loan
            .redeem_partial_principal(
                &mut h.ledger,
                &mut h.registry,
                &borrower(),
                Amount::from_units(50_000),
                &h.time,
            )
            .unwrap();
        let state = h.loan.state();
        assert_eq!(
            state.checkpoint.accumulated,
            Amount::from_raw(1_236_263_736_263_736_263_736)
        );
        assert_eq!(state.current_principal, Amount::from_units(50_000));
        assert_eq!(state.withdrawable_principal, Amount::from_units(50_000));
        assert_eq!(
            h.loan.claimable_interest(&h.time).unwrap(),
            Amount::from_raw(961_538_461_538_461_538_462)
        );

        h.loan
            .claim_principal(&mut h.ledger, &lender(), &h.time)
            .unwrap();
        assert_eq!(h.loan.state().withdrawable_principal, Amount::ZERO);
        assert_eq!(h.loan.claimable_interest(&h.time).unwrap(), Amount::ZERO);
        assert_eq!(h.loan.status(), LoanStatus::Started);

        let before = h.loan.accrued_interest(&h.time).unwrap();
        advance(&h, Duration::weeks(5));
        let accrued = h.loan.accrued_interest(&h.time).unwrap();
        assert_eq!(accrued - before, Amount::from_raw(480_769_230_769_230_769_230));

        h.loan
            .redeem_full_principal(&mut h.ledger, &mut h.registry, &borrower(), &h.time)
            .unwrap();
        assert_eq!(h.loan.status(), LoanStatus::Redeemed);
        assert_eq!(h.loan.state().paid_interest, accrued);
        assert_eq!(h.registry.owner_of(&h.nft, h.token_id), Some(borrower()));

        advance(&h, Duration::days(5));
        assert_eq!(h.loan.accrued_interest(&h.time).unwrap(), accrued);

        h.loan
            .claim_principal(&mut h.ledger, &lender(), &h.time)
            .unwrap();
        assert_eq!(h.loan.status(), LoanStatus::Completed);
        assert_eq!(h.ledger.balance(&h.loan.escrow()), Amount::ZERO);
        assert_eq!(
            h.ledger.balance(&lender()),
            Amount::from_units(PRINCIPAL) + accrued
        );
        assert!(h.loan.state().principal_conserved(Amount::from_units(PRINCIPAL)));
    }

    #[test]
    fn test_lend_is_idempotent() {
        let mut h = activated();
        let transfers = h.ledger.transfer_count();
        let events = h.loan.loan().events.len();

        let status = h.loan.lend(&mut h.ledger, &lender(), &h.time).unwrap();
        assert_eq!(status, FundingStatus::Funded);
        assert_eq!(h.ledger.transfer_count(), transfers);
        assert_eq!(h.loan.loan().events.len(), events);
        assert_eq!(
            h.ledger.balance(&h.loan.escrow()),
            Amount::from_units(PRINCIPAL)
        );
    }

    #[test]
    fn test_lend_requires_lender_balance() {
        let mut h = harness();
        h.loan
            .deposit_collateral(&mut h.registry, &borrower(), h.nft.clone(), h.token_id, &h.time)
            .unwrap();
        h.loan.approve_loan_term(&lender(), &h.time).unwrap();
        h.ledger
            .transfer(&lender(), &admin(), Amount::from_units(1))
            .unwrap();

        let err = h.loan.lend(&mut h.ledger, &lender(), &h.time).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InsufficientFunding);
        assert!(!h.loan.state().is_funded());
    }

    #[test]
    fn test_start_requires_funding() {
        let mut h = harness();
        h.loan
            .deposit_collateral(&mut h.registry, &borrower(), h.nft.clone(), h.token_id, &h.time)
            .unwrap();
        h.loan.approve_loan_term(&lender(), &h.time).unwrap();

        let err = h
            .loan
            .start_borrowing(&mut h.ledger, &borrower(), &h.time)
            .unwrap_err();
        assert!(matches!(err, LoanError::InsufficientFunding { .. }));
        assert_eq!(h.loan.status(), LoanStatus::Activated);
    }

    #[test]
    fn test_cancel_refunds_and_returns_collateral() {
        let mut h = activated();
        h.loan
            .cancel_borrowing(&mut h.ledger, &mut h.registry, &borrower(), &h.time)
            .unwrap();

        assert_eq!(h.loan.status(), LoanStatus::Cancelled);
        assert_eq!(h.ledger.balance(&lender()), Amount::from_units(PRINCIPAL));
        assert_eq!(h.ledger.balance(&h.loan.escrow()), Amount::ZERO);
        assert_eq!(h.registry.owner_of(&h.nft, h.token_id), Some(borrower()));

        // already released inline
        let err = h
            .loan
            .withdraw_collateral(&mut h.registry, &borrower(), &h.time)
            .unwrap_err();
        assert_eq!(err, LoanError::NothingToRelease);
    }

    #[test]
    fn test_cancel_before_approval() {
        let mut h = harness();
        h.loan
            .deposit_collateral(&mut h.registry, &borrower(), h.nft.clone(), h.token_id, &h.time)
            .unwrap();
        h.loan
            .cancel_borrowing(&mut h.ledger, &mut h.registry, &borrower(), &h.time)
            .unwrap();
        assert_eq!(h.loan.status(), LoanStatus::Cancelled);
        assert_eq!(h.registry.owner_of(&h.nft, h.token_id), Some(borrower()));
    }

    #[test]
    fn test_cancel_not_allowed_after_start() {
        let mut h = started();
        let err = h
            .loan
            .cancel_borrowing(&mut h.ledger, &mut h.registry, &borrower(), &h.time)
            .unwrap_err();
        assert!(matches!(err, LoanError::InvalidStatus { .. }));
    }

    #[test]
    fn test_default_and_single_liquidation() {
        let mut h = started();
        advance(&h, Duration::weeks(21));

        let outcome = h.loan.claim_interest(&mut h.ledger, &lender(), &h.time).unwrap();
        assert_eq!(outcome, ClaimOutcome::Defaulted);
        assert_eq!(h.loan.status(), LoanStatus::Defaulted);
        assert_eq!(h.ledger.balance(&lender()), Amount::ZERO);

        // permissionless, goes to the configured liquidator
        let anyone = AccountId::new("keeper");
        h.loan
            .liquidate_collateral(&mut h.registry, &anyone, &h.time)
            .unwrap();
        assert_eq!(h.registry.owner_of(&h.nft, h.token_id), Some(admin()));

        let calls = h.registry.transfer_count();
        let err = h
            .loan
            .liquidate_collateral(&mut h.registry, &anyone, &h.time)
            .unwrap_err();
        assert_eq!(err, LoanError::NothingToRelease);
        assert_eq!(h.registry.transfer_count(), calls);
        assert_eq!(h.loan.status(), LoanStatus::Defaulted);
    }

    #[test]
    fn test_no_default_at_deadline() {
        let mut h = started();
        advance(&h, Duration::weeks(20));
        let outcome = h.loan.claim_interest(&mut h.ledger, &lender(), &h.time).unwrap();
        assert!(matches!(outcome, ClaimOutcome::Paid { .. }));
        assert_eq!(h.loan.status(), LoanStatus::Started);
    }

    #[test]
    fn test_liquidation_requires_default() {
        let mut h = started();
        let err = h
            .loan
            .liquidate_collateral(&mut h.registry, &admin(), &h.time)
            .unwrap_err();
        assert!(matches!(err, LoanError::InvalidStatus { .. }));
        assert_eq!(
            h.registry.owner_of(&h.nft, h.token_id),
            Some(h.loan.escrow())
        );
    }

    #[test]
    fn test_partial_redemptions_sum_to_principal() {
        let mut h = started();
        for units in [30_000, 30_000, 40_000] {
            advance(&h, Duration::days(7));
            h.loan
                .redeem_partial_principal(
                    &mut h.ledger,
                    &mut h.registry,
                    &borrower(),
                    Amount::from_units(units),
                    &h.time,
                )
                .unwrap();
        }

        let state = h.loan.state();
        assert_eq!(state.current_principal, Amount::ZERO);
        assert_eq!(state.withdrawable_principal, Amount::from_units(PRINCIPAL));
        assert_eq!(h.loan.status(), LoanStatus::Redeemed);
        assert!(state.principal_conserved(Amount::from_units(PRINCIPAL)));
        assert_eq!(h.registry.owner_of(&h.nft, h.token_id), Some(borrower()));
    }

    #[test]
    fn test_redeem_amount_guards() {
        let mut h = started();
        let err = h
            .loan
            .redeem_partial_principal(&mut h.ledger, &mut h.registry, &borrower(), Amount::ZERO, &h.time)
            .unwrap_err();
        assert_eq!(err, LoanError::ZeroAmount);

        let err = h
            .loan
            .redeem_partial_principal(
                &mut h.ledger,
                &mut h.registry,
                &borrower(),
                Amount::from_units(PRINCIPAL + 1),
                &h.time,
            )
            .unwrap_err();
        assert!(matches!(err, LoanError::ExceedsOutstandingPrincipal { .. }));
        assert_eq!(h.loan.state().current_principal, Amount::from_units(PRINCIPAL));
    }

    #[test]
    fn test_accrual_monotonic_then_frozen() {
        let mut h = started();
        let mut last = Amount::ZERO;
        for _ in 0..6 {
            advance(&h, Duration::seconds(SECONDS_PER_DAY as i64 * 3 + 17));
            let accrued = h.loan.accrued_interest(&h.time).unwrap();
            assert!(accrued > last);
            last = accrued;
        }

        h.loan
            .redeem_full_principal(&mut h.ledger, &mut h.registry, &borrower(), &h.time)
            .unwrap();
        let frozen = h.loan.accrued_interest(&h.time).unwrap();
        advance(&h, Duration::weeks(30));
        assert_eq!(h.loan.accrued_interest(&h.time).unwrap(), frozen);
    }

    #[test]
    fn test_status_never_moves_backward() {
        let mut h = started();
        let mut seen = vec![h.loan.status()];
        advance(&h, Duration::days(3));
        h.loan
            .redeem_full_principal(&mut h.ledger, &mut h.registry, &borrower(), &h.time)
            .unwrap();
        seen.push(h.loan.status());
        h.loan
            .claim_principal(&mut h.ledger, &lender(), &h.time)
            .unwrap();
        seen.push(h.loan.status());

        assert_eq!(
            seen,
            vec![LoanStatus::Started, LoanStatus::Redeemed, LoanStatus::Completed]
        );
        for pair in h.loan.loan().snapshots.windows(2) {
            let (a, b) = (pair[0].state.status, pair[1].state.status);
            assert!(a == b || a.can_transition_to(b), "{} -> {}", a, b);
        }
    }

    #[test]
    fn test_lender_payout_overflow_is_an_error() {
        let h = started();
        let due = InterestDue {
            accrued: Amount::from_raw(2),
            unpaid: Amount::ZERO,
            claimable: Amount::from_raw(2),
        };
        let err = h
            .loan
            .payment_batch(Amount::from_raw(u128::MAX), &due)
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Calculation);
    }

    #[test]
    fn test_unstarted_loan_defaults_and_refunds_lender() {
        let mut h = activated();
        let escrow = h.loan.escrow();
        assert_eq!(h.ledger.balance(&escrow), Amount::from_units(100_000));

        // before the deadline a claim has nothing to pay
        advance(&h, Duration::weeks(20));
        let err = h
            .loan
            .claim_principal(&mut h.ledger, &lender(), &h.time)
            .unwrap_err();
        assert_eq!(err, LoanError::NothingToClaim);
        assert_eq!(h.loan.status(), LoanStatus::Activated);

        advance(&h, Duration::weeks(1));
        let outcome = h
            .loan
            .claim_principal(&mut h.ledger, &lender(), &h.time)
            .unwrap();
        assert_eq!(outcome, ClaimOutcome::Defaulted);
        assert_eq!(h.loan.status(), LoanStatus::Defaulted);
        assert_eq!(h.ledger.balance(&escrow), Amount::ZERO);
        assert_eq!(h.ledger.balance(&lender()), Amount::from_units(100_000));
        assert_eq!(h.loan.state().principal, Amount::ZERO);
        assert!(h.loan.state().principal_conserved(Amount::from_units(100_000)));
        assert!(h
            .loan
            .take_events()
            .iter()
            .any(|e| matches!(e, LoanEvent::FundingRefunded { amount, .. } if *amount == Amount::from_units(100_000))));

        h.loan
            .liquidate_collateral(&mut h.registry, &AccountId::new("keeper"), &h.time)
            .unwrap();
        assert_eq!(h.registry.owner_of(&h.nft, h.token_id), Some(admin()));
        let err = h
            .loan
            .start_borrowing(&mut h.ledger, &borrower(), &h.time)
            .unwrap_err();
        assert!(matches!(err, LoanError::InvalidStatus { .. }));
    }

    #[test]
    fn test_unstarted_default_refund_failure_keeps_state() {
        let mut h = activated();
        advance(&h, Duration::weeks(21));
        let state = h.loan.state().clone();

        h.ledger.freeze(&lender());
        let err = h
            .loan
            .claim_interest(&mut h.ledger, &lender(), &h.time)
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Ledger);
        assert_eq!(h.loan.state(), &state);
        assert_eq!(h.ledger.balance(&h.loan.escrow()), Amount::from_units(100_000));
    }

    #[test]
    fn test_claim_with_nothing_due() {
        let mut h = started();
        let err = h
            .loan
            .claim_interest(&mut h.ledger, &lender(), &h.time)
            .unwrap_err();
        assert_eq!(err, LoanError::NothingToClaim);
    }

    #[test]
    fn test_wrong_caller_rejected() {
        let mut h = started();
        let err = h
            .loan
            .redeem_full_principal(&mut h.ledger, &mut h.registry, &lender(), &h.time)
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Authorization);

        let err = h
            .loan
            .claim_interest(&mut h.ledger, &borrower(), &h.time)
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Authorization);
    }

    #[test]
    fn test_failed_ledger_leg_leaves_state_unchanged() {
        let mut h = started();
        advance(&h, Duration::days(10));
        let before = h.loan.state().clone();
        let borrower_balance = h.ledger.balance(&borrower());

        h.ledger.freeze(&lender());
        let err = h
            .loan
            .claim_interest(&mut h.ledger, &lender(), &h.time)
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Ledger);
        assert_eq!(h.loan.state(), &before);
        assert_eq!(h.ledger.balance(&borrower()), borrower_balance);
        assert_eq!(h.ledger.balance(&h.loan.escrow()), Amount::ZERO);
    }

    #[test]
    fn test_registry_failure_reverts_redemption() {
        let mut h = started();
        advance(&h, Duration::days(10));

        // the vault no longer owns the token
        h.registry
            .transfer_ownership(&h.nft, h.token_id, &h.loan.escrow(), &admin())
            .unwrap();
        let before = h.loan.state().clone();
        let borrower_balance = h.ledger.balance(&borrower());

        let err = h
            .loan
            .redeem_full_principal(&mut h.ledger, &mut h.registry, &borrower(), &h.time)
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Custody);
        assert_eq!(h.loan.state(), &before);
        assert_eq!(h.ledger.balance(&borrower()), borrower_balance);
        assert_eq!(h.ledger.balance(&h.loan.escrow()), Amount::ZERO);
        assert!(h.loan.loan().custody.is_held());
    }

    #[test]
    fn test_builder_requires_terms() {
        let err = SimpleLoan::builder()
            .borrower(borrower())
            .lender(lender())
            .build_now()
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Configuration);
    }
}
