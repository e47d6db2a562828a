use chrono::{DateTime, Duration, Utc};
use hourglass_rs::SafeTimeProvider;

use crate::amount::{Amount, Rate};
use crate::collateral::CollateralRecord;
use crate::config::{BridgeConfig, LoanConfig};
use crate::errors::{LoanError, Result};
use crate::events::LoanEvent;
use crate::external::{AssetRegistry, BridgeCommit, CrossChainBridge};
use crate::interest::DayCountConvention;
use crate::lifecycle::Action;
use crate::loan::Loan;
use crate::loans::simple::SimpleLoanBuilder;
use crate::settlement::{OperationKind, SettlementCorrelator};
use crate::state::LoanState;
use crate::types::{
    AccountId, AssetId, BridgeEndpoint, ClaimId, ClaimOutcome, ExternalAccount, FundingStatus,
    LoanId, LoanStatus, LoanVariant, TokenId,
};

/// loan whose value moves through a cross-ledger bridge
///
/// Funding and repayment are observed from the escrow balance. Every
/// outbound transfer carries a caller supplied claim id that is accepted
/// once per operation kind.
#[derive(Debug, Clone)]
pub struct BridgeLoan {
    loan: Loan,
}

impl BridgeLoan {
    pub fn new(loan: Loan) -> Result<Self> {
        if loan.variant() != LoanVariant::Bridge {
            return Err(LoanError::InvalidConfiguration {
                message: "Not a bridge loan configuration".to_string(),
            });
        }
        Ok(Self { loan })
    }

    pub fn builder() -> BridgeLoanBuilder {
        BridgeLoanBuilder::new()
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

    pub fn settlements(&self) -> &SettlementCorrelator {
        &self.loan.settlements
    }

    pub fn accrued_interest(&self, time_provider: &SafeTimeProvider) -> Result<Amount> {
        self.loan.accrued_interest(time_provider.now())
    }

    pub fn claimable_interest(&self, time_provider: &SafeTimeProvider) -> Result<Amount> {
        self.loan.claimable_interest(time_provider.now())
    }

    /// claimable interest the escrow can actually pay out
    pub fn available_interest(
        &self,
        bridge: &dyn CrossChainBridge,
        time_provider: &SafeTimeProvider,
    ) -> Result<Amount> {
        self.payable_interest(bridge, time_provider.now())
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

    /// register the lender's intent; funded once the escrow sees the value
    pub fn lend(
        &mut self,
        bridge: &dyn CrossChainBridge,
        caller: &AccountId,
        time_provider: &SafeTimeProvider,
    ) -> Result<FundingStatus> {
        self.loan.authorize(Action::Lend, caller)?;

        if self.loan.state.is_funded() {
            tracing::debug!(loan_id = %self.loan.id, "lend ignored, already funded");
            return Ok(FundingStatus::Funded);
        }

        let now = time_provider.now();
        if self.observe(bridge, now) {
            return Ok(FundingStatus::Funded);
        }

        if !self.loan.state.lend_requested {
            self.loan.state.lend_requested = true;
            self.loan.events.emit(LoanEvent::LendRequested {
                loan_id: self.loan.id,
                required: self.loan.config.funding_target(),
                timestamp: now,
            });
            self.loan.snapshot("lend requested", now);
        }
        Ok(FundingStatus::Pending)
    }

    /// re-read the escrow balance; callable by anyone
    pub fn observe_funding(
        &mut self,
        bridge: &dyn CrossChainBridge,
        time_provider: &SafeTimeProvider,
    ) -> Result<FundingStatus> {
        if self.loan.state.is_funded() {
            return Ok(FundingStatus::Funded);
        }
        if self.loan.state.status != LoanStatus::Activated {
            return Err(LoanError::InvalidStatus {
                action: Action::Lend,
                current: self.loan.state.status,
            });
        }

        if self.observe(bridge, time_provider.now()) {
            Ok(FundingStatus::Funded)
        } else {
            Ok(FundingStatus::Pending)
        }
    }

    /// send the principal to the borrower's external account
    pub fn start_borrowing(
        &mut self,
        bridge: &mut dyn CrossChainBridge,
        caller: &AccountId,
        claim_id: ClaimId,
        time_provider: &SafeTimeProvider,
    ) -> Result<()> {
        self.loan.authorize(Action::StartBorrowing, caller)?;
        self.loan
            .settlements
            .ensure_unused(OperationKind::LendCommit, claim_id)?;
        if !self.loan.custody.is_held() {
            return Err(LoanError::CollateralRequired);
        }

        let now = time_provider.now();
        let required = self.loan.config.funding_target();
        let observed = bridge.observed_balance(&self.loan.escrow());
        if !self.loan.state.is_funded() && observed < required {
            return Err(LoanError::InsufficientFunding { observed, required });
        }

        let principal = self.loan.config.terms.requested_principal;
        let destination = self.bridge_config()?.borrower_external.clone();
        self.commit(bridge, principal, claim_id, destination)?;

        if !self.loan.state.is_funded() {
            self.record_funding(observed, now);
        }
        self.record_settlement(OperationKind::LendCommit, claim_id, principal, now)?;
        self.loan.begin(now)?;
        self.loan.snapshot("borrowing started", now);
        Ok(())
    }

    /// return whatever funding arrived to the lender's external account
    ///
    /// The collateral stays in custody until [`BridgeLoan::withdraw_collateral`].
    pub fn cancel_borrowing(
        &mut self,
        bridge: &mut dyn CrossChainBridge,
        caller: &AccountId,
        claim_id: ClaimId,
        time_provider: &SafeTimeProvider,
    ) -> Result<Amount> {
        self.loan.authorize(Action::CancelBorrowing, caller)?;
        self.loan
            .settlements
            .ensure_unused(OperationKind::CancelRefund, claim_id)?;

        let now = time_provider.now();
        let refunded = bridge.observed_balance(&self.loan.escrow());
        if !refunded.is_zero() {
            let destination = self.bridge_config()?.lender_external.clone();
            self.commit(bridge, refunded, claim_id, destination)?;
            self.record_settlement(OperationKind::CancelRefund, claim_id, refunded, now)?;
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
        Ok(refunded)
    }

    /// announce a cross-ledger repayment of all outstanding principal
    ///
    /// Returns the escrow balance that confirms the repayment.
    pub fn redeem_principal(
        &mut self,
        bridge: &dyn CrossChainBridge,
        caller: &AccountId,
        time_provider: &SafeTimeProvider,
    ) -> Result<Amount> {
        self.loan.authorize(Action::RedeemPrincipal, caller)?;
        let now = time_provider.now();

        let outstanding = self.loan.state.current_principal;
        let target = bridge
            .observed_balance(&self.loan.escrow())
            .checked_add(outstanding)
            .ok_or_else(|| LoanError::CalculationOverflow {
                message: "redemption target exceeds u128".to_string(),
            })?;

        self.loan
            .transition(LoanStatus::PrincipalRedeeming, "redemption requested", now)?;
        self.loan.state.redemption_target = Some(target);
        self.loan.events.emit(LoanEvent::RedemptionRequested {
            loan_id: self.loan.id,
            amount: outstanding,
            target_balance: target,
            timestamp: now,
        });
        self.loan.snapshot("redemption requested", now);
        Ok(target)
    }

    /// check whether the repayment arrived; callable by anyone
    pub fn confirm_redemption(
        &mut self,
        bridge: &dyn CrossChainBridge,
        caller: &AccountId,
        time_provider: &SafeTimeProvider,
    ) -> Result<bool> {
        self.loan.authorize(Action::ConfirmRedemption, caller)?;
        self.settle_redemption(bridge, time_provider.now())
    }

    pub fn claim_interest(
        &mut self,
        bridge: &mut dyn CrossChainBridge,
        caller: &AccountId,
        claim_id: ClaimId,
        time_provider: &SafeTimeProvider,
    ) -> Result<ClaimOutcome> {
        self.loan.authorize(Action::ClaimInterest, caller)?;
        self.loan
            .settlements
            .ensure_unused(OperationKind::InterestClaim, claim_id)?;
        let now = time_provider.now();

        self.staged(|this| {
            if let Some(outcome) = this.before_claim(bridge, OperationKind::InterestClaim, claim_id, now)? {
                return Ok(outcome);
            }

            let interest = this.payable_interest(bridge, now)?;
            if interest.is_zero() {
                return Err(LoanError::NothingToClaim);
            }

            let destination = this.bridge_config()?.lender_external.clone();
            this.commit(bridge, interest, claim_id, destination)?;

            this.record_settlement(OperationKind::InterestClaim, claim_id, interest, now)?;
            this.record_interest_payout(interest, now);
            this.loan.try_complete(now)?;
            this.loan.snapshot("interest claimed", now);
            Ok(ClaimOutcome::Paid {
                principal: Amount::ZERO,
                interest,
            })
        })
    }

    /// pay withdrawable principal and payable interest in one commit
    ///
    /// After redemption the collateral still in custody goes back to the
    /// borrower with this claim.
    pub fn claim_principal(
        &mut self,
        bridge: &mut dyn CrossChainBridge,
        registry: &mut dyn AssetRegistry,
        caller: &AccountId,
        claim_id: ClaimId,
        time_provider: &SafeTimeProvider,
    ) -> Result<ClaimOutcome> {
        self.loan.authorize(Action::ClaimPrincipal, caller)?;
        self.loan
            .settlements
            .ensure_unused(OperationKind::PrincipalClaim, claim_id)?;
        let now = time_provider.now();

        self.staged(|this| {
            if let Some(outcome) = this.before_claim(bridge, OperationKind::PrincipalClaim, claim_id, now)? {
                return Ok(outcome);
            }

            let principal = this.loan.state.withdrawable_principal;
            let interest = this.payable_interest(bridge, now)?;
            if principal.is_zero() && interest.is_zero() {
                return Err(LoanError::NothingToClaim);
            }
            let payout = principal.checked_add(interest).ok_or_else(|| {
                LoanError::CalculationOverflow {
                    message: "lender payout exceeds u128".to_string(),
                }
            })?;

            let borrower = this.loan.config.parties.borrower.clone();
            let release =
                this.loan.state.status == LoanStatus::Redeemed && this.loan.custody.is_held();
            if release {
                this.loan.release_collateral(registry, &borrower, now)?;
            }

            let destination = this.bridge_config()?.lender_external.clone();
            if let Err(err) = this.commit(bridge, payout, claim_id, destination) {
                if release {
                    if let Err(restore) = this.loan.custody.restore(registry, &borrower) {
                        tracing::error!(
                            loan_id = %this.loan.id,
                            error = %restore,
                            "failed to return collateral to the vault"
                        );
                    }
                }
                return Err(err);
            }

            this.record_settlement(OperationKind::PrincipalClaim, claim_id, payout, now)?;
            this.loan.state.record_principal_claim(principal);
            if !principal.is_zero() {
                this.loan.events.emit(LoanEvent::PrincipalClaimed {
                    loan_id: this.loan.id,
                    amount: principal,
                    timestamp: now,
                });
            }
            this.record_interest_payout(interest, now);
            this.loan.try_complete(now)?;
            this.loan.snapshot("principal claimed", now);
            Ok(ClaimOutcome::Paid {
                principal,
                interest,
            })
        })
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

    /// relayer acknowledgement of a committed transfer
    ///
    /// Returns false when the settlement was already confirmed.
    pub fn confirm_settlement(
        &mut self,
        kind: OperationKind,
        claim_id: ClaimId,
        time_provider: &SafeTimeProvider,
    ) -> Result<bool> {
        let now = time_provider.now();
        let confirmed = self.loan.settlements.confirm(kind, claim_id, now)?;
        if confirmed {
            tracing::debug!(loan_id = %self.loan.id, %kind, %claim_id, "settlement confirmed");
            self.loan.events.emit(LoanEvent::SettlementConfirmed {
                loan_id: self.loan.id,
                kind,
                claim_id,
                timestamp: now,
            });
        }
        Ok(confirmed)
    }

    fn bridge_config(&self) -> Result<&BridgeConfig> {
        self.loan
            .config
            .bridge
            .as_ref()
            .ok_or(LoanError::InvalidConfiguration {
                message: "bridge settings missing".to_string(),
            })
    }

    /// run `op` on the loan, restoring it if `op` fails
    fn staged<T>(&mut self, op: impl FnOnce(&mut Self) -> Result<T>) -> Result<T> {
        let before = self.loan.clone();
        let result = op(self);
        if result.is_err() {
            self.loan = before;
        }
        result
    }

    fn commit(
        &self,
        bridge: &mut dyn CrossChainBridge,
        amount: Amount,
        claim_id: ClaimId,
        destination: ExternalAccount,
    ) -> Result<()> {
        let endpoint = self.bridge_config()?.endpoint.clone();
        bridge.commit(BridgeCommit {
            from: self.loan.escrow(),
            amount,
            claim_id,
            destination,
            endpoint,
        })?;
        Ok(())
    }

    fn record_settlement(
        &mut self,
        kind: OperationKind,
        claim_id: ClaimId,
        amount: Amount,
        now: DateTime<Utc>,
    ) -> Result<()> {
        self.loan.settlements.record(kind, claim_id, amount, now)?;
        self.loan.events.emit(LoanEvent::SettlementRecorded {
            loan_id: self.loan.id,
            kind,
            claim_id,
            amount,
            timestamp: now,
        });
        Ok(())
    }

    fn record_funding(&mut self, observed: Amount, now: DateTime<Utc>) {
        self.loan.state.principal = self.loan.config.terms.requested_principal;
        self.loan.events.emit(LoanEvent::LoanFunded {
            loan_id: self.loan.id,
            amount: observed,
            timestamp: now,
        });
    }

    fn record_interest_payout(&mut self, interest: Amount, now: DateTime<Utc>) {
        if interest.is_zero() {
            return;
        }
        self.loan.state.paid_interest += interest;
        self.loan.state.claimed_interest += interest;
        self.loan.events.emit(LoanEvent::InterestClaimed {
            loan_id: self.loan.id,
            amount: interest,
            timestamp: now,
        });
    }

    /// mark the loan funded if the escrow holds the funding target
    fn observe(&mut self, bridge: &dyn CrossChainBridge, now: DateTime<Utc>) -> bool {
        let observed = bridge.observed_balance(&self.loan.escrow());
        if observed < self.loan.config.funding_target() {
            return false;
        }
        self.record_funding(observed, now);
        self.loan.snapshot("funded", now);
        true
    }

    fn settle_redemption(&mut self, bridge: &dyn CrossChainBridge, now: DateTime<Utc>) -> Result<bool> {
        let target = self
            .loan
            .state
            .redemption_target
            .ok_or(LoanError::InvalidStatus {
                action: Action::ConfirmRedemption,
                current: self.loan.state.status,
            })?;

        let observed = bridge.observed_balance(&self.loan.escrow());
        if observed < target {
            tracing::debug!(
                loan_id = %self.loan.id,
                observed = %observed,
                target = %target,
                "redemption not yet observed"
            );
            return Ok(false);
        }

        let outstanding = self.loan.state.current_principal;
        let checkpoint = self.loan.next_checkpoint(now, Amount::ZERO)?;
        self.loan
            .transition(LoanStatus::Redeemed, "redemption observed", now)?;
        self.loan.apply_redemption(outstanding, checkpoint, now)?;
        self.loan.state.redemption_target = None;
        self.loan.snapshot("redemption confirmed", now);
        Ok(true)
    }

    /// confirm a pending redemption or default an overdue loan
    ///
    /// `Some` ends the claim with that outcome. A loan that was funded but
    /// never started sends the observed escrow back to the lender under the
    /// claim's id before it defaults.
    fn before_claim(
        &mut self,
        bridge: &mut dyn CrossChainBridge,
        kind: OperationKind,
        claim_id: ClaimId,
        now: DateTime<Utc>,
    ) -> Result<Option<ClaimOutcome>> {
        if self.loan.state.status == LoanStatus::Activated && !self.loan.state.is_funded() {
            self.observe(bridge, now);
        }
        if self.loan.overdue_before_start(now) {
            let refund = bridge.observed_balance(&self.loan.escrow());
            if !refund.is_zero() {
                let destination = self.bridge_config()?.lender_external.clone();
                self.commit(bridge, refund, claim_id, destination)?;
                self.record_settlement(kind, claim_id, refund, now)?;
            }
            self.loan.default_if_overdue(now)?;
            self.loan.record_funding_refund(refund, now);
            return Ok(Some(ClaimOutcome::Defaulted));
        }

        if self.loan.state.status == LoanStatus::PrincipalRedeeming
            && self.settle_redemption(bridge, now)?
        {
            return Ok(None);
        }
        if self.loan.default_if_overdue(now)? {
            return Ok(Some(ClaimOutcome::Defaulted));
        }
        if self.loan.state.status == LoanStatus::PrincipalRedeeming {
            return Err(LoanError::RedemptionPending);
        }
        Ok(None)
    }

    fn payable_interest(&self, bridge: &dyn CrossChainBridge, now: DateTime<Utc>) -> Result<Amount> {
        let claimable = self.loan.claimable_interest(now)?;
        let free = bridge
            .observed_balance(&self.loan.escrow())
            .saturating_sub(self.loan.state.withdrawable_principal);
        Ok(claimable.min(free))
    }
}

/// builder for bridge loans
#[derive(Debug, Clone, Default)]
pub struct BridgeLoanBuilder {
    terms: SimpleLoanBuilder,
    borrower_external: Option<ExternalAccount>,
    lender_external: Option<ExternalAccount>,
    endpoint: Option<BridgeEndpoint>,
    funding_buffer: Amount,
}

impl BridgeLoanBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn borrower(mut self, account: impl Into<AccountId>) -> Self {
        self.terms = self.terms.borrower(account);
        self
    }

    pub fn lender(mut self, account: impl Into<AccountId>) -> Self {
        self.terms = self.terms.lender(account);
        self
    }

    pub fn liquidator(mut self, account: impl Into<AccountId>) -> Self {
        self.terms = self.terms.liquidator(account);
        self
    }

    pub fn principal(mut self, amount: Amount) -> Self {
        self.terms = self.terms.principal(amount);
        self
    }

    pub fn rate(mut self, rate: Rate) -> Self {
        self.terms = self.terms.rate(rate);
        self
    }

    pub fn duration(mut self, duration: Duration) -> Self {
        self.terms = self.terms.duration(duration);
        self
    }

    pub fn day_count_convention(mut self, convention: DayCountConvention) -> Self {
        self.terms = self.terms.day_count_convention(convention);
        self
    }

    pub fn borrower_external(mut self, account: ExternalAccount) -> Self {
        self.borrower_external = Some(account);
        self
    }

    pub fn lender_external(mut self, account: ExternalAccount) -> Self {
        self.lender_external = Some(account);
        self
    }

    pub fn endpoint(mut self, endpoint: BridgeEndpoint) -> Self {
        self.endpoint = Some(endpoint);
        self
    }

    pub fn funding_buffer(mut self, buffer: Amount) -> Self {
        self.funding_buffer = buffer;
        self
    }

    pub fn build(self, time_provider: &SafeTimeProvider) -> Result<BridgeLoan> {
        let bridge = BridgeConfig {
            borrower_external: self.borrower_external.ok_or(LoanError::InvalidConfiguration {
                message: "Borrower external account required".to_string(),
            })?,
            lender_external: self.lender_external.ok_or(LoanError::InvalidConfiguration {
                message: "Lender external account required".to_string(),
            })?,
            endpoint: self.endpoint.ok_or(LoanError::InvalidConfiguration {
                message: "Bridge endpoint required".to_string(),
            })?,
            funding_buffer: self.funding_buffer,
        };

        let config = LoanConfig {
            bridge: Some(bridge),
            ..self.terms.config()?
        };
        BridgeLoan::new(Loan::create(config, time_provider)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::ErrorKind;
    use crate::external::{InMemoryLedger, InMemoryRegistry};
    use crate::settlement::SettlementStatus;
    use chrono::TimeZone;
    use hourglass_rs::TimeSource;

    struct Harness {
        time: SafeTimeProvider,
        ledger: InMemoryLedger,
        registry: InMemoryRegistry,
        loan: BridgeLoan,
        nft: AssetId,
        token_id: TokenId,
    }

    fn borrower() -> AccountId {
        AccountId::new("borrower")
    }

    fn lender() -> AccountId {
        AccountId::new("lender")
    }

    fn relayer() -> AccountId {
        AccountId::new("relayer")
    }

    fn endpoint() -> BridgeEndpoint {
        BridgeEndpoint::new("0xdoor")
    }

    fn units(n: u64) -> Amount {
        Amount::from_units(n)
    }

    fn harness() -> Harness {
        let time = SafeTimeProvider::new(TimeSource::Test(
            Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
        ));

        let loan = BridgeLoan::builder()
            .borrower(borrower())
            .lender(lender())
            .liquidator("admin")
            .principal(units(1000))
            .rate(Rate::from_bps(1000))
            .duration(Duration::weeks(20))
            .borrower_external(ExternalAccount::new("rBorrower"))
            .lender_external(ExternalAccount::new("rLender"))
            .endpoint(endpoint())
            .funding_buffer(units(1))
            .build(&time)
            .unwrap();

        let nft = AssetId::new("my-nft");
        let mut registry = InMemoryRegistry::new();
        let token_id = registry.mint(&nft, &borrower());

        let mut h = Harness {
            time,
            ledger: InMemoryLedger::new(),
            registry,
            loan,
            nft,
            token_id,
        };
        h.loan
            .deposit_collateral(&mut h.registry, &borrower(), h.nft.clone(), h.token_id, &h.time)
            .unwrap();
        h.loan.approve_loan_term(&lender(), &h.time).unwrap();
        h
    }

    /// funded through the bridge and principal sent out
    fn started() -> Harness {
        let mut h = harness();
        let escrow = h.loan.escrow();
        h.ledger.mint(&escrow, units(1001));
        h.loan
            .start_borrowing(&mut h.ledger, &borrower(), ClaimId::new(1), &h.time)
            .unwrap();
        h
    }

    fn advance(h: &Harness, duration: Duration) {
        h.time.test_control().unwrap().advance(duration);
    }

    fn lend_requests(loan: &BridgeLoan) -> usize {
        loan.loan()
            .events
            .events()
            .iter()
            .filter(|e| matches!(e, LoanEvent::LendRequested { .. }))
            .count()
    }

    #[test]
    fn test_funding_observed_passively() {
        let mut h = harness();

        assert_eq!(
            h.loan.lend(&h.ledger, &lender(), &h.time).unwrap(),
            FundingStatus::Pending
        );
        assert_eq!(
            h.loan.lend(&h.ledger, &lender(), &h.time).unwrap(),
            FundingStatus::Pending
        );
        assert_eq!(lend_requests(&h.loan), 1);

        // principal alone does not cover the buffer
        let escrow = h.loan.escrow();
        h.ledger.mint(&escrow, units(1000));
        assert_eq!(
            h.loan.observe_funding(&h.ledger, &h.time).unwrap(),
            FundingStatus::Pending
        );

        h.ledger.mint(&escrow, units(1));
        assert_eq!(
            h.loan.observe_funding(&h.ledger, &h.time).unwrap(),
            FundingStatus::Funded
        );
        assert_eq!(h.loan.state().principal, units(1000));

        let events = h.loan.loan().events.len();
        assert_eq!(
            h.loan.lend(&h.ledger, &lender(), &h.time).unwrap(),
            FundingStatus::Funded
        );
        assert_eq!(h.loan.loan().events.len(), events);
    }

    #[test]
    fn test_start_commits_principal_to_borrower() {
        let h = started();
        assert_eq!(h.loan.status(), LoanStatus::Started);

        let commit = &h.ledger.commits()[0];
        assert_eq!(commit.amount, units(1000));
        assert_eq!(commit.claim_id, ClaimId::new(1));
        assert_eq!(commit.destination, ExternalAccount::new("rBorrower"));
        assert_eq!(h.ledger.balance(&endpoint().door_account()), units(1000));
        assert_eq!(h.ledger.balance(&h.loan.escrow()), units(1));
        assert!(h
            .loan
            .settlements()
            .get(OperationKind::LendCommit, ClaimId::new(1))
            .is_some());
    }

    #[test]
    fn test_start_without_funding() {
        let mut h = harness();
        let err = h
            .loan
            .start_borrowing(&mut h.ledger, &borrower(), ClaimId::new(1), &h.time)
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InsufficientFunding);
        assert!(h.loan.settlements().is_empty());
        assert_eq!(h.loan.status(), LoanStatus::Activated);
    }

    #[test]
    fn test_interest_after_five_weeks() {
        let h = started();
        advance(&h, Duration::weeks(5));
        assert_eq!(
            h.loan.claimable_interest(&h.time).unwrap(),
            Amount::from_raw(9_615_384_615_384_615_384)
        );
        // only the funding buffer is in escrow so far
        assert_eq!(h.loan.available_interest(&h.ledger, &h.time).unwrap(), units(1));
    }

    #[test]
    fn test_duplicate_claim_id_rejected() {
        let mut h = started();
        advance(&h, Duration::weeks(5));
        let escrow = h.loan.escrow();
        h.ledger.mint(&escrow, units(20));

        let outcome = h
            .loan
            .claim_interest(&mut h.ledger, &lender(), ClaimId::new(2), &h.time)
            .unwrap();
        assert_eq!(
            outcome,
            ClaimOutcome::Paid {
                principal: Amount::ZERO,
                interest: Amount::from_raw(9_615_384_615_384_615_384),
            }
        );

        advance(&h, Duration::days(1));
        let state = h.loan.state().clone();
        let escrow_balance = h.ledger.balance(&escrow);
        let commits = h.ledger.commits().len();

        let err = h
            .loan
            .claim_interest(&mut h.ledger, &lender(), ClaimId::new(2), &h.time)
            .unwrap_err();
        assert_eq!(
            err,
            LoanError::DuplicateSettlement {
                kind: OperationKind::InterestClaim,
                claim_id: ClaimId::new(2),
            }
        );
        assert_eq!(h.loan.state(), &state);
        assert_eq!(h.ledger.balance(&escrow), escrow_balance);
        assert_eq!(h.ledger.commits().len(), commits);
    }

    #[test]
    fn test_redemption_through_bridge() {
        let mut h = started();
        advance(&h, Duration::weeks(5));
        let escrow = h.loan.escrow();
        h.ledger.mint(&escrow, units(20));
        h.loan
            .claim_interest(&mut h.ledger, &lender(), ClaimId::new(2), &h.time)
            .unwrap();

        let target = h.loan.redeem_principal(&h.ledger, &borrower(), &h.time).unwrap();
        assert_eq!(target, h.ledger.balance(&escrow) + units(1000));
        assert_eq!(h.loan.status(), LoanStatus::PrincipalRedeeming);

        // repayment not arrived yet
        let state = h.loan.state().clone();
        let err = h
            .loan
            .claim_interest(&mut h.ledger, &lender(), ClaimId::new(3), &h.time)
            .unwrap_err();
        assert_eq!(err, LoanError::RedemptionPending);
        assert_eq!(h.loan.state(), &state);
        assert!(h
            .loan
            .settlements()
            .get(OperationKind::InterestClaim, ClaimId::new(3))
            .is_none());
        assert!(!h.loan.confirm_redemption(&h.ledger, &relayer(), &h.time).unwrap());

        h.ledger.mint(&escrow, units(1000));
        advance(&h, Duration::days(1));
        assert!(h.loan.confirm_redemption(&h.ledger, &relayer(), &h.time).unwrap());
        assert_eq!(h.loan.status(), LoanStatus::Redeemed);
        assert_eq!(h.loan.state().current_principal, Amount::ZERO);
        assert_eq!(h.loan.state().withdrawable_principal, units(1000));

        let outcome = h
            .loan
            .claim_principal(&mut h.ledger, &mut h.registry, &lender(), ClaimId::new(4), &h.time)
            .unwrap();
        assert_eq!(
            outcome,
            ClaimOutcome::Paid {
                principal: units(1000),
                interest: Amount::from_raw(274_725_274_725_274_725),
            }
        );
        assert_eq!(h.loan.status(), LoanStatus::Completed);
        assert_eq!(h.registry.owner_of(&h.nft, h.token_id), Some(borrower()));

        let last = h.ledger.commits().last().unwrap();
        assert_eq!(last.destination, ExternalAccount::new("rLender"));
        assert_eq!(last.claim_id, ClaimId::new(4));
        assert!(h.loan.state().principal_conserved(units(1000)));
    }

    #[test]
    fn test_claim_confirms_observed_redemption() {
        let mut h = started();
        advance(&h, Duration::weeks(2));
        h.loan.redeem_principal(&h.ledger, &borrower(), &h.time).unwrap();
        let escrow = h.loan.escrow();
        h.ledger.mint(&escrow, units(1010));

        let outcome = h
            .loan
            .claim_principal(&mut h.ledger, &mut h.registry, &lender(), ClaimId::new(7), &h.time)
            .unwrap();
        assert!(matches!(outcome, ClaimOutcome::Paid { principal, .. } if principal == units(1000)));
        assert_eq!(h.loan.status(), LoanStatus::Completed);
    }

    #[test]
    fn test_unstarted_loan_defaults_and_liquidates() {
        let mut h = harness();
        assert_eq!(
            h.loan.lend(&h.ledger, &lender(), &h.time).unwrap(),
            FundingStatus::Pending
        );
        let escrow = h.loan.escrow();
        h.ledger.mint(&escrow, units(1001));

        // funding seen but the deadline has not passed
        advance(&h, Duration::weeks(20));
        let state = h.loan.state().clone();
        let err = h
            .loan
            .claim_principal(&mut h.ledger, &mut h.registry, &lender(), ClaimId::new(31), &h.time)
            .unwrap_err();
        assert_eq!(err, LoanError::NothingToClaim);
        assert_eq!(h.loan.state(), &state);

        advance(&h, Duration::weeks(1));
        let outcome = h
            .loan
            .claim_principal(&mut h.ledger, &mut h.registry, &lender(), ClaimId::new(32), &h.time)
            .unwrap();
        assert_eq!(outcome, ClaimOutcome::Defaulted);
        assert_eq!(h.loan.status(), LoanStatus::Defaulted);
        assert_eq!(h.loan.state().principal, Amount::ZERO);
        assert_eq!(h.ledger.balance(&escrow), Amount::ZERO);

        let commit = h.ledger.commits().last().unwrap();
        assert_eq!(commit.destination, ExternalAccount::new("rLender"));
        assert_eq!(commit.amount, units(1001));
        assert_eq!(commit.claim_id, ClaimId::new(32));
        assert!(h
            .loan
            .settlements()
            .get(OperationKind::PrincipalClaim, ClaimId::new(32))
            .is_some());

        h.loan
            .liquidate_collateral(&mut h.registry, &relayer(), &h.time)
            .unwrap();
        assert_eq!(
            h.registry.owner_of(&h.nft, h.token_id),
            Some(AccountId::new("admin"))
        );
    }

    #[test]
    fn test_unstarted_default_commit_failure_keeps_state() {
        let mut h = harness();
        let escrow = h.loan.escrow();
        h.ledger.mint(&escrow, units(1001));
        h.loan.observe_funding(&h.ledger, &h.time).unwrap();
        advance(&h, Duration::weeks(21));
        let state = h.loan.state().clone();

        h.ledger.freeze(&endpoint().door_account());
        let err = h
            .loan
            .claim_interest(&mut h.ledger, &lender(), ClaimId::new(40), &h.time)
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Ledger);
        assert_eq!(h.loan.state(), &state);
        assert!(h.loan.settlements().is_empty());
        assert_eq!(h.ledger.balance(&escrow), units(1001));
    }

    #[test]
    fn test_default_on_claim_after_deadline() {
        let mut h = started();
        advance(&h, Duration::weeks(21));

        let outcome = h
            .loan
            .claim_interest(&mut h.ledger, &lender(), ClaimId::new(9), &h.time)
            .unwrap();
        assert_eq!(outcome, ClaimOutcome::Defaulted);
        assert_eq!(h.loan.status(), LoanStatus::Defaulted);
        assert!(h
            .loan
            .settlements()
            .get(OperationKind::InterestClaim, ClaimId::new(9))
            .is_none());

        h.loan
            .liquidate_collateral(&mut h.registry, &relayer(), &h.time)
            .unwrap();
        assert_eq!(
            h.registry.owner_of(&h.nft, h.token_id),
            Some(AccountId::new("admin"))
        );
        let err = h
            .loan
            .liquidate_collateral(&mut h.registry, &relayer(), &h.time)
            .unwrap_err();
        assert_eq!(err, LoanError::NothingToRelease);
    }

    #[test]
    fn test_unconfirmed_redemption_defaults_after_deadline() {
        let mut h = started();
        advance(&h, Duration::weeks(19));
        h.loan.redeem_principal(&h.ledger, &borrower(), &h.time).unwrap();

        advance(&h, Duration::weeks(2));
        let outcome = h
            .loan
            .claim_principal(&mut h.ledger, &mut h.registry, &lender(), ClaimId::new(5), &h.time)
            .unwrap();
        assert_eq!(outcome, ClaimOutcome::Defaulted);
        assert_eq!(h.loan.status(), LoanStatus::Defaulted);
    }

    #[test]
    fn test_cancel_refunds_funding_and_keeps_collateral() {
        let mut h = harness();
        let escrow = h.loan.escrow();
        h.ledger.mint(&escrow, units(1001));

        let refunded = h
            .loan
            .cancel_borrowing(&mut h.ledger, &borrower(), ClaimId::new(3), &h.time)
            .unwrap();
        assert_eq!(refunded, units(1001));
        assert_eq!(h.loan.status(), LoanStatus::Cancelled);

        let commit = h.ledger.commits().last().unwrap();
        assert_eq!(commit.destination, ExternalAccount::new("rLender"));
        assert_eq!(commit.amount, units(1001));
        assert!(h.loan.loan().custody.is_held());

        h.loan
            .withdraw_collateral(&mut h.registry, &borrower(), &h.time)
            .unwrap();
        assert_eq!(h.registry.owner_of(&h.nft, h.token_id), Some(borrower()));
    }

    #[test]
    fn test_failed_commit_restores_collateral() {
        let mut h = started();
        h.loan.redeem_principal(&h.ledger, &borrower(), &h.time).unwrap();
        let escrow = h.loan.escrow();
        h.ledger.mint(&escrow, units(1000));
        h.loan
            .confirm_redemption(&h.ledger, &relayer(), &h.time)
            .unwrap();
        let state = h.loan.state().clone();

        h.ledger.freeze(&endpoint().door_account());
        let err = h
            .loan
            .claim_principal(&mut h.ledger, &mut h.registry, &lender(), ClaimId::new(4), &h.time)
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Ledger);
        assert_eq!(h.loan.state(), &state);
        assert!(h.loan.loan().custody.is_held());
        assert_eq!(h.registry.owner_of(&h.nft, h.token_id), Some(escrow.clone()));

        h.ledger.unfreeze(&endpoint().door_account());
        h.loan
            .claim_principal(&mut h.ledger, &mut h.registry, &lender(), ClaimId::new(4), &h.time)
            .unwrap();
        assert_eq!(h.loan.status(), LoanStatus::Completed);
    }

    #[test]
    fn test_settlement_confirmation() {
        let mut h = started();
        let id = ClaimId::new(1);
        assert!(h
            .loan
            .confirm_settlement(OperationKind::LendCommit, id, &h.time)
            .unwrap());
        assert!(!h
            .loan
            .confirm_settlement(OperationKind::LendCommit, id, &h.time)
            .unwrap());
        assert_eq!(
            h.loan
                .settlements()
                .get(OperationKind::LendCommit, id)
                .unwrap()
                .status,
            SettlementStatus::Confirmed
        );

        let err = h
            .loan
            .confirm_settlement(OperationKind::PrincipalClaim, id, &h.time)
            .unwrap_err();
        assert!(matches!(err, LoanError::UnknownSettlement { .. }));
    }

    #[test]
    fn test_simple_only_actions_rejected() {
        let h = started();
        let err = h
            .loan
            .loan()
            .authorize(Action::RedeemFullPrincipal, &borrower())
            .unwrap_err();
        assert!(matches!(err, LoanError::InvalidStatus { .. }));
    }

    #[test]
    fn test_builder_requires_bridge_settings() {
        let time = SafeTimeProvider::new(TimeSource::Test(
            Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
        ));
        let err = BridgeLoan::builder()
            .borrower(borrower())
            .lender(lender())
            .principal(units(1))
            .rate(Rate::from_bps(1))
            .duration(Duration::days(1))
            .build(&time)
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Configuration);
    }
}
