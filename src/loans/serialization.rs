/// serialization support for loans
use chrono::{DateTime, Utc};
use hourglass_rs::SafeTimeProvider;
use serde::{Deserialize, Serialize};

use crate::amount::{Amount, Rate};
use crate::collateral::CollateralRecord;
use crate::config::SettlementAsset;
use crate::errors::Result;
use crate::lifecycle::Parties;
use crate::loan::Loan;
use crate::loans::{BridgeLoan, SimpleLoan};
use crate::settlement::CorrelationEntry;
use crate::types::{BridgeEndpoint, ExternalAccount, LoanId, LoanStatus, LoanVariant};

/// serializable view of a loan's state
#[derive(Debug, Serialize, Deserialize)]
pub struct LoanView {
    pub id: LoanId,
    pub variant: LoanVariant,
    pub status: LoanStatus,
    pub parties: Parties,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub deadline: Option<DateTime<Utc>>,
    pub as_of: DateTime<Utc>,
    pub principal: PrincipalView,
    pub interest: InterestView,
    pub collateral: Option<CollateralRecord>,
    pub settlements: Vec<CorrelationEntry>,
    pub terms: TermsView,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct PrincipalView {
    pub requested: Amount,
    pub funded: Amount,
    pub outstanding: Amount,
    pub withdrawable: Amount,
    pub claimed: Amount,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct InterestView {
    pub accrued: Amount,
    pub unpaid: Amount,
    pub since_checkpoint: Amount,
    pub paid: Amount,
    pub claimed: Amount,
    pub claimable: Amount,
    pub checkpoint_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct TermsView {
    pub asset: SettlementAsset,
    pub annual_rate: Rate,
    pub duration_secs: u64,
    pub day_count_convention: String,
}

impl LoanView {
    pub fn from_loan(loan: &Loan, now: DateTime<Utc>) -> Result<Self> {
        let state = &loan.state;
        Ok(LoanView {
            id: loan.id,
            variant: loan.variant(),
            status: state.status,
            parties: loan.config.parties.clone(),
            created_at: state.created_at,
            started_at: state.started_at,
            deadline: loan.deadline(),
            as_of: now,
            principal: PrincipalView {
                requested: loan.config.terms.requested_principal,
                funded: state.principal,
                outstanding: state.current_principal,
                withdrawable: state.withdrawable_principal,
                claimed: state.claimed_principal,
            },
            interest: InterestView {
                accrued: loan.accrued_interest(now)?,
                unpaid: loan.unpaid_interest(now)?,
                since_checkpoint: loan.interest_since_checkpoint(now)?.interest_amount,
                paid: state.paid_interest,
                claimed: state.claimed_interest,
                claimable: loan.claimable_interest(now)?,
                checkpoint_at: state.checkpoint.timestamp,
            },
            collateral: loan.custody.record().cloned(),
            settlements: loan.settlements.entries().cloned().collect(),
            terms: TermsView {
                asset: loan.config.asset.clone(),
                annual_rate: loan.config.terms.annual_rate,
                duration_secs: loan.config.terms.duration_secs,
                day_count_convention: format!("{:?}", loan.config.interest.day_count_convention),
            },
        })
    }

    /// convert to pretty-printed json string
    pub fn to_json_pretty(&self) -> std::result::Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

/// bridge loan specific view
#[derive(Debug, Serialize, Deserialize)]
pub struct BridgeLoanView {
    pub loan: LoanView,
    pub endpoint: BridgeEndpoint,
    pub borrower_external: ExternalAccount,
    pub lender_external: ExternalAccount,
    pub funding_target: Amount,
    pub lend_requested: bool,
    pub redemption_target: Option<Amount>,
    pub pending_settlements: usize,
}

impl BridgeLoanView {
    pub fn from_bridge_loan(loan: &BridgeLoan, now: DateTime<Utc>) -> Result<Self> {
        let inner = loan.loan();
        let view = LoanView::from_loan(inner, now)?;
        let (endpoint, borrower_external, lender_external) = match &inner.config.bridge {
            Some(bridge) => (
                bridge.endpoint.clone(),
                bridge.borrower_external.clone(),
                bridge.lender_external.clone(),
            ),
            None => (
                BridgeEndpoint::new(""),
                ExternalAccount::new(""),
                ExternalAccount::new(""),
            ),
        };

        Ok(BridgeLoanView {
            loan: view,
            endpoint,
            borrower_external,
            lender_external,
            funding_target: inner.config.funding_target(),
            lend_requested: inner.state.lend_requested,
            redemption_target: inner.state.redemption_target,
            pending_settlements: inner.settlements.pending().count(),
        })
    }

    pub fn to_json_pretty(&self) -> std::result::Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

impl SimpleLoan {
    pub fn view(&self, time_provider: &SafeTimeProvider) -> Result<LoanView> {
        LoanView::from_loan(self.loan(), time_provider.now())
    }

    /// pretty json of the current view, for logs and demos
    pub fn json(&self, time_provider: &SafeTimeProvider) -> String {
        match self.view(time_provider) {
            Ok(view) => view
                .to_json_pretty()
                .unwrap_or_else(|e| format!("JSON error: {}", e)),
            Err(e) => format!("view error: {}", e),
        }
    }
}

impl BridgeLoan {
    pub fn view(&self, time_provider: &SafeTimeProvider) -> Result<BridgeLoanView> {
        BridgeLoanView::from_bridge_loan(self, time_provider.now())
    }

    pub fn json(&self, time_provider: &SafeTimeProvider) -> String {
        match self.view(time_provider) {
            Ok(view) => view
                .to_json_pretty()
                .unwrap_or_else(|e| format!("JSON error: {}", e)),
            Err(e) => format!("view error: {}", e),
        }
    }
}
