use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::amount::Amount;
use crate::settlement::OperationKind;
use crate::types::{AccountId, AssetId, ClaimId, LoanId, LoanStatus, TokenId};

/// all events that can be emitted by a loan
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum LoanEvent {
    // lifecycle events
    LoanCreated {
        loan_id: LoanId,
        borrower: AccountId,
        lender: AccountId,
        requested_principal: Amount,
        timestamp: DateTime<Utc>,
    },
    LoanTermApproved {
        loan_id: LoanId,
        timestamp: DateTime<Utc>,
    },
    BorrowingStarted {
        loan_id: LoanId,
        principal: Amount,
        deadline: DateTime<Utc>,
        timestamp: DateTime<Utc>,
    },
    BorrowingCancelled {
        loan_id: LoanId,
        refunded: Amount,
        timestamp: DateTime<Utc>,
    },
    LoanCompleted {
        loan_id: LoanId,
        timestamp: DateTime<Utc>,
    },
    LoanDefaulted {
        loan_id: LoanId,
        outstanding_principal: Amount,
        deadline: DateTime<Utc>,
        timestamp: DateTime<Utc>,
    },

    // funding events
    LendRequested {
        loan_id: LoanId,
        required: Amount,
        timestamp: DateTime<Utc>,
    },
    LoanFunded {
        loan_id: LoanId,
        amount: Amount,
        timestamp: DateTime<Utc>,
    },
    FundingRefunded {
        loan_id: LoanId,
        amount: Amount,
        timestamp: DateTime<Utc>,
    },

    // collateral events
    CollateralDeposited {
        loan_id: LoanId,
        asset: AssetId,
        token_id: TokenId,
        timestamp: DateTime<Utc>,
    },
    CollateralReleased {
        loan_id: LoanId,
        asset: AssetId,
        token_id: TokenId,
        to: AccountId,
        timestamp: DateTime<Utc>,
    },
    CollateralLiquidated {
        loan_id: LoanId,
        asset: AssetId,
        token_id: TokenId,
        liquidator: AccountId,
        timestamp: DateTime<Utc>,
    },

    // principal events
    PrincipalRedeemed {
        loan_id: LoanId,
        amount: Amount,
        remaining: Amount,
        timestamp: DateTime<Utc>,
    },
    RedemptionRequested {
        loan_id: LoanId,
        amount: Amount,
        target_balance: Amount,
        timestamp: DateTime<Utc>,
    },
    PrincipalClaimed {
        loan_id: LoanId,
        amount: Amount,
        timestamp: DateTime<Utc>,
    },

    // interest events
    InterestCheckpointed {
        loan_id: LoanId,
        accumulated: Amount,
        principal: Amount,
        timestamp: DateTime<Utc>,
    },
    InterestPaid {
        loan_id: LoanId,
        amount: Amount,
        timestamp: DateTime<Utc>,
    },
    InterestClaimed {
        loan_id: LoanId,
        amount: Amount,
        timestamp: DateTime<Utc>,
    },

    // settlement events
    SettlementRecorded {
        loan_id: LoanId,
        kind: OperationKind,
        claim_id: ClaimId,
        amount: Amount,
        timestamp: DateTime<Utc>,
    },
    SettlementConfirmed {
        loan_id: LoanId,
        kind: OperationKind,
        claim_id: ClaimId,
        timestamp: DateTime<Utc>,
    },

    // status change events
    StatusChanged {
        loan_id: LoanId,
        old_status: LoanStatus,
        new_status: LoanStatus,
        reason: String,
        timestamp: DateTime<Utc>,
    },
}

/// event store for collecting events during operations
#[derive(Debug, Clone, Default)]
pub struct EventStore {
    events: Vec<LoanEvent>,
}

impl EventStore {
    pub fn new() -> Self {
        Self { events: Vec::new() }
    }

    pub fn emit(&mut self, event: LoanEvent) {
        self.events.push(event);
    }

    pub fn take_events(&mut self) -> Vec<LoanEvent> {
        std::mem::take(&mut self.events)
    }

    pub fn events(&self) -> &[LoanEvent] {
        &self.events
    }

    pub fn clear(&mut self) {
        self.events.clear();
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}
