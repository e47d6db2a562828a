use serde::{Deserialize, Serialize};

use crate::amount::Amount;
use crate::errors::LedgerError;
use crate::external::ledger::InMemoryLedger;
use crate::types::{AccountId, BridgeEndpoint, ClaimId, ExternalAccount};

/// value sent across the bridge
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BridgeCommit {
    pub from: AccountId,
    pub amount: Amount,
    pub claim_id: ClaimId,
    pub destination: ExternalAccount,
    pub endpoint: BridgeEndpoint,
}

/// cross-ledger bridge consumed by bridge loans
///
/// Funding is never pushed: the loan reads `observed_balance` for its
/// escrow and decides locally once enough value has arrived.
pub trait CrossChainBridge {
    fn observed_balance(&self, account: &AccountId) -> Amount;

    /// hand value to the bridge door; the claim id is forwarded untouched
    fn commit(&mut self, commit: BridgeCommit) -> Result<(), LedgerError>;
}

impl CrossChainBridge for InMemoryLedger {
    fn observed_balance(&self, account: &AccountId) -> Amount {
        self.balance(account)
    }

    fn commit(&mut self, commit: BridgeCommit) -> Result<(), LedgerError> {
        let door = commit.endpoint.door_account();
        self.move_value(&commit.from, &door, commit.amount)?;
        tracing::debug!(
            claim_id = %commit.claim_id,
            amount = %commit.amount,
            destination = %commit.destination,
            "bridge commit"
        );
        self.record_commit(commit);
        Ok(())
    }
}
