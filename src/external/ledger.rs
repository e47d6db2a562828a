use std::collections::HashMap;

use crate::amount::Amount;
use crate::errors::LedgerError;
use crate::external::bridge::BridgeCommit;
use crate::types::AccountId;

/// value ledger consumed by the loan
pub trait ValueLedger {
    fn transfer(&mut self, from: &AccountId, to: &AccountId, amount: Amount)
        -> Result<(), LedgerError>;

    fn balance_of(&self, account: &AccountId) -> Amount;
}

/// one leg of a multi-transfer operation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transfer {
    pub from: AccountId,
    pub to: AccountId,
    pub amount: Amount,
}

/// ordered transfers executed all-or-nothing
///
/// A failing leg reverses the legs already executed. A completed batch can
/// be reverted later if a step after it fails.
#[derive(Debug, Clone, Default)]
pub struct TransferBatch {
    transfers: Vec<Transfer>,
}

impl TransferBatch {
    pub fn new() -> Self {
        Self::default()
    }

    /// add a leg; zero amounts are skipped
    pub fn push(&mut self, from: &AccountId, to: &AccountId, amount: Amount) {
        if amount.is_zero() {
            return;
        }
        self.transfers.push(Transfer {
            from: from.clone(),
            to: to.clone(),
            amount,
        });
    }

    pub fn is_empty(&self) -> bool {
        self.transfers.is_empty()
    }

    pub fn execute(&self, ledger: &mut dyn ValueLedger) -> Result<(), LedgerError> {
        for (done, transfer) in self.transfers.iter().enumerate() {
            if let Err(err) = ledger.transfer(&transfer.from, &transfer.to, transfer.amount) {
                tracing::warn!(error = %err, leg = done, "transfer batch failed, reverting");
                Self::unwind(&self.transfers[..done], ledger);
                return Err(err);
            }
        }
        Ok(())
    }

    /// undo an executed batch
    pub fn revert(&self, ledger: &mut dyn ValueLedger) {
        Self::unwind(&self.transfers, ledger);
    }

    fn unwind(executed: &[Transfer], ledger: &mut dyn ValueLedger) {
        for transfer in executed.iter().rev() {
            if let Err(err) = ledger.transfer(&transfer.to, &transfer.from, transfer.amount) {
                tracing::error!(
                    error = %err,
                    from = %transfer.to,
                    to = %transfer.from,
                    amount = %transfer.amount,
                    "failed to reverse transfer"
                );
            }
        }
    }
}

/// in-memory ledger for simulations and tests
#[derive(Debug, Clone, Default)]
pub struct InMemoryLedger {
    balances: HashMap<AccountId, Amount>,
    frozen: Vec<AccountId>,
    transfer_count: usize,
    commits: Vec<BridgeCommit>,
}

impl InMemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// credit value arriving from outside the ledger
    pub fn mint(&mut self, account: &AccountId, amount: Amount) {
        *self.balances.entry(account.clone()).or_default() += amount;
    }

    pub fn balance(&self, account: &AccountId) -> Amount {
        self.balances.get(account).copied().unwrap_or_default()
    }

    /// reject every transfer touching `account`
    pub fn freeze(&mut self, account: &AccountId) {
        self.frozen.push(account.clone());
    }

    pub fn unfreeze(&mut self, account: &AccountId) {
        self.frozen.retain(|a| a != account);
    }

    /// successful transfers so far
    pub fn transfer_count(&self) -> usize {
        self.transfer_count
    }

    /// bridge commits accepted so far
    pub fn commits(&self) -> &[BridgeCommit] {
        &self.commits
    }

    pub(crate) fn record_commit(&mut self, commit: BridgeCommit) {
        self.commits.push(commit);
    }

    pub(crate) fn move_value(
        &mut self,
        from: &AccountId,
        to: &AccountId,
        amount: Amount,
    ) -> Result<(), LedgerError> {
        if let Some(account) = self.frozen.iter().find(|a| *a == from || *a == to) {
            return Err(LedgerError::Rejected {
                reason: format!("account {} is frozen", account),
            });
        }

        let available = self.balance(from);
        let remaining = available
            .checked_sub(amount)
            .ok_or_else(|| LedgerError::InsufficientBalance {
                account: from.clone(),
                available,
                requested: amount,
            })?;

        self.balances.insert(from.clone(), remaining);
        *self.balances.entry(to.clone()).or_default() += amount;
        self.transfer_count += 1;
        Ok(())
    }
}

impl ValueLedger for InMemoryLedger {
    fn transfer(
        &mut self,
        from: &AccountId,
        to: &AccountId,
        amount: Amount,
    ) -> Result<(), LedgerError> {
        self.move_value(from, to, amount)
    }

    fn balance_of(&self, account: &AccountId) -> Amount {
        self.balance(account)
    }
}
