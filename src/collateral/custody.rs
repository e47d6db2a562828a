use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::errors::{LoanError, Result};
use crate::external::AssetRegistry;
use crate::types::{AccountId, AssetId, TokenId};

/// who holds the collateral token
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum CustodyOwner {
    /// held by the loan's vault
    Vault,
    /// handed out; the loan no longer owns it
    ReleasedTo(AccountId),
}

/// the single collateral slot of a loan
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollateralRecord {
    pub asset: AssetId,
    pub token_id: TokenId,
    pub owner: CustodyOwner,
    pub depositor: AccountId,
    pub deposited_at: DateTime<Utc>,
    pub released_at: Option<DateTime<Utc>>,
}

impl CollateralRecord {
    pub fn is_held(&self) -> bool {
        self.owner == CustodyOwner::Vault
    }
}

/// custody of one non-fungible token per loan
///
/// The only component that asks the registry to move collateral.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CollateralCustody {
    vault: AccountId,
    record: Option<CollateralRecord>,
}

impl CollateralCustody {
    pub fn new(vault: AccountId) -> Self {
        Self {
            vault,
            record: None,
        }
    }

    pub fn vault(&self) -> &AccountId {
        &self.vault
    }

    pub fn record(&self) -> Option<&CollateralRecord> {
        self.record.as_ref()
    }

    pub fn is_held(&self) -> bool {
        self.record.as_ref().map(|r| r.is_held()).unwrap_or(false)
    }

    /// move the token from `depositor` into the vault
    pub fn deposit(
        &mut self,
        registry: &mut dyn AssetRegistry,
        asset: AssetId,
        token_id: TokenId,
        depositor: &AccountId,
        now: DateTime<Utc>,
    ) -> Result<&CollateralRecord> {
        if let Some(existing) = &self.record {
            return Err(LoanError::CollateralAlreadyDeposited {
                asset: existing.asset.clone(),
                token_id: existing.token_id,
            });
        }

        registry.transfer_ownership(&asset, token_id, depositor, &self.vault)?;

        Ok(&*self.record.insert(CollateralRecord {
            asset,
            token_id,
            owner: CustodyOwner::Vault,
            depositor: depositor.clone(),
            deposited_at: now,
            released_at: None,
        }))
    }

    /// hand the token to `destination`
    ///
    /// Fails with [`LoanError::NothingToRelease`] once released, without
    /// touching the registry.
    pub fn release(
        &mut self,
        registry: &mut dyn AssetRegistry,
        destination: &AccountId,
        now: DateTime<Utc>,
    ) -> Result<CollateralRecord> {
        let record = match self.record.as_mut() {
            Some(record) if record.is_held() => record,
            _ => return Err(LoanError::NothingToRelease),
        };

        registry.transfer_ownership(&record.asset, record.token_id, &self.vault, destination)?;

        record.owner = CustodyOwner::ReleasedTo(destination.clone());
        record.released_at = Some(now);
        Ok(record.clone())
    }

    /// put a released token back in the vault
    ///
    /// Used to undo a release when a later step of the same operation fails.
    pub(crate) fn restore(
        &mut self,
        registry: &mut dyn AssetRegistry,
        from: &AccountId,
    ) -> Result<()> {
        let record = match self.record.as_mut() {
            Some(record) if record.owner == CustodyOwner::ReleasedTo(from.clone()) => record,
            _ => return Err(LoanError::NothingToRelease),
        };

        registry.transfer_ownership(&record.asset, record.token_id, from, &self.vault)?;

        record.owner = CustodyOwner::Vault;
        record.released_at = None;
        Ok(())
    }
}
