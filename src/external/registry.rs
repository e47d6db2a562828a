use std::collections::HashMap;

use crate::errors::RegistryError;
use crate::types::{AccountId, AssetId, TokenId};

/// non-fungible asset registry consumed by collateral custody
pub trait AssetRegistry {
    fn transfer_ownership(
        &mut self,
        asset: &AssetId,
        token_id: TokenId,
        from: &AccountId,
        to: &AccountId,
    ) -> Result<(), RegistryError>;

    fn owner_of(&self, asset: &AssetId, token_id: TokenId) -> Option<AccountId>;
}

/// in-memory registry for simulations and tests
#[derive(Debug, Clone, Default)]
pub struct InMemoryRegistry {
    owners: HashMap<(AssetId, TokenId), AccountId>,
    next_token: HashMap<AssetId, TokenId>,
    transfer_count: usize,
}

impl InMemoryRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// mint the next token of `asset` to `owner`
    pub fn mint(&mut self, asset: &AssetId, owner: &AccountId) -> TokenId {
        let next = self.next_token.entry(asset.clone()).or_insert(0);
        let token_id = *next;
        *next += 1;
        self.owners.insert((asset.clone(), token_id), owner.clone());
        token_id
    }

    /// calls that reached the registry and succeeded
    pub fn transfer_count(&self) -> usize {
        self.transfer_count
    }
}

impl AssetRegistry for InMemoryRegistry {
    fn transfer_ownership(
        &mut self,
        asset: &AssetId,
        token_id: TokenId,
        from: &AccountId,
        to: &AccountId,
    ) -> Result<(), RegistryError> {
        let owner = self
            .owners
            .get_mut(&(asset.clone(), token_id))
            .ok_or_else(|| RegistryError::UnknownToken {
                asset: asset.clone(),
                token_id,
            })?;

        if owner != from {
            return Err(RegistryError::NotOwner {
                asset: asset.clone(),
                token_id,
                account: from.clone(),
            });
        }

        *owner = to.clone();
        self.transfer_count += 1;
        Ok(())
    }

    fn owner_of(&self, asset: &AssetId, token_id: TokenId) -> Option<AccountId> {
        self.owners.get(&(asset.clone(), token_id)).cloned()
    }
}
