//! # Asset Ledger Capability
//!
//! The contract the escrow engine holds against whatever ledger actually
//! stores balances: a chain client, a database, or [`MemoryLedger`].
//!
//! ## Atomicity
//!
//! [`AssetLedger::execute`] is the only write path. Implementations must
//! apply a batch completely or not at all, with no intermediate state
//! visible to concurrent readers. The single-operation helpers are thin
//! wrappers that submit one-element batches.
//!
//! [`MemoryLedger`]: crate::MemoryLedger

use escrow_core::{Address, Amount, AssetId, PartyId};

use crate::account::{AssetInfo, Authority, Owner, TokenAccount};
use crate::batch::{LedgerBatch, LedgerOp};
use crate::error::LedgerError;

/// Read and atomic-write access to an asset ledger.
pub trait AssetLedger: Send + Sync {
    /// Metadata for a registered asset.
    fn asset(&self, id: &AssetId) -> Option<AssetInfo>;

    /// Snapshot of the account at `address`, if it exists.
    fn account(&self, address: &Address) -> Option<TokenAccount>;

    /// Apply every operation in `batch`, or none of them.
    ///
    /// # Errors
    ///
    /// Returns the first failing operation's error. The ledger is left
    /// exactly as it was before the call.
    fn execute(&self, batch: LedgerBatch) -> Result<(), LedgerError>;

    /// Move `amount` of `asset` from `from` to `to`.
    fn transfer(
        &self,
        asset: &AssetId,
        amount: Amount,
        from: &Address,
        to: &Address,
        authority: Authority,
    ) -> Result<(), LedgerError> {
        self.execute(LedgerBatch::single(LedgerOp::Transfer {
            asset: asset.clone(),
            amount,
            from: *from,
            to: *to,
            authority,
        }))
    }

    /// Allocate a zero-balance account at `address`.
    fn create_account(
        &self,
        address: Address,
        asset: &AssetId,
        owner: Owner,
        payer: &PartyId,
    ) -> Result<Address, LedgerError> {
        self.execute(LedgerBatch::single(LedgerOp::CreateAccount {
            address,
            asset: asset.clone(),
            owner,
            payer: payer.clone(),
        }))?;
        Ok(address)
    }

    /// Delete an empty account, returning its storage deposit to
    /// `reclaim_to`.
    fn close_account(
        &self,
        account: &Address,
        authority: Authority,
        reclaim_to: &PartyId,
    ) -> Result<(), LedgerError> {
        self.execute(LedgerBatch::single(LedgerOp::CloseAccount {
            account: *account,
            authority,
            reclaim_to: reclaim_to.clone(),
        }))
    }

    /// Balance of `address`, or `None` if the account does not exist.
    fn balance(&self, address: &Address) -> Option<u64> {
        self.account(address).map(|a| a.balance)
    }
}

impl<L: AssetLedger + ?Sized> AssetLedger for std::sync::Arc<L> {
    fn asset(&self, id: &AssetId) -> Option<AssetInfo> {
        (**self).asset(id)
    }

    fn account(&self, address: &Address) -> Option<TokenAccount> {
        (**self).account(address)
    }

    fn execute(&self, batch: LedgerBatch) -> Result<(), LedgerError> {
        (**self).execute(batch)
    }
}
