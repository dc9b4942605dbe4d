//! # In-Memory Ledger
//!
//! A thread-safe [`AssetLedger`] backed by a single `parking_lot::RwLock`.
//!
//! ## Atomicity
//!
//! `execute` takes the write lock, applies the batch to a scratch copy of
//! the state, and swaps the copy in only if every operation succeeded.
//! Readers hold the read lock, so they observe either the state before a
//! batch or the state after it, never a partial application.
//!
//! ## Test Support
//!
//! Outside the trait, [`MemoryLedger`] can register assets, open party
//! wallets, mint, report total supply, and inject a fault into the next
//! batch to exercise the all-or-nothing path.

use std::collections::HashMap;

use parking_lot::{Mutex, RwLock};

use escrow_core::{derive, Address, AssetId, PartyId};

use crate::account::{AssetInfo, Authority, Owner, TokenAccount};
use crate::batch::{LedgerBatch, LedgerOp};
use crate::error::{CloseError, LedgerError, TransferError};
use crate::ledger::AssetLedger;

/// Storage deposit charged per account unless configured otherwise.
pub const DEFAULT_STORAGE_DEPOSIT: u64 = 2_039_280;

#[derive(Debug, Clone, Default)]
struct LedgerState {
    assets: HashMap<AssetId, AssetInfo>,
    accounts: HashMap<Address, TokenAccount>,
    storage_credits: HashMap<PartyId, u64>,
    wallet_nonce: u64,
}

/// Thread-safe in-memory asset ledger.
#[derive(Debug)]
pub struct MemoryLedger {
    state: RwLock<LedgerState>,
    storage_deposit: u64,
    fault: Mutex<Option<usize>>,
}

impl Default for MemoryLedger {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryLedger {
    /// Create an empty ledger with the default storage deposit.
    pub fn new() -> Self {
        Self::with_storage_deposit(DEFAULT_STORAGE_DEPOSIT)
    }

    /// Create an empty ledger charging `deposit` per account.
    pub fn with_storage_deposit(deposit: u64) -> Self {
        Self {
            state: RwLock::new(LedgerState::default()),
            storage_deposit: deposit,
            fault: Mutex::new(None),
        }
    }

    /// Register a new asset with zero supply.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::AssetExists`] if the id is taken.
    pub fn create_asset(&self, id: &AssetId, decimals: u8) -> Result<(), LedgerError> {
        let mut state = self.state.write();
        if state.assets.contains_key(id) {
            return Err(LedgerError::AssetExists(id.clone()));
        }
        state.assets.insert(
            id.clone(),
            AssetInfo {
                id: id.clone(),
                decimals,
                supply: 0,
            },
        );
        Ok(())
    }

    /// Open a fresh party-owned wallet account for `asset`.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::UnknownAsset`] if the asset is not registered.
    pub fn open_account(&self, owner: &PartyId, asset: &AssetId) -> Result<Address, LedgerError> {
        let nonce = {
            let mut state = self.state.write();
            state.wallet_nonce += 1;
            state.wallet_nonce
        };
        let address = derive(
            "wallet",
            &[
                owner.as_str().as_bytes(),
                asset.as_str().as_bytes(),
                &nonce.to_le_bytes(),
            ],
        );
        self.create_account(address, asset, Owner::Party(owner.clone()), owner)
    }

    /// Mint `amount` raw units of the account's asset into `account`.
    ///
    /// # Errors
    ///
    /// Fails if the account is unknown or the mint would overflow.
    pub fn mint_to(&self, account: &Address, amount: u64) -> Result<(), LedgerError> {
        let mut state = self.state.write();
        let asset = state
            .accounts
            .get(account)
            .map(|a| a.asset.clone())
            .ok_or(LedgerError::Transfer {
                index: 0,
                source: TransferError::UnknownAccount(*account),
            })?;
        let overflow = || LedgerError::SupplyOverflow {
            asset: asset.clone(),
            amount,
        };
        let info = state
            .assets
            .get(&asset)
            .ok_or_else(|| LedgerError::UnknownAsset(asset.clone()))?;
        let supply = info.supply.checked_add(amount).ok_or_else(overflow)?;
        let balance = state.accounts[account]
            .balance
            .checked_add(amount)
            .ok_or_else(overflow)?;

        if let Some(info) = state.assets.get_mut(&asset) {
            info.supply = supply;
        }
        if let Some(acct) = state.accounts.get_mut(account) {
            acct.balance = balance;
        }
        Ok(())
    }

    /// Total supply of `asset`, or `None` if unregistered.
    pub fn total_supply(&self, asset: &AssetId) -> Option<u64> {
        self.state.read().assets.get(asset).map(|a| a.supply)
    }

    /// Sum of balances held across all accounts for `asset`.
    pub fn circulating(&self, asset: &AssetId) -> u64 {
        self.state
            .read()
            .accounts
            .values()
            .filter(|a| &a.asset == asset)
            .map(|a| a.balance)
            .sum()
    }

    /// Storage deposits reclaimed to `party` by account closes.
    pub fn storage_credit(&self, party: &PartyId) -> u64 {
        self.state
            .read()
            .storage_credits
            .get(party)
            .copied()
            .unwrap_or(0)
    }

    /// Number of live accounts.
    pub fn account_count(&self) -> usize {
        self.state.read().accounts.len()
    }

    /// Make the next batch fail at operation `index` (if it has that many
    /// operations). The fault is consumed by the next `execute` call.
    pub fn fail_next_batch_at(&self, index: usize) {
        *self.fault.lock() = Some(index);
    }

    fn apply(&self, state: &mut LedgerState, index: usize, op: &LedgerOp) -> Result<(), LedgerError> {
        match op {
            LedgerOp::CreateAccount {
                address,
                asset,
                owner,
                payer,
            } => {
                if !state.assets.contains_key(asset) {
                    return Err(LedgerError::UnknownAsset(asset.clone()));
                }
                if state.accounts.contains_key(address) {
                    return Err(LedgerError::AccountExists {
                        index,
                        address: *address,
                    });
                }
                state.accounts.insert(
                    *address,
                    TokenAccount {
                        address: *address,
                        asset: asset.clone(),
                        owner: owner.clone(),
                        balance: 0,
                        storage_payer: payer.clone(),
                        storage_deposit: self.storage_deposit,
                    },
                );
                Ok(())
            }
            LedgerOp::Transfer {
                asset,
                amount,
                from,
                to,
                authority,
            } => apply_transfer(state, asset, amount.get(), from, to, authority)
                .map_err(|source| LedgerError::Transfer { index, source }),
            LedgerOp::CloseAccount {
                account,
                authority,
                reclaim_to,
            } => apply_close(state, account, authority, reclaim_to)
                .map_err(|source| LedgerError::Close { index, source }),
        }
    }
}

fn checked_account<'a>(
    state: &'a LedgerState,
    address: &Address,
    asset: &AssetId,
) -> Result<&'a TokenAccount, TransferError> {
    let account = state
        .accounts
        .get(address)
        .ok_or(TransferError::UnknownAccount(*address))?;
    if &account.asset != asset {
        return Err(TransferError::AssetMismatch {
            account: *address,
            expected: asset.clone(),
            actual: account.asset.clone(),
        });
    }
    Ok(account)
}

fn apply_transfer(
    state: &mut LedgerState,
    asset: &AssetId,
    amount: u64,
    from: &Address,
    to: &Address,
    authority: &Authority,
) -> Result<(), TransferError> {
    let source = checked_account(state, from, asset)?;
    if !authority.controls(&source.owner) {
        return Err(TransferError::Unauthorized(*from));
    }
    if source.balance < amount {
        return Err(TransferError::InsufficientBalance {
            account: *from,
            required: amount,
            available: source.balance,
        });
    }
    let dest = checked_account(state, to, asset)?;
    if from == to {
        return Ok(());
    }
    let credited = dest
        .balance
        .checked_add(amount)
        .ok_or(TransferError::Overflow(*to))?;

    if let Some(src) = state.accounts.get_mut(from) {
        src.balance -= amount;
    }
    if let Some(dst) = state.accounts.get_mut(to) {
        dst.balance = credited;
    }
    Ok(())
}

fn apply_close(
    state: &mut LedgerState,
    account: &Address,
    authority: &Authority,
    reclaim_to: &PartyId,
) -> Result<(), CloseError> {
    let existing = state
        .accounts
        .get(account)
        .ok_or(CloseError::UnknownAccount(*account))?;
    if !authority.controls(&existing.owner) {
        return Err(CloseError::Unauthorized(*account));
    }
    if existing.balance != 0 {
        return Err(CloseError::NonZeroBalance {
            account: *account,
            balance: existing.balance,
        });
    }
    if let Some(closed) = state.accounts.remove(account) {
        let credit = state.storage_credits.entry(reclaim_to.clone()).or_insert(0);
        *credit = credit.saturating_add(closed.storage_deposit);
    }
    Ok(())
}

impl AssetLedger for MemoryLedger {
    fn asset(&self, id: &AssetId) -> Option<AssetInfo> {
        self.state.read().assets.get(id).cloned()
    }

    fn account(&self, address: &Address) -> Option<TokenAccount> {
        self.state.read().accounts.get(address).cloned()
    }

    fn execute(&self, batch: LedgerBatch) -> Result<(), LedgerError> {
        if batch.is_empty() {
            return Err(LedgerError::EmptyBatch);
        }
        let fault = self.fault.lock().take();

        let mut state = self.state.write();
        let mut scratch = state.clone();
        for (index, op) in batch.ops().iter().enumerate() {
            if fault == Some(index) {
                tracing::warn!(index, op = op.name(), "injected ledger fault, batch discarded");
                return Err(LedgerError::InjectedFault { index });
            }
            if let Err(e) = self.apply(&mut scratch, index, op) {
                tracing::warn!(index, op = op.name(), error = %e, "ledger batch rejected");
                return Err(e);
            }
        }
        *state = scratch;
        tracing::debug!(ops = batch.len(), "ledger batch committed");
        Ok(())
    }
}
