//! # Operation Batches
//!
//! A [`LedgerBatch`] is the ledger's atomic unit of work: an ordered list
//! of [`LedgerOp`]s that commit together or not at all. The escrow engine
//! expresses each of its operations as exactly one batch, so a failure in
//! any step leaves balances and accounts untouched.

use serde::{Deserialize, Serialize};

use escrow_core::{Address, Amount, AssetId, PartyId};

use crate::account::{Authority, Owner};

/// A single ledger operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum LedgerOp {
    /// Allocate a zero-balance account at `address`.
    CreateAccount {
        /// Location of the new account.
        address: Address,
        /// Asset the account will hold.
        asset: AssetId,
        /// Controlling owner.
        owner: Owner,
        /// Party funding the storage deposit.
        payer: PartyId,
    },
    /// Move `amount` of `asset` from `from` to `to`.
    Transfer {
        /// Asset being moved.
        asset: AssetId,
        /// Raw quantity.
        amount: Amount,
        /// Debited account.
        from: Address,
        /// Credited account.
        to: Address,
        /// Signer for `from`.
        authority: Authority,
    },
    /// Delete a zero-balance account and return its storage deposit.
    CloseAccount {
        /// Account to close.
        account: Address,
        /// Signer for `account`.
        authority: Authority,
        /// Party receiving the storage deposit.
        reclaim_to: PartyId,
    },
}

impl LedgerOp {
    /// Short operation name for logs.
    pub fn name(&self) -> &'static str {
        match self {
            Self::CreateAccount { .. } => "create_account",
            Self::Transfer { .. } => "transfer",
            Self::CloseAccount { .. } => "close_account",
        }
    }
}

/// An ordered, all-or-nothing list of ledger operations.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerBatch {
    ops: Vec<LedgerOp>,
}

impl LedgerBatch {
    /// Create an empty batch.
    pub fn new() -> Self {
        Self::default()
    }

    /// A batch holding one operation.
    pub fn single(op: LedgerOp) -> Self {
        Self { ops: vec![op] }
    }

    /// Append an operation, builder style.
    pub fn with(mut self, op: LedgerOp) -> Self {
        self.ops.push(op);
        self
    }

    /// Append an operation.
    pub fn push(&mut self, op: LedgerOp) {
        self.ops.push(op);
    }

    /// The operations in execution order.
    pub fn ops(&self) -> &[LedgerOp] {
        &self.ops
    }

    /// Number of operations.
    pub fn len(&self) -> usize {
        self.ops.len()
    }

    /// Whether the batch has no operations.
    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }
}

impl IntoIterator for LedgerBatch {
    type Item = LedgerOp;
    type IntoIter = std::vec::IntoIter<LedgerOp>;

    fn into_iter(self) -> Self::IntoIter {
        self.ops.into_iter()
    }
}
