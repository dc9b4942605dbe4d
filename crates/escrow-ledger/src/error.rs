//! # Ledger Errors
//!
//! [`TransferError`] and [`CloseError`] describe why a single operation
//! was refused. [`LedgerError`] wraps them with the index of the failing
//! operation inside its batch; the batch as a whole was not applied.

use thiserror::Error;

use escrow_core::{Address, AssetId};

/// Why a transfer was refused.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransferError {
    /// One of the accounts does not exist.
    #[error("unknown account {0}")]
    UnknownAccount(Address),

    /// An account holds a different asset than the one being moved.
    #[error("account {account} holds {actual}, transfer is for {expected}")]
    AssetMismatch {
        /// The mismatched account.
        account: Address,
        /// Asset named by the transfer.
        expected: AssetId,
        /// Asset the account actually holds.
        actual: AssetId,
    },

    /// The debited account holds less than the amount.
    #[error("account {account} holds {available}, transfer requires {required}")]
    InsufficientBalance {
        /// Debited account.
        account: Address,
        /// Amount requested.
        required: u64,
        /// Balance available.
        available: u64,
    },

    /// The authority does not control the debited account.
    #[error("authority does not control account {0}")]
    Unauthorized(Address),

    /// Crediting the destination would overflow its balance.
    #[error("balance overflow on account {0}")]
    Overflow(Address),
}

/// Why an account close was refused.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CloseError {
    /// The account does not exist.
    #[error("unknown account {0}")]
    UnknownAccount(Address),

    /// Only empty accounts can be closed.
    #[error("account {account} still holds {balance}")]
    NonZeroBalance {
        /// The account.
        account: Address,
        /// Its remaining balance.
        balance: u64,
    },

    /// The authority does not control the account.
    #[error("authority does not control account {0}")]
    Unauthorized(Address),
}

/// A batch was rejected. Nothing in it was applied.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LedgerError {
    /// A transfer in the batch failed.
    #[error("op {index}: transfer failed: {source}")]
    Transfer {
        /// Position of the failing operation.
        index: usize,
        /// Underlying cause.
        #[source]
        source: TransferError,
    },

    /// An account close in the batch failed.
    #[error("op {index}: close failed: {source}")]
    Close {
        /// Position of the failing operation.
        index: usize,
        /// Underlying cause.
        #[source]
        source: CloseError,
    },

    /// An account already exists at the requested address.
    #[error("op {index}: account {address} already exists")]
    AccountExists {
        /// Position of the failing operation.
        index: usize,
        /// The occupied address.
        address: Address,
    },

    /// The asset is not registered on this ledger.
    #[error("unknown asset {0}")]
    UnknownAsset(AssetId),

    /// An asset with this identifier is already registered.
    #[error("asset {0} already exists")]
    AssetExists(AssetId),

    /// Minting would overflow the asset's supply or the account balance.
    #[error("mint of {amount} overflows supply of {asset}")]
    SupplyOverflow {
        /// Asset being minted.
        asset: AssetId,
        /// Requested amount.
        amount: u64,
    },

    /// Empty batches are rejected.
    #[error("batch contains no operations")]
    EmptyBatch,

    /// A fault injected through `MemoryLedger::fail_next_batch_at`.
    #[error("op {index}: injected fault")]
    InjectedFault {
        /// Position of the failing operation.
        index: usize,
    },
}

impl LedgerError {
    /// The transfer failure behind this error, if any.
    pub fn transfer_error(&self) -> Option<&TransferError> {
        match self {
            Self::Transfer { source, .. } => Some(source),
            _ => None,
        }
    }

    /// The close failure behind this error, if any.
    pub fn close_error(&self) -> Option<&CloseError> {
        match self {
            Self::Close { source, .. } => Some(source),
            _ => None,
        }
    }
}
