//! # Engine Errors
//!
//! Every failed operation returns exactly one [`EscrowError`]. Validation
//! failures are detected before anything is submitted to the ledger; a
//! failure returned after submission means the ledger rejected the whole
//! batch and nothing moved.
//!
//! [`EscrowError::Consistency`] is different in kind: it reports a broken
//! invariant (a holding account with the wrong balance, or one that could
//! not be closed) and is logged at `error!` before being returned.

use chrono::{DateTime, Utc};
use thiserror::Error;

use escrow_core::{Address, AssetId, EscrowId, PartyId, ValidationError};
use escrow_ledger::LedgerError;
use escrow_state::{JournalError, Leg, StateError};

use crate::config::ConfigError;

/// Errors returned by [`EscrowEngine`](crate::EscrowEngine) operations.
#[derive(Error, Debug)]
pub enum EscrowError {
    /// One leg had a zero amount.
    #[error("amount for asset {leg} must be greater than zero")]
    InvalidAmount {
        /// Which leg.
        leg: Leg,
    },

    /// Scaling a whole-unit amount by the asset's decimals overflowed.
    #[error("{units} units of asset {leg} at {decimals} decimals overflows u64")]
    AmountOverflow {
        /// Which leg.
        leg: Leg,
        /// Requested whole units.
        units: u64,
        /// The asset's decimals.
        decimals: u8,
    },

    /// The escrow id was rejected.
    #[error("invalid escrow identifier: {0}")]
    InvalidIdentifier(#[source] ValidationError),

    /// The asset is not registered on the ledger.
    #[error("unknown asset {0}")]
    UnknownAsset(AssetId),

    /// A live record already exists for this `(initializer, id)`.
    #[error("escrow {id} already open for initializer {initializer}")]
    DuplicateEscrow {
        /// Initializer.
        initializer: PartyId,
        /// Escrow id.
        id: EscrowId,
    },

    /// No open record exists for this `(initializer, id)`: it was never
    /// created, or it has already been finalized, cancelled or expired.
    #[error("escrow {id} of initializer {initializer} is not open")]
    EscrowNotOpen {
        /// Initializer.
        initializer: PartyId,
        /// Escrow id.
        id: EscrowId,
    },

    /// A paying account holds less than the operation requires.
    #[error("account {account} holds {available}, needs {required}")]
    InsufficientBalance {
        /// The paying account.
        account: Address,
        /// Amount required.
        required: u64,
        /// Amount held.
        available: u64,
    },

    /// The caller may not perform this operation.
    #[error("{party} is not authorized: {reason}")]
    AuthorizationFailed {
        /// The rejected party.
        party: PartyId,
        /// Why.
        reason: &'static str,
    },

    /// An account named by the caller is missing, holds the wrong asset,
    /// or belongs to the wrong party.
    #[error("invalid account {account}: {reason}")]
    InvalidAccount {
        /// The rejected account.
        account: Address,
        /// Why.
        reason: String,
    },

    /// The finalize deadline has passed.
    #[error("escrow {id} expired at {expires_at}")]
    EscrowExpired {
        /// Escrow id.
        id: EscrowId,
        /// The deadline.
        expires_at: DateTime<Utc>,
    },

    /// Expire was requested before the deadline, or the escrow has none.
    #[error("escrow {id} has not expired")]
    NotExpired {
        /// Escrow id.
        id: EscrowId,
        /// The deadline, if one is set.
        expires_at: Option<DateTime<Utc>>,
    },

    /// The ledger rejected the batch. Nothing was applied.
    #[error("ledger rejected settlement: {0}")]
    TransferFailed(#[source] LedgerError),

    /// An invariant between record and holding account is broken.
    #[error("consistency violation at escrow {escrow}: {detail}")]
    Consistency {
        /// Record address.
        escrow: Address,
        /// What was found.
        detail: String,
    },

    /// Record state machine rejected a transition.
    #[error(transparent)]
    State(#[from] StateError),

    /// Settlement journal failure.
    #[error(transparent)]
    Journal(#[from] JournalError),

    /// Configuration failure.
    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl EscrowError {
    /// Whether this error reports a broken invariant rather than a
    /// rejected request.
    pub fn is_consistency_violation(&self) -> bool {
        matches!(self, Self::Consistency { .. })
    }
}
