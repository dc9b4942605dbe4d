//! # Error Types
//!
//! Structured errors for record construction, state transitions and the
//! settlement journal. Transition errors carry both the current and the
//! attempted state.

use thiserror::Error;

use crate::journal::JournalPhase;
use crate::record::Leg;
use crate::state::EscrowState;

/// Errors constructing or transitioning an escrow record.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StateError {
    /// One leg of the swap had a zero amount.
    #[error("amount for asset {leg} must be greater than zero")]
    InvalidAmount {
        /// Which leg was rejected.
        leg: Leg,
    },

    /// The record is not open.
    #[error("escrow is {state}, not OPEN")]
    NotOpen {
        /// Current state.
        state: EscrowState,
    },

    /// The requested transition is not part of the state machine.
    #[error("invalid escrow transition from {from} to {to}")]
    InvalidTransition {
        /// Current state.
        from: EscrowState,
        /// Attempted target state.
        to: EscrowState,
    },
}

/// Errors in the settlement journal.
#[derive(Error, Debug)]
pub enum JournalError {
    /// No entry with this sequence number.
    #[error("no journal entry with sequence {0}")]
    UnknownEntry(u64),

    /// The entry has already been committed or aborted.
    #[error("journal entry {seq} already {phase}")]
    AlreadyResolved {
        /// Sequence number.
        seq: u64,
        /// Phase it was resolved to.
        phase: JournalPhase,
    },

    /// The journal could not be (de)serialized.
    #[error("journal serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
