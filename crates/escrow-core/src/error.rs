//! # Validation Errors
//!
//! Construction-time failures for the domain newtypes in this crate.
//! Each variant names the identifier kind and the offending value so the
//! caller can report it without re-parsing.

use thiserror::Error;

/// Error returned when a domain primitive fails validation.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// The identifier was empty.
    #[error("{kind} must not be empty")]
    Empty {
        /// Identifier kind (e.g. "escrow id").
        kind: &'static str,
    },

    /// The identifier exceeded its maximum length in bytes.
    #[error("{kind} is {actual} bytes, maximum is {max}")]
    TooLong {
        /// Identifier kind.
        kind: &'static str,
        /// Maximum permitted length.
        max: usize,
        /// Actual length.
        actual: usize,
    },

    /// The identifier contained a character outside printable ASCII.
    #[error("{kind} contains invalid character {ch:?}: {value}")]
    InvalidCharacter {
        /// Identifier kind.
        kind: &'static str,
        /// The rejected character.
        ch: char,
        /// The full rejected value.
        value: String,
    },

    /// Amounts must be strictly positive.
    #[error("amount must be greater than zero")]
    ZeroAmount,

    /// Scaling a whole-unit amount by the asset's decimals overflowed `u64`.
    #[error("amount {units} with {decimals} decimals overflows u64")]
    AmountOverflow {
        /// Whole units requested.
        units: u64,
        /// Decimal places of the asset.
        decimals: u8,
    },
}
