//! # escrow-core — Foundational Types for the Escrow Swap Stack
//!
//! Leaf of the crate DAG. Every other `escrow-*` crate depends on it; it
//! depends on nothing internal.
//!
//! ## Key Design Principles
//!
//! 1. **Newtype wrappers for identifiers.** `PartyId`, `AssetId` and
//!    `EscrowId` are distinct validated types. A party name cannot be passed
//!    where an asset is expected.
//!
//! 2. **Amounts are never zero.** [`Amount`] rejects zero at construction,
//!    so a record holding an `Amount` needs no further positivity check.
//!
//! 3. **Locations are derived, not stored.** [`derive`] maps seed parts to
//!    an [`Address`] deterministically. Any party can recompute where an
//!    escrow record and its holding account live without a registry.
//!
//! ## Crate Policy
//!
//! - No dependencies on other `escrow-*` crates.
//! - No `unsafe` code.
//! - No `panic!()` or `.unwrap()` outside tests.

pub mod amount;
pub mod derive;
pub mod error;
pub mod identity;

pub use amount::Amount;
pub use derive::{derive, escrow_record_address, holding_account_address, Address};
pub use error::ValidationError;
pub use identity::{AssetId, EscrowId, PartyId, MAX_ESCROW_ID_LEN};
