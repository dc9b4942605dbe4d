//! # escrow-engine — Two-Party Escrow Swap Engine
//!
//! Settles a two-asset swap through an engine-controlled holding account:
//! either the initializer's asset A is released to a taker exactly when
//! the taker delivers asset B, or the lock is reversed. No partial
//! transfer is ever reachable.
//!
//! ## Operations
//!
//! - **initialize**: lock `amount_a` in a derived holding account and open
//!   the record.
//! - **finalize**: taker pays `amount_b`, holding account releases
//!   `amount_a` and closes, record destroyed. One atomic ledger batch.
//! - **cancel**: initializer-only reversal.
//! - **expire**: permissionless reversal once the optional deadline has
//!   passed.
//! - **recover**: resolve journal entries a crash left unresolved.
//!
//! ## Crate Policy
//!
//! - Every ledger effect of an operation is submitted as one
//!   [`LedgerBatch`](escrow_ledger::LedgerBatch); there is no multi-call
//!   path that could stop halfway.
//! - All validation happens before the batch is journaled.
//! - Operations on the same `(initializer, id)` are linearized; operations
//!   on different keys run in parallel.
//! - The [`AuditTrail`] is the only record of which terminal path an
//!   escrow took.

pub mod audit;
pub mod config;
pub mod engine;
pub mod error;

pub use audit::{AuditEntry, AuditKind, AuditTrail};
pub use config::{ConfigError, EngineConfig, ReclaimPolicy};
pub use engine::{EscrowEngine, RecoveryReport};
pub use error::EscrowError;
