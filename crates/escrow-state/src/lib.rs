//! # escrow-state — Escrow Record and Lifecycle
//!
//! - **State** ([`state`]): `Open → Finalized | Cancelled`. `Open` is the
//!   only non-terminal state; both terminal states destroy the record.
//!
//! - **Record** ([`record`]): validated [`EscrowTerms`] and the
//!   [`EscrowRecord`] built from them. Terms are immutable after creation;
//!   the only mutation is the guarded terminal transition.
//!
//! - **Journal** ([`journal`]): [`SettlementJournal`], a prepare/commit
//!   log written before an operation touches the ledger and resolved after,
//!   so a crash between the two is recoverable to full completion or full
//!   abort.
//!
//! ## State Diagram
//!
//! ```text
//!              initialize()
//!                   │
//!                   ▼
//!                 OPEN ──finalize()──▶ FINALIZED (record destroyed)
//!                   │
//!                   └──cancel() / expire()──▶ CANCELLED (record destroyed)
//! ```

pub mod error;
pub mod journal;
pub mod record;
pub mod state;

pub use error::{JournalError, StateError};
pub use journal::{JournalEntry, JournalPhase, Operation, ResolutionRecord, SettlementJournal};
pub use record::{EscrowRecord, EscrowTerms, Leg};
pub use state::EscrowState;
