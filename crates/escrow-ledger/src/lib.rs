//! # escrow-ledger — Asset Ledger Collaborator
//!
//! The escrow engine never touches balances directly. It consumes the
//! ledger through the [`AssetLedger`] capability trait:
//!
//! - **Accounts** (`account.rs`): token accounts, their [`Owner`], and the
//!   [`Authority`] a caller presents to move funds.
//!
//! - **Batches** (`batch.rs`): [`LedgerOp`] (create / transfer / close) and
//!   [`LedgerBatch`], the ledger's atomic unit of work.
//!
//! - **Ledger trait** (`ledger.rs`): the collaborator contract.
//!
//! - **Memory ledger** (`memory.rs`): [`MemoryLedger`], a thread-safe
//!   in-memory implementation with mint and supply bookkeeping, used by
//!   tests and embedders without a real chain.
//!
//! ## Crate Policy
//!
//! - Depends only on `escrow-core` internally.
//! - A batch either applies completely or leaves no trace.

pub mod account;
pub mod batch;
pub mod error;
pub mod ledger;
pub mod memory;

pub use account::{AssetInfo, Authority, Owner, TokenAccount};
pub use batch::{LedgerBatch, LedgerOp};
pub use error::{CloseError, LedgerError, TransferError};
pub use ledger::AssetLedger;
pub use memory::MemoryLedger;
