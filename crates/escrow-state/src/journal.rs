//! # Settlement Journal
//!
//! A write-ahead log for escrow operations. Every operation records a
//! `Prepared` entry holding the record snapshot and the exact ledger batch
//! it is about to submit, then resolves the entry to `Committed` or
//! `Aborted` once the ledger has answered.
//!
//! ## Recovery
//!
//! The ledger applies a batch entirely or not at all, so a `Prepared`
//! entry left behind by a crash has exactly two possible outcomes. The
//! engine inspects the holding account named in the entry's record to
//! decide which one happened, then resolves the entry accordingly. The
//! journal itself only stores entries and enforces that each is resolved
//! once.
//!
//! ## Persistence
//!
//! The journal serializes to JSON via [`SettlementJournal::to_json`] and
//! reloads with [`SettlementJournal::from_json`]; sequence numbering
//! continues where it left off.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use escrow_core::Address;
use escrow_ledger::LedgerBatch;

use crate::error::JournalError;
use crate::record::EscrowRecord;

/// The escrow operation an entry belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    /// Lock asset A and create the record.
    Initialize,
    /// Swap both legs and destroy the record.
    Finalize,
    /// Refund asset A at the initializer's request.
    Cancel,
    /// Refund asset A after the deadline passed.
    Expire,
}

impl Operation {
    /// Whether a committed batch for this operation destroys the record.
    pub fn closes_record(&self) -> bool {
        !matches!(self, Self::Initialize)
    }

    /// The canonical string name of this operation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Initialize => "initialize",
            Self::Finalize => "finalize",
            Self::Cancel => "cancel",
            Self::Expire => "expire",
        }
    }
}

impl std::fmt::Display for Operation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Phase of a journal entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JournalPhase {
    /// Written before the ledger batch is submitted.
    Prepared,
    /// The batch was applied. Terminal.
    Committed,
    /// The batch was not applied. Terminal.
    Aborted,
}

impl JournalPhase {
    /// Whether the entry has been resolved.
    pub fn is_resolved(&self) -> bool {
        !matches!(self, Self::Prepared)
    }

    /// The canonical string name of this phase.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Prepared => "PREPARED",
            Self::Committed => "COMMITTED",
            Self::Aborted => "ABORTED",
        }
    }
}

impl std::fmt::Display for JournalPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A resolution step applied to a journal entry.
///
/// Abort reasons are kept verbatim so a failed settlement can be
/// diagnosed from the journal alone.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolutionRecord {
    /// Phase the entry moved to.
    pub phase: JournalPhase,
    /// What resolved it.
    pub action: String,
    /// Failure detail, present for aborts.
    pub error_detail: Option<String>,
    /// When the resolution happened.
    pub timestamp: DateTime<Utc>,
}

/// One journaled operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JournalEntry {
    /// Monotonic sequence number within this journal.
    pub seq: u64,
    /// Globally unique entry id.
    pub entry_id: Uuid,
    /// The operation being settled.
    pub operation: Operation,
    /// Snapshot of the record the batch produces: `Open` for an
    /// initialize, the terminal state for a close.
    pub record: EscrowRecord,
    /// The batch submitted to the ledger.
    pub batch: LedgerBatch,
    /// Current phase.
    pub phase: JournalPhase,
    /// When the entry was prepared.
    pub prepared_at: DateTime<Utc>,
    /// When the entry was resolved, if it has been.
    pub resolved_at: Option<DateTime<Utc>>,
    /// Resolution history.
    pub resolution_log: Vec<ResolutionRecord>,
}

impl JournalEntry {
    /// Address of the record this entry settles.
    pub fn record_address(&self) -> Address {
        self.record.record_address()
    }
}

/// Prepare/commit journal for escrow settlements.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SettlementJournal {
    next_seq: u64,
    entries: BTreeMap<u64, JournalEntry>,
}

impl SettlementJournal {
    /// Create an empty journal.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record that `operation` is about to submit `batch` for `record`.
    /// Returns the entry's sequence number.
    pub fn prepare(&mut self, operation: Operation, record: EscrowRecord, batch: LedgerBatch) -> u64 {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.entries.insert(
            seq,
            JournalEntry {
                seq,
                entry_id: Uuid::new_v4(),
                operation,
                record,
                batch,
                phase: JournalPhase::Prepared,
                prepared_at: Utc::now(),
                resolved_at: None,
                resolution_log: Vec::new(),
            },
        );
        seq
    }

    /// Mark entry `seq` as committed.
    ///
    /// # Errors
    ///
    /// [`JournalError::UnknownEntry`] or [`JournalError::AlreadyResolved`].
    pub fn commit(&mut self, seq: u64, action: &str) -> Result<(), JournalError> {
        self.resolve(seq, JournalPhase::Committed, action, None)
    }

    /// Mark entry `seq` as aborted, keeping `reason`.
    ///
    /// # Errors
    ///
    /// [`JournalError::UnknownEntry`] or [`JournalError::AlreadyResolved`].
    pub fn abort(&mut self, seq: u64, action: &str, reason: &str) -> Result<(), JournalError> {
        self.resolve(seq, JournalPhase::Aborted, action, Some(reason.to_string()))
    }

    fn resolve(
        &mut self,
        seq: u64,
        phase: JournalPhase,
        action: &str,
        error_detail: Option<String>,
    ) -> Result<(), JournalError> {
        let entry = self
            .entries
            .get_mut(&seq)
            .ok_or(JournalError::UnknownEntry(seq))?;
        if entry.phase.is_resolved() {
            return Err(JournalError::AlreadyResolved {
                seq,
                phase: entry.phase,
            });
        }
        let now = Utc::now();
        entry.phase = phase;
        entry.resolved_at = Some(now);
        entry.resolution_log.push(ResolutionRecord {
            phase,
            action: action.to_string(),
            error_detail,
            timestamp: now,
        });
        Ok(())
    }

    /// Entries still in `Prepared`, oldest first.
    pub fn pending(&self) -> impl Iterator<Item = &JournalEntry> {
        self.entries
            .values()
            .filter(|e| e.phase == JournalPhase::Prepared)
    }

    /// The unresolved entry for the record at `address`, if one exists.
    pub fn pending_for(&self, address: &Address) -> Option<&JournalEntry> {
        self.pending().find(|e| &e.record_address() == address)
    }

    /// Sequence number of the newest entry for the record at `address`.
    pub fn latest_for(&self, address: &Address) -> Option<u64> {
        self.entries
            .values()
            .rev()
            .find(|e| &e.record_address() == address)
            .map(|e| e.seq)
    }

    /// Look up an entry.
    pub fn get(&self, seq: u64) -> Option<&JournalEntry> {
        self.entries.get(&seq)
    }

    /// All entries, oldest first.
    pub fn entries(&self) -> impl Iterator<Item = &JournalEntry> {
        self.entries.values()
    }

    /// Replay committed entries in order and return the records that are
    /// still open, keyed by record address.
    ///
    /// A committed `Initialize` opens a record; a committed close removes
    /// it. Prepared and aborted entries are ignored.
    pub fn committed_records(&self) -> BTreeMap<Address, EscrowRecord> {
        self.live_initializations()
            .into_iter()
            .filter_map(|(address, seq)| {
                self.entries
                    .get(&seq)
                    .map(|entry| (address, entry.record.clone()))
            })
            .collect()
    }

    fn live_initializations(&self) -> BTreeMap<Address, u64> {
        let mut live = BTreeMap::new();
        for entry in self.entries.values() {
            if entry.phase != JournalPhase::Committed {
                continue;
            }
            if entry.operation.closes_record() {
                live.remove(&entry.record_address());
            } else {
                live.insert(entry.record_address(), entry.seq);
            }
        }
        live
    }

    /// Drop every entry that replay no longer needs: aborted entries,
    /// committed closes, and committed initializations of records that
    /// have since closed. Pending entries are always kept. Returns how
    /// many entries were removed.
    pub fn compact(&mut self) -> usize {
        let keep: std::collections::BTreeSet<u64> =
            self.live_initializations().into_values().collect();
        let before = self.entries.len();
        self.entries
            .retain(|seq, e| e.phase == JournalPhase::Prepared || keep.contains(seq));
        before - self.entries.len()
    }

    /// Number of retained entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether no entries are retained.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Serialize the journal to JSON.
    ///
    /// # Errors
    ///
    /// [`JournalError::Serialization`] if encoding fails.
    pub fn to_json(&self) -> Result<String, JournalError> {
        Ok(serde_json::to_string(self)?)
    }

    /// Reload a journal previously written by [`to_json`](Self::to_json).
    ///
    /// # Errors
    ///
    /// [`JournalError::Serialization`] on malformed input, including any
    /// identifier or amount that fails validation.
    pub fn from_json(json: &str) -> Result<Self, JournalError> {
        Ok(serde_json::from_str(json)?)
    }
}
