//! # Settlement Audit Trail
//!
//! Records which terminal path each escrow took. Finalized and cancelled
//! records are both destroyed, so this trail is the only place the
//! distinction survives.
//!
//! ## Security Invariant
//!
//! Every entry is individually digestable: SHA-256 over its JSON form.
//! The append-only trail trims the oldest 10% when the configured maximum
//! is exceeded. Trimmed entries should be persisted elsewhere first if
//! they must be retained.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use escrow_core::{Address, EscrowId, PartyId};

// ---------------------------------------------------------------------------
// AuditKind
// ---------------------------------------------------------------------------

/// The type of audit trail event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditKind {
    /// Asset A was locked and the record opened.
    Initialized,
    /// The swap completed.
    Finalized,
    /// The initializer reversed the lock.
    Cancelled,
    /// The lock was reversed after the deadline.
    Expired,
    /// A journal entry left by a crash was resolved.
    Recovered,
}

impl AuditKind {
    /// Return the string value for serialization.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Initialized => "initialized",
            Self::Finalized => "finalized",
            Self::Cancelled => "cancelled",
            Self::Expired => "expired",
            Self::Recovered => "recovered",
        }
    }
}

impl std::fmt::Display for AuditKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// AuditEntry
// ---------------------------------------------------------------------------

/// A single entry in the audit trail.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEntry {
    /// The type of event.
    pub kind: AuditKind,
    /// Address of the record concerned.
    pub record_address: Address,
    /// Initializer of the record.
    pub initializer: PartyId,
    /// Escrow id.
    pub id: EscrowId,
    /// UTC timestamp when the event occurred.
    pub timestamp: DateTime<Utc>,
    /// Optional structured metadata payload.
    pub metadata: Option<serde_json::Value>,
}

impl AuditEntry {
    /// Create a new audit entry with the current UTC timestamp.
    pub fn new(
        kind: AuditKind,
        record_address: Address,
        initializer: PartyId,
        id: EscrowId,
        metadata: Option<serde_json::Value>,
    ) -> Self {
        Self {
            kind,
            record_address,
            initializer,
            id,
            timestamp: Utc::now(),
            metadata,
        }
    }

    /// Hex SHA-256 digest of this entry's JSON form.
    ///
    /// Returns `None` if the entry cannot be serialized.
    pub fn digest(&self) -> Option<String> {
        let bytes = match serde_json::to_vec(self) {
            Ok(b) => b,
            Err(e) => {
                tracing::warn!(kind = %self.kind, error = %e, "audit entry serialization failed, digest unavailable");
                return None;
            }
        };
        let hash = Sha256::digest(&bytes);
        Some(hash.iter().map(|b| format!("{b:02x}")).collect())
    }
}

impl PartialEq for AuditEntry {
    fn eq(&self, other: &Self) -> bool {
        self.kind == other.kind
            && self.record_address == other.record_address
            && self.initializer == other.initializer
            && self.id == other.id
            && self.metadata == other.metadata
    }
}

impl Eq for AuditEntry {}

// ---------------------------------------------------------------------------
// AuditTrail
// ---------------------------------------------------------------------------

/// An append-only audit trail with a configurable capacity.
///
/// Not `Sync` on its own; the engine keeps it behind a mutex.
pub struct AuditTrail {
    entries: Vec<AuditEntry>,
    max_entries: usize,
}

impl AuditTrail {
    /// Create a new audit trail with the given maximum capacity.
    pub fn new(max_entries: usize) -> Self {
        Self {
            entries: Vec::new(),
            max_entries,
        }
    }

    /// Append an entry, trimming the oldest 10% once over capacity.
    pub fn append(&mut self, entry: AuditEntry) {
        self.entries.push(entry);
        if self.entries.len() > self.max_entries {
            let trim_count = (self.max_entries / 10).max(1);
            self.entries.drain(..trim_count.min(self.entries.len()));
        }
    }

    /// All entries, oldest first.
    pub fn entries(&self) -> &[AuditEntry] {
        &self.entries
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the trail is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries concerning one record address.
    pub fn entries_for(&self, record_address: &Address) -> Vec<&AuditEntry> {
        self.entries
            .iter()
            .filter(|e| &e.record_address == record_address)
            .collect()
    }

    /// Entries of one kind.
    pub fn entries_by_kind(&self, kind: AuditKind) -> Vec<&AuditEntry> {
        self.entries.iter().filter(|e| e.kind == kind).collect()
    }

    /// The last `n` entries (or all, if fewer exist).
    pub fn last_n(&self, n: usize) -> &[AuditEntry] {
        let start = self.entries.len().saturating_sub(n);
        &self.entries[start..]
    }

    /// `(index, digest)` for every entry that could be digested.
    pub fn compute_digests(&self) -> Vec<(usize, String)> {
        self.entries
            .iter()
            .enumerate()
            .filter_map(|(i, entry)| entry.digest().map(|d| (i, d)))
            .collect()
    }
}

impl Default for AuditTrail {
    fn default() -> Self {
        Self::new(10_000)
    }
}

impl std::fmt::Debug for AuditTrail {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuditTrail")
            .field("entries", &self.entries.len())
            .field("max_entries", &self.max_entries)
            .finish()
    }
}
