//! # Escrow Engine
//!
//! Orchestrates the escrow lifecycle against an [`AssetLedger`].
//!
//! ## Atomicity
//!
//! Each operation validates everything it can without side effects, then
//! expresses all of its ledger effects as a single [`LedgerBatch`]. The
//! batch is journaled as `Prepared`, submitted, and the journal entry is
//! resolved from the ledger's answer. Finalize's two transfers, the
//! holding-account close and the record's destruction are therefore one
//! unit: the ledger applies the batch or nothing, and the record map is
//! only updated after the ledger accepted it.
//!
//! ## Linearizability
//!
//! Every operation on a record holds that record's key lock (one
//! `parking_lot::Mutex` per record address, kept in a `DashMap`) from its
//! first read to its last write. A second finalize or a racing cancel
//! waits, then finds the record gone and returns
//! [`EscrowError::EscrowNotOpen`]. Readers consult the committed record
//! map only, so they never see an operation in flight.
//!
//! ## Recovery
//!
//! A crash between submitting a batch and resolving its journal entry
//! leaves the entry `Prepared`. Until it is resolved, every operation on
//! that record fails with [`EscrowError::Consistency`], so no later batch
//! can overlap it. [`EscrowEngine::recover`] resolves each
//! such entry by looking at the holding account: it holds exactly
//! `amount_a` after an applied initialize and is gone after an applied
//! finalize, cancel or expire. An entry that is not the newest for its
//! record is always aborted.
//!
//! Key locks live in the map only while an operation holds one, so the
//! map does not grow with the number of addresses ever touched.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use dashmap::DashMap;
use parking_lot::{Mutex, MutexGuard, RwLock};
use serde_json::json;

use escrow_core::{escrow_record_address, Address, Amount, AssetId, EscrowId, PartyId, ValidationError};
use escrow_ledger::{AssetLedger, Authority, LedgerBatch, LedgerError, LedgerOp, Owner, TransferError};
use escrow_state::{EscrowRecord, EscrowState, EscrowTerms, Leg, Operation, SettlementJournal};

use crate::audit::{AuditEntry, AuditKind, AuditTrail};
use crate::config::{EngineConfig, ReclaimPolicy};
use crate::error::EscrowError;

/// Outcome of [`EscrowEngine::recover`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecoveryReport {
    /// Journal entries whose batch had been applied; now committed.
    pub rolled_forward: Vec<u64>,
    /// Journal entries whose batch had not been applied; now aborted.
    pub aborted: Vec<u64>,
}

impl RecoveryReport {
    /// Number of entries resolved.
    pub fn resolved(&self) -> usize {
        self.rolled_forward.len() + self.aborted.len()
    }

    /// Whether there was nothing to recover.
    pub fn is_empty(&self) -> bool {
        self.resolved() == 0
    }
}

/// The escrow engine.
pub struct EscrowEngine<L> {
    ledger: L,
    config: EngineConfig,
    records: RwLock<HashMap<Address, EscrowRecord>>,
    locks: DashMap<Address, Arc<Mutex<()>>>,
    journal: Mutex<SettlementJournal>,
    audit: Mutex<AuditTrail>,
}

impl<L> std::fmt::Debug for EscrowEngine<L> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EscrowEngine")
            .field("config", &self.config)
            .field("open_records", &self.records.read().len())
            .field("journal_entries", &self.journal.lock().len())
            .finish()
    }
}

impl<L: AssetLedger> EscrowEngine<L> {
    /// Create an engine with default configuration.
    pub fn new(ledger: L) -> Self {
        Self::with_config(ledger, EngineConfig::default())
    }

    /// Create an engine with explicit configuration.
    pub fn with_config(ledger: L, config: EngineConfig) -> Self {
        Self::restore(ledger, config, SettlementJournal::new())
    }

    /// Create an engine configured from the environment.
    ///
    /// # Errors
    ///
    /// [`EscrowError::Config`] if a variable is malformed.
    pub fn from_env(ledger: L) -> Result<Self, EscrowError> {
        Ok(Self::with_config(ledger, EngineConfig::from_env()?))
    }

    /// Rebuild an engine from a persisted journal.
    ///
    /// Open records are replayed from the journal's committed entries.
    /// Entries still `Prepared` are left for [`recover`](Self::recover).
    pub fn restore(ledger: L, config: EngineConfig, journal: SettlementJournal) -> Self {
        let records: HashMap<Address, EscrowRecord> =
            journal.committed_records().into_iter().collect();
        let audit = AuditTrail::new(config.audit_capacity);
        Self {
            ledger,
            config,
            records: RwLock::new(records),
            locks: DashMap::new(),
            journal: Mutex::new(journal),
            audit: Mutex::new(audit),
        }
    }

    // ── Accessors ────────────────────────────────────────────────────

    /// The underlying ledger.
    pub fn ledger(&self) -> &L {
        &self.ledger
    }

    /// Active configuration.
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// The open record for `(initializer, id)`, if any.
    pub fn record(&self, initializer: &PartyId, id: &EscrowId) -> Option<EscrowRecord> {
        self.record_at(&escrow_record_address(initializer, id))
    }

    /// The open record at a derived record address, if any.
    pub fn record_at(&self, address: &Address) -> Option<EscrowRecord> {
        self.records.read().get(address).cloned()
    }

    /// All open records.
    pub fn open_records(&self) -> Vec<EscrowRecord> {
        self.records.read().values().cloned().collect()
    }

    /// A copy of the settlement journal, for persistence.
    pub fn journal_snapshot(&self) -> SettlementJournal {
        self.journal.lock().clone()
    }

    /// Drop journal entries that replay no longer needs.
    pub fn compact_journal(&self) -> usize {
        self.journal.lock().compact()
    }

    /// A copy of the audit trail entries, oldest first.
    pub fn audit_entries(&self) -> Vec<AuditEntry> {
        self.audit.lock().entries().to_vec()
    }

    /// Audit history of the escrow `(initializer, id)`, oldest first.
    /// Survives the record's destruction, so this is where a closed
    /// escrow's terminal path can be read back.
    pub fn audit_history(&self, initializer: &PartyId, id: &EscrowId) -> Vec<AuditEntry> {
        let address = escrow_record_address(initializer, id);
        self.audit
            .lock()
            .entries_for(&address)
            .into_iter()
            .cloned()
            .collect()
    }

    /// Audit entries of one kind, oldest first.
    pub fn audit_by_kind(&self, kind: AuditKind) -> Vec<AuditEntry> {
        self.audit
            .lock()
            .entries_by_kind(kind)
            .into_iter()
            .cloned()
            .collect()
    }

    /// The `n` most recent audit entries, oldest first.
    pub fn recent_audit(&self, n: usize) -> Vec<AuditEntry> {
        self.audit.lock().last_n(n).to_vec()
    }

    /// `(index, SHA-256 hex)` for every retained audit entry, for export
    /// to an external tamper-evident store.
    pub fn audit_digests(&self) -> Vec<(usize, String)> {
        self.audit.lock().compute_digests()
    }

    /// Build terms from whole-unit quantities, scaling each by its asset's
    /// decimals as registered on the ledger.
    ///
    /// # Errors
    ///
    /// [`EscrowError::UnknownAsset`], [`EscrowError::InvalidAmount`] for a
    /// zero quantity, or [`EscrowError::AmountOverflow`].
    pub fn terms_in_units(
        &self,
        id: EscrowId,
        asset_a: AssetId,
        units_a: u64,
        asset_b: AssetId,
        units_b: u64,
    ) -> Result<EscrowTerms, EscrowError> {
        let amount_a = self.scale(&asset_a, units_a, Leg::A)?;
        let amount_b = self.scale(&asset_b, units_b, Leg::B)?;
        Ok(EscrowTerms::new(
            id,
            asset_a,
            amount_a.get(),
            asset_b,
            amount_b.get(),
        )?)
    }

    fn scale(&self, asset: &AssetId, units: u64, leg: Leg) -> Result<Amount, EscrowError> {
        let decimals = self.known_asset(asset)?;
        Amount::from_units(units, decimals).map_err(|e| match e {
            ValidationError::ZeroAmount => EscrowError::InvalidAmount { leg },
            _ => EscrowError::AmountOverflow {
                leg,
                units,
                decimals,
            },
        })
    }

    // ── Operations ───────────────────────────────────────────────────

    /// Lock `amount_a` of `asset_a` from `source` into a fresh holding
    /// account and open the record.
    ///
    /// # Errors
    ///
    /// [`EscrowError::DuplicateEscrow`] if a record is already open for
    /// `(initializer, id)`, [`EscrowError::InsufficientBalance`] if
    /// `source` cannot cover `amount_a`, [`EscrowError::TransferFailed`]
    /// if the ledger rejects the batch, plus validation errors for the
    /// id, assets, deadline and source account.
    pub fn initialize(
        &self,
        initializer: &PartyId,
        terms: EscrowTerms,
        source: &Address,
    ) -> Result<EscrowRecord, EscrowError> {
        let id = terms.id().clone();
        self.do_initialize(initializer, terms, source)
            .map_err(|e| rejected(Operation::Initialize, initializer, &id, e))
    }

    fn do_initialize(
        &self,
        initializer: &PartyId,
        terms: EscrowTerms,
        source: &Address,
    ) -> Result<EscrowRecord, EscrowError> {
        self.check_id(terms.id())?;
        self.known_asset(terms.asset_a())?;
        self.known_asset(terms.asset_b())?;

        let record = EscrowRecord::open(initializer.clone(), terms, *source);
        if let Some(deadline) = record.expires_at() {
            if record.is_expired_at(Utc::now()) {
                return Err(EscrowError::EscrowExpired {
                    id: record.id().clone(),
                    expires_at: deadline,
                });
            }
        }

        let address = record.record_address();
        let key = self.key_lock(address);
        let _guard = key.lock();

        self.ensure_resolved(address)?;
        if self.records.read().contains_key(&address) {
            return Err(EscrowError::DuplicateEscrow {
                initializer: initializer.clone(),
                id: record.id().clone(),
            });
        }
        if self.ledger.account(&record.guaranty_account()).is_some() {
            return Err(self.consistency(
                &record,
                "holding account exists without an open record; run recovery".to_string(),
            ));
        }
        self.paying_account(source, record.asset_a(), initializer, record.amount_a())?;

        let batch = LedgerBatch::new()
            .with(LedgerOp::CreateAccount {
                address: record.guaranty_account(),
                asset: record.asset_a().clone(),
                owner: Owner::Program(address),
                payer: initializer.clone(),
            })
            .with(LedgerOp::Transfer {
                asset: record.asset_a().clone(),
                amount: record.amount_a(),
                from: *source,
                to: record.guaranty_account(),
                authority: Authority::Party(initializer.clone()),
            });
        self.settle(Operation::Initialize, &record, batch)?;

        tracing::info!(
            escrow = %address,
            initializer = %initializer,
            id = %record.id(),
            amount_a = record.amount_a().get(),
            amount_b = record.amount_b().get(),
            "escrow initialized"
        );
        self.audit(
            AuditKind::Initialized,
            &record,
            json!({
                "asset_a": record.asset_a().as_str(),
                "amount_a": record.amount_a().get(),
                "asset_b": record.asset_b().as_str(),
                "amount_b": record.amount_b().get(),
            }),
        );
        Ok(record)
    }

    /// Complete the swap: `amount_b` moves from the taker to the
    /// initializer, `amount_a` moves from the holding account to the
    /// taker, the holding account closes and the record is destroyed.
    ///
    /// # Errors
    ///
    /// [`EscrowError::EscrowNotOpen`], [`EscrowError::EscrowExpired`],
    /// [`EscrowError::AuthorizationFailed`] if the terms name a different
    /// taker or the taker does not control `taker_asset_b_source`,
    /// [`EscrowError::InsufficientBalance`], [`EscrowError::InvalidAccount`]
    /// for a bad destination, [`EscrowError::TransferFailed`].
    pub fn finalize(
        &self,
        initializer: &PartyId,
        id: &EscrowId,
        taker: &PartyId,
        taker_asset_b_source: &Address,
        taker_asset_a_destination: &Address,
        initializer_asset_b_destination: &Address,
    ) -> Result<(), EscrowError> {
        self.do_finalize(
            initializer,
            id,
            taker,
            taker_asset_b_source,
            taker_asset_a_destination,
            initializer_asset_b_destination,
        )
        .map_err(|e| rejected(Operation::Finalize, initializer, id, e))
    }

    fn do_finalize(
        &self,
        initializer: &PartyId,
        id: &EscrowId,
        taker: &PartyId,
        taker_asset_b_source: &Address,
        taker_asset_a_destination: &Address,
        initializer_asset_b_destination: &Address,
    ) -> Result<(), EscrowError> {
        let address = escrow_record_address(initializer, id);
        let key = self.key_lock(address);
        let _guard = key.lock();

        self.ensure_resolved(address)?;
        let record = self.open_record(address, initializer, id)?;
        if let Some(deadline) = record.expires_at() {
            if record.is_expired_at(Utc::now()) {
                return Err(EscrowError::EscrowExpired {
                    id: id.clone(),
                    expires_at: deadline,
                });
            }
        }
        if !record.admits_taker(taker) {
            return Err(EscrowError::AuthorizationFailed {
                party: taker.clone(),
                reason: "escrow is restricted to a different taker",
            });
        }
        self.paying_account(taker_asset_b_source, record.asset_b(), taker, record.amount_b())?;
        self.receiving_account(
            taker_asset_a_destination,
            record.asset_a(),
            taker,
            "taker asset A destination",
        )?;
        self.receiving_account(
            initializer_asset_b_destination,
            record.asset_b(),
            initializer,
            "initializer asset B destination",
        )?;
        self.check_holding(&record)?;
        let mut closed = record.clone();
        closed.close(EscrowState::Finalized)?;

        let reclaim_to = match self.config.reclaim_policy {
            ReclaimPolicy::Initializer => initializer.clone(),
            ReclaimPolicy::Taker => taker.clone(),
        };
        // Taker pays before the holding account releases.
        let batch = LedgerBatch::new()
            .with(LedgerOp::Transfer {
                asset: record.asset_b().clone(),
                amount: record.amount_b(),
                from: *taker_asset_b_source,
                to: *initializer_asset_b_destination,
                authority: Authority::Party(taker.clone()),
            })
            .with(LedgerOp::Transfer {
                asset: record.asset_a().clone(),
                amount: record.amount_a(),
                from: record.guaranty_account(),
                to: *taker_asset_a_destination,
                authority: Authority::Program(address),
            })
            .with(LedgerOp::CloseAccount {
                account: record.guaranty_account(),
                authority: Authority::Program(address),
                reclaim_to: reclaim_to.clone(),
            });
        self.settle(Operation::Finalize, &closed, batch)?;

        tracing::info!(
            escrow = %address,
            initializer = %initializer,
            id = %id,
            taker = %taker,
            amount_a = record.amount_a().get(),
            amount_b = record.amount_b().get(),
            "escrow finalized"
        );
        self.audit(
            AuditKind::Finalized,
            &record,
            json!({ "taker": taker.as_str(), "reclaim_to": reclaim_to.as_str() }),
        );
        Ok(())
    }

    /// Reverse the lock: `amount_a` returns to the account it came from,
    /// the holding account closes and the record is destroyed.
    ///
    /// # Errors
    ///
    /// [`EscrowError::EscrowNotOpen`], [`EscrowError::AuthorizationFailed`]
    /// if `caller` is not the initializer, [`EscrowError::InvalidAccount`]
    /// if the refund account no longer exists.
    pub fn cancel(
        &self,
        caller: &PartyId,
        initializer: &PartyId,
        id: &EscrowId,
    ) -> Result<(), EscrowError> {
        self.do_cancel(caller, initializer, id, None)
            .map_err(|e| rejected(Operation::Cancel, initializer, id, e))
    }

    /// Like [`cancel`](Self::cancel), but refund `amount_a` into
    /// `refund_to`, any asset-A account the initializer owns. Use this when
    /// the original source account has been closed.
    ///
    /// # Errors
    ///
    /// As [`cancel`](Self::cancel); [`EscrowError::InvalidAccount`] if
    /// `refund_to` is missing, holds another asset or is not the
    /// initializer's.
    pub fn cancel_to(
        &self,
        caller: &PartyId,
        initializer: &PartyId,
        id: &EscrowId,
        refund_to: &Address,
    ) -> Result<(), EscrowError> {
        self.do_cancel(caller, initializer, id, Some(refund_to))
            .map_err(|e| rejected(Operation::Cancel, initializer, id, e))
    }

    fn do_cancel(
        &self,
        caller: &PartyId,
        initializer: &PartyId,
        id: &EscrowId,
        refund_to: Option<&Address>,
    ) -> Result<(), EscrowError> {
        let address = escrow_record_address(initializer, id);
        let key = self.key_lock(address);
        let _guard = key.lock();

        self.ensure_resolved(address)?;
        let record = self.open_record(address, initializer, id)?;
        if caller != record.initializer() {
            return Err(EscrowError::AuthorizationFailed {
                party: caller.clone(),
                reason: "only the initializer may cancel",
            });
        }
        let refund_to = refund_to.copied().unwrap_or_else(|| record.initializer_deposit());
        self.refund(&record, Operation::Cancel, refund_to)?;

        tracing::info!(
            escrow = %address,
            initializer = %initializer,
            id = %id,
            refund_to = %refund_to,
            "escrow cancelled"
        );
        self.audit(
            AuditKind::Cancelled,
            &record,
            json!({ "caller": caller.as_str(), "refund_to": refund_to.to_string() }),
        );
        Ok(())
    }

    /// Reverse the lock of an escrow whose deadline has passed. Anyone may
    /// call this; the effects are those of [`cancel`](Self::cancel).
    ///
    /// # Errors
    ///
    /// [`EscrowError::EscrowNotOpen`], or [`EscrowError::NotExpired`] if
    /// the escrow has no deadline or it has not passed.
    pub fn expire(&self, initializer: &PartyId, id: &EscrowId) -> Result<(), EscrowError> {
        self.do_expire(initializer, id)
            .map_err(|e| rejected(Operation::Expire, initializer, id, e))
    }

    fn do_expire(&self, initializer: &PartyId, id: &EscrowId) -> Result<(), EscrowError> {
        let address = escrow_record_address(initializer, id);
        let key = self.key_lock(address);
        let _guard = key.lock();

        self.ensure_resolved(address)?;
        let record = self.open_record(address, initializer, id)?;
        if !record.is_expired_at(Utc::now()) {
            return Err(EscrowError::NotExpired {
                id: id.clone(),
                expires_at: record.expires_at(),
            });
        }
        self.refund(&record, Operation::Expire, record.initializer_deposit())?;

        tracing::info!(escrow = %address, initializer = %initializer, id = %id, "escrow expired");
        self.audit(
            AuditKind::Expired,
            &record,
            json!({ "expires_at": record.expires_at() }),
        );
        Ok(())
    }

    /// Resolve journal entries left `Prepared` by a crash.
    ///
    /// Each entry is resolved under its record's key lock, so this is safe
    /// to call while other operations run.
    ///
    /// # Errors
    ///
    /// [`EscrowError::Journal`] if an entry cannot be resolved.
    pub fn recover(&self) -> Result<RecoveryReport, EscrowError> {
        let pending: Vec<(u64, Operation, EscrowRecord)> = self
            .journal
            .lock()
            .pending()
            .map(|e| (e.seq, e.operation, e.record.clone()))
            .collect();

        let mut report = RecoveryReport::default();
        for (seq, operation, record) in pending {
            let address = record.record_address();
            let key = self.key_lock(address);
            let _guard = key.lock();

            let (still_pending, latest) = {
                let journal = self.journal.lock();
                let still_pending = journal.get(seq).is_some_and(|e| !e.phase.is_resolved());
                (still_pending, journal.latest_for(&address))
            };
            if !still_pending {
                continue;
            }

            // A newer entry for the same record means this batch's
            // preconditions no longer hold; the ledger state belongs to it.
            let superseded = latest.filter(|&newest| newest != seq);
            let applied = superseded.is_none() && self.batch_applied(operation, &record);
            let outcome = if applied {
                self.apply_committed(operation, &record);
                self.journal
                    .lock()
                    .commit(seq, "recovery: batch found applied")?;
                report.rolled_forward.push(seq);
                "rolled_forward"
            } else {
                let detail = match superseded {
                    Some(newest) => format!("superseded by entry {newest}"),
                    None => "no ledger effects found".to_string(),
                };
                self.journal
                    .lock()
                    .abort(seq, "recovery: batch not applied", &detail)?;
                report.aborted.push(seq);
                "aborted"
            };

            tracing::info!(
                escrow = %address,
                seq,
                operation = %operation,
                outcome,
                "journal entry recovered"
            );
            self.audit(
                AuditKind::Recovered,
                &record,
                json!({ "seq": seq, "operation": operation.as_str(), "outcome": outcome }),
            );
        }
        Ok(report)
    }

    // ── Internals ────────────────────────────────────────────────────

    /// Whether the ledger shows the effects of `operation` on `record`.
    ///
    /// An applied initialize leaves the holding account funded with exactly
    /// `amount_a`. An applied close leaves it gone while the record is
    /// still open in the record map.
    fn batch_applied(&self, operation: Operation, record: &EscrowRecord) -> bool {
        let holding = self.ledger.balance(&record.guaranty_account());
        if operation.closes_record() {
            holding.is_none() && self.records.read().contains_key(&record.record_address())
        } else {
            holding == Some(record.amount_a().get())
        }
    }

    fn key_lock(&self, address: Address) -> KeyLock<'_> {
        let mutex = Arc::clone(&self.locks.entry(address).or_default());
        KeyLock {
            locks: &self.locks,
            address,
            mutex,
        }
    }

    /// Refuse to act on a record whose last operation never resolved.
    fn ensure_resolved(&self, address: Address) -> Result<(), EscrowError> {
        let unresolved = self
            .journal
            .lock()
            .pending_for(&address)
            .map(|e| (e.seq, e.operation, e.record.clone()));
        match unresolved {
            Some((seq, operation, record)) => Err(self.consistency(
                &record,
                format!("journal entry {seq} ({operation}) is unresolved; run recovery"),
            )),
            None => Ok(()),
        }
    }

    fn open_record(
        &self,
        address: Address,
        initializer: &PartyId,
        id: &EscrowId,
    ) -> Result<EscrowRecord, EscrowError> {
        self.record_at(&address)
            .ok_or_else(|| EscrowError::EscrowNotOpen {
                initializer: initializer.clone(),
                id: id.clone(),
            })
    }

    fn check_id(&self, id: &EscrowId) -> Result<(), EscrowError> {
        if id.len() > self.config.max_id_len {
            return Err(EscrowError::InvalidIdentifier(ValidationError::TooLong {
                kind: "escrow id",
                max: self.config.max_id_len,
                actual: id.len(),
            }));
        }
        Ok(())
    }

    fn known_asset(&self, asset: &AssetId) -> Result<u8, EscrowError> {
        self.ledger
            .asset(asset)
            .map(|info| info.decimals)
            .ok_or_else(|| EscrowError::UnknownAsset(asset.clone()))
    }

    /// An account `payer` spends from: must hold `asset`, be controlled by
    /// `payer`, and cover `required`.
    fn paying_account(
        &self,
        address: &Address,
        asset: &AssetId,
        payer: &PartyId,
        required: Amount,
    ) -> Result<(), EscrowError> {
        let account = self.existing_account(address, asset)?;
        if !account.is_owned_by(payer) {
            return Err(EscrowError::AuthorizationFailed {
                party: payer.clone(),
                reason: "does not control the paying account",
            });
        }
        if account.balance < required.get() {
            return Err(EscrowError::InsufficientBalance {
                account: *address,
                required: required.get(),
                available: account.balance,
            });
        }
        Ok(())
    }

    fn receiving_account(
        &self,
        address: &Address,
        asset: &AssetId,
        owner: &PartyId,
        role: &str,
    ) -> Result<(), EscrowError> {
        let account = self.existing_account(address, asset)?;
        if !account.is_owned_by(owner) {
            return Err(EscrowError::InvalidAccount {
                account: *address,
                reason: format!("{role} is not owned by {owner}"),
            });
        }
        Ok(())
    }

    fn existing_account(
        &self,
        address: &Address,
        asset: &AssetId,
    ) -> Result<escrow_ledger::TokenAccount, EscrowError> {
        let account = self
            .ledger
            .account(address)
            .ok_or_else(|| EscrowError::InvalidAccount {
                account: *address,
                reason: "account does not exist".to_string(),
            })?;
        if &account.asset != asset {
            return Err(EscrowError::InvalidAccount {
                account: *address,
                reason: format!("account holds {}, expected {asset}", account.asset),
            });
        }
        Ok(account)
    }

    /// The holding account must exist and hold exactly `amount_a` while
    /// the record is open.
    fn check_holding(&self, record: &EscrowRecord) -> Result<(), EscrowError> {
        match self.ledger.balance(&record.guaranty_account()) {
            Some(balance) if balance == record.amount_a().get() => Ok(()),
            Some(balance) => Err(self.consistency(
                record,
                format!(
                    "holding account holds {balance}, expected {}",
                    record.amount_a()
                ),
            )),
            None => Err(self.consistency(record, "holding account is missing".to_string())),
        }
    }

    /// Move `amount_a` from the holding account into `refund_to`, close the
    /// holding account and destroy the record.
    fn refund(
        &self,
        record: &EscrowRecord,
        operation: Operation,
        refund_to: Address,
    ) -> Result<(), EscrowError> {
        let address = record.record_address();
        self.receiving_account(
            &refund_to,
            record.asset_a(),
            record.initializer(),
            "refund account",
        )?;
        self.check_holding(record)?;
        let mut closed = record.clone();
        closed.close(EscrowState::Cancelled)?;

        let batch = LedgerBatch::new()
            .with(LedgerOp::Transfer {
                asset: record.asset_a().clone(),
                amount: record.amount_a(),
                from: record.guaranty_account(),
                to: refund_to,
                authority: Authority::Program(address),
            })
            .with(LedgerOp::CloseAccount {
                account: record.guaranty_account(),
                authority: Authority::Program(address),
                reclaim_to: record.initializer().clone(),
            });
        self.settle(operation, &closed, batch)
    }

    /// Journal, submit and resolve one batch. Must be called with the
    /// record's key lock held.
    fn settle(
        &self,
        operation: Operation,
        record: &EscrowRecord,
        batch: LedgerBatch,
    ) -> Result<(), EscrowError> {
        let seq = self
            .journal
            .lock()
            .prepare(operation, record.clone(), batch.clone());

        match self.ledger.execute(batch) {
            Ok(()) => {
                self.apply_committed(operation, record);
                self.journal.lock().commit(seq, "ledger applied batch")?;
                Ok(())
            }
            Err(e) => {
                let detail = e.to_string();
                self.journal
                    .lock()
                    .abort(seq, "ledger rejected batch", &detail)?;
                tracing::warn!(
                    escrow = %record.record_address(),
                    seq,
                    operation = %operation,
                    error = %detail,
                    "settlement aborted, no effects applied"
                );
                Err(self.ledger_failure(record, e))
            }
        }
    }

    fn apply_committed(&self, operation: Operation, record: &EscrowRecord) {
        let mut records = self.records.write();
        if operation.closes_record() {
            records.remove(&record.record_address());
        } else {
            records.insert(record.record_address(), record.clone());
        }
    }

    fn ledger_failure(&self, record: &EscrowRecord, err: LedgerError) -> EscrowError {
        match err {
            LedgerError::Transfer {
                source:
                    TransferError::InsufficientBalance {
                        account,
                        required,
                        available,
                    },
                ..
            } => EscrowError::InsufficientBalance {
                account,
                required,
                available,
            },
            LedgerError::Close { index, source } => {
                self.consistency(record, format!("op {index}: holding close failed: {source}"))
            }
            other => EscrowError::TransferFailed(other),
        }
    }

    fn consistency(&self, record: &EscrowRecord, detail: String) -> EscrowError {
        tracing::error!(
            escrow = %record.record_address(),
            initializer = %record.initializer(),
            id = %record.id(),
            detail = %detail,
            "escrow consistency violation"
        );
        EscrowError::Consistency {
            escrow: record.record_address(),
            detail,
        }
    }

    fn audit(&self, kind: AuditKind, record: &EscrowRecord, metadata: serde_json::Value) {
        self.audit.lock().append(AuditEntry::new(
            kind,
            record.record_address(),
            record.initializer().clone(),
            record.id().clone(),
            Some(metadata),
        ));
    }
}

/// Handle on one record's lock. Dropping the last handle removes the lock
/// from the map, so only records with an operation in progress hold one.
struct KeyLock<'a> {
    locks: &'a DashMap<Address, Arc<Mutex<()>>>,
    address: Address,
    mutex: Arc<Mutex<()>>,
}

impl KeyLock<'_> {
    fn lock(&self) -> MutexGuard<'_, ()> {
        self.mutex.lock()
    }
}

impl Drop for KeyLock<'_> {
    fn drop(&mut self) {
        // Two references left: the map's and this handle's.
        self.locks.remove_if(&self.address, |_, mutex| {
            Arc::ptr_eq(mutex, &self.mutex) && Arc::strong_count(mutex) == 2
        });
    }
}

fn rejected(operation: Operation, initializer: &PartyId, id: &EscrowId, err: EscrowError) -> EscrowError {
    tracing::warn!(
        operation = %operation,
        initializer = %initializer,
        id = %id,
        error = %err,
        "escrow operation rejected"
    );
    err
}
