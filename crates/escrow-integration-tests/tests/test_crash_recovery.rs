//! Crash recovery through a persisted journal.
//!
//! A wrapper ledger panics around a chosen batch, standing in for a
//! process crash. The journal is then serialized, a fresh engine is
//! restored from the JSON over the same ledger, and `recover` must bring
//! records and balances back into agreement.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

use escrow_core::{Address, AssetId};
use escrow_engine::{AuditKind, EngineConfig, EscrowEngine};
use escrow_integration_tests::{escrow_id, init_tracing, Market};
use escrow_ledger::{AssetInfo, AssetLedger, LedgerBatch, LedgerError, MemoryLedger, TokenAccount};
use escrow_state::{JournalPhase, Operation, SettlementJournal};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
enum Crash {
    Off = 0,
    BeforeApply = 1,
    AfterApply = 2,
}

/// One-shot crash trigger, consumed by the next batch.
#[derive(Default)]
struct CrashSwitch(AtomicU8);

impl CrashSwitch {
    fn arm(&self, crash: Crash) {
        self.0.store(crash as u8, Ordering::SeqCst);
    }

    fn take(&self) -> Crash {
        match self.0.swap(Crash::Off as u8, Ordering::SeqCst) {
            1 => Crash::BeforeApply,
            2 => Crash::AfterApply,
            _ => Crash::Off,
        }
    }
}

struct CrashingLedger {
    inner: Arc<MemoryLedger>,
    switch: CrashSwitch,
}

impl AssetLedger for CrashingLedger {
    fn asset(&self, id: &AssetId) -> Option<AssetInfo> {
        self.inner.asset(id)
    }

    fn account(&self, address: &Address) -> Option<TokenAccount> {
        self.inner.account(address)
    }

    fn execute(&self, batch: LedgerBatch) -> Result<(), LedgerError> {
        match self.switch.take() {
            Crash::BeforeApply => panic!("process died before the batch reached the ledger"),
            Crash::AfterApply => {
                self.inner.execute(batch)?;
                panic!("process died after the ledger applied the batch")
            }
            Crash::Off => self.inner.execute(batch),
        }
    }
}

/// A market whose engine runs over a crashable view of the market ledger.
fn crashable(initializer_a: u64, taker_b: u64) -> (Market, EscrowEngine<CrashingLedger>) {
    init_tracing();
    let market = Market::new(initializer_a, taker_b);
    let engine = EscrowEngine::new(CrashingLedger {
        inner: Arc::clone(&market.ledger),
        switch: CrashSwitch::default(),
    });
    (market, engine)
}

/// Persist the journal to JSON and bring up a fresh engine from it.
fn restart(market: &Market, engine: &EscrowEngine<CrashingLedger>) -> EscrowEngine<Arc<MemoryLedger>> {
    let json = engine.journal_snapshot().to_json().unwrap();
    let journal = SettlementJournal::from_json(&json).unwrap();
    EscrowEngine::restore(Arc::clone(&market.ledger), EngineConfig::default(), journal)
}

#[test]
fn finalize_applied_then_crash_rolls_forward() {
    let (m, engine) = crashable(100_000, 9_500);
    let terms = m.terms("1", 100, 95);
    engine
        .initialize(&m.initializer.party, terms, &m.initializer.a)
        .unwrap();

    engine.ledger().switch.arm(Crash::AfterApply);
    let crashed = catch_unwind(AssertUnwindSafe(|| {
        engine.finalize(
            &m.initializer.party,
            &escrow_id("1"),
            &m.taker.party,
            &m.taker.b,
            &m.taker.a,
            &m.initializer.b,
        )
    }));
    assert!(crashed.is_err());

    let restored = restart(&m, &engine);
    // The journal still believes the record is open.
    assert!(restored
        .record(&m.initializer.party, &escrow_id("1"))
        .is_some());
    assert_eq!(restored.journal_snapshot().pending().count(), 1);

    let report = restored.recover().unwrap();
    assert_eq!(report.rolled_forward.len(), 1);
    assert!(report.aborted.is_empty());
    assert!(restored
        .record(&m.initializer.party, &escrow_id("1"))
        .is_none());

    let b = m.balances();
    assert_eq!((b.taker_a, b.initializer_b), (10_000, 9_500));

    let journal = restored.journal_snapshot();
    let entry = journal
        .entries()
        .find(|e| e.operation == Operation::Finalize)
        .unwrap();
    assert_eq!(entry.phase, JournalPhase::Committed);
    assert!(entry.resolution_log[0].action.starts_with("recovery"));
}

#[test]
fn initialize_lost_before_ledger_aborts() {
    let (m, engine) = crashable(100_000, 0);
    engine.ledger().switch.arm(Crash::BeforeApply);
    let crashed = catch_unwind(AssertUnwindSafe(|| {
        engine.initialize(&m.initializer.party, m.terms("1", 100, 95), &m.initializer.a)
    }));
    assert!(crashed.is_err());

    let restored = restart(&m, &engine);
    let report = restored.recover().unwrap();
    assert_eq!(report.aborted.len(), 1);
    assert!(restored.open_records().is_empty());
    assert_eq!(m.balances().initializer_a, 100_000);

    // Retrying after recovery succeeds.
    restored
        .initialize(&m.initializer.party, m.terms("1", 100, 95), &m.initializer.a)
        .unwrap();
}

#[test]
fn lost_initialize_is_not_revived_by_a_retry_with_new_terms() {
    let (m, engine) = crashable(100_000, 0);
    engine.ledger().switch.arm(Crash::BeforeApply);
    let crashed = catch_unwind(AssertUnwindSafe(|| {
        engine.initialize(&m.initializer.party, m.terms("1", 100, 95), &m.initializer.a)
    }));
    assert!(crashed.is_err());

    let restored = restart(&m, &engine);
    let err = restored
        .initialize(&m.initializer.party, m.terms("1", 200, 95), &m.initializer.a)
        .unwrap_err();
    assert!(err.is_consistency_violation());
    assert_eq!(m.balances().initializer_a, 100_000);

    let report = restored.recover().unwrap();
    assert_eq!((report.aborted.len(), report.rolled_forward.len()), (1, 0));
    let record = restored
        .initialize(&m.initializer.party, m.terms("1", 200, 95), &m.initializer.a)
        .unwrap();
    assert_eq!(m.ledger.balance(&record.guaranty_account()), Some(20_000));

    restored
        .cancel(&m.initializer.party, &m.initializer.party, &escrow_id("1"))
        .unwrap();
    assert_eq!(m.balances().initializer_a, 100_000);
    let history: Vec<AuditKind> = restored
        .audit_history(&m.initializer.party, &escrow_id("1"))
        .iter()
        .map(|e| e.kind)
        .collect();
    assert_eq!(
        history,
        vec![AuditKind::Recovered, AuditKind::Initialized, AuditKind::Cancelled]
    );
}

#[test]
fn initialize_applied_then_crash_opens_record() {
    let (m, engine) = crashable(100_000, 9_500);
    engine.ledger().switch.arm(Crash::AfterApply);
    let crashed = catch_unwind(AssertUnwindSafe(|| {
        engine.initialize(&m.initializer.party, m.terms("1", 100, 95), &m.initializer.a)
    }));
    assert!(crashed.is_err());
    assert_eq!(m.balances().initializer_a, 90_000);

    let restored = restart(&m, &engine);
    assert!(restored.open_records().is_empty());
    // Before recovery the unresolved journal entry blocks a retry.
    let err = restored
        .initialize(&m.initializer.party, m.terms("1", 100, 95), &m.initializer.a)
        .unwrap_err();
    assert!(err.is_consistency_violation());

    restored.recover().unwrap();
    let record = restored
        .record(&m.initializer.party, &escrow_id("1"))
        .unwrap();
    assert_eq!(m.ledger.balance(&record.guaranty_account()), Some(10_000));

    // The recovered escrow settles normally.
    restored
        .finalize(
            &m.initializer.party,
            &escrow_id("1"),
            &m.taker.party,
            &m.taker.b,
            &m.taker.a,
            &m.initializer.b,
        )
        .unwrap();
    assert_eq!(m.balances().taker_a, 10_000);
}

#[test]
fn cancel_lost_before_ledger_keeps_escrow_open() {
    let (m, engine) = crashable(100_000, 0);
    engine
        .initialize(&m.initializer.party, m.terms("1", 100, 95), &m.initializer.a)
        .unwrap();
    engine.ledger().switch.arm(Crash::BeforeApply);
    let crashed = catch_unwind(AssertUnwindSafe(|| {
        engine.cancel(&m.initializer.party, &m.initializer.party, &escrow_id("1"))
    }));
    assert!(crashed.is_err());

    let restored = restart(&m, &engine);
    let report = restored.recover().unwrap();
    assert_eq!(report.aborted.len(), 1);
    assert!(restored
        .record(&m.initializer.party, &escrow_id("1"))
        .is_some());
    assert_eq!(m.balances().initializer_a, 90_000);

    restored
        .cancel(&m.initializer.party, &m.initializer.party, &escrow_id("1"))
        .unwrap();
    assert_eq!(m.balances().initializer_a, 100_000);
}
