//! End-to-end swap lifecycle: initialize, finalize, cancel and their
//! failure paths against a shared in-memory ledger.

use escrow_engine::{AuditKind, EscrowError};
use escrow_integration_tests::{asset_a, asset_b, escrow_id, Balances, Market};
use escrow_ledger::AssetLedger;
use escrow_state::EscrowState;

// ---------------------------------------------------------------------------
// 100 A for 95 B at 2 decimals
// ---------------------------------------------------------------------------

#[test]
fn hundred_for_ninety_five() {
    let m = Market::new(100_000, 9_500);
    let terms = m.terms("1718035200123", 100, 95);
    assert_eq!(terms.amount_a().get(), 10_000);
    assert_eq!(terms.amount_b().get(), 9_500);

    m.initialize(terms).unwrap();
    let record = m
        .engine
        .record(&m.initializer.party, &escrow_id("1718035200123"))
        .unwrap();
    assert_eq!(record.state(), EscrowState::Open);
    assert_eq!(m.ledger.balance(&record.guaranty_account()), Some(10_000));
    assert_eq!(m.balances().initializer_a, 90_000);

    m.finalize("1718035200123").unwrap();

    assert_eq!(
        m.balances(),
        Balances {
            initializer_a: 90_000,
            initializer_b: 9_500,
            taker_a: 10_000,
            taker_b: 0,
        }
    );
    assert!(m.ledger.account(&record.guaranty_account()).is_none());
    assert!(m
        .engine
        .record(&m.initializer.party, &escrow_id("1718035200123"))
        .is_none());
}

#[test]
fn finalize_conserves_supply() {
    let m = Market::new(100_000, 9_500);
    m.initialize(m.terms("1", 100, 95)).unwrap();
    m.finalize("1").unwrap();

    assert_eq!(m.ledger.total_supply(&asset_a()), Some(100_000));
    assert_eq!(m.ledger.total_supply(&asset_b()), Some(9_500));
    assert_eq!(m.ledger.circulating(&asset_a()), 100_000);
    assert_eq!(m.ledger.circulating(&asset_b()), 9_500);
}

#[test]
fn holding_storage_returns_to_initializer() {
    let m = Market::new(100_000, 9_500);
    m.initialize(m.terms("1", 100, 95)).unwrap();
    let accounts_open = m.ledger.account_count();
    m.finalize("1").unwrap();

    assert_eq!(m.ledger.account_count(), accounts_open - 1);
    assert!(m.ledger.storage_credit(&m.initializer.party) > 0);
    assert_eq!(m.ledger.storage_credit(&m.taker.party), 0);
}

// ---------------------------------------------------------------------------
// Failure paths
// ---------------------------------------------------------------------------

#[test]
fn taker_short_of_asset_b() {
    let m = Market::new(100_000, 9_000);
    m.initialize(m.terms("1", 100, 95)).unwrap();
    let before = m.balances();

    let err = m.finalize("1").unwrap_err();
    assert!(matches!(
        err,
        EscrowError::InsufficientBalance {
            required: 9_500,
            available: 9_000,
            ..
        }
    ));
    assert_eq!(m.balances(), before);
    assert!(m
        .engine
        .record(&m.initializer.party, &escrow_id("1"))
        .is_some());
}

#[test]
fn finalize_twice() {
    let m = Market::new(100_000, 20_000);
    m.initialize(m.terms("1", 100, 95)).unwrap();
    m.finalize("1").unwrap();
    let after_first = m.balances();

    assert!(matches!(
        m.finalize("1").unwrap_err(),
        EscrowError::EscrowNotOpen { .. }
    ));
    assert_eq!(m.balances(), after_first);
}

#[test]
fn duplicate_key_while_open() {
    let m = Market::new(100_000, 0);
    m.initialize(m.terms("dup", 100, 95)).unwrap();
    let before = m.balances();

    assert!(matches!(
        m.initialize(m.terms("dup", 10, 1)).unwrap_err(),
        EscrowError::DuplicateEscrow { .. }
    ));
    assert_eq!(m.balances(), before);
}

#[test]
fn zero_units_rejected() {
    let m = Market::new(100_000, 0);
    assert!(matches!(
        m.engine
            .terms_in_units(escrow_id("z"), asset_a(), 100, asset_b(), 0)
            .unwrap_err(),
        EscrowError::InvalidAmount { .. }
    ));
}

// ---------------------------------------------------------------------------
// Cancel
// ---------------------------------------------------------------------------

#[test]
fn cancel_is_a_full_reversal() {
    let m = Market::new(100_000, 9_500);
    let before = m.balances();
    m.initialize(m.terms("1", 100, 95)).unwrap();
    m.cancel("1").unwrap();

    assert_eq!(m.balances(), before);
    assert!(m.engine.open_records().is_empty());

    // The key is free again.
    m.initialize(m.terms("1", 100, 95)).unwrap();
}

#[test]
fn taker_cannot_cancel() {
    let m = Market::new(100_000, 9_500);
    m.initialize(m.terms("1", 100, 95)).unwrap();
    let err = m
        .engine
        .cancel(&m.taker.party, &m.initializer.party, &escrow_id("1"))
        .unwrap_err();
    assert!(matches!(err, EscrowError::AuthorizationFailed { .. }));
    m.finalize("1").unwrap();
}

#[test]
fn cancel_can_refund_into_another_own_account() {
    let m = Market::new(100_000, 9_500);
    m.initialize(m.terms("1", 100, 95)).unwrap();
    let spare = m.ledger.open_account(&m.initializer.party, &asset_a()).unwrap();

    let err = m
        .engine
        .cancel_to(&m.initializer.party, &m.initializer.party, &escrow_id("1"), &m.taker.a)
        .unwrap_err();
    assert!(matches!(err, EscrowError::InvalidAccount { .. }));

    m.engine
        .cancel_to(&m.initializer.party, &m.initializer.party, &escrow_id("1"), &spare)
        .unwrap();
    assert_eq!(m.ledger.balance(&spare), Some(10_000));
    assert_eq!(m.balances().initializer_a, 90_000);
    assert!(m.engine.open_records().is_empty());
}

// ---------------------------------------------------------------------------
// Audit trail
// ---------------------------------------------------------------------------

#[test]
fn audit_trail_keeps_terminal_path() {
    let m = Market::new(100_000, 9_500);
    m.initialize(m.terms("f", 100, 95)).unwrap();
    m.initialize(m.terms("c", 100, 95)).unwrap();
    m.finalize("f").unwrap();
    m.cancel("c").unwrap();

    let entries = m.engine.audit_entries();
    let finalized: Vec<_> = entries
        .iter()
        .filter(|e| e.kind == AuditKind::Finalized)
        .collect();
    let cancelled: Vec<_> = entries
        .iter()
        .filter(|e| e.kind == AuditKind::Cancelled)
        .collect();
    assert_eq!(finalized.len(), 1);
    assert_eq!(finalized[0].id.as_str(), "f");
    assert_eq!(
        finalized[0].metadata.as_ref().unwrap()["taker"],
        serde_json::json!("taker")
    );
    assert_eq!(cancelled.len(), 1);
    assert_eq!(cancelled[0].id.as_str(), "c");
    assert!(entries.iter().all(|e| e.digest().is_some()));
}
