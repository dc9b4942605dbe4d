//! Optional terms and engine configuration: finalize deadlines, restricted
//! takers and storage reclaim targets.

use std::thread;
use std::time::Duration;

use chrono::{TimeDelta, Utc};

use escrow_engine::{AuditKind, EngineConfig, EscrowError, ReclaimPolicy};
use escrow_integration_tests::{escrow_id, Market};
use escrow_ledger::AssetLedger;

#[test]
fn expired_escrow_refunds_without_the_initializer() {
    let m = Market::new(100_000, 9_500);
    let deadline = Utc::now() + TimeDelta::try_milliseconds(100).unwrap();
    m.initialize(m.terms("late", 100, 95).expires_at(deadline))
        .unwrap();

    assert!(matches!(
        m.engine.expire(&m.initializer.party, &escrow_id("late")),
        Err(EscrowError::NotExpired { .. })
    ));
    thread::sleep(Duration::from_millis(150));

    assert!(matches!(
        m.finalize("late"),
        Err(EscrowError::EscrowExpired { .. })
    ));
    m.engine
        .expire(&m.initializer.party, &escrow_id("late"))
        .unwrap();

    let b = m.balances();
    assert_eq!((b.initializer_a, b.taker_b), (100_000, 9_500));
    assert!(m.engine.open_records().is_empty());
    assert_eq!(
        m.engine.audit_entries().last().map(|e| e.kind),
        Some(AuditKind::Expired)
    );
}

#[test]
fn restricted_escrow_admits_only_its_taker() {
    let m = Market::new(100_000, 9_500);
    let carol = m.trader("carol", 0, 9_500);
    m.initialize(m.terms("otc", 100, 95).restricted_to(carol.party.clone()))
        .unwrap();

    assert!(matches!(
        m.finalize("otc"),
        Err(EscrowError::AuthorizationFailed { .. })
    ));
    m.engine
        .finalize(
            &m.initializer.party,
            &escrow_id("otc"),
            &carol.party,
            &carol.b,
            &carol.a,
            &m.initializer.b,
        )
        .unwrap();

    assert_eq!(m.ledger.balance(&carol.a), Some(10_000));
    assert_eq!(m.balances().taker_b, 9_500);
}

#[test]
fn taker_reclaims_storage_when_configured() {
    let config = EngineConfig {
        reclaim_policy: ReclaimPolicy::Taker,
        ..EngineConfig::default()
    };
    let m = Market::with_config(100_000, 9_500, config);
    m.initialize(m.terms("1", 100, 95)).unwrap();
    m.finalize("1").unwrap();

    assert!(m.ledger.storage_credit(&m.taker.party) > 0);
    assert_eq!(m.ledger.storage_credit(&m.initializer.party), 0);
}

#[test]
fn cancel_reclaims_to_initializer_regardless_of_policy() {
    let config = EngineConfig {
        reclaim_policy: ReclaimPolicy::Taker,
        ..EngineConfig::default()
    };
    let m = Market::with_config(100_000, 0, config);
    m.initialize(m.terms("1", 100, 95)).unwrap();
    m.cancel("1").unwrap();

    assert!(m.ledger.storage_credit(&m.initializer.party) > 0);
    assert_eq!(m.ledger.storage_credit(&m.taker.party), 0);
}
