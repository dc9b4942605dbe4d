//! Per-key linearizability under real threads.
//!
//! Racing operations on one record must produce exactly one success; the
//! losers see `EscrowNotOpen` and the ledger shows exactly one settlement.

use std::sync::Barrier;
use std::thread;

use escrow_engine::EscrowError;
use escrow_integration_tests::{asset_a, asset_b, escrow_id, Market};

const RACERS: usize = 8;

#[test]
fn racing_finalizes_settle_once() {
    // Enough B for every racer, so only the state check can stop them.
    let m = Market::new(100_000, 9_500 * RACERS as u64);
    m.initialize(m.terms("race", 100, 95)).unwrap();
    let barrier = Barrier::new(RACERS);

    let results: Vec<Result<(), EscrowError>> = thread::scope(|s| {
        let handles: Vec<_> = (0..RACERS)
            .map(|_| {
                s.spawn(|| {
                    barrier.wait();
                    m.finalize("race")
                })
            })
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });

    let ok = results.iter().filter(|r| r.is_ok()).count();
    assert_eq!(ok, 1);
    assert!(results
        .iter()
        .filter_map(|r| r.as_ref().err())
        .all(|e| matches!(e, EscrowError::EscrowNotOpen { .. })));

    let b = m.balances();
    assert_eq!(b.taker_a, 10_000);
    assert_eq!(b.initializer_b, 9_500);
    assert_eq!(b.taker_b, 9_500 * (RACERS as u64 - 1));
}

#[test]
fn finalize_races_cancel() {
    for round in 0..20 {
        let m = Market::new(100_000, 9_500);
        let id = format!("round-{round}");
        m.initialize(m.terms(&id, 100, 95)).unwrap();
        let barrier = Barrier::new(2);

        let (fin, can) = thread::scope(|s| {
            let f = s.spawn(|| {
                barrier.wait();
                m.finalize(&id)
            });
            let c = s.spawn(|| {
                barrier.wait();
                m.cancel(&id)
            });
            (f.join().unwrap(), c.join().unwrap())
        });

        assert!(fin.is_ok() != can.is_ok(), "round {round}: exactly one wins");
        let b = m.balances();
        if fin.is_ok() {
            assert!(matches!(can, Err(EscrowError::EscrowNotOpen { .. })));
            assert_eq!((b.taker_a, b.initializer_b), (10_000, 9_500));
        } else {
            assert!(matches!(fin, Err(EscrowError::EscrowNotOpen { .. })));
            assert_eq!((b.initializer_a, b.taker_b), (100_000, 9_500));
        }
        assert!(m.engine.open_records().is_empty());
    }
}

#[test]
fn racing_duplicate_initializes() {
    let m = Market::new(10_000 * RACERS as u64, 0);
    let barrier = Barrier::new(RACERS);

    let results: Vec<_> = thread::scope(|s| {
        let handles: Vec<_> = (0..RACERS)
            .map(|_| {
                s.spawn(|| {
                    barrier.wait();
                    m.initialize(m.terms("same", 100, 95))
                })
            })
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });

    assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
    assert!(results
        .iter()
        .filter_map(|r| r.as_ref().err())
        .all(|e| matches!(e, EscrowError::DuplicateEscrow { .. })));
    assert_eq!(m.balances().initializer_a, 10_000 * (RACERS as u64 - 1));
}

#[test]
fn distinct_keys_settle_in_parallel() {
    let m = Market::new(10_000 * RACERS as u64, 9_500 * RACERS as u64);
    for i in 0..RACERS {
        m.initialize(m.terms(&format!("k{i}"), 100, 95)).unwrap();
    }

    thread::scope(|s| {
        for i in 0..RACERS {
            let m = &m;
            s.spawn(move || m.finalize(&format!("k{i}")).unwrap());
        }
    });

    assert!(m.engine.open_records().is_empty());
    let b = m.balances();
    assert_eq!(b.taker_a, 10_000 * RACERS as u64);
    assert_eq!(b.initializer_b, 9_500 * RACERS as u64);
    assert_eq!(m.ledger.circulating(&asset_a()), 10_000 * RACERS as u64);
    assert_eq!(m.ledger.circulating(&asset_b()), 9_500 * RACERS as u64);
    assert!(m
        .engine
        .record(&m.initializer.party, &escrow_id("k0"))
        .is_none());
}
