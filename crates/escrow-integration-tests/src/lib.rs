//! Shared fixtures for the cross-crate escrow tests.
//!
//! A [`Market`] is a ledger with two registered 2-decimal assets, an
//! engine over it, and two funded traders: the initializer holds asset A,
//! the taker holds asset B.

use std::sync::Arc;

use escrow_core::{Address, AssetId, EscrowId, PartyId};
use escrow_engine::{EngineConfig, EscrowEngine, EscrowError};
use escrow_ledger::{AssetLedger, MemoryLedger};
use escrow_state::EscrowTerms;
use tracing_subscriber::EnvFilter;

/// Decimals used for both assets.
pub const DECIMALS: u8 = 2;

/// Install a test-writer subscriber honouring `RUST_LOG`. Safe to call
/// from every test.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Identifier of asset A.
pub fn asset_a() -> AssetId {
    AssetId::new("TOKA").unwrap()
}

/// Identifier of asset B.
pub fn asset_b() -> AssetId {
    AssetId::new("TOKB").unwrap()
}

/// Escrow id from a string.
pub fn escrow_id(s: &str) -> EscrowId {
    EscrowId::new(s).unwrap()
}

/// A party with one account per asset.
#[derive(Debug, Clone)]
pub struct Trader {
    pub party: PartyId,
    pub a: Address,
    pub b: Address,
}

/// Raw balances of both traders, for before/after comparisons.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Balances {
    pub initializer_a: u64,
    pub initializer_b: u64,
    pub taker_a: u64,
    pub taker_b: u64,
}

/// A two-trader market over a shared in-memory ledger.
pub struct Market {
    pub ledger: Arc<MemoryLedger>,
    pub engine: EscrowEngine<Arc<MemoryLedger>>,
    pub initializer: Trader,
    pub taker: Trader,
}

impl Market {
    /// Fund the initializer with `initializer_a` raw units of asset A and
    /// the taker with `taker_b` raw units of asset B.
    pub fn new(initializer_a: u64, taker_b: u64) -> Self {
        Self::with_config(initializer_a, taker_b, EngineConfig::default())
    }

    /// As [`Market::new`], with explicit engine configuration.
    pub fn with_config(initializer_a: u64, taker_b: u64, config: EngineConfig) -> Self {
        init_tracing();
        let ledger = Arc::new(MemoryLedger::new());
        ledger.create_asset(&asset_a(), DECIMALS).unwrap();
        ledger.create_asset(&asset_b(), DECIMALS).unwrap();
        let initializer = open_trader(&ledger, "initializer", initializer_a, 0);
        let taker = open_trader(&ledger, "taker", 0, taker_b);
        let engine = EscrowEngine::with_config(Arc::clone(&ledger), config);
        Self {
            ledger,
            engine,
            initializer,
            taker,
        }
    }

    /// Open and fund another trader on the same ledger.
    pub fn trader(&self, name: &str, a: u64, b: u64) -> Trader {
        open_trader(&self.ledger, name, a, b)
    }

    /// Terms in whole units, scaled by the assets' decimals.
    pub fn terms(&self, id: &str, units_a: u64, units_b: u64) -> EscrowTerms {
        self.engine
            .terms_in_units(escrow_id(id), asset_a(), units_a, asset_b(), units_b)
            .unwrap()
    }

    /// Initialize `id` from the initializer's asset A account.
    pub fn initialize(&self, terms: EscrowTerms) -> Result<(), EscrowError> {
        self.engine
            .initialize(&self.initializer.party, terms, &self.initializer.a)
            .map(|_| ())
    }

    /// Finalize `id` as the market's taker, paying from and receiving into
    /// the usual accounts.
    pub fn finalize(&self, id: &str) -> Result<(), EscrowError> {
        self.engine.finalize(
            &self.initializer.party,
            &escrow_id(id),
            &self.taker.party,
            &self.taker.b,
            &self.taker.a,
            &self.initializer.b,
        )
    }

    /// Cancel `id` as the initializer.
    pub fn cancel(&self, id: &str) -> Result<(), EscrowError> {
        self.engine.cancel(
            &self.initializer.party,
            &self.initializer.party,
            &escrow_id(id),
        )
    }

    /// Current balances of both traders.
    pub fn balances(&self) -> Balances {
        let bal = |addr: &Address| self.ledger.balance(addr).unwrap_or(0);
        Balances {
            initializer_a: bal(&self.initializer.a),
            initializer_b: bal(&self.initializer.b),
            taker_a: bal(&self.taker.a),
            taker_b: bal(&self.taker.b),
        }
    }
}

fn open_trader(ledger: &MemoryLedger, name: &str, a: u64, b: u64) -> Trader {
    let party = PartyId::new(name).unwrap();
    let a_addr = ledger.open_account(&party, &asset_a()).unwrap();
    let b_addr = ledger.open_account(&party, &asset_b()).unwrap();
    if a > 0 {
        ledger.mint_to(&a_addr, a).unwrap();
    }
    if b > 0 {
        ledger.mint_to(&b_addr, b).unwrap();
    }
    Trader {
        party,
        a: a_addr,
        b: b_addr,
    }
}
