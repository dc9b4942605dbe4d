//! # Escrow Terms and Record
//!
//! [`EscrowTerms`] is what an initializer proposes: the two assets, the
//! two amounts, and optionally a designated taker and a finalize deadline.
//! [`EscrowRecord`] is the durable object created from accepted terms.
//!
//! ## Security Invariant
//!
//! Record fields are private and exposed through getters only. Once
//! created, the terms cannot be edited; the single mutation available is
//! [`EscrowRecord::close`], which checks the state machine. The record and
//! holding account addresses are derived from `(initializer, id)`, never
//! supplied by the caller.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use escrow_core::{
    escrow_record_address, holding_account_address, Address, Amount, AssetId, EscrowId, PartyId,
};

use crate::error::StateError;
use crate::state::EscrowState;

/// One side of the swap.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Leg {
    /// The asset locked at initialize.
    A,
    /// The asset delivered at finalize.
    B,
}

impl std::fmt::Display for Leg {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::A => f.write_str("A"),
            Self::B => f.write_str("B"),
        }
    }
}

// ── Terms ────────────────────────────────────────────────────────────

/// Negotiated terms of a two-asset swap.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EscrowTerms {
    id: EscrowId,
    asset_a: AssetId,
    amount_a: Amount,
    asset_b: AssetId,
    amount_b: Amount,
    taker: Option<PartyId>,
    expires_at: Option<DateTime<Utc>>,
}

impl EscrowTerms {
    /// Create terms from raw base-unit amounts.
    ///
    /// # Errors
    ///
    /// Returns [`StateError::InvalidAmount`] naming the leg if either
    /// amount is zero.
    pub fn new(
        id: EscrowId,
        asset_a: AssetId,
        amount_a: u64,
        asset_b: AssetId,
        amount_b: u64,
    ) -> Result<Self, StateError> {
        let amount_a = Amount::new(amount_a).map_err(|_| StateError::InvalidAmount { leg: Leg::A })?;
        let amount_b = Amount::new(amount_b).map_err(|_| StateError::InvalidAmount { leg: Leg::B })?;
        Ok(Self {
            id,
            asset_a,
            amount_a,
            asset_b,
            amount_b,
            taker: None,
            expires_at: None,
        })
    }

    /// Restrict finalization to a single named taker.
    pub fn restricted_to(mut self, taker: PartyId) -> Self {
        self.taker = Some(taker);
        self
    }

    /// Set a finalize deadline. After it passes the escrow can no longer
    /// be finalized and anyone may expire it.
    pub fn expires_at(mut self, deadline: DateTime<Utc>) -> Self {
        self.expires_at = Some(deadline);
        self
    }

    /// The escrow identifier.
    pub fn id(&self) -> &EscrowId {
        &self.id
    }

    /// Asset locked at initialize.
    pub fn asset_a(&self) -> &AssetId {
        &self.asset_a
    }

    /// Raw amount of asset A.
    pub fn amount_a(&self) -> Amount {
        self.amount_a
    }

    /// Asset delivered at finalize.
    pub fn asset_b(&self) -> &AssetId {
        &self.asset_b
    }

    /// Raw amount of asset B.
    pub fn amount_b(&self) -> Amount {
        self.amount_b
    }
}

// ── Record ───────────────────────────────────────────────────────────

/// The live record of an open escrow.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EscrowRecord {
    id: EscrowId,
    initializer: PartyId,
    asset_a: AssetId,
    asset_b: AssetId,
    amount_a: Amount,
    amount_b: Amount,
    taker: Option<PartyId>,
    expires_at: Option<DateTime<Utc>>,
    record_address: Address,
    guaranty_account: Address,
    initializer_deposit: Address,
    state: EscrowState,
    created_at: DateTime<Utc>,
}

impl EscrowRecord {
    /// Build an `Open` record for `terms` proposed by `initializer`, who
    /// funds it from `initializer_deposit`.
    ///
    /// Both addresses are derived here; nothing is written anywhere.
    pub fn open(initializer: PartyId, terms: EscrowTerms, initializer_deposit: Address) -> Self {
        let record_address = escrow_record_address(&initializer, &terms.id);
        let guaranty_account = holding_account_address(&record_address);
        Self {
            id: terms.id,
            initializer,
            asset_a: terms.asset_a,
            asset_b: terms.asset_b,
            amount_a: terms.amount_a,
            amount_b: terms.amount_b,
            taker: terms.taker,
            expires_at: terms.expires_at,
            record_address,
            guaranty_account,
            initializer_deposit,
            state: EscrowState::Open,
            created_at: Utc::now(),
        }
    }

    /// Apply a terminal transition.
    ///
    /// # Errors
    ///
    /// [`StateError::NotOpen`] if the record is already terminal,
    /// [`StateError::InvalidTransition`] if `to` is not a terminal state.
    pub fn close(&mut self, to: EscrowState) -> Result<(), StateError> {
        if self.state.is_terminal() {
            return Err(StateError::NotOpen { state: self.state });
        }
        if !self.state.can_transition_to(to) {
            return Err(StateError::InvalidTransition {
                from: self.state,
                to,
            });
        }
        self.state = to;
        Ok(())
    }

    /// Whether `now` is at or past the finalize deadline.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|deadline| now >= deadline)
    }

    /// Whether `party` may act as taker under these terms.
    pub fn admits_taker(&self, party: &PartyId) -> bool {
        self.taker.as_ref().map_or(true, |t| t == party)
    }

    /// Caller-chosen identifier.
    pub fn id(&self) -> &EscrowId {
        &self.id
    }

    /// Party who locked asset A.
    pub fn initializer(&self) -> &PartyId {
        &self.initializer
    }

    /// Asset locked at initialize.
    pub fn asset_a(&self) -> &AssetId {
        &self.asset_a
    }

    /// Asset delivered at finalize.
    pub fn asset_b(&self) -> &AssetId {
        &self.asset_b
    }

    /// Raw amount of asset A.
    pub fn amount_a(&self) -> Amount {
        self.amount_a
    }

    /// Raw amount of asset B.
    pub fn amount_b(&self) -> Amount {
        self.amount_b
    }

    /// Designated taker, if the terms restrict it.
    pub fn taker(&self) -> Option<&PartyId> {
        self.taker.as_ref()
    }

    /// Finalize deadline, if any.
    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        self.expires_at
    }

    /// Derived address of this record.
    pub fn record_address(&self) -> Address {
        self.record_address
    }

    /// Derived address of the holding account.
    pub fn guaranty_account(&self) -> Address {
        self.guaranty_account
    }

    /// The initializer's source account, refunded on cancel.
    pub fn initializer_deposit(&self) -> Address {
        self.initializer_deposit
    }

    /// Current lifecycle state.
    pub fn state(&self) -> EscrowState {
        self.state
    }

    /// When the record was created.
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }
}
