//! # Accounts and Authorities
//!
//! A [`TokenAccount`] holds a balance of exactly one asset and is owned
//! either by a party or by a program address. Program-owned accounts are
//! the escrow's holding accounts: no party can debit or close them, only
//! the engine presenting [`Authority::Program`] for that address.

use serde::{Deserialize, Serialize};

use escrow_core::{Address, AssetId, PartyId};

/// Who controls a token account.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum Owner {
    /// A trading party.
    Party(PartyId),
    /// A program-derived address. Only the program holding the derivation
    /// seeds can act for it.
    Program(Address),
}

impl Owner {
    /// The party behind this owner, if it is one.
    pub fn party(&self) -> Option<&PartyId> {
        match self {
            Self::Party(p) => Some(p),
            Self::Program(_) => None,
        }
    }
}

impl std::fmt::Display for Owner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Party(p) => write!(f, "party:{p}"),
            Self::Program(a) => write!(f, "program:{a}"),
        }
    }
}

/// The signer presented when debiting or closing an account.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum Authority {
    /// A party's signature.
    Party(PartyId),
    /// A program signing for one of its derived addresses.
    Program(Address),
}

impl Authority {
    /// Whether this authority controls accounts owned by `owner`.
    pub fn controls(&self, owner: &Owner) -> bool {
        match (self, owner) {
            (Self::Party(a), Owner::Party(b)) => a == b,
            (Self::Program(a), Owner::Program(b)) => a == b,
            _ => false,
        }
    }
}

/// A balance-holding account for one asset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenAccount {
    /// Location of the account.
    pub address: Address,
    /// The asset this account holds.
    pub asset: AssetId,
    /// Controlling owner.
    pub owner: Owner,
    /// Raw balance in base units.
    pub balance: u64,
    /// Party that funded the account's storage.
    pub storage_payer: PartyId,
    /// Storage deposit returned on close.
    pub storage_deposit: u64,
}

impl TokenAccount {
    /// Whether `party` owns this account directly.
    pub fn is_owned_by(&self, party: &PartyId) -> bool {
        self.owner.party() == Some(party)
    }
}

/// Metadata for an asset class.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetInfo {
    /// Asset identifier.
    pub id: AssetId,
    /// Number of decimal places in the asset's display representation.
    pub decimals: u8,
    /// Total raw units in existence.
    pub supply: u64,
}
