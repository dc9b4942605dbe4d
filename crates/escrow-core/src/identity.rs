//! # Identity Newtypes
//!
//! Identifiers for the parties, assets and escrows handled by the stack.
//! Each is a distinct type, so a [`PartyId`] cannot be passed where an
//! [`AssetId`] is expected.
//!
//! ## Validation
//!
//! All three are printable-ASCII strings validated at construction and at
//! deserialization. [`EscrowId`] is additionally bounded by
//! [`MAX_ESCROW_ID_LEN`] bytes because it is a seed of the record address.

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

/// Maximum length of an escrow identifier in bytes.
pub const MAX_ESCROW_ID_LEN: usize = 150;

/// Maximum length of party and asset identifiers in bytes.
const MAX_NAME_LEN: usize = 64;

/// Routes `Deserialize` through the type's validating `new()` so invalid
/// values are rejected when read back from storage, not silently accepted.
macro_rules! impl_validating_deserialize {
    ($ty:ident) => {
        impl<'de> Deserialize<'de> for $ty {
            fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
            where
                D: serde::Deserializer<'de>,
            {
                let raw = String::deserialize(deserializer)?;
                Self::new(raw).map_err(serde::de::Error::custom)
            }
        }
    };
}

fn validate(kind: &'static str, value: &str, max: usize) -> Result<(), ValidationError> {
    if value.is_empty() {
        return Err(ValidationError::Empty { kind });
    }
    if value.len() > max {
        return Err(ValidationError::TooLong {
            kind,
            max,
            actual: value.len(),
        });
    }
    if let Some(ch) = value.chars().find(|c| !c.is_ascii_graphic()) {
        return Err(ValidationError::InvalidCharacter {
            kind,
            ch,
            value: value.to_string(),
        });
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// PartyId
// ---------------------------------------------------------------------------

/// Identity of a trading party (initializer or taker).
///
/// Signature verification happens outside this stack; a `PartyId` handed
/// to the engine is taken as the authenticated caller.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct PartyId(String);

impl_validating_deserialize!(PartyId);

impl PartyId {
    /// Create a party identifier.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError`] if the value is empty, longer than 64
    /// bytes, or contains whitespace or non-ASCII characters.
    pub fn new(value: impl Into<String>) -> Result<Self, ValidationError> {
        let s = value.into();
        validate("party id", &s, MAX_NAME_LEN)?;
        Ok(Self(s))
    }

    /// Access the identifier string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for PartyId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

// ---------------------------------------------------------------------------
// AssetId
// ---------------------------------------------------------------------------

/// Identifier of an asset class (a token mint in ledger terms).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct AssetId(String);

impl_validating_deserialize!(AssetId);

impl AssetId {
    /// Create an asset identifier.
    ///
    /// # Errors
    ///
    /// Same rules as [`PartyId::new`].
    pub fn new(value: impl Into<String>) -> Result<Self, ValidationError> {
        let s = value.into();
        validate("asset id", &s, MAX_NAME_LEN)?;
        Ok(Self(s))
    }

    /// Access the identifier string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for AssetId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

// ---------------------------------------------------------------------------
// EscrowId
// ---------------------------------------------------------------------------

/// Caller-chosen escrow identifier, unique per initializer.
///
/// Together with the initializer it seeds the escrow record address, so it
/// is immutable once an escrow is created.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct EscrowId(String);

impl_validating_deserialize!(EscrowId);

impl EscrowId {
    /// Create an escrow identifier.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError`] if the value is empty, longer than
    /// [`MAX_ESCROW_ID_LEN`] bytes, or contains non-printable characters.
    pub fn new(value: impl Into<String>) -> Result<Self, ValidationError> {
        let s = value.into();
        validate("escrow id", &s, MAX_ESCROW_ID_LEN)?;
        Ok(Self(s))
    }

    /// Access the identifier string.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Length in bytes.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether the identifier is empty. Never true for a constructed id.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl std::fmt::Display for EscrowId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}
