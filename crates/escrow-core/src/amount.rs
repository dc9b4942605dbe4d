//! # Amounts
//!
//! Raw integral asset quantities. An [`Amount`] is never zero: the escrow
//! terms require both legs of a swap to be strictly positive, and encoding
//! that in the type means no downstream code re-checks it.
//!
//! Callers usually think in whole units ("100 tokens"), while ledgers move
//! raw base units. [`Amount::from_units`] performs the `units * 10^decimals`
//! conversion with overflow detection.

use std::num::NonZeroU64;

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

/// A strictly positive raw asset quantity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct Amount(NonZeroU64);

impl<'de> Deserialize<'de> for Amount {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let raw = u64::deserialize(deserializer)?;
        Self::new(raw).map_err(serde::de::Error::custom)
    }
}

impl Amount {
    /// Create an amount from raw base units.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::ZeroAmount`] if `raw` is zero.
    pub fn new(raw: u64) -> Result<Self, ValidationError> {
        NonZeroU64::new(raw)
            .map(Self)
            .ok_or(ValidationError::ZeroAmount)
    }

    /// Convert whole units to raw base units for an asset with `decimals`
    /// decimal places.
    ///
    /// `Amount::from_units(100, 2)` is raw `10_000`.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::ZeroAmount`] for zero units and
    /// [`ValidationError::AmountOverflow`] if the scaled value does not fit
    /// in a `u64`.
    pub fn from_units(units: u64, decimals: u8) -> Result<Self, ValidationError> {
        let overflow = || ValidationError::AmountOverflow { units, decimals };
        let scale = 10u64
            .checked_pow(u32::from(decimals))
            .ok_or_else(overflow)?;
        let raw = units.checked_mul(scale).ok_or_else(overflow)?;
        Self::new(raw)
    }

    /// The raw base-unit value.
    pub fn get(&self) -> u64 {
        self.0.get()
    }
}

impl std::fmt::Display for Amount {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<Amount> for u64 {
    fn from(amount: Amount) -> u64 {
        amount.get()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_rejected() {
        assert_eq!(Amount::new(0).unwrap_err(), ValidationError::ZeroAmount);
        assert_eq!(
            Amount::from_units(0, 2).unwrap_err(),
            ValidationError::ZeroAmount
        );
    }

    #[test]
    fn scaling_by_decimals() {
        assert_eq!(Amount::from_units(100, 2).unwrap().get(), 10_000);
        assert_eq!(Amount::from_units(95, 2).unwrap().get(), 9_500);
        assert_eq!(Amount::from_units(7, 0).unwrap().get(), 7);
    }

    #[test]
    fn scaling_overflow_detected() {
        assert!(matches!(
            Amount::from_units(u64::MAX, 1),
            Err(ValidationError::AmountOverflow { decimals: 1, .. })
        ));
        // 10^20 does not fit in u64.
        assert!(matches!(
            Amount::from_units(1, 20),
            Err(ValidationError::AmountOverflow { .. })
        ));
    }

    #[test]
    fn serde_is_a_bare_number() {
        let a = Amount::new(9_500).unwrap();
        assert_eq!(serde_json::to_string(&a).unwrap(), "9500");
        let back: Amount = serde_json::from_str("9500").unwrap();
        assert_eq!(back, a);
        let zero: Result<Amount, _> = serde_json::from_str("0");
        assert!(zero.is_err());
    }
}

#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        /// Scaling either succeeds with exactly units * 10^decimals or
        /// reports overflow; it never wraps.
        #[test]
        fn from_units_never_wraps(units in 1u64.., decimals in 0u8..=19) {
            let expected = (units as u128) * 10u128.pow(u32::from(decimals));
            match Amount::from_units(units, decimals) {
                Ok(a) => prop_assert_eq!(a.get() as u128, expected),
                Err(ValidationError::AmountOverflow { .. }) => {
                    prop_assert!(expected > u64::MAX as u128)
                }
                Err(e) => prop_assert!(false, "unexpected error {e}"),
            }
        }
    }
}
