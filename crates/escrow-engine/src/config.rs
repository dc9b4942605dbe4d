//! Engine configuration.
//!
//! Defaults match the on-ledger program this engine settles against.
//! Override via environment variables or explicit construction.

use escrow_core::MAX_ESCROW_ID_LEN;

/// Who receives the holding account's storage deposit when a finalize
/// closes it. Cancel and expire always return it to the initializer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReclaimPolicy {
    /// The party who paid for the account at initialize.
    #[default]
    Initializer,
    /// The taker who completed the swap.
    Taker,
}

impl ReclaimPolicy {
    /// The string accepted by `ESCROW_RECLAIM_TO`.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Initializer => "initializer",
            Self::Taker => "taker",
        }
    }
}

impl std::str::FromStr for ReclaimPolicy {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "initializer" => Ok(Self::Initializer),
            "taker" => Ok(Self::Taker),
            _ => Err(ConfigError::InvalidValue {
                var: "ESCROW_RECLAIM_TO".to_string(),
                value: s.to_string(),
            }),
        }
    }
}

/// Escrow engine configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    /// Longest accepted escrow id, in bytes. Never above
    /// [`MAX_ESCROW_ID_LEN`].
    pub max_id_len: usize,
    /// Audit trail capacity before the oldest entries are trimmed.
    pub audit_capacity: usize,
    /// Storage reclaim target on finalize.
    pub reclaim_policy: ReclaimPolicy,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_id_len: MAX_ESCROW_ID_LEN,
            audit_capacity: 10_000,
            reclaim_policy: ReclaimPolicy::Initializer,
        }
    }
}

impl EngineConfig {
    /// Load configuration from environment variables.
    ///
    /// Variables:
    /// - `ESCROW_MAX_ID_LEN` (default: 150, at most 150)
    /// - `ESCROW_AUDIT_CAPACITY` (default: 10000, at least 1)
    /// - `ESCROW_RECLAIM_TO` (`initializer` | `taker`, default: `initializer`)
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Build a configuration from an arbitrary variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let max_id_len = match lookup("ESCROW_MAX_ID_LEN") {
            Some(raw) => parse_bounded("ESCROW_MAX_ID_LEN", &raw, 1, MAX_ESCROW_ID_LEN)?,
            None => defaults.max_id_len,
        };
        let audit_capacity = match lookup("ESCROW_AUDIT_CAPACITY") {
            Some(raw) => parse_bounded("ESCROW_AUDIT_CAPACITY", &raw, 1, usize::MAX)?,
            None => defaults.audit_capacity,
        };
        let reclaim_policy = match lookup("ESCROW_RECLAIM_TO") {
            Some(raw) => raw.parse()?,
            None => defaults.reclaim_policy,
        };

        Ok(Self {
            max_id_len,
            audit_capacity,
            reclaim_policy,
        })
    }
}

fn parse_bounded(var: &str, raw: &str, min: usize, max: usize) -> Result<usize, ConfigError> {
    let value: usize = raw.trim().parse().map_err(|_| ConfigError::InvalidValue {
        var: var.to_string(),
        value: raw.to_string(),
    })?;
    if value < min || value > max {
        return Err(ConfigError::OutOfRange {
            var: var.to_string(),
            value,
            min,
            max,
        });
    }
    Ok(value)
}

/// Configuration errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid value for {var}: {value:?}")]
    InvalidValue { var: String, value: String },
    #[error("{var}={value} is outside {min}..={max}")]
    OutOfRange {
        var: String,
        value: usize,
        min: usize,
        max: usize,
    },
}
