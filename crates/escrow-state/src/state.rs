//! # Escrow State

use serde::{Deserialize, Serialize};

/// Lifecycle state of an escrow record.
///
/// A terminal state never appears on a live record: the transition into
/// it is immediately followed by destruction of the record. It survives
/// only in the journal entry that settled the close.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EscrowState {
    /// Asset A is locked in the holding account, awaiting a taker.
    Open,
    /// The swap completed. Terminal.
    Finalized,
    /// The lock was reversed. Terminal.
    Cancelled,
}

impl EscrowState {
    /// Whether this is a terminal state.
    pub fn is_terminal(&self) -> bool {
        match self {
            Self::Open => false,
            Self::Finalized | Self::Cancelled => true,
        }
    }

    /// Whether `self → to` is a legal transition.
    ///
    /// Only `Open → Finalized` and `Open → Cancelled` are.
    pub fn can_transition_to(&self, to: EscrowState) -> bool {
        matches!(
            (self, to),
            (Self::Open, Self::Finalized) | (Self::Open, Self::Cancelled)
        )
    }

    /// The canonical string name of this state.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Open => "OPEN",
            Self::Finalized => "FINALIZED",
            Self::Cancelled => "CANCELLED",
        }
    }
}

impl std::fmt::Display for EscrowState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL: [EscrowState; 3] = [
        EscrowState::Open,
        EscrowState::Finalized,
        EscrowState::Cancelled,
    ];

    #[test]
    fn only_open_is_live() {
        assert!(!EscrowState::Open.is_terminal());
        assert!(EscrowState::Finalized.is_terminal());
        assert!(EscrowState::Cancelled.is_terminal());
    }

    #[test]
    fn transition_matrix() {
        for from in ALL {
            for to in ALL {
                let expected = from == EscrowState::Open && to != EscrowState::Open;
                assert_eq!(
                    from.can_transition_to(to),
                    expected,
                    "{from} -> {to}"
                );
            }
        }
    }

    #[test]
    fn serde_names_match_display() {
        for s in ALL {
            let json = serde_json::to_string(&s).unwrap();
            assert_eq!(json, format!("\"{}\"", s.as_str()));
            let back: EscrowState = serde_json::from_str(&json).unwrap();
            assert_eq!(back, s);
        }
    }
}
