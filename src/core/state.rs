//! Mediation state types

use serde::{Deserialize, Serialize};

/// Where a capability request is in the mediation flow
///
/// ```text
/// Received -> Validating -> Rejected --------------------> Resolved
///                        -> Deduplicating -> Waiting -----> Resolved
///                                         -> DrivingOracle -> Resolved
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MediationState {
    /// Request accepted from the rendering engine
    Received,

    /// Origin and capabilities are being checked
    Validating,

    /// Untrusted origin or nothing supported; denied without the oracle
    Rejected,

    /// Looking up an in-flight entry for the same key
    Deduplicating,

    /// Joined an entry another request is driving
    Waiting,

    /// This request drives the oracle invocation for its entry
    DrivingOracle,

    /// Outcome delivered to the rendering engine
    Resolved,
}

impl MediationState {
    /// Check if the request has already been answered
    pub fn is_terminal(&self) -> bool {
        matches!(self, MediationState::Rejected | MediationState::Resolved)
    }

    /// Check if the request is suspended on the oracle
    pub fn is_suspended(&self) -> bool {
        matches!(self, MediationState::Waiting | MediationState::DrivingOracle)
    }

    /// Whether `next` is a legal successor of this state
    pub fn can_transition_to(&self, next: MediationState) -> bool {
        use MediationState::*;
        matches!(
            (self, next),
            (Received, Validating)
                | (Validating, Rejected)
                | (Validating, Resolved)
                | (Validating, Deduplicating)
                | (Rejected, Resolved)
                | (Deduplicating, Waiting)
                | (Deduplicating, DrivingOracle)
                | (Waiting, Resolved)
                | (DrivingOracle, Resolved)
        )
    }
}

impl Default for MediationState {
    fn default() -> Self {
        MediationState::Received
    }
}

impl std::fmt::Display for MediationState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MediationState::Received => write!(f, "Received"),
            MediationState::Validating => write!(f, "Validating"),
            MediationState::Rejected => write!(f, "Rejected"),
            MediationState::Deduplicating => write!(f, "Deduplicating"),
            MediationState::Waiting => write!(f, "Waiting"),
            MediationState::DrivingOracle => write!(f, "Driving oracle"),
            MediationState::Resolved => write!(f, "Resolved"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_checks() {
        assert!(MediationState::Rejected.is_terminal());
        assert!(MediationState::Resolved.is_terminal());
        assert!(!MediationState::Waiting.is_terminal());

        assert!(MediationState::Waiting.is_suspended());
        assert!(MediationState::DrivingOracle.is_suspended());
        assert!(!MediationState::Validating.is_suspended());
    }

    #[test]
    fn test_transitions() {
        assert!(MediationState::Received.can_transition_to(MediationState::Validating));
        assert!(MediationState::Deduplicating.can_transition_to(MediationState::Waiting));
        assert!(MediationState::DrivingOracle.can_transition_to(MediationState::Resolved));

        assert!(!MediationState::Received.can_transition_to(MediationState::Resolved));
        assert!(!MediationState::Waiting.can_transition_to(MediationState::DrivingOracle));
        assert!(!MediationState::Resolved.can_transition_to(MediationState::Validating));
    }

    #[test]
    fn test_state_display() {
        assert_eq!(MediationState::Received.to_string(), "Received");
        assert_eq!(MediationState::DrivingOracle.to_string(), "Driving oracle");
    }
}
