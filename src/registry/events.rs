//! Registry Events
//!
//! Membership changes broadcast by the array registry after each reconcile.

use crate::domain::ports::ReadinessReason;
use serde::{Deserialize, Serialize};

/// Events emitted by the array registry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RegistryEvent {
    /// A new array joined the working set
    ArrayAdded { array: String, ready: bool },

    /// An array stayed in the working set, with its binding refreshed
    ArrayRetained { array: String },

    /// An array left the desired configuration and its session was released
    ArrayDropped { array: String },

    /// A readiness evaluation failed
    ArrayNotReady {
        array: String,
        reason: ReadinessReason,
    },

    /// An array could not be set up from its configuration
    ArrayExcluded { array: String, reason: String },
}

impl RegistryEvent {
    /// Array the event refers to
    pub fn array(&self) -> &str {
        match self {
            RegistryEvent::ArrayAdded { array, .. } => array,
            RegistryEvent::ArrayRetained { array } => array,
            RegistryEvent::ArrayDropped { array } => array,
            RegistryEvent::ArrayNotReady { array, .. } => array,
            RegistryEvent::ArrayExcluded { array, .. } => array,
        }
    }

    /// Check if the working set changed
    pub fn is_membership_change(&self) -> bool {
        matches!(
            self,
            RegistryEvent::ArrayAdded { .. } | RegistryEvent::ArrayDropped { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_array() {
        let event = RegistryEvent::ArrayNotReady {
            array: "fs-a".into(),
            reason: ReadinessReason::AuthFailure,
        };
        assert_eq!(event.array(), "fs-a");
        assert!(!event.is_membership_change());

        let event = RegistryEvent::ArrayDropped { array: "fs-b".into() };
        assert!(event.is_membership_change());
    }
}
