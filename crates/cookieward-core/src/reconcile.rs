//! Reconciliation bookkeeping
//!
//! ```text
//! Unresolved ──pass starts──▶ Resolving ──pass done──▶ Settled
//!     ▲                          │                        │
//!     └────────pass failed───────┘                        │
//!                                ▲────policy changed──────┘
//! ```

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

use cookieward_policy::Behaviour;
use cookieward_quarantine::RestoreOutcome;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReconcileState {
    /// No pass has completed under the current policy
    #[default]
    Unresolved,
    Resolving,
    Settled,
}

impl ReconcileState {
    pub fn can_transition_to(&self, target: ReconcileState) -> bool {
        matches!(
            (self, target),
            (ReconcileState::Unresolved, ReconcileState::Resolving)
                | (ReconcileState::Resolving, ReconcileState::Settled)
                | (ReconcileState::Resolving, ReconcileState::Unresolved)
                | (ReconcileState::Settled, ReconcileState::Resolving)
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ReconcileState::Unresolved => "unresolved",
            ReconcileState::Resolving => "resolving",
            ReconcileState::Settled => "settled",
        }
    }
}

impl std::fmt::Display for ReconcileState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// What one pass over a domain did
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReconcileReport {
    pub domain: String,
    pub behaviour: Behaviour,
    pub started_at: DateTime<Utc>,
    /// Live cookies moved into quarantine
    pub quarantined_cookies: usize,
    pub cookies: RestoreOutcome,
    /// Tabs whose storage was reconciled
    pub storage_tabs: usize,
    /// Tabs whose content script could not be reached
    pub storage_failures: usize,
    pub quarantined_entries: usize,
    pub restored_entries: usize,
}

impl ReconcileReport {
    pub fn new(domain: &str, behaviour: Behaviour) -> Self {
        Self {
            domain: domain.to_string(),
            behaviour,
            started_at: Utc::now(),
            quarantined_cookies: 0,
            cookies: RestoreOutcome::default(),
            storage_tabs: 0,
            storage_failures: 0,
            quarantined_entries: 0,
            restored_entries: 0,
        }
    }

    /// True when the pass moved nothing in either direction
    pub fn is_noop(&self) -> bool {
        self.quarantined_cookies == 0
            && self.cookies.restored == 0
            && self.cookies.expired == 0
            && self.quarantined_entries == 0
            && self.restored_entries == 0
    }
}

/// Current [`ReconcileState`] per domain
#[derive(Clone, Default)]
pub struct ReconcileStates {
    states: Arc<RwLock<HashMap<String, ReconcileState>>>,
}

impl ReconcileStates {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, domain: &str) -> ReconcileState {
        self.states.read().get(domain).copied().unwrap_or_default()
    }

    /// Returns false, leaving the state alone, for a transition the
    /// machine does not allow.
    pub fn advance(&self, domain: &str, target: ReconcileState) -> bool {
        let mut states = self.states.write();
        let current = states.get(domain).copied().unwrap_or_default();
        if !current.can_transition_to(target) {
            tracing::warn!(
                domain = %domain,
                from = %current,
                to = %target,
                "Invalid reconcile state transition"
            );
            return false;
        }
        states.insert(domain.to_string(), target);
        true
    }

    pub fn forget(&self, domain: &str) {
        self.states.write().remove(domain);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transitions() {
        assert!(ReconcileState::Unresolved.can_transition_to(ReconcileState::Resolving));
        assert!(ReconcileState::Resolving.can_transition_to(ReconcileState::Settled));
        assert!(ReconcileState::Settled.can_transition_to(ReconcileState::Resolving));
        assert!(!ReconcileState::Unresolved.can_transition_to(ReconcileState::Settled));
        assert!(!ReconcileState::Resolving.can_transition_to(ReconcileState::Resolving));
    }

    #[test]
    fn test_states_track_per_domain() {
        let states = ReconcileStates::new();
        assert_eq!(states.get("example.com"), ReconcileState::Unresolved);

        assert!(states.advance("example.com", ReconcileState::Resolving));
        assert!(!states.advance("example.com", ReconcileState::Resolving));
        assert!(states.advance("example.com", ReconcileState::Settled));
        assert_eq!(states.get("example.com"), ReconcileState::Settled);
        assert_eq!(states.get("other.org"), ReconcileState::Unresolved);

        states.forget("example.com");
        assert_eq!(states.get("example.com"), ReconcileState::Unresolved);
    }
}
