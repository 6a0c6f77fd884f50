//! Tab navigation state machine
//!
//! ```text
//! Loading ──commit──▶ Committed ──before navigate──▶ Navigating
//!    │                    ▲                              │
//!    └──before navigate───┼──────────────────────────────┘
//!                         └────────────commit────────────┘
//! ```

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TabState {
    /// Created, first document not committed yet
    Loading,
    /// Showing a committed document
    Committed,
    /// A top-level navigation has started but not committed
    Navigating,
}

impl TabState {
    pub fn can_transition_to(&self, target: TabState) -> bool {
        match (self, target) {
            (TabState::Loading, TabState::Committed) => true,
            (TabState::Loading, TabState::Navigating) => true,
            (TabState::Committed, TabState::Navigating) => true,
            (TabState::Navigating, TabState::Committed) => true,
            // Same-document and redirect cases
            (a, b) if *a == b => true,
            _ => false,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TabState::Loading => "loading",
            TabState::Committed => "committed",
            TabState::Navigating => "navigating",
        }
    }
}

impl std::fmt::Display for TabState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for TabState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "loading" => Ok(TabState::Loading),
            "committed" => Ok(TabState::Committed),
            "navigating" => Ok(TabState::Navigating),
            _ => Err(format!("Unknown tab state: {}", s)),
        }
    }
}
