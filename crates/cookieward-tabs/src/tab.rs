//! Tab data structure

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use cookieward_policy::{is_web_url, registrable_domain};

use crate::error::TabError;
use crate::state::TabState;
use crate::Result;

/// Browser-assigned tab id
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TabId(pub i64);

impl std::fmt::Display for TabId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tab {
    pub id: TabId,
    /// URL of the committed document
    pub url: String,
    /// Registrable domain of `url`; `None` for non-web pages
    pub domain: Option<String>,
    /// Target of an in-flight top-level navigation
    pub pending_url: Option<String>,
    pub pending_domain: Option<String>,
    /// Cookie store (container) the tab belongs to, when the browser reports it
    pub cookie_store_id: Option<String>,
    pub state: TabState,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

fn scope(url: &str) -> Result<Option<String>> {
    if is_web_url(url) {
        Ok(Some(registrable_domain(url)?))
    } else {
        Ok(None)
    }
}

impl Tab {
    pub fn new(id: TabId, url: String, cookie_store_id: Option<String>) -> Result<Self> {
        if url.is_empty() {
            return Err(TabError::InvalidUrl("URL cannot be empty".to_string()));
        }

        let now = Utc::now();
        let domain = scope(&url)?;

        Ok(Self {
            id,
            url,
            domain,
            pending_url: None,
            pending_domain: None,
            cookie_store_id,
            state: TabState::Loading,
            created_at: now,
            updated_at: now,
        })
    }

    /// Attempt to transition to a new state
    pub fn transition_to(&mut self, new_state: TabState) -> Result<()> {
        if !self.state.can_transition_to(new_state) {
            return Err(TabError::InvalidTransition {
                from: self.state.to_string(),
                to: new_state.to_string(),
            });
        }

        tracing::debug!(
            tab_id = %self.id,
            from = %self.state,
            to = %new_state,
            "Tab state transition"
        );

        self.state = new_state;
        self.updated_at = Utc::now();
        Ok(())
    }

    /// A top-level navigation started
    pub fn begin_navigation(&mut self, url: String) -> Result<()> {
        if url.is_empty() {
            return Err(TabError::InvalidUrl("URL cannot be empty".to_string()));
        }

        let pending_domain = scope(&url)?;
        self.transition_to(TabState::Navigating)?;
        self.pending_url = Some(url);
        self.pending_domain = pending_domain;
        Ok(())
    }

    /// A top-level navigation committed; `url` is now the document URL
    pub fn commit(&mut self, url: String) -> Result<()> {
        if url.is_empty() {
            return Err(TabError::InvalidUrl("URL cannot be empty".to_string()));
        }

        let domain = scope(&url)?;
        self.transition_to(TabState::Committed)?;
        self.url = url;
        self.domain = domain;
        self.pending_url = None;
        self.pending_domain = None;
        Ok(())
    }

    /// Every domain this tab keeps open: committed and pending
    pub fn open_domains(&self) -> impl Iterator<Item = &str> {
        self.domain
            .as_deref()
            .into_iter()
            .chain(self.pending_domain.as_deref())
    }

    pub fn is_on_domain(&self, domain: &str) -> bool {
        self.domain.as_deref() == Some(domain)
    }
}
