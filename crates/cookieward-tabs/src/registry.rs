//! Tab Registry
//!
//! In-memory view of the browser's open tabs, fed by tab and navigation
//! events. Nothing here is persisted: tab ids do not survive a restart.

use parking_lot::RwLock;
use std::collections::hash_map::Entry;
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use crate::error::TabError;
use crate::tab::{Tab, TabId};
use crate::Result;

pub struct TabRegistry {
    tabs: Arc<RwLock<HashMap<TabId, Tab>>>,
    active_tab_id: Arc<RwLock<Option<TabId>>>,
}

impl TabRegistry {
    pub fn new() -> Self {
        Self {
            tabs: Arc::new(RwLock::new(HashMap::new())),
            active_tab_id: Arc::new(RwLock::new(None)),
        }
    }

    /// Track a newly created tab
    pub fn open_tab(&self, id: TabId, url: String, cookie_store_id: Option<String>) -> Result<Tab> {
        let tab = Tab::new(id, url, cookie_store_id)?;
        self.tabs.write().insert(id, tab.clone());

        tracing::info!(tab_id = %id, url = %tab.url, "Tracking tab");

        Ok(tab)
    }

    pub fn get_tab(&self, id: TabId) -> Result<Tab> {
        self.tabs
            .read()
            .get(&id)
            .cloned()
            .ok_or(TabError::NotFound(id))
    }

    /// Top-level navigation started. Unknown tabs (opened before we were
    /// listening) are adopted.
    pub fn begin_navigation(&self, id: TabId, url: String) -> Result<Tab> {
        let mut tabs = self.tabs.write();
        let tab = match tabs.entry(id) {
            Entry::Occupied(entry) => entry.into_mut(),
            Entry::Vacant(entry) => {
                tracing::debug!(tab_id = %id, "Adopting untracked tab on navigation");
                entry.insert(Tab::new(id, url.clone(), None)?)
            }
        };
        tab.begin_navigation(url)?;
        Ok(tab.clone())
    }

    /// Top-level navigation committed
    pub fn commit_navigation(&self, id: TabId, url: String) -> Result<Tab> {
        let mut tabs = self.tabs.write();
        let tab = match tabs.entry(id) {
            Entry::Occupied(entry) => entry.into_mut(),
            Entry::Vacant(entry) => {
                tracing::debug!(tab_id = %id, "Adopting untracked tab on commit");
                entry.insert(Tab::new(id, url.clone(), None)?)
            }
        };
        tab.commit(url)?;
        Ok(tab.clone())
    }

    pub fn activate_tab(&self, id: TabId) -> Result<Tab> {
        let tab = self.get_tab(id)?;
        *self.active_tab_id.write() = Some(id);
        Ok(tab)
    }

    pub fn active_tab(&self) -> Option<Tab> {
        let id = (*self.active_tab_id.read())?;
        self.tabs.read().get(&id).cloned()
    }

    pub fn close_tab(&self, id: TabId) -> Result<Tab> {
        let tab = self.tabs.write().remove(&id).ok_or(TabError::NotFound(id))?;

        let mut active = self.active_tab_id.write();
        if *active == Some(id) {
            *active = None;
        }

        tracing::info!(tab_id = %id, "Stopped tracking tab");
        Ok(tab)
    }

    /// Registrable domains with at least one open tab, committed or pending
    pub fn open_domains(&self) -> BTreeSet<String> {
        self.tabs
            .read()
            .values()
            .flat_map(|tab| tab.open_domains().map(str::to_string).collect::<Vec<_>>())
            .collect()
    }

    pub fn is_domain_open(&self, domain: &str) -> bool {
        self.tabs
            .read()
            .values()
            .any(|tab| tab.open_domains().any(|d| d == domain))
    }

    /// Tabs whose committed document is on `domain`
    pub fn tabs_for_domain(&self, domain: &str) -> Vec<Tab> {
        let mut tabs: Vec<Tab> = self
            .tabs
            .read()
            .values()
            .filter(|tab| tab.is_on_domain(domain))
            .cloned()
            .collect();
        tabs.sort_by_key(|tab| tab.id);
        tabs
    }
}

impl Default for TabRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl Clone for TabRegistry {
    fn clone(&self) -> Self {
        Self {
            tabs: Arc::clone(&self.tabs),
            active_tab_id: Arc::clone(&self.active_tab_id),
        }
    }
}
