//! Browser-owned stores the engine reads and mutates
//!
//! Both stores are the browser's source of truth. Nothing here caches:
//! every read goes back to the store.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use cookieward_tabs::TabId;

use crate::cookie::{CookieRecord, RemoveCookieParams, SetCookieParams};
use crate::error::{CookieStoreError, DomStorageError};

/// Query for [`CookieStore::get_all`]. `None` fields match everything,
/// except `store_id` where `None` means the default store.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CookieFilter {
    /// Matches the domain itself and every subdomain
    pub domain: Option<String>,
    pub name: Option<String>,
    pub store_id: Option<String>,
    pub first_party_domain: Option<String>,
}

impl CookieFilter {
    pub fn for_domain(domain: &str) -> Self {
        Self {
            domain: Some(domain.to_string()),
            ..Self::default()
        }
    }

    pub fn in_store(mut self, store_id: &str) -> Self {
        self.store_id = Some(store_id.to_string());
        self
    }
}

/// A cookie store (container) and the tabs using it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CookieStoreInfo {
    pub id: String,
    pub tab_ids: Vec<TabId>,
}

/// The browser cookie jar.
#[async_trait]
pub trait CookieStore: Send + Sync {
    async fn get_all(&self, filter: &CookieFilter) -> Result<Vec<CookieRecord>, CookieStoreError>;

    /// Create or overwrite a cookie; returns it as stored.
    async fn set(&self, params: &SetCookieParams) -> Result<CookieRecord, CookieStoreError>;

    /// Idempotent: removing a missing cookie is not an error.
    async fn remove(&self, params: &RemoveCookieParams) -> Result<(), CookieStoreError>;

    async fn stores(&self) -> Result<Vec<CookieStoreInfo>, CookieStoreError>;
}

/// A page's `localStorage` (persistent) and `sessionStorage` areas, as
/// seen from the content script.
pub trait DomStorage: Send + Sync {
    fn entries(&self, persistent: bool) -> Vec<(String, String)>;

    fn get(&self, name: &str, persistent: bool) -> Option<String>;

    fn set(&self, name: &str, value: &str, persistent: bool) -> Result<(), DomStorageError>;

    fn remove(&self, name: &str, persistent: bool);
}
