//! In-process stores
//!
//! Used by tests and headless runs where no browser is attached. They
//! follow the browser's matching rules closely enough for the engine not
//! to notice the difference.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::BTreeMap;
use url::Url;

use crate::cookie::{CookieRecord, RemoveCookieParams, SetCookieParams};
use crate::error::{CookieStoreError, DomStorageError};
use crate::store::{CookieFilter, CookieStore, CookieStoreInfo, DomStorage};

/// Id of the browser's default cookie store
pub const DEFAULT_STORE_ID: &str = "0";

fn domain_matches(cookie_domain: &str, wanted: &str) -> bool {
    let host = cookie_domain.strip_prefix('.').unwrap_or(cookie_domain);
    let wanted = wanted.strip_prefix('.').unwrap_or(wanted);
    host == wanted || host.ends_with(&format!(".{}", wanted))
}

pub struct MemoryCookieStore {
    cookies: Mutex<Vec<CookieRecord>>,
    stores: Mutex<Vec<CookieStoreInfo>>,
}

impl MemoryCookieStore {
    pub fn new() -> Self {
        Self::with_stores(vec![CookieStoreInfo {
            id: DEFAULT_STORE_ID.to_string(),
            tab_ids: Vec::new(),
        }])
    }

    pub fn with_stores(stores: Vec<CookieStoreInfo>) -> Self {
        Self {
            cookies: Mutex::new(Vec::new()),
            stores: Mutex::new(stores),
        }
    }

    /// Put a cookie straight into the jar, replacing any with the same
    /// identity. Bypasses [`CookieStore::set`] so tests can seed state.
    pub fn insert(&self, cookie: CookieRecord) {
        let mut cookies = self.cookies.lock();
        cookies.retain(|c| !c.same_identity(&cookie));
        cookies.push(cookie);
    }

    pub fn all(&self) -> Vec<CookieRecord> {
        self.cookies.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.cookies.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.cookies.lock().is_empty()
    }
}

impl Default for MemoryCookieStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CookieStore for MemoryCookieStore {
    async fn get_all(&self, filter: &CookieFilter) -> Result<Vec<CookieRecord>, CookieStoreError> {
        let store_id = filter.store_id.as_deref().unwrap_or(DEFAULT_STORE_ID);
        let cookies = self
            .cookies
            .lock()
            .iter()
            .filter(|c| c.store_id == store_id)
            .filter(|c| filter.domain.as_deref().map_or(true, |d| domain_matches(&c.domain, d)))
            .filter(|c| filter.name.as_deref().map_or(true, |n| c.name == n))
            .filter(|c| {
                filter.first_party_domain.is_none()
                    || c.first_party_domain == filter.first_party_domain
            })
            .cloned()
            .collect();
        Ok(cookies)
    }

    async fn set(&self, params: &SetCookieParams) -> Result<CookieRecord, CookieStoreError> {
        let url = Url::parse(&params.url)
            .map_err(|e| CookieStoreError::Rejected(format!("{}: {}", params.url, e)))?;
        let host = url
            .host_str()
            .ok_or_else(|| CookieStoreError::Rejected(format!("no host in {}", params.url)))?;

        if params.name.is_empty() && params.value.is_empty() {
            return Err(CookieStoreError::Rejected("empty cookie".to_string()));
        }

        let domain = match &params.domain {
            Some(d) if d.starts_with('.') => d.clone(),
            Some(d) => format!(".{}", d),
            None => host.to_string(),
        };
        if !domain_matches(host, &domain) {
            return Err(CookieStoreError::Rejected(format!(
                "domain {} does not cover {}",
                domain, host
            )));
        }

        let cookie = CookieRecord {
            domain,
            name: params.name.clone(),
            value: params.value.clone(),
            path: params.path.clone(),
            secure: params.secure,
            http_only: params.http_only,
            host_only: params.domain.is_none(),
            session: params.expiration_date.is_none(),
            expiration_date: params.expiration_date,
            store_id: params.store_id.clone(),
            same_site: params.same_site,
            first_party_domain: params.first_party_domain.clone(),
        };
        self.insert(cookie.clone());
        Ok(cookie)
    }

    async fn remove(&self, params: &RemoveCookieParams) -> Result<(), CookieStoreError> {
        let url = Url::parse(&params.url)
            .map_err(|e| CookieStoreError::Rejected(format!("{}: {}", params.url, e)))?;
        let host = url.host_str().unwrap_or_default();
        let path = url.path();

        self.cookies.lock().retain(|c| {
            !(c.name == params.name
                && c.store_id == params.store_id
                && c.host() == host
                && c.path == path
                && c.first_party_domain == params.first_party_domain)
        });
        Ok(())
    }

    async fn stores(&self) -> Result<Vec<CookieStoreInfo>, CookieStoreError> {
        Ok(self.stores.lock().clone())
    }
}

#[derive(Default)]
struct Areas {
    local: BTreeMap<String, String>,
    session: BTreeMap<String, String>,
}

impl Areas {
    fn area(&self, persistent: bool) -> &BTreeMap<String, String> {
        if persistent {
            &self.local
        } else {
            &self.session
        }
    }

    fn area_mut(&mut self, persistent: bool) -> &mut BTreeMap<String, String> {
        if persistent {
            &mut self.local
        } else {
            &mut self.session
        }
    }
}

/// A page's local and session storage
#[derive(Default)]
pub struct MemoryDomStorage {
    areas: Mutex<Areas>,
    max_entries: Option<usize>,
}

impl MemoryDomStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Writes that would grow an area past `max_entries` fail with
    /// [`DomStorageError::QuotaExceeded`].
    pub fn with_quota(max_entries: usize) -> Self {
        Self {
            areas: Mutex::new(Areas::default()),
            max_entries: Some(max_entries),
        }
    }
}

impl DomStorage for MemoryDomStorage {
    fn entries(&self, persistent: bool) -> Vec<(String, String)> {
        self.areas
            .lock()
            .area(persistent)
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    fn get(&self, name: &str, persistent: bool) -> Option<String> {
        self.areas.lock().area(persistent).get(name).cloned()
    }

    fn set(&self, name: &str, value: &str, persistent: bool) -> Result<(), DomStorageError> {
        let mut areas = self.areas.lock();
        let area = areas.area_mut(persistent);
        if let Some(max) = self.max_entries {
            if !area.contains_key(name) && area.len() >= max {
                return Err(DomStorageError::QuotaExceeded(name.to_string()));
            }
        }
        area.insert(name.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, name: &str, persistent: bool) {
        self.areas.lock().area_mut(persistent).remove(name);
    }
}
