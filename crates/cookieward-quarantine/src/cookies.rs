//! Cookie quarantine ledger
//!
//! Registrable domain -> (encoded cookie domain, encoded name) -> cookie.
//! A bucket exists exactly while some tab has the domain open; the engine
//! opens and closes buckets as tabs come and go.

use chrono::Utc;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

use cookieward_policy::{admit, encode_component, Behaviour, WhitelistStore};

use crate::cookie::{CookieRecord, SetCookieParams};
use crate::error::QuarantineError;
use crate::store::CookieStore;
use crate::Result;

type Bucket = HashMap<(String, String), CookieRecord>;

fn entry_key(cookie_domain: &str, name: &str) -> (String, String) {
    (encode_component(cookie_domain), encode_component(name))
}

/// Result of putting a domain's quarantine back in line with its policy
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RestoreOutcome {
    pub restored: usize,
    /// Still unwanted under the current behaviour
    pub kept: usize,
    /// Wanted, but the cookie store refused to recreate them
    pub failed: usize,
    /// Expired while quarantined and dropped
    pub expired: usize,
}

pub struct CookieQuarantine {
    buckets: Arc<RwLock<HashMap<String, Bucket>>>,
}

impl CookieQuarantine {
    pub fn new() -> Self {
        Self {
            buckets: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    // === Bucket lifecycle ===

    /// Returns true if the bucket was newly created
    pub fn open_bucket(&self, domain: &str) -> bool {
        let mut buckets = self.buckets.write();
        if buckets.contains_key(domain) {
            return false;
        }
        buckets.insert(domain.to_string(), Bucket::new());
        tracing::debug!(domain = %domain, "Opened quarantine bucket");
        true
    }

    /// Drops the bucket and everything in it, returning how many cookies
    /// were discarded.
    pub fn close_bucket(&self, domain: &str) -> Option<usize> {
        let dropped = self.buckets.write().remove(domain).map(|b| b.len());
        if let Some(count) = dropped {
            tracing::debug!(domain = %domain, dropped = count, "Closed quarantine bucket");
        }
        dropped
    }

    pub fn has_bucket(&self, domain: &str) -> bool {
        self.buckets.read().contains_key(domain)
    }

    pub fn open_domains(&self) -> Vec<String> {
        let mut domains: Vec<String> = self.buckets.read().keys().cloned().collect();
        domains.sort();
        domains
    }

    // === Entries ===

    /// Quarantine a rejected cookie under its registrable domain.
    ///
    /// Returns false when no tab has that domain open; the cookie is then
    /// not tracked at all.
    pub fn record(&self, cookie: CookieRecord) -> Result<bool> {
        let owner = cookie.owner_domain()?;
        let mut buckets = self.buckets.write();

        match buckets.get_mut(&owner) {
            Some(bucket) => {
                tracing::info!(
                    domain = %owner,
                    cookie_domain = %cookie.domain,
                    name = %cookie.name,
                    "Quarantined cookie"
                );
                bucket.insert(cookie.quarantine_key(), cookie);
                Ok(true)
            }
            None => {
                tracing::debug!(
                    domain = %owner,
                    name = %cookie.name,
                    "No open tab for cookie domain, not quarantined"
                );
                Ok(false)
            }
        }
    }

    /// Quarantined cookies for a domain, ordered by cookie domain then name
    pub fn get(&self, domain: &str) -> Vec<CookieRecord> {
        let mut cookies: Vec<CookieRecord> = self
            .buckets
            .read()
            .get(domain)
            .map(|bucket| bucket.values().cloned().collect())
            .unwrap_or_default();
        cookies.sort_by(|a, b| (&a.domain, &a.name).cmp(&(&b.domain, &b.name)));
        cookies
    }

    pub fn entry(&self, domain: &str, cookie_domain: &str, name: &str) -> Option<CookieRecord> {
        self.buckets
            .read()
            .get(domain)
            .and_then(|bucket| bucket.get(&entry_key(cookie_domain, name)).cloned())
    }

    pub fn contains(&self, domain: &str, cookie_domain: &str, name: &str) -> bool {
        self.entry(domain, cookie_domain, name).is_some()
    }

    pub fn len(&self, domain: &str) -> usize {
        self.buckets.read().get(domain).map_or(0, |b| b.len())
    }

    /// Idempotent
    pub fn remove(&self, domain: &str, cookie_domain: &str, name: &str) -> Option<CookieRecord> {
        self.buckets
            .write()
            .get_mut(domain)
            .and_then(|bucket| bucket.remove(&entry_key(cookie_domain, name)))
    }

    /// Empty the bucket but keep it open
    pub fn clear_for_domain(&self, domain: &str) -> usize {
        let cleared = self
            .buckets
            .write()
            .get_mut(domain)
            .map(|bucket| {
                let count = bucket.len();
                bucket.clear();
                count
            })
            .unwrap_or(0);
        tracing::info!(domain = %domain, cleared, "Cleared quarantine");
        cleared
    }

    // === Restoration ===

    /// Put one quarantined cookie back into the live store.
    ///
    /// The entry leaves the ledger only after the store accepted it.
    pub async fn restore_one(
        &self,
        domain: &str,
        cookie_domain: &str,
        name: &str,
        store: &dyn CookieStore,
    ) -> Result<CookieRecord> {
        let cookie = self
            .entry(domain, cookie_domain, name)
            .ok_or_else(|| QuarantineError::NotFound {
                domain: domain.to_string(),
                name: name.to_string(),
            })?;

        if cookie.is_expired_at(Utc::now()) {
            self.remove(domain, cookie_domain, name);
            return Err(QuarantineError::Expired {
                domain: domain.to_string(),
                name: name.to_string(),
            });
        }

        store.set(&SetCookieParams::from_record(&cookie)).await?;
        self.remove(domain, cookie_domain, name);

        tracing::info!(
            domain = %domain,
            cookie_domain = %cookie_domain,
            name = %name,
            "Restored cookie"
        );

        Ok(cookie)
    }

    /// Restore every quarantined cookie the current behaviour now admits.
    ///
    /// A cookie the store refuses stays quarantined; the rest still proceed.
    pub async fn reconcile_domain(
        &self,
        domain: &str,
        behaviour: Behaviour,
        whitelist: &WhitelistStore,
        store: &dyn CookieStore,
    ) -> Result<RestoreOutcome> {
        let mut outcome = RestoreOutcome::default();
        let now = Utc::now();

        for cookie in self.get(domain) {
            if !admit(&cookie, behaviour, whitelist)? {
                outcome.kept += 1;
                continue;
            }

            if cookie.is_expired_at(now) {
                self.remove(domain, &cookie.domain, &cookie.name);
                outcome.expired += 1;
                continue;
            }

            match store.set(&SetCookieParams::from_record(&cookie)).await {
                Ok(_) => {
                    self.remove(domain, &cookie.domain, &cookie.name);
                    outcome.restored += 1;
                }
                Err(e) => {
                    tracing::warn!(
                        domain = %domain,
                        name = %cookie.name,
                        error = %e,
                        "Failed to restore wanted cookie, keeping it quarantined"
                    );
                    outcome.failed += 1;
                }
            }
        }

        if outcome.restored > 0 || outcome.expired > 0 {
            tracing::info!(
                domain = %domain,
                behaviour = %behaviour,
                restored = outcome.restored,
                expired = outcome.expired,
                "Restored quarantined cookies"
            );
        }

        Ok(outcome)
    }
}

impl Default for CookieQuarantine {
    fn default() -> Self {
        Self::new()
    }
}

impl Clone for CookieQuarantine {
    fn clone(&self) -> Self {
        Self {
            buckets: Arc::clone(&self.buckets),
        }
    }
}
