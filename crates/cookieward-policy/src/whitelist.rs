//! Per-item whitelist
//!
//! Stored as presence-only keys `wl|<domain>|<name>|<c|d>` in the local
//! area, domain and name percent-encoded. Domains are normalised by
//! stripping a leading dot on every write and every lookup, so a cookie
//! scoped to `.example.com` and an entry typed as `example.com` share a key.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use url::Host;

use cookieward_storage::{Database, StorageArea};

use crate::encoding::{decode_component, encode_component};
use crate::error::PolicyError;
use crate::Result;

pub const WHITELIST_PREFIX: &str = "wl|";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum WhitelistKind {
    Cookie,
    StorageItem,
}

impl WhitelistKind {
    pub fn key_char(&self) -> char {
        match self {
            WhitelistKind::Cookie => 'c',
            WhitelistKind::StorageItem => 'd',
        }
    }

    pub fn from_key_char(c: &str) -> Option<Self> {
        match c {
            "c" => Some(WhitelistKind::Cookie),
            "d" => Some(WhitelistKind::StorageItem),
            _ => None,
        }
    }
}

pub fn normalize_domain(domain: &str) -> &str {
    domain.strip_prefix('.').unwrap_or(domain)
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WhitelistEntry {
    pub domain: String,
    pub name: String,
    pub kind: WhitelistKind,
}

impl WhitelistEntry {
    pub fn new(domain: &str, name: &str, kind: WhitelistKind) -> Self {
        Self {
            domain: normalize_domain(domain).to_string(),
            name: name.to_string(),
            kind,
        }
    }

    pub fn storage_key(&self) -> String {
        format!(
            "{}{}|{}|{}",
            WHITELIST_PREFIX,
            encode_component(normalize_domain(&self.domain)),
            encode_component(&self.name),
            self.kind.key_char()
        )
    }

    pub fn from_storage_key(key: &str) -> Option<Self> {
        let rest = key.strip_prefix(WHITELIST_PREFIX)?;
        let mut parts = rest.split('|');
        let domain = decode_component(parts.next()?)?;
        let name = decode_component(parts.next()?)?;
        let kind = WhitelistKind::from_key_char(parts.next()?)?;
        if parts.next().is_some() {
            return None;
        }
        Some(Self { domain, name, kind })
    }

    fn validate(&self) -> Result<()> {
        let domain = normalize_domain(&self.domain);
        if domain.is_empty() || domain.contains(|c: char| matches!(c, '/' | '?' | '#' | '@')) {
            return Err(PolicyError::InvalidDomain {
                domain: self.domain.clone(),
                reason: "not a hostname".to_string(),
            });
        }
        Host::parse(domain).map_err(|e| PolicyError::InvalidDomain {
            domain: self.domain.clone(),
            reason: e.to_string(),
        })?;
        Ok(())
    }
}

pub struct WhitelistStore {
    db: Database,
}

impl WhitelistStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    pub fn is_whitelisted(&self, domain: &str, name: &str, kind: WhitelistKind) -> Result<bool> {
        let key = WhitelistEntry::new(domain, name, kind).storage_key();
        Ok(self.db.get_item(StorageArea::Local, &key)?.is_some())
    }

    pub fn contains(&self, entry: &WhitelistEntry) -> Result<bool> {
        self.is_whitelisted(&entry.domain, &entry.name, entry.kind)
    }

    pub fn add(&self, entry: &WhitelistEntry) -> Result<()> {
        entry.validate()?;
        self.db
            .set_item(StorageArea::Local, &entry.storage_key(), &Value::from(""))?;
        tracing::info!(
            domain = %entry.domain,
            name = %entry.name,
            kind = ?entry.kind,
            "Added whitelist entry"
        );
        Ok(())
    }

    /// Overwrite `previous` with `next`.
    ///
    /// The delete and the add share one transaction, so a rejected edit
    /// never loses the original.
    pub fn replace(&self, previous: &WhitelistEntry, next: &WhitelistEntry) -> Result<()> {
        if previous.storage_key() == next.storage_key() {
            return self.add(next);
        }

        next.validate()?;
        self.db.replace_item(
            StorageArea::Local,
            &previous.storage_key(),
            &next.storage_key(),
            &Value::from(""),
        )?;
        tracing::info!(
            from_domain = %previous.domain,
            from_name = %previous.name,
            domain = %next.domain,
            name = %next.name,
            kind = ?next.kind,
            "Replaced whitelist entry"
        );
        Ok(())
    }

    /// Idempotent; returns whether the entry existed.
    pub fn remove(&self, entry: &WhitelistEntry) -> Result<bool> {
        let removed = self
            .db
            .remove_item(StorageArea::Local, &entry.storage_key())?;
        if removed {
            tracing::info!(
                domain = %entry.domain,
                name = %entry.name,
                kind = ?entry.kind,
                "Removed whitelist entry"
            );
        }
        Ok(removed)
    }

    pub fn entries(&self) -> Result<Vec<WhitelistEntry>> {
        let items = self
            .db
            .items_with_prefix(StorageArea::Local, WHITELIST_PREFIX)?;

        Ok(items
            .into_iter()
            .filter_map(|(key, _)| {
                let entry = WhitelistEntry::from_storage_key(&key);
                if entry.is_none() {
                    tracing::warn!(key = %key, "Skipping malformed whitelist key");
                }
                entry
            })
            .collect())
    }
}

impl Clone for WhitelistStore {
    fn clone(&self) -> Self {
        Self {
            db: self.db.clone(),
        }
    }
}
