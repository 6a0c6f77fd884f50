//! Storage quarantine ledger
//!
//! Per tab, since DOM storage is frame-local. A page can hold a
//! `localStorage` and a `sessionStorage` entry under the same name at the
//! same time, so identity is `(name, persistent)` and the ledger keeps at
//! most one entry per identity.

use serde::{Deserialize, Serialize};

use cookieward_policy::{Admissible, WhitelistKind};

use crate::error::QuarantineError;
use crate::store::DomStorage;
use crate::Result;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StorageEntry {
    pub name: String,
    pub value: String,
    /// `localStorage` when true, `sessionStorage` otherwise
    pub persistent: bool,
    /// Hostname of the page owning the entry
    pub domain: String,
}

impl StorageEntry {
    pub fn new(domain: &str, name: &str, value: &str, persistent: bool) -> Self {
        Self {
            name: name.to_string(),
            value: value.to_string(),
            persistent,
            domain: domain.to_string(),
        }
    }

    pub fn same_identity(&self, name: &str, persistent: bool) -> bool {
        self.name == name && self.persistent == persistent
    }

    fn write_to(&self, storage: &dyn DomStorage) -> Result<()> {
        storage.set(&self.name, &self.value, self.persistent)?;
        Ok(())
    }
}

impl Admissible for StorageEntry {
    fn whitelist_domain(&self) -> &str {
        &self.domain
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> WhitelistKind {
        WhitelistKind::StorageItem
    }

    fn is_session_scoped(&self) -> bool {
        !self.persistent
    }
}

#[derive(Debug, Clone, Default)]
pub struct StorageQuarantine {
    entries: Vec<StorageEntry>,
}

impl StorageQuarantine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Quarantine an entry, replacing any previous one with the same
    /// `(name, persistent)`.
    pub fn record(&mut self, entry: StorageEntry) {
        tracing::info!(
            domain = %entry.domain,
            name = %entry.name,
            persistent = entry.persistent,
            "Quarantined storage entry"
        );
        self.entries
            .retain(|e| !e.same_identity(&entry.name, entry.persistent));
        self.entries.push(entry);
    }

    pub fn get(&self, name: &str, persistent: bool) -> Option<&StorageEntry> {
        self.entries
            .iter()
            .find(|e| e.same_identity(name, persistent))
    }

    pub fn entries(&self) -> &[StorageEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Idempotent
    pub fn remove_by_identity(&mut self, name: &str, persistent: bool) -> Option<StorageEntry> {
        let index = self
            .entries
            .iter()
            .position(|e| e.same_identity(name, persistent))?;
        Some(self.entries.remove(index))
    }

    /// Write one entry back to the page. It stays quarantined if the write
    /// fails.
    pub fn restore_by_identity(
        &mut self,
        name: &str,
        persistent: bool,
        storage: &dyn DomStorage,
    ) -> Result<StorageEntry> {
        let entry = self
            .get(name, persistent)
            .cloned()
            .ok_or_else(|| QuarantineError::EntryNotFound {
                name: name.to_string(),
                persistent,
            })?;

        entry.write_to(storage)?;
        self.remove_by_identity(name, persistent);

        tracing::info!(
            domain = %entry.domain,
            name = %entry.name,
            persistent = entry.persistent,
            "Restored storage entry"
        );
        Ok(entry)
    }

    /// Restore every entry named `name` that `wanted` accepts. The local
    /// and session entries are handled independently: a failed write is
    /// logged, leaves that entry quarantined and does not stop the other.
    pub fn restore_all_matching_name<F>(
        &mut self,
        name: &str,
        storage: &dyn DomStorage,
        wanted: F,
    ) -> Vec<StorageEntry>
    where
        F: Fn(&StorageEntry) -> bool,
    {
        let candidates: Vec<StorageEntry> = self
            .entries
            .iter()
            .filter(|e| e.name == name && wanted(e))
            .cloned()
            .collect();

        let mut restored = Vec::with_capacity(candidates.len());
        for entry in candidates {
            match self.restore_by_identity(&entry.name, entry.persistent, storage) {
                Ok(entry) => restored.push(entry),
                Err(e) => {
                    tracing::warn!(
                        domain = %entry.domain,
                        name = %entry.name,
                        persistent = entry.persistent,
                        error = %e,
                        "Storage entry stays quarantined"
                    );
                }
            }
        }
        restored
    }

    pub fn clear(&mut self) -> usize {
        let count = self.entries.len();
        self.entries.clear();
        count
    }
}
