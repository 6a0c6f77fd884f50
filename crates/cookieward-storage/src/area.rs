//! Storage areas

use serde::{Deserialize, Serialize};

/// The two persisted areas the extension writes to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageArea {
    /// Device-local area: permanent exceptions, whitelist entries
    Local,
    /// Synced area: default behaviour and feature flags
    Sync,
}

impl StorageArea {
    pub(crate) fn table(&self) -> &'static str {
        match self {
            StorageArea::Local => "local_items",
            StorageArea::Sync => "sync_items",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            StorageArea::Local => "local",
            StorageArea::Sync => "sync",
        }
    }
}

impl std::fmt::Display for StorageArea {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
