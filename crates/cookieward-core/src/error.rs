//! Core error types

use thiserror::Error;

use cookieward_tabs::TabId;

#[derive(Error, Debug)]
pub enum CoreError {
    #[error("Storage error: {0}")]
    Storage(#[from] cookieward_storage::StorageError),

    #[error("Policy error: {0}")]
    Policy(#[from] cookieward_policy::PolicyError),

    #[error("Tab error: {0}")]
    Tab(#[from] cookieward_tabs::TabError),

    #[error("Quarantine error: {0}")]
    Quarantine(#[from] cookieward_quarantine::QuarantineError),

    #[error("Cookie store error: {0}")]
    CookieStore(#[from] cookieward_quarantine::CookieStoreError),

    #[error("Content script error: {0}")]
    Content(#[from] cookieward_content::ContentError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Content script in tab {tab_id} unreachable after {attempts} attempts")]
    ContentScriptUnavailable { tab_id: TabId, attempts: u32 },

    #[error("Could not determine the cookie store for tab {0}")]
    CookieStoreLookup(TabId),

    #[error("Configuration error: {0}")]
    Config(String),
}
