//! Quarantine error types

use thiserror::Error;

#[derive(Error, Debug)]
pub enum CookieStoreError {
    #[error("Cookie store rejected the operation: {0}")]
    Rejected(String),

    #[error("Cookie store unavailable: {0}")]
    Unavailable(String),
}

#[derive(Error, Debug)]
pub enum DomStorageError {
    #[error("Storage quota exceeded writing '{0}'")]
    QuotaExceeded(String),

    #[error("Storage access denied: {0}")]
    AccessDenied(String),
}

#[derive(Error, Debug)]
pub enum QuarantineError {
    #[error("Cookie store error: {0}")]
    CookieStore(#[from] CookieStoreError),

    #[error("DOM storage error: {0}")]
    DomStorage(#[from] DomStorageError),

    #[error("Policy error: {0}")]
    Policy(#[from] cookieward_policy::PolicyError),

    #[error("No quarantined item '{name}' for {domain}")]
    NotFound { domain: String, name: String },

    #[error("No quarantined storage entry '{name}' (persistent: {persistent})")]
    EntryNotFound { name: String, persistent: bool },

    #[error("Quarantined cookie '{name}' for {domain} has expired")]
    Expired { domain: String, name: String },
}
