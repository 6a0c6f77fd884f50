//! Policy error types

use thiserror::Error;

#[derive(Error, Debug)]
pub enum PolicyError {
    #[error("Invalid domain '{domain}': {reason}")]
    InvalidDomain { domain: String, reason: String },

    #[error("Invalid behaviour value: {0}")]
    InvalidBehaviour(i64),

    #[error("Stored behaviour is not an integer: {0}")]
    MalformedBehaviour(String),

    #[error("URL parse error: {0}")]
    UrlParse(#[from] url::ParseError),

    #[error("Storage error: {0}")]
    Storage(#[from] cookieward_storage::StorageError),
}

impl PolicyError {
    pub(crate) fn invalid_domain(domain: &str, reason: impl Into<String>) -> Self {
        PolicyError::InvalidDomain {
            domain: domain.to_string(),
            reason: reason.into(),
        }
    }
}
