//! Content agent error types

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ContentError {
    #[error("Quarantine error: {0}")]
    Quarantine(#[from] cookieward_quarantine::QuarantineError),

    #[error("DOM storage error: {0}")]
    DomStorage(#[from] cookieward_quarantine::DomStorageError),

    #[error("Policy error: {0}")]
    Policy(#[from] cookieward_policy::PolicyError),

    #[error("Invalid page URL: {0}")]
    UrlParse(#[from] url::ParseError),

    #[error("Page has no host: {0}")]
    NoHost(String),

    #[error("Policy lookup failed: {0}")]
    Oracle(String),

    #[error("Content script unreachable: {0}")]
    Unreachable(String),

    #[error("Unexpected response to {request}: {response}")]
    UnexpectedResponse { request: String, response: String },
}
