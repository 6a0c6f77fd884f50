//! Cookieward Content
//!
//! The per-tab half of the engine. One [`ContentAgent`] lives in each
//! page's content script: it sees every storage write the page makes,
//! keeps rejected entries in that tab's storage quarantine, and answers
//! the background's [`ContentRequest`]s.
//!
//! Policy questions go back to the background through a [`PolicyOracle`];
//! the agent itself holds no policy state.

mod agent;
mod error;
mod messages;
mod oracle;

pub use agent::ContentAgent;
pub use error::ContentError;
pub use messages::{ContentRequest, ContentResponse};
pub use oracle::PolicyOracle;

pub type Result<T> = std::result::Result<T, ContentError>;
