//! Cookieward Tab Tracking
//!
//! Mirrors the browser's open tabs so the engine knows which registrable
//! domains are currently open. A tab only contributes a domain while its
//! URL is http(s); extension pages and `about:` URLs are out of scope.

mod error;
mod registry;
mod state;
mod tab;

pub use error::TabError;
pub use registry::TabRegistry;
pub use state::TabState;
pub use tab::{Tab, TabId};

pub type Result<T> = std::result::Result<T, TabError>;
