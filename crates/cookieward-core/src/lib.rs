//! Cookieward Core
//!
//! Background service for the cookie and storage admission engine. The
//! [`Guard`] ties the policy, tab and quarantine crates together: it
//! reacts to browser events, answers runtime messages and re-applies
//! policy whenever anything that feeds it changes.

mod config;
mod content;
mod editor;
mod error;
mod events;
mod guard;
mod locks;
mod messages;
mod oracle;
mod reconcile;
mod settings;

#[cfg(test)]
mod tests;

pub use config::Config;
pub use content::{ContentScript, ContentScriptClient};
pub use error::CoreError;
pub use events::{BrowserEvent, CookieChangeCause};
pub use guard::{Guard, GuardSignal};
pub use locks::DomainLocks;
pub use messages::{Request, Response};
pub use oracle::PolicyView;
pub use reconcile::{ReconcileReport, ReconcileState, ReconcileStates};
pub use settings::{Settings, SettingsStore, COOKIE_COUNTER_KEY};

// Re-export the component crates
pub use cookieward_content::{ContentAgent, ContentError, ContentRequest, ContentResponse, PolicyOracle};
pub use cookieward_policy::{
    registrable_domain, Behaviour, Exception, PolicyError, PolicyStore, ResolvedBehaviour,
    RuleSource, WhitelistEntry, WhitelistKind, WhitelistStore,
};
pub use cookieward_quarantine::{
    CookieQuarantine, CookieRecord, CookieStore, CookieStoreError, DomStorage,
    MemoryCookieStore, MemoryDomStorage, StorageEntry,
};
pub use cookieward_storage::{Database, StorageError};
pub use cookieward_tabs::{Tab, TabError, TabId, TabRegistry, TabState};

pub type Result<T> = std::result::Result<T, CoreError>;

/// Initialize logging. `RUST_LOG` wins over `config.log_filter`.
pub fn init_logging(config: &Config) {
    use tracing_subscriber::{fmt, EnvFilter};

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.log_filter));

    fmt().with_env_filter(filter).with_target(true).init();
}
