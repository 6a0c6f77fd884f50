//! Cookieward Policy
//!
//! Decides whether a cookie or storage entry is wanted on a domain.
//!
//! Resolution order for a domain's behaviour:
//! 1. Temporary exception (in memory, lives as long as the process)
//! 2. Permanent exception (`ex|<domain>` in the local area)
//! 3. Default behaviour (`defaultBehaviour` in the sync area)
//!
//! A whitelist entry `(domain, name, kind)` admits one item regardless of
//! the behaviour.

mod admission;
mod behaviour;
mod domain;
mod encoding;
mod error;
mod exceptions;
mod whitelist;

pub use admission::{admit, is_allowed, Admissible};
pub use behaviour::Behaviour;
pub use domain::{is_public_suffix, is_web_url, registrable_domain, validate_rule_domain};
pub use encoding::{decode_component, encode_component};
pub use error::PolicyError;
pub use exceptions::{
    Exception, PolicyStore, ResolvedBehaviour, RuleSource, DEFAULT_BEHAVIOUR_KEY,
    EXCEPTION_PREFIX, FALLBACK_DEFAULT_BEHAVIOUR,
};
pub use whitelist::{
    normalize_domain, WhitelistEntry, WhitelistKind, WhitelistStore, WHITELIST_PREFIX,
};

pub type Result<T> = std::result::Result<T, PolicyError>;
