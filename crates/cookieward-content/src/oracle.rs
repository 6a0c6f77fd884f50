//! Policy lookups on behalf of a content script

use async_trait::async_trait;

use cookieward_policy::{Behaviour, WhitelistKind};

use crate::Result;

/// The background's answers to the two questions admission needs.
///
/// In the extension this is a runtime message round trip; the engine
/// provides an in-process implementation over its own stores.
#[async_trait]
pub trait PolicyOracle: Send + Sync {
    /// Behaviour currently in force for a registrable domain
    async fn behaviour(&self, domain: &str) -> Result<Behaviour>;

    async fn is_whitelisted(&self, domain: &str, name: &str, kind: WhitelistKind) -> Result<bool>;
}
