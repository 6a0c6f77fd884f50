//! In-process policy oracle for content agents

use async_trait::async_trait;

use cookieward_content::PolicyOracle;
use cookieward_policy::{Behaviour, PolicyStore, WhitelistKind, WhitelistStore};

/// Answers content agents straight from the engine's stores. Holds clones
/// of the stores, which share state with the engine's own.
#[derive(Clone)]
pub struct PolicyView {
    policy: PolicyStore,
    whitelist: WhitelistStore,
}

impl PolicyView {
    pub fn new(policy: PolicyStore, whitelist: WhitelistStore) -> Self {
        Self { policy, whitelist }
    }
}

#[async_trait]
impl PolicyOracle for PolicyView {
    async fn behaviour(&self, domain: &str) -> cookieward_content::Result<Behaviour> {
        Ok(self.policy.behaviour(domain)?)
    }

    async fn is_whitelisted(
        &self,
        domain: &str,
        name: &str,
        kind: WhitelistKind,
    ) -> cookieward_content::Result<bool> {
        Ok(self.whitelist.is_whitelisted(domain, name, kind)?)
    }
}
