//! Content agent

use parking_lot::Mutex;
use std::sync::Arc;
use url::Url;

use cookieward_policy::{is_allowed, registrable_domain, Behaviour, WhitelistKind};
use cookieward_quarantine::{DomStorage, StorageEntry, StorageQuarantine};

use crate::error::ContentError;
use crate::messages::{ContentRequest, ContentResponse};
use crate::oracle::PolicyOracle;
use crate::Result;

/// Storage admission for one tab.
///
/// The quarantine lock is only ever taken between awaits.
pub struct ContentAgent {
    hostname: String,
    domain: String,
    storage: Arc<dyn DomStorage>,
    quarantine: Mutex<StorageQuarantine>,
    oracle: Arc<dyn PolicyOracle>,
}

impl ContentAgent {
    pub fn new(
        page_url: &str,
        storage: Arc<dyn DomStorage>,
        oracle: Arc<dyn PolicyOracle>,
    ) -> Result<Self> {
        let url = Url::parse(page_url)?;
        let hostname = url
            .host_str()
            .ok_or_else(|| ContentError::NoHost(page_url.to_string()))?
            .to_string();
        let domain = registrable_domain(page_url)?;

        Ok(Self {
            hostname,
            domain,
            storage,
            quarantine: Mutex::new(StorageQuarantine::new()),
            oracle,
        })
    }

    pub fn hostname(&self) -> &str {
        &self.hostname
    }

    pub fn domain(&self) -> &str {
        &self.domain
    }

    pub fn unwanted(&self) -> Vec<StorageEntry> {
        self.quarantine.lock().entries().to_vec()
    }

    fn live_entries(&self) -> Vec<StorageEntry> {
        [true, false]
            .into_iter()
            .flat_map(|persistent| {
                self.storage
                    .entries(persistent)
                    .into_iter()
                    .map(move |(name, value)| (name, value, persistent))
            })
            .map(|(name, value, persistent)| {
                StorageEntry::new(&self.hostname, &name, &value, persistent)
            })
            .collect()
    }

    async fn whitelisted(&self, name: &str, behaviour: Behaviour) -> Result<bool> {
        if behaviour == Behaviour::AllowAll {
            return Ok(false);
        }
        self.oracle
            .is_whitelisted(&self.hostname, name, WhitelistKind::StorageItem)
            .await
    }

    async fn is_wanted(&self, entry: &StorageEntry, behaviour: Behaviour) -> Result<bool> {
        let whitelisted = self.whitelisted(&entry.name, behaviour).await?;
        Ok(is_allowed(entry, behaviour, whitelisted))
    }

    /// A page wrote to storage. Returns whether the write went through;
    /// a rejected write is quarantined instead and any stale live value
    /// under the same identity is removed.
    pub async fn on_storage_write(&self, name: &str, value: &str, persistent: bool) -> Result<bool> {
        let entry = StorageEntry::new(&self.hostname, name, value, persistent);
        let behaviour = self.oracle.behaviour(&self.domain).await?;

        if self.is_wanted(&entry, behaviour).await? {
            self.storage.set(name, value, persistent)?;
            self.quarantine.lock().remove_by_identity(name, persistent);
            return Ok(true);
        }

        self.storage.remove(name, persistent);
        self.quarantine.lock().record(entry);
        Ok(false)
    }

    /// Sweep live entries the behaviour rejects into quarantine, then put
    /// back quarantined entries it now admits. Returns
    /// `(quarantined, restored)`.
    pub async fn reconcile(&self, behaviour: Behaviour) -> Result<(usize, usize)> {
        let mut quarantined = 0;
        for entry in self.live_entries() {
            if self.is_wanted(&entry, behaviour).await? {
                continue;
            }
            self.storage.remove(&entry.name, entry.persistent);
            self.quarantine.lock().record(entry);
            quarantined += 1;
        }

        let mut restored = 0;
        for entry in self.unwanted() {
            if !self.is_wanted(&entry, behaviour).await? {
                continue;
            }
            let result = self.quarantine.lock().restore_by_identity(
                &entry.name,
                entry.persistent,
                self.storage.as_ref(),
            );
            match result {
                Ok(_) => restored += 1,
                Err(e) => {
                    tracing::warn!(
                        domain = %self.domain,
                        name = %entry.name,
                        error = %e,
                        "Failed to restore storage entry"
                    );
                }
            }
        }

        tracing::debug!(
            domain = %self.domain,
            behaviour = %behaviour,
            quarantined,
            restored,
            "Reconciled storage"
        );
        Ok((quarantined, restored))
    }

    async fn restore_matching(&self, name: &str) -> Result<Vec<StorageEntry>> {
        let behaviour = self.oracle.behaviour(&self.domain).await?;
        let whitelisted = self.whitelisted(name, behaviour).await?;

        let restored = self.quarantine.lock().restore_all_matching_name(
            name,
            self.storage.as_ref(),
            |entry| is_allowed(entry, behaviour, whitelisted),
        );
        Ok(restored)
    }

    fn add_entry(&self, entry: StorageEntry, previous: Option<StorageEntry>) -> Result<()> {
        let entry = StorageEntry {
            domain: self.hostname.clone(),
            ..entry
        };

        let replaced = previous
            .filter(|p| !p.same_identity(&entry.name, entry.persistent))
            .and_then(|p| {
                let value = self.storage.get(&p.name, p.persistent)?;
                self.storage.remove(&p.name, p.persistent);
                Some(StorageEntry { value, ..p })
            });

        if let Err(e) = self.storage.set(&entry.name, &entry.value, entry.persistent) {
            if let Some(original) = replaced {
                if let Err(restore_err) =
                    self.storage
                        .set(&original.name, &original.value, original.persistent)
                {
                    tracing::error!(
                        domain = %self.domain,
                        name = %original.name,
                        error = %restore_err,
                        "Failed to restore replaced storage entry"
                    );
                }
            }
            return Err(e.into());
        }

        self.quarantine
            .lock()
            .remove_by_identity(&entry.name, entry.persistent);
        Ok(())
    }

    pub async fn handle(&self, request: ContentRequest) -> Result<ContentResponse> {
        match request {
            ContentRequest::Ping => Ok(ContentResponse::Pong),
            ContentRequest::GetStorage => Ok(ContentResponse::Storage {
                entries: self.live_entries(),
            }),
            ContentRequest::AddEntry { entry, previous } => {
                self.add_entry(entry, previous)?;
                Ok(ContentResponse::Done)
            }
            ContentRequest::DeleteEntry { name, persistent } => {
                self.storage.remove(&name, persistent);
                Ok(ContentResponse::Done)
            }
            ContentRequest::GetUnwantedStorage => Ok(ContentResponse::Unwanted {
                entries: self.unwanted(),
            }),
            ContentRequest::RestoreUnwantedEntry { name, persistent } => {
                let entry = self.quarantine.lock().restore_by_identity(
                    &name,
                    persistent,
                    self.storage.as_ref(),
                )?;
                Ok(ContentResponse::Restored {
                    entries: vec![entry],
                })
            }
            ContentRequest::RestoreUnwantedEntries { name } => Ok(ContentResponse::Restored {
                entries: self.restore_matching(&name).await?,
            }),
            ContentRequest::DeleteUnwantedEntry { name, persistent } => {
                self.quarantine.lock().remove_by_identity(&name, persistent);
                Ok(ContentResponse::Done)
            }
            ContentRequest::ClearUnwantedStorage => {
                self.quarantine.lock().clear();
                Ok(ContentResponse::Done)
            }
            ContentRequest::Reconcile { behaviour } => {
                let (quarantined, restored) = self.reconcile(behaviour).await?;
                Ok(ContentResponse::Reconciled {
                    quarantined,
                    restored,
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use cookieward_quarantine::MemoryDomStorage;
    use std::collections::HashSet;

    #[derive(Default)]
    struct FixedOracle {
        behaviour: Mutex<Option<Behaviour>>,
        whitelist: Mutex<HashSet<String>>,
    }

    impl FixedOracle {
        fn with(behaviour: Behaviour) -> Arc<Self> {
            let oracle = Self::default();
            *oracle.behaviour.lock() = Some(behaviour);
            Arc::new(oracle)
        }

        fn set(&self, behaviour: Behaviour) {
            *self.behaviour.lock() = Some(behaviour);
        }
    }

    #[async_trait]
    impl PolicyOracle for FixedOracle {
        async fn behaviour(&self, _domain: &str) -> Result<Behaviour> {
            (*self.behaviour.lock()).ok_or_else(|| ContentError::Oracle("unset".to_string()))
        }

        async fn is_whitelisted(&self, _domain: &str, name: &str, _kind: WhitelistKind) -> Result<bool> {
            Ok(self.whitelist.lock().contains(name))
        }
    }

    fn agent(oracle: Arc<FixedOracle>) -> (ContentAgent, Arc<MemoryDomStorage>) {
        let storage = Arc::new(MemoryDomStorage::new());
        let agent = ContentAgent::new("https://app.example.com/login", storage.clone(), oracle).unwrap();
        (agent, storage)
    }

    #[test]
    fn test_agent_scopes() {
        let (agent, _) = agent(FixedOracle::with(Behaviour::Deny));
        assert_eq!(agent.hostname(), "app.example.com");
        assert_eq!(agent.domain(), "example.com");
    }

    #[tokio::test]
    async fn test_write_admission() {
        let oracle = FixedOracle::with(Behaviour::AllowSession);
        let (agent, storage) = agent(oracle);

        assert!(agent.on_storage_write("s", "1", false).await.unwrap());
        assert!(!agent.on_storage_write("p", "2", true).await.unwrap());

        assert_eq!(storage.get("s", false).as_deref(), Some("1"));
        assert_eq!(storage.get("p", true), None);
        assert_eq!(agent.unwanted().len(), 1);
    }

    #[tokio::test]
    async fn test_whitelisted_write_is_admitted() {
        let oracle = FixedOracle::with(Behaviour::Deny);
        oracle.whitelist.lock().insert("consent".to_string());
        let (agent, storage) = agent(oracle);

        assert!(agent.on_storage_write("consent", "yes", true).await.unwrap());
        assert_eq!(storage.get("consent", true).as_deref(), Some("yes"));
    }

    #[tokio::test]
    async fn test_name_collision_restores_only_wanted_class() {
        let oracle = FixedOracle::with(Behaviour::Deny);
        let (agent, storage) = agent(oracle.clone());

        agent.on_storage_write("token", "local", true).await.unwrap();
        agent.on_storage_write("token", "session", false).await.unwrap();
        assert_eq!(agent.unwanted().len(), 2);

        oracle.set(Behaviour::AllowSession);
        let response = agent
            .handle(ContentRequest::RestoreUnwantedEntries {
                name: "token".to_string(),
            })
            .await
            .unwrap();

        match response {
            ContentResponse::Restored { entries } => {
                assert_eq!(entries.len(), 1);
                assert!(!entries[0].persistent);
            }
            other => panic!("unexpected response: {:?}", other),
        }
        assert_eq!(storage.get("token", false).as_deref(), Some("session"));
        assert_eq!(storage.get("token", true), None);

        let unwanted = agent.unwanted();
        assert_eq!(unwanted.len(), 1);
        assert_eq!(unwanted[0].value, "local");
    }

    #[tokio::test]
    async fn test_reconcile_sweeps_both_ways_and_settles() {
        let oracle = FixedOracle::with(Behaviour::AllowAll);
        let (agent, storage) = agent(oracle);
        storage.set("p", "1", true).unwrap();
        storage.set("s", "2", false).unwrap();

        assert_eq!(agent.reconcile(Behaviour::Deny).await.unwrap(), (2, 0));
        assert!(storage.entries(true).is_empty());

        assert_eq!(agent.reconcile(Behaviour::AllowSession).await.unwrap(), (0, 1));
        assert_eq!(agent.reconcile(Behaviour::AllowSession).await.unwrap(), (0, 0));
        assert_eq!(storage.get("s", false).as_deref(), Some("2"));
        assert_eq!(agent.unwanted().len(), 1);
    }

    #[tokio::test]
    async fn test_add_entry_with_rollback() {
        let oracle = FixedOracle::with(Behaviour::AllowAll);
        let storage = Arc::new(MemoryDomStorage::with_quota(1));
        let agent = ContentAgent::new("https://example.com/", storage.clone(), oracle).unwrap();
        storage.set("old", "1", true).unwrap();

        // Renaming fits the quota: old is gone first
        agent
            .handle(ContentRequest::AddEntry {
                entry: StorageEntry::new("example.com", "new", "2", true),
                previous: Some(StorageEntry::new("example.com", "old", "1", true)),
            })
            .await
            .unwrap();
        assert_eq!(storage.get("new", true).as_deref(), Some("2"));
        assert_eq!(storage.get("old", true), None);

        // Moving a session entry into the full local area fails; the
        // session entry comes back
        storage.set("moved", "3", false).unwrap();
        let failed = agent
            .handle(ContentRequest::AddEntry {
                entry: StorageEntry::new("example.com", "moved", "3", true),
                previous: Some(StorageEntry::new("example.com", "moved", "3", false)),
            })
            .await;
        assert!(matches!(failed, Err(ContentError::DomStorage(_))));
        assert_eq!(storage.get("moved", false).as_deref(), Some("3"));
        assert_eq!(storage.get("new", true).as_deref(), Some("2"));
    }
}
