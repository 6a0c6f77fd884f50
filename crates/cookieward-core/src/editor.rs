//! Cookie and storage editor operations
//!
//! Direct user edits. They write live state without consulting the policy;
//! the next cookie-changed event or reconciliation pass applies it.

use url::Url;

use cookieward_content::{ContentRequest, ContentResponse};
use cookieward_policy::{WhitelistEntry, WhitelistKind};
use cookieward_quarantine::{
    CookieFilter, CookieRecord, RemoveCookieParams, SetCookieParams, StorageEntry,
};
use cookieward_tabs::TabId;

use crate::content::unexpected;
use crate::guard::{Guard, GuardSignal};
use crate::Result;

impl Guard {
    // === Cookies ===

    /// Live cookies under `domain` in a store (default store when `None`)
    pub async fn cookies(&self, domain: &str, store_id: Option<&str>) -> Result<Vec<CookieRecord>> {
        let mut filter = CookieFilter::for_domain(domain);
        if let Some(store_id) = store_id {
            filter = filter.in_store(store_id);
        }
        let mut cookies = self.cookie_store.get_all(&filter).await?;
        cookies.sort_by(|a, b| (&a.domain, &a.name).cmp(&(&b.domain, &b.name)));
        Ok(cookies)
    }

    /// Create or edit a live cookie.
    ///
    /// When `previous` is a different cookie it is removed first and put
    /// back if the write fails.
    pub async fn set_cookie(
        &self,
        cookie: &CookieRecord,
        previous: Option<&CookieRecord>,
    ) -> Result<CookieRecord> {
        let replaced = previous.filter(|p| !p.same_identity(cookie));
        if let Some(previous) = replaced {
            self.cookie_store
                .remove(&RemoveCookieParams::for_record(previous))
                .await?;
        }

        let stored = match self
            .cookie_store
            .set(&SetCookieParams::from_record(cookie))
            .await
        {
            Ok(stored) => stored,
            Err(e) => {
                if let Some(previous) = replaced {
                    if let Err(restore_err) = self
                        .cookie_store
                        .set(&SetCookieParams::from_record(previous))
                        .await
                    {
                        tracing::error!(
                            cookie_domain = %previous.domain,
                            name = %previous.name,
                            error = %restore_err,
                            "Failed to restore edited cookie"
                        );
                    }
                }
                return Err(e.into());
            }
        };

        // Live now, so it cannot also sit in quarantine
        let owner = stored.owner_domain()?;
        self.quarantine.remove(&owner, &stored.domain, &stored.name);

        tracing::info!(cookie_domain = %stored.domain, name = %stored.name, "Saved cookie");
        Ok(stored)
    }

    pub async fn delete_cookie(&self, cookie: &CookieRecord) -> Result<()> {
        self.cookie_store
            .remove(&RemoveCookieParams::for_record(cookie))
            .await?;
        tracing::info!(cookie_domain = %cookie.domain, name = %cookie.name, "Deleted cookie");
        Ok(())
    }

    pub fn unwanted_cookies(&self, domain: &str) -> Vec<CookieRecord> {
        self.quarantine.get(domain)
    }

    /// Put a quarantined cookie back at the user's request. The cookie is
    /// whitelisted first so admission keeps it.
    pub async fn restore_unwanted_cookie(
        &self,
        domain: &str,
        cookie_domain: &str,
        name: &str,
    ) -> Result<CookieRecord> {
        let _guard = self.locks.lock(domain).await;

        let entry = WhitelistEntry::new(cookie_domain, name, WhitelistKind::Cookie);
        let added = !self.whitelist.contains(&entry)?;
        if added {
            self.whitelist.add(&entry)?;
        }

        match self
            .quarantine
            .restore_one(domain, cookie_domain, name, self.cookie_store.as_ref())
            .await
        {
            Ok(cookie) => {
                self.signal(GuardSignal::WhitelistChanged);
                Ok(cookie)
            }
            Err(e) => {
                if added {
                    self.whitelist.remove(&entry)?;
                }
                Err(e.into())
            }
        }
    }

    pub fn delete_unwanted_cookie(&self, domain: &str, cookie_domain: &str, name: &str) -> bool {
        self.quarantine.remove(domain, cookie_domain, name).is_some()
    }

    pub fn clear_unwanted_cookies(&self, domain: &str) -> usize {
        self.quarantine.clear_for_domain(domain)
    }

    /// Live cookie count for the tab's domain, `None` when the counter is
    /// switched off or the tab is not on a web page.
    pub async fn cookie_count(&self, tab_id: TabId) -> Result<Option<usize>> {
        if !self.settings.cookie_counter_enabled()? {
            return Ok(None);
        }

        let tab = self.tabs.get_tab(tab_id)?;
        let Some(domain) = tab.domain.as_deref() else {
            return Ok(None);
        };
        let store_id = self.store_for_tab(&tab).await?;
        let cookies = self
            .cookie_store
            .get_all(&CookieFilter::for_domain(domain).in_store(&store_id))
            .await?;
        Ok(Some(cookies.len()))
    }

    // === Storage ===

    async fn storage_entries(&self, tab_id: TabId, request: ContentRequest) -> Result<Vec<StorageEntry>> {
        let kind = request.kind();
        match self.content.request(tab_id, request).await? {
            ContentResponse::Storage { entries }
            | ContentResponse::Unwanted { entries }
            | ContentResponse::Restored { entries } => Ok(entries),
            other => Err(unexpected(kind, &other)),
        }
    }

    async fn storage_command(&self, tab_id: TabId, request: ContentRequest) -> Result<()> {
        let kind = request.kind();
        match self.content.request(tab_id, request).await? {
            ContentResponse::Done => Ok(()),
            other => Err(unexpected(kind, &other)),
        }
    }

    pub async fn storage(&self, tab_id: TabId) -> Result<Vec<StorageEntry>> {
        self.storage_entries(tab_id, ContentRequest::GetStorage).await
    }

    pub async fn unwanted_storage(&self, tab_id: TabId) -> Result<Vec<StorageEntry>> {
        self.storage_entries(tab_id, ContentRequest::GetUnwantedStorage)
            .await
    }

    pub async fn add_entry(
        &self,
        tab_id: TabId,
        entry: StorageEntry,
        previous: Option<StorageEntry>,
    ) -> Result<()> {
        self.storage_command(tab_id, ContentRequest::AddEntry { entry, previous })
            .await
    }

    pub async fn delete_entry(&self, tab_id: TabId, name: &str, persistent: bool) -> Result<()> {
        self.storage_command(
            tab_id,
            ContentRequest::DeleteEntry {
                name: name.to_string(),
                persistent,
            },
        )
        .await
    }

    /// Put a quarantined storage entry back, whitelisting it under the
    /// tab's hostname so the next pass keeps it.
    pub async fn restore_unwanted_entry(
        &self,
        tab_id: TabId,
        name: &str,
        persistent: bool,
    ) -> Result<Vec<StorageEntry>> {
        let tab = self.tabs.get_tab(tab_id)?;
        let url = Url::parse(&tab.url).map_err(cookieward_policy::PolicyError::from)?;
        let hostname = url.host_str().unwrap_or_default();

        let entry = WhitelistEntry::new(hostname, name, WhitelistKind::StorageItem);
        let added = !self.whitelist.contains(&entry)?;
        if added {
            self.whitelist.add(&entry)?;
        }

        let result = self
            .storage_entries(
                tab_id,
                ContentRequest::RestoreUnwantedEntry {
                    name: name.to_string(),
                    persistent,
                },
            )
            .await;
        if result.is_err() && added {
            self.whitelist.remove(&entry)?;
        }
        if result.is_ok() {
            self.signal(GuardSignal::WhitelistChanged);
        }
        result
    }

    /// Restore the quarantined entries named `name` that policy now admits
    pub async fn restore_unwanted_entries(&self, tab_id: TabId, name: &str) -> Result<Vec<StorageEntry>> {
        self.storage_entries(
            tab_id,
            ContentRequest::RestoreUnwantedEntries {
                name: name.to_string(),
            },
        )
        .await
    }

    pub async fn delete_unwanted_entry(&self, tab_id: TabId, name: &str, persistent: bool) -> Result<()> {
        self.storage_command(
            tab_id,
            ContentRequest::DeleteUnwantedEntry {
                name: name.to_string(),
                persistent,
            },
        )
        .await
    }

    pub async fn clear_unwanted_storage(&self, tab_id: TabId) -> Result<()> {
        self.storage_command(tab_id, ContentRequest::ClearUnwantedStorage)
            .await
    }
}
