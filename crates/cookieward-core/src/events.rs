//! Browser event surface

use serde::{Deserialize, Serialize};

use cookieward_policy::admit;
use cookieward_quarantine::{CookieRecord, RemoveCookieParams};
use cookieward_tabs::{Tab, TabId};

use crate::guard::{Guard, GuardSignal};
use crate::Result;

/// Why a cookie changed, as the browser reports it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CookieChangeCause {
    Evicted,
    Expired,
    Explicit,
    ExpiredOverwrite,
    Overwrite,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum BrowserEvent {
    CookieChanged {
        removed: bool,
        cause: CookieChangeCause,
        cookie: CookieRecord,
    },
    BeforeNavigate {
        tab_id: TabId,
        frame_id: i64,
        url: String,
    },
    NavigationCommitted {
        tab_id: TabId,
        frame_id: i64,
        url: String,
    },
    TabCreated {
        tab_id: TabId,
        url: String,
        #[serde(default)]
        cookie_store_id: Option<String>,
    },
    TabActivated {
        tab_id: TabId,
    },
    TabRemoved {
        tab_id: TabId,
    },
}

const TOP_FRAME: i64 = 0;

impl Guard {
    /// Handle an event, logging rather than returning any failure
    pub async fn dispatch(&self, event: BrowserEvent) {
        if let Err(e) = self.handle_event(event).await {
            tracing::warn!(error = %e, "Event handler failed");
        }
    }

    pub async fn handle_event(&self, event: BrowserEvent) -> Result<()> {
        match event {
            BrowserEvent::CookieChanged {
                removed: true,
                cause,
                cookie,
            } => {
                // Includes our own corrective removals
                tracing::trace!(name = %cookie.name, cause = ?cause, "Ignoring cookie removal");
                Ok(())
            }
            BrowserEvent::CookieChanged { cookie, .. } => self.on_cookie_added(cookie).await,
            BrowserEvent::BeforeNavigate {
                tab_id,
                frame_id,
                url,
            } => {
                if frame_id != TOP_FRAME {
                    return Ok(());
                }
                let tab = self.tabs.begin_navigation(tab_id, url)?;
                self.open_buckets(&tab);
                Ok(())
            }
            BrowserEvent::NavigationCommitted {
                tab_id,
                frame_id,
                url,
            } => {
                if frame_id != TOP_FRAME {
                    return Ok(());
                }
                let tab = self.tabs.commit_navigation(tab_id, url)?;
                self.open_buckets(&tab);
                self.prune_buckets();
                self.reconcile_tab(&tab).await
            }
            BrowserEvent::TabCreated {
                tab_id,
                url,
                cookie_store_id,
            } => {
                let tab = self.tabs.open_tab(tab_id, url, cookie_store_id)?;
                self.open_buckets(&tab);
                self.reconcile_tab(&tab).await
            }
            BrowserEvent::TabActivated { tab_id } => {
                self.tabs.activate_tab(tab_id)?;
                self.signal(GuardSignal::ActiveTabChanged);
                Ok(())
            }
            BrowserEvent::TabRemoved { tab_id } => {
                self.tabs.close_tab(tab_id)?;
                self.prune_buckets();
                Ok(())
            }
        }
    }

    fn open_buckets(&self, tab: &Tab) {
        for domain in tab.open_domains() {
            self.quarantine.open_bucket(domain);
        }
    }

    async fn reconcile_tab(&self, tab: &Tab) -> Result<()> {
        if let Some(domain) = &tab.domain {
            self.reconcile_domain(domain).await?;
        }
        Ok(())
    }

    /// The browser already stored the cookie; take it back out if the
    /// policy rejects it.
    async fn on_cookie_added(&self, cookie: CookieRecord) -> Result<()> {
        let domain = cookie.owner_domain()?;
        let _guard = self.locks.lock(&domain).await;

        let behaviour = self.policy.behaviour(&domain)?;
        if admit(&cookie, behaviour, &self.whitelist)? {
            return Ok(());
        }

        self.cookie_store
            .remove(&RemoveCookieParams::for_record(&cookie))
            .await?;
        let name = cookie.name.clone();
        if self.quarantine.record(cookie)? {
            self.signal(GuardSignal::CookieQuarantined { domain, name });
        }
        Ok(())
    }
}
