//! Runtime messages from the UI and content scripts

use serde::{Deserialize, Serialize};

use cookieward_policy::{Behaviour, Exception, RuleSource, WhitelistEntry, WhitelistKind};
use cookieward_quarantine::{CookieRecord, StorageEntry};
use cookieward_tabs::TabId;

use crate::guard::Guard;
use crate::reconcile::ReconcileReport;
use crate::settings::Settings;
use crate::Result;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum Request {
    GetBehaviour {
        domain: String,
    },
    SetTemporaryException {
        domain: String,
        behaviour: Behaviour,
    },
    ClearTemporaryException {
        domain: String,
    },
    ClearAllTemporaryExceptions,
    GetTemporaryExceptions,
    SetPermanentException {
        domain: String,
        behaviour: Behaviour,
        #[serde(default)]
        previous: Option<String>,
    },
    ClearPermanentException {
        domain: String,
    },
    GetPermanentExceptions,
    GetDefaultBehaviour,
    SetDefaultBehaviour {
        behaviour: Behaviour,
    },
    AddWhitelistEntry {
        entry: WhitelistEntry,
        #[serde(default)]
        previous: Option<WhitelistEntry>,
    },
    RemoveWhitelistEntry {
        entry: WhitelistEntry,
    },
    GetWhitelist,
    IsWhitelisted {
        domain: String,
        name: String,
        kind: WhitelistKind,
    },
    GetCookies {
        domain: String,
        #[serde(default)]
        store_id: Option<String>,
    },
    GetUnwantedCookies {
        domain: String,
    },
    RestoreUnwantedCookie {
        domain: String,
        cookie_domain: String,
        name: String,
    },
    DeleteUnwantedCookie {
        domain: String,
        cookie_domain: String,
        name: String,
    },
    ClearUnwantedCookies {
        domain: String,
    },
    SetCookie {
        cookie: CookieRecord,
        #[serde(default)]
        previous: Option<CookieRecord>,
    },
    DeleteCookie {
        cookie: CookieRecord,
    },
    GetStorage {
        tab_id: TabId,
    },
    GetUnwantedStorage {
        tab_id: TabId,
    },
    AddEntry {
        tab_id: TabId,
        entry: StorageEntry,
        #[serde(default)]
        previous: Option<StorageEntry>,
    },
    DeleteEntry {
        tab_id: TabId,
        name: String,
        persistent: bool,
    },
    RestoreUnwantedEntry {
        tab_id: TabId,
        name: String,
        persistent: bool,
    },
    RestoreUnwantedEntries {
        tab_id: TabId,
        name: String,
    },
    DeleteUnwantedEntry {
        tab_id: TabId,
        name: String,
        persistent: bool,
    },
    ClearUnwantedStorage {
        tab_id: TabId,
    },
    GetCookieCount {
        tab_id: TabId,
    },
    GetSettings,
    SetCookieCounter {
        enabled: bool,
    },
    ReloadSettings,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum Response {
    Behaviour {
        behaviour: Behaviour,
        source: RuleSource,
    },
    Exceptions {
        exceptions: Vec<Exception>,
    },
    Domain {
        domain: String,
    },
    Whitelist {
        entries: Vec<WhitelistEntry>,
    },
    Whitelisted {
        whitelisted: bool,
    },
    Cookies {
        cookies: Vec<CookieRecord>,
    },
    Cookie {
        cookie: CookieRecord,
    },
    Storage {
        entries: Vec<StorageEntry>,
    },
    CookieCount {
        count: Option<usize>,
    },
    Settings {
        settings: Settings,
    },
    Reconciled {
        reports: Vec<ReconcileReport>,
    },
    /// Whether the operation changed anything
    Changed {
        changed: bool,
    },
    Done,
    Error {
        message: String,
    },
}

impl Guard {
    /// Route a runtime message. Failures come back as
    /// [`Response::Error`] so editors can show them inline.
    pub async fn handle_request(&self, request: Request) -> Response {
        match self.route(request).await {
            Ok(response) => response,
            Err(e) => {
                tracing::warn!(error = %e, "Request failed");
                Response::Error {
                    message: e.to_string(),
                }
            }
        }
    }

    async fn route(&self, request: Request) -> Result<Response> {
        let response = match request {
            Request::GetBehaviour { domain } => {
                let resolved = self.behaviour(&domain)?;
                Response::Behaviour {
                    behaviour: resolved.behaviour,
                    source: resolved.source,
                }
            }
            Request::SetTemporaryException { domain, behaviour } => {
                let report = self.set_temporary_exception(&domain, behaviour).await?;
                Response::Reconciled {
                    reports: report.into_iter().collect(),
                }
            }
            Request::ClearTemporaryException { domain } => {
                let report = self.clear_temporary_exception(&domain).await?;
                Response::Reconciled {
                    reports: report.into_iter().collect(),
                }
            }
            Request::ClearAllTemporaryExceptions => Response::Reconciled {
                reports: self.clear_all_temporary_exceptions().await?,
            },
            Request::GetTemporaryExceptions => Response::Exceptions {
                exceptions: self.temporary_exceptions(),
            },
            Request::SetPermanentException {
                domain,
                behaviour,
                previous,
            } => Response::Domain {
                domain: self
                    .set_permanent_exception(&domain, behaviour, previous.as_deref())
                    .await?,
            },
            Request::ClearPermanentException { domain } => Response::Changed {
                changed: self.clear_permanent_exception(&domain).await?,
            },
            Request::GetPermanentExceptions => Response::Exceptions {
                exceptions: self.permanent_exceptions()?,
            },
            Request::GetDefaultBehaviour => Response::Behaviour {
                behaviour: self.default_behaviour()?,
                source: RuleSource::Default,
            },
            Request::SetDefaultBehaviour { behaviour } => Response::Reconciled {
                reports: self.set_default_behaviour(behaviour).await?,
            },
            Request::AddWhitelistEntry { entry, previous } => {
                self.add_whitelist_entry(&entry, previous.as_ref()).await?;
                Response::Done
            }
            Request::RemoveWhitelistEntry { entry } => Response::Changed {
                changed: self.remove_whitelist_entry(&entry).await?,
            },
            Request::GetWhitelist => Response::Whitelist {
                entries: self.whitelist_entries()?,
            },
            Request::IsWhitelisted { domain, name, kind } => Response::Whitelisted {
                whitelisted: self.is_whitelisted(&WhitelistEntry::new(&domain, &name, kind))?,
            },
            Request::GetCookies { domain, store_id } => Response::Cookies {
                cookies: self.cookies(&domain, store_id.as_deref()).await?,
            },
            Request::GetUnwantedCookies { domain } => Response::Cookies {
                cookies: self.unwanted_cookies(&domain),
            },
            Request::RestoreUnwantedCookie {
                domain,
                cookie_domain,
                name,
            } => Response::Cookie {
                cookie: self
                    .restore_unwanted_cookie(&domain, &cookie_domain, &name)
                    .await?,
            },
            Request::DeleteUnwantedCookie {
                domain,
                cookie_domain,
                name,
            } => Response::Changed {
                changed: self.delete_unwanted_cookie(&domain, &cookie_domain, &name),
            },
            Request::ClearUnwantedCookies { domain } => Response::Changed {
                changed: self.clear_unwanted_cookies(&domain) > 0,
            },
            Request::SetCookie { cookie, previous } => Response::Cookie {
                cookie: self.set_cookie(&cookie, previous.as_ref()).await?,
            },
            Request::DeleteCookie { cookie } => {
                self.delete_cookie(&cookie).await?;
                Response::Done
            }
            Request::GetStorage { tab_id } => Response::Storage {
                entries: self.storage(tab_id).await?,
            },
            Request::GetUnwantedStorage { tab_id } => Response::Storage {
                entries: self.unwanted_storage(tab_id).await?,
            },
            Request::AddEntry {
                tab_id,
                entry,
                previous,
            } => {
                self.add_entry(tab_id, entry, previous).await?;
                Response::Done
            }
            Request::DeleteEntry {
                tab_id,
                name,
                persistent,
            } => {
                self.delete_entry(tab_id, &name, persistent).await?;
                Response::Done
            }
            Request::RestoreUnwantedEntry {
                tab_id,
                name,
                persistent,
            } => Response::Storage {
                entries: self
                    .restore_unwanted_entry(tab_id, &name, persistent)
                    .await?,
            },
            Request::RestoreUnwantedEntries { tab_id, name } => Response::Storage {
                entries: self.restore_unwanted_entries(tab_id, &name).await?,
            },
            Request::DeleteUnwantedEntry {
                tab_id,
                name,
                persistent,
            } => {
                self.delete_unwanted_entry(tab_id, &name, persistent)
                    .await?;
                Response::Done
            }
            Request::ClearUnwantedStorage { tab_id } => {
                self.clear_unwanted_storage(tab_id).await?;
                Response::Done
            }
            Request::GetCookieCount { tab_id } => Response::CookieCount {
                count: self.cookie_count(tab_id).await?,
            },
            Request::GetSettings => Response::Settings {
                settings: self.settings()?,
            },
            Request::SetCookieCounter { enabled } => {
                self.set_cookie_counter(enabled)?;
                Response::Done
            }
            Request::ReloadSettings => Response::Reconciled {
                reports: self.reload_settings().await?,
            },
        };
        Ok(response)
    }
}
