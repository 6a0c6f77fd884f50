//! Cookie records
//!
//! Field-for-field mirror of the browser's cookie object, plus the
//! parameter shapes the cookie store expects for set and remove.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use cookieward_policy::{
    encode_component, registrable_domain, Admissible, PolicyError, WhitelistKind,
};

use crate::memory::DEFAULT_STORE_ID;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SameSite {
    NoRestriction,
    Lax,
    Strict,
    #[default]
    Unspecified,
}

fn default_path() -> String {
    "/".to_string()
}

fn default_store_id() -> String {
    DEFAULT_STORE_ID.to_string()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CookieRecord {
    /// Full cookie domain, leading dot included for domain cookies
    pub domain: String,
    pub name: String,
    pub value: String,
    #[serde(default = "default_path")]
    pub path: String,
    #[serde(default)]
    pub secure: bool,
    #[serde(default)]
    pub http_only: bool,
    #[serde(default)]
    pub host_only: bool,
    #[serde(default)]
    pub session: bool,
    /// Seconds since the epoch; absent for session cookies
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expiration_date: Option<f64>,
    #[serde(default = "default_store_id")]
    pub store_id: String,
    #[serde(default)]
    pub same_site: SameSite,
    /// Only present when the browser runs with first-party isolation
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub first_party_domain: Option<String>,
}

impl CookieRecord {
    /// A host-only session cookie in the default store.
    pub fn session_cookie(domain: &str, name: &str, value: &str) -> Self {
        Self {
            domain: domain.to_string(),
            name: name.to_string(),
            value: value.to_string(),
            path: default_path(),
            secure: false,
            http_only: false,
            host_only: !domain.starts_with('.'),
            session: true,
            expiration_date: None,
            store_id: default_store_id(),
            same_site: SameSite::Unspecified,
            first_party_domain: None,
        }
    }

    /// A persistent cookie expiring at `expiration_date` (epoch seconds).
    pub fn persistent_cookie(domain: &str, name: &str, value: &str, expiration_date: f64) -> Self {
        Self {
            session: false,
            expiration_date: Some(expiration_date),
            ..Self::session_cookie(domain, name, value)
        }
    }

    /// Domain without the leading dot
    pub fn host(&self) -> &str {
        self.domain.strip_prefix('.').unwrap_or(&self.domain)
    }

    /// URL the cookie store uses to address this cookie
    pub fn url(&self) -> String {
        let scheme = if self.secure { "https" } else { "http" };
        format!("{}://{}{}", scheme, self.host(), self.path)
    }

    /// Registrable domain owning this cookie
    pub fn owner_domain(&self) -> Result<String, PolicyError> {
        registrable_domain(&self.domain)
    }

    /// Ledger key: (encoded full domain, encoded name)
    pub fn quarantine_key(&self) -> (String, String) {
        (encode_component(&self.domain), encode_component(&self.name))
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        if self.session {
            return false;
        }
        match self.expiration_date {
            Some(expiry) => expiry < now.timestamp_millis() as f64 / 1000.0,
            None => false,
        }
    }

    /// Same slot in the cookie store: a write to one replaces the other
    pub fn same_identity(&self, other: &CookieRecord) -> bool {
        self.domain == other.domain
            && self.name == other.name
            && self.path == other.path
            && self.store_id == other.store_id
            && self.first_party_domain == other.first_party_domain
    }
}

impl Admissible for CookieRecord {
    fn whitelist_domain(&self) -> &str {
        &self.domain
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> WhitelistKind {
        WhitelistKind::Cookie
    }

    fn is_session_scoped(&self) -> bool {
        self.session
    }
}

/// Arguments for creating or overwriting a live cookie
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SetCookieParams {
    pub url: String,
    pub name: String,
    pub value: String,
    /// Omitted for host-only cookies
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub domain: Option<String>,
    pub path: String,
    pub secure: bool,
    pub http_only: bool,
    /// Omitted for session cookies
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expiration_date: Option<f64>,
    pub store_id: String,
    pub same_site: SameSite,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub first_party_domain: Option<String>,
}

impl SetCookieParams {
    pub fn from_record(cookie: &CookieRecord) -> Self {
        Self {
            url: cookie.url(),
            name: cookie.name.clone(),
            value: cookie.value.clone(),
            domain: if cookie.host_only {
                None
            } else {
                Some(cookie.domain.clone())
            },
            path: cookie.path.clone(),
            secure: cookie.secure,
            http_only: cookie.http_only,
            expiration_date: if cookie.session {
                None
            } else {
                cookie.expiration_date
            },
            store_id: cookie.store_id.clone(),
            same_site: cookie.same_site,
            first_party_domain: cookie.first_party_domain.clone(),
        }
    }
}

/// Arguments for deleting a live cookie
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoveCookieParams {
    pub url: String,
    pub name: String,
    pub store_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub first_party_domain: Option<String>,
}

impl RemoveCookieParams {
    pub fn for_record(cookie: &CookieRecord) -> Self {
        Self {
            url: cookie.url(),
            name: cookie.name.clone(),
            store_id: cookie.store_id.clone(),
            first_party_domain: cookie.first_party_domain.clone(),
        }
    }
}
