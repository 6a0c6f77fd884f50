//! User settings in the sync area

use serde::{Deserialize, Serialize};
use serde_json::Value;

use cookieward_policy::Behaviour;
use cookieward_storage::{Database, StorageArea};

use crate::Result;

pub const COOKIE_COUNTER_KEY: &str = "enableCookieCounter";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Settings {
    pub default_behaviour: Behaviour,
    pub enable_cookie_counter: bool,
}

#[derive(Clone)]
pub struct SettingsStore {
    db: Database,
}

impl SettingsStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    pub fn cookie_counter_enabled(&self) -> Result<bool> {
        Ok(self
            .db
            .get_item(StorageArea::Sync, COOKIE_COUNTER_KEY)?
            .and_then(|value| value.as_bool())
            .unwrap_or(false))
    }

    pub fn set_cookie_counter(&self, enabled: bool) -> Result<()> {
        self.db
            .set_item(StorageArea::Sync, COOKIE_COUNTER_KEY, &Value::Bool(enabled))?;
        tracing::info!(enabled, "Set cookie counter");
        Ok(())
    }
}
