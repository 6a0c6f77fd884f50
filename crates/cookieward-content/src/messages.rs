//! Background to content script messages

use serde::{Deserialize, Serialize};

use cookieward_policy::Behaviour;
use cookieward_quarantine::StorageEntry;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ContentRequest {
    /// Readiness probe
    Ping,
    GetStorage,
    /// Write an entry from the storage editor. When `previous` names a
    /// different entry it is deleted first and put back if the write fails.
    AddEntry {
        entry: StorageEntry,
        #[serde(default)]
        previous: Option<StorageEntry>,
    },
    DeleteEntry {
        name: String,
        persistent: bool,
    },
    GetUnwantedStorage,
    /// Restore one quarantined entry regardless of policy
    RestoreUnwantedEntry {
        name: String,
        persistent: bool,
    },
    /// Restore the entries named `name` that the current policy admits
    RestoreUnwantedEntries {
        name: String,
    },
    DeleteUnwantedEntry {
        name: String,
        persistent: bool,
    },
    ClearUnwantedStorage,
    /// Re-apply `behaviour` to live and quarantined storage
    Reconcile {
        behaviour: Behaviour,
    },
}

impl ContentRequest {
    pub fn kind(&self) -> &'static str {
        match self {
            ContentRequest::Ping => "ping",
            ContentRequest::GetStorage => "getStorage",
            ContentRequest::AddEntry { .. } => "addEntry",
            ContentRequest::DeleteEntry { .. } => "deleteEntry",
            ContentRequest::GetUnwantedStorage => "getUnwantedStorage",
            ContentRequest::RestoreUnwantedEntry { .. } => "restoreUnwantedEntry",
            ContentRequest::RestoreUnwantedEntries { .. } => "restoreUnwantedEntries",
            ContentRequest::DeleteUnwantedEntry { .. } => "deleteUnwantedEntry",
            ContentRequest::ClearUnwantedStorage => "clearUnwantedStorage",
            ContentRequest::Reconcile { .. } => "reconcile",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ContentResponse {
    Pong,
    /// Live entries, local area first
    Storage { entries: Vec<StorageEntry> },
    Unwanted { entries: Vec<StorageEntry> },
    Restored { entries: Vec<StorageEntry> },
    Done,
    Reconciled { quarantined: usize, restored: usize },
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_request_wire_shape() {
        let request: ContentRequest = serde_json::from_value(json!({
            "type": "restoreUnwantedEntries",
            "name": "token"
        }))
        .unwrap();
        assert_eq!(
            request,
            ContentRequest::RestoreUnwantedEntries {
                name: "token".to_string()
            }
        );

        let reconcile = serde_json::to_value(ContentRequest::Reconcile {
            behaviour: Behaviour::AllowSession,
        })
        .unwrap();
        assert_eq!(reconcile, json!({"type": "reconcile", "behaviour": 1}));
    }

    #[test]
    fn test_add_entry_previous_is_optional() {
        let request: ContentRequest = serde_json::from_value(json!({
            "type": "addEntry",
            "entry": {"name": "a", "value": "1", "persistent": true, "domain": "example.com"}
        }))
        .unwrap();
        assert!(matches!(request, ContentRequest::AddEntry { previous: None, .. }));
    }
}
