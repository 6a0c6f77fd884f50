//! Engine scenarios over in-memory collaborators

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::json;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use cookieward_content::{ContentAgent, ContentError, ContentRequest, ContentResponse};
use cookieward_policy::{Behaviour, RuleSource, WhitelistEntry, WhitelistKind};
use cookieward_quarantine::{
    CookieRecord, CookieStoreInfo, DomStorage, MemoryCookieStore, MemoryDomStorage,
    DEFAULT_STORE_ID,
};
use cookieward_storage::{Database, StorageArea};
use cookieward_tabs::TabId;

use crate::content::ContentScript;
use crate::error::CoreError;
use crate::events::{BrowserEvent, CookieChangeCause};
use crate::guard::{Guard, GuardSignal};
use crate::messages::{Request, Response};
use crate::reconcile::ReconcileState;
use crate::Config;

const FAR_FUTURE: f64 = 4_000_000_000.0;

/// Routes requests straight to in-process agents
#[derive(Default)]
struct Loopback {
    agents: Mutex<HashMap<TabId, Arc<ContentAgent>>>,
}

#[async_trait]
impl ContentScript for Loopback {
    async fn send(
        &self,
        tab_id: TabId,
        request: ContentRequest,
    ) -> std::result::Result<ContentResponse, ContentError> {
        let agent = self
            .agents
            .lock()
            .get(&tab_id)
            .cloned()
            .ok_or_else(|| ContentError::Unreachable(format!("no content script in tab {}", tab_id)))?;
        agent.handle(request).await
    }
}

struct Harness {
    guard: Guard,
    db: Database,
    cookies: Arc<MemoryCookieStore>,
    script: Arc<Loopback>,
}

impl Harness {
    fn new() -> Self {
        Self::with_cookie_store(MemoryCookieStore::new())
    }

    fn with_cookie_store(store: MemoryCookieStore) -> Self {
        let cookies = Arc::new(store);
        let script = Arc::new(Loopback::default());
        let mut config = Config::new(PathBuf::from("unused"));
        config.content_script_attempts = 2;
        config.content_script_retry_delay_ms = 1;

        let db = Database::open_in_memory().unwrap();
        let guard =
            Guard::with_database(config, db.clone(), cookies.clone(), script.clone()).unwrap();

        Self {
            guard,
            db,
            cookies,
            script,
        }
    }

    async fn open_tab(&self, id: i64, url: &str) {
        self.guard
            .handle_event(BrowserEvent::TabCreated {
                tab_id: TabId(id),
                url: url.to_string(),
                cookie_store_id: Some(DEFAULT_STORE_ID.to_string()),
            })
            .await
            .unwrap();
    }

    fn attach_agent(&self, id: i64, url: &str) -> (Arc<ContentAgent>, Arc<MemoryDomStorage>) {
        let storage = Arc::new(MemoryDomStorage::new());
        let agent = Arc::new(
            ContentAgent::new(url, storage.clone(), Arc::new(self.guard.policy_view())).unwrap(),
        );
        self.script.agents.lock().insert(TabId(id), agent.clone());
        (agent, storage)
    }

    /// The browser stored `cookie` and tells us about it
    async fn browser_sets(&self, cookie: CookieRecord) {
        self.cookies.insert(cookie.clone());
        self.guard
            .handle_event(BrowserEvent::CookieChanged {
                removed: false,
                cause: CookieChangeCause::Explicit,
                cookie,
            })
            .await
            .unwrap();
    }

    async fn request(&self, request: Request) -> Response {
        self.guard.handle_request(request).await
    }
}

async fn behaviour_of(harness: &Harness, domain: &str) -> (Behaviour, RuleSource) {
    match harness
        .request(Request::GetBehaviour {
            domain: domain.to_string(),
        })
        .await
    {
        Response::Behaviour { behaviour, source } => (behaviour, source),
        other => panic!("unexpected response: {:?}", other),
    }
}

#[tokio::test]
async fn test_resolution_precedence() {
    let h = Harness::new();
    h.request(Request::SetDefaultBehaviour {
        behaviour: Behaviour::Deny,
    })
    .await;
    h.request(Request::SetPermanentException {
        domain: "example.com".to_string(),
        behaviour: Behaviour::AllowAll,
        previous: None,
    })
    .await;
    h.request(Request::SetTemporaryException {
        domain: "example.com".to_string(),
        behaviour: Behaviour::AllowSession,
    })
    .await;

    assert_eq!(
        behaviour_of(&h, "example.com").await,
        (Behaviour::AllowSession, RuleSource::Temporary)
    );

    h.request(Request::ClearTemporaryException {
        domain: "example.com".to_string(),
    })
    .await;
    assert_eq!(
        behaviour_of(&h, "example.com").await,
        (Behaviour::AllowAll, RuleSource::Permanent)
    );

    h.request(Request::ClearPermanentException {
        domain: "example.com".to_string(),
    })
    .await;
    assert_eq!(
        behaviour_of(&h, "example.com").await,
        (Behaviour::Deny, RuleSource::Default)
    );
}

#[tokio::test]
async fn test_permanent_exception_supersedes_temporary() {
    let h = Harness::new();
    h.guard
        .set_temporary_exception("example.com", Behaviour::Deny)
        .await
        .unwrap();
    h.guard
        .set_permanent_exception("example.com", Behaviour::AllowAll, None)
        .await
        .unwrap();

    assert!(h.guard.temporary_exceptions().is_empty());
    assert_eq!(
        behaviour_of(&h, "example.com").await,
        (Behaviour::AllowAll, RuleSource::Permanent)
    );
}

#[tokio::test]
async fn test_invalid_permanent_exception_is_reported() {
    let h = Harness::new();
    let response = h
        .request(Request::SetPermanentException {
            domain: "www.example.com".to_string(),
            behaviour: Behaviour::AllowAll,
            previous: None,
        })
        .await;

    assert!(matches!(response, Response::Error { .. }));
    assert!(h.guard.permanent_exceptions().unwrap().is_empty());
}

#[tokio::test]
async fn test_behaviour_change_restores_quarantine() {
    let h = Harness::new();
    h.guard.set_default_behaviour(Behaviour::Deny).await.unwrap();
    h.open_tab(1, "https://shop.example/").await;

    let cookie = CookieRecord::persistent_cookie("shop.example", "sid", "abc", FAR_FUTURE);
    h.browser_sets(cookie).await;

    assert!(h.cookies.is_empty());
    assert_eq!(h.guard.unwanted_cookies("shop.example").len(), 1);

    h.guard
        .set_permanent_exception("shop.example", Behaviour::AllowAll, None)
        .await
        .unwrap();

    let live = h.cookies.all();
    assert_eq!(live.len(), 1);
    assert_eq!(live[0].name, "sid");
    assert_eq!(live[0].value, "abc");
    assert!(h.guard.unwanted_cookies("shop.example").is_empty());
    assert_eq!(h.guard.reconcile_state("shop.example"), ReconcileState::Settled);
}

#[tokio::test]
async fn test_reconcile_is_idempotent() {
    let h = Harness::new();
    h.guard.set_default_behaviour(Behaviour::AllowAll).await.unwrap();
    h.open_tab(1, "https://www.example.com/").await;
    h.cookies
        .insert(CookieRecord::session_cookie("www.example.com", "s", "1"));
    h.cookies.insert(CookieRecord::persistent_cookie(
        ".example.com",
        "p",
        "2",
        FAR_FUTURE,
    ));

    h.policy_change_to_allow_session().await;

    let first = h.guard.reconcile_domain("example.com").await.unwrap();
    assert!(first.is_noop());
    let second = h.guard.reconcile_domain("example.com").await.unwrap();
    assert!(second.is_noop());

    assert_eq!(h.cookies.len(), 1);
    assert_eq!(h.guard.unwanted_cookies("example.com").len(), 1);
}

impl Harness {
    async fn policy_change_to_allow_session(&self) {
        let report = self
            .guard
            .set_temporary_exception("example.com", Behaviour::AllowSession)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(report.quarantined_cookies, 1);
    }
}

#[tokio::test]
async fn test_temporary_exception_for_hostname_covers_domain() {
    let h = Harness::new();
    h.guard.set_default_behaviour(Behaviour::Deny).await.unwrap();
    h.open_tab(1, "https://www.example.com/").await;
    h.browser_sets(CookieRecord::persistent_cookie(".example.com", "p", "1", FAR_FUTURE))
        .await;
    assert_eq!(h.guard.unwanted_cookies("example.com").len(), 1);

    let report = h
        .guard
        .set_temporary_exception("www.example.com", Behaviour::AllowAll)
        .await
        .unwrap()
        .unwrap();

    assert_eq!(report.domain, "example.com");
    assert_eq!(report.behaviour, Behaviour::AllowAll);
    assert_eq!(report.cookies.restored, 1);
    assert_eq!(
        behaviour_of(&h, "example.com").await,
        (Behaviour::AllowAll, RuleSource::Temporary)
    );
    assert_eq!(h.guard.temporary_exceptions()[0].domain, "example.com");
    assert_eq!(h.cookies.len(), 1);
    assert!(h.guard.unwanted_cookies("example.com").is_empty());
}

#[tokio::test]
async fn test_clear_all_temporary_exceptions_isolates_domains() {
    let h = Harness::new();
    h.guard.set_default_behaviour(Behaviour::Deny).await.unwrap();
    h.open_tab(1, "https://a.com/").await;
    h.open_tab(2, "https://b.com/").await;
    for domain in ["a.com", "b.com"] {
        h.guard
            .set_temporary_exception(domain, Behaviour::AllowAll)
            .await
            .unwrap();
        h.browser_sets(CookieRecord::persistent_cookie(domain, "p", "1", FAR_FUTURE))
            .await;
    }
    assert_eq!(h.cookies.len(), 2);

    // a.com can no longer resolve its behaviour
    h.db.set_item(StorageArea::Local, "ex|a.com", &json!(9))
        .unwrap();

    let reports = h.guard.clear_all_temporary_exceptions().await.unwrap();

    assert_eq!(reports.len(), 1);
    assert_eq!(reports[0].domain, "b.com");
    assert_eq!(reports[0].quarantined_cookies, 1);
    assert_eq!(h.guard.unwanted_cookies("b.com").len(), 1);
    assert!(h.cookies.all().iter().all(|c| c.domain != "b.com"));
    assert_eq!(h.guard.reconcile_state("a.com"), ReconcileState::Unresolved);
}

#[tokio::test]
async fn test_whitelist_admits_under_deny() {
    let h = Harness::new();
    h.guard.set_default_behaviour(Behaviour::Deny).await.unwrap();
    h.open_tab(1, "https://example.com/").await;

    h.browser_sets(CookieRecord::persistent_cookie("example.com", "keep", "1", FAR_FUTURE))
        .await;
    h.browser_sets(CookieRecord::session_cookie("example.com", "drop", "2"))
        .await;
    assert!(h.cookies.is_empty());

    h.guard
        .add_whitelist_entry(
            &WhitelistEntry::new(".example.com", "keep", WhitelistKind::Cookie),
            None,
        )
        .await
        .unwrap();

    let live = h.cookies.all();
    assert_eq!(live.len(), 1);
    assert_eq!(live[0].name, "keep");

    // Looked up without the dot, same entry
    assert!(h
        .guard
        .is_whitelisted(&WhitelistEntry::new("example.com", "keep", WhitelistKind::Cookie))
        .unwrap());
}

#[tokio::test]
async fn test_removal_events_are_ignored() {
    let h = Harness::new();
    h.guard.set_default_behaviour(Behaviour::Deny).await.unwrap();
    h.open_tab(1, "https://example.com/").await;

    h.guard
        .handle_event(BrowserEvent::CookieChanged {
            removed: true,
            cause: CookieChangeCause::Explicit,
            cookie: CookieRecord::session_cookie("example.com", "sid", "1"),
        })
        .await
        .unwrap();

    assert!(h.guard.unwanted_cookies("example.com").is_empty());
}

#[tokio::test]
async fn test_third_party_cookie_without_tab_is_dropped() {
    let h = Harness::new();
    h.guard.set_default_behaviour(Behaviour::Deny).await.unwrap();
    h.open_tab(1, "https://example.com/").await;

    h.browser_sets(CookieRecord::persistent_cookie(".tracker.net", "uid", "42", FAR_FUTURE))
        .await;

    assert!(h.cookies.is_empty());
    assert!(h.guard.unwanted_cookies("tracker.net").is_empty());
    assert!(!h.guard.quarantine().has_bucket("tracker.net"));
}

#[tokio::test]
async fn test_navigation_moves_buckets() {
    let h = Harness::new();
    h.guard.set_default_behaviour(Behaviour::Deny).await.unwrap();
    h.open_tab(1, "https://example.com/").await;
    h.browser_sets(CookieRecord::session_cookie("example.com", "sid", "1"))
        .await;

    h.guard
        .handle_event(BrowserEvent::BeforeNavigate {
            tab_id: TabId(1),
            frame_id: 0,
            url: "https://other.org/".to_string(),
        })
        .await
        .unwrap();
    // Both ends of the navigation stay open until it commits
    assert!(h.guard.quarantine().has_bucket("example.com"));
    assert!(h.guard.quarantine().has_bucket("other.org"));

    // Subframe navigations do not count
    h.guard
        .handle_event(BrowserEvent::NavigationCommitted {
            tab_id: TabId(1),
            frame_id: 3,
            url: "https://ads.example.net/".to_string(),
        })
        .await
        .unwrap();
    assert!(!h.guard.quarantine().has_bucket("example.net"));

    h.guard
        .handle_event(BrowserEvent::NavigationCommitted {
            tab_id: TabId(1),
            frame_id: 0,
            url: "https://other.org/".to_string(),
        })
        .await
        .unwrap();
    assert!(!h.guard.quarantine().has_bucket("example.com"));
    assert!(h.guard.quarantine().has_bucket("other.org"));

    h.guard
        .handle_event(BrowserEvent::TabRemoved { tab_id: TabId(1) })
        .await
        .unwrap();
    assert!(h.guard.quarantine().open_domains().is_empty());
}

#[tokio::test]
async fn test_storage_unavailable_does_not_block_cookies() {
    let h = Harness::new();
    h.open_tab(1, "https://example.com/").await;
    h.cookies.insert(CookieRecord::persistent_cookie(
        "example.com",
        "p",
        "1",
        FAR_FUTURE,
    ));

    let report = h
        .guard
        .set_temporary_exception("example.com", Behaviour::Deny)
        .await
        .unwrap()
        .unwrap();

    assert_eq!(report.quarantined_cookies, 1);
    assert_eq!(report.storage_failures, 1);
    assert_eq!(report.storage_tabs, 0);

    let direct = h.guard.storage(TabId(1)).await;
    assert!(matches!(
        direct,
        Err(CoreError::ContentScriptUnavailable { attempts: 2, .. })
    ));
}

#[tokio::test]
async fn test_storage_follows_policy() {
    let h = Harness::new();
    h.guard.set_default_behaviour(Behaviour::Deny).await.unwrap();
    let url = "https://app.example.com/";
    let (agent, storage) = h.attach_agent(1, url);
    h.open_tab(1, url).await;

    assert!(!agent.on_storage_write("token", "local", true).await.unwrap());
    assert!(!agent.on_storage_write("token", "session", false).await.unwrap());
    assert_eq!(h.guard.unwanted_storage(TabId(1)).await.unwrap().len(), 2);

    let report = h
        .guard
        .set_temporary_exception("example.com", Behaviour::AllowSession)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(report.storage_tabs, 1);
    assert_eq!(report.restored_entries, 1);

    assert_eq!(storage.get("token", false).as_deref(), Some("session"));
    assert_eq!(storage.get("token", true), None);
    let unwanted = h.guard.unwanted_storage(TabId(1)).await.unwrap();
    assert_eq!(unwanted.len(), 1);
    assert!(unwanted[0].persistent);
}

#[tokio::test]
async fn test_restore_unwanted_entry_whitelists_it() {
    let h = Harness::new();
    h.guard.set_default_behaviour(Behaviour::Deny).await.unwrap();
    let url = "https://app.example.com/";
    let (agent, storage) = h.attach_agent(1, url);
    h.open_tab(1, url).await;
    agent.on_storage_write("prefs", "dark", true).await.unwrap();

    let restored = h
        .guard
        .restore_unwanted_entry(TabId(1), "prefs", true)
        .await
        .unwrap();
    assert_eq!(restored.len(), 1);
    assert_eq!(storage.get("prefs", true).as_deref(), Some("dark"));

    // A later pass keeps it
    let report = h.guard.reconcile_domain("example.com").await.unwrap();
    assert_eq!(report.quarantined_entries, 0);
    assert!(h
        .guard
        .is_whitelisted(&WhitelistEntry::new(
            "app.example.com",
            "prefs",
            WhitelistKind::StorageItem
        ))
        .unwrap());
}

#[tokio::test]
async fn test_restore_unwanted_cookie_survives_admission() {
    let h = Harness::new();
    h.guard.set_default_behaviour(Behaviour::Deny).await.unwrap();
    h.open_tab(1, "https://example.com/").await;
    h.browser_sets(CookieRecord::session_cookie("example.com", "sid", "1"))
        .await;

    let restored = h
        .guard
        .restore_unwanted_cookie("example.com", "example.com", "sid")
        .await
        .unwrap();

    // The browser reports the restored cookie as a fresh addition
    h.browser_sets(restored).await;
    assert_eq!(h.cookies.len(), 1);
    assert!(h.guard.unwanted_cookies("example.com").is_empty());
}

#[tokio::test]
async fn test_cookie_edit_rolls_back() {
    let h = Harness::new();
    let original = CookieRecord::session_cookie("example.com", "a", "1");
    h.cookies.insert(original.clone());

    let broken = CookieRecord::session_cookie("example.com", "", "");
    let result = h.guard.set_cookie(&broken, Some(&original)).await;

    assert!(matches!(result, Err(CoreError::CookieStore(_))));
    let live = h.cookies.all();
    assert_eq!(live.len(), 1);
    assert_eq!(live[0].name, "a");

    let renamed = CookieRecord::session_cookie("example.com", "b", "1");
    h.guard.set_cookie(&renamed, Some(&original)).await.unwrap();
    let live = h.cookies.all();
    assert_eq!(live.len(), 1);
    assert_eq!(live[0].name, "b");
}

#[tokio::test]
async fn test_container_resolution_and_counter() {
    let h = Harness::with_cookie_store(MemoryCookieStore::with_stores(vec![
        CookieStoreInfo {
            id: DEFAULT_STORE_ID.to_string(),
            tab_ids: vec![TabId(1)],
        },
        CookieStoreInfo {
            id: "container-1".to_string(),
            tab_ids: vec![TabId(2)],
        },
    ]));
    for (id, url) in [(1, "https://example.com/"), (2, "https://example.com/"), (3, "https://example.com/")] {
        h.guard
            .handle_event(BrowserEvent::TabCreated {
                tab_id: TabId(id),
                url: url.to_string(),
                cookie_store_id: None,
            })
            .await
            .unwrap();
    }

    let mut container_cookie = CookieRecord::session_cookie("example.com", "c", "1");
    container_cookie.store_id = "container-1".to_string();
    h.cookies.insert(container_cookie);

    assert_eq!(h.guard.cookie_count(TabId(2)).await.unwrap(), None);
    h.request(Request::SetCookieCounter { enabled: true }).await;
    assert_eq!(h.guard.cookie_count(TabId(2)).await.unwrap(), Some(1));
    assert_eq!(h.guard.cookie_count(TabId(1)).await.unwrap(), Some(0));
    assert!(matches!(
        h.guard.cookie_count(TabId(3)).await,
        Err(CoreError::CookieStoreLookup(TabId(3)))
    ));

    // Sweeps reach the container through the tab listed in it
    let report = h
        .guard
        .set_temporary_exception("example.com", Behaviour::Deny)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(report.quarantined_cookies, 1);
}

#[tokio::test]
async fn test_concurrent_events_keep_domain_consistent() {
    let h = Harness::new();
    h.guard.set_default_behaviour(Behaviour::Deny).await.unwrap();
    h.open_tab(1, "https://example.com/").await;

    let first = CookieRecord::session_cookie("example.com", "a", "1");
    let second = CookieRecord::session_cookie("example.com", "b", "2");
    h.cookies.insert(first.clone());
    h.cookies.insert(second.clone());

    let (r1, r2, r3) = tokio::join!(
        h.guard.handle_event(BrowserEvent::CookieChanged {
            removed: false,
            cause: CookieChangeCause::Explicit,
            cookie: first,
        }),
        h.guard.handle_event(BrowserEvent::CookieChanged {
            removed: false,
            cause: CookieChangeCause::Explicit,
            cookie: second,
        }),
        h.guard.reconcile_domain("example.com"),
    );
    r1.unwrap();
    r2.unwrap();
    r3.unwrap();

    assert!(h.cookies.is_empty());
    assert_eq!(h.guard.unwanted_cookies("example.com").len(), 2);
}

#[tokio::test]
async fn test_signals_follow_changes() {
    let h = Harness::new();
    let mut signals = h.guard.subscribe();
    h.open_tab(1, "https://example.com/").await;

    assert_eq!(
        signals.recv().await.unwrap(),
        GuardSignal::Reconciled {
            domain: "example.com".to_string()
        }
    );

    h.request(Request::SetCookieCounter { enabled: true }).await;
    assert_eq!(signals.recv().await.unwrap(), GuardSignal::SettingsChanged);
}

#[tokio::test]
async fn test_reload_settings_reconciles_open_domains() {
    let h = Harness::new();
    h.open_tab(1, "https://example.com/").await;
    h.open_tab(2, "https://other.org/").await;

    let response = h.request(Request::ReloadSettings).await;
    match response {
        Response::Reconciled { reports } => {
            let mut domains: Vec<String> = reports.into_iter().map(|r| r.domain).collect();
            domains.sort();
            assert_eq!(domains, vec!["example.com", "other.org"]);
        }
        other => panic!("unexpected response: {:?}", other),
    }
}
