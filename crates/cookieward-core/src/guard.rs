//! The background service
//!
//! One [`Guard`] per background context owns every piece of engine state:
//! temporary exceptions, the tab registry, the cookie quarantine and the
//! per-domain locks. Cloning a `Guard` shares that state.

use futures_util::future::join_all;
use std::collections::BTreeSet;
use std::sync::Arc;
use tokio::sync::broadcast;

use cookieward_content::{ContentRequest, ContentResponse};
use cookieward_policy::{
    admit, registrable_domain, Behaviour, Exception, PolicyStore, ResolvedBehaviour,
    WhitelistEntry, WhitelistStore,
};
use cookieward_quarantine::{CookieFilter, CookieQuarantine, CookieStore, RemoveCookieParams};
use cookieward_storage::Database;
use cookieward_tabs::{Tab, TabRegistry};

use crate::config::Config;
use crate::content::{unexpected, ContentScript, ContentScriptClient};
use crate::error::CoreError;
use crate::locks::DomainLocks;
use crate::oracle::PolicyView;
use crate::reconcile::{ReconcileReport, ReconcileState, ReconcileStates};
use crate::settings::{Settings, SettingsStore};
use crate::Result;

/// Published after state the UI shows has changed
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GuardSignal {
    /// A reconciliation pass over `domain` finished
    Reconciled { domain: String },
    /// A live cookie was rejected and moved to quarantine
    CookieQuarantined { domain: String, name: String },
    ExceptionsChanged,
    WhitelistChanged,
    SettingsChanged,
    ActiveTabChanged,
}

#[derive(Clone)]
pub struct Guard {
    config: Config,
    pub(crate) policy: PolicyStore,
    pub(crate) whitelist: WhitelistStore,
    pub(crate) settings: SettingsStore,
    pub(crate) tabs: TabRegistry,
    pub(crate) quarantine: CookieQuarantine,
    pub(crate) locks: DomainLocks,
    states: ReconcileStates,
    pub(crate) cookie_store: Arc<dyn CookieStore>,
    pub(crate) content: ContentScriptClient,
    signals: broadcast::Sender<GuardSignal>,
}

impl Guard {
    /// Open the database named by `config` and build the service around it
    pub fn new(
        config: Config,
        cookie_store: Arc<dyn CookieStore>,
        content: Arc<dyn ContentScript>,
    ) -> Result<Self> {
        if let Some(parent) = config.database_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let db = Database::open(&config.database_path)?;
        Self::with_database(config, db, cookie_store, content)
    }

    pub fn with_database(
        config: Config,
        db: Database,
        cookie_store: Arc<dyn CookieStore>,
        content: Arc<dyn ContentScript>,
    ) -> Result<Self> {
        if config.signal_capacity == 0 {
            return Err(CoreError::Config(
                "signal_capacity must be greater than zero".to_string(),
            ));
        }

        let content = ContentScriptClient::new(
            content,
            config.content_script_attempts,
            config.content_script_retry_delay(),
        );
        let (signals, _) = broadcast::channel(config.signal_capacity);

        Ok(Self {
            policy: PolicyStore::new(db.clone()),
            whitelist: WhitelistStore::new(db.clone()),
            settings: SettingsStore::new(db),
            tabs: TabRegistry::new(),
            quarantine: CookieQuarantine::new(),
            locks: DomainLocks::new(),
            states: ReconcileStates::new(),
            cookie_store,
            content,
            signals,
            config,
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn tabs(&self) -> &TabRegistry {
        &self.tabs
    }

    pub fn quarantine(&self) -> &CookieQuarantine {
        &self.quarantine
    }

    /// Oracle for content agents running in this process
    pub fn policy_view(&self) -> PolicyView {
        PolicyView::new(self.policy.clone(), self.whitelist.clone())
    }

    pub fn subscribe(&self) -> broadcast::Receiver<GuardSignal> {
        self.signals.subscribe()
    }

    pub(crate) fn signal(&self, signal: GuardSignal) {
        // No subscribers is fine
        let _ = self.signals.send(signal);
    }

    // === Reconciliation ===

    pub fn reconcile_state(&self, domain: &str) -> ReconcileState {
        self.states.get(domain)
    }

    /// Re-apply current policy to `domain`'s live and quarantined cookies
    /// and to the storage of every tab showing it.
    ///
    /// Holds the domain's lock for the whole pass.
    pub async fn reconcile_domain(&self, domain: &str) -> Result<ReconcileReport> {
        let _guard = self.locks.lock(domain).await;
        self.states.advance(domain, ReconcileState::Resolving);
        tracing::debug!(domain = %domain, "Reconciliation started");

        match self.reconcile_locked(domain).await {
            Ok(report) => {
                self.states.advance(domain, ReconcileState::Settled);
                tracing::info!(
                    domain = %domain,
                    behaviour = %report.behaviour,
                    quarantined = report.quarantined_cookies,
                    restored = report.cookies.restored,
                    storage_tabs = report.storage_tabs,
                    storage_failures = report.storage_failures,
                    "Reconciliation finished"
                );
                self.signal(GuardSignal::Reconciled {
                    domain: domain.to_string(),
                });
                Ok(report)
            }
            Err(e) => {
                self.states.advance(domain, ReconcileState::Unresolved);
                tracing::warn!(domain = %domain, error = %e, "Reconciliation failed");
                Err(e)
            }
        }
    }

    async fn reconcile_locked(&self, domain: &str) -> Result<ReconcileReport> {
        let behaviour = self.policy.behaviour(domain)?;
        let mut report = ReconcileReport::new(domain, behaviour);
        let tabs = self.tabs.tabs_for_domain(domain);

        // Live -> quarantine
        for store_id in self.stores_for_tabs(&tabs).await {
            let filter = CookieFilter::for_domain(domain).in_store(&store_id);
            for cookie in self.cookie_store.get_all(&filter).await? {
                if admit(&cookie, behaviour, &self.whitelist)? {
                    continue;
                }
                self.cookie_store
                    .remove(&RemoveCookieParams::for_record(&cookie))
                    .await?;
                self.quarantine.record(cookie)?;
                report.quarantined_cookies += 1;
            }
        }

        // Quarantine -> live
        report.cookies = self
            .quarantine
            .reconcile_domain(domain, behaviour, &self.whitelist, self.cookie_store.as_ref())
            .await?;

        // Storage failures never fail the pass
        let results = join_all(tabs.iter().map(|tab| {
            self.content
                .request(tab.id, ContentRequest::Reconcile { behaviour })
        }))
        .await;
        for (tab, result) in tabs.iter().zip(results) {
            match result {
                Ok(ContentResponse::Reconciled {
                    quarantined,
                    restored,
                }) => {
                    report.storage_tabs += 1;
                    report.quarantined_entries += quarantined;
                    report.restored_entries += restored;
                }
                Ok(other) => {
                    report.storage_failures += 1;
                    let e = unexpected("reconcile", &other);
                    tracing::warn!(tab_id = %tab.id, error = %e, "Storage reconciliation skipped");
                }
                Err(e) => {
                    report.storage_failures += 1;
                    tracing::warn!(tab_id = %tab.id, error = %e, "Storage reconciliation skipped");
                }
            }
        }

        Ok(report)
    }

    /// Cookie stores used by `tabs`, skipping tabs whose store cannot be
    /// determined.
    async fn stores_for_tabs(&self, tabs: &[Tab]) -> BTreeSet<String> {
        let mut stores = BTreeSet::new();
        for tab in tabs {
            match self.store_for_tab(tab).await {
                Ok(store_id) => {
                    stores.insert(store_id);
                }
                Err(e) => {
                    tracing::warn!(tab_id = %tab.id, error = %e, "Skipping tab in cookie sweep");
                }
            }
        }
        stores
    }

    /// The tab's reported cookie store, else the store listing it
    pub(crate) async fn store_for_tab(&self, tab: &Tab) -> Result<String> {
        if let Some(store_id) = &tab.cookie_store_id {
            return Ok(store_id.clone());
        }

        self.cookie_store
            .stores()
            .await?
            .into_iter()
            .find(|store| store.tab_ids.contains(&tab.id))
            .map(|store| store.id)
            .ok_or(CoreError::CookieStoreLookup(tab.id))
    }

    /// Reconcile every open domain. Domains are independent: one failing
    /// does not stop the others, and failures are only logged.
    pub async fn reconcile_all(&self) -> Vec<ReconcileReport> {
        let domains = self.tabs.open_domains();
        let results = join_all(domains.iter().map(|domain| self.reconcile_domain(domain))).await;

        results.into_iter().filter_map(|result| result.ok()).collect()
    }

    /// Reconcile the registrable domain of `domain` if a tab has it open
    pub(crate) async fn reconcile_if_open(&self, domain: &str) -> Result<Option<ReconcileReport>> {
        let domain = registrable_domain(domain)?;
        if !self.tabs.is_domain_open(&domain) {
            return Ok(None);
        }
        Ok(Some(self.reconcile_domain(&domain).await?))
    }

    /// Reconcile each open domain among `domains` in turn. A failing domain
    /// is logged and skipped so the rest still see the new policy.
    pub(crate) async fn reconcile_each_open(&self, domains: &[String]) -> Vec<ReconcileReport> {
        let mut reports = Vec::new();
        for domain in domains {
            match self.reconcile_if_open(domain).await {
                Ok(Some(report)) => reports.push(report),
                Ok(None) => {}
                Err(e) => {
                    tracing::warn!(domain = %domain, error = %e, "Skipping domain after failed reconciliation");
                }
            }
        }
        reports
    }

    /// Close quarantine buckets for domains no tab has open any more
    pub(crate) fn prune_buckets(&self) {
        let open = self.tabs.open_domains();
        for domain in self.quarantine.open_domains() {
            if open.contains(&domain) {
                continue;
            }
            self.quarantine.close_bucket(&domain);
            self.locks.forget(&domain);
            self.states.forget(&domain);
        }
    }

    // === Exceptions ===

    pub fn behaviour(&self, domain: &str) -> Result<ResolvedBehaviour> {
        Ok(self.policy.resolve(domain)?)
    }

    pub async fn set_temporary_exception(
        &self,
        domain: &str,
        behaviour: Behaviour,
    ) -> Result<Option<ReconcileReport>> {
        let domain = self.policy.set_temporary_exception(domain, behaviour)?;
        self.signal(GuardSignal::ExceptionsChanged);
        self.reconcile_if_open(&domain).await
    }

    pub async fn clear_temporary_exception(&self, domain: &str) -> Result<Option<ReconcileReport>> {
        if self.policy.clear_temporary_exception(domain)?.is_none() {
            return Ok(None);
        }
        self.signal(GuardSignal::ExceptionsChanged);
        self.reconcile_if_open(domain).await
    }

    pub async fn clear_all_temporary_exceptions(&self) -> Result<Vec<ReconcileReport>> {
        let domains = self.policy.clear_all_temporary_exceptions();
        self.signal(GuardSignal::ExceptionsChanged);
        Ok(self.reconcile_each_open(&domains).await)
    }

    pub fn temporary_exceptions(&self) -> Vec<Exception> {
        self.policy.temporary_exceptions()
    }

    /// Persist a permanent exception, replacing the one for `previous`
    /// when editing an existing rule. Returns the validated domain.
    pub async fn set_permanent_exception(
        &self,
        domain: &str,
        behaviour: Behaviour,
        previous: Option<&str>,
    ) -> Result<String> {
        let mut affected = Vec::new();
        let domain = match previous {
            Some(previous) => {
                let domain = self
                    .policy
                    .replace_permanent_exception(previous, domain, behaviour)?;
                if previous != domain {
                    affected.push(previous.to_string());
                }
                domain
            }
            None => self.policy.set_permanent_exception(domain, behaviour)?,
        };
        affected.push(domain.clone());
        self.signal(GuardSignal::ExceptionsChanged);
        // The rule is saved; a failed pass is logged, not reported
        self.reconcile_each_open(&affected).await;
        Ok(domain)
    }

    pub async fn clear_permanent_exception(&self, domain: &str) -> Result<bool> {
        let removed = self.policy.clear_permanent_exception(domain)?;
        if removed {
            self.signal(GuardSignal::ExceptionsChanged);
            self.reconcile_if_open(domain).await?;
        }
        Ok(removed)
    }

    pub fn permanent_exceptions(&self) -> Result<Vec<Exception>> {
        Ok(self.policy.permanent_exceptions()?)
    }

    pub fn default_behaviour(&self) -> Result<Behaviour> {
        Ok(self.policy.default_behaviour()?)
    }

    pub async fn set_default_behaviour(&self, behaviour: Behaviour) -> Result<Vec<ReconcileReport>> {
        self.policy.set_default_behaviour(behaviour)?;
        self.signal(GuardSignal::SettingsChanged);
        Ok(self.reconcile_all().await)
    }

    // === Whitelist ===

    /// Add a whitelist entry, replacing `previous` when editing one
    pub async fn add_whitelist_entry(
        &self,
        entry: &WhitelistEntry,
        previous: Option<&WhitelistEntry>,
    ) -> Result<()> {
        let mut affected = Vec::new();
        match previous {
            Some(previous) => {
                self.whitelist.replace(previous, entry)?;
                if previous.domain != entry.domain {
                    affected.push(previous.domain.clone());
                }
            }
            None => self.whitelist.add(entry)?,
        }
        affected.push(entry.domain.clone());
        self.signal(GuardSignal::WhitelistChanged);
        self.reconcile_each_open(&affected).await;
        Ok(())
    }

    pub async fn remove_whitelist_entry(&self, entry: &WhitelistEntry) -> Result<bool> {
        let removed = self.whitelist.remove(entry)?;
        if removed {
            self.signal(GuardSignal::WhitelistChanged);
            self.reconcile_if_open(&entry.domain).await?;
        }
        Ok(removed)
    }

    pub fn whitelist_entries(&self) -> Result<Vec<WhitelistEntry>> {
        Ok(self.whitelist.entries()?)
    }

    pub fn is_whitelisted(&self, entry: &WhitelistEntry) -> Result<bool> {
        Ok(self.whitelist.contains(entry)?)
    }

    // === Settings ===

    pub fn settings(&self) -> Result<Settings> {
        Ok(Settings {
            default_behaviour: self.policy.default_behaviour()?,
            enable_cookie_counter: self.settings.cookie_counter_enabled()?,
        })
    }

    pub fn set_cookie_counter(&self, enabled: bool) -> Result<()> {
        self.settings.set_cookie_counter(enabled)?;
        self.signal(GuardSignal::SettingsChanged);
        Ok(())
    }

    /// Settings were changed elsewhere (another window, sync). Re-applies
    /// policy everywhere before returning.
    pub async fn reload_settings(&self) -> Result<Vec<ReconcileReport>> {
        let settings = self.settings()?;
        tracing::info!(
            default_behaviour = %settings.default_behaviour,
            cookie_counter = settings.enable_cookie_counter,
            "Reloading settings"
        );
        self.signal(GuardSignal::SettingsChanged);
        Ok(self.reconcile_all().await)
    }
}
