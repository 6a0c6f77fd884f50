//! Layered exception store
//!
//! Temporary exceptions live in memory only. Permanent exceptions are
//! persisted as `ex|<domain>` -> behaviour integer in the local area. The
//! default behaviour is a single integer in the sync area.
//!
//! Mutations here have no side effects beyond the store itself; callers
//! are expected to run reconciliation for the affected domain afterwards.

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

use cookieward_storage::{Database, StorageArea};

use crate::behaviour::Behaviour;
use crate::error::PolicyError;
use crate::domain::{registrable_domain, validate_rule_domain};
use crate::Result;

pub const EXCEPTION_PREFIX: &str = "ex|";
pub const DEFAULT_BEHAVIOUR_KEY: &str = "defaultBehaviour";
/// Used when no default has ever been saved.
pub const FALLBACK_DEFAULT_BEHAVIOUR: Behaviour = Behaviour::AllowSession;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Exception {
    pub domain: String,
    pub behaviour: Behaviour,
}

/// Which layer produced a resolved behaviour
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RuleSource {
    Temporary,
    Permanent,
    Default,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedBehaviour {
    pub behaviour: Behaviour,
    pub source: RuleSource,
}

fn exception_key(domain: &str) -> String {
    format!("{}{}", EXCEPTION_PREFIX, domain)
}

fn normalize(domain: &str) -> String {
    let domain = domain.trim();
    domain
        .strip_prefix('.')
        .unwrap_or(domain)
        .to_ascii_lowercase()
}

/// Temporary exceptions and lookups are keyed by the registrable domain, so
/// a tab hostname and its organisation share one rule.
fn scope(domain: &str) -> Result<String> {
    registrable_domain(&normalize(domain))
}

pub struct PolicyStore {
    /// domain -> behaviour, process lifetime only
    temporary: Arc<RwLock<HashMap<String, Behaviour>>>,
    db: Database,
}

impl PolicyStore {
    pub fn new(db: Database) -> Self {
        Self {
            temporary: Arc::new(RwLock::new(HashMap::new())),
            db,
        }
    }

    /// Behaviour for a domain: temporary, then permanent, then default.
    pub fn behaviour(&self, domain: &str) -> Result<Behaviour> {
        Ok(self.resolve(domain)?.behaviour)
    }

    pub fn resolve(&self, domain: &str) -> Result<ResolvedBehaviour> {
        let domain = scope(domain)?;

        if let Some(behaviour) = self.temporary.read().get(&domain).copied() {
            return Ok(ResolvedBehaviour {
                behaviour,
                source: RuleSource::Temporary,
            });
        }

        if let Some(behaviour) = self.permanent_exception(&domain)? {
            return Ok(ResolvedBehaviour {
                behaviour,
                source: RuleSource::Permanent,
            });
        }

        Ok(ResolvedBehaviour {
            behaviour: self.default_behaviour()?,
            source: RuleSource::Default,
        })
    }

    // === Temporary layer ===

    pub fn temporary_exception(&self, domain: &str) -> Option<Behaviour> {
        let domain = scope(domain).ok()?;
        self.temporary.read().get(&domain).copied()
    }

    /// Returns the registrable domain the exception was stored under.
    pub fn set_temporary_exception(&self, domain: &str, behaviour: Behaviour) -> Result<String> {
        let domain = scope(domain)?;
        if domain.is_empty() {
            return Err(PolicyError::invalid_domain(&domain, "domain is empty"));
        }
        tracing::info!(domain = %domain, behaviour = %behaviour, "Set temporary exception");
        self.temporary.write().insert(domain.clone(), behaviour);
        Ok(domain)
    }

    pub fn clear_temporary_exception(&self, domain: &str) -> Result<Option<Behaviour>> {
        let domain = scope(domain)?;
        let removed = self.temporary.write().remove(&domain);
        if removed.is_some() {
            tracing::info!(domain = %domain, "Cleared temporary exception");
        }
        Ok(removed)
    }

    /// Drop every temporary exception, returning the domains that had one.
    pub fn clear_all_temporary_exceptions(&self) -> Vec<String> {
        let mut domains: Vec<String> = self.temporary.write().drain().map(|(d, _)| d).collect();
        domains.sort();
        tracing::info!(count = domains.len(), "Cleared all temporary exceptions");
        domains
    }

    pub fn temporary_exceptions(&self) -> Vec<Exception> {
        let mut out: Vec<Exception> = self
            .temporary
            .read()
            .iter()
            .map(|(domain, behaviour)| Exception {
                domain: domain.clone(),
                behaviour: *behaviour,
            })
            .collect();
        out.sort_by(|a, b| a.domain.cmp(&b.domain));
        out
    }

    // === Permanent layer ===

    pub fn permanent_exception(&self, domain: &str) -> Result<Option<Behaviour>> {
        match self
            .db
            .get_item(StorageArea::Local, &exception_key(&normalize(domain)))?
        {
            Some(value) => Ok(Some(Behaviour::from_value(&value)?)),
            None => Ok(None),
        }
    }

    /// Persist a permanent exception, superseding any temporary one for the
    /// same domain. Returns the validated domain.
    pub fn set_permanent_exception(&self, domain: &str, behaviour: Behaviour) -> Result<String> {
        let domain = validate_rule_domain(domain)?;
        self.write_permanent(&domain, behaviour)?;
        Ok(domain)
    }

    /// Replace the exception for `previous` with one for `domain`.
    ///
    /// The old rule is deleted and the new one written in one transaction.
    pub fn replace_permanent_exception(
        &self,
        previous: &str,
        domain: &str,
        behaviour: Behaviour,
    ) -> Result<String> {
        let domain = validate_rule_domain(domain)?;
        let previous = normalize(previous);

        if previous == domain {
            self.write_permanent(&domain, behaviour)?;
            return Ok(domain);
        }

        self.db.replace_item(
            StorageArea::Local,
            &exception_key(&previous),
            &exception_key(&domain),
            &behaviour.to_value(),
        )?;
        self.temporary.write().remove(&domain);

        tracing::info!(from = %previous, to = %domain, behaviour = %behaviour, "Replaced permanent exception");
        Ok(domain)
    }

    fn write_permanent(&self, domain: &str, behaviour: Behaviour) -> Result<()> {
        self.db
            .set_item(StorageArea::Local, &exception_key(domain), &behaviour.to_value())?;
        self.temporary.write().remove(domain);
        tracing::info!(domain = %domain, behaviour = %behaviour, "Set permanent exception");
        Ok(())
    }

    pub fn clear_permanent_exception(&self, domain: &str) -> Result<bool> {
        let domain = normalize(domain);
        let removed = self
            .db
            .remove_item(StorageArea::Local, &exception_key(&domain))?;
        if removed {
            tracing::info!(domain = %domain, "Cleared permanent exception");
        }
        Ok(removed)
    }

    pub fn permanent_exceptions(&self) -> Result<Vec<Exception>> {
        self.db
            .items_with_prefix(StorageArea::Local, EXCEPTION_PREFIX)?
            .into_iter()
            .map(|(key, value)| -> Result<Exception> {
                Ok(Exception {
                    domain: key[EXCEPTION_PREFIX.len()..].to_string(),
                    behaviour: Behaviour::from_value(&value)?,
                })
            })
            .collect()
    }

    // === Default ===

    pub fn default_behaviour(&self) -> Result<Behaviour> {
        match self.db.get_item(StorageArea::Sync, DEFAULT_BEHAVIOUR_KEY)? {
            Some(value) => Behaviour::from_value(&value),
            None => Ok(FALLBACK_DEFAULT_BEHAVIOUR),
        }
    }

    pub fn set_default_behaviour(&self, behaviour: Behaviour) -> Result<()> {
        self.db
            .set_item(StorageArea::Sync, DEFAULT_BEHAVIOUR_KEY, &behaviour.to_value())?;
        tracing::info!(behaviour = %behaviour, "Set default behaviour");
        Ok(())
    }
}

impl Clone for PolicyStore {
    fn clone(&self) -> Self {
        Self {
            temporary: Arc::clone(&self.temporary),
            db: self.db.clone(),
        }
    }
}
