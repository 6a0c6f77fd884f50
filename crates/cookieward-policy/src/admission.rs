//! Admission decision

use crate::behaviour::Behaviour;
use crate::whitelist::{WhitelistKind, WhitelistStore};
use crate::Result;

/// Anything the policy can accept or reject: a cookie or a storage entry.
pub trait Admissible {
    /// Domain the whitelist is keyed by (full cookie domain or page host)
    fn whitelist_domain(&self) -> &str;
    fn name(&self) -> &str;
    fn kind(&self) -> WhitelistKind;
    /// Session cookie, or an entry held in session storage
    fn is_session_scoped(&self) -> bool;
}

/// Pure decision given an already-resolved behaviour and whitelist result.
pub fn is_allowed<T: Admissible + ?Sized>(item: &T, behaviour: Behaviour, whitelisted: bool) -> bool {
    match behaviour {
        Behaviour::AllowAll => true,
        _ if whitelisted => true,
        Behaviour::Deny => false,
        Behaviour::AllowSession => item.is_session_scoped(),
    }
}

/// Decision with the whitelist lookup done on demand. AllowAll never
/// touches storage.
pub fn admit<T: Admissible + ?Sized>(
    item: &T,
    behaviour: Behaviour,
    whitelist: &WhitelistStore,
) -> Result<bool> {
    if behaviour == Behaviour::AllowAll {
        return Ok(true);
    }
    let whitelisted = whitelist.is_whitelisted(item.whitelist_domain(), item.name(), item.kind())?;
    Ok(is_allowed(item, behaviour, whitelisted))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::whitelist::WhitelistEntry;
    use cookieward_storage::Database;

    struct Item {
        session: bool,
    }

    impl Admissible for Item {
        fn whitelist_domain(&self) -> &str {
            ".example.com"
        }
        fn name(&self) -> &str {
            "sid"
        }
        fn kind(&self) -> WhitelistKind {
            WhitelistKind::Cookie
        }
        fn is_session_scoped(&self) -> bool {
            self.session
        }
    }

    #[test]
    fn test_deny() {
        let session = Item { session: true };
        let persistent = Item { session: false };
        assert!(!is_allowed(&session, Behaviour::Deny, false));
        assert!(!is_allowed(&persistent, Behaviour::Deny, false));
        assert!(is_allowed(&persistent, Behaviour::Deny, true));
    }

    #[test]
    fn test_allow_session() {
        let session = Item { session: true };
        let persistent = Item { session: false };
        assert!(is_allowed(&session, Behaviour::AllowSession, false));
        assert!(!is_allowed(&persistent, Behaviour::AllowSession, false));
        assert!(is_allowed(&persistent, Behaviour::AllowSession, true));
    }

    #[test]
    fn test_allow_all() {
        assert!(is_allowed(&Item { session: false }, Behaviour::AllowAll, false));
        assert!(is_allowed(&Item { session: true }, Behaviour::AllowAll, false));
    }

    #[test]
    fn test_admit_consults_whitelist() {
        let whitelist = WhitelistStore::new(Database::open_in_memory().unwrap());
        let item = Item { session: false };

        assert!(!admit(&item, Behaviour::Deny, &whitelist).unwrap());
        whitelist
            .add(&WhitelistEntry::new("example.com", "sid", WhitelistKind::Cookie))
            .unwrap();
        assert!(admit(&item, Behaviour::Deny, &whitelist).unwrap());
    }
}
