//! Cookieward Quarantine
//!
//! Holding area for items the policy rejected, so they can be put back
//! when the policy changes or the user whitelists them.
//!
//! - [`CookieQuarantine`]: one bucket per open registrable domain, owned by
//!   the background context. Cookies for domains without a bucket are not
//!   kept.
//! - [`StorageQuarantine`]: one list per tab, owned by that tab's content
//!   script.
//!
//! Neither ledger is persisted. Anything lost on restart is re-quarantined
//! the next time the page writes it.

mod cookie;
mod cookies;
mod error;
mod memory;
mod storage;
mod store;

pub use cookie::{CookieRecord, RemoveCookieParams, SameSite, SetCookieParams};
pub use cookies::{CookieQuarantine, RestoreOutcome};
pub use error::{CookieStoreError, DomStorageError, QuarantineError};
pub use memory::{MemoryCookieStore, MemoryDomStorage, DEFAULT_STORE_ID};
pub use storage::{StorageEntry, StorageQuarantine};
pub use store::{CookieFilter, CookieStore, CookieStoreInfo, DomStorage};

pub type Result<T> = std::result::Result<T, QuarantineError>;
