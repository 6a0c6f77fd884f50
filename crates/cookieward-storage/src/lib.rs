//! Cookieward Storage Layer
//!
//! SQLite-backed stand-in for the extension's persisted key/value areas.
//! `local` holds permanent exceptions and whitelist entries, `sync` holds
//! user settings. Values are JSON so they round-trip exactly as the
//! extension storage API would hold them.

mod area;
mod database;
mod error;
mod migrations;

pub use area::StorageArea;
pub use database::Database;
pub use error::StorageError;

pub type Result<T> = std::result::Result<T, StorageError>;
