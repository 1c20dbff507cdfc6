//! # keeper-store
//!
//! Persistence for Keeper.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────┐
//! │  RecordStore (trait)                         │
//! │    └─ FileRecordStore  <root>/<user>/<id>/   │
//! ├──────────────────────────────────────────────┤
//! │  UserDirectory (trait)                       │
//! │    ├─ FileUserDirectory    users.json        │
//! │    └─ SqliteUserDirectory  Database          │
//! ├──────────────────────────────────────────────┤
//! │  Database (rusqlite WAL)                     │
//! │  Migrations (versioned, transactional)       │
//! └──────────────────────────────────────────────┘
//! ```
//!
//! The store never sees plaintext secrets: payloads arrive already sealed
//! and user records carry only password hashes.

pub mod db;
pub mod error;
pub mod migration;
pub mod models;
pub mod records;
pub mod users;

// ── re-exports ───────────────────────────────────────────────────────

pub use db::Database;
pub use error::{StoreError, StoreResult};
pub use models::{RecordContext, RecordId, RecordType, User, UserId};
pub use records::{FileRecordStore, RecordStore};
pub use users::{FileUserDirectory, SqliteUserDirectory, UserDirectory};
