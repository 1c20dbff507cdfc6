//! User directories: lookup and creation of registered users.
//!
//! Two backends share the [`UserDirectory`] trait:
//!
//! - [`FileUserDirectory`] keeps every user in memory and snapshots the
//!   whole set to a JSON file.
//! - [`SqliteUserDirectory`] keeps users in the `users` table of a
//!   [`Database`](crate::Database).
//!
//! Both guarantee that two concurrent registrations of the same name
//! produce exactly one winner.

mod file;
mod sqlite;

use async_trait::async_trait;

use crate::error::StoreResult;
use crate::models::User;

pub use file::FileUserDirectory;
pub use sqlite::SqliteUserDirectory;

/// Registry of user accounts keyed by unique name.
#[async_trait]
pub trait UserDirectory: Send + Sync {
    /// Persist a new user.
    ///
    /// Fails with [`StoreError::AlreadyExists`](crate::StoreError::AlreadyExists)
    /// if the name is taken.
    async fn create_user(&self, user: User) -> StoreResult<()>;

    /// Look a user up by login name.
    ///
    /// Fails with [`StoreError::NotFound`](crate::StoreError::NotFound) if
    /// no such user exists.
    async fn get_user_by_name(&self, name: &str) -> StoreResult<User>;

    /// Flush pending state. Called once on shutdown.
    async fn close(&self) -> StoreResult<()>;
}
