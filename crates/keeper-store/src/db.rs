//! SQLite handle backing [`SqliteUserDirectory`](crate::SqliteUserDirectory).
//!
//! rusqlite is synchronous, so every call hops onto tokio's blocking pool.
//! One connection sits behind a `std::sync::Mutex`; user traffic is a login
//! or registration at a time, which one connection covers.

use std::path::Path;
use std::sync::{Arc, Mutex};

use rusqlite::Connection;
use tracing::{debug, info};

use crate::error::{StoreError, StoreResult};
use crate::migration;

/// Cloneable handle to a single SQLite connection.
#[derive(Clone)]
pub struct Database {
    conn: Arc<Mutex<Connection>>,
}

impl Database {
    /// Open or create the database file at `path`. Blocks on file I/O.
    pub fn open(path: impl AsRef<Path>) -> StoreResult<Self> {
        let path = path.as_ref();
        info!(path = %path.display(), "opening user database");
        Self::configure(Connection::open(path)?)
    }

    /// Private in-memory database.
    pub fn open_in_memory() -> StoreResult<Self> {
        debug!("opening in-memory user database");
        Self::configure(Connection::open_in_memory()?)
    }

    /// [`Database::open`] on the blocking pool, then apply pending schema steps.
    pub async fn open_and_migrate(path: impl AsRef<Path> + Send + 'static) -> StoreResult<Self> {
        let path = path.as_ref().to_path_buf();
        let db = tokio::task::spawn_blocking(move || Self::open(path)).await??;
        db.run_migrations().await?;
        Ok(db)
    }

    pub async fn run_migrations(&self) -> StoreResult<()> {
        self.execute(migration::run_all).await
    }

    /// Run `f` with exclusive use of the connection, off the async runtime.
    ///
    /// Calls are serialised, so a closure that reads then writes sees no
    /// interleaving from other callers.
    pub async fn execute<F, T>(&self, f: F) -> StoreResult<T>
    where
        F: FnOnce(&Connection) -> StoreResult<T> + Send + 'static,
        T: Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let guard = conn
                .lock()
                .map_err(|_| StoreError::TaskJoin("user database lock poisoned".into()))?;
            f(&guard)
        })
        .await?
    }

    fn configure(conn: Connection) -> StoreResult<Self> {
        // WAL for crash safety; FULL sync since user rows are few and precious.
        for (pragma, value) in [("journal_mode", "WAL"), ("synchronous", "FULL")] {
            conn.pragma_update(None, pragma, value)?;
        }
        conn.busy_timeout(std::time::Duration::from_secs(5))?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }
}
