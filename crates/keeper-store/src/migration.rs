//! Versioned schema for the SQLite user directory.
//!
//! The applied version lives in SQLite's own `user_version` header field, so
//! no bookkeeping table is needed. Each step runs in its own transaction
//! together with the version bump.

use rusqlite::Connection;
use tracing::{debug, info, warn};

use crate::error::{StoreError, StoreResult};

/// Ordered schema steps; entry `i` upgrades the schema to version `i + 1`.
static STEPS: &[(&str, &str)] = &[(
    "users table with unique login names",
    "CREATE TABLE users (
        id            TEXT PRIMARY KEY,
        name          TEXT NOT NULL UNIQUE,
        password_hash TEXT NOT NULL,
        created_at    INTEGER NOT NULL
    );",
)];

/// Schema version this build writes and understands.
pub fn latest_version() -> u32 {
    STEPS.len() as u32
}

/// Read the schema version recorded in the database header.
pub fn schema_version(conn: &Connection) -> StoreResult<u32> {
    conn.pragma_query_value(None, "user_version", |row| row.get::<_, u32>(0))
        .map_err(|e| StoreError::Migration {
            version: 0,
            message: format!("cannot read user_version: {e}"),
        })
}

/// Bring `conn` up to [`latest_version`]. Synchronous; run it off the runtime.
///
/// A database written by a newer build is refused rather than opened with a
/// schema this code does not know.
pub fn run_all(conn: &Connection) -> StoreResult<()> {
    let found = schema_version(conn)?;
    let latest = latest_version();

    if found > latest {
        return Err(StoreError::Migration {
            version: found,
            message: format!("database schema v{found} is newer than supported v{latest}"),
        });
    }
    if found == latest {
        debug!(version = found, "user schema current");
        return Ok(());
    }

    info!(from = found, to = latest, "upgrading user schema");
    for (index, (description, sql)) in STEPS.iter().enumerate().skip(found as usize) {
        let version = index as u32 + 1;
        upgrade_to(conn, version, description, sql)?;
    }
    Ok(())
}

fn upgrade_to(conn: &Connection, version: u32, description: &str, sql: &str) -> StoreResult<()> {
    let failed = |e: rusqlite::Error| StoreError::Migration {
        version,
        message: e.to_string(),
    };

    // Dropping `tx` without commit rolls the step back.
    let tx = conn.unchecked_transaction().map_err(failed)?;
    if let Err(e) = tx
        .execute_batch(sql)
        .and_then(|()| tx.pragma_update(None, "user_version", version))
    {
        warn!(version, description, error = %e, "schema step failed, rolled back");
        return Err(failed(e));
    }
    tx.commit().map_err(failed)?;

    info!(version, description, "schema step applied");
    Ok(())
}
