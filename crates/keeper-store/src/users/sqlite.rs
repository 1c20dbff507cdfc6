//! SQLite-backed user directory.

use async_trait::async_trait;
use chrono::Utc;
use tracing::{debug, instrument};

use super::UserDirectory;
use crate::db::Database;
use crate::error::{StoreError, StoreResult};
use crate::models::{User, UserId};

/// [`UserDirectory`] stored in the `users` table.
///
/// Name uniqueness is enforced by the table's `UNIQUE` constraint, so
/// concurrent registrations race inside SQLite rather than in Rust.
#[derive(Clone)]
pub struct SqliteUserDirectory {
    db: Database,
}

impl SqliteUserDirectory {
    /// Create a directory over an already-migrated database.
    pub fn new(db: Database) -> Self {
        Self { db }
    }
}

#[async_trait]
impl UserDirectory for SqliteUserDirectory {
    #[instrument(skip(self, user), fields(name = %user.name))]
    async fn create_user(&self, user: User) -> StoreResult<()> {
        let now = Utc::now().timestamp();

        self.db
            .execute(move |conn| {
                conn.execute(
                    "INSERT INTO users (id, name, password_hash, created_at) VALUES (?1, ?2, ?3, ?4)",
                    rusqlite::params![user.id.as_str(), user.name, user.password_hash, now],
                )
                .map_err(|e| {
                    if let rusqlite::Error::SqliteFailure(ref err, _) = e
                        && err.code == rusqlite::ErrorCode::ConstraintViolation
                    {
                        return StoreError::AlreadyExists {
                            entity: "user",
                            id: user.name.clone(),
                        };
                    }
                    StoreError::Sqlite(e)
                })?;
                Ok(())
            })
            .await?;

        debug!("user created");
        Ok(())
    }

    #[instrument(skip(self))]
    async fn get_user_by_name(&self, name: &str) -> StoreResult<User> {
        let name = name.to_string();
        self.db
            .execute(move |conn| {
                let result = conn.query_row(
                    "SELECT id, name, password_hash FROM users WHERE name = ?1",
                    rusqlite::params![name],
                    |row| {
                        Ok((
                            row.get::<_, String>(0)?,
                            row.get::<_, String>(1)?,
                            row.get::<_, String>(2)?,
                        ))
                    },
                );
                match result {
                    Ok((id, name, password_hash)) => Ok(User {
                        id: UserId::parse(&id)?,
                        name,
                        password_hash,
                    }),
                    Err(rusqlite::Error::QueryReturnedNoRows) => Err(StoreError::NotFound {
                        entity: "user",
                        id: name,
                    }),
                    Err(e) => Err(StoreError::Sqlite(e)),
                }
            })
            .await
    }

    async fn close(&self) -> StoreResult<()> {
        // Every insert is already committed; checkpoint the WAL so the main
        // file is self-contained.
        self.db
            .execute(|conn| {
                conn.query_row("PRAGMA wal_checkpoint(TRUNCATE)", [], |_| Ok(()))?;
                Ok(())
            })
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn directory() -> SqliteUserDirectory {
        let db = Database::open_in_memory().unwrap();
        db.run_migrations().await.unwrap();
        SqliteUserDirectory::new(db)
    }

    fn user(name: &str) -> User {
        User {
            id: UserId::new(),
            name: name.to_string(),
            password_hash: "hash".to_string(),
        }
    }

    #[tokio::test]
    async fn create_and_lookup() {
        let users = directory().await;
        let alice = user("alice");
        users.create_user(alice.clone()).await.unwrap();

        assert_eq!(users.get_user_by_name("alice").await.unwrap(), alice);
        assert!(users.get_user_by_name("Alice").await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn duplicate_name_rejected() {
        let users = directory().await;
        users.create_user(user("alice")).await.unwrap();

        let err = users.create_user(user("alice")).await.unwrap_err();
        assert!(matches!(err, StoreError::AlreadyExists { entity: "user", .. }));
    }

    #[tokio::test]
    async fn concurrent_duplicates_have_one_winner() {
        let users = directory().await;

        let mut handles = Vec::new();
        for _ in 0..8 {
            let users = users.clone();
            handles.push(tokio::spawn(async move {
                users.create_user(user("carol")).await
            }));
        }

        let mut ok = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(()) => ok += 1,
                Err(StoreError::AlreadyExists { .. }) => {}
                Err(other) => panic!("unexpected error: {other}"),
            }
        }
        assert_eq!(ok, 1);
    }

    #[tokio::test]
    async fn close_on_memory_database_is_harmless() {
        directory().await.close().await.unwrap();
    }
}
