//! JSON-file user directory.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::{debug, error, info, instrument};

use super::UserDirectory;
use crate::error::{StoreError, StoreResult};
use crate::models::User;
use crate::records::write_synced;

/// [`UserDirectory`] held in memory and snapshotted to a JSON file.
///
/// The snapshot is rewritten after every successful registration and once
/// more on [`close`](UserDirectory::close). Writes go to a sibling temp file
/// that is then renamed over the snapshot, so a crash leaves either the old
/// or the new file, never a torn one.
pub struct FileUserDirectory {
    path: PathBuf,
    users: Mutex<HashMap<String, User>>,
}

impl FileUserDirectory {
    /// Load the directory from `path`, starting empty if the file is absent.
    pub async fn open(path: impl Into<PathBuf>) -> StoreResult<Self> {
        let path = path.into();

        let users = match tokio::fs::read(&path).await {
            Ok(bytes) => {
                let list: Vec<User> = serde_json::from_slice(&bytes)?;
                list.into_iter().map(|u| (u.name.clone(), u)).collect()
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => HashMap::new(),
            Err(e) => {
                error!(path = %path.display(), error = %e, "failed to read user file");
                return Err(e.into());
            }
        };

        info!(path = %path.display(), users = users.len(), "file user directory loaded");
        Ok(Self {
            path,
            users: Mutex::new(users),
        })
    }

    /// Location of the JSON snapshot.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn tmp_path(&self) -> PathBuf {
        self.path.with_extension("json.tmp")
    }

    async fn write_snapshot(&self, users: &HashMap<String, User>) -> StoreResult<()> {
        let mut list: Vec<&User> = users.values().collect();
        list.sort_by(|a, b| a.name.cmp(&b.name));
        let bytes = serde_json::to_vec_pretty(&list)?;

        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            tokio::fs::create_dir_all(parent).await?;
        }

        let tmp = self.tmp_path();
        if let Err(err) = write_synced(&tmp, &bytes).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(err);
        }
        tokio::fs::rename(&tmp, &self.path).await?;
        Ok(())
    }
}

#[async_trait]
impl UserDirectory for FileUserDirectory {
    #[instrument(skip(self, user), fields(name = %user.name))]
    async fn create_user(&self, user: User) -> StoreResult<()> {
        let mut users = self.users.lock().await;
        if users.contains_key(&user.name) {
            return Err(StoreError::AlreadyExists {
                entity: "user",
                id: user.name,
            });
        }

        let name = user.name.clone();
        users.insert(name.clone(), user);

        if let Err(err) = self.write_snapshot(&users).await {
            error!(path = %self.path.display(), error = %err, "failed to persist user file");
            users.remove(&name);
            return Err(err);
        }

        debug!("user created");
        Ok(())
    }

    #[instrument(skip(self))]
    async fn get_user_by_name(&self, name: &str) -> StoreResult<User> {
        self.users
            .lock()
            .await
            .get(name)
            .cloned()
            .ok_or_else(|| StoreError::NotFound {
                entity: "user",
                id: name.to_string(),
            })
    }

    async fn close(&self) -> StoreResult<()> {
        let users = self.users.lock().await;
        self.write_snapshot(&users).await?;
        info!(path = %self.path.display(), users = users.len(), "user file flushed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::UserId;

    fn user(name: &str) -> User {
        User {
            id: UserId::new(),
            name: name.to_string(),
            password_hash: "pbkdf2-sha256$1$AA==$AA==".to_string(),
        }
    }

    #[tokio::test]
    async fn create_and_lookup() {
        let dir = tempfile::tempdir().unwrap();
        let users = FileUserDirectory::open(dir.path().join("users.json"))
            .await
            .unwrap();

        let alice = user("alice");
        users.create_user(alice.clone()).await.unwrap();
        assert_eq!(users.get_user_by_name("alice").await.unwrap(), alice);
        assert!(users.get_user_by_name("bob").await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn duplicate_name_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let users = FileUserDirectory::open(dir.path().join("users.json"))
            .await
            .unwrap();

        users.create_user(user("alice")).await.unwrap();
        let err = users.create_user(user("alice")).await.unwrap_err();
        assert!(matches!(err, StoreError::AlreadyExists { .. }));
    }

    #[tokio::test]
    async fn survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("users.json");

        let alice = user("alice");
        {
            let users = FileUserDirectory::open(&path).await.unwrap();
            users.create_user(alice.clone()).await.unwrap();
            users.close().await.unwrap();
        }

        let reopened = FileUserDirectory::open(&path).await.unwrap();
        assert_eq!(reopened.get_user_by_name("alice").await.unwrap(), alice);
    }

    #[tokio::test]
    async fn corrupt_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("users.json");
        std::fs::write(&path, b"{not json").unwrap();

        assert!(matches!(
            FileUserDirectory::open(&path).await,
            Err(StoreError::Json(_))
        ));
    }

    #[tokio::test]
    async fn snapshot_replaces_file_without_leftovers() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("users.json");
        // A temp file from an interrupted run is simply overwritten.
        std::fs::write(path.with_extension("json.tmp"), b"half written").unwrap();

        let users = FileUserDirectory::open(&path).await.unwrap();
        users.create_user(user("alice")).await.unwrap();
        users.create_user(user("bob")).await.unwrap();

        assert!(!users.tmp_path().exists());
        let on_disk: Vec<User> = serde_json::from_slice(&std::fs::read(&path).unwrap()).unwrap();
        let names: Vec<_> = on_disk.iter().map(|u| u.name.as_str()).collect();
        assert_eq!(names, ["alice", "bob"]);
    }

    #[tokio::test]
    async fn failed_snapshot_keeps_previous_file_and_rolls_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("users.json");
        let users = FileUserDirectory::open(&path).await.unwrap();
        users.create_user(user("alice")).await.unwrap();
        let before = std::fs::read(&path).unwrap();

        // A directory where the temp file belongs makes the write fail.
        std::fs::create_dir(users.tmp_path()).unwrap();
        assert!(users.create_user(user("bob")).await.is_err());

        assert_eq!(std::fs::read(&path).unwrap(), before);
        assert!(users.get_user_by_name("bob").await.unwrap_err().is_not_found());
        assert!(users.get_user_by_name("alice").await.is_ok());
    }
}
