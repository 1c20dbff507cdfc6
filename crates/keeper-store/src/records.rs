//! Durable record storage.
//!
//! [`RecordStore`] maps `(owner, record id)` to a [`RecordContext`] plus an
//! opaque payload. The store performs no cryptography: by the time bytes
//! reach it they are already ciphertext.
//!
//! # On-disk layout ([`FileRecordStore`])
//!
//! ```text
//! <root>/
//! └── <user id>/
//!     ├── <record id>/
//!     │   ├── meta      version byte + rkyv-encoded RecordContext
//!     │   └── data      nonce-prefixed ciphertext
//!     ├── .staging-*    in-flight writes (never listed)
//!     └── .trash-*      in-flight deletes (never listed)
//! ```
//!
//! A record directory is only ever created by renaming a fully written and
//! synced staging directory into place, and only ever removed by renaming it
//! away first. Readers therefore see both files or neither. Writers to the
//! same record path are serialised by a per-record lock; unrelated records
//! never contend.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::sync::RwLock;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use crate::error::{StoreError, StoreResult};
use crate::models::{RecordContext, RecordId, UserId, decode_context, encode_context, is_valid_id};

/// File name of the metadata blob inside a record directory.
pub const META_FILE: &str = "meta";

/// File name of the payload blob inside a record directory.
pub const DATA_FILE: &str = "data";

const STAGING_PREFIX: &str = ".staging-";
const TRASH_PREFIX: &str = ".trash-";

// ═══════════════════════════════════════════════════════════════════════
//  Trait
// ═══════════════════════════════════════════════════════════════════════

/// Persistence capability for encrypted records.
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Create or overwrite a record's metadata and payload as one unit.
    async fn put(&self, ctx: &RecordContext, payload: &[u8]) -> StoreResult<()>;

    /// Fetch a record's metadata and payload.
    ///
    /// Fails with [`StoreError::NotFound`] if the user or record is absent.
    async fn get(
        &self,
        user_id: &UserId,
        record_id: &RecordId,
    ) -> StoreResult<(RecordContext, Vec<u8>)>;

    /// Fetch only a record's metadata.
    async fn get_context(&self, user_id: &UserId, record_id: &RecordId)
    -> StoreResult<RecordContext>;

    /// List the metadata of every readable record a user owns.
    ///
    /// Fails with [`StoreError::NotFound`] if the user has never stored a
    /// record. Records whose metadata cannot be decoded are logged and
    /// skipped.
    async fn list_contexts(&self, user_id: &UserId) -> StoreResult<Vec<RecordContext>>;

    /// Remove a record's metadata and payload together.
    async fn delete(&self, user_id: &UserId, record_id: &RecordId) -> StoreResult<()>;
}

// ═══════════════════════════════════════════════════════════════════════
//  FileRecordStore
// ═══════════════════════════════════════════════════════════════════════

/// [`RecordStore`] backed by a two-level directory tree.
pub struct FileRecordStore {
    root: PathBuf,
    locks: DashMap<PathBuf, Arc<RwLock<()>>>,
}

impl FileRecordStore {
    /// Open (creating if needed) a record store rooted at `root`.
    ///
    /// Leftover staging and trash directories from an interrupted run are
    /// removed before the store is handed out.
    pub async fn open(root: impl Into<PathBuf>) -> StoreResult<Self> {
        let root = root.into();
        fs::create_dir_all(&root)
            .await
            .map_err(|e| io_error("create store root", &root, e))?;

        let store = Self {
            root,
            locks: DashMap::new(),
        };
        store.sweep_orphans().await?;

        info!(root = %store.root.display(), "record store ready");
        Ok(store)
    }

    /// Root directory of the store.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory that holds one record's `meta` and `data` blobs.
    pub fn record_dir(&self, user_id: &UserId, record_id: &RecordId) -> StoreResult<PathBuf> {
        Ok(self.user_dir(user_id)?.join(checked(record_id.as_str(), "record")?))
    }

    fn user_dir(&self, user_id: &UserId) -> StoreResult<PathBuf> {
        Ok(self.root.join(checked(user_id.as_str(), "user")?))
    }

    fn lock_for(&self, record_dir: &Path) -> Arc<RwLock<()>> {
        Arc::clone(&self.locks.entry(record_dir.to_path_buf()).or_default())
    }

    /// Give back a lock taken with [`Self::lock_for`].
    ///
    /// The entry is evicted only when the map holds the last reference, so
    /// the map tracks in-flight operations and every caller still waiting on
    /// a path keeps sharing one lock with whoever arrives next.
    fn release_lock(&self, record_dir: &Path, lock: Arc<RwLock<()>>) {
        drop(lock);
        self.locks
            .remove_if(record_dir, |_, held| Arc::strong_count(held) == 1);
    }

    async fn sweep_orphans(&self) -> StoreResult<()> {
        let mut users = fs::read_dir(&self.root)
            .await
            .map_err(|e| io_error("read store root", &self.root, e))?;

        while let Some(user) = users.next_entry().await? {
            if !user.file_type().await?.is_dir() {
                continue;
            }
            let mut entries = fs::read_dir(user.path()).await?;
            while let Some(entry) = entries.next_entry().await? {
                let name = entry.file_name();
                let name = name.to_string_lossy();
                if name.starts_with(STAGING_PREFIX) || name.starts_with(TRASH_PREFIX) {
                    warn!(path = %entry.path().display(), "removing interrupted write");
                    remove_quietly(&entry.path()).await;
                }
            }
        }
        Ok(())
    }

    async fn read_context(record_dir: &Path, record_id: &RecordId) -> StoreResult<RecordContext> {
        let meta_path = record_dir.join(META_FILE);
        let bytes = fs::read(&meta_path).await.map_err(|e| {
            if e.kind() == ErrorKind::NotFound {
                not_found("record", record_id.as_str())
            } else {
                io_error("read metadata", &meta_path, e)
            }
        })?;
        decode_context(&bytes)
    }
}

#[async_trait]
impl RecordStore for FileRecordStore {
    #[instrument(skip(self, ctx, payload), fields(user_id = %ctx.user_id, record_id = %ctx.id))]
    async fn put(&self, ctx: &RecordContext, payload: &[u8]) -> StoreResult<()> {
        let record_dir = self.record_dir(&ctx.user_id, &ctx.id)?;
        let lock = self.lock_for(&record_dir);
        let result = {
            let _guard = lock.write().await;
            self.put_unlocked(ctx, &record_dir, payload).await
        };
        self.release_lock(&record_dir, lock);
        result
    }

    #[instrument(skip(self))]
    async fn get(
        &self,
        user_id: &UserId,
        record_id: &RecordId,
    ) -> StoreResult<(RecordContext, Vec<u8>)> {
        let record_dir = self.record_dir(user_id, record_id)?;
        let lock = self.lock_for(&record_dir);
        let result = {
            let _guard = lock.read().await;
            Self::get_unlocked(&record_dir, user_id, record_id).await
        };
        self.release_lock(&record_dir, lock);
        result
    }

    #[instrument(skip(self))]
    async fn get_context(
        &self,
        user_id: &UserId,
        record_id: &RecordId,
    ) -> StoreResult<RecordContext> {
        let record_dir = self.record_dir(user_id, record_id)?;
        let lock = self.lock_for(&record_dir);
        let result = {
            let _guard = lock.read().await;
            Self::read_context(&record_dir, record_id).await
        };
        self.release_lock(&record_dir, lock);
        result
    }

    #[instrument(skip(self))]
    async fn list_contexts(&self, user_id: &UserId) -> StoreResult<Vec<RecordContext>> {
        let user_dir = self.user_dir(user_id)?;
        let mut entries = fs::read_dir(&user_dir).await.map_err(|e| {
            if e.kind() == ErrorKind::NotFound {
                not_found("user", user_id.as_str())
            } else {
                io_error("read user directory", &user_dir, e)
            }
        })?;

        let mut contexts = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| io_error("read user directory", &user_dir, e))?
        {
            let name = entry.file_name();
            let Some(name) = name.to_str() else {
                warn!(path = %entry.path().display(), "skipping non-UTF-8 entry");
                continue;
            };
            if !is_valid_id(name) || !entry.file_type().await.is_ok_and(|t| t.is_dir()) {
                continue;
            }

            let record_id = RecordId::parse(name)?;
            match Self::read_context(&entry.path(), &record_id).await {
                Ok(ctx) => contexts.push(ctx),
                Err(err) => {
                    warn!(record_id = %record_id, error = %err, "skipping unreadable record");
                }
            }
        }

        contexts.sort_by(|a, b| a.id.cmp(&b.id));
        debug!(count = contexts.len(), "listed records");
        Ok(contexts)
    }

    #[instrument(skip(self))]
    async fn delete(&self, user_id: &UserId, record_id: &RecordId) -> StoreResult<()> {
        let record_dir = self.record_dir(user_id, record_id)?;
        let lock = self.lock_for(&record_dir);
        let result = {
            let _guard = lock.write().await;
            self.delete_unlocked(&record_dir, user_id, record_id).await
        };
        self.release_lock(&record_dir, lock);
        result
    }
}

impl FileRecordStore {
    async fn put_unlocked(
        &self,
        ctx: &RecordContext,
        record_dir: &Path,
        payload: &[u8],
    ) -> StoreResult<()> {
        let user_dir = self.user_dir(&ctx.user_id)?;
        let meta = encode_context(ctx)?;

        fs::create_dir_all(&user_dir)
            .await
            .map_err(|e| io_error("create user directory", &user_dir, e))?;

        let staging = user_dir.join(format!("{STAGING_PREFIX}{}", Uuid::now_v7()));
        if let Err(err) = write_staged(&staging, &meta, payload).await {
            remove_quietly(&staging).await;
            return Err(err);
        }

        // Move any previous version aside so the rename below cannot collide.
        let trash = user_dir.join(format!("{TRASH_PREFIX}{}", Uuid::now_v7()));
        let replaced = match fs::rename(record_dir, &trash).await {
            Ok(()) => true,
            Err(e) if e.kind() == ErrorKind::NotFound => false,
            Err(e) => {
                remove_quietly(&staging).await;
                return Err(io_error("move previous record aside", record_dir, e));
            }
        };

        if let Err(e) = fs::rename(&staging, record_dir).await {
            remove_quietly(&staging).await;
            if replaced && let Err(restore) = fs::rename(&trash, record_dir).await {
                error!(path = %record_dir.display(), error = %restore, "failed to restore previous record");
            }
            return Err(io_error("commit record", record_dir, e));
        }

        if replaced {
            remove_quietly(&trash).await;
        }

        debug!(
            record_type = %ctx.record_type,
            payload_len = payload.len(),
            replaced,
            "record stored"
        );
        Ok(())
    }

    async fn get_unlocked(
        record_dir: &Path,
        user_id: &UserId,
        record_id: &RecordId,
    ) -> StoreResult<(RecordContext, Vec<u8>)> {
        let ctx = Self::read_context(record_dir, record_id).await?;
        if &ctx.user_id != user_id || &ctx.id != record_id {
            error!(path = %record_dir.display(), "record metadata does not match its location");
            return Err(StoreError::Decode(
                "record metadata does not match its location".into(),
            ));
        }

        let data_path = record_dir.join(DATA_FILE);
        let payload = fs::read(&data_path).await.map_err(|e| {
            if e.kind() == ErrorKind::NotFound {
                not_found("record", record_id.as_str())
            } else {
                io_error("read payload", &data_path, e)
            }
        })?;

        debug!(payload_len = payload.len(), "record loaded");
        Ok((ctx, payload))
    }

    async fn delete_unlocked(
        &self,
        record_dir: &Path,
        user_id: &UserId,
        record_id: &RecordId,
    ) -> StoreResult<()> {
        let trash = self
            .user_dir(user_id)?
            .join(format!("{TRASH_PREFIX}{}", Uuid::now_v7()));
        fs::rename(record_dir, &trash).await.map_err(|e| {
            if e.kind() == ErrorKind::NotFound {
                not_found("record", record_id.as_str())
            } else {
                io_error("move record to trash", record_dir, e)
            }
        })?;

        if let Err(e) = fs::remove_dir_all(&trash).await {
            // The record is already invisible; the sweep on next open
            // reclaims the space.
            warn!(path = %trash.display(), error = %e, "failed to purge deleted record");
        }

        debug!("record deleted");
        Ok(())
    }
}

// ═══════════════════════════════════════════════════════════════════════
//  Helpers
// ═══════════════════════════════════════════════════════════════════════

fn checked<'a>(component: &'a str, entity: &str) -> StoreResult<&'a str> {
    if is_valid_id(component) {
        Ok(component)
    } else {
        Err(StoreError::InvalidArgument(format!(
            "invalid {entity} id: {component:?}"
        )))
    }
}

fn not_found(entity: &'static str, id: &str) -> StoreError {
    StoreError::NotFound {
        entity,
        id: id.to_string(),
    }
}

fn io_error(op: &str, path: &Path, err: std::io::Error) -> StoreError {
    error!(op, path = %path.display(), error = %err, "storage I/O failure");
    StoreError::Io(err)
}

async fn write_staged(staging: &Path, meta: &[u8], payload: &[u8]) -> StoreResult<()> {
    fs::create_dir(staging)
        .await
        .map_err(|e| io_error("create staging directory", staging, e))?;
    write_synced(&staging.join(META_FILE), meta).await?;
    write_synced(&staging.join(DATA_FILE), payload).await?;
    Ok(())
}

/// Create `path`, write `bytes` and fsync before returning.
pub(crate) async fn write_synced(path: &Path, bytes: &[u8]) -> StoreResult<()> {
    let mut file = fs::File::create(path)
        .await
        .map_err(|e| io_error("create file", path, e))?;
    file.write_all(bytes)
        .await
        .map_err(|e| io_error("write file", path, e))?;
    file.sync_all()
        .await
        .map_err(|e| io_error("sync file", path, e))?;
    Ok(())
}

async fn remove_quietly(path: &Path) {
    if let Err(e) = fs::remove_dir_all(path).await
        && e.kind() != ErrorKind::NotFound
    {
        warn!(path = %path.display(), error = %e, "failed to remove directory");
    }
}

// ═══════════════════════════════════════════════════════════════════════
//  Tests
// ═══════════════════════════════════════════════════════════════════════

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::RecordType;

    fn context(user: &UserId, ty: RecordType) -> RecordContext {
        RecordContext {
            id: RecordId::new(),
            user_id: user.clone(),
            title: "title".into(),
            meta: "meta".into(),
            record_type: ty,
        }
    }

    async fn test_store() -> (tempfile::TempDir, FileRecordStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = FileRecordStore::open(dir.path().join("records")).await.unwrap();
        (dir, store)
    }

    #[tokio::test]
    async fn put_get_list_delete() {
        let (_dir, store) = test_store().await;
        let user = UserId::new();

        assert!(store.list_contexts(&user).await.unwrap_err().is_not_found());

        let ctx = context(&user, RecordType::Binary);
        store.put(&ctx, b"ciphertext").await.unwrap();

        let (got_ctx, payload) = store.get(&user, &ctx.id).await.unwrap();
        assert_eq!(got_ctx, ctx);
        assert_eq!(payload, b"ciphertext");
        assert_eq!(store.get_context(&user, &ctx.id).await.unwrap(), ctx);

        let listed = store.list_contexts(&user).await.unwrap();
        assert_eq!(listed, vec![ctx.clone()]);

        store.delete(&user, &ctx.id).await.unwrap();
        assert!(store.get(&user, &ctx.id).await.unwrap_err().is_not_found());
        assert!(store.list_contexts(&user).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn layout_is_user_then_record() {
        let (_dir, store) = test_store().await;
        let user = UserId::new();
        let ctx = context(&user, RecordType::Text);
        store.put(&ctx, b"x").await.unwrap();

        let record_dir = store.root().join(user.as_str()).join(ctx.id.as_str());
        assert!(record_dir.join(META_FILE).is_file());
        assert!(record_dir.join(DATA_FILE).is_file());
        assert_eq!(std::fs::read(record_dir.join(DATA_FILE)).unwrap(), b"x");
    }

    #[tokio::test]
    async fn put_overwrites_existing_record() {
        let (_dir, store) = test_store().await;
        let user = UserId::new();
        let mut ctx = context(&user, RecordType::Text);
        store.put(&ctx, b"v1").await.unwrap();

        ctx.title = "renamed".into();
        store.put(&ctx, b"v2").await.unwrap();

        let (got, payload) = store.get(&user, &ctx.id).await.unwrap();
        assert_eq!(got.title, "renamed");
        assert_eq!(payload, b"v2");

        // No staging or trash directories left behind.
        let leftovers: Vec<_> = std::fs::read_dir(store.root().join(user.as_str()))
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .filter(|n| n.starts_with('.'))
            .collect();
        assert!(leftovers.is_empty(), "leftovers: {leftovers:?}");
    }

    #[tokio::test]
    async fn records_are_isolated_per_user() {
        let (_dir, store) = test_store().await;
        let alice = UserId::new();
        let bob = UserId::new();
        let ctx = context(&alice, RecordType::Text);
        store.put(&ctx, b"alice only").await.unwrap();

        assert!(store.get(&bob, &ctx.id).await.unwrap_err().is_not_found());
        assert!(store.delete(&bob, &ctx.id).await.unwrap_err().is_not_found());
        assert!(store.get(&alice, &ctx.id).await.is_ok());
    }

    #[tokio::test]
    async fn delete_missing_record_is_not_found() {
        let (_dir, store) = test_store().await;
        let err = store
            .delete(&UserId::new(), &RecordId::new())
            .await
            .unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn listing_skips_malformed_metadata() {
        let (_dir, store) = test_store().await;
        let user = UserId::new();
        let good = context(&user, RecordType::Credentials);
        let bad = context(&user, RecordType::Text);
        store.put(&good, b"a").await.unwrap();
        store.put(&bad, b"b").await.unwrap();

        let bad_meta = store.record_dir(&user, &bad.id).unwrap().join(META_FILE);
        std::fs::write(&bad_meta, b"not rkyv").unwrap();

        let listed = store.list_contexts(&user).await.unwrap();
        assert_eq!(listed, vec![good]);
        assert!(matches!(
            store.get(&user, &bad.id).await,
            Err(StoreError::Decode(_))
        ));
    }

    #[tokio::test]
    async fn moved_record_is_rejected() {
        let (_dir, store) = test_store().await;
        let user = UserId::new();
        let a = context(&user, RecordType::Text);
        let b = context(&user, RecordType::Text);
        store.put(&a, b"a").await.unwrap();
        store.put(&b, b"b").await.unwrap();

        // Copy a's metadata over b's: the location no longer matches.
        let a_meta = store.record_dir(&user, &a.id).unwrap().join(META_FILE);
        let b_meta = store.record_dir(&user, &b.id).unwrap().join(META_FILE);
        std::fs::copy(a_meta, b_meta).unwrap();

        assert!(matches!(store.get(&user, &b.id).await, Err(StoreError::Decode(_))));
    }

    #[tokio::test]
    async fn invalid_ids_never_touch_disk() {
        let (_dir, store) = test_store().await;
        let user = UserId::new();
        let mut ctx = context(&user, RecordType::Text);
        ctx.id = serde_json::from_str("\"../escape\"").unwrap();

        assert!(matches!(
            store.put(&ctx, b"x").await,
            Err(StoreError::InvalidArgument(_))
        ));
        assert!(!store.root().parent().unwrap().join("escape").exists());
    }

    #[tokio::test]
    async fn open_sweeps_interrupted_writes() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("records");
        let user_dir = root.join("user-1");
        std::fs::create_dir_all(user_dir.join(".staging-abc")).unwrap();
        std::fs::create_dir_all(user_dir.join(".trash-def")).unwrap();

        FileRecordStore::open(&root).await.unwrap();

        assert!(!user_dir.join(".staging-abc").exists());
        assert!(!user_dir.join(".trash-def").exists());
    }

    #[tokio::test]
    async fn concurrent_writers_to_different_records() {
        let (_dir, store) = test_store().await;
        let store = Arc::new(store);
        let user = UserId::new();

        let mut handles = Vec::new();
        for i in 0..20u8 {
            let store = Arc::clone(&store);
            let ctx = context(&user, RecordType::Binary);
            handles.push(tokio::spawn(async move {
                store.put(&ctx, &[i; 32]).await.unwrap();
                ctx
            }));
        }
        for handle in handles {
            let ctx = handle.await.unwrap();
            assert!(store.get(&user, &ctx.id).await.is_ok());
        }
        assert_eq!(store.list_contexts(&user).await.unwrap().len(), 20);
        assert!(store.locks.is_empty());
    }

    #[tokio::test]
    async fn lock_map_only_tracks_in_flight_operations() {
        let (_dir, store) = test_store().await;
        let user = UserId::new();

        for _ in 0..1_000 {
            let missing = RecordId::new();
            assert!(store.get(&user, &missing).await.unwrap_err().is_not_found());
            assert!(store.get_context(&user, &missing).await.is_err());
        }
        for _ in 0..200 {
            store.put(&context(&user, RecordType::Text), b"x").await.unwrap();
        }
        assert!(store.delete(&user, &RecordId::new()).await.is_err());

        assert_eq!(store.locks.len(), 0);
        assert_eq!(store.list_contexts(&user).await.unwrap().len(), 200);
    }

    #[tokio::test]
    async fn waiting_writer_keeps_the_lock_alive_across_delete() {
        let (_dir, store) = test_store().await;
        let store = Arc::new(store);
        let user = UserId::new();
        let ctx = context(&user, RecordType::Text);
        store.put(&ctx, b"v1").await.unwrap();

        let record_dir = store.record_dir(&user, &ctx.id).unwrap();
        // Hold the record's lock the way an in-flight writer would.
        let held = store.lock_for(&record_dir);
        let guard = held.write().await;

        let deleter = {
            let store = Arc::clone(&store);
            let (user, id) = (user.clone(), ctx.id.clone());
            tokio::spawn(async move { store.delete(&user, &id).await })
        };
        tokio::task::yield_now().await;
        assert!(!deleter.is_finished());

        // Both the holder and the queued delete share the one map entry.
        assert_eq!(store.locks.len(), 1);

        drop(guard);
        deleter.await.unwrap().unwrap();
        store.release_lock(&record_dir, held);

        assert!(store.locks.is_empty());
        assert!(store.get(&user, &ctx.id).await.unwrap_err().is_not_found());
    }
}
