//! The keeper service: encode, encrypt, store, and the reverse.
//!
//! Every typed operation funnels through one pipeline:
//!
//! ```text
//! set:  Payload -> to_bytes -> Cipher::seal(aad) -> RecordStore::put
//! get:  RecordStore::get -> tag check -> Cipher::open(aad) -> from_bytes
//! ```
//!
//! The associated data is `owner/record/type`, so a ciphertext copied into
//! another record (or relabelled with another type) fails authentication.

use std::sync::Arc;

use tracing::{debug, instrument, warn};

use keeper_store::{RecordContext, RecordId, RecordStore, RecordType, UserId};
use keeper_vault::Cipher;

use crate::error::{KeeperError, KeeperResult};
use crate::payload::{BankCard, Credentials, Payload, PayloadKind};

/// A decrypted value together with the metadata it was stored under.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Secret<P> {
    pub context: RecordContext,
    pub value: P,
}

/// Stateless orchestrator over a [`RecordStore`] and a [`Cipher`].
#[derive(Clone)]
pub struct KeeperService {
    store: Arc<dyn RecordStore>,
    cipher: Arc<Cipher>,
}

impl KeeperService {
    pub fn new(store: Arc<dyn RecordStore>, cipher: Arc<Cipher>) -> Self {
        Self { store, cipher }
    }

    // ── generic pipeline ─────────────────────────────────────────────

    /// Store `value` as a new record and return its id.
    pub async fn set<P: PayloadKind>(
        &self,
        owner: &UserId,
        title: &str,
        meta: &str,
        value: P,
    ) -> KeeperResult<RecordId> {
        self.set_payload(owner, title, meta, value.into_payload())
            .await
    }

    /// Store an untyped payload as a new record and return its id.
    #[instrument(skip(self, title, meta, payload), fields(record_type = %payload.record_type()))]
    pub async fn set_payload(
        &self,
        owner: &UserId,
        title: &str,
        meta: &str,
        payload: Payload,
    ) -> KeeperResult<RecordId> {
        let context = RecordContext {
            id: RecordId::new(),
            user_id: owner.clone(),
            title: title.to_string(),
            meta: meta.to_string(),
            record_type: payload.record_type(),
        };

        let plaintext = payload.to_bytes()?;
        let sealed = self.cipher.seal(&plaintext, &associated_data(&context))?;
        self.store.put(&context, &sealed).await?;

        debug!(record_id = %context.id, "record created");
        Ok(context.id)
    }

    /// Fetch a record as the type `P`.
    ///
    /// Fails with [`KeeperError::Decode`] if the record holds another kind.
    pub async fn get<P: PayloadKind>(
        &self,
        owner: &UserId,
        id: &RecordId,
    ) -> KeeperResult<Secret<P>> {
        let secret = self.fetch(owner, id, Some(P::RECORD_TYPE)).await?;
        let value = P::from_payload(secret.value).ok_or(KeeperError::Decode)?;
        Ok(Secret {
            context: secret.context,
            value,
        })
    }

    /// Fetch a record whatever its kind.
    pub async fn get_record(&self, owner: &UserId, id: &RecordId) -> KeeperResult<Secret<Payload>> {
        self.fetch(owner, id, None).await
    }

    #[instrument(skip(self))]
    async fn fetch(
        &self,
        owner: &UserId,
        id: &RecordId,
        expected: Option<RecordType>,
    ) -> KeeperResult<Secret<Payload>> {
        let (context, sealed) = self.store.get(owner, id).await?;

        if let Some(expected) = expected
            && context.record_type != expected
        {
            warn!(
                stored = %context.record_type,
                %expected,
                "record type does not match requested kind"
            );
            return Err(KeeperError::Decode);
        }

        let plaintext = self
            .cipher
            .open(&sealed, &associated_data(&context))
            .map_err(|_| {
                warn!("record failed authentication");
                KeeperError::Decode
            })?;

        let value = Payload::from_bytes(context.record_type, plaintext)?;
        Ok(Secret { context, value })
    }

    // ── typed conveniences ───────────────────────────────────────────

    pub async fn set_text(
        &self,
        owner: &UserId,
        title: &str,
        meta: &str,
        text: String,
    ) -> KeeperResult<RecordId> {
        self.set(owner, title, meta, text).await
    }

    pub async fn get_text(&self, owner: &UserId, id: &RecordId) -> KeeperResult<Secret<String>> {
        self.get(owner, id).await
    }

    pub async fn set_binary(
        &self,
        owner: &UserId,
        title: &str,
        meta: &str,
        bytes: Vec<u8>,
    ) -> KeeperResult<RecordId> {
        self.set(owner, title, meta, bytes).await
    }

    pub async fn get_binary(&self, owner: &UserId, id: &RecordId) -> KeeperResult<Secret<Vec<u8>>> {
        self.get(owner, id).await
    }

    pub async fn set_credentials(
        &self,
        owner: &UserId,
        title: &str,
        meta: &str,
        credentials: Credentials,
    ) -> KeeperResult<RecordId> {
        self.set(owner, title, meta, credentials).await
    }

    pub async fn get_credentials(
        &self,
        owner: &UserId,
        id: &RecordId,
    ) -> KeeperResult<Secret<Credentials>> {
        self.get(owner, id).await
    }

    pub async fn set_bank_card(
        &self,
        owner: &UserId,
        title: &str,
        meta: &str,
        card: BankCard,
    ) -> KeeperResult<RecordId> {
        self.set(owner, title, meta, card).await
    }

    pub async fn get_bank_card(
        &self,
        owner: &UserId,
        id: &RecordId,
    ) -> KeeperResult<Secret<BankCard>> {
        self.get(owner, id).await
    }

    // ── passthroughs ─────────────────────────────────────────────────

    /// Metadata of every record `owner` holds. Empty if there are none.
    #[instrument(skip(self))]
    pub async fn list_all(&self, owner: &UserId) -> KeeperResult<Vec<RecordContext>> {
        match self.store.list_contexts(owner).await {
            Ok(contexts) => Ok(contexts),
            Err(e) if e.is_not_found() => Ok(Vec::new()),
            Err(e) => Err(e.into()),
        }
    }

    /// Metadata of one record, without touching its payload.
    pub async fn get_context(&self, owner: &UserId, id: &RecordId) -> KeeperResult<RecordContext> {
        Ok(self.store.get_context(owner, id).await?)
    }

    /// Remove a record. Fails with [`KeeperError::NotFound`] if absent.
    #[instrument(skip(self))]
    pub async fn delete(&self, owner: &UserId, id: &RecordId) -> KeeperResult<()> {
        self.store.delete(owner, id).await?;
        debug!("record removed");
        Ok(())
    }
}

fn associated_data(context: &RecordContext) -> Vec<u8> {
    format!(
        "{}/{}/{}",
        context.user_id, context.id, context.record_type
    )
    .into_bytes()
}
