//! Error types for the keeper service.

use keeper_store::StoreError;
use keeper_vault::VaultError;

/// Unified error type for record operations.
#[derive(Debug, thiserror::Error)]
pub enum KeeperError {
    /// The owner has no such record.
    #[error("record not found: {id}")]
    NotFound {
        /// The requested record id.
        id: String,
    },

    /// The stored record could not be turned back into the requested value.
    ///
    /// Covers corrupt metadata, failed authentication of the ciphertext,
    /// and a type tag that does not match the requested variant. The
    /// cause is logged, never carried.
    #[error("failed to decode record")]
    Decode,

    /// Caller input was rejected (malformed id).
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// A payload could not be serialized before encryption.
    #[error("failed to encode payload: {0}")]
    Encode(#[from] serde_json::Error),

    /// Encryption failed.
    #[error("vault error: {0}")]
    Vault(#[from] VaultError),

    /// Any other storage failure (I/O, background task).
    #[error("store error: {0}")]
    Store(StoreError),
}

impl From<StoreError> for KeeperError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound { id, .. } => Self::NotFound { id },
            StoreError::Decode(_) => Self::Decode,
            StoreError::InvalidArgument(msg) => Self::InvalidArgument(msg),
            other => Self::Store(other),
        }
    }
}

impl KeeperError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

/// Convenience alias used throughout this crate.
pub type KeeperResult<T> = std::result::Result<T, KeeperError>;
