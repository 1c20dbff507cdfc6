//! Error types for the auth crate.
//!
//! [`AuthError::InvalidCredentials`] and [`AuthError::InvalidToken`] carry
//! no detail on purpose. Whatever went wrong is logged where it happened;
//! the caller only learns "not authorized".

use keeper_store::StoreError;
use keeper_vault::VaultError;

/// Unified error type for Keeper authentication.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    /// Registration attempted with a name that is already taken.
    #[error("user already exists: {name}")]
    UserExists {
        /// The contested user name.
        name: String,
    },

    /// Unknown user or wrong password. Deliberately undifferentiated.
    #[error("invalid credentials")]
    InvalidCredentials,

    /// Token signature, structure, or expiry check failed.
    #[error("invalid token")]
    InvalidToken,

    /// Registration input failed validation.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Issuer or service constructed with unusable settings.
    #[error("invalid configuration: {reason}")]
    InvalidConfig {
        /// What is wrong with the configuration.
        reason: String,
    },

    /// An error propagated from the user directory.
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// An error propagated from the password hasher.
    #[error("vault error: {0}")]
    Vault(#[from] VaultError),

    /// JSON serialization error while building a token.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A blocking hashing task was cancelled or panicked.
    #[error("background task failed: {0}")]
    TaskJoin(String),
}

impl AuthError {
    /// Whether this error should surface as "not authorized".
    pub fn is_unauthorized(&self) -> bool {
        matches!(self, Self::InvalidCredentials | Self::InvalidToken)
    }
}

impl From<tokio::task::JoinError> for AuthError {
    fn from(err: tokio::task::JoinError) -> Self {
        Self::TaskJoin(err.to_string())
    }
}

/// Convenience alias used throughout this crate.
pub type AuthResult<T> = std::result::Result<T, AuthError>;
