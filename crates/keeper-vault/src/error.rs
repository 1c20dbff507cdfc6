//! Vault error types.
//!
//! Both cryptographic subsystems surface errors through [`VaultError`].
//! Decryption failures deliberately carry no detail about *why*
//! authentication failed: a wrong key and a flipped byte look the same.

/// Unified error type for the Keeper cryptography crate.
#[derive(Debug, thiserror::Error)]
pub enum VaultError {
    // -- Cipher errors ------------------------------------------------------
    /// Encryption failed (ring internal error, RNG failure).
    #[error("encryption failed: {reason}")]
    EncryptionFailed { reason: String },

    /// Decryption failed: wrong key, truncated blob, or tampered ciphertext.
    #[error("decryption failed")]
    DecryptionFailed,

    /// Key material was rejected (empty secret, wrong length).
    #[error("invalid key: {reason}")]
    InvalidKey { reason: String },

    // -- Password hashing errors -------------------------------------------
    /// Salt generation or parameter setup failed while hashing a password.
    #[error("password hashing failed: {reason}")]
    HashingFailed { reason: String },

    /// A stored password hash string could not be parsed.
    #[error("malformed password hash: {reason}")]
    MalformedHash { reason: String },
}

/// Convenience alias used throughout the vault crate.
pub type Result<T> = std::result::Result<T, VaultError>;
