//! At-rest cryptography for the Keeper secrets vault.
//!
//! Everything a record payload goes through before it touches disk, and
//! everything a password goes through before it touches the user directory.
//!
//! # Modules
//!
//! - [`crypto`]: AES-256-GCM [`Cipher`] with per-call random nonces.
//! - [`password`]: PBKDF2-HMAC-SHA256 [`PasswordHasher`].
//! - [`error`]: Unified error types.
//!
//! # Quick Start
//!
//! ```rust
//! use keeper_vault::{Cipher, PasswordHasher};
//!
//! # fn example() -> keeper_vault::Result<()> {
//! let cipher = Cipher::from_secret(b"configured long-term secret")?;
//! let sealed = cipher.encrypt(b"hunter2")?;
//! assert_eq!(cipher.decrypt(&sealed)?, b"hunter2");
//!
//! let hasher = PasswordHasher::with_iterations(1_000);
//! let stored = hasher.hash("password123")?;
//! assert!(hasher.verify("password123", &stored)?);
//! # Ok(())
//! # }
//! # example().unwrap();
//! ```

pub mod crypto;
pub mod error;
pub mod password;

pub use crypto::Cipher;
pub use error::{Result, VaultError};
pub use password::PasswordHasher;
