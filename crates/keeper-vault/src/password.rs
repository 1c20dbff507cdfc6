//! One-way password hashing via PBKDF2-HMAC-SHA256 (ring).
//!
//! Hashes are stored as self-describing strings:
//!
//! ```text
//! pbkdf2-sha256$<iterations>$base64(salt)$base64(hash)
//! ```
//!
//! The iteration count travels with the hash, so raising the default only
//! affects newly registered users. Verification goes through
//! `ring::pbkdf2::verify`, which compares in constant time.

use std::num::NonZeroU32;

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use ring::pbkdf2;
use ring::rand::{SecureRandom, SystemRandom};

use crate::error::{Result, VaultError};

/// PBKDF2-HMAC-SHA256 with 600,000 iterations (OWASP 2023).
pub const DEFAULT_ITERATIONS: u32 = 600_000;

/// Salt length in bytes.
const SALT_LEN: usize = 32;

/// Derived key length in bytes.
const HASH_LEN: usize = 32;

/// Scheme tag at the front of every stored hash.
const SCHEME: &str = "pbkdf2-sha256";

/// PBKDF2 algorithm.
static PBKDF2_ALG: pbkdf2::Algorithm = pbkdf2::PBKDF2_HMAC_SHA256;

/// Salted one-way password hasher.
#[derive(Debug, Clone)]
pub struct PasswordHasher {
    iterations: NonZeroU32,
    rng: SystemRandom,
}

impl Default for PasswordHasher {
    fn default() -> Self {
        Self::with_iterations(DEFAULT_ITERATIONS)
    }
}

impl PasswordHasher {
    /// Create a hasher with the production iteration count.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a hasher with a custom iteration count (clamped to at least 1).
    pub fn with_iterations(iterations: u32) -> Self {
        Self {
            iterations: NonZeroU32::new(iterations).unwrap_or(NonZeroU32::MIN),
            rng: SystemRandom::new(),
        }
    }

    /// Hash `password` with a fresh random salt.
    ///
    /// # Errors
    ///
    /// Returns [`VaultError::HashingFailed`] if salt generation fails.
    pub fn hash(&self, password: &str) -> Result<String> {
        let mut salt = [0u8; SALT_LEN];
        self.rng
            .fill(&mut salt)
            .map_err(|_| VaultError::HashingFailed {
                reason: "failed to generate random salt".into(),
            })?;

        let mut hash = [0u8; HASH_LEN];
        pbkdf2::derive(PBKDF2_ALG, self.iterations, &salt, password.as_bytes(), &mut hash);

        Ok(format!(
            "{SCHEME}${}${}${}",
            self.iterations,
            BASE64.encode(salt),
            BASE64.encode(hash)
        ))
    }

    /// Check `password` against a stored hash string.
    ///
    /// Returns `Ok(false)` on mismatch; `Err` only when `stored` itself is
    /// unreadable.
    pub fn verify(&self, password: &str, stored: &str) -> Result<bool> {
        let parsed = ParsedHash::parse(stored)?;
        Ok(pbkdf2::verify(
            PBKDF2_ALG,
            parsed.iterations,
            &parsed.salt,
            password.as_bytes(),
            &parsed.hash,
        )
        .is_ok())
    }
}

struct ParsedHash {
    iterations: NonZeroU32,
    salt: Vec<u8>,
    hash: Vec<u8>,
}

impl ParsedHash {
    fn parse(stored: &str) -> Result<Self> {
        let malformed = |reason: &str| VaultError::MalformedHash {
            reason: reason.to_string(),
        };

        let mut parts = stored.split('$');
        let (Some(scheme), Some(iterations), Some(salt), Some(hash), None) = (
            parts.next(),
            parts.next(),
            parts.next(),
            parts.next(),
            parts.next(),
        ) else {
            return Err(malformed("expected four '$'-separated fields"));
        };

        if scheme != SCHEME {
            return Err(malformed("unknown hash scheme"));
        }

        let iterations = iterations
            .parse::<u32>()
            .ok()
            .and_then(NonZeroU32::new)
            .ok_or_else(|| malformed("invalid iteration count"))?;
        let salt = BASE64
            .decode(salt)
            .map_err(|e| malformed(&format!("invalid salt encoding: {e}")))?;
        let hash = BASE64
            .decode(hash)
            .map_err(|e| malformed(&format!("invalid hash encoding: {e}")))?;

        Ok(Self {
            iterations,
            salt,
            hash,
        })
    }
}
