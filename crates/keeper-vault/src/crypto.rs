//! AES-256-GCM record encryption using the `ring` crate.
//!
//! A [`Cipher`] owns the process-wide symmetric key. It is built once at
//! startup from a configured long-term secret (SHA-256 of the secret gives
//! the 256-bit key) and shared read-only between request handlers.
//!
//! # Sealed blob layout
//!
//! ```text
//! [ nonce (12 bytes) | ciphertext | GCM tag (16 bytes) ]
//! ```
//!
//! Every call to [`Cipher::seal`] draws a fresh random 96-bit nonce and
//! prefixes it to the output, so [`Cipher::open`] needs nothing but the
//! blob itself. With random nonces the collision probability stays
//! negligible for up to ~2^32 encryptions under one key.

use ring::aead::{
    self, Aad, BoundKey, NONCE_LEN, Nonce, NonceSequence, OpeningKey, SealingKey, UnboundKey,
};
use ring::digest;
use ring::rand::{SecureRandom, SystemRandom};

use crate::error::{Result, VaultError};

/// Length of the AES-256-GCM key in bytes.
pub const KEY_LEN: usize = 32;

/// Length of the AES-256-GCM nonce in bytes (96 bits).
pub const NONCE_LEN_BYTES: usize = NONCE_LEN;

/// AES-256-GCM algorithm from `ring`.
static AEAD_ALG: &aead::Algorithm = &aead::AES_256_GCM;

// ---------------------------------------------------------------------------
// Nonce handling
// ---------------------------------------------------------------------------

/// A nonce sequence that yields exactly one nonce and then errors.
///
/// `ring` binds a [`NonceSequence`] to each sealing/opening key; building a
/// key per call with a single-use sequence guarantees a nonce is never
/// advanced into reuse.
struct SingleNonce(Option<[u8; NONCE_LEN_BYTES]>);

impl SingleNonce {
    fn new(bytes: [u8; NONCE_LEN_BYTES]) -> Self {
        Self(Some(bytes))
    }
}

impl NonceSequence for SingleNonce {
    fn advance(&mut self) -> std::result::Result<Nonce, ring::error::Unspecified> {
        self.0
            .take()
            .map(Nonce::assume_unique_for_key)
            .ok_or(ring::error::Unspecified)
    }
}

// ---------------------------------------------------------------------------
// Cipher
// ---------------------------------------------------------------------------

/// Authenticated symmetric cipher holding the at-rest encryption key.
///
/// Cheap to clone; the key is plain bytes and the RNG is stateless.
#[derive(Clone)]
pub struct Cipher {
    key: [u8; KEY_LEN],
    rng: SystemRandom,
}

impl std::fmt::Debug for Cipher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Cipher").field("key", &"<redacted>").finish()
    }
}

impl Cipher {
    /// Build a cipher from raw 256-bit key material.
    ///
    /// # Errors
    ///
    /// Returns [`VaultError::InvalidKey`] if `key` is not exactly
    /// [`KEY_LEN`] bytes.
    pub fn new(key: &[u8]) -> Result<Self> {
        let key: [u8; KEY_LEN] = key.try_into().map_err(|_| VaultError::InvalidKey {
            reason: format!("key must be {} bytes, got {}", KEY_LEN, key.len()),
        })?;

        Ok(Self {
            key,
            rng: SystemRandom::new(),
        })
    }

    /// Derive the key from a long-term `secret` via SHA-256.
    ///
    /// # Errors
    ///
    /// Returns [`VaultError::InvalidKey`] if the secret is empty.
    pub fn from_secret(secret: &[u8]) -> Result<Self> {
        if secret.is_empty() {
            return Err(VaultError::InvalidKey {
                reason: "encryption secret must not be empty".into(),
            });
        }

        let digest = digest::digest(&digest::SHA256, secret);
        tracing::debug!("derived record encryption key from configured secret");
        Self::new(digest.as_ref())
    }

    /// Encrypt `plaintext` with no associated data.
    pub fn encrypt(&self, plaintext: &[u8]) -> Result<Vec<u8>> {
        self.seal(plaintext, &[])
    }

    /// Decrypt a blob produced by [`Cipher::encrypt`].
    pub fn decrypt(&self, sealed: &[u8]) -> Result<Vec<u8>> {
        self.open(sealed, &[])
    }

    /// Encrypt `plaintext`, authenticating `aad` alongside it.
    ///
    /// Returns `nonce || ciphertext || tag`.
    ///
    /// # Errors
    ///
    /// Returns [`VaultError::EncryptionFailed`] if nonce generation or
    /// sealing fails.
    pub fn seal(&self, plaintext: &[u8], aad: &[u8]) -> Result<Vec<u8>> {
        let mut nonce_bytes = [0u8; NONCE_LEN_BYTES];
        self.rng
            .fill(&mut nonce_bytes)
            .map_err(|_| VaultError::EncryptionFailed {
                reason: "failed to generate random nonce".into(),
            })?;

        let unbound_key =
            UnboundKey::new(AEAD_ALG, &self.key).map_err(|_| VaultError::EncryptionFailed {
                reason: "failed to create AES-256-GCM key".into(),
            })?;
        let mut sealing_key = SealingKey::new(unbound_key, SingleNonce::new(nonce_bytes));

        let mut out = Vec::with_capacity(NONCE_LEN_BYTES + plaintext.len() + AEAD_ALG.tag_len());
        out.extend_from_slice(&nonce_bytes);
        let mut in_out = plaintext.to_vec();
        sealing_key
            .seal_in_place_append_tag(Aad::from(aad), &mut in_out)
            .map_err(|_| VaultError::EncryptionFailed {
                reason: "seal_in_place failed".into(),
            })?;
        out.extend_from_slice(&in_out);

        tracing::trace!(
            plaintext_len = plaintext.len(),
            sealed_len = out.len(),
            "sealed payload"
        );

        Ok(out)
    }

    /// Decrypt a sealed blob, checking it was sealed with the same `aad`.
    ///
    /// # Errors
    ///
    /// Returns [`VaultError::DecryptionFailed`] if the blob is too short to
    /// hold a nonce and tag, or if authentication fails for any reason.
    pub fn open(&self, sealed: &[u8], aad: &[u8]) -> Result<Vec<u8>> {
        if sealed.len() < NONCE_LEN_BYTES + AEAD_ALG.tag_len() {
            tracing::debug!(sealed_len = sealed.len(), "sealed blob too short");
            return Err(VaultError::DecryptionFailed);
        }

        let (nonce_part, ciphertext) = sealed.split_at(NONCE_LEN_BYTES);
        let mut nonce = [0u8; NONCE_LEN_BYTES];
        nonce.copy_from_slice(nonce_part);

        let unbound_key =
            UnboundKey::new(AEAD_ALG, &self.key).map_err(|_| VaultError::DecryptionFailed)?;
        let mut opening_key = OpeningKey::new(unbound_key, SingleNonce::new(nonce));

        let mut in_out = ciphertext.to_vec();
        let plaintext = opening_key
            .open_in_place(Aad::from(aad), &mut in_out)
            .map_err(|_| VaultError::DecryptionFailed)?;

        tracing::trace!(
            sealed_len = sealed.len(),
            plaintext_len = plaintext.len(),
            "opened payload"
        );

        Ok(plaintext.to_vec())
    }
}

// ---------------------------------------------------------------------------
// Random bytes
// ---------------------------------------------------------------------------

/// Generate `len` cryptographically secure random bytes.
///
/// # Errors
///
/// Returns [`VaultError::EncryptionFailed`] if the system CSPRNG fails.
pub fn random_bytes(len: usize) -> Result<Vec<u8>> {
    let rng = SystemRandom::new();
    let mut buf = vec![0u8; len];
    rng.fill(&mut buf)
        .map_err(|_| VaultError::EncryptionFailed {
            reason: "failed to generate random bytes".into(),
        })?;
    Ok(buf)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn test_cipher() -> Cipher {
        Cipher::new(&random_bytes(KEY_LEN).unwrap()).unwrap()
    }

    #[test]
    fn encrypt_decrypt_roundtrip() {
        let cipher = test_cipher();
        let plaintext = b"hello, keeper vault!";

        let sealed = cipher.encrypt(plaintext).unwrap();
        let decrypted = cipher.decrypt(&sealed).unwrap();

        assert_eq!(decrypted, plaintext);
    }

    #[test]
    fn sealed_blob_is_nonce_prefixed() {
        let cipher = test_cipher();
        let sealed = cipher.encrypt(b"abc").unwrap();
        assert_eq!(sealed.len(), NONCE_LEN_BYTES + 3 + AEAD_ALG.tag_len());
    }

    #[test]
    fn same_plaintext_encrypts_differently() {
        let cipher = test_cipher();
        let a = cipher.encrypt(b"same input").unwrap();
        let b = cipher.encrypt(b"same input").unwrap();

        assert_ne!(a[..NONCE_LEN_BYTES], b[..NONCE_LEN_BYTES]);
        assert_ne!(a, b);
    }

    #[test]
    fn decrypt_with_wrong_key_fails() {
        let sealed = test_cipher().encrypt(b"secret data").unwrap();
        let result = test_cipher().decrypt(&sealed);
        assert!(matches!(result, Err(VaultError::DecryptionFailed)));
    }

    #[test]
    fn any_flipped_byte_is_detected() {
        let cipher = test_cipher();
        let sealed = cipher.encrypt(b"secret data").unwrap();

        for i in 0..sealed.len() {
            let mut tampered = sealed.clone();
            tampered[i] ^= 0x01;
            assert!(
                cipher.decrypt(&tampered).is_err(),
                "tampering at byte {i} went undetected"
            );
        }
    }

    #[test]
    fn truncated_blob_rejected() {
        let cipher = test_cipher();
        assert!(matches!(
            cipher.decrypt(&[0u8; 10]),
            Err(VaultError::DecryptionFailed)
        ));
    }

    #[test]
    fn mismatched_aad_fails() {
        let cipher = test_cipher();
        let sealed = cipher.seal(b"payload", b"user/record-a").unwrap();

        assert_eq!(cipher.open(&sealed, b"user/record-a").unwrap(), b"payload");
        assert!(cipher.open(&sealed, b"user/record-b").is_err());
    }

    #[test]
    fn invalid_key_length_rejected() {
        let result = Cipher::new(&[0u8; 16]);
        assert!(matches!(result, Err(VaultError::InvalidKey { .. })));
    }

    #[test]
    fn secret_derivation_is_deterministic() {
        let a = Cipher::from_secret(b"long-term secret").unwrap();
        let b = Cipher::from_secret(b"long-term secret").unwrap();

        let sealed = a.encrypt(b"portable").unwrap();
        assert_eq!(b.decrypt(&sealed).unwrap(), b"portable");
    }

    #[test]
    fn empty_secret_rejected() {
        assert!(matches!(
            Cipher::from_secret(b""),
            Err(VaultError::InvalidKey { .. })
        ));
    }

    #[test]
    fn debug_output_redacts_key() {
        let rendered = format!("{:?}", test_cipher());
        assert!(rendered.contains("<redacted>"));
    }

    #[test]
    fn empty_plaintext_roundtrip() {
        let cipher = test_cipher();
        let sealed = cipher.encrypt(b"").unwrap();
        assert!(cipher.decrypt(&sealed).unwrap().is_empty());
    }

    #[test]
    fn large_plaintext_roundtrip() {
        let cipher = test_cipher();
        let plaintext = vec![0xAB_u8; 1_000_000];

        let sealed = cipher.encrypt(&plaintext).unwrap();
        assert_eq!(cipher.decrypt(&sealed).unwrap(), plaintext);
    }
}
