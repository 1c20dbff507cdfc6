//! Domain types shared by every Keeper crate.
//!
//! Identifiers are opaque newtypes over UUID v7 strings. [`RecordContext`]
//! is the non-secret metadata that sits next to each encrypted payload and
//! is persisted with a fixed binary encoding (see [`encode_context`]).

use rkyv::Archive;
use rkyv::rancor;
use rkyv::util::AlignedVec;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{StoreError, StoreResult};

// ═══════════════════════════════════════════════════════════════════════
//  Identifiers
// ═══════════════════════════════════════════════════════════════════════

/// Whether `s` is usable as a single path component in the record store.
///
/// Only `[A-Za-z0-9_-]` is accepted, which rules out separators, `.`/`..`,
/// and hidden staging entries.
pub fn is_valid_id(s: &str) -> bool {
    !s.is_empty()
        && s.len() <= 128
        && s.bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_')
}

macro_rules! opaque_id {
    ($(#[$meta:meta])* $name:ident, $entity:literal) => {
        $(#[$meta])*
        #[derive(
            Debug,
            Clone,
            PartialEq,
            Eq,
            Hash,
            PartialOrd,
            Ord,
            Serialize,
            Deserialize,
            Archive,
            rkyv::Serialize,
            rkyv::Deserialize,
        )]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Generate a fresh identifier (UUID v7).
            pub fn new() -> Self {
                Self(Uuid::now_v7().to_string())
            }

            /// Parse an identifier received from outside the process.
            pub fn parse(s: &str) -> StoreResult<Self> {
                if is_valid_id(s) {
                    Ok(Self(s.to_string()))
                } else {
                    Err(StoreError::InvalidArgument(format!(
                        concat!("invalid ", $entity, " id: {:?}"),
                        s
                    )))
                }
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(&self.0)
            }
        }
    };
}

opaque_id!(
    /// Stable identity of a registered user.
    UserId,
    "user"
);

opaque_id!(
    /// Identity of a single stored record, unique within its owner.
    RecordId,
    "record"
);

// ═══════════════════════════════════════════════════════════════════════
//  Users
// ═══════════════════════════════════════════════════════════════════════

/// A registered user as held by a user directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    /// Assigned at registration, never changes.
    pub id: UserId,
    /// Unique login name.
    pub name: String,
    /// Output of the password hasher; never the plaintext.
    pub password_hash: String,
}

// ═══════════════════════════════════════════════════════════════════════
//  Records
// ═══════════════════════════════════════════════════════════════════════

/// Which payload variant a record holds.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    Archive,
    rkyv::Serialize,
    rkyv::Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum RecordType {
    /// Free text.
    Text,
    /// Raw bytes, typically an uploaded file.
    Binary,
    /// Username and password pair.
    Credentials,
    /// Payment card.
    #[serde(rename = "bank")]
    BankCard,
}

impl RecordType {
    /// The persisted tag string.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Binary => "binary",
            Self::Credentials => "credentials",
            Self::BankCard => "bank",
        }
    }

    /// Parse a tag string.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "text" => Some(Self::Text),
            "binary" => Some(Self::Binary),
            "credentials" => Some(Self::Credentials),
            "bank" => Some(Self::BankCard),
            _ => None,
        }
    }
}

impl std::fmt::Display for RecordType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Non-secret metadata describing one record.
#[derive(
    Debug,
    Clone,
    PartialEq,
    Eq,
    Serialize,
    Deserialize,
    Archive,
    rkyv::Serialize,
    rkyv::Deserialize,
)]
pub struct RecordContext {
    pub id: RecordId,
    pub user_id: UserId,
    pub title: String,
    pub meta: String,
    #[serde(rename = "type")]
    pub record_type: RecordType,
}

// ═══════════════════════════════════════════════════════════════════════
//  Metadata encoding
// ═══════════════════════════════════════════════════════════════════════

/// Leading byte of every encoded `meta` blob.
pub const META_FORMAT_VERSION: u8 = 1;

/// Encode a context as `[version byte | rkyv archive]`.
pub fn encode_context(ctx: &RecordContext) -> StoreResult<Vec<u8>> {
    let archived = rkyv::to_bytes::<rancor::Error>(ctx)
        .map_err(|e| StoreError::Decode(format!("failed to encode record context: {e}")))?;

    let mut out = Vec::with_capacity(1 + archived.len());
    out.push(META_FORMAT_VERSION);
    out.extend_from_slice(&archived);
    Ok(out)
}

/// Decode a `meta` blob written by [`encode_context`].
///
/// The archive is validated before use, so truncated or foreign bytes yield
/// [`StoreError::Decode`] rather than garbage.
pub fn decode_context(bytes: &[u8]) -> StoreResult<RecordContext> {
    let Some((&version, body)) = bytes.split_first() else {
        return Err(StoreError::Decode("empty metadata blob".into()));
    };
    if version != META_FORMAT_VERSION {
        return Err(StoreError::Decode(format!(
            "unsupported metadata format version {version}"
        )));
    }

    // rkyv requires the archive to be aligned; file reads give no guarantee.
    let mut aligned = AlignedVec::<16>::with_capacity(body.len());
    aligned.extend_from_slice(body);

    rkyv::from_bytes::<RecordContext, rancor::Error>(&aligned)
        .map_err(|e| StoreError::Decode(format!("failed to decode record context: {e}")))
}

// ═══════════════════════════════════════════════════════════════════════
//  Tests
// ═══════════════════════════════════════════════════════════════════════
