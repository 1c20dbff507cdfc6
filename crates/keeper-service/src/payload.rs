//! Typed record payloads and their plaintext encodings.
//!
//! | Variant       | Tag           | Plaintext bytes        |
//! |---------------|---------------|------------------------|
//! | `Text`        | `text`        | UTF-8                  |
//! | `Binary`      | `binary`      | raw, unchanged         |
//! | `Credentials` | `credentials` | JSON object            |
//! | `BankCard`    | `bank`        | JSON object            |

use serde::{Deserialize, Serialize};

use keeper_store::RecordType;

use crate::error::{KeeperError, KeeperResult};

/// A login and password pair.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// A payment card.
///
/// The CVV is a string so leading zeros survive.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BankCard {
    pub number: String,
    pub holder: String,
    pub cvv: String,
}

impl std::fmt::Debug for BankCard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BankCard")
            .field("number", &"<redacted>")
            .field("holder", &self.holder)
            .field("cvv", &"<redacted>")
            .finish()
    }
}

/// Every kind of secret a record can hold.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Payload {
    Text(String),
    Binary(Vec<u8>),
    Credentials(Credentials),
    BankCard(BankCard),
}

impl Payload {
    /// The type tag persisted with this payload.
    pub fn record_type(&self) -> RecordType {
        match self {
            Self::Text(_) => RecordType::Text,
            Self::Binary(_) => RecordType::Binary,
            Self::Credentials(_) => RecordType::Credentials,
            Self::BankCard(_) => RecordType::BankCard,
        }
    }

    /// Plaintext bytes to encrypt.
    pub fn to_bytes(&self) -> KeeperResult<Vec<u8>> {
        Ok(match self {
            Self::Text(text) => text.as_bytes().to_vec(),
            Self::Binary(bytes) => bytes.clone(),
            Self::Credentials(creds) => serde_json::to_vec(creds)?,
            Self::BankCard(card) => serde_json::to_vec(card)?,
        })
    }

    /// Rebuild a payload from decrypted bytes and the record's type tag.
    pub fn from_bytes(record_type: RecordType, bytes: Vec<u8>) -> KeeperResult<Self> {
        let decode_failed = |reason: &str| {
            tracing::warn!(%record_type, reason, "decrypted payload did not decode");
            KeeperError::Decode
        };

        match record_type {
            RecordType::Text => String::from_utf8(bytes)
                .map(Self::Text)
                .map_err(|_| decode_failed("invalid UTF-8")),
            RecordType::Binary => Ok(Self::Binary(bytes)),
            RecordType::Credentials => serde_json::from_slice(&bytes)
                .map(Self::Credentials)
                .map_err(|_| decode_failed("invalid credentials JSON")),
            RecordType::BankCard => serde_json::from_slice(&bytes)
                .map(Self::BankCard)
                .map_err(|_| decode_failed("invalid bank card JSON")),
        }
    }
}

/// A concrete value type that maps onto exactly one [`Payload`] variant.
pub trait PayloadKind: Sized + Send {
    /// The tag records of this kind are stored under.
    const RECORD_TYPE: RecordType;

    fn into_payload(self) -> Payload;

    /// `None` if `payload` is a different variant.
    fn from_payload(payload: Payload) -> Option<Self>;
}

macro_rules! payload_kind {
    ($ty:ty, $variant:ident, $tag:expr) => {
        impl PayloadKind for $ty {
            const RECORD_TYPE: RecordType = $tag;

            fn into_payload(self) -> Payload {
                Payload::$variant(self)
            }

            fn from_payload(payload: Payload) -> Option<Self> {
                match payload {
                    Payload::$variant(value) => Some(value),
                    _ => None,
                }
            }
        }
    };
}

payload_kind!(String, Text, RecordType::Text);
payload_kind!(Vec<u8>, Binary, RecordType::Binary);
payload_kind!(Credentials, Credentials, RecordType::Credentials);
payload_kind!(BankCard, BankCard, RecordType::BankCard);

#[cfg(test)]
mod tests {
    use super::*;

    fn samples() -> Vec<Payload> {
        vec![
            Payload::Text("remember the milk ✓".into()),
            Payload::Binary(vec![0, 159, 146, 150, 255]),
            Payload::Credentials(Credentials {
                username: "a@x.com".into(),
                password: "hunter2".into(),
            }),
            Payload::BankCard(BankCard {
                number: "4111111111111111".into(),
                holder: "ALICE SMITH".into(),
                cvv: "012".into(),
            }),
        ]
    }

    #[test]
    fn every_variant_decodes_under_its_own_tag() {
        for payload in samples() {
            let bytes = payload.to_bytes().unwrap();
            let back = Payload::from_bytes(payload.record_type(), bytes).unwrap();
            assert_eq!(back, payload);
        }
    }

    #[test]
    fn binary_and_text_are_not_reencoded() {
        assert_eq!(Payload::Binary(vec![1, 2, 3]).to_bytes().unwrap(), vec![1, 2, 3]);
        assert_eq!(Payload::Text("hi".into()).to_bytes().unwrap(), b"hi");
    }

    #[test]
    fn cvv_keeps_leading_zero() {
        let card = Payload::BankCard(BankCard {
            number: "1".into(),
            holder: "h".into(),
            cvv: "007".into(),
        });
        let json: serde_json::Value = serde_json::from_slice(&card.to_bytes().unwrap()).unwrap();
        assert_eq!(json["cvv"], "007");
    }

    #[test]
    fn wrong_shape_is_a_decode_error() {
        assert!(matches!(
            Payload::from_bytes(RecordType::Text, vec![0xff, 0xfe]),
            Err(KeeperError::Decode)
        ));
        assert!(matches!(
            Payload::from_bytes(RecordType::Credentials, b"\"just a string\"".to_vec()),
            Err(KeeperError::Decode)
        ));
        assert!(matches!(
            Payload::from_bytes(RecordType::BankCard, b"{}".to_vec()),
            Err(KeeperError::Decode)
        ));
    }

    #[test]
    fn payload_kind_rejects_other_variants() {
        assert_eq!(String::from_payload(Payload::Text("t".into())), Some("t".into()));
        assert_eq!(String::from_payload(Payload::Binary(vec![])), None);
        assert_eq!(<Vec<u8>>::RECORD_TYPE, RecordType::Binary);
        assert_eq!(BankCard::RECORD_TYPE, RecordType::BankCard);
    }

    #[test]
    fn debug_output_hides_secrets() {
        let creds = Credentials {
            username: "alice".into(),
            password: "hunter2".into(),
        };
        let rendered = format!("{creds:?}");
        assert!(rendered.contains("alice"));
        assert!(!rendered.contains("hunter2"));
    }
}
