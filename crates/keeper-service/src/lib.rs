//! Record operations for the Keeper secrets vault.
//!
//! [`KeeperService`] owns the plaintext/ciphertext boundary: callers hand it
//! typed values and an owner id, and only sealed bytes ever reach the
//! [`RecordStore`](keeper_store::RecordStore).

pub mod error;
pub mod payload;
pub mod service;

pub use error::{KeeperError, KeeperResult};
pub use payload::{BankCard, Credentials, Payload, PayloadKind};
pub use service::{KeeperService, Secret};
