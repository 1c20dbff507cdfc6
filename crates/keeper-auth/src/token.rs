//! Signed, time-limited session tokens.
//!
//! Tokens are compact JWS strings signed with HMAC-SHA256 (`HS256`):
//!
//! ```text
//! base64url(header) . base64url(claims) . base64url(hmac)
//! ```
//!
//! Claims are `userid`, `username`, `iat`, and `exp` (Unix seconds). There
//! is no refresh: once `exp` passes, the holder must log in again.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chrono::{Duration, Utc};
use ring::hmac;
use serde::{Deserialize, Serialize};
use tracing::debug;

use keeper_store::{User, UserId};

use crate::error::{AuthError, AuthResult};

/// Default token lifetime.
pub const DEFAULT_TTL_HOURS: i64 = 24;

const ALGORITHM: &str = "HS256";

/// An issued bearer token.
#[derive(Clone, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct Token(String);

impl Token {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Debug for Token {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Token(<redacted>)")
    }
}

/// Identity carried inside a verified token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenPayload {
    pub user_id: UserId,
    pub name: String,
}

#[derive(Debug, Serialize, Deserialize)]
struct Header {
    alg: String,
    typ: String,
}

#[derive(Debug, Serialize, Deserialize)]
struct Claims {
    userid: String,
    username: String,
    iat: i64,
    exp: i64,
}

/// Turns a presented bearer token into a caller identity.
///
/// Every authenticated request crosses this boundary before reaching the
/// keeper service.
pub trait IdentityVerifier: Send + Sync {
    /// Verify `token` and return the identity it asserts.
    ///
    /// Any failure is [`AuthError::InvalidToken`].
    fn verify(&self, token: &str) -> AuthResult<TokenPayload>;
}

/// Mints and verifies HS256 session tokens.
pub struct TokenIssuer {
    key: hmac::Key,
    ttl: Duration,
}

impl std::fmt::Debug for TokenIssuer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenIssuer")
            .field("key", &"<redacted>")
            .field("ttl", &self.ttl)
            .finish()
    }
}

impl TokenIssuer {
    /// Create an issuer signing with `secret`; tokens live for `ttl`.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::InvalidConfig`] if the secret is empty or the
    /// lifetime is not positive.
    pub fn new(secret: &[u8], ttl: Duration) -> AuthResult<Self> {
        if secret.is_empty() {
            return Err(AuthError::InvalidConfig {
                reason: "token secret must not be empty".into(),
            });
        }
        if ttl <= Duration::zero() {
            return Err(AuthError::InvalidConfig {
                reason: "token lifetime must be positive".into(),
            });
        }

        Ok(Self {
            key: hmac::Key::new(hmac::HMAC_SHA256, secret),
            ttl,
        })
    }

    /// Token lifetime.
    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Issue a token asserting `user`'s identity.
    pub fn issue(&self, user: &User) -> AuthResult<Token> {
        let now = Utc::now().timestamp();
        let claims = Claims {
            userid: user.id.as_str().to_string(),
            username: user.name.clone(),
            iat: now,
            exp: now + self.ttl.num_seconds(),
        };
        let header = Header {
            alg: ALGORITHM.into(),
            typ: "JWT".into(),
        };

        let signing_input = format!(
            "{}.{}",
            URL_SAFE_NO_PAD.encode(serde_json::to_vec(&header)?),
            URL_SAFE_NO_PAD.encode(serde_json::to_vec(&claims)?)
        );
        let tag = hmac::sign(&self.key, signing_input.as_bytes());

        debug!(user_id = %user.id, exp = claims.exp, "issued token");
        Ok(Token(format!(
            "{signing_input}.{}",
            URL_SAFE_NO_PAD.encode(tag.as_ref())
        )))
    }

    fn verify_at(&self, token: &str, now: i64) -> AuthResult<TokenPayload> {
        let mut parts = token.split('.');
        let (Some(header_b64), Some(claims_b64), Some(sig_b64), None) =
            (parts.next(), parts.next(), parts.next(), parts.next())
        else {
            debug!("token rejected: wrong segment count");
            return Err(AuthError::InvalidToken);
        };

        let header: Header = decode_segment(header_b64)?;
        if header.alg != ALGORITHM {
            debug!(alg = %header.alg, "token rejected: unexpected algorithm");
            return Err(AuthError::InvalidToken);
        }

        let signature = URL_SAFE_NO_PAD
            .decode(sig_b64)
            .map_err(|_| AuthError::InvalidToken)?;
        let signing_input_len = header_b64.len() + 1 + claims_b64.len();
        hmac::verify(
            &self.key,
            &token.as_bytes()[..signing_input_len],
            &signature,
        )
        .map_err(|_| {
            debug!("token rejected: bad signature");
            AuthError::InvalidToken
        })?;

        let claims: Claims = decode_segment(claims_b64)?;
        if claims.exp <= now {
            debug!(exp = claims.exp, "token rejected: expired");
            return Err(AuthError::InvalidToken);
        }

        let user_id = UserId::parse(&claims.userid).map_err(|_| AuthError::InvalidToken)?;
        Ok(TokenPayload {
            user_id,
            name: claims.username,
        })
    }
}

impl IdentityVerifier for TokenIssuer {
    fn verify(&self, token: &str) -> AuthResult<TokenPayload> {
        self.verify_at(token, Utc::now().timestamp())
    }
}

fn decode_segment<T: for<'de> Deserialize<'de>>(segment: &str) -> AuthResult<T> {
    let bytes = URL_SAFE_NO_PAD
        .decode(segment)
        .map_err(|_| AuthError::InvalidToken)?;
    serde_json::from_slice(&bytes).map_err(|_| AuthError::InvalidToken)
}
