//! Authentication for the Keeper secrets vault.
//!
//! ```text
//! AuthService
//! ├── UserDirectory   (keeper-store, file or SQLite)
//! ├── PasswordHasher  (keeper-vault, PBKDF2)
//! └── TokenIssuer     (HS256 session tokens)
//!       └── IdentityVerifier  (bearer token -> TokenPayload)
//! ```
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use chrono::Duration;
//! use keeper_auth::{AuthService, IdentityVerifier, TokenIssuer};
//! use keeper_store::FileUserDirectory;
//! use keeper_vault::PasswordHasher;
//!
//! # async fn example() -> keeper_auth::AuthResult<()> {
//! let users = Arc::new(FileUserDirectory::open("data/users.json").await?);
//! let tokens = Arc::new(TokenIssuer::new(b"token secret", Duration::hours(24))?);
//! let auth = AuthService::new(users, PasswordHasher::new(), tokens.clone())?;
//!
//! auth.register("alice", "password123").await?;
//! let token = auth.login("alice", "password123").await?;
//! let who = tokens.verify(token.as_str())?;
//! println!("logged in as {}", who.name);
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod service;
pub mod token;

pub use error::{AuthError, AuthResult};
pub use service::{AuthService, MIN_PASSWORD_LEN};
pub use token::{DEFAULT_TTL_HOURS, IdentityVerifier, Token, TokenIssuer, TokenPayload};
