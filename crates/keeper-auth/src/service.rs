//! Registration and login.

use std::sync::Arc;

use tracing::{debug, info, instrument, warn};

use keeper_store::{StoreError, User, UserDirectory, UserId};
use keeper_vault::PasswordHasher;

use crate::error::{AuthError, AuthResult};
use crate::token::{Token, TokenIssuer};

/// Minimum accepted password length, in characters.
pub const MIN_PASSWORD_LEN: usize = 8;

/// Orchestrates the password hasher, a user directory and the token issuer.
pub struct AuthService {
    users: Arc<dyn UserDirectory>,
    hasher: PasswordHasher,
    tokens: Arc<TokenIssuer>,
    // Verified against when the user is unknown so both login failures
    // cost one full PBKDF2 run.
    dummy_hash: String,
}

impl AuthService {
    /// Build the service. Hashes one throwaway password up front.
    pub fn new(
        users: Arc<dyn UserDirectory>,
        hasher: PasswordHasher,
        tokens: Arc<TokenIssuer>,
    ) -> AuthResult<Self> {
        let dummy_hash = hasher.hash("keeper-dummy-password")?;
        Ok(Self {
            users,
            hasher,
            tokens,
            dummy_hash,
        })
    }

    /// The issuer tokens are minted with.
    pub fn tokens(&self) -> &Arc<TokenIssuer> {
        &self.tokens
    }

    /// Register a new user and return the assigned id.
    ///
    /// # Errors
    ///
    /// - [`AuthError::InvalidArgument`] for an empty name or a password
    ///   shorter than [`MIN_PASSWORD_LEN`].
    /// - [`AuthError::UserExists`] if the name is taken, including when a
    ///   concurrent registration of the same name wins the race.
    #[instrument(skip(self, password))]
    pub async fn register(&self, name: &str, password: &str) -> AuthResult<UserId> {
        if name.trim().is_empty() {
            return Err(AuthError::InvalidArgument("name must not be empty".into()));
        }
        if password.chars().count() < MIN_PASSWORD_LEN {
            return Err(AuthError::InvalidArgument(format!(
                "password must be at least {MIN_PASSWORD_LEN} characters"
            )));
        }

        let hasher = self.hasher.clone();
        let password = password.to_string();
        let password_hash = tokio::task::spawn_blocking(move || hasher.hash(&password)).await??;

        let user = User {
            id: UserId::new(),
            name: name.to_string(),
            password_hash,
        };
        let id = user.id.clone();

        self.users.create_user(user).await.map_err(|e| match e {
            StoreError::AlreadyExists { .. } => {
                debug!("registration rejected: name taken");
                AuthError::UserExists {
                    name: name.to_string(),
                }
            }
            other => AuthError::Store(other),
        })?;

        info!(user_id = %id, "user registered");
        Ok(id)
    }

    /// Check credentials and issue a session token.
    ///
    /// An unknown name and a wrong password both yield
    /// [`AuthError::InvalidCredentials`].
    #[instrument(skip(self, password))]
    pub async fn login(&self, name: &str, password: &str) -> AuthResult<Token> {
        let (user, stored_hash) = match self.users.get_user_by_name(name).await {
            Ok(user) => {
                let hash = user.password_hash.clone();
                (Some(user), hash)
            }
            Err(e) if e.is_not_found() => (None, self.dummy_hash.clone()),
            Err(e) => return Err(e.into()),
        };

        let hasher = self.hasher.clone();
        let password = password.to_string();
        let matches =
            tokio::task::spawn_blocking(move || hasher.verify(&password, &stored_hash)).await??;

        let Some(user) = user.filter(|_| matches) else {
            warn!("login failed");
            return Err(AuthError::InvalidCredentials);
        };

        let token = self.tokens.issue(&user)?;
        info!(user_id = %user.id, "user logged in");
        Ok(token)
    }
}
