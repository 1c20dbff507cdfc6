//! End-to-end authentication flows against both user directory backends.

use std::sync::Arc;

use chrono::Duration;
use keeper_auth::{AuthError, AuthService, IdentityVerifier, TokenIssuer};
use keeper_store::{Database, FileUserDirectory, SqliteUserDirectory, UserDirectory};
use keeper_vault::PasswordHasher;

fn issuer() -> Arc<TokenIssuer> {
    Arc::new(TokenIssuer::new(b"integration secret", Duration::hours(24)).unwrap())
}

async fn sqlite_service() -> Arc<AuthService> {
    let db = Database::open_in_memory().unwrap();
    db.run_migrations().await.unwrap();
    let users: Arc<dyn UserDirectory> = Arc::new(SqliteUserDirectory::new(db));
    Arc::new(AuthService::new(users, PasswordHasher::with_iterations(1_000), issuer()).unwrap())
}

#[tokio::test]
async fn concurrent_registration_has_one_winner() {
    let auth = sqlite_service().await;

    let mut handles = Vec::new();
    for _ in 0..8 {
        let auth = Arc::clone(&auth);
        handles.push(tokio::spawn(async move {
            auth.register("carol", "password123").await
        }));
    }

    let mut winners = 0;
    let mut losers = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => winners += 1,
            Err(AuthError::UserExists { .. }) => losers += 1,
            Err(other) => panic!("unexpected error: {other}"),
        }
    }
    assert_eq!((winners, losers), (1, 7));
}

#[tokio::test]
async fn file_backend_login_survives_restart() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("users.json");
    let tokens = issuer();

    let alice_id = {
        let users = Arc::new(FileUserDirectory::open(&path).await.unwrap());
        let auth =
            AuthService::new(users.clone(), PasswordHasher::with_iterations(1_000), tokens.clone())
                .unwrap();
        let id = auth.register("alice", "password123").await.unwrap();
        users.close().await.unwrap();
        id
    };

    let users = Arc::new(FileUserDirectory::open(&path).await.unwrap());
    let auth = AuthService::new(users, PasswordHasher::with_iterations(1_000), tokens.clone())
        .unwrap();
    let token = auth.login("alice", "password123").await.unwrap();
    assert_eq!(tokens.verify(token.as_str()).unwrap().user_id, alice_id);
}

#[tokio::test]
async fn token_from_one_deployment_rejected_by_another() {
    let auth = sqlite_service().await;
    auth.register("alice", "password123").await.unwrap();
    let token = auth.login("alice", "password123").await.unwrap();

    let other = TokenIssuer::new(b"different deployment", Duration::hours(24)).unwrap();
    assert!(matches!(
        other.verify(token.as_str()),
        Err(AuthError::InvalidToken)
    ));
}
