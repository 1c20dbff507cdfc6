//! Shared application state for the web server.

use std::sync::Arc;

use keeper_auth::{AuthService, IdentityVerifier};
use keeper_service::KeeperService;

/// Shared state accessible from every Axum handler.
#[derive(Clone)]
pub struct AppState {
    /// Registration and login.
    pub auth: Arc<AuthService>,

    /// Bearer token verification for `/api/keeper` routes.
    pub identity: Arc<dyn IdentityVerifier>,

    /// Record operations.
    pub keeper: KeeperService,
}
