//! Router assembly and server startup.

use std::future::Future;
use std::sync::Arc;

use axum::Router;
use axum::extract::DefaultBodyLimit;
use axum::routing::{delete, get, post};
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;

use keeper_auth::{AuthService, IdentityVerifier};
use keeper_service::KeeperService;

use crate::WebConfig;
use crate::api;
use crate::state::AppState;

/// The Keeper HTTP server.
pub struct WebServer {
    config: WebConfig,
    state: Arc<AppState>,
}

impl WebServer {
    /// Create a new web server.
    ///
    /// # Arguments
    ///
    /// * `config` - Bind address, port, and body limit.
    /// * `auth` - Registration and login.
    /// * `identity` - Verifies bearer tokens on keeper routes.
    /// * `keeper` - Record operations.
    pub fn new(
        config: WebConfig,
        auth: Arc<AuthService>,
        identity: Arc<dyn IdentityVerifier>,
        keeper: KeeperService,
    ) -> Self {
        let state = Arc::new(AppState {
            auth,
            identity,
            keeper,
        });
        Self { config, state }
    }

    /// Return the `host:port` string this server will bind to.
    pub fn addr(&self) -> String {
        format!("{}:{}", self.config.bind_addr, self.config.port)
    }

    /// Build the Axum router with all routes registered.
    pub fn router(&self) -> Router {
        Router::new()
            .route("/api/register", post(api::register))
            .route("/api/login", post(api::login))
            .route("/api/keeper", get(api::list_items))
            .route("/api/keeper/", get(api::list_items))
            .route("/api/keeper/text", post(api::set_text))
            .route("/api/keeper/text/{id}", get(api::get_text))
            .route("/api/keeper/file", post(api::upload_file))
            .route("/api/keeper/file/{id}", get(api::download_file))
            .route("/api/keeper/credentials", post(api::set_credentials))
            .route("/api/keeper/credentials/{id}", get(api::get_credentials))
            .route("/api/keeper/bank", post(api::set_bank))
            .route("/api/keeper/bank/{id}", get(api::get_bank))
            .route("/api/keeper/{id}", delete(api::delete_item))
            .route("/api/keeper/delete/{id}", post(api::delete_item))
            .layer(DefaultBodyLimit::max(self.config.max_body_bytes))
            .layer(TraceLayer::new_for_http())
            .with_state(Arc::clone(&self.state))
    }

    /// Bind the configured address and serve until `shutdown` resolves.
    ///
    /// # Errors
    ///
    /// Returns an error if the TCP listener cannot be bound.
    pub async fn start(
        self,
        shutdown: impl Future<Output = ()> + Send + 'static,
    ) -> std::io::Result<()> {
        let listener = TcpListener::bind(self.addr()).await?;
        self.serve_on(listener, shutdown).await
    }

    /// Serve on an already bound listener until `shutdown` resolves.
    ///
    /// In-flight requests are allowed to finish before this returns.
    pub async fn serve_on(
        self,
        listener: TcpListener,
        shutdown: impl Future<Output = ()> + Send + 'static,
    ) -> std::io::Result<()> {
        let router = self.router();
        tracing::info!(addr = %listener.local_addr()?, "starting web server");

        axum::serve(listener, router)
            .with_graceful_shutdown(shutdown)
            .await?;

        tracing::info!("web server stopped");
        Ok(())
    }
}
