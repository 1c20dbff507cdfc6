//! HTTP interface for the Keeper secrets vault.
//!
//! - `POST /api/register`, `POST /api/login` are public.
//! - Everything under `/api/keeper` requires `Authorization: Bearer <token>`
//!   and operates only on the caller's own records.

pub mod api;
pub mod error;
pub mod extract;
pub mod server;
pub mod state;

pub use error::ApiError;
pub use extract::AuthUser;
pub use server::WebServer;
pub use state::AppState;

/// Web server configuration.
#[derive(Debug, Clone)]
pub struct WebConfig {
    /// The address to bind the HTTP server to.
    pub bind_addr: String,
    /// The port to listen on.
    pub port: u16,
    /// Largest accepted request body, which caps file uploads.
    pub max_body_bytes: usize,
}

impl Default for WebConfig {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1".into(),
            port: 8080,
            max_body_bytes: 32 * 1024 * 1024,
        }
    }
}
