//! Mapping from domain errors to HTTP responses.
//!
//! This is the only place statuses are chosen. Bodies are always
//! `{"error": "<message>"}`; anything that is not the client's fault gets a
//! generic message and the detail goes to the log.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;

use keeper_auth::AuthError;
use keeper_service::KeeperError;

/// Error returned by every handler and extractor.
#[derive(Debug)]
pub enum ApiError {
    Auth(AuthError),
    Keeper(KeeperError),
    /// Missing or malformed `Authorization` header.
    Unauthorized,
    /// Request body or query could not be parsed.
    BadRequest(String),
}

impl From<AuthError> for ApiError {
    fn from(err: AuthError) -> Self {
        Self::Auth(err)
    }
}

impl From<KeeperError> for ApiError {
    fn from(err: KeeperError) -> Self {
        Self::Keeper(err)
    }
}

const NOT_AUTHORIZED: &str = "not authorized";
const INTERNAL: &str = "internal server error";

impl ApiError {
    /// Status code and client-facing message.
    pub fn status_and_message(&self) -> (StatusCode, String) {
        match self {
            Self::Unauthorized => (StatusCode::UNAUTHORIZED, NOT_AUTHORIZED.into()),
            Self::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg.clone()),

            Self::Auth(AuthError::UserExists { .. }) => {
                (StatusCode::CONFLICT, "user already exists".into())
            }
            Self::Auth(e) if e.is_unauthorized() => {
                (StatusCode::UNAUTHORIZED, NOT_AUTHORIZED.into())
            }
            Self::Auth(AuthError::InvalidArgument(msg)) => (StatusCode::BAD_REQUEST, msg.clone()),
            Self::Auth(_) => (StatusCode::INTERNAL_SERVER_ERROR, INTERNAL.into()),

            Self::Keeper(KeeperError::NotFound { .. }) => {
                (StatusCode::NOT_FOUND, "not found".into())
            }
            Self::Keeper(KeeperError::InvalidArgument(msg)) => {
                (StatusCode::BAD_REQUEST, msg.clone())
            }
            Self::Keeper(_) => (StatusCode::INTERNAL_SERVER_ERROR, INTERNAL.into()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = self.status_and_message();

        let detail = match &self {
            Self::Auth(e) => e.to_string(),
            Self::Keeper(e) => e.to_string(),
            Self::Unauthorized => "missing or malformed authorization header".into(),
            Self::BadRequest(msg) => msg.clone(),
        };
        if status.is_server_error() {
            tracing::error!(status = status.as_u16(), error = %detail, "request failed");
        } else {
            tracing::debug!(status = status.as_u16(), error = %detail, "request rejected");
        }

        (status, Json(json!({ "error": message }))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use keeper_store::StoreError;

    fn status(err: ApiError) -> StatusCode {
        err.status_and_message().0
    }

    #[test]
    fn auth_errors() {
        assert_eq!(
            status(AuthError::UserExists { name: "a".into() }.into()),
            StatusCode::CONFLICT
        );
        assert_eq!(status(AuthError::InvalidCredentials.into()), StatusCode::UNAUTHORIZED);
        assert_eq!(status(AuthError::InvalidToken.into()), StatusCode::UNAUTHORIZED);
        assert_eq!(status(ApiError::Unauthorized), StatusCode::UNAUTHORIZED);
        assert_eq!(
            status(AuthError::InvalidArgument("short".into()).into()),
            StatusCode::BAD_REQUEST
        );
    }

    #[test]
    fn keeper_errors() {
        assert_eq!(
            status(KeeperError::NotFound { id: "x".into() }.into()),
            StatusCode::NOT_FOUND
        );
        assert_eq!(status(KeeperError::Decode.into()), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(
            status(KeeperError::Store(StoreError::Io(std::io::Error::other("disk"))).into()),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn unauthorized_bodies_are_identical() {
        let a = ApiError::from(AuthError::InvalidCredentials).status_and_message();
        let b = ApiError::from(AuthError::InvalidToken).status_and_message();
        let c = ApiError::Unauthorized.status_and_message();
        assert_eq!(a, b);
        assert_eq!(b, c);
        assert_eq!(a.1, "not authorized");
    }

    #[test]
    fn internal_details_not_exposed() {
        let (_, msg) = ApiError::from(KeeperError::Store(StoreError::Io(std::io::Error::other(
            "/var/lib/keeper/secret path",
        ))))
        .status_and_message();
        assert!(!msg.contains("/var/lib"));
    }
}
