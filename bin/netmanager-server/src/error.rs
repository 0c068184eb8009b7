//! Unified server error type.
//!
//! Every handler returns `Result<T, ServerError>`, which implements
//! [`axum::response::IntoResponse`] so errors become a JSON body
//! `{"error": "..."}` with a matching status code.
//!
//! Database and internal errors are logged in full but only a generic
//! message is returned, so SQL and file paths never reach the browser.
//! Router errors are returned verbatim: the operator needs the `uci` stderr.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use netmanager_core::UciError;
use serde_json::json;
use thiserror::Error;
use tracing::error;

#[derive(Debug, Error)]
pub enum ServerError {
    /// Propagated from the SQLite store.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A command on the router failed.
    #[error("router error: {0}")]
    Router(#[from] UciError),

    /// The caller sent an invalid or malformed request.
    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl From<validator::ValidationErrors> for ServerError {
    fn from(e: validator::ValidationErrors) -> Self {
        ServerError::BadRequest(e.to_string())
    }
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let (status, client_message) = match &self {
            ServerError::BadRequest(m) => (StatusCode::BAD_REQUEST, m.clone()),
            ServerError::Router(e) => {
                error!(error = %e, "router command failed");
                (StatusCode::BAD_GATEWAY, e.to_string())
            }
            ServerError::Database(e) => {
                error!(error = %e, "database error");
                (StatusCode::INTERNAL_SERVER_ERROR, "internal server error".to_owned())
            }
            ServerError::Internal(m) => {
                error!(message = %m, "internal server error");
                (StatusCode::INTERNAL_SERVER_ERROR, "internal server error".to_owned())
            }
        };
        (status, Json(json!({ "error": client_message }))).into_response()
    }
}

impl From<std::io::Error> for ServerError {
    fn from(e: std::io::Error) -> Self {
        ServerError::Internal(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use netmanager_core::ChannelError;

    use super::*;

    #[test]
    fn database_detail_is_hidden() {
        let resp = ServerError::Database(sqlx::Error::RowNotFound).into_response();
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn router_failure_maps_to_bad_gateway() {
        let err = ServerError::from(UciError::Channel(ChannelError::Closed));
        assert_eq!(err.into_response().status(), StatusCode::BAD_GATEWAY);
    }

    #[test]
    fn bad_request_keeps_message() {
        let err = ServerError::BadRequest("wan is required".into());
        assert_eq!(err.to_string(), "bad request: wan is required");
        assert_eq!(err.into_response().status(), StatusCode::BAD_REQUEST);
    }
}
