//! # Gateway Error Types Module
//!
//! HTTP-facing error type for the daemon. Wraps
//! [`playdar_resolver::ResolverError`] and adds the errors that only make
//! sense at the HTTP boundary (auth, shutdown-in-progress), then maps every
//! variant to a status code and a small JSON body, the way `gateway_error.rs`
//! does it in the teacher gateway.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use playdar_resolver::ResolverError;
use serde_json::json;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum GatewayError {
    /// Bubbled up from the resolution engine.
    #[error("resolver error: {0}")]
    Resolver(#[from] ResolverError),

    /// Missing or invalid auth token for a non-local request.
    #[error("unauthorized: {message}")]
    Unauthorized { message: String },

    /// Malformed request body or path parameter.
    #[error("invalid request: {message}")]
    InvalidRequest { message: String },

    /// The daemon is mid-shutdown and no longer accepting new queries.
    #[error("shutting down")]
    ShuttingDown,

    /// JSON (de)serialization failure at the HTTP boundary.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Anything else that doesn't fit a more specific variant.
    #[error("internal error: {message}")]
    Internal { message: String },
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let (status, error_type) = match &self {
            GatewayError::Resolver(ResolverError::NotFound(_)) => {
                (StatusCode::NOT_FOUND, "not_found")
            }
            GatewayError::Resolver(ResolverError::AlreadyExists(_)) => {
                (StatusCode::CONFLICT, "already_exists")
            }
            GatewayError::Resolver(ResolverError::BadRequest(_)) => {
                (StatusCode::BAD_REQUEST, "bad_request")
            }
            GatewayError::Resolver(ResolverError::PluginError { .. }) => {
                (StatusCode::BAD_GATEWAY, "plugin_error")
            }
            GatewayError::Resolver(ResolverError::Stream(_)) => {
                (StatusCode::BAD_GATEWAY, "stream_error")
            }
            GatewayError::Unauthorized { .. } => (StatusCode::UNAUTHORIZED, "unauthorized"),
            GatewayError::InvalidRequest { .. } => (StatusCode::BAD_REQUEST, "invalid_request"),
            GatewayError::ShuttingDown => (StatusCode::SERVICE_UNAVAILABLE, "shutting_down"),
            GatewayError::Serialization(_) => (StatusCode::BAD_REQUEST, "serialization_error"),
            GatewayError::Internal { .. } => (StatusCode::INTERNAL_SERVER_ERROR, "internal_error"),
        };

        let body = Json(json!({
            "error": {
                "message": self.to_string(),
                "type": error_type,
                "code": status.as_u16(),
            }
        }));

        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_found_maps_to_404() {
        let err = GatewayError::Resolver(ResolverError::NotFound("qid".into()));
        let response = err.into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn already_exists_maps_to_409() {
        let err = GatewayError::Resolver(ResolverError::AlreadyExists("qid".into()));
        let response = err.into_response();
        assert_eq!(response.status(), StatusCode::CONFLICT);
    }

    #[test]
    fn unauthorized_maps_to_401() {
        let err = GatewayError::Unauthorized { message: "no token".into() };
        let response = err.into_response();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }
}
