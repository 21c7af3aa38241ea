//! Error types for the gateway.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use thiserror::Error;

#[derive(Error, Debug)]
#[non_exhaustive]
pub enum GatewayError {
    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("{message}")]
    Upstream { message: String },

    #[error("Upstream did not respond within {secs}s")]
    Timeout { secs: u64 },

    #[error("{message}")]
    InvalidBody { message: String },

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
}

impl GatewayError {
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    pub fn upstream(msg: impl Into<String>) -> Self {
        Self::Upstream {
            message: msg.into(),
        }
    }

    pub fn invalid_body(msg: impl Into<String>) -> Self {
        Self::InvalidBody {
            message: msg.into(),
        }
    }

    /// Status code a caller sees when this error ends an exchange.
    #[must_use]
    pub fn status(&self) -> StatusCode {
        match self {
            Self::InvalidBody { .. } => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// JSON body a caller sees when this error ends an exchange.
    #[must_use]
    pub fn body(&self) -> serde_json::Value {
        let label = match self {
            Self::InvalidBody { .. } => "Invalid JSON body",
            _ => "Proxy error",
        };
        serde_json::json!({
            "error": label,
            "message": self.to_string(),
        })
    }
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        (self.status(), Json(self.body())).into_response()
    }
}

pub type Result<T> = std::result::Result<T, GatewayError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transport_failure_shape() {
        let err = GatewayError::upstream("error sending request: connection refused");
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let body = err.body();
        assert_eq!(body["error"], "Proxy error");
        assert_eq!(body["message"], "error sending request: connection refused");
    }

    #[test]
    fn test_timeout_is_proxy_error() {
        let err = GatewayError::Timeout { secs: 60 };
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(err.body()["message"], "Upstream did not respond within 60s");
    }

    #[test]
    fn test_invalid_body_is_bad_request() {
        let err = GatewayError::invalid_body("expected value at line 1 column 1");
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
        assert_eq!(err.body()["error"], "Invalid JSON body");
    }
}
