use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

/// Application error types
#[derive(Debug, Error)]
pub enum AppError {
    /// Invalid or incomplete configuration; never retried automatically
    #[error("Configuration error: {0}")]
    ConfigError(String),
    /// Token exchange rejected or unreachable identity source
    #[error("Authentication error: {0}")]
    AuthError(String),
    /// Non-2xx response from an external source
    #[error("Upstream error ({status}): {message}")]
    UpstreamError { status: StatusCode, message: String },
    /// Response body could not be interpreted
    #[error("Parse error: {0}")]
    ParseError(String),
    /// A source call exceeded its timeout
    #[error("Timed out: {0}")]
    Timeout(String),
    /// No snapshot has been built yet
    #[error("Not ready: {0}")]
    NotReady(String),
    /// Internal server error
    #[error("Internal error: {0}")]
    InternalError(String),
    /// HTTP request error (preserves reqwest::Error for connect/timeout detection)
    #[error("HTTP request error: {0}")]
    HttpRequest(#[from] reqwest::Error),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_message) = match &self {
            Self::ConfigError(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            Self::AuthError(msg) => (StatusCode::UNAUTHORIZED, msg.clone()),
            Self::UpstreamError { status, message } => {
                (upstream_status(*status), message.clone())
            }
            Self::ParseError(msg) => (StatusCode::BAD_GATEWAY, msg.clone()),
            Self::Timeout(msg) => (StatusCode::GATEWAY_TIMEOUT, msg.clone()),
            Self::NotReady(msg) => (StatusCode::SERVICE_UNAVAILABLE, msg.clone()),
            Self::InternalError(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg.clone()),
            Self::HttpRequest(err) => (StatusCode::BAD_GATEWAY, err.to_string()),
        };

        let body = Json(json!({
            "error": {
                "message": error_message,
                "type": error_type_name(&self),
            }
        }));

        (status, body).into_response()
    }
}

/// Upstream 5xx is reported as a gateway failure, upstream 4xx keeps its code
fn upstream_status(status: StatusCode) -> StatusCode {
    if status.is_server_error() {
        StatusCode::BAD_GATEWAY
    } else {
        status
    }
}

fn error_type_name(error: &AppError) -> &'static str {
    match error {
        AppError::ConfigError(_) => "config_error",
        AppError::AuthError(_) => "auth_error",
        AppError::UpstreamError { .. } => "upstream_error",
        AppError::ParseError(_) => "parse_error",
        AppError::Timeout(_) => "timeout",
        AppError::NotReady(_) => "not_ready",
        AppError::InternalError(_) => "internal_error",
        AppError::HttpRequest(_) => "http_request_error",
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        Self::InternalError(err.to_string())
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        Self::ParseError(format!("JSON error: {}", err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let error = AppError::AuthError("invalid_client".to_string());
        assert_eq!(error.to_string(), "Authentication error: invalid_client");
    }

    #[test]
    fn test_error_type_name() {
        assert_eq!(error_type_name(&AppError::AuthError("test".to_string())), "auth_error");
        assert_eq!(error_type_name(&AppError::NotReady("test".to_string())), "not_ready");
    }

    #[tokio::test]
    async fn test_error_response() {
        let response = AppError::AuthError("Invalid client secret".to_string()).into_response();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        let response = AppError::UpstreamError {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: "boom".to_string(),
        }
        .into_response();
        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);

        let response = AppError::NotReady("no snapshot".to_string()).into_response();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    }
}
