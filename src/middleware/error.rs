//! Error response formatting
//!
//! Converts `AppError` into the wire response at the axum boundary. Domain
//! errors cross component boundaries untouched; this is the single place
//! where they become JSON.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::error::{AccessError, AppError, AppErrorKind, ErrorCode};

/// Standardized error response structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Machine-readable error code
    pub error: ErrorCode,

    /// Human-readable error message
    pub message: String,

    /// Request ID for debugging and support
    pub request_id: Option<String>,

    /// ISO 8601 timestamp of the error
    pub timestamp: String,

    /// Whether the client should retry the request
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retryable: Option<bool>,
}

impl ErrorResponse {
    pub fn from_app_error(error: &AppError) -> Self {
        Self {
            error: error.error_code(),
            message: error.user_message(),
            request_id: error.request_id.clone(),
            timestamp: Utc::now().to_rfc3339(),
            retryable: Some(error.is_retryable()),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status_code =
            StatusCode::from_u16(self.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);

        if status_code.is_server_error() {
            tracing::error!(
                error = ?self,
                request_id = ?self.request_id,
                status = %status_code.as_u16(),
                "Server error occurred"
            );
        } else {
            tracing::warn!(
                error = ?self,
                request_id = ?self.request_id,
                status = %status_code.as_u16(),
                "Client error occurred"
            );
        }

        // Rate-limit rejections keep the flat `{ "error": <message> }` body
        // clients and scripts already poll; everything else gets the
        // structured shape. A Retry-After header rides along when known.
        if let AppErrorKind::Access(AccessError::RateLimited {
            message,
            retry_after,
        }) = &self.kind
        {
            let body = Json(serde_json::json!({ "error": message }));
            let mut response = (StatusCode::TOO_MANY_REQUESTS, body).into_response();
            if let Some(secs) = retry_after {
                if let Ok(value) = axum::http::HeaderValue::from_str(&secs.to_string()) {
                    response.headers_mut().insert("retry-after", value);
                }
            }
            return response;
        }

        let error_response = ErrorResponse::from_app_error(&self);
        (status_code, Json(error_response)).into_response()
    }
}

/// Helper to extract request ID from request headers
pub fn get_request_id_from_headers(headers: &axum::http::HeaderMap) -> Option<String> {
    headers
        .get("x-request-id")
        .and_then(|v| v.to_str().ok())
        .map(|s| s.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{AppError, AppErrorKind, DomainError};
    use axum::response::IntoResponse;

    #[test]
    fn test_error_response_from_app_error() {
        let app_error = AppError::new(AppErrorKind::Domain(DomainError::OrderNotFound {
            order_id: "ord_1".to_string(),
        }))
        .with_request_id("req_123");

        let error_response = ErrorResponse::from_app_error(&app_error);

        assert_eq!(error_response.error, ErrorCode::OrderNotFound);
        assert_eq!(error_response.request_id, Some("req_123".to_string()));
        assert!(error_response.message.contains("not found"));
    }

    #[test]
    fn test_app_error_into_response() {
        let app_error = AppError::validation("amount", "must be greater than zero");

        let response = app_error.into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn test_rate_limit_response_is_429_with_retry_after() {
        let app_error = AppError::rate_limited("Too many requests, slow down", Some(30));

        let response = app_error.into_response();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(
            response.headers().get("retry-after").map(|v| v.to_str().unwrap()),
            Some("30")
        );
    }

    #[test]
    fn test_state_violation_is_conflict() {
        let app_error = AppError::invalid_state("order", "only pending orders can be cancelled");

        let response = app_error.into_response();
        assert_eq!(response.status(), StatusCode::CONFLICT);
    }
}
