//! Comprehensive error handling for the Livreo backend
//!
//! This module provides a unified error system with proper HTTP status mapping,
//! user-friendly messages, and structured error codes for client handling.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Error codes for programmatic handling
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum ErrorCode {
    // Domain errors (4xx)
    #[serde(rename = "ORDER_NOT_FOUND")]
    OrderNotFound,
    #[serde(rename = "CONTRIBUTION_NOT_FOUND")]
    ContributionNotFound,
    #[serde(rename = "BOOK_NOT_FOUND")]
    BookNotFound,
    #[serde(rename = "INVALID_STATE")]
    InvalidState,
    #[serde(rename = "PAYMENT_METHOD_MISMATCH")]
    PaymentMethodMismatch,

    // Credential / access errors
    #[serde(rename = "UNAUTHORIZED")]
    Unauthorized,
    #[serde(rename = "FORBIDDEN")]
    Forbidden,

    // Throttling
    #[serde(rename = "RATE_LIMITED")]
    RateLimited,

    // Infrastructure errors (5xx)
    #[serde(rename = "DATABASE_ERROR")]
    DatabaseError,
    #[serde(rename = "CONFIGURATION_ERROR")]
    ConfigurationError,

    // External errors (502)
    #[serde(rename = "PAYMENT_PROVIDER_ERROR")]
    PaymentProviderError,

    // Generic
    #[serde(rename = "INTERNAL_ERROR")]
    InternalError,
    #[serde(rename = "VALIDATION_ERROR")]
    ValidationError,
}

/// Domain-specific business logic errors
#[derive(Debug, Clone)]
pub enum DomainError {
    /// Referenced order doesn't exist
    OrderNotFound { order_id: String },
    /// Referenced contribution doesn't exist
    ContributionNotFound { contribution_id: String },
    /// Referenced book doesn't exist
    BookNotFound { book_id: String },
    /// Transition requested from a state that doesn't allow it
    InvalidState { entity: String, message: String },
    /// Requested provider doesn't match the configured payment method
    PaymentMethodMismatch { configured: String, requested: String },
}

/// Credential and access-control errors
#[derive(Debug, Clone)]
pub enum AccessError {
    /// Missing, malformed, or expired session token
    Unauthorized { message: String },
    /// Authenticated but not allowed (ownership or role failure)
    Forbidden { message: String },
    /// Fixed-window limit exceeded
    RateLimited {
        message: String,
        retry_after: Option<u64>,
    },
}

/// Infrastructure-level errors (database, configuration)
#[derive(Debug, Clone)]
pub enum InfrastructureError {
    /// Database connection or query failure
    Database { message: String, is_retryable: bool },
    /// Missing or invalid configuration
    Configuration { message: String },
}

/// External service errors (payment providers)
#[derive(Debug, Clone)]
pub enum ExternalError {
    /// Stripe, PayPal or FedaPay returned an error
    PaymentProvider {
        provider: String,
        message: String,
        is_retryable: bool,
    },
}

/// Input validation errors
#[derive(Debug, Clone)]
pub enum ValidationError {
    /// Invalid amount (format or value)
    InvalidAmount { amount: String, reason: String },
    /// Required field missing
    MissingField { field: String },
    /// Field value rejected
    InvalidField { field: String, reason: String },
}

/// Unified application error type
#[derive(Debug, Clone)]
pub struct AppError {
    pub kind: AppErrorKind,
    pub request_id: Option<String>,
    pub context: Option<String>,
}

#[derive(Debug, Clone)]
pub enum AppErrorKind {
    Domain(DomainError),
    Access(AccessError),
    Infrastructure(InfrastructureError),
    External(ExternalError),
    Validation(ValidationError),
}

impl AppError {
    pub fn new(kind: AppErrorKind) -> Self {
        Self {
            kind,
            request_id: None,
            context: None,
        }
    }

    pub fn with_request_id(mut self, request_id: impl Into<String>) -> Self {
        self.request_id = Some(request_id.into());
        self
    }

    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context = Some(context.into());
        self
    }

    // Shorthand constructors for the common cases handlers hit.

    pub fn validation(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::new(AppErrorKind::Validation(ValidationError::InvalidField {
            field: field.into(),
            reason: reason.into(),
        }))
    }

    pub fn missing_field(field: impl Into<String>) -> Self {
        Self::new(AppErrorKind::Validation(ValidationError::MissingField {
            field: field.into(),
        }))
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(AppErrorKind::Access(AccessError::Unauthorized {
            message: message.into(),
        }))
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::new(AppErrorKind::Access(AccessError::Forbidden {
            message: message.into(),
        }))
    }

    pub fn rate_limited(message: impl Into<String>, retry_after: Option<u64>) -> Self {
        Self::new(AppErrorKind::Access(AccessError::RateLimited {
            message: message.into(),
            retry_after,
        }))
    }

    pub fn invalid_state(entity: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(AppErrorKind::Domain(DomainError::InvalidState {
            entity: entity.into(),
            message: message.into(),
        }))
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(AppErrorKind::Infrastructure(InfrastructureError::Database {
            message: message.into(),
            is_retryable: false,
        }))
    }

    /// Map error to HTTP status code
    pub fn status_code(&self) -> u16 {
        match &self.kind {
            AppErrorKind::Domain(err) => match err {
                DomainError::OrderNotFound { .. } => 404,
                DomainError::ContributionNotFound { .. } => 404,
                DomainError::BookNotFound { .. } => 404,
                DomainError::InvalidState { .. } => 409,
                DomainError::PaymentMethodMismatch { .. } => 400,
            },
            AppErrorKind::Access(err) => match err {
                AccessError::Unauthorized { .. } => 401,
                AccessError::Forbidden { .. } => 403,
                AccessError::RateLimited { .. } => 429,
            },
            AppErrorKind::Infrastructure(err) => match err {
                InfrastructureError::Database { .. } => 500,
                InfrastructureError::Configuration { .. } => 500,
            },
            AppErrorKind::External(err) => match err {
                ExternalError::PaymentProvider { .. } => 502,
            },
            AppErrorKind::Validation(_) => 400,
        }
    }

    /// Get error code for client handling
    pub fn error_code(&self) -> ErrorCode {
        match &self.kind {
            AppErrorKind::Domain(err) => match err {
                DomainError::OrderNotFound { .. } => ErrorCode::OrderNotFound,
                DomainError::ContributionNotFound { .. } => ErrorCode::ContributionNotFound,
                DomainError::BookNotFound { .. } => ErrorCode::BookNotFound,
                DomainError::InvalidState { .. } => ErrorCode::InvalidState,
                DomainError::PaymentMethodMismatch { .. } => ErrorCode::PaymentMethodMismatch,
            },
            AppErrorKind::Access(err) => match err {
                AccessError::Unauthorized { .. } => ErrorCode::Unauthorized,
                AccessError::Forbidden { .. } => ErrorCode::Forbidden,
                AccessError::RateLimited { .. } => ErrorCode::RateLimited,
            },
            AppErrorKind::Infrastructure(err) => match err {
                InfrastructureError::Database { .. } => ErrorCode::DatabaseError,
                InfrastructureError::Configuration { .. } => ErrorCode::ConfigurationError,
            },
            AppErrorKind::External(err) => match err {
                ExternalError::PaymentProvider { .. } => ErrorCode::PaymentProviderError,
            },
            AppErrorKind::Validation(_) => ErrorCode::ValidationError,
        }
    }

    /// Get user-friendly error message
    pub fn user_message(&self) -> String {
        match &self.kind {
            AppErrorKind::Domain(err) => match err {
                DomainError::OrderNotFound { order_id } => {
                    format!("Order '{}' not found", order_id)
                }
                DomainError::ContributionNotFound { contribution_id } => {
                    format!("Contribution '{}' not found", contribution_id)
                }
                DomainError::BookNotFound { book_id } => {
                    format!("Book '{}' not found", book_id)
                }
                DomainError::InvalidState { entity, message } => {
                    format!("{}: {}", entity, message)
                }
                DomainError::PaymentMethodMismatch {
                    configured,
                    requested,
                } => {
                    format!(
                        "Payment method '{}' does not match requested provider '{}'",
                        configured, requested
                    )
                }
            },
            AppErrorKind::Access(err) => match err {
                AccessError::Unauthorized { message } => message.clone(),
                AccessError::Forbidden { message } => message.clone(),
                AccessError::RateLimited { message, .. } => message.clone(),
            },
            AppErrorKind::Infrastructure(_) => {
                "Service temporarily unavailable. Please try again later".to_string()
            }
            AppErrorKind::External(err) => match err {
                ExternalError::PaymentProvider {
                    provider,
                    is_retryable,
                    ..
                } => {
                    if *is_retryable {
                        format!(
                            "Payment provider ({}) is temporarily unavailable. Please try again",
                            provider
                        )
                    } else {
                        "Payment processing failed. Please contact support".to_string()
                    }
                }
            },
            AppErrorKind::Validation(err) => match err {
                ValidationError::InvalidAmount { amount, reason } => {
                    format!("Invalid amount '{}': {}", amount, reason)
                }
                ValidationError::MissingField { field } => {
                    format!("Required field '{}' is missing", field)
                }
                ValidationError::InvalidField { field, reason } => {
                    format!("Invalid value for '{}': {}", field, reason)
                }
            },
        }
    }

    /// Check if error is retryable
    pub fn is_retryable(&self) -> bool {
        match &self.kind {
            AppErrorKind::Domain(_) => false,
            AppErrorKind::Access(err) => matches!(err, AccessError::RateLimited { .. }),
            AppErrorKind::Infrastructure(err) => match err {
                InfrastructureError::Database { is_retryable, .. } => *is_retryable,
                InfrastructureError::Configuration { .. } => false,
            },
            AppErrorKind::External(err) => match err {
                ExternalError::PaymentProvider { is_retryable, .. } => *is_retryable,
            },
            AppErrorKind::Validation(_) => false,
        }
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.user_message())
    }
}

impl std::error::Error for AppError {}

/// Result type for operations that can fail with AppError
pub type AppResult<T> = Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_precondition_maps_to_conflict() {
        let error = AppError::invalid_state("order", "only pending orders can be cancelled");

        assert_eq!(error.status_code(), 409);
        assert_eq!(error.error_code(), ErrorCode::InvalidState);
        assert!(!error.is_retryable());
    }

    #[test]
    fn test_rate_limit_error() {
        let error = AppError::rate_limited("Too many requests, slow down", Some(30));

        assert_eq!(error.status_code(), 429);
        assert_eq!(error.error_code(), ErrorCode::RateLimited);
        assert!(error.is_retryable());
    }

    #[test]
    fn test_unauthorized_and_forbidden_are_distinct() {
        assert_eq!(AppError::unauthorized("no session").status_code(), 401);
        assert_eq!(AppError::forbidden("not your order").status_code(), 403);
    }

    #[test]
    fn test_not_found_error() {
        let error = AppError::new(AppErrorKind::Domain(DomainError::OrderNotFound {
            order_id: "ord_1".to_string(),
        }));

        assert_eq!(error.status_code(), 404);
        assert!(error.user_message().contains("not found"));
    }

    #[test]
    fn test_validation_error() {
        let error = AppError::validation("quantity", "must be greater than zero");

        assert_eq!(error.status_code(), 400);
        assert_eq!(error.error_code(), ErrorCode::ValidationError);
        assert!(!error.is_retryable());
    }

    #[test]
    fn test_provider_error_is_bad_gateway() {
        let error = AppError::new(AppErrorKind::External(ExternalError::PaymentProvider {
            provider: "stripe".to_string(),
            message: "upstream 500".to_string(),
            is_retryable: true,
        }));

        assert_eq!(error.status_code(), 502);
        assert!(error.is_retryable());
    }
}
