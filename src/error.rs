//! Unified error handling for the reservation payment/refund engine.
//!
//! One error type with proper HTTP status mapping, user-friendly messages,
//! and structured error codes so API-layer callers can branch without parsing
//! strings. Validation and state-precondition failures are rejected
//! synchronously and never retried; only infrastructure/external failures may
//! be retryable.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Machine-readable error codes for programmatic handling
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum ErrorCode {
    // Domain errors (4xx)
    #[serde(rename = "INVALID_DEPOSIT_AMOUNT")]
    InvalidDepositAmount,
    #[serde(rename = "DUPLICATE_PENDING_PAYMENT")]
    DuplicatePendingPayment,
    #[serde(rename = "SERVICE_NOT_COMPLETED")]
    ServiceNotCompleted,
    #[serde(rename = "DEPOSIT_NOT_PAID")]
    DepositNotPaid,
    #[serde(rename = "NO_REMAINING_BALANCE")]
    NoRemainingBalance,
    #[serde(rename = "STALE_STATE")]
    StaleState,
    #[serde(rename = "RESERVATION_NOT_FOUND")]
    ReservationNotFound,
    #[serde(rename = "PAYMENT_NOT_FOUND")]
    PaymentNotFound,
    #[serde(rename = "UNAUTHORIZED_RESERVATION_ACCESS")]
    UnauthorizedReservationAccess,

    // Infrastructure errors (5xx)
    #[serde(rename = "DATABASE_ERROR")]
    DatabaseError,
    #[serde(rename = "CONFIGURATION_ERROR")]
    ConfigurationError,

    // External errors (502, 503, 504)
    #[serde(rename = "PAYMENT_GATEWAY_ERROR")]
    PaymentGatewayError,
    #[serde(rename = "NOTIFICATION_ERROR")]
    NotificationError,
    #[serde(rename = "EXTERNAL_SERVICE_TIMEOUT")]
    ExternalServiceTimeout,

    // Generic
    #[serde(rename = "INTERNAL_ERROR")]
    InternalError,
    #[serde(rename = "VALIDATION_ERROR")]
    ValidationError,
}

/// Domain-specific business logic errors
#[derive(Debug, Clone)]
pub enum DomainError {
    /// Deposit outside the allowed [20%, 30%] band of the reservation total
    InvalidDepositAmount {
        deposit: i64,
        min_allowed: i64,
        max_allowed: i64,
    },
    /// A pending payment already exists for this reservation/stage
    DuplicatePendingPayment {
        reservation_id: String,
        stage: String,
    },
    /// Final payment requested before the service was marked completed
    ServiceNotCompleted { reservation_id: String },
    /// Final payment requested before the deposit was paid
    DepositNotPaid { reservation_id: String },
    /// Nothing left to collect after the deposit
    NoRemainingBalance { reservation_id: String },
    /// Status transition requested against a terminal or concurrently-changed row
    StaleState {
        reservation_id: String,
        current: String,
        requested: String,
    },
    /// Reservation with the given ID doesn't exist
    ReservationNotFound { reservation_id: String },
    /// Payment row doesn't exist for the reservation/stage
    PaymentNotFound {
        reservation_id: String,
        stage: String,
    },
    /// Caller does not own the reservation
    UnauthorizedReservationAccess {
        reservation_id: String,
        user_id: String,
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

/// External collaborator errors (payment gateway, notification delivery)
#[derive(Debug, Clone)]
pub enum ExternalError {
    /// Payment gateway initialize/cancel call failed
    PaymentGateway {
        gateway: String,
        message: String,
        is_retryable: bool,
    },
    /// Notification delivery failed (never blocks a payment/refund path)
    Notification { message: String },
    /// External service timeout
    Timeout { service: String, timeout_secs: u64 },
}

/// Input validation errors
#[derive(Debug, Clone)]
pub enum ValidationError {
    /// Invalid amount (negative, zero, or malformed)
    InvalidAmount { amount: String, reason: String },
    /// Required field missing
    MissingField { field: String },
    /// Field value out of acceptable range
    OutOfRange {
        field: String,
        min: Option<String>,
        max: Option<String>,
    },
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

    pub fn domain(err: DomainError) -> Self {
        Self::new(AppErrorKind::Domain(err))
    }

    pub fn validation(err: ValidationError) -> Self {
        Self::new(AppErrorKind::Validation(err))
    }

    pub fn with_request_id(mut self, request_id: impl Into<String>) -> Self {
        self.request_id = Some(request_id.into());
        self
    }

    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context = Some(context.into());
        self
    }

    /// Map error to HTTP status code
    pub fn status_code(&self) -> u16 {
        match &self.kind {
            AppErrorKind::Domain(err) => match err {
                DomainError::InvalidDepositAmount { .. } => 400,
                DomainError::DuplicatePendingPayment { .. } => 409,
                DomainError::ServiceNotCompleted { .. } => 422,
                DomainError::DepositNotPaid { .. } => 422,
                DomainError::NoRemainingBalance { .. } => 422,
                DomainError::StaleState { .. } => 409,
                DomainError::ReservationNotFound { .. } => 404,
                DomainError::PaymentNotFound { .. } => 404,
                DomainError::UnauthorizedReservationAccess { .. } => 403,
            },
            AppErrorKind::Infrastructure(err) => match err {
                InfrastructureError::Database { .. } => 500,
                InfrastructureError::Configuration { .. } => 500,
            },
            AppErrorKind::External(err) => match err {
                ExternalError::PaymentGateway { .. } => 502,
                ExternalError::Notification { .. } => 502,
                ExternalError::Timeout { .. } => 504,
            },
            AppErrorKind::Validation(_) => 400,
        }
    }

    /// Get error code for client handling
    pub fn error_code(&self) -> ErrorCode {
        match &self.kind {
            AppErrorKind::Domain(err) => match err {
                DomainError::InvalidDepositAmount { .. } => ErrorCode::InvalidDepositAmount,
                DomainError::DuplicatePendingPayment { .. } => ErrorCode::DuplicatePendingPayment,
                DomainError::ServiceNotCompleted { .. } => ErrorCode::ServiceNotCompleted,
                DomainError::DepositNotPaid { .. } => ErrorCode::DepositNotPaid,
                DomainError::NoRemainingBalance { .. } => ErrorCode::NoRemainingBalance,
                DomainError::StaleState { .. } => ErrorCode::StaleState,
                DomainError::ReservationNotFound { .. } => ErrorCode::ReservationNotFound,
                DomainError::PaymentNotFound { .. } => ErrorCode::PaymentNotFound,
                DomainError::UnauthorizedReservationAccess { .. } => {
                    ErrorCode::UnauthorizedReservationAccess
                }
            },
            AppErrorKind::Infrastructure(err) => match err {
                InfrastructureError::Database { .. } => ErrorCode::DatabaseError,
                InfrastructureError::Configuration { .. } => ErrorCode::ConfigurationError,
            },
            AppErrorKind::External(err) => match err {
                ExternalError::PaymentGateway { .. } => ErrorCode::PaymentGatewayError,
                ExternalError::Notification { .. } => ErrorCode::NotificationError,
                ExternalError::Timeout { .. } => ErrorCode::ExternalServiceTimeout,
            },
            AppErrorKind::Validation(_) => ErrorCode::ValidationError,
        }
    }

    /// Get user-friendly error message
    pub fn user_message(&self) -> String {
        match &self.kind {
            AppErrorKind::Domain(err) => match err {
                DomainError::InvalidDepositAmount {
                    deposit,
                    min_allowed,
                    max_allowed,
                } => {
                    format!(
                        "Deposit {} is outside the allowed range {}..={} (20-30% of the total)",
                        deposit, min_allowed, max_allowed
                    )
                }
                DomainError::DuplicatePendingPayment {
                    reservation_id,
                    stage,
                } => {
                    format!(
                        "A pending {} payment already exists for reservation '{}'",
                        stage, reservation_id
                    )
                }
                DomainError::ServiceNotCompleted { reservation_id } => {
                    format!(
                        "Reservation '{}' has not been marked completed; final payment is not due yet",
                        reservation_id
                    )
                }
                DomainError::DepositNotPaid { reservation_id } => {
                    format!(
                        "Deposit for reservation '{}' has not been paid",
                        reservation_id
                    )
                }
                DomainError::NoRemainingBalance { reservation_id } => {
                    format!(
                        "Reservation '{}' has no remaining balance to collect",
                        reservation_id
                    )
                }
                DomainError::StaleState {
                    reservation_id,
                    current,
                    requested,
                } => {
                    format!(
                        "Reservation '{}' is in state '{}'; transition to '{}' is not allowed",
                        reservation_id, current, requested
                    )
                }
                DomainError::ReservationNotFound { reservation_id } => {
                    format!("Reservation '{}' not found", reservation_id)
                }
                DomainError::PaymentNotFound {
                    reservation_id,
                    stage,
                } => {
                    format!(
                        "No {} payment found for reservation '{}'",
                        stage, reservation_id
                    )
                }
                DomainError::UnauthorizedReservationAccess { reservation_id, .. } => {
                    format!("You do not have access to reservation '{}'", reservation_id)
                }
            },
            AppErrorKind::Infrastructure(_) => {
                "Service temporarily unavailable. Please try again later".to_string()
            }
            AppErrorKind::External(err) => match err {
                ExternalError::PaymentGateway {
                    gateway,
                    is_retryable,
                    ..
                } => {
                    if *is_retryable {
                        format!(
                            "Payment gateway ({}) is temporarily unavailable. Please try again",
                            gateway
                        )
                    } else {
                        "Payment processing failed. Please contact support".to_string()
                    }
                }
                ExternalError::Notification { .. } => "Notification delivery failed".to_string(),
                ExternalError::Timeout {
                    service,
                    timeout_secs,
                } => {
                    format!(
                        "{} request timed out after {} seconds. Please try again",
                        service, timeout_secs
                    )
                }
            },
            AppErrorKind::Validation(err) => match err {
                ValidationError::InvalidAmount { amount, reason } => {
                    format!("Invalid amount '{}': {}", amount, reason)
                }
                ValidationError::MissingField { field } => {
                    format!("Required field '{}' is missing", field)
                }
                ValidationError::OutOfRange { field, min, max } => match (min, max) {
                    (Some(min), Some(max)) => {
                        format!("Field '{}' must be between {} and {}", field, min, max)
                    }
                    (Some(min), None) => format!("Field '{}' must be at least {}", field, min),
                    (None, Some(max)) => format!("Field '{}' must be at most {}", field, max),
                    (None, None) => format!("Field '{}' is out of acceptable range", field),
                },
            },
        }
    }

    /// Check if error is retryable
    pub fn is_retryable(&self) -> bool {
        match &self.kind {
            AppErrorKind::Domain(_) => false,
            AppErrorKind::Infrastructure(err) => match err {
                InfrastructureError::Database { is_retryable, .. } => *is_retryable,
                InfrastructureError::Configuration { .. } => false,
            },
            AppErrorKind::External(err) => match err {
                ExternalError::PaymentGateway { is_retryable, .. } => *is_retryable,
                ExternalError::Notification { .. } => true,
                ExternalError::Timeout { .. } => true,
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
