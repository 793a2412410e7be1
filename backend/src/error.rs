//! Error handling for the stock ledger
//!
//! Business failures (`NotFound`, `InsufficientStock`) are detected before any
//! write and are reported distinctly so callers can show different messages.

use serde::Serialize;
use thiserror::Error;
use uuid::Uuid;

/// Ledger error types
#[derive(Error, Debug)]
pub enum LedgerError {
    // Business errors
    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("Insufficient stock for product {product_id}: requested {requested}, available {available}")]
    InsufficientStock {
        product_id: Uuid,
        available: i64,
        requested: i64,
    },

    // Validation errors
    #[error("Validation error: {message}")]
    Validation { field: String, message: String },

    #[error("Duplicate entry: {0}")]
    DuplicateEntry(String),

    #[error("Conflict: {message}")]
    Conflict { resource: String, message: String },

    // Concurrency errors
    #[error("Concurrent update detected: {0}")]
    ConflictRetryable(String),

    #[error("Ledger busy: {0}")]
    Busy(String),

    // Infrastructure errors
    #[error("Infrastructure failure: {0}")]
    Infrastructure(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Configuration error: {0}")]
    Configuration(String),
}

impl LedgerError {
    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        LedgerError::Validation {
            field: field.into(),
            message: message.into(),
        }
    }

    pub fn product_not_found(product_id: Uuid) -> Self {
        LedgerError::NotFound(format!("Product {}", product_id))
    }

    /// Stable machine-readable code
    pub fn code(&self) -> &'static str {
        match self {
            LedgerError::NotFound(_) => "NOT_FOUND",
            LedgerError::InsufficientStock { .. } => "INSUFFICIENT_STOCK",
            LedgerError::Validation { .. } => "VALIDATION_ERROR",
            LedgerError::DuplicateEntry(_) => "DUPLICATE_ENTRY",
            LedgerError::Conflict { .. } => "CONFLICT",
            LedgerError::ConflictRetryable(_) => "CONFLICT_RETRYABLE",
            LedgerError::Busy(_) => "BUSY",
            LedgerError::Infrastructure(_) => "INFRASTRUCTURE_FAILURE",
            LedgerError::Database(_) => "DATABASE_ERROR",
            LedgerError::Configuration(_) => "CONFIGURATION_ERROR",
        }
    }

    /// Whether a caller may safely retry the same request.
    ///
    /// No partial state is left behind by any failed write, so infrastructure
    /// failures are retryable from outside.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            LedgerError::Busy(_) | LedgerError::Infrastructure(_) | LedgerError::Database(_)
        )
    }
}

impl From<validator::ValidationErrors> for LedgerError {
    fn from(errors: validator::ValidationErrors) -> Self {
        let (field, message) = errors
            .field_errors()
            .into_iter()
            .next()
            .and_then(|(field, errs)| {
                errs.first().map(|e| {
                    let message = e
                        .message
                        .as_ref()
                        .map(|m| m.to_string())
                        .unwrap_or_else(|| format!("{} is invalid", field));
                    (field.to_string(), message)
                })
            })
            .unwrap_or_else(|| ("input".to_string(), errors.to_string()));
        LedgerError::Validation { field, message }
    }
}

/// Error response structure
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: ErrorDetail,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorDetail {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
}

impl From<&LedgerError> for ErrorDetail {
    fn from(err: &LedgerError) -> Self {
        let (message, field) = match err {
            LedgerError::NotFound(resource) => (format!("{} not found", resource), None),
            LedgerError::InsufficientStock {
                available,
                requested,
                ..
            } => (
                format!(
                    "Not enough stock: requested {}, only {} available",
                    requested, available
                ),
                None,
            ),
            LedgerError::Validation { field, message } => (message.clone(), Some(field.clone())),
            LedgerError::DuplicateEntry(field) => (
                format!("A record with this {} already exists", field),
                Some(field.clone()),
            ),
            LedgerError::Conflict { resource, message } => {
                (message.clone(), Some(resource.clone()))
            }
            LedgerError::ConflictRetryable(_) | LedgerError::Busy(_) => (
                "The product is being updated by another request, please try again".to_string(),
                None,
            ),
            LedgerError::Infrastructure(_) | LedgerError::Database(_) => {
                ("A storage error occurred".to_string(), None)
            }
            LedgerError::Configuration(_) => ("The ledger is misconfigured".to_string(), None),
        };

        ErrorDetail {
            code: err.code().to_string(),
            message,
            field,
        }
    }
}

impl From<&LedgerError> for ErrorResponse {
    fn from(err: &LedgerError) -> Self {
        ErrorResponse {
            error: ErrorDetail::from(err),
        }
    }
}

/// Result type alias for ledger operations
pub type LedgerResult<T> = Result<T, LedgerError>;
