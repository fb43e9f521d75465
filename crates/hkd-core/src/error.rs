//! # Error Types
//!
//! Domain-specific error types for hkd-core.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Error Types                                     │
//! │                                                                         │
//! │  hkd-core errors (this file)                                            │
//! │  ├── CoreError        - Business rule violations                        │
//! │  └── ValidationError  - Input validation failures                       │
//! │                                                                         │
//! │  hkd-store errors (separate crate)                                      │
//! │  └── StoreError       - Local durable store failures                    │
//! │                                                                         │
//! │  hkd-sync errors (separate crate)                                       │
//! │  ├── SyncError        - Remote/engine failures                          │
//! │  └── ServiceError     - What the UI layer sees                          │
//! │                                                                         │
//! │  Flow: ValidationError → CoreError → ServiceError → UI message          │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Conflicts are deliberately absent from this taxonomy: concurrent edits are
//! resolved silently by last-write-wins, never surfaced as errors.

use thiserror::Error;

// =============================================================================
// Core Error
// =============================================================================

/// Core business logic errors.
///
/// These represent business rule violations. They are caught at the service
/// boundary and translated into user-facing messages; they are never retried
/// automatically.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Owner cannot be found (or is soft-deleted).
    #[error("Owner not found: {0}")]
    OwnerNotFound(String),

    /// Category cannot be found for a product operation.
    #[error("Category not found: {0}")]
    CategoryNotFound(String),

    /// Product cannot be found.
    #[error("Product not found: {0}")]
    ProductNotFound(String),

    /// Insufficient stock to complete a sale line.
    ///
    /// ## When This Occurs
    /// A sale requests more units than the product currently has. The sale is
    /// rejected before any stock mutation happens.
    #[error("Insufficient stock for {name}: available {available}, requested {requested}")]
    InsufficientStock {
        name: String,
        available: i64,
        requested: i64,
    },

    /// Phone number already registered to another owner.
    #[error("Phone number '{0}' is already registered")]
    DuplicatePhone(String),

    /// Password hashing/verification machinery failed.
    /// Distinct from a wrong password, which is not an error.
    #[error("Password hashing failed: {0}")]
    PasswordHash(String),

    /// Validation error (wraps ValidationError).
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),
}

// =============================================================================
// Validation Error
// =============================================================================

/// Input validation errors.
///
/// Reported to the caller synchronously, before business logic runs.
#[derive(Debug, Error)]
pub enum ValidationError {
    /// A required field is missing or empty.
    #[error("{field} is required")]
    Required { field: String },

    /// Field value is too short.
    #[error("{field} must be at least {min} characters")]
    TooShort { field: String, min: usize },

    /// Field value is too long.
    #[error("{field} must be at most {max} characters")]
    TooLong { field: String, max: usize },

    /// Numeric value is out of range.
    #[error("{field} must be between {min} and {max}")]
    OutOfRange { field: String, min: i64, max: i64 },

    /// Value must be positive.
    #[error("{field} must be positive")]
    MustBePositive { field: String },

    /// Invalid format (e.g., malformed phone number).
    #[error("{field} has invalid format: {reason}")]
    InvalidFormat { field: String, reason: String },
}

// =============================================================================
// Result Type Alias
// =============================================================================

/// Convenience type alias for Results with CoreError.
pub type CoreResult<T> = Result<T, CoreError>;

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let err = CoreError::InsufficientStock {
            name: "Mì Hảo Hảo".to_string(),
            available: 3,
            requested: 5,
        };
        assert_eq!(
            err.to_string(),
            "Insufficient stock for Mì Hảo Hảo: available 3, requested 5"
        );
    }

    #[test]
    fn test_validation_converts_to_core_error() {
        let validation_err = ValidationError::Required {
            field: "phone".to_string(),
        };
        let core_err: CoreError = validation_err.into();
        assert!(matches!(core_err, CoreError::Validation(_)));
    }
}
