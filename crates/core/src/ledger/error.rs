//! Ledger error taxonomy.
//!
//! Every mutation either commits completely or returns one of these errors
//! with nothing committed. Only `ConcurrencyConflict` is retryable.

use rust_decimal::Decimal;
use stockledger_shared::AppError;
use stockledger_shared::types::{CarrierId, LotId, Money, OwnerId};

use super::CarrierKind;
use thiserror::Error;

/// Errors that can occur during ledger operations.
#[derive(Debug, Error)]
pub enum LedgerError {
    // ========== Validation Errors ==========
    /// Malformed input, e.g. a non-positive quantity or amount.
    #[error("Validation failed: {0}")]
    Validation(String),

    // ========== Domain Errors ==========
    /// Consumption exceeds the quantity on hand.
    #[error("Insufficient stock in lot {lot_id}: requested {requested}, available {available}")]
    InsufficientStock {
        /// The lot.
        lot_id: LotId,
        /// Quantity requested.
        requested: Decimal,
        /// Quantity on hand when checked under lock.
        available: Decimal,
    },

    /// Settlement exceeds the outstanding balance across all applicable carriers.
    #[error("Overpayment: requested {requested}, outstanding {outstanding}")]
    Overpayment {
        /// Amount requested.
        requested: Money,
        /// Outstanding balance when checked under lock.
        outstanding: Money,
    },

    /// Carrier is closed and accepts no further mutation.
    #[error("Carrier {0} is closed")]
    CarrierClosed(CarrierId),

    // ========== Not Found ==========
    /// Lot not found.
    #[error("Lot not found: {0}")]
    LotNotFound(LotId),

    /// Carrier not found.
    #[error("Carrier not found: {0}")]
    CarrierNotFound(CarrierId),

    /// Owner has no carriers of the kind, in any status.
    #[error("Owner {owner_id} has no {kind} carriers")]
    OwnerNotFound {
        /// The owner.
        owner_id: OwnerId,
        /// Carrier kind looked up.
        kind: CarrierKind,
    },

    // ========== Concurrency Errors ==========
    /// Lock could not be acquired in time or the store aborted on contention.
    #[error("Concurrent modification detected, please retry: {0}")]
    ConcurrencyConflict(String),

    // ========== Storage Errors ==========
    /// Storage failure unrelated to contention.
    #[error("Storage error: {0}")]
    Storage(String),
}

impl LedgerError {
    /// Shorthand for a validation error.
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    /// Returns the error code for API responses.
    #[must_use]
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::Validation(_) => "VALIDATION_ERROR",
            Self::InsufficientStock { .. } => "INSUFFICIENT_STOCK",
            Self::Overpayment { .. } => "OVERPAYMENT",
            Self::CarrierClosed(_) => "CARRIER_CLOSED",
            Self::LotNotFound(_) => "LOT_NOT_FOUND",
            Self::CarrierNotFound(_) => "CARRIER_NOT_FOUND",
            Self::OwnerNotFound { .. } => "OWNER_NOT_FOUND",
            Self::ConcurrencyConflict(_) => "CONCURRENCY_CONFLICT",
            Self::Storage(_) => "STORAGE_ERROR",
        }
    }

    /// Returns the HTTP status code for this error.
    #[must_use]
    pub fn http_status_code(&self) -> u16 {
        match self {
            // 400 Bad Request - caller's fault
            Self::Validation(_) => 400,

            // 404 Not Found
            Self::LotNotFound(_) | Self::CarrierNotFound(_) | Self::OwnerNotFound { .. } => 404,

            // 409 Conflict - retryable contention
            Self::ConcurrencyConflict(_) => 409,

            // 422 Unprocessable - terminal business rule
            Self::InsufficientStock { .. } | Self::Overpayment { .. } | Self::CarrierClosed(_) => {
                422
            }

            // 500 Internal Server Error
            Self::Storage(_) => 500,
        }
    }

    /// Returns true if this error is retryable.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::ConcurrencyConflict(_))
    }
}

impl From<LedgerError> for AppError {
    fn from(err: LedgerError) -> Self {
        let message = err.to_string();
        match err {
            LedgerError::Validation(_) => Self::Validation(message),
            LedgerError::InsufficientStock { .. }
            | LedgerError::Overpayment { .. }
            | LedgerError::CarrierClosed(_) => Self::BusinessRule(message),
            LedgerError::LotNotFound(_)
            | LedgerError::CarrierNotFound(_)
            | LedgerError::OwnerNotFound { .. } => Self::NotFound(message),
            LedgerError::ConcurrencyConflict(_) => Self::Conflict(message),
            LedgerError::Storage(_) => Self::Database(message),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_error_codes() {
        assert_eq!(LedgerError::validation("qty").error_code(), "VALIDATION_ERROR");
        assert_eq!(
            LedgerError::Overpayment {
                requested: Money::new(dec!(1)),
                outstanding: Money::ZERO,
            }
            .error_code(),
            "OVERPAYMENT"
        );
        assert_eq!(
            LedgerError::LotNotFound(LotId::new()).error_code(),
            "LOT_NOT_FOUND"
        );
        assert_eq!(
            LedgerError::OwnerNotFound {
                owner_id: OwnerId::new(),
                kind: CarrierKind::CustomerCredit,
            }
            .error_code(),
            "OWNER_NOT_FOUND"
        );
    }

    #[test]
    fn test_http_status_codes() {
        assert_eq!(LedgerError::validation("x").http_status_code(), 400);
        assert_eq!(LedgerError::CarrierNotFound(CarrierId::new()).http_status_code(), 404);
        assert_eq!(
            LedgerError::ConcurrencyConflict("lock".into()).http_status_code(),
            409
        );
        assert_eq!(
            LedgerError::InsufficientStock {
                lot_id: LotId::new(),
                requested: dec!(3),
                available: dec!(2),
            }
            .http_status_code(),
            422
        );
        assert_eq!(LedgerError::Storage("down".into()).http_status_code(), 500);
    }

    #[test]
    fn test_only_conflicts_are_retryable() {
        assert!(LedgerError::ConcurrencyConflict("lock".into()).is_retryable());
        assert!(!LedgerError::validation("qty").is_retryable());
        assert!(!LedgerError::CarrierClosed(CarrierId::new()).is_retryable());
        assert!(!LedgerError::Storage("down".into()).is_retryable());
    }

    #[test]
    fn test_error_display() {
        let err = LedgerError::Overpayment {
            requested: Money::new(dec!(150)),
            outstanding: Money::new(dec!(100)),
        };
        assert_eq!(err.to_string(), "Overpayment: requested 150.00, outstanding 100.00");
    }

    #[test]
    fn test_maps_to_app_error() {
        let app: AppError = LedgerError::ConcurrencyConflict("lock".into()).into();
        assert!(app.is_retryable());
        let app: AppError = LedgerError::CarrierNotFound(CarrierId::new()).into();
        assert_eq!(app.status_code(), 404);
        let app: AppError = LedgerError::OwnerNotFound {
            owner_id: OwnerId::new(),
            kind: CarrierKind::Grn,
        }
        .into();
        assert_eq!(app.status_code(), 404);
        let app: AppError = LedgerError::CarrierClosed(CarrierId::new()).into();
        assert_eq!(app.status_code(), 422);
    }
}
