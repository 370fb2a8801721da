//! Domain error model.

use thiserror::Error;

use crate::money::Quantity;

/// Result type used across the domain layer.
pub type DomainResult<T> = Result<T, DomainError>;

/// Domain-level error.
///
/// Deterministic business failures only. Storage failures live in `stockledger-infra`.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// A value failed validation (e.g. malformed input, non-positive quantity).
    #[error("validation failed: {0}")]
    Validation(String),

    /// An identifier was invalid (e.g. parse failure).
    #[error("invalid identifier: {0}")]
    InvalidId(String),

    /// The requested change would drive an on-hand quantity below zero.
    #[error("requested quantity ({requested}) is more than the available one ({available})")]
    InsufficientQuantity {
        requested: Quantity,
        available: Quantity,
    },

    /// A referenced record does not exist (or was already consumed).
    #[error("not found: {0}")]
    NotFound(String),

    /// An issue could not be attributed to any cost layer.
    ///
    /// The projection says the units exist but the ledger has no layer left to draw them
    /// from. This is a data-integrity failure, never a user error.
    #[error("no cost layer available for stock {stock_id}: {unallocated} unit(s) unallocated")]
    NoAvailableLayer {
        stock_id: String,
        unallocated: Quantity,
    },

    /// A ledger/projection invariant was violated.
    #[error("invariant violated: {0}")]
    InvariantViolation(String),
}

impl DomainError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn invariant(msg: impl Into<String>) -> Self {
        Self::InvariantViolation(msg.into())
    }

    pub fn invalid_id(msg: impl Into<String>) -> Self {
        Self::InvalidId(msg.into())
    }

    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound(what.into())
    }

    pub fn insufficient(requested: Quantity, available: Quantity) -> Self {
        Self::InsufficientQuantity {
            requested,
            available,
        }
    }

    /// True for failures that mean stored data is inconsistent.
    pub fn is_integrity_violation(&self) -> bool {
        matches!(
            self,
            Self::NoAvailableLayer { .. } | Self::InvariantViolation(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insufficient_quantity_message_names_both_sides() {
        let err = DomainError::insufficient(12, 7);
        assert_eq!(
            err.to_string(),
            "requested quantity (12) is more than the available one (7)"
        );
        assert!(!err.is_integrity_violation());
    }

    #[test]
    fn missing_layer_is_an_integrity_violation() {
        let err = DomainError::NoAvailableLayer {
            stock_id: "CARD-1".into(),
            unallocated: 3,
        };
        assert!(err.is_integrity_violation());
        assert!(err.to_string().contains("CARD-1"));
    }
}
