//! Domain error model.

use thiserror::Error;

use crate::id::{ProductId, WarehouseId};

/// Result type used across the domain layer.
pub type DomainResult<T> = Result<T, DomainError>;

/// Domain-level error.
///
/// Keep this focused on deterministic, business/domain failures (validation,
/// lifecycle guards, stock checks). Infrastructure concerns belong elsewhere.
/// All variants are recoverable and surfaced synchronously to the caller as
/// the outcome of the enclosing unit of work.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// A value failed validation (e.g. empty item list, negative quantity).
    #[error("validation failed: {0}")]
    Validation(String),

    /// An operation was attempted from the wrong lifecycle state.
    #[error("invalid state: requires '{required}', current status is '{actual}'")]
    InvalidState { required: String, actual: String },

    /// A stock check failed at confirm or fulfill time.
    #[error(
        "insufficient inventory for product {product_id} at warehouse {warehouse_id}: \
         available {available}, requested {requested}"
    )]
    InsufficientInventory {
        product_id: ProductId,
        warehouse_id: WarehouseId,
        available: i64,
        requested: i64,
    },

    /// The sales order already has an invoice (at most one per order).
    #[error("sales order already has an invoice")]
    DuplicateInvoice,

    /// A requested record was not found (domain-level).
    #[error("not found")]
    NotFound,

    /// An identifier was invalid (e.g. parse failure).
    #[error("invalid identifier: {0}")]
    InvalidId(String),
}

impl DomainError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn invalid_state(required: impl Into<String>, actual: impl Into<String>) -> Self {
        Self::InvalidState {
            required: required.into(),
            actual: actual.into(),
        }
    }

    pub fn insufficient_inventory(
        product_id: ProductId,
        warehouse_id: WarehouseId,
        available: i64,
        requested: i64,
    ) -> Self {
        Self::InsufficientInventory {
            product_id,
            warehouse_id,
            available,
            requested,
        }
    }

    pub fn invalid_id(msg: impl Into<String>) -> Self {
        Self::InvalidId(msg.into())
    }

    pub fn not_found() -> Self {
        Self::NotFound
    }
}
