//! `anvilerp-core` — domain foundation building blocks.
//!
//! This crate contains **pure domain** primitives (no infrastructure concerns):
//! strongly-typed identifiers, the domain error taxonomy, and the document
//! number allocation helper shared by sales and invoicing.

pub mod error;
pub mod id;
pub mod numbering;

pub use error::{DomainError, DomainResult};
pub use id::{AccountId, AggregateId, CustomerId, ProductId, UserId, WarehouseId};
pub use numbering::{DocumentNumber, INVOICE_NUMBER_PREFIX, ORDER_NUMBER_PREFIX};
