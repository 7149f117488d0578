//! Sales orders domain module.
//!
//! This crate contains business rules for sales orders, implemented purely as
//! deterministic domain logic (no IO, no HTTP, no storage). Line totals and
//! order totals are explicit derivations computed before persistence.

pub mod order;

pub use order::{
    line_total, order_total, NewOrderItem, OrderPatch, SalesOrder, SalesOrderId, SalesOrderItem,
    SalesOrderStatus,
};
