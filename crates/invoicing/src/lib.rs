//! Invoicing domain module.
//!
//! An invoice is created exactly once per sales order, only from a fulfilled
//! order, copying the order total at creation time.

pub mod invoice;

pub use invoice::{Invoice, InvoiceId, InvoiceStatus};
