//! Infrastructure layer: storage port and implementations, plus the
//! transactional services that orchestrate the order lifecycle.
//!
//! Concurrency correctness lives here: every mutating multi-step operation
//! runs inside one [`store::ErpTx`] unit of work, and `fulfill` acquires its
//! position row locks in the deterministic order the sales domain provides.

pub mod services;
pub mod store;


pub use services::{
    CreateInvoice, CreateOrder, FulfillmentCoordinator, InvoicePoster, OrderEngine,
};
pub use store::{ErpStore, ErpTx, InMemoryStore, PostgresStore, StoreError};
