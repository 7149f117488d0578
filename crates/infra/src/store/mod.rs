//! Storage port and its implementations.
//!
//! - [`ErpStore`]/[`ErpTx`]: the transaction port the services talk to.
//! - [`InMemoryStore`]: serializable in-memory implementation (tests/dev).
//! - [`PostgresStore`]: sqlx/Postgres implementation with row-level locking.

pub mod in_memory;
pub mod postgres;
mod r#trait;

pub use in_memory::InMemoryStore;
pub use postgres::PostgresStore;
pub use r#trait::{ErpStore, ErpTx, StoreError};
