//! Inventory ledger domain module.
//!
//! Per-(product, warehouse) on-hand quantities with a floor-checked decrement.
//! Pure domain logic only; row locking and transactions live in the storage
//! layer, which calls into these checks while holding its locks.

pub mod position;

pub use position::{merge_demands, InventoryPosition, PositionKey, StockDemand};
