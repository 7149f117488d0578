//! Transactional services over the storage port.
//!
//! Each public operation is one unit of work: it begins a transaction, runs
//! the domain logic against it, and commits at the end. Any error before
//! commit rolls the whole operation back.

mod fulfillment;
mod invoicing;
mod orders;

pub use fulfillment::FulfillmentCoordinator;
pub use invoicing::{CreateInvoice, InvoicePoster};
pub use orders::{CreateOrder, OrderEngine};

use anvilerp_core::DomainError;
use anvilerp_sales::SalesOrder;

use crate::store::{ErpTx, StoreError};

/// Advisory stock check: every merged demand must be coverable right now.
///
/// Reads without locks; a concurrent change can invalidate the answer before
/// fulfillment, which re-checks under row locks. A missing position record
/// counts as zero on hand.
pub(crate) async fn check_availability(
    tx: &mut dyn ErpTx,
    order: &SalesOrder,
) -> Result<(), StoreError> {
    for demand in order.stock_demands() {
        match tx.get_position(demand.key).await? {
            Some(position) => position.check_available(demand.quantity)?,
            None => {
                return Err(DomainError::insufficient_inventory(
                    demand.key.product_id,
                    demand.key.warehouse_id,
                    0,
                    demand.quantity,
                )
                .into());
            }
        }
    }
    Ok(())
}
