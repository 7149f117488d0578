//! Order confirmation and stock-decrementing fulfillment.

use tracing::instrument;

use anvilerp_core::DomainError;
use anvilerp_sales::{SalesOrder, SalesOrderId};

use crate::store::{ErpStore, StoreError};

use super::check_availability;

/// Moves orders through confirm and fulfill, keeping inventory honest.
#[derive(Debug, Clone)]
pub struct FulfillmentCoordinator<S> {
    store: S,
}

impl<S: ErpStore> FulfillmentCoordinator<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// draft → confirmed, after an advisory stock check.
    ///
    /// No inventory is reserved or decremented here; a shortfall discovered
    /// later is fulfill's problem, which re-checks under row locks.
    #[instrument(skip(self), fields(order_id = %order_id), err)]
    pub async fn confirm(&self, order_id: SalesOrderId) -> Result<SalesOrder, StoreError> {
        let mut tx = self.store.begin().await?;
        let mut order = tx.load_order(order_id).await?;

        check_availability(tx.as_mut(), &order).await?;
        order.confirm()?;

        tx.update_order(&order).await?;
        tx.commit().await?;

        tracing::info!(order_id = %order.id, "order confirmed");
        Ok(order)
    }

    /// confirmed → fulfilled, decrementing every demanded position.
    ///
    /// Positions are locked in ascending key order (no deadlock cycles) and
    /// decremented under the lock; the first shortfall aborts the whole
    /// transaction, leaving both the order and all stock untouched.
    #[instrument(skip(self), fields(order_id = %order_id), err)]
    pub async fn fulfill(&self, order_id: SalesOrderId) -> Result<SalesOrder, StoreError> {
        let mut tx = self.store.begin().await?;
        let mut order = tx.load_order(order_id).await?;

        // Lifecycle guard first: a draft or cancelled order must not touch
        // stock at all.
        order.fulfill()?;

        for demand in order.stock_demands() {
            let mut position = tx.lock_position(demand.key).await?.ok_or_else(|| {
                DomainError::insufficient_inventory(
                    demand.key.product_id,
                    demand.key.warehouse_id,
                    0,
                    demand.quantity,
                )
            })?;
            position.decrement(demand.quantity)?;
            if position.needs_reorder() {
                tracing::warn!(
                    position = %position.key,
                    quantity = position.quantity,
                    minimum = position.minimum_stock_level,
                    "position below minimum stock level"
                );
            }
            tx.save_position(&position).await?;
        }

        tx.update_order(&order).await?;
        tx.commit().await?;

        tracing::info!(order_id = %order.id, "order fulfilled");
        Ok(order)
    }
}
