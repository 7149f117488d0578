//! Sales order creation and modification.

use chrono::{NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use tracing::instrument;

use anvilerp_core::{
    AggregateId, CustomerId, DocumentNumber, DomainError, UserId, ORDER_NUMBER_PREFIX,
};
use anvilerp_sales::{NewOrderItem, OrderPatch, SalesOrder, SalesOrderId, SalesOrderStatus};

use crate::store::{ErpStore, StoreError};

use super::check_availability;

/// Input for [`OrderEngine::create_order`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateOrder {
    pub customer_id: CustomerId,
    pub order_date: NaiveDate,
    pub items: Vec<NewOrderItem>,
    pub actor: UserId,
    pub notes: String,
}

/// Creates and modifies sales orders.
#[derive(Debug, Clone)]
pub struct OrderEngine<S> {
    store: S,
}

impl<S: ErpStore> OrderEngine<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// Create a draft order with a freshly allocated order number.
    ///
    /// The number is dated on the allocation day (today, UTC), not the
    /// business `order_date`; allocation is serialized per series inside the
    /// transaction, so concurrent creators get distinct sequences.
    #[instrument(skip(self, input), fields(customer_id = %input.customer_id), err)]
    pub async fn create_order(&self, input: CreateOrder) -> Result<SalesOrder, StoreError> {
        let mut tx = self.store.begin().await?;

        let today = Utc::now().date_naive();
        let highest = tx.highest_sequence(ORDER_NUMBER_PREFIX, today).await?;
        let number = DocumentNumber::next(ORDER_NUMBER_PREFIX, today, highest);

        let order = SalesOrder::create(
            SalesOrderId::new(AggregateId::new()),
            number.to_string(),
            input.customer_id,
            input.order_date,
            input.items,
            input.actor,
            input.notes,
        )?;

        tx.insert_order(&order).await?;
        tx.commit().await?;

        tracing::info!(order_id = %order.id, order_number = %order.order_number, "order created");
        Ok(order)
    }

    /// Apply a partial update.
    ///
    /// Field edits and item replacement require draft status. The one
    /// exception is a patch that is exactly a transition to cancelled, which
    /// follows the cancel rules instead (draft or confirmed). A patch may
    /// also move the order to confirmed, which runs the advisory stock check
    /// first; fulfilled and invoiced are not reachable this way.
    #[instrument(skip(self, patch), fields(order_id = %order_id), err)]
    pub async fn update_order(
        &self,
        order_id: SalesOrderId,
        patch: OrderPatch,
    ) -> Result<SalesOrder, StoreError> {
        let mut tx = self.store.begin().await?;
        let mut order = tx.load_order(order_id).await?;

        if patch.is_cancel_only() {
            order.cancel()?;
            tx.update_order(&order).await?;
            tx.commit().await?;
            return Ok(order);
        }

        if !order.is_modifiable() {
            return Err(DomainError::invalid_state(
                SalesOrderStatus::Draft.as_str(),
                order.status.as_str(),
            )
            .into());
        }

        if let Some(customer_id) = patch.customer_id {
            order.customer_id = customer_id;
        }
        if let Some(order_date) = patch.order_date {
            order.order_date = order_date;
        }
        if let Some(notes) = patch.notes {
            order.notes = notes;
        }
        if let Some(items) = patch.items {
            order.replace_items(items)?;
        }

        match patch.status {
            None | Some(SalesOrderStatus::Draft) => {}
            Some(SalesOrderStatus::Confirmed) => {
                check_availability(tx.as_mut(), &order).await?;
                order.confirm()?;
            }
            Some(SalesOrderStatus::Cancelled) => {
                order.cancel()?;
            }
            Some(other @ (SalesOrderStatus::Fulfilled | SalesOrderStatus::Invoiced)) => {
                return Err(DomainError::validation(format!(
                    "status '{other}' cannot be set directly; use the fulfillment and \
                     invoicing operations"
                ))
                .into());
            }
        }

        tx.update_order(&order).await?;
        tx.commit().await?;
        Ok(order)
    }

    /// Cancel an order (draft or confirmed only).
    #[instrument(skip(self), fields(order_id = %order_id), err)]
    pub async fn cancel_order(&self, order_id: SalesOrderId) -> Result<SalesOrder, StoreError> {
        let mut tx = self.store.begin().await?;
        let mut order = tx.load_order(order_id).await?;
        order.cancel()?;
        tx.update_order(&order).await?;
        tx.commit().await?;

        tracing::info!(order_id = %order.id, "order cancelled");
        Ok(order)
    }
}
