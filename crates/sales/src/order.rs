use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use anvilerp_core::{
    AggregateId, CustomerId, DomainError, DomainResult, ProductId, UserId, WarehouseId,
};
use anvilerp_inventory::{merge_demands, PositionKey, StockDemand};

/// Sales order identifier.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SalesOrderId(pub AggregateId);

impl SalesOrderId {
    pub fn new(id: AggregateId) -> Self {
        Self(id)
    }
}

impl core::fmt::Display for SalesOrderId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

/// Sales order status lifecycle.
///
/// Transitions are one-directional (draft → confirmed → fulfilled → invoiced)
/// except `Cancelled`, which is reachable from draft or confirmed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SalesOrderStatus {
    Draft,
    Confirmed,
    Fulfilled,
    Invoiced,
    Cancelled,
}

impl SalesOrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SalesOrderStatus::Draft => "draft",
            SalesOrderStatus::Confirmed => "confirmed",
            SalesOrderStatus::Fulfilled => "fulfilled",
            SalesOrderStatus::Invoiced => "invoiced",
            SalesOrderStatus::Cancelled => "cancelled",
        }
    }
}

impl core::fmt::Display for SalesOrderStatus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl core::str::FromStr for SalesOrderStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "draft" => Ok(SalesOrderStatus::Draft),
            "confirmed" => Ok(SalesOrderStatus::Confirmed),
            "fulfilled" => Ok(SalesOrderStatus::Fulfilled),
            "invoiced" => Ok(SalesOrderStatus::Invoiced),
            "cancelled" => Ok(SalesOrderStatus::Cancelled),
            other => Err(DomainError::validation(format!(
                "unknown sales order status '{other}'"
            ))),
        }
    }
}

/// Line total derivation: `quantity × unit_price`, in the smallest currency
/// unit. Recomputed on every item write, never read from input.
pub fn line_total(quantity: i64, unit_price: i64) -> DomainResult<i64> {
    quantity
        .checked_mul(unit_price)
        .ok_or_else(|| DomainError::validation("line total overflows amount range"))
}

/// Order total derivation: sum of line totals.
pub fn order_total(items: &[SalesOrderItem]) -> DomainResult<i64> {
    items.iter().try_fold(0i64, |acc, item| {
        acc.checked_add(item.line_total)
            .ok_or_else(|| DomainError::validation("order total overflows amount range"))
    })
}

/// Caller-supplied order line (no derived fields).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewOrderItem {
    pub product_id: ProductId,
    pub warehouse_id: WarehouseId,
    pub quantity: i64,
    /// Price in smallest currency unit (e.g., cents).
    pub unit_price: i64,
}

/// Order line with its derived total. Owned exclusively by its order and
/// replaced as a set on order update.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SalesOrderItem {
    pub product_id: ProductId,
    pub warehouse_id: WarehouseId,
    pub quantity: i64,
    /// Price in smallest currency unit (e.g., cents).
    pub unit_price: i64,
    /// Derived: `quantity × unit_price`.
    pub line_total: i64,
}

impl SalesOrderItem {
    /// Validate an input line and compute its total.
    pub fn from_input(input: NewOrderItem) -> DomainResult<Self> {
        if input.quantity < 1 {
            return Err(DomainError::validation("item quantity must be at least 1"));
        }
        if input.unit_price < 0 {
            return Err(DomainError::validation("unit price cannot be negative"));
        }
        let line_total = line_total(input.quantity, input.unit_price)?;
        Ok(Self {
            product_id: input.product_id,
            warehouse_id: input.warehouse_id,
            quantity: input.quantity,
            unit_price: input.unit_price,
            line_total,
        })
    }

    pub fn position_key(&self) -> PositionKey {
        PositionKey::new(self.product_id, self.warehouse_id)
    }
}

/// Partial update of a sales order.
///
/// Field edits and item replacement require draft status; the one exception
/// is a patch that is *exactly* a transition to `Cancelled`, which is also
/// accepted from confirmed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderPatch {
    pub customer_id: Option<CustomerId>,
    pub order_date: Option<NaiveDate>,
    pub notes: Option<String>,
    pub items: Option<Vec<NewOrderItem>>,
    pub status: Option<SalesOrderStatus>,
}

impl OrderPatch {
    /// True when the patch carries nothing but a transition to `Cancelled`.
    pub fn is_cancel_only(&self) -> bool {
        self.status == Some(SalesOrderStatus::Cancelled)
            && self.customer_id.is_none()
            && self.order_date.is_none()
            && self.notes.is_none()
            && self.items.is_none()
    }
}

/// Sales order header with its owned line items (1..N, order-preserving).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SalesOrder {
    pub id: SalesOrderId,
    pub order_number: String,
    pub customer_id: CustomerId,
    pub order_date: NaiveDate,
    pub status: SalesOrderStatus,
    /// Derived: sum of item line totals, in smallest currency unit.
    pub total_amount: i64,
    pub notes: String,
    pub created_by: UserId,
    pub items: Vec<SalesOrderItem>,
}

impl SalesOrder {
    /// Create a draft order. Requires a non-empty, valid item set; computes
    /// every line total and the order total.
    #[allow(clippy::too_many_arguments)]
    pub fn create(
        id: SalesOrderId,
        order_number: String,
        customer_id: CustomerId,
        order_date: NaiveDate,
        items: Vec<NewOrderItem>,
        created_by: UserId,
        notes: String,
    ) -> DomainResult<Self> {
        let items = Self::build_items(items)?;
        let total_amount = order_total(&items)?;
        Ok(Self {
            id,
            order_number,
            customer_id,
            order_date,
            status: SalesOrderStatus::Draft,
            total_amount,
            notes,
            created_by,
            items,
        })
    }

    fn build_items(items: Vec<NewOrderItem>) -> DomainResult<Vec<SalesOrderItem>> {
        if items.is_empty() {
            return Err(DomainError::validation(
                "sales order must have at least one item",
            ));
        }
        items.into_iter().map(SalesOrderItem::from_input).collect()
    }

    pub fn is_modifiable(&self) -> bool {
        matches!(self.status, SalesOrderStatus::Draft)
    }

    fn ensure_status(&self, required: SalesOrderStatus) -> DomainResult<()> {
        if self.status != required {
            return Err(DomainError::invalid_state(
                required.as_str(),
                self.status.as_str(),
            ));
        }
        Ok(())
    }

    /// Atomically swap the item set (delete-then-recreate semantics) and
    /// recompute the total. Draft orders only.
    pub fn replace_items(&mut self, items: Vec<NewOrderItem>) -> DomainResult<()> {
        self.ensure_status(SalesOrderStatus::Draft)?;
        let items = Self::build_items(items)?;
        self.total_amount = order_total(&items)?;
        self.items = items;
        Ok(())
    }

    /// draft → confirmed. Inventory sufficiency is the caller's advisory
    /// pre-check; this is only the lifecycle guard.
    pub fn confirm(&mut self) -> DomainResult<()> {
        self.ensure_status(SalesOrderStatus::Draft)?;
        self.status = SalesOrderStatus::Confirmed;
        Ok(())
    }

    /// confirmed → fulfilled. The stock decrement happens in the same unit of
    /// work, under row locks held by the storage layer.
    pub fn fulfill(&mut self) -> DomainResult<()> {
        self.ensure_status(SalesOrderStatus::Confirmed)?;
        self.status = SalesOrderStatus::Fulfilled;
        Ok(())
    }

    /// fulfilled → invoiced. Irreversible.
    pub fn mark_invoiced(&mut self) -> DomainResult<()> {
        self.ensure_status(SalesOrderStatus::Fulfilled)?;
        self.status = SalesOrderStatus::Invoiced;
        Ok(())
    }

    /// draft | confirmed → cancelled.
    pub fn cancel(&mut self) -> DomainResult<()> {
        match self.status {
            SalesOrderStatus::Draft | SalesOrderStatus::Confirmed => {
                self.status = SalesOrderStatus::Cancelled;
                Ok(())
            }
            other => Err(DomainError::invalid_state(
                "draft or confirmed",
                other.as_str(),
            )),
        }
    }

    /// Demands this order places on inventory, merged per position and
    /// sorted by the stable lock-ordering key.
    pub fn stock_demands(&self) -> Vec<StockDemand> {
        merge_demands(self.items.iter().map(|item| StockDemand {
            key: item.position_key(),
            quantity: item.quantity,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn test_order_id() -> SalesOrderId {
        SalesOrderId::new(AggregateId::new())
    }

    fn test_item(quantity: i64, unit_price: i64) -> NewOrderItem {
        NewOrderItem {
            product_id: ProductId::new(),
            warehouse_id: WarehouseId::new(),
            quantity,
            unit_price,
        }
    }

    fn test_order(items: Vec<NewOrderItem>) -> DomainResult<SalesOrder> {
        SalesOrder::create(
            test_order_id(),
            "SO-20250115-0001".to_string(),
            CustomerId::new(),
            NaiveDate::from_ymd_opt(2025, 1, 15).unwrap(),
            items,
            UserId::new(),
            String::new(),
        )
    }

    #[test]
    fn create_computes_line_and_order_totals() {
        let order = test_order(vec![test_item(5, 1000), test_item(2, 250)]).unwrap();
        assert_eq!(order.status, SalesOrderStatus::Draft);
        assert_eq!(order.items[0].line_total, 5000);
        assert_eq!(order.items[1].line_total, 500);
        assert_eq!(order.total_amount, 5500);
    }

    #[test]
    fn create_rejects_empty_item_set() {
        let err = test_order(vec![]).unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
    }

    #[test]
    fn create_rejects_zero_quantity_and_negative_price() {
        assert!(matches!(
            test_order(vec![test_item(0, 100)]).unwrap_err(),
            DomainError::Validation(_)
        ));
        assert!(matches!(
            test_order(vec![test_item(1, -1)]).unwrap_err(),
            DomainError::Validation(_)
        ));
    }

    #[test]
    fn zero_price_lines_are_allowed() {
        let order = test_order(vec![test_item(3, 0)]).unwrap();
        assert_eq!(order.total_amount, 0);
    }

    #[test]
    fn replace_items_swaps_set_and_recomputes_total() {
        let mut order = test_order(vec![test_item(5, 1000)]).unwrap();
        order.replace_items(vec![test_item(1, 300)]).unwrap();
        assert_eq!(order.items.len(), 1);
        assert_eq!(order.total_amount, 300);
    }

    #[test]
    fn replace_items_rejects_empty_replacement() {
        let mut order = test_order(vec![test_item(5, 1000)]).unwrap();
        let err = order.replace_items(vec![]).unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
        assert_eq!(order.items.len(), 1);
        assert_eq!(order.total_amount, 5000);
    }

    #[test]
    fn replace_items_requires_draft() {
        let mut order = test_order(vec![test_item(1, 100)]).unwrap();
        order.confirm().unwrap();
        let err = order.replace_items(vec![test_item(2, 100)]).unwrap_err();
        match err {
            DomainError::InvalidState { required, actual } => {
                assert_eq!(required, "draft");
                assert_eq!(actual, "confirmed");
            }
            other => panic!("expected InvalidState, got {other:?}"),
        }
    }

    #[test]
    fn lifecycle_draft_to_invoiced() {
        let mut order = test_order(vec![test_item(1, 100)]).unwrap();
        order.confirm().unwrap();
        assert_eq!(order.status, SalesOrderStatus::Confirmed);
        order.fulfill().unwrap();
        assert_eq!(order.status, SalesOrderStatus::Fulfilled);
        order.mark_invoiced().unwrap();
        assert_eq!(order.status, SalesOrderStatus::Invoiced);
    }

    #[test]
    fn fulfill_requires_confirmed() {
        let mut order = test_order(vec![test_item(1, 100)]).unwrap();
        let err = order.fulfill().unwrap_err();
        match err {
            DomainError::InvalidState { required, actual } => {
                assert_eq!(required, "confirmed");
                assert_eq!(actual, "draft");
            }
            other => panic!("expected InvalidState, got {other:?}"),
        }
        assert_eq!(order.status, SalesOrderStatus::Draft);
    }

    #[test]
    fn cancel_allowed_from_draft_and_confirmed_only() {
        let mut order = test_order(vec![test_item(1, 100)]).unwrap();
        order.cancel().unwrap();
        assert_eq!(order.status, SalesOrderStatus::Cancelled);

        let mut order = test_order(vec![test_item(1, 100)]).unwrap();
        order.confirm().unwrap();
        order.cancel().unwrap();
        assert_eq!(order.status, SalesOrderStatus::Cancelled);

        let mut order = test_order(vec![test_item(1, 100)]).unwrap();
        order.confirm().unwrap();
        order.fulfill().unwrap();
        assert!(matches!(
            order.cancel().unwrap_err(),
            DomainError::InvalidState { .. }
        ));
        assert_eq!(order.status, SalesOrderStatus::Fulfilled);
    }

    #[test]
    fn transitions_do_not_silently_noop_on_repeat() {
        let mut order = test_order(vec![test_item(1, 100)]).unwrap();
        order.confirm().unwrap();
        assert!(matches!(
            order.confirm().unwrap_err(),
            DomainError::InvalidState { .. }
        ));
    }

    #[test]
    fn stock_demands_merge_lines_on_same_position() {
        let product = ProductId::new();
        let warehouse = WarehouseId::new();
        let shared = NewOrderItem {
            product_id: product,
            warehouse_id: warehouse,
            quantity: 2,
            unit_price: 50,
        };
        let mut second = shared.clone();
        second.quantity = 3;
        let order = test_order(vec![shared, second, test_item(1, 10)]).unwrap();

        let demands = order.stock_demands();
        assert_eq!(demands.len(), 2);
        let merged = demands
            .iter()
            .find(|d| d.key == PositionKey::new(product, warehouse))
            .unwrap();
        assert_eq!(merged.quantity, 5);
        assert!(demands.windows(2).all(|w| w[0].key < w[1].key));
    }

    #[test]
    fn cancel_only_patch_detection() {
        let patch = OrderPatch {
            status: Some(SalesOrderStatus::Cancelled),
            ..Default::default()
        };
        assert!(patch.is_cancel_only());

        let patch = OrderPatch {
            status: Some(SalesOrderStatus::Cancelled),
            notes: Some("changed".to_string()),
            ..Default::default()
        };
        assert!(!patch.is_cancel_only());
    }

    #[test]
    fn status_round_trips_through_strings() {
        for status in [
            SalesOrderStatus::Draft,
            SalesOrderStatus::Confirmed,
            SalesOrderStatus::Fulfilled,
            SalesOrderStatus::Invoiced,
            SalesOrderStatus::Cancelled,
        ] {
            assert_eq!(status.as_str().parse::<SalesOrderStatus>().unwrap(), status);
        }
        assert!("shipped".parse::<SalesOrderStatus>().is_err());
    }

    proptest! {
        /// Property: the order total always equals the sum of line totals,
        /// for any valid item set and after any item replacement.
        #[test]
        fn total_matches_sum_of_line_totals(
            lines in prop::collection::vec((1i64..1_000, 0i64..100_000), 1..20),
            replacement in prop::collection::vec((1i64..1_000, 0i64..100_000), 1..20)
        ) {
            let to_items = |pairs: &[(i64, i64)]| {
                pairs
                    .iter()
                    .map(|&(quantity, unit_price)| test_item(quantity, unit_price))
                    .collect::<Vec<_>>()
            };

            let mut order = test_order(to_items(&lines)).unwrap();
            let expected: i64 = lines.iter().map(|&(q, p)| q * p).sum();
            prop_assert_eq!(order.total_amount, expected);

            order.replace_items(to_items(&replacement)).unwrap();
            let expected: i64 = replacement.iter().map(|&(q, p)| q * p).sum();
            prop_assert_eq!(order.total_amount, expected);
        }
    }
}
