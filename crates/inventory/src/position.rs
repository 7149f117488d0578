use serde::{Deserialize, Serialize};

use anvilerp_core::{DomainError, DomainResult, ProductId, WarehouseId};

/// Composite key of an inventory position, unique per (product, warehouse).
///
/// `Ord` is the stable lock-ordering key: fulfillments acquire position locks
/// in ascending key order so two fulfillments touching the same positions
/// can never form a deadlock cycle.
#[derive(
    Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct PositionKey {
    pub product_id: ProductId,
    pub warehouse_id: WarehouseId,
}

impl PositionKey {
    pub fn new(product_id: ProductId, warehouse_id: WarehouseId) -> Self {
        Self {
            product_id,
            warehouse_id,
        }
    }
}

impl core::fmt::Display for PositionKey {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{} @ {}", self.product_id, self.warehouse_id)
    }
}

/// On-hand stock for one (product, warehouse) pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InventoryPosition {
    pub key: PositionKey,
    /// Never negative.
    pub quantity: i64,
    pub minimum_stock_level: i64,
    pub reorder_quantity: i64,
}

impl InventoryPosition {
    pub fn new(key: PositionKey, quantity: i64) -> Self {
        Self {
            key,
            quantity,
            minimum_stock_level: 0,
            reorder_quantity: 0,
        }
    }

    /// Advisory availability check (no mutation). Used by `confirm`, where a
    /// race with a concurrent stock change is acceptable; `fulfill` re-checks
    /// under its row lock.
    pub fn check_available(&self, requested: i64) -> DomainResult<()> {
        if self.quantity < requested {
            return Err(DomainError::insufficient_inventory(
                self.key.product_id,
                self.key.warehouse_id,
                self.quantity,
                requested,
            ));
        }
        Ok(())
    }

    /// Floor-checked decrement: fails without mutating if the on-hand
    /// quantity is below the request, so the position can never go negative.
    pub fn decrement(&mut self, requested: i64) -> DomainResult<()> {
        self.check_available(requested)?;
        self.quantity -= requested;
        Ok(())
    }

    /// Stock has fallen below the minimum level.
    pub fn needs_reorder(&self) -> bool {
        self.quantity < self.minimum_stock_level
    }
}

/// Quantity demanded from one position by an order.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockDemand {
    pub key: PositionKey,
    pub quantity: i64,
}

/// Merge per-item demands into one demand per position, sorted by key.
///
/// Items sharing a (product, warehouse) pair are summed, so each position is
/// locked and decremented once. The sort makes lock acquisition order
/// deterministic across concurrent fulfillments.
pub fn merge_demands(demands: impl IntoIterator<Item = StockDemand>) -> Vec<StockDemand> {
    let mut merged: std::collections::BTreeMap<PositionKey, i64> = Default::default();
    for d in demands {
        *merged.entry(d.key).or_insert(0) += d.quantity;
    }
    merged
        .into_iter()
        .map(|(key, quantity)| StockDemand { key, quantity })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn test_key() -> PositionKey {
        PositionKey::new(ProductId::new(), WarehouseId::new())
    }

    #[test]
    fn decrement_reduces_quantity() {
        let mut pos = InventoryPosition::new(test_key(), 5);
        pos.decrement(3).unwrap();
        assert_eq!(pos.quantity, 2);
    }

    #[test]
    fn decrement_to_exactly_zero_is_allowed() {
        let mut pos = InventoryPosition::new(test_key(), 5);
        pos.decrement(5).unwrap();
        assert_eq!(pos.quantity, 0);
    }

    #[test]
    fn decrement_below_floor_fails_without_mutation() {
        let mut pos = InventoryPosition::new(test_key(), 3);
        let err = pos.decrement(5).unwrap_err();
        match err {
            DomainError::InsufficientInventory {
                available,
                requested,
                ..
            } => {
                assert_eq!(available, 3);
                assert_eq!(requested, 5);
            }
            other => panic!("expected InsufficientInventory, got {other:?}"),
        }
        assert_eq!(pos.quantity, 3);
    }

    #[test]
    fn needs_reorder_below_minimum() {
        let mut pos = InventoryPosition::new(test_key(), 10);
        pos.minimum_stock_level = 4;
        assert!(!pos.needs_reorder());
        pos.quantity = 3;
        assert!(pos.needs_reorder());
    }

    #[test]
    fn merge_demands_sums_shared_positions_and_sorts() {
        let a = test_key();
        let b = test_key();
        let demands = vec![
            StockDemand { key: b, quantity: 2 },
            StockDemand { key: a, quantity: 1 },
            StockDemand { key: b, quantity: 3 },
        ];
        let merged = merge_demands(demands);
        assert_eq!(merged.len(), 2);
        assert!(merged[0].key < merged[1].key);
        let for_b = merged.iter().find(|d| d.key == b).unwrap();
        assert_eq!(for_b.quantity, 5);
    }

    proptest! {
        /// Property: a sequence of successful decrements never drives the
        /// quantity negative, and the quantity drops by exactly the sum of
        /// the applied decrements.
        #[test]
        fn decrements_preserve_floor(
            initial in 0i64..10_000,
            requests in prop::collection::vec(1i64..100, 0..50)
        ) {
            let mut pos = InventoryPosition::new(test_key(), initial);
            let mut applied = 0i64;
            for r in requests {
                if pos.decrement(r).is_ok() {
                    applied += r;
                }
            }
            prop_assert!(pos.quantity >= 0);
            prop_assert_eq!(pos.quantity, initial - applied);
        }
    }
}
