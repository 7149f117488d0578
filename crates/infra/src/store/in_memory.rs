use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::NaiveDate;
use tokio::sync::{Mutex, OwnedMutexGuard};

use anvilerp_accounting::{Account, ControlAccount, LedgerEntry};
use anvilerp_core::{AccountId, DocumentNumber, DomainError};
use anvilerp_inventory::{InventoryPosition, PositionKey};
use anvilerp_invoicing::{Invoice, InvoiceId};
use anvilerp_sales::{SalesOrder, SalesOrderId};

use super::r#trait::{ErpStore, ErpTx, StoreError};

#[derive(Debug, Clone, Default)]
struct State {
    orders: HashMap<SalesOrderId, SalesOrder>,
    positions: BTreeMap<PositionKey, InventoryPosition>,
    invoices: HashMap<InvoiceId, Invoice>,
    accounts_by_code: HashMap<String, Account>,
    ledger_entries: Vec<LedgerEntry>,
}

/// In-memory store. Intended for tests/dev; not optimized for performance.
///
/// Transactions take the whole-state mutex for their lifetime and stage
/// writes in a scratch copy, so every unit of work is fully serialized — a
/// strictly stronger isolation level than the row locks the Postgres store
/// uses, which keeps the concurrency-sensitive properties (no oversell, no
/// duplicate numbers) observable in tests.
#[derive(Debug, Clone, Default)]
pub struct InMemoryStore {
    state: Arc<Mutex<State>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed an inventory position (master-data setup for tests/dev).
    pub async fn seed_position(&self, position: InventoryPosition) {
        let mut state = self.state.lock().await;
        state.positions.insert(position.key, position);
    }

    /// Committed view of one position.
    pub async fn position(&self, key: PositionKey) -> Option<InventoryPosition> {
        self.state.lock().await.positions.get(&key).cloned()
    }

    /// Committed view of one order.
    pub async fn order(&self, id: SalesOrderId) -> Option<SalesOrder> {
        self.state.lock().await.orders.get(&id).cloned()
    }

    /// Committed ledger rows, in append order.
    pub async fn ledger_entries(&self) -> Vec<LedgerEntry> {
        self.state.lock().await.ledger_entries.clone()
    }

    /// Committed account row for a code, if resolved yet.
    pub async fn account_by_code(&self, code: &str) -> Option<Account> {
        self.state.lock().await.accounts_by_code.get(code).cloned()
    }

    /// Number of account rows (duplicate-creation checks in tests).
    pub async fn account_count(&self) -> usize {
        self.state.lock().await.accounts_by_code.len()
    }
}

#[async_trait]
impl ErpStore for InMemoryStore {
    async fn begin(&self) -> Result<Box<dyn ErpTx>, StoreError> {
        let guard = self.state.clone().lock_owned().await;
        let scratch = guard.clone();
        Ok(Box::new(InMemoryTx { guard, scratch }))
    }
}

/// One serialized unit of work. Commit writes the scratch copy back; dropping
/// without commit discards it (rollback).
struct InMemoryTx {
    guard: OwnedMutexGuard<State>,
    scratch: State,
}

#[async_trait]
impl ErpTx for InMemoryTx {
    async fn insert_order(&mut self, order: &SalesOrder) -> Result<(), StoreError> {
        if self.scratch.orders.contains_key(&order.id) {
            return Err(StoreError::Conflict(format!(
                "sales order {} already exists",
                order.id
            )));
        }
        // Unique index on order_number: the final guard for allocation races.
        if self
            .scratch
            .orders
            .values()
            .any(|o| o.order_number == order.order_number)
        {
            return Err(StoreError::Conflict(format!(
                "order number '{}' already allocated",
                order.order_number
            )));
        }
        self.scratch.orders.insert(order.id, order.clone());
        Ok(())
    }

    async fn load_order(&mut self, id: SalesOrderId) -> Result<SalesOrder, StoreError> {
        self.scratch
            .orders
            .get(&id)
            .cloned()
            .ok_or_else(|| DomainError::not_found().into())
    }

    async fn update_order(&mut self, order: &SalesOrder) -> Result<(), StoreError> {
        if !self.scratch.orders.contains_key(&order.id) {
            return Err(DomainError::not_found().into());
        }
        self.scratch.orders.insert(order.id, order.clone());
        Ok(())
    }

    async fn get_position(
        &mut self,
        key: PositionKey,
    ) -> Result<Option<InventoryPosition>, StoreError> {
        Ok(self.scratch.positions.get(&key).cloned())
    }

    async fn lock_position(
        &mut self,
        key: PositionKey,
    ) -> Result<Option<InventoryPosition>, StoreError> {
        // The whole-state mutex already grants this transaction exclusivity.
        self.get_position(key).await
    }

    async fn save_position(&mut self, position: &InventoryPosition) -> Result<(), StoreError> {
        self.scratch
            .positions
            .insert(position.key, position.clone());
        Ok(())
    }

    async fn insert_invoice(&mut self, invoice: &Invoice) -> Result<(), StoreError> {
        if self
            .scratch
            .invoices
            .values()
            .any(|i| i.sales_order_id == invoice.sales_order_id)
        {
            return Err(DomainError::DuplicateInvoice.into());
        }
        if self
            .scratch
            .invoices
            .values()
            .any(|i| i.invoice_number == invoice.invoice_number)
        {
            return Err(StoreError::Conflict(format!(
                "invoice number '{}' already allocated",
                invoice.invoice_number
            )));
        }
        self.scratch.invoices.insert(invoice.id, invoice.clone());
        Ok(())
    }

    async fn find_invoice_for_order(
        &mut self,
        order_id: SalesOrderId,
    ) -> Result<Option<InvoiceId>, StoreError> {
        Ok(self
            .scratch
            .invoices
            .values()
            .find(|i| i.sales_order_id == order_id)
            .map(|i| i.id))
    }

    async fn resolve_account(&mut self, control: ControlAccount) -> Result<Account, StoreError> {
        let account = self
            .scratch
            .accounts_by_code
            .entry(control.code.to_string())
            .or_insert_with(|| Account {
                id: AccountId::new(),
                code: control.code.to_string(),
                name: control.name.to_string(),
                kind: control.kind,
            });
        Ok(account.clone())
    }

    async fn append_ledger_entries(&mut self, entries: &[LedgerEntry]) -> Result<(), StoreError> {
        self.scratch.ledger_entries.extend_from_slice(entries);
        Ok(())
    }

    async fn highest_sequence(
        &mut self,
        prefix: &str,
        date: NaiveDate,
    ) -> Result<Option<u32>, StoreError> {
        // Serialized by the whole-state mutex; scan both number columns (the
        // prefix keeps the series disjoint).
        let highest = self
            .scratch
            .orders
            .values()
            .map(|o| o.order_number.as_str())
            .chain(self.scratch.invoices.values().map(|i| i.invoice_number.as_str()))
            .filter_map(|number| DocumentNumber::sequence_in_series(number, prefix, date))
            .max();
        Ok(highest)
    }

    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        let mut this = *self;
        *this.guard = this.scratch;
        Ok(())
    }
}
