use async_trait::async_trait;
use chrono::NaiveDate;
use thiserror::Error;

use anvilerp_accounting::{Account, ControlAccount, LedgerEntry};
use anvilerp_core::DomainError;
use anvilerp_inventory::{InventoryPosition, PositionKey};
use anvilerp_invoicing::{Invoice, InvoiceId};
use anvilerp_sales::{SalesOrder, SalesOrderId};

/// Storage operation error.
///
/// `Domain` carries the business error taxonomy unchanged so callers can map
/// it to transport-level responses; `Conflict` and `Backend` are
/// infrastructure outcomes.
#[derive(Debug, Error)]
pub enum StoreError {
    /// A domain rule failed inside the unit of work (surfaced unchanged).
    #[error(transparent)]
    Domain(#[from] DomainError),

    /// A serialization conflict or uniqueness-constraint violation. The
    /// enclosing transaction rolled back; the caller may retry.
    #[error("conflict: {0}")]
    Conflict(String),

    /// The storage backend failed (connection, IO, decode).
    #[error("storage failure: {0}")]
    Backend(String),
}

impl StoreError {
    pub fn backend(msg: impl Into<String>) -> Self {
        Self::Backend(msg.into())
    }

    /// The domain error inside this outcome, if it is one. Embedding
    /// transport layers branch on this to map business failures to their
    /// responses without unpacking `Conflict`/`Backend`.
    pub fn as_domain(&self) -> Option<&DomainError> {
        match self {
            StoreError::Domain(e) => Some(e),
            _ => None,
        }
    }
}

/// Transactional storage port.
///
/// A store hands out units of work; all mutating multi-step operations run
/// inside exactly one of them.
#[async_trait]
pub trait ErpStore: Send + Sync {
    /// Begin a unit of work. Dropping the returned transaction without
    /// calling [`ErpTx::commit`] rolls back every write made through it.
    async fn begin(&self) -> Result<Box<dyn ErpTx>, StoreError>;
}

#[async_trait]
impl<S> ErpStore for std::sync::Arc<S>
where
    S: ErpStore + ?Sized,
{
    async fn begin(&self) -> Result<Box<dyn ErpTx>, StoreError> {
        (**self).begin().await
    }
}

/// One atomic unit of work over the relational state.
///
/// Implementations must guarantee:
/// - atomicity: either every write through this transaction commits, or none
///   does (rollback on drop);
/// - `lock_position` holds an exclusive lock on the position row until the
///   transaction ends, blocking concurrent lockers of the same row;
/// - `resolve_account` is race-safe: concurrent first resolutions of the same
///   code must not create duplicate account rows;
/// - `highest_sequence` serializes number allocation for one prefix + date,
///   with the uniqueness constraint on the number column as the final guard
///   (violations surface as [`StoreError::Conflict`]).
#[async_trait]
pub trait ErpTx: Send {
    // Sales orders
    async fn insert_order(&mut self, order: &SalesOrder) -> Result<(), StoreError>;
    async fn load_order(&mut self, id: SalesOrderId) -> Result<SalesOrder, StoreError>;
    /// Persist header changes and swap the item set (delete-then-recreate).
    async fn update_order(&mut self, order: &SalesOrder) -> Result<(), StoreError>;

    // Inventory positions
    async fn get_position(
        &mut self,
        key: PositionKey,
    ) -> Result<Option<InventoryPosition>, StoreError>;
    /// Read a position under an exclusive row lock held until commit/rollback.
    async fn lock_position(
        &mut self,
        key: PositionKey,
    ) -> Result<Option<InventoryPosition>, StoreError>;
    async fn save_position(&mut self, position: &InventoryPosition) -> Result<(), StoreError>;

    // Invoices
    async fn insert_invoice(&mut self, invoice: &Invoice) -> Result<(), StoreError>;
    async fn find_invoice_for_order(
        &mut self,
        order_id: SalesOrderId,
    ) -> Result<Option<InvoiceId>, StoreError>;

    // Ledger
    /// Resolve a control account by its well-known code, creating it if
    /// missing. Race-safe.
    async fn resolve_account(&mut self, control: ControlAccount) -> Result<Account, StoreError>;
    /// Append-only: ledger rows are immutable once created.
    async fn append_ledger_entries(&mut self, entries: &[LedgerEntry]) -> Result<(), StoreError>;

    // Number allocation
    /// Highest sequence already allocated for this prefix + date, serialized
    /// against concurrent allocators of the same series.
    async fn highest_sequence(
        &mut self,
        prefix: &str,
        date: NaiveDate,
    ) -> Result<Option<u32>, StoreError>;

    /// Commit every write made through this transaction.
    async fn commit(self: Box<Self>) -> Result<(), StoreError>;
}
