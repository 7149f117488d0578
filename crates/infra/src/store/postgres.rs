//! Postgres-backed store implementation.
//!
//! Schema: `crates/infra/migrations/0001_init.sql`. All queries are runtime
//! `sqlx::query` with binds; rows decode through `sqlx::Row`.
//!
//! ## Error mapping
//!
//! | SQLx error | SQLSTATE | StoreError | Scenario |
//! |------------|----------|------------|----------|
//! | Database (unique violation) | `23505` | `Conflict` (or `Domain(DuplicateInvoice)` for the per-order invoice index) | Concurrent allocation/creation detected |
//! | Database (check violation) | `23514` | `Conflict` | Quantity floor raced below zero |
//! | Any other | — | `Backend` | Connection, IO, decode failures |
//!
//! ## Locking
//!
//! `lock_position` issues `SELECT .. FOR UPDATE`, blocking concurrent lockers
//! of the same row until this transaction commits or rolls back. Callers are
//! responsible for acquiring locks in ascending `PositionKey` order.
//! `highest_sequence` serializes one prefix + date series with
//! `pg_advisory_xact_lock`; the unique index on the number column is the
//! final guard.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::NaiveDate;
use sqlx::{PgPool, Postgres, Row, Transaction};
use tracing::instrument;
use uuid::Uuid;

use anvilerp_accounting::{Account, AccountKind, ControlAccount, LedgerEntry};
use anvilerp_core::{
    AccountId, AggregateId, CustomerId, DocumentNumber, DomainError, ProductId, UserId,
    WarehouseId,
};
use anvilerp_inventory::{InventoryPosition, PositionKey};
use anvilerp_invoicing::{Invoice, InvoiceId};
use anvilerp_sales::{SalesOrder, SalesOrderId, SalesOrderItem, SalesOrderStatus};

use super::r#trait::{ErpStore, ErpTx, StoreError};

/// Postgres-backed store.
///
/// Uses the SQLx connection pool (thread-safe, `Arc + Send + Sync`); every
/// unit of work maps to one database transaction.
#[derive(Debug, Clone)]
pub struct PostgresStore {
    pool: Arc<PgPool>,
}

impl PostgresStore {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool: Arc::new(pool),
        }
    }
}

#[async_trait]
impl ErpStore for PostgresStore {
    async fn begin(&self) -> Result<Box<dyn ErpTx>, StoreError> {
        let tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin_transaction", e))?;
        Ok(Box::new(PostgresTx { tx }))
    }
}

struct PostgresTx {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl ErpTx for PostgresTx {
    #[instrument(skip(self, order), fields(order_id = %order.id), err)]
    async fn insert_order(&mut self, order: &SalesOrder) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO sales_orders (
                id, order_number, customer_id, order_date, status,
                total_amount, notes, created_by
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(Uuid::from(order.id.0))
        .bind(&order.order_number)
        .bind(Uuid::from(order.customer_id))
        .bind(order.order_date)
        .bind(order.status.as_str())
        .bind(order.total_amount)
        .bind(&order.notes)
        .bind(Uuid::from(order.created_by))
        .execute(&mut *self.tx)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                StoreError::Conflict(format!(
                    "order number '{}' already allocated",
                    order.order_number
                ))
            } else {
                map_sqlx_error("insert_order", e)
            }
        })?;

        self.insert_items(order).await
    }

    #[instrument(skip(self), fields(order_id = %id), err)]
    async fn load_order(&mut self, id: SalesOrderId) -> Result<SalesOrder, StoreError> {
        let row = sqlx::query(
            r#"
            SELECT id, order_number, customer_id, order_date, status,
                   total_amount, notes, created_by
            FROM sales_orders
            WHERE id = $1
            "#,
        )
        .bind(Uuid::from(id.0))
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("load_order", e))?
        .ok_or(DomainError::NotFound)?;

        let item_rows = sqlx::query(
            r#"
            SELECT product_id, warehouse_id, quantity, unit_price, line_total
            FROM sales_order_items
            WHERE order_id = $1
            ORDER BY line_no ASC
            "#,
        )
        .bind(Uuid::from(id.0))
        .fetch_all(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("load_order_items", e))?;

        let mut items = Vec::with_capacity(item_rows.len());
        for row in item_rows {
            items.push(SalesOrderItem {
                product_id: ProductId::from(get::<Uuid>(&row, "product_id")?),
                warehouse_id: WarehouseId::from(get::<Uuid>(&row, "warehouse_id")?),
                quantity: get(&row, "quantity")?,
                unit_price: get(&row, "unit_price")?,
                line_total: get(&row, "line_total")?,
            });
        }

        let status = parse_enum::<SalesOrderStatus>(&get::<String>(&row, "status")?)?;
        Ok(SalesOrder {
            id: SalesOrderId::new(AggregateId::from(get::<Uuid>(&row, "id")?)),
            order_number: get(&row, "order_number")?,
            customer_id: CustomerId::from(get::<Uuid>(&row, "customer_id")?),
            order_date: get(&row, "order_date")?,
            status,
            total_amount: get(&row, "total_amount")?,
            notes: get(&row, "notes")?,
            created_by: UserId::from(get::<Uuid>(&row, "created_by")?),
            items,
        })
    }

    #[instrument(skip(self, order), fields(order_id = %order.id, status = %order.status), err)]
    async fn update_order(&mut self, order: &SalesOrder) -> Result<(), StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE sales_orders
            SET customer_id = $2, order_date = $3, status = $4,
                total_amount = $5, notes = $6, updated_at = now()
            WHERE id = $1
            "#,
        )
        .bind(Uuid::from(order.id.0))
        .bind(Uuid::from(order.customer_id))
        .bind(order.order_date)
        .bind(order.status.as_str())
        .bind(order.total_amount)
        .bind(&order.notes)
        .execute(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("update_order", e))?;

        if result.rows_affected() == 0 {
            return Err(DomainError::NotFound.into());
        }

        // Delete-then-recreate: the item set is owned by the order and is
        // swapped atomically within this transaction.
        sqlx::query("DELETE FROM sales_order_items WHERE order_id = $1")
            .bind(Uuid::from(order.id.0))
            .execute(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error("delete_order_items", e))?;

        self.insert_items(order).await
    }

    async fn get_position(
        &mut self,
        key: PositionKey,
    ) -> Result<Option<InventoryPosition>, StoreError> {
        let row = sqlx::query(
            r#"
            SELECT product_id, warehouse_id, quantity, minimum_stock_level, reorder_quantity
            FROM inventory_positions
            WHERE product_id = $1 AND warehouse_id = $2
            "#,
        )
        .bind(Uuid::from(key.product_id))
        .bind(Uuid::from(key.warehouse_id))
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("get_position", e))?;

        row.map(|r| position_from_row(&r)).transpose()
    }

    #[instrument(skip(self), fields(position = %key), err)]
    async fn lock_position(
        &mut self,
        key: PositionKey,
    ) -> Result<Option<InventoryPosition>, StoreError> {
        let row = sqlx::query(
            r#"
            SELECT product_id, warehouse_id, quantity, minimum_stock_level, reorder_quantity
            FROM inventory_positions
            WHERE product_id = $1 AND warehouse_id = $2
            FOR UPDATE
            "#,
        )
        .bind(Uuid::from(key.product_id))
        .bind(Uuid::from(key.warehouse_id))
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("lock_position", e))?;

        row.map(|r| position_from_row(&r)).transpose()
    }

    async fn save_position(&mut self, position: &InventoryPosition) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO inventory_positions (
                product_id, warehouse_id, quantity, minimum_stock_level, reorder_quantity
            )
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (product_id, warehouse_id) DO UPDATE
            SET quantity = EXCLUDED.quantity,
                minimum_stock_level = EXCLUDED.minimum_stock_level,
                reorder_quantity = EXCLUDED.reorder_quantity,
                updated_at = now()
            "#,
        )
        .bind(Uuid::from(position.key.product_id))
        .bind(Uuid::from(position.key.warehouse_id))
        .bind(position.quantity)
        .bind(position.minimum_stock_level)
        .bind(position.reorder_quantity)
        .execute(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("save_position", e))?;
        Ok(())
    }

    #[instrument(skip(self, invoice), fields(invoice_number = %invoice.invoice_number), err)]
    async fn insert_invoice(&mut self, invoice: &Invoice) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO invoices (
                id, invoice_number, sales_order_id, invoice_date, due_date,
                status, total_amount, tax_amount, notes
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(Uuid::from(invoice.id.0))
        .bind(&invoice.invoice_number)
        .bind(Uuid::from(invoice.sales_order_id.0))
        .bind(invoice.invoice_date)
        .bind(invoice.due_date)
        .bind(invoice.status.as_str())
        .bind(invoice.total_amount)
        .bind(invoice.tax_amount)
        .bind(&invoice.notes)
        .execute(&mut *self.tx)
        .await
        .map_err(|e| {
            // The one-invoice-per-order unique index is the final guard for
            // races the in-transaction lookup cannot see.
            if is_unique_violation_on(&e, "sales_order") {
                StoreError::Domain(DomainError::DuplicateInvoice)
            } else if is_unique_violation(&e) {
                StoreError::Conflict(format!(
                    "invoice number '{}' already allocated",
                    invoice.invoice_number
                ))
            } else {
                map_sqlx_error("insert_invoice", e)
            }
        })?;
        Ok(())
    }

    async fn find_invoice_for_order(
        &mut self,
        order_id: SalesOrderId,
    ) -> Result<Option<InvoiceId>, StoreError> {
        let row = sqlx::query("SELECT id FROM invoices WHERE sales_order_id = $1")
            .bind(Uuid::from(order_id.0))
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error("find_invoice_for_order", e))?;

        Ok(row
            .map(|r| get::<Uuid>(&r, "id"))
            .transpose()?
            .map(|id| InvoiceId::new(AggregateId::from(id))))
    }

    #[instrument(skip(self), fields(code = control.code), err)]
    async fn resolve_account(&mut self, control: ControlAccount) -> Result<Account, StoreError> {
        // Insert-if-absent then read back: concurrent first resolutions race
        // on the unique code index, and both end up reading the winner's row.
        sqlx::query(
            r#"
            INSERT INTO accounts (id, code, name, kind)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (code) DO NOTHING
            "#,
        )
        .bind(Uuid::from(AccountId::new()))
        .bind(control.code)
        .bind(control.name)
        .bind(control.kind.as_str())
        .execute(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("resolve_account", e))?;

        let row = sqlx::query("SELECT id, code, name, kind FROM accounts WHERE code = $1")
            .bind(control.code)
            .fetch_one(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error("resolve_account", e))?;

        Ok(Account {
            id: AccountId::from(get::<Uuid>(&row, "id")?),
            code: get(&row, "code")?,
            name: get(&row, "name")?,
            kind: parse_enum::<AccountKind>(&get::<String>(&row, "kind")?)?,
        })
    }

    async fn append_ledger_entries(&mut self, entries: &[LedgerEntry]) -> Result<(), StoreError> {
        for entry in entries {
            sqlx::query(
                r#"
                INSERT INTO ledger_entries (
                    id, account_id, invoice_id, transaction_type,
                    amount, transaction_date, description
                )
                VALUES ($1, $2, $3, $4, $5, $6, $7)
                "#,
            )
            .bind(Uuid::from(entry.id.0))
            .bind(Uuid::from(entry.account_id))
            .bind(entry.invoice_id.map(|id| Uuid::from(id.0)))
            .bind(entry.transaction_type.as_str())
            .bind(entry.amount)
            .bind(entry.transaction_date)
            .bind(&entry.description)
            .execute(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error("append_ledger_entries", e))?;
        }
        Ok(())
    }

    #[instrument(skip(self), fields(prefix, date = %date), err)]
    async fn highest_sequence(
        &mut self,
        prefix: &str,
        date: NaiveDate,
    ) -> Result<Option<u32>, StoreError> {
        let stem = DocumentNumber::series_stem(prefix, date);

        // Serialize allocators of this series for the rest of the
        // transaction; released automatically at commit/rollback.
        sqlx::query("SELECT pg_advisory_xact_lock($1)")
            .bind(series_lock_key(&stem))
            .execute(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error("series_lock", e))?;

        let rows = sqlx::query(
            r#"
            SELECT number FROM (
                SELECT order_number AS number FROM sales_orders
                WHERE order_number LIKE $1
                UNION ALL
                SELECT invoice_number AS number FROM invoices
                WHERE invoice_number LIKE $1
            ) AS numbers
            "#,
        )
        .bind(format!("{stem}-%"))
        .fetch_all(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("highest_sequence", e))?;

        let mut highest = None;
        for row in rows {
            let number = get::<String>(&row, "number")?;
            if let Some(seq) = DocumentNumber::sequence_in_series(&number, prefix, date) {
                highest = highest.max(Some(seq));
            }
        }
        Ok(highest)
    }

    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        self.tx
            .commit()
            .await
            .map_err(|e| map_sqlx_error("commit_transaction", e))
    }
}

impl PostgresTx {
    async fn insert_items(&mut self, order: &SalesOrder) -> Result<(), StoreError> {
        for (idx, item) in order.items.iter().enumerate() {
            sqlx::query(
                r#"
                INSERT INTO sales_order_items (
                    order_id, line_no, product_id, warehouse_id,
                    quantity, unit_price, line_total
                )
                VALUES ($1, $2, $3, $4, $5, $6, $7)
                "#,
            )
            .bind(Uuid::from(order.id.0))
            .bind((idx + 1) as i32)
            .bind(Uuid::from(item.product_id))
            .bind(Uuid::from(item.warehouse_id))
            .bind(item.quantity)
            .bind(item.unit_price)
            .bind(item.line_total)
            .execute(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error("insert_order_items", e))?;
        }
        Ok(())
    }
}

fn position_from_row(row: &sqlx::postgres::PgRow) -> Result<InventoryPosition, StoreError> {
    Ok(InventoryPosition {
        key: PositionKey::new(
            ProductId::from(get::<Uuid>(row, "product_id")?),
            WarehouseId::from(get::<Uuid>(row, "warehouse_id")?),
        ),
        quantity: get(row, "quantity")?,
        minimum_stock_level: get(row, "minimum_stock_level")?,
        reorder_quantity: get(row, "reorder_quantity")?,
    })
}

fn get<'r, T>(row: &'r sqlx::postgres::PgRow, column: &str) -> Result<T, StoreError>
where
    T: sqlx::Decode<'r, Postgres> + sqlx::Type<Postgres>,
{
    row.try_get(column)
        .map_err(|e| StoreError::backend(format!("column '{column}': {e}")))
}

fn parse_enum<T: core::str::FromStr<Err = DomainError>>(raw: &str) -> Result<T, StoreError> {
    raw.parse()
        .map_err(|e: DomainError| StoreError::backend(format!("bad enum value in row: {e}")))
}

/// Advisory-lock key for one `PREFIX-YYYYMMDD` series.
///
/// FNV-1a over the stem bytes. The key must be the same for every process
/// that allocates from the series, across builds and toolchains, so no std
/// hasher (its output is not guaranteed stable between releases).
fn series_lock_key(stem: &str) -> i64 {
    let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
    for byte in stem.as_bytes() {
        hash ^= u64::from(*byte);
        hash = hash.wrapping_mul(0x0000_0100_0000_01b3);
    }
    hash as i64
}

fn is_unique_violation(e: &sqlx::Error) -> bool {
    matches!(
        e.as_database_error().and_then(|d| d.code()),
        Some(code) if code == "23505"
    )
}

fn is_unique_violation_on(e: &sqlx::Error, constraint_fragment: &str) -> bool {
    is_unique_violation(e)
        && e.as_database_error()
            .and_then(|d| d.constraint())
            .is_some_and(|c| c.contains(constraint_fragment))
}

fn map_sqlx_error(operation: &str, e: sqlx::Error) -> StoreError {
    match e.as_database_error().and_then(|d| d.code()) {
        Some(code) if code == "23505" || code == "23514" || code == "40001" => {
            StoreError::Conflict(format!("{operation}: {e}"))
        }
        _ => StoreError::backend(format!("{operation}: {e}")),
    }
}

#[cfg(test)]
mod tests {
    use super::series_lock_key;

    // Pinned values: a changed key would let two builds lock different
    // advisory slots for the same series.
    #[test]
    fn series_lock_key_is_a_fixed_function_of_the_stem() {
        assert_eq!(series_lock_key("SO-20250115"), -7276830920079683004);
        assert_eq!(series_lock_key("INV-20250115"), 6838174038960956377);
    }

    #[test]
    fn series_lock_key_separates_series() {
        assert_ne!(
            series_lock_key("SO-20250115"),
            series_lock_key("SO-20250116")
        );
        assert_ne!(
            series_lock_key("SO-20250115"),
            series_lock_key("INV-20250115")
        );
    }
}
