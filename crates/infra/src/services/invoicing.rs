//! Invoice creation with automatic ledger posting.

use chrono::{NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use tracing::instrument;

use anvilerp_accounting::{invoice_postings, ACCOUNTS_RECEIVABLE, SALES_REVENUE};
use anvilerp_core::{AggregateId, DocumentNumber, DomainError, INVOICE_NUMBER_PREFIX};
use anvilerp_invoicing::{Invoice, InvoiceId};
use anvilerp_sales::SalesOrderId;

use crate::store::{ErpStore, StoreError};

/// Input for [`InvoicePoster::create_invoice`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateInvoice {
    pub order_id: SalesOrderId,
    pub invoice_date: NaiveDate,
    pub due_date: NaiveDate,
    pub tax_amount: i64,
    pub notes: String,
}

/// Creates invoices for fulfilled orders and posts them to the ledger.
#[derive(Debug, Clone)]
pub struct InvoicePoster<S> {
    store: S,
}

impl<S: ErpStore> InvoicePoster<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// Create the invoice for a fulfilled order, mark the order invoiced, and
    /// append the balanced double-entry posting — all in one unit of work.
    ///
    /// The duplicate check runs before the lifecycle guard, so a second call
    /// for the same order reports `DuplicateInvoice` rather than complaining
    /// about the (already invoiced) order's state. The unique index on
    /// `sales_order_id` is the final guard for posters racing past the check.
    #[instrument(skip(self, input), fields(order_id = %input.order_id), err)]
    pub async fn create_invoice(&self, input: CreateInvoice) -> Result<Invoice, StoreError> {
        let mut tx = self.store.begin().await?;

        if tx.find_invoice_for_order(input.order_id).await?.is_some() {
            return Err(DomainError::DuplicateInvoice.into());
        }

        let mut order = tx.load_order(input.order_id).await?;

        let today = Utc::now().date_naive();
        let highest = tx.highest_sequence(INVOICE_NUMBER_PREFIX, today).await?;
        let number = DocumentNumber::next(INVOICE_NUMBER_PREFIX, today, highest);

        let invoice = Invoice::for_order(
            InvoiceId::new(AggregateId::new()),
            number.to_string(),
            &order,
            input.invoice_date,
            input.due_date,
            input.tax_amount,
            input.notes,
        )?;
        order.mark_invoiced()?;

        tx.insert_invoice(&invoice).await?;
        tx.update_order(&order).await?;

        let receivable = tx.resolve_account(ACCOUNTS_RECEIVABLE).await?;
        let revenue = tx.resolve_account(SALES_REVENUE).await?;
        let entries = invoice_postings(&invoice, &receivable, &revenue)?;
        tx.append_ledger_entries(&entries).await?;

        tx.commit().await?;

        tracing::info!(
            invoice_id = %invoice.id,
            invoice_number = %invoice.invoice_number,
            amount = invoice.total_amount,
            "invoice created and posted"
        );
        Ok(invoice)
    }
}
