use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use anvilerp_core::{AggregateId, DomainError, DomainResult};
use anvilerp_sales::{SalesOrder, SalesOrderId, SalesOrderStatus};

/// Invoice identifier.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InvoiceId(pub AggregateId);

impl InvoiceId {
    pub fn new(id: AggregateId) -> Self {
        Self(id)
    }
}

impl core::fmt::Display for InvoiceId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

/// Invoice status lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InvoiceStatus {
    Draft,
    Sent,
    Paid,
    Cancelled,
}

impl InvoiceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            InvoiceStatus::Draft => "draft",
            InvoiceStatus::Sent => "sent",
            InvoiceStatus::Paid => "paid",
            InvoiceStatus::Cancelled => "cancelled",
        }
    }
}

impl core::fmt::Display for InvoiceStatus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl core::str::FromStr for InvoiceStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "draft" => Ok(InvoiceStatus::Draft),
            "sent" => Ok(InvoiceStatus::Sent),
            "paid" => Ok(InvoiceStatus::Paid),
            "cancelled" => Ok(InvoiceStatus::Cancelled),
            other => Err(DomainError::validation(format!(
                "unknown invoice status '{other}'"
            ))),
        }
    }
}

/// Invoice linked one-to-one to a sales order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Invoice {
    pub id: InvoiceId,
    pub invoice_number: String,
    pub sales_order_id: SalesOrderId,
    pub invoice_date: NaiveDate,
    pub due_date: NaiveDate,
    pub status: InvoiceStatus,
    /// Copied from the order at creation, in smallest currency unit.
    pub total_amount: i64,
    /// Stored as given; no tax computation here.
    pub tax_amount: i64,
    pub notes: String,
}

impl Invoice {
    /// Build the invoice for a fulfilled order, copying its total.
    ///
    /// Guards the order's lifecycle state; the one-invoice-per-order check
    /// needs storage and is enforced by the invoice poster.
    pub fn for_order(
        id: InvoiceId,
        invoice_number: String,
        order: &SalesOrder,
        invoice_date: NaiveDate,
        due_date: NaiveDate,
        tax_amount: i64,
        notes: String,
    ) -> DomainResult<Self> {
        if order.status != SalesOrderStatus::Fulfilled {
            return Err(DomainError::invalid_state(
                SalesOrderStatus::Fulfilled.as_str(),
                order.status.as_str(),
            ));
        }
        if tax_amount < 0 {
            return Err(DomainError::validation("tax amount cannot be negative"));
        }
        if due_date < invoice_date {
            return Err(DomainError::validation(
                "due date cannot precede invoice date",
            ));
        }
        Ok(Self {
            id,
            invoice_number,
            sales_order_id: order.id,
            invoice_date,
            due_date,
            status: InvoiceStatus::Draft,
            total_amount: order.total_amount,
            tax_amount,
            notes,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anvilerp_core::{CustomerId, ProductId, UserId, WarehouseId};
    use anvilerp_sales::NewOrderItem;

    fn fulfilled_order(total_per_unit: i64, quantity: i64) -> SalesOrder {
        let mut order = SalesOrder::create(
            SalesOrderId::new(AggregateId::new()),
            "SO-20250115-0001".to_string(),
            CustomerId::new(),
            NaiveDate::from_ymd_opt(2025, 1, 15).unwrap(),
            vec![NewOrderItem {
                product_id: ProductId::new(),
                warehouse_id: WarehouseId::new(),
                quantity,
                unit_price: total_per_unit,
            }],
            UserId::new(),
            String::new(),
        )
        .unwrap();
        order.confirm().unwrap();
        order.fulfill().unwrap();
        order
    }

    fn test_dates() -> (NaiveDate, NaiveDate) {
        (
            NaiveDate::from_ymd_opt(2025, 1, 20).unwrap(),
            NaiveDate::from_ymd_opt(2025, 2, 19).unwrap(),
        )
    }

    #[test]
    fn for_order_copies_total_from_order() {
        let order = fulfilled_order(1000, 5);
        let (invoice_date, due_date) = test_dates();
        let invoice = Invoice::for_order(
            InvoiceId::new(AggregateId::new()),
            "INV-20250120-0001".to_string(),
            &order,
            invoice_date,
            due_date,
            0,
            String::new(),
        )
        .unwrap();

        assert_eq!(invoice.total_amount, 5000);
        assert_eq!(invoice.sales_order_id, order.id);
        assert_eq!(invoice.status, InvoiceStatus::Draft);
    }

    #[test]
    fn for_order_requires_fulfilled_status() {
        let mut order = fulfilled_order(1000, 5);
        order.mark_invoiced().unwrap();
        let (invoice_date, due_date) = test_dates();
        let err = Invoice::for_order(
            InvoiceId::new(AggregateId::new()),
            "INV-20250120-0001".to_string(),
            &order,
            invoice_date,
            due_date,
            0,
            String::new(),
        )
        .unwrap_err();

        match err {
            DomainError::InvalidState { required, actual } => {
                assert_eq!(required, "fulfilled");
                assert_eq!(actual, "invoiced");
            }
            other => panic!("expected InvalidState, got {other:?}"),
        }
    }

    #[test]
    fn for_order_rejects_negative_tax_and_inverted_dates() {
        let order = fulfilled_order(1000, 1);
        let (invoice_date, due_date) = test_dates();

        let err = Invoice::for_order(
            InvoiceId::new(AggregateId::new()),
            "INV-20250120-0001".to_string(),
            &order,
            invoice_date,
            due_date,
            -1,
            String::new(),
        )
        .unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));

        let err = Invoice::for_order(
            InvoiceId::new(AggregateId::new()),
            "INV-20250120-0001".to_string(),
            &order,
            due_date,
            invoice_date,
            0,
            String::new(),
        )
        .unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
    }
}
