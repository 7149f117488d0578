use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use anvilerp_core::{AccountId, AggregateId, DomainError, DomainResult};
use anvilerp_invoicing::{Invoice, InvoiceId};

/// High-level account kind (determines normal balance side).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccountKind {
    Asset,
    Liability,
    Equity,
    Revenue,
    Expense,
}

impl AccountKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            AccountKind::Asset => "asset",
            AccountKind::Liability => "liability",
            AccountKind::Equity => "equity",
            AccountKind::Revenue => "revenue",
            AccountKind::Expense => "expense",
        }
    }
}

impl core::str::FromStr for AccountKind {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "asset" => Ok(AccountKind::Asset),
            "liability" => Ok(AccountKind::Liability),
            "equity" => Ok(AccountKind::Equity),
            "revenue" => Ok(AccountKind::Revenue),
            "expense" => Ok(AccountKind::Expense),
            other => Err(DomainError::validation(format!(
                "unknown account kind '{other}'"
            ))),
        }
    }
}

/// Ledger account row (chart of accounts).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    pub id: AccountId,
    pub code: String, // e.g. "1200"
    pub name: String, // e.g. "Accounts Receivable"
    pub kind: AccountKind,
}

/// Well-known account resolved-or-created by code at posting time.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct ControlAccount {
    pub code: &'static str,
    pub name: &'static str,
    pub kind: AccountKind,
}

/// Debit side of an invoice posting.
pub const ACCOUNTS_RECEIVABLE: ControlAccount = ControlAccount {
    code: "1200",
    name: "Accounts Receivable",
    kind: AccountKind::Asset,
};

/// Credit side of an invoice posting.
pub const SALES_REVENUE: ControlAccount = ControlAccount {
    code: "4000",
    name: "Sales Revenue",
    kind: AccountKind::Revenue,
};

/// Debit/credit marker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionType {
    Debit,
    Credit,
}

impl TransactionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionType::Debit => "debit",
            TransactionType::Credit => "credit",
        }
    }
}

impl core::str::FromStr for TransactionType {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "debit" => Ok(TransactionType::Debit),
            "credit" => Ok(TransactionType::Credit),
            other => Err(DomainError::validation(format!(
                "unknown transaction type '{other}'"
            ))),
        }
    }
}

/// Ledger entry identifier.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LedgerEntryId(pub AggregateId);

impl LedgerEntryId {
    pub fn new(id: AggregateId) -> Self {
        Self(id)
    }
}

impl core::fmt::Display for LedgerEntryId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

/// One side of a posting. Immutable once created (append-only).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub id: LedgerEntryId,
    pub account_id: AccountId,
    pub invoice_id: Option<InvoiceId>,
    pub transaction_type: TransactionType,
    /// Positive amount in smallest currency unit.
    pub amount: i64,
    pub transaction_date: NaiveDate,
    pub description: String,
}

/// Sum of debits minus credits is zero.
pub fn entries_balanced(entries: &[LedgerEntry]) -> bool {
    let mut total: i128 = 0;
    for e in entries {
        match e.transaction_type {
            TransactionType::Debit => total += e.amount as i128,
            TransactionType::Credit => total -= e.amount as i128,
        }
    }
    total == 0
}

/// Build the double-entry posting for an invoice: one debit to Accounts
/// Receivable and one credit to Sales Revenue, both for the invoice total,
/// dated on the invoice date.
pub fn invoice_postings(
    invoice: &Invoice,
    receivable: &Account,
    revenue: &Account,
) -> DomainResult<[LedgerEntry; 2]> {
    if invoice.total_amount < 0 {
        return Err(DomainError::validation(
            "cannot post a negative invoice total",
        ));
    }
    let description = format!("Invoice {}", invoice.invoice_number);

    let debit = LedgerEntry {
        id: LedgerEntryId::new(AggregateId::new()),
        account_id: receivable.id,
        invoice_id: Some(invoice.id),
        transaction_type: TransactionType::Debit,
        amount: invoice.total_amount,
        transaction_date: invoice.invoice_date,
        description: description.clone(),
    };
    let credit = LedgerEntry {
        id: LedgerEntryId::new(AggregateId::new()),
        account_id: revenue.id,
        invoice_id: Some(invoice.id),
        transaction_type: TransactionType::Credit,
        amount: invoice.total_amount,
        transaction_date: invoice.invoice_date,
        description,
    };

    Ok([debit, credit])
}

#[cfg(test)]
mod tests {
    use super::*;
    use anvilerp_core::{CustomerId, ProductId, UserId, WarehouseId};
    use anvilerp_invoicing::InvoiceId;
    use anvilerp_sales::{NewOrderItem, SalesOrder, SalesOrderId};
    use proptest::prelude::*;

    fn test_account(control: ControlAccount) -> Account {
        Account {
            id: AccountId::new(),
            code: control.code.to_string(),
            name: control.name.to_string(),
            kind: control.kind,
        }
    }

    fn test_invoice(total_cents: i64) -> Invoice {
        let mut order = SalesOrder::create(
            SalesOrderId::new(AggregateId::new()),
            "SO-20250115-0001".to_string(),
            CustomerId::new(),
            NaiveDate::from_ymd_opt(2025, 1, 15).unwrap(),
            vec![NewOrderItem {
                product_id: ProductId::new(),
                warehouse_id: WarehouseId::new(),
                quantity: 1,
                unit_price: total_cents,
            }],
            UserId::new(),
            String::new(),
        )
        .unwrap();
        order.confirm().unwrap();
        order.fulfill().unwrap();
        Invoice::for_order(
            InvoiceId::new(AggregateId::new()),
            "INV-20250120-0001".to_string(),
            &order,
            NaiveDate::from_ymd_opt(2025, 1, 20).unwrap(),
            NaiveDate::from_ymd_opt(2025, 2, 19).unwrap(),
            0,
            String::new(),
        )
        .unwrap()
    }

    #[test]
    fn invoice_postings_produce_one_debit_and_one_credit() {
        let invoice = test_invoice(5000);
        let receivable = test_account(ACCOUNTS_RECEIVABLE);
        let revenue = test_account(SALES_REVENUE);

        let [debit, credit] = invoice_postings(&invoice, &receivable, &revenue).unwrap();

        assert_eq!(debit.transaction_type, TransactionType::Debit);
        assert_eq!(debit.account_id, receivable.id);
        assert_eq!(debit.amount, 5000);
        assert_eq!(debit.invoice_id, Some(invoice.id));
        assert_eq!(debit.transaction_date, invoice.invoice_date);

        assert_eq!(credit.transaction_type, TransactionType::Credit);
        assert_eq!(credit.account_id, revenue.id);
        assert_eq!(credit.amount, 5000);

        assert!(entries_balanced(&[debit, credit]));
    }

    #[test]
    fn entries_balanced_detects_mismatch() {
        let invoice = test_invoice(100);
        let receivable = test_account(ACCOUNTS_RECEIVABLE);
        let revenue = test_account(SALES_REVENUE);
        let [debit, mut credit] = invoice_postings(&invoice, &receivable, &revenue).unwrap();
        credit.amount -= 1;
        assert!(!entries_balanced(&[debit, credit]));
    }

    #[test]
    fn control_account_codes_match_chart_of_accounts() {
        assert_eq!(ACCOUNTS_RECEIVABLE.code, "1200");
        assert_eq!(ACCOUNTS_RECEIVABLE.kind, AccountKind::Asset);
        assert_eq!(SALES_REVENUE.code, "4000");
        assert_eq!(SALES_REVENUE.kind, AccountKind::Revenue);
    }

    proptest! {
        #![proptest_config(ProptestConfig {
            cases: 256,
            ..ProptestConfig::default()
        })]

        /// Property: postings for any run of invoices always net to zero.
        #[test]
        fn postings_always_balance(amounts in prop::collection::vec(0i64..1_000_000, 1..10)) {
            let receivable = test_account(ACCOUNTS_RECEIVABLE);
            let revenue = test_account(SALES_REVENUE);

            let mut all = Vec::new();
            for amount in amounts {
                let invoice = test_invoice(amount);
                let [debit, credit] =
                    invoice_postings(&invoice, &receivable, &revenue).unwrap();
                prop_assert_eq!(debit.amount, credit.amount);
                all.push(debit);
                all.push(credit);
            }
            prop_assert!(entries_balanced(&all));
        }
    }
}
