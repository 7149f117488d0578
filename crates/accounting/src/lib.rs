//! Accounting domain module: general ledger entries and control accounts.
//!
//! Ledger rows are append-only. The posting builder here is pure; the store
//! appends its output inside the invoice-creation unit of work.

pub mod ledger;

pub use ledger::{
    entries_balanced, invoice_postings, Account, AccountKind, ControlAccount, LedgerEntry,
    LedgerEntryId, TransactionType, ACCOUNTS_RECEIVABLE, SALES_REVENUE,
};
