//! Document number allocation helper.
//!
//! Order numbers and invoice numbers share one scheme:
//! `PREFIX-YYYYMMDD-NNNN`, e.g. `SO-20250115-0003`. The sequence is the
//! highest existing sequence for that prefix + date, plus one.
//!
//! The functions here are pure; race-safety under concurrent allocation is the
//! storage layer's job (serialized allocation step, with the uniqueness
//! constraint on the number column as the final guard).

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Prefix used for sales order numbers.
pub const ORDER_NUMBER_PREFIX: &str = "SO";

/// Prefix used for invoice numbers.
pub const INVOICE_NUMBER_PREFIX: &str = "INV";

/// A dated, sequenced document number.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DocumentNumber {
    prefix: String,
    date: NaiveDate,
    sequence: u32,
}

impl DocumentNumber {
    pub fn new(prefix: impl Into<String>, date: NaiveDate, sequence: u32) -> Self {
        Self {
            prefix: prefix.into(),
            date,
            sequence,
        }
    }

    /// The next number in a series, given the highest sequence already
    /// allocated for this prefix + date (`None` when the series is empty).
    pub fn next(prefix: impl Into<String>, date: NaiveDate, highest: Option<u32>) -> Self {
        Self::new(prefix, date, highest.map_or(1, |n| n + 1))
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn date(&self) -> NaiveDate {
        self.date
    }

    pub fn sequence(&self) -> u32 {
        self.sequence
    }

    /// The `PREFIX-YYYYMMDD` stem shared by all numbers in one day's series.
    pub fn series_stem(prefix: &str, date: NaiveDate) -> String {
        format!("{}-{}", prefix, date.format("%Y%m%d"))
    }

    /// Extract the trailing sequence from a formatted number belonging to the
    /// given prefix + date series. Returns `None` for numbers outside the
    /// series or with a malformed tail.
    pub fn sequence_in_series(number: &str, prefix: &str, date: NaiveDate) -> Option<u32> {
        let stem = Self::series_stem(prefix, date);
        let tail = number.strip_prefix(&stem)?.strip_prefix('-')?;
        tail.parse().ok()
    }
}

impl core::fmt::Display for DocumentNumber {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(
            f,
            "{}-{}-{:04}",
            self.prefix,
            self.date.format("%Y%m%d"),
            self.sequence
        )
    }
}
