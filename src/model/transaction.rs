use crate::model::{Amount, CategoryKind};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// A cleaned transaction. By construction the date is a real calendar date, the amount is
/// non-zero and the category is one of the configured categories or `Uncategorized`.
#[derive(Debug, Clone, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct Transaction {
    /// 1-based row number in the source range, for tracing a number back to the sheet.
    pub(crate) row: usize,
    pub(crate) date: NaiveDate,
    pub(crate) amount: Amount,
    pub(crate) category: String,
    pub(crate) kind: CategoryKind,
    pub(crate) description: String,
    pub(crate) account: String,
}

impl Transaction {
    pub fn row(&self) -> usize {
        self.row
    }

    pub fn date(&self) -> NaiveDate {
        self.date
    }

    pub fn amount(&self) -> Amount {
        self.amount
    }

    pub fn category(&self) -> &str {
        &self.category
    }

    pub fn kind(&self) -> CategoryKind {
        self.kind
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn account(&self) -> &str {
        &self.account
    }
}

/// Why a raw row did not become a `Transaction`.
#[derive(Debug, Clone, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct RowError {
    /// 1-based row number in the source range.
    pub row: usize,
    pub reason: String,
}
