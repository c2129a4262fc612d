use crate::model::category::fold;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// The columns that the transform stage understands.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Column {
    Date,
    Amount,
    Category,
    Description,
    Account,
}

serde_plain::derive_display_from_serialize!(Column);
serde_plain::derive_fromstr_from_deserialize!(Column);

/// Column order when the sheet has no header row.
const POSITIONAL: [Column; 5] = [
    Column::Date,
    Column::Amount,
    Column::Category,
    Column::Description,
    Column::Account,
];

impl Column {
    /// Recognizes a header cell. Matching ignores case and repeated whitespace.
    pub fn from_header(header: &str) -> Option<Column> {
        match fold(header).as_str() {
            "date" | "transaction date" | "posted date" => Some(Column::Date),
            "amount" | "value" | "sum" => Some(Column::Amount),
            "category" => Some(Column::Category),
            "description" | "memo" | "payee" | "full description" => Some(Column::Description),
            "account" | "account name" => Some(Column::Account),
            _ => None,
        }
    }
}

/// Maps each known `Column` to its index in a row.
#[derive(Debug, Clone, Eq, PartialEq, Serialize, Deserialize)]
pub struct ColumnLayout {
    indexes: BTreeMap<Column, usize>,
}

impl ColumnLayout {
    /// The layout used for sheets without a header row: date, amount, category, description,
    /// account.
    pub fn positional() -> Self {
        Self {
            indexes: POSITIONAL
                .iter()
                .enumerate()
                .map(|(ix, col)| (*col, ix))
                .collect(),
        }
    }

    /// Treats `row` as a header row if it names both a date and an amount column. When a header
    /// appears twice the first occurrence wins.
    pub fn detect<S: AsRef<str>>(row: &[S]) -> Option<Self> {
        let mut indexes = BTreeMap::new();
        for (ix, cell) in row.iter().enumerate() {
            if let Some(col) = Column::from_header(cell.as_ref()) {
                indexes.entry(col).or_insert(ix);
            }
        }
        if indexes.contains_key(&Column::Date) && indexes.contains_key(&Column::Amount) {
            Some(Self { indexes })
        } else {
            None
        }
    }

    /// The trimmed cell for `col`, or `""` when the column is unknown or the row is short.
    pub fn get<'a, S: AsRef<str>>(&self, row: &'a [S], col: Column) -> &'a str {
        self.indexes
            .get(&col)
            .and_then(|ix| row.get(*ix))
            .map(|cell| cell.as_ref().trim())
            .unwrap_or("")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detect_header() {
        let header = vec!["", "DATE", "Description", "VALUE", "Category", "Account", "TYPE"];
        let layout = ColumnLayout::detect(&header).unwrap();
        let row = vec!["", "2024-01-05", "Market", "-42.50", "Groceries", "Checking", "expense"];
        assert_eq!(layout.get(&row, Column::Date), "2024-01-05");
        assert_eq!(layout.get(&row, Column::Amount), "-42.50");
        assert_eq!(layout.get(&row, Column::Account), "Checking");
    }

    #[test]
    fn test_data_row_is_not_a_header() {
        let row = vec!["2024-01-05", "-42.50", "Groceries", "Market"];
        assert!(ColumnLayout::detect(&row).is_none());
        // a header needs both date and amount
        assert!(ColumnLayout::detect(&["Date", "Category"]).is_none());
    }

    #[test]
    fn test_positional_and_short_rows() {
        let layout = ColumnLayout::positional();
        let row = vec!["2024-01-05", " -42.50 ", "Groceries"];
        assert_eq!(layout.get(&row, Column::Amount), "-42.50");
        assert_eq!(layout.get(&row, Column::Description), "");
        assert_eq!(layout.get(&row, Column::Account), "");
    }

    #[test]
    fn test_duplicate_header_first_wins() {
        let layout = ColumnLayout::detect(&["Date", "Amount", "Value"]).unwrap();
        assert_eq!(layout.get(&["d", "first", "second"], Column::Amount), "first");
    }

    #[test]
    fn test_column_display() {
        assert_eq!(Column::Description.to_string(), "description");
        assert_eq!(Column::from_header("  Account  Name"), Some(Column::Account));
    }
}
