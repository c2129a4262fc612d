//! The transform stage: turns raw sheet rows into validated `Transaction`s.
//!
//! `clean` is a pure function of its inputs. Rows that cannot be parsed are never merged or
//! guessed at; they are returned as `RowError`s with their 1-based row number so that the run
//! summary can point at them.

use crate::model::{
    default_rules, fold, Amount, CategoryMap, Column, ColumnLayout, RowError, Transaction,
    DEFAULT_CURRENCY_SYMBOLS,
};
use chrono::NaiveDate;
use serde::Serialize;
use std::collections::HashSet;
use tracing::{debug, trace};

/// The settings `clean` needs, usually built by `Config::clean_options`.
#[derive(Debug, Clone)]
pub struct CleanOptions {
    pub categories: CategoryMap,
    /// Rows in these categories are skipped. Matching ignores case and repeated whitespace.
    pub excluded_categories: Vec<String>,
    /// `chrono` format strings, tried in order.
    pub date_formats: Vec<String>,
    pub currency_symbols: Vec<String>,
}

/// Categories skipped unless `config.json` says otherwise.
pub const DEFAULT_EXCLUDED_CATEGORIES: &[&str] = &["Exclude", "Starting Balance"];

/// Date formats tried unless `config.json` says otherwise.
pub const DEFAULT_DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%m/%d/%Y", "%d.%m.%Y"];

pub(crate) fn owned(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

impl Default for CleanOptions {
    fn default() -> Self {
        Self {
            categories: CategoryMap::new(&default_rules()).unwrap_or_default(),
            excluded_categories: owned(DEFAULT_EXCLUDED_CATEGORIES),
            date_formats: owned(DEFAULT_DATE_FORMATS),
            currency_symbols: owned(DEFAULT_CURRENCY_SYMBOLS),
        }
    }
}

/// The result of cleaning one batch of rows.
#[derive(Debug, Clone, Default, Eq, PartialEq, Serialize)]
pub struct Cleaned {
    pub transactions: Vec<Transaction>,
    pub errors: Vec<RowError>,
    /// Rows skipped because their category is excluded.
    pub excluded: usize,
    /// Rows with no content at all.
    pub blank: usize,
    /// Whether the first non-blank row was a header row.
    pub header: bool,
}

/// Cleans raw rows into transactions.
///
/// The first non-blank row is treated as a header if it names a date and an amount column;
/// otherwise columns are positional (date, amount, category, description, account).
pub fn clean<S: AsRef<str>>(rows: &[Vec<S>], options: &CleanOptions) -> Cleaned {
    let mut cleaned = Cleaned::default();
    let excluded: HashSet<String> = options
        .excluded_categories
        .iter()
        .map(|c| fold(c))
        .collect();

    let first = rows.iter().position(|row| !is_blank(row));
    let (header_ix, layout) =
        match first.and_then(|ix| ColumnLayout::detect(&rows[ix]).map(|l| (ix, l))) {
            Some((ix, layout)) => {
                debug!("Found a header at row {}", ix + 1);
                cleaned.header = true;
                (Some(ix), layout)
            }
            None => (None, ColumnLayout::positional()),
        };

    for (ix, row) in rows.iter().enumerate() {
        let row_number = ix + 1;
        if Some(ix) == header_ix {
            continue;
        }
        if is_blank(row) {
            cleaned.blank += 1;
            continue;
        }

        let raw_category = layout.get(row, Column::Category);
        if excluded.contains(&fold(raw_category)) {
            trace!("Row {row_number} is in excluded category '{raw_category}'");
            cleaned.excluded += 1;
            continue;
        }

        match parse_row(row_number, row, &layout, options) {
            Ok(transaction) => cleaned.transactions.push(transaction),
            Err(reason) => {
                debug!("Row {row_number} dropped: {reason}");
                cleaned.errors.push(RowError {
                    row: row_number,
                    reason,
                });
            }
        }
    }

    cleaned
}

fn parse_row<S: AsRef<str>>(
    row_number: usize,
    row: &[S],
    layout: &ColumnLayout,
    options: &CleanOptions,
) -> Result<Transaction, String> {
    let date = parse_date(layout.get(row, Column::Date), &options.date_formats)?;

    let amount = Amount::parse(layout.get(row, Column::Amount), &options.currency_symbols)
        .map_err(|e| e.to_string())?;
    if amount.is_zero() {
        return Err("the amount is zero".to_string());
    }

    let (category, kind) = options
        .categories
        .normalize(layout.get(row, Column::Category));

    Ok(Transaction {
        row: row_number,
        date,
        amount,
        category: category.to_string(),
        kind,
        description: layout.get(row, Column::Description).to_string(),
        account: layout.get(row, Column::Account).to_string(),
    })
}

/// Tries each format in order. A date must be a real calendar date, so `2024-02-30` fails.
fn parse_date(s: &str, formats: &[String]) -> Result<NaiveDate, String> {
    if s.is_empty() {
        return Err("the date is blank".to_string());
    }
    formats
        .iter()
        .find_map(|format| NaiveDate::parse_from_str(s, format).ok())
        .ok_or_else(|| format!("'{s}' is not a valid date"))
}

fn is_blank<S: AsRef<str>>(row: &[S]) -> bool {
    row.iter().all(|cell| cell.as_ref().trim().is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::{Granularity, Report};
    use crate::model::{CategoryKind, CategoryRule, UNCATEGORIZED};
    use rust_decimal_macros::dec;

    fn rows(data: &[&[&str]]) -> Vec<Vec<String>> {
        data.iter()
            .map(|r| r.iter().map(|c| c.to_string()).collect())
            .collect()
    }

    #[test]
    fn test_scenario_bad_amount_is_dropped() {
        let raw = rows(&[
            &["2024-01-05", "-42.50", "Groceries", "Market"],
            &["2024-01-07", "bad", "Gas", "X"],
        ]);
        let cleaned = clean(&raw, &CleanOptions::default());

        assert!(!cleaned.header);
        assert_eq!(cleaned.transactions.len(), 1);
        let t = &cleaned.transactions[0];
        assert_eq!(t.category(), "Groceries");
        assert_eq!(t.kind(), CategoryKind::Expense);
        assert_eq!(t.amount().value(), dec!(-42.50));
        assert_eq!(t.date(), NaiveDate::from_ymd_opt(2024, 1, 5).unwrap());
        assert_eq!(t.description(), "Market");
        assert_eq!(t.row(), 1);

        assert_eq!(cleaned.errors.len(), 1);
        assert_eq!(cleaned.errors[0].row, 2);
        assert!(cleaned.errors[0].reason.contains("'bad' is not a valid amount"));
    }

    #[test]
    fn test_header_layout() {
        let raw = rows(&[
            &["Date", "Description", "Category", "Amount", "Account"],
            &["10/5/2025", "Costco", "groceries", "-$118.56", "Credit Card 1"],
            &["10/1/2025", "Payroll", "Paycheck", "$3,850.00", "Checking 1"],
        ]);
        let cleaned = clean(&raw, &CleanOptions::default());

        assert!(cleaned.header);
        assert!(cleaned.errors.is_empty());
        assert_eq!(cleaned.transactions.len(), 2);
        assert_eq!(cleaned.transactions[0].amount().value(), dec!(-118.56));
        assert_eq!(cleaned.transactions[0].account(), "Credit Card 1");
        assert_eq!(cleaned.transactions[0].row(), 2);
        assert_eq!(cleaned.transactions[1].category(), "Salary");
        assert_eq!(cleaned.transactions[1].kind(), CategoryKind::Income);
        assert_eq!(cleaned.transactions[1].amount().value(), dec!(3850.00));
    }

    #[test]
    fn test_blank_excluded_and_uncategorized() {
        let raw = rows(&[
            &["2024-01-01", "2500", "Starting Balance", "Opening"],
            &["", "  ", "", ""],
            &["2024-01-02", "-10", "Llama grooming", "?"],
            &["2024-01-03", "1200", "EXCLUDE", "Card payment"],
        ]);
        let cleaned = clean(&raw, &CleanOptions::default());

        assert_eq!(cleaned.excluded, 2);
        assert_eq!(cleaned.blank, 1);
        assert!(cleaned.errors.is_empty());
        assert_eq!(cleaned.transactions.len(), 1);
        assert_eq!(cleaned.transactions[0].category(), UNCATEGORIZED);
        assert_eq!(cleaned.transactions[0].kind(), CategoryKind::Uncategorized);
    }

    #[test]
    fn test_invalid_dates_and_amounts() {
        let raw = rows(&[
            &["2024-02-30", "-1", "Groceries"],
            &["", "-1", "Groceries"],
            &["2024-02-01", "0.00", "Groceries"],
            &["2024-02-01", "", "Groceries"],
            &["05.02.2024", "(12.00)", "Groceries"],
        ]);
        let cleaned = clean(&raw, &CleanOptions::default());

        let reasons: Vec<(usize, &str)> = cleaned
            .errors
            .iter()
            .map(|e| (e.row, e.reason.as_str()))
            .collect();
        assert_eq!(
            reasons,
            vec![
                (1, "'2024-02-30' is not a valid date"),
                (2, "the date is blank"),
                (3, "the amount is zero"),
                (4, "the amount is blank"),
            ]
        );
        assert_eq!(cleaned.transactions.len(), 1);
        assert_eq!(
            cleaned.transactions[0].date(),
            NaiveDate::from_ymd_opt(2024, 2, 5).unwrap()
        );
        assert_eq!(cleaned.transactions[0].amount().value(), dec!(-12.00));
    }

    #[test]
    fn test_huge_amounts_are_row_errors() {
        let raw = rows(&[
            &["2024-01-05", "79228162514264337593543950335", "Groceries"],
            &["2024-01-06", "79228162514264337593543950335", "Groceries"],
            &["2024-01-07", "-20.00", "Groceries"],
        ]);
        let cleaned = clean(&raw, &CleanOptions::default());

        assert_eq!(cleaned.transactions.len(), 1);
        assert_eq!(cleaned.errors.len(), 2);
        assert_eq!(cleaned.errors[1].row, 2);
        assert!(cleaned.errors[0].reason.contains("too large"));

        let report = Report::build(&cleaned.transactions, Granularity::Month);
        assert_eq!(report.summaries.len(), 1);
        assert_eq!(report.summaries[0].total.value(), dec!(-20.00));
    }

    #[test]
    fn test_empty_input() {
        let cleaned = clean::<String>(&[], &CleanOptions::default());
        assert_eq!(cleaned, Cleaned::default());
    }

    #[test]
    fn test_deterministic() {
        let raw = rows(&[
            &["Date", "Amount", "Category"],
            &["2024-01-05", "-42.50", "Groceries"],
            &["2024-01-06", "nope", "Groceries"],
            &["2024-01-07", "-3.10", "Coffee"],
        ]);
        let options = CleanOptions::default();
        assert_eq!(clean(&raw, &options), clean(&raw, &options));
    }

    #[test]
    fn test_custom_options() {
        let options = CleanOptions {
            categories: CategoryMap::new(&[CategoryRule::new(
                "Food",
                CategoryKind::Expense,
                &["potraviny"],
            )])
            .unwrap(),
            excluded_categories: vec![],
            date_formats: vec!["%d.%m.%Y".to_string()],
            currency_symbols: vec!["Kč".to_string()],
        };
        let raw = rows(&[&["5.1.2024", "-1 299,00 Kč", "Potraviny"]]);
        let cleaned = clean(&raw, &options);
        // A comma is a thousands separator, so this is -129900.
        assert_eq!(cleaned.transactions[0].amount().value(), dec!(-129900));
        assert_eq!(cleaned.transactions[0].category(), "Food");
    }
}
