//! The report writer: renders a `Report` as rows and overwrites the target ranges with them.
//!
//! Each target is cleared before it is written, so a report with fewer rows than the previous one
//! leaves nothing stale behind, and publishing the same report twice leaves the same cells.

use crate::analysis::{AccountTotal, CategoryDelta, CategorySummary, PeriodMetrics, Report};
use crate::api::Sheet;
use crate::config::Ranges;
use crate::error::{tagged, ErrorType, Res};
use crate::model::A1Range;
use anyhow::Context;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

pub const SUMMARY_HEADER: &[&str] = &["Period", "Category", "Kind", "Total", "Count"];

pub const METRICS_HEADER: &[&str] = &[
    "Period",
    "Income",
    "Expenses",
    "Savings",
    "Investments",
    "Cashflow",
    "Profit",
    "Expense Ratio",
    "Savings Ratio",
];

pub const DELTAS_HEADER: &[&str] = &[
    "Period",
    "Previous Period",
    "Category",
    "Previous",
    "Current",
    "Change",
];

pub const ACCOUNTS_HEADER: &[&str] = &["Account", "Total", "Count"];

/// A range that was overwritten by `publish`.
#[derive(Debug, Clone, Eq, PartialEq, Serialize, Deserialize)]
pub struct Published {
    pub name: String,
    pub range: A1Range,
    /// Rows written, header included.
    pub rows: usize,
}

/// Overwrites every target range in `ranges` with its part of `report`.
///
/// All targets are rendered and checked against the size of their range before anything is
/// touched. If a write fails part way, the error names the ranges that were already replaced and
/// keeps the `ErrorType` of the failure.
pub async fn publish(
    sheet: &mut dyn Sheet,
    spreadsheet_id: &str,
    ranges: &Ranges,
    report: &Report,
) -> Res<Vec<Published>> {
    let mut rendered = Vec::new();
    for (name, range) in ranges.targets() {
        let rows = render(name, report);
        check_fits(name, range, &rows)?;
        rendered.push((name, range, rows));
    }

    let mut published: Vec<Published> = Vec::new();
    for (name, range, rows) in rendered {
        debug!("Replacing {name} range {range} with {} rows", rows.len());
        let replaced = replace(sheet, spreadsheet_id, range, &rows).await;
        if let Err(e) = replaced {
            let done = if published.is_empty() {
                "none".to_string()
            } else {
                published
                    .iter()
                    .map(|p| p.range.to_string())
                    .collect::<Vec<_>>()
                    .join(", ")
            };
            return Err(e).context(format!(
                "Unable to publish the {name} range {range} (already replaced: {done})"
            ));
        }
        published.push(Published {
            name: name.to_string(),
            range: range.clone(),
            rows: rows.len(),
        });
    }

    info!(
        "Published {} ranges to spreadsheet {spreadsheet_id}",
        published.len()
    );
    Ok(published)
}

async fn replace(
    sheet: &mut dyn Sheet,
    spreadsheet_id: &str,
    range: &A1Range,
    rows: &[Vec<String>],
) -> Res<()> {
    sheet.clear(spreadsheet_id, range).await?;
    sheet.write(spreadsheet_id, range, rows).await
}

fn check_fits(name: &str, range: &A1Range, rows: &[Vec<String>]) -> Res<()> {
    let columns = rows.iter().map(Vec::len).max().unwrap_or_default();
    if let Some(width) = range.width() {
        if columns > width {
            return Err(tagged(
                ErrorType::Config,
                format!("The {name} range {range} has {width} columns but the report needs {columns}"),
            ));
        }
    }
    if let Some(end_row) = range.end_row() {
        let (start_row, _) = range.start();
        let height = end_row + 1 - start_row;
        if rows.len() > height {
            return Err(tagged(
                ErrorType::Config,
                format!(
                    "The {name} range {range} has {height} rows but the report needs {}",
                    rows.len()
                ),
            ));
        }
    }
    Ok(())
}

/// The rows for the target called `name`, header first.
pub fn render(name: &str, report: &Report) -> Vec<Vec<String>> {
    match name {
        "summary" => with_header(SUMMARY_HEADER, report.summaries.iter().map(summary_row)),
        "metrics" => with_header(METRICS_HEADER, report.metrics.iter().map(metrics_row)),
        "deltas" => with_header(DELTAS_HEADER, report.deltas.iter().map(delta_row)),
        "accounts" => with_header(ACCOUNTS_HEADER, report.accounts.iter().map(account_row)),
        _ => Vec::new(),
    }
}

fn with_header(header: &[&str], rows: impl Iterator<Item = Vec<String>>) -> Vec<Vec<String>> {
    std::iter::once(header.iter().map(|h| h.to_string()).collect())
        .chain(rows)
        .collect()
}

fn summary_row(s: &CategorySummary) -> Vec<String> {
    vec![
        s.period.clone(),
        s.category.clone(),
        s.kind.to_string(),
        s.total.to_string(),
        s.count.to_string(),
    ]
}

fn metrics_row(m: &PeriodMetrics) -> Vec<String> {
    let ratio = |r: Option<rust_decimal::Decimal>| r.map(|r| r.to_string()).unwrap_or_default();
    vec![
        m.period.clone(),
        m.income.to_string(),
        m.expenses.to_string(),
        m.savings.to_string(),
        m.investments.to_string(),
        m.cashflow.to_string(),
        m.profit.to_string(),
        ratio(m.expense_ratio),
        ratio(m.savings_ratio),
    ]
}

fn delta_row(d: &CategoryDelta) -> Vec<String> {
    vec![
        d.period.clone(),
        d.previous_period.clone(),
        d.category.clone(),
        d.previous.to_string(),
        d.current.to_string(),
        d.change.to_string(),
    ]
}

fn account_row(a: &AccountTotal) -> Vec<String> {
    vec![a.account.clone(), a.total.to_string(), a.count.to_string()]
}
