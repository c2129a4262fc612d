//! The analysis stage: category totals per period and the figures derived from them.
//!
//! All arithmetic is exact `Decimal` arithmetic. Every output is sorted, so the same transactions
//! always produce the same report.

use crate::model::{Amount, CategoryKind, Transaction};
use chrono::{Datelike, NaiveDate};
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Decimal places kept for the expense and savings ratios.
const RATIO_DP: u32 = 4;

/// The label used for transactions whose account cell is empty.
pub const NO_ACCOUNT: &str = "(no account)";

/// The size of the time buckets that transactions are grouped into.
#[derive(
    Debug, Default, Clone, Copy, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum Granularity {
    /// `2024-01-05`
    Day,
    /// ISO week, `2024-W01`
    Week,
    /// `2024-01`
    #[default]
    Month,
    /// `2024-Q1`
    Quarter,
    /// `2024`
    Year,
}

serde_plain::derive_display_from_serialize!(Granularity);
serde_plain::derive_fromstr_from_deserialize!(Granularity);

impl Granularity {
    /// The period label for `date`. Labels of the same granularity sort chronologically.
    pub fn period(&self, date: NaiveDate) -> String {
        match self {
            Granularity::Day => date.format("%Y-%m-%d").to_string(),
            Granularity::Week => {
                let week = date.iso_week();
                format!("{:04}-W{:02}", week.year(), week.week())
            }
            Granularity::Month => format!("{:04}-{:02}", date.year(), date.month()),
            Granularity::Quarter => format!("{:04}-Q{}", date.year(), (date.month() - 1) / 3 + 1),
            Granularity::Year => format!("{:04}", date.year()),
        }
    }
}

/// The total of one category in one period.
#[derive(Debug, Clone, Eq, PartialEq, Serialize, Deserialize)]
pub struct CategorySummary {
    pub period: String,
    pub category: String,
    pub kind: CategoryKind,
    /// Signed sum of the amounts.
    pub total: Amount,
    /// Number of transactions.
    pub count: usize,
}

/// The headline figures of one period.
#[derive(Debug, Clone, Eq, PartialEq, Serialize, Deserialize)]
pub struct PeriodMetrics {
    pub period: String,
    pub income: Amount,
    /// Negative when money went out.
    pub expenses: Amount,
    pub savings: Amount,
    pub investments: Amount,
    /// Everything that moved: income, expenses, savings and investments.
    pub cashflow: Amount,
    /// Income plus expenses.
    pub profit: Amount,
    /// `|expenses| / income`, absent when there is no income.
    pub expense_ratio: Option<Decimal>,
    /// `profit / income`, absent when there is no income.
    pub savings_ratio: Option<Decimal>,
}

/// How a category's total changed from one period to the next.
#[derive(Debug, Clone, Eq, PartialEq, Serialize, Deserialize)]
pub struct CategoryDelta {
    pub period: String,
    pub previous_period: String,
    pub category: String,
    pub previous: Amount,
    pub current: Amount,
    pub change: Amount,
}

#[derive(Debug, Clone, Eq, PartialEq, Serialize, Deserialize)]
pub struct AccountTotal {
    pub account: String,
    pub total: Amount,
    pub count: usize,
}

/// Everything the report writer publishes.
#[derive(Debug, Clone, Default, Eq, PartialEq, Serialize, Deserialize)]
pub struct Report {
    pub granularity: Granularity,
    pub summaries: Vec<CategorySummary>,
    pub metrics: Vec<PeriodMetrics>,
    pub deltas: Vec<CategoryDelta>,
    pub accounts: Vec<AccountTotal>,
}

impl Report {
    pub fn build(transactions: &[Transaction], granularity: Granularity) -> Self {
        let summaries = summarize(transactions, granularity);
        let metrics = period_metrics(&summaries);
        let deltas = category_deltas(&summaries);
        Self {
            granularity,
            summaries,
            metrics,
            deltas,
            accounts: account_totals(transactions),
        }
    }
}

/// Groups transactions by (period, category) and sums them. The result is sorted by period, then
/// category. The total of each period equals the sum of its transactions.
pub fn summarize(transactions: &[Transaction], granularity: Granularity) -> Vec<CategorySummary> {
    let mut groups: BTreeMap<(String, &str), (CategoryKind, Decimal, usize)> = BTreeMap::new();
    for t in transactions {
        let key = (granularity.period(t.date()), t.category());
        let entry = groups
            .entry(key)
            .or_insert((t.kind(), Decimal::ZERO, 0));
        entry.1 += t.amount().value();
        entry.2 += 1;
    }

    groups
        .into_iter()
        .map(|((period, category), (kind, total, count))| CategorySummary {
            period,
            category: category.to_string(),
            kind,
            total: Amount::new(total),
            count,
        })
        .collect()
}

/// Computes the headline figures of each period from its category totals.
///
/// Uncategorized totals count as income when positive and as expenses when negative.
pub fn period_metrics(summaries: &[CategorySummary]) -> Vec<PeriodMetrics> {
    #[derive(Default)]
    struct Sums {
        income: Decimal,
        expenses: Decimal,
        savings: Decimal,
        investments: Decimal,
    }

    let mut periods: BTreeMap<&str, Sums> = BTreeMap::new();
    for s in summaries {
        let sums = periods.entry(s.period.as_str()).or_default();
        let total = s.total.value();
        match s.kind {
            CategoryKind::Income => sums.income += total,
            CategoryKind::Expense => sums.expenses += total,
            CategoryKind::Saving => sums.savings += total,
            CategoryKind::Investment => sums.investments += total,
            CategoryKind::Uncategorized if total.is_sign_negative() => sums.expenses += total,
            CategoryKind::Uncategorized => sums.income += total,
        }
    }

    periods
        .into_iter()
        .map(|(period, s)| {
            let profit = s.income + s.expenses;
            PeriodMetrics {
                period: period.to_string(),
                income: Amount::new(s.income),
                expenses: Amount::new(s.expenses),
                savings: Amount::new(s.savings),
                investments: Amount::new(s.investments),
                cashflow: Amount::new(s.income + s.expenses + s.savings + s.investments),
                profit: Amount::new(profit),
                expense_ratio: ratio(s.expenses.abs(), s.income),
                savings_ratio: ratio(profit, s.income),
            }
        })
        .collect()
}

fn ratio(numerator: Decimal, income: Decimal) -> Option<Decimal> {
    if income <= Decimal::ZERO {
        return None;
    }
    numerator
        .checked_div(income)
        .map(|r| r.round_dp_with_strategy(RATIO_DP, RoundingStrategy::MidpointAwayFromZero))
}

/// For every category, the change between each period and the one before it in the sorted list
/// of all periods. A category missing from a period counts as zero there. Periods in which the
/// category is zero on both sides are left out.
pub fn category_deltas(summaries: &[CategorySummary]) -> Vec<CategoryDelta> {
    let periods: BTreeSet<&str> = summaries.iter().map(|s| s.period.as_str()).collect();
    let periods: Vec<&str> = periods.into_iter().collect();

    let mut totals: BTreeMap<&str, BTreeMap<&str, Decimal>> = BTreeMap::new();
    for s in summaries {
        *totals
            .entry(s.category.as_str())
            .or_default()
            .entry(s.period.as_str())
            .or_default() += s.total.value();
    }

    let mut deltas = Vec::new();
    for window in periods.windows(2) {
        let (previous_period, period) = (window[0], window[1]);
        for (category, by_period) in &totals {
            let previous = by_period.get(previous_period).copied().unwrap_or_default();
            let current = by_period.get(period).copied().unwrap_or_default();
            if previous.is_zero() && current.is_zero() {
                continue;
            }
            deltas.push(CategoryDelta {
                period: period.to_string(),
                previous_period: previous_period.to_string(),
                category: category.to_string(),
                previous: Amount::new(previous),
                current: Amount::new(current),
                change: Amount::new(current - previous),
            });
        }
    }
    deltas
}

/// Totals and counts per account, sorted by account name.
pub fn account_totals(transactions: &[Transaction]) -> Vec<AccountTotal> {
    let mut accounts: BTreeMap<&str, (Decimal, usize)> = BTreeMap::new();
    for t in transactions {
        let account = match t.account() {
            "" => NO_ACCOUNT,
            account => account,
        };
        let entry = accounts.entry(account).or_default();
        entry.0 += t.amount().value();
        entry.1 += 1;
    }
    accounts
        .into_iter()
        .map(|(account, (total, count))| AccountTotal {
            account: account.to_string(),
            total: Amount::new(total),
            count,
        })
        .collect()
}

/// The `n` largest transactions by magnitude, optionally restricted to one category and/or one
/// period. Ties keep date order.
pub fn top_transactions<'a>(
    transactions: &'a [Transaction],
    n: usize,
    category: Option<&str>,
    period: Option<(Granularity, &str)>,
) -> Vec<&'a Transaction> {
    let mut matching: Vec<&Transaction> = transactions
        .iter()
        .filter(|t| category.map_or(true, |c| t.category().eq_ignore_ascii_case(c)))
        .filter(|t| period.map_or(true, |(g, p)| g.period(t.date()) == p))
        .collect();
    matching.sort_by(|a, b| {
        b.amount()
            .value()
            .abs()
            .cmp(&a.amount().value().abs())
            .then(a.date().cmp(&b.date()))
            .then(a.row().cmp(&b.row()))
    });
    matching.truncate(n);
    matching
}
