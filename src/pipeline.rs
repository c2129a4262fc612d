//! One run of the whole pipeline: read, clean, analyze, back up and publish.

use crate::analysis::{top_transactions, CategorySummary, Granularity, PeriodMetrics, Report};
use crate::api::Sheet;
use crate::backup::{RangeSnapshot, Snapshot, PUBLISH_PRE};
use crate::error::Res;
use crate::model::{RowError, Transaction};
use crate::report::{publish, Published};
use crate::transform::clean;
use crate::Config;
use anyhow::Context;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// How many of the largest transactions are kept in the run summary.
const LARGEST: usize = 5;

#[derive(Debug, Clone, Default, Eq, PartialEq)]
pub struct RunOptions {
    /// Overrides the granularity from `config.json`.
    pub granularity: Option<Granularity>,
    /// Compute everything but do not back up or write to the spreadsheet.
    pub dry_run: bool,
}

/// What a run did.
#[derive(Debug, Clone, Eq, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    pub run_id: Uuid,
    pub spreadsheet_id: String,
    pub granularity: Granularity,
    pub dry_run: bool,
    /// Rows returned by the sheet, header and blank rows included.
    pub rows_read: usize,
    /// Rows that became transactions.
    pub transactions: usize,
    /// Rows that could not be parsed.
    pub errors: Vec<RowError>,
    pub excluded: usize,
    pub blank: usize,
    pub summaries: Vec<CategorySummary>,
    pub metrics: Vec<PeriodMetrics>,
    pub largest: Vec<Transaction>,
    pub published: Vec<Published>,
    /// The snapshot of the report ranges taken before they were overwritten.
    pub backup: Option<PathBuf>,
}

/// Runs the pipeline once against `sheet`.
///
/// Rows that cannot be parsed are reported in the summary and never stop the run. Failing to
/// read, back up or publish does.
pub async fn run(config: &Config, sheet: &mut dyn Sheet, options: &RunOptions) -> Res<RunSummary> {
    let run_id = Uuid::new_v4();
    let spreadsheet_id = config.spreadsheet_id();
    let ranges = config.ranges();
    let granularity = options.granularity.unwrap_or(config.granularity());
    info!("Starting run {run_id} on spreadsheet {spreadsheet_id}");

    let raw = sheet
        .read(spreadsheet_id, &ranges.transactions)
        .await
        .with_context(|| format!("Unable to read the transactions from {}", ranges.transactions))?;
    debug!("Read {} rows from {}", raw.len(), ranges.transactions);

    let cleaned = clean(&raw, &config.clean_options());
    if !cleaned.errors.is_empty() {
        warn!("{} rows could not be parsed and were skipped", cleaned.errors.len());
        for e in &cleaned.errors {
            warn!("  row {}: {}", e.row, e.reason);
        }
    }
    info!(
        "Cleaned {} transactions ({} excluded, {} blank)",
        cleaned.transactions.len(),
        cleaned.excluded,
        cleaned.blank
    );

    let report = Report::build(&cleaned.transactions, granularity);
    let largest = top_transactions(&cleaned.transactions, LARGEST, None, None)
        .into_iter()
        .cloned()
        .collect();

    let (backup, published) = if options.dry_run {
        info!("Dry run, nothing was written to the spreadsheet");
        (None, Vec::new())
    } else {
        let backup = snapshot(config, sheet, run_id)
            .await
            .context("Unable to back up the report ranges, nothing was published")?;
        let published = publish(sheet, spreadsheet_id, ranges, &report).await?;
        (backup, published)
    };

    Ok(RunSummary {
        run_id,
        spreadsheet_id: spreadsheet_id.to_string(),
        granularity,
        dry_run: options.dry_run,
        rows_read: raw.len(),
        transactions: cleaned.transactions.len(),
        errors: cleaned.errors,
        excluded: cleaned.excluded,
        blank: cleaned.blank,
        summaries: report.summaries,
        metrics: report.metrics,
        largest,
        published,
        backup,
    })
}

/// Reads the current contents of every report range and saves them as a `publish-pre` backup.
/// Does not read anything when backups are disabled.
async fn snapshot(config: &Config, sheet: &mut dyn Sheet, run_id: Uuid) -> Res<Option<PathBuf>> {
    let backup = config.backup();
    if !backup.enabled() {
        debug!("Backups are disabled, not taking a snapshot");
        return Ok(None);
    }

    let spreadsheet_id = config.spreadsheet_id();
    let mut ranges = Vec::new();
    for (_, range) in config.ranges().targets() {
        let rows = sheet.read(spreadsheet_id, range).await?;
        ranges.push(RangeSnapshot {
            range: range.clone(),
            rows,
        });
    }

    let snapshot = Snapshot {
        run_id: run_id.to_string(),
        spreadsheet_id: spreadsheet_id.to_string(),
        taken_at: Utc::now(),
        ranges,
    };
    let path = backup.save_json(PUBLISH_PRE, &snapshot).await?;
    if let Some(path) = &path {
        info!("Saved the prior report ranges to {}", path.display());
    }
    Ok(path)
}
