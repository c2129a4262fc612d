use crate::api::{self, Mode};
use crate::commands::Out;
use crate::error::{ErrorType, IntoResult};
use crate::pipeline::{RunOptions, RunSummary};
use crate::{pipeline, Config, Result};
use std::fmt::Write;

/// Handles the `finsheet run` command: reads the transactions, computes the report and publishes
/// it to the report ranges.
///
/// `mode` decides whether Google Sheets or the in-memory test sheet is used.
pub async fn run(config: &Config, mode: Mode, options: RunOptions) -> Result<Out<RunSummary>> {
    let mut sheet = api::sheet(config, mode).await.pub_result(ErrorType::Internal)?;
    let summary = pipeline::run(config, sheet.as_mut(), &options)
        .await
        .pub_result(ErrorType::Internal)?;
    Ok(Out::new(message(&summary), summary))
}

fn message(summary: &RunSummary) -> String {
    let mut message = format!(
        "Run {}: {} transactions from {} rows ({} excluded, {} blank, {} skipped)",
        summary.run_id,
        summary.transactions,
        summary.rows_read,
        summary.excluded,
        summary.blank,
        summary.errors.len(),
    );
    for e in &summary.errors {
        let _ = write!(message, "\n  row {} skipped: {}", e.row, e.reason);
    }
    for m in &summary.metrics {
        let _ = write!(
            message,
            "\n  {}: income {}, expenses {}, profit {}",
            m.period,
            m.income.pretty(),
            m.expenses.pretty(),
            m.profit.pretty()
        );
    }
    if summary.dry_run {
        message.push_str("\nDry run, nothing was published");
    } else {
        let ranges: Vec<String> = summary
            .published
            .iter()
            .map(|p| p.range.to_string())
            .collect();
        let _ = write!(message, "\nPublished {}", ranges.join(", "));
        if let Some(backup) = &summary.backup {
            let _ = write!(message, "\nPrevious contents saved to {}", backup.display());
        }
    }
    message
}
