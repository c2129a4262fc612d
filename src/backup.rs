//! Local JSON snapshots of the report ranges, taken right before they are overwritten.

use crate::error::Res;
use crate::model::A1Range;
use crate::{utils, Config};
use anyhow::Context;
use chrono::{DateTime, Local, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::debug;

/// Prefix for snapshots taken before publishing.
pub const PUBLISH_PRE: &str = "publish-pre";

/// The prior contents of every report range, as read right before a publish.
#[derive(Debug, Clone, Eq, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub run_id: String,
    pub spreadsheet_id: String,
    pub taken_at: DateTime<Utc>,
    pub ranges: Vec<RangeSnapshot>,
}

#[derive(Debug, Clone, Eq, PartialEq, Serialize, Deserialize)]
pub struct RangeSnapshot {
    pub range: A1Range,
    pub rows: Vec<Vec<String>>,
}

/// Manages backup file creation and rotation.
///
/// The `Backup` struct is immutable and owns copies of the paths and settings it needs.
/// Create a new instance via `Config::backup()` or `Backup::new()`.
#[derive(Debug, Clone)]
pub struct Backup {
    backups_dir: PathBuf,
    backup_copies: u32,
}

impl Backup {
    pub fn new(config: &Config) -> Self {
        Self {
            backups_dir: config.backups().to_path_buf(),
            backup_copies: config.backup_copies(),
        }
    }

    /// `false` when `backup_copies` is 0.
    pub fn enabled(&self) -> bool {
        self.backup_copies > 0
    }

    /// Saves `data` as a pretty-printed JSON backup file.
    ///
    /// The filename format is `{prefix}.YYYY-MM-DD-NNN.json` where NNN is a sequence number.
    /// Automatically rotates old backups, keeping only `backup_copies` files. Returns `None`
    /// without writing anything when backups are disabled.
    pub async fn save_json<T: Serialize>(&self, prefix: &str, data: &T) -> Res<Option<PathBuf>> {
        if !self.enabled() {
            debug!("Backups are disabled, skipping the {prefix} backup");
            return Ok(None);
        }
        let date = today();
        let seq = self.next_sequence_number(prefix, &date).await?;
        let filename = format!("{prefix}.{date}-{seq:03}.json");
        let path = self.backups_dir.join(&filename);

        utils::serialize(&path, data).await?;
        self.rotate(prefix).await?;

        debug!("Wrote backup {}", path.display());
        Ok(Some(path))
    }

    /// Scans the backups directory for existing files with the given prefix and date,
    /// and returns the next sequence number.
    async fn next_sequence_number(&self, prefix: &str, date: &str) -> Res<u32> {
        let mut max_seq: u32 = 0;
        for name in self.file_names().await? {
            if let Some(seq) = parse_sequence_number(&name, prefix, date) {
                max_seq = max_seq.max(seq);
            }
        }
        Ok(max_seq + 1)
    }

    /// Keeps only the newest `backup_copies` files with the given prefix.
    async fn rotate(&self, prefix: &str) -> Res<()> {
        let mut files: Vec<String> = self
            .file_names()
            .await?
            .into_iter()
            .filter(|name| is_backup_file(name, prefix))
            .collect();

        // The name format sorts by date, then sequence number.
        files.sort();

        let to_delete = files.len().saturating_sub(self.backup_copies as usize);
        for name in files.into_iter().take(to_delete) {
            utils::remove(&self.backups_dir.join(name)).await?;
        }
        Ok(())
    }

    async fn file_names(&self) -> Res<Vec<String>> {
        let mut names = Vec::new();
        let mut dir = utils::read_dir(&self.backups_dir).await?;
        while let Some(entry) = dir
            .next_entry()
            .await
            .context("Failed to read directory entry")?
        {
            names.push(entry.file_name().to_string_lossy().to_string());
        }
        Ok(names)
    }
}

fn today() -> String {
    Local::now().format("%Y-%m-%d").to_string()
}

/// Parses NNN out of `{prefix}.{date}-NNN.json`.
fn parse_sequence_number(filename: &str, prefix: &str, date: &str) -> Option<u32> {
    filename
        .strip_prefix(&format!("{prefix}.{date}-"))?
        .strip_suffix(".json")?
        .parse()
        .ok()
}

fn is_backup_file(filename: &str, prefix: &str) -> bool {
    filename.starts_with(&format!("{prefix}.")) && filename.ends_with(".json")
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn backup_in(dir: &TempDir, copies: u32) -> Backup {
        Backup {
            backups_dir: dir.path().to_path_buf(),
            backup_copies: copies,
        }
    }

    fn snapshot() -> Snapshot {
        Snapshot {
            run_id: "run-1".to_string(),
            spreadsheet_id: "abc".to_string(),
            taken_at: Utc::now(),
            ranges: vec![RangeSnapshot {
                range: "Summary!A1:E".parse().unwrap(),
                rows: vec![vec!["Period".to_string(), "Category".to_string()]],
            }],
        }
    }

    #[test]
    fn test_parse_sequence_number() {
        assert_eq!(
            parse_sequence_number("publish-pre.2025-12-14-001.json", "publish-pre", "2025-12-14"),
            Some(1)
        );
        assert_eq!(
            parse_sequence_number("publish-pre.2025-12-14-042.json", "publish-pre", "2025-12-14"),
            Some(42)
        );
        assert_eq!(
            parse_sequence_number("other.2025-12-14-001.json", "publish-pre", "2025-12-14"),
            None
        );
        assert_eq!(
            parse_sequence_number("publish-pre.2025-12-13-001.json", "publish-pre", "2025-12-14"),
            None
        );
        assert!(is_backup_file("publish-pre.2025-12-14-001.json", "publish-pre"));
        assert!(!is_backup_file("publish-pre.2025-12-14-001.txt", "publish-pre"));
    }

    #[tokio::test]
    async fn test_save_and_rotate() {
        let dir = TempDir::new().unwrap();
        let backup = backup_in(&dir, 2);
        let data = snapshot();

        let mut paths = Vec::new();
        for _ in 0..3 {
            paths.push(backup.save_json(PUBLISH_PRE, &data).await.unwrap().unwrap());
        }

        assert!(paths[2].to_string_lossy().ends_with("-003.json"));
        assert!(!paths[0].exists());
        assert!(paths[1].exists());
        assert!(paths[2].exists());

        let read: Snapshot = utils::deserialize(&paths[2]).await.unwrap();
        assert_eq!(read, data);
    }

    #[tokio::test]
    async fn test_disabled() {
        let dir = TempDir::new().unwrap();
        let backup = backup_in(&dir, 0);
        assert!(!backup.enabled());
        assert!(backup
            .save_json(PUBLISH_PRE, &snapshot())
            .await
            .unwrap()
            .is_none());
        assert!(backup.file_names().await.unwrap().is_empty());
    }
}
