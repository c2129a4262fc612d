//! Configuration file handling for finsheet.
//!
//! The configuration file is stored at `$FINSHEET_HOME/config.json` and contains the spreadsheet
//! URL, the ranges to read and write, the category mapping table, parsing settings, the retry
//! policy and authentication file paths.

use crate::analysis::Granularity;
use crate::api::RetryPolicy;
use crate::backup::Backup;
use crate::error::{tagged, ErrorType, Res};
use crate::model::{default_rules, A1Range, CategoryMap, CategoryRule, DEFAULT_CURRENCY_SYMBOLS};
use crate::transform::{
    owned, CleanOptions, DEFAULT_DATE_FORMATS, DEFAULT_EXCLUDED_CATEGORIES,
};
use crate::utils;
use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::debug;

const APP_NAME: &str = "finsheet";
const CONFIG_VERSION: u8 = 1;
const BACKUP_COPIES: u32 = 5;
const SECRETS: &str = ".secrets";
const BACKUPS: &str = ".backups";
const CLIENT_SECRET_JSON: &str = "client_secret.json";
const TOKEN_JSON: &str = "token.json";
const CONFIG_JSON: &str = "config.json";

/// The `Config` object represents the configuration of the app. You instantiate it by providing
/// the path to `$FINSHEET_HOME` and from there it loads `$FINSHEET_HOME/config.json`. It provides
/// paths to other items that are either configurable or are expected in a certain location within
/// the home directory.
#[derive(Debug, Clone)]
pub struct Config {
    root: PathBuf,
    backups: PathBuf,
    secrets: PathBuf,
    config_path: PathBuf,
    config_file: ConfigFile,
    spreadsheet_id: String,
    category_map: CategoryMap,
}

impl Config {
    /// Creates the data directory, its subdirectories and:
    /// - Creates an initial `config.json` file using `sheet_url` along with default settings
    /// - Moves `secret_file` into its default location in the data dir.
    ///
    /// # Arguments
    /// - `dir` - The directory that will be the root of data directory, e.g. `$HOME/finsheet`
    /// - `secret_file` - The downloaded OAuth 2.0 client credentials JSON needed to start the Google
    ///   OAuth workflow. This will be moved from the `secret_file` path to its default location and
    ///   name in the data directory.
    /// - `sheet_url` - The URL (or bare id) of the Google Sheet holding the transactions.
    ///
    /// # Errors
    /// - Returns an error if any file operations fail or the URL has no spreadsheet id.
    pub async fn create(
        dir: impl Into<PathBuf>,
        secret_file: &Path,
        sheet_url: &str,
    ) -> Res<Self> {
        let spreadsheet_id = extract_spreadsheet_id(sheet_url)?.to_string();

        let maybe_relative = dir.into();
        utils::make_dir(&maybe_relative)
            .await
            .context("Unable to create the finsheet home directory")?;
        let root = utils::canonicalize(&maybe_relative).await?;

        let backups_dir = root.join(BACKUPS);
        utils::make_dir(&backups_dir).await?;
        let secrets_dir = root.join(SECRETS);
        utils::make_dir(&secrets_dir).await?;

        let secret_destination = secrets_dir.join(CLIENT_SECRET_JSON);
        utils::rename(secret_file, secret_destination).await?;
        let config_path = root.join(CONFIG_JSON);

        let config_file = ConfigFile::new(sheet_url);
        config_file.save(&config_path).await?;

        let category_map = CategoryMap::new(&config_file.categories)?;
        Ok(Self {
            root,
            backups: backups_dir,
            secrets: secrets_dir,
            config_path,
            config_file,
            spreadsheet_id,
            category_map,
        })
    }

    /// This will
    /// - validate that `finsheet_home` exists and that the config file exists
    /// - load and validate the config file
    /// - validate that the backups and secrets directories exist
    /// - return the loaded configuration object
    pub async fn load(finsheet_home: impl Into<PathBuf>) -> Res<Self> {
        let maybe_relative = finsheet_home.into();
        let root = utils::canonicalize(&maybe_relative)
            .await
            .map_err(|e| config_error(e, "The finsheet home directory is missing"))?;

        let config_path = root.join(CONFIG_JSON);
        if !config_path.is_file() {
            return Err(tagged(
                ErrorType::Config,
                format!(
                    "The config file is missing '{}', run 'finsheet init'",
                    config_path.display()
                ),
            ));
        }
        let config_file = ConfigFile::load(&config_path).await?;
        let spreadsheet_id = extract_spreadsheet_id(&config_file.sheet_url)?.to_string();
        let category_map = CategoryMap::new(&config_file.categories)
            .context("Invalid 'categories' in the config file")?;

        let config = Self {
            root: root.clone(),
            backups: root.join(BACKUPS),
            secrets: root.join(SECRETS),
            config_path,
            config_file,
            spreadsheet_id,
            category_map,
        };
        for dir in [&config.backups, &config.secrets] {
            if !dir.is_dir() {
                return Err(tagged(
                    ErrorType::Config,
                    format!("The directory is missing '{}'", dir.display()),
                ));
            }
        }
        debug!("Loaded config from {}", config.config_path.display());
        Ok(config)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn config_path(&self) -> &Path {
        &self.config_path
    }

    pub fn backups(&self) -> &Path {
        &self.backups
    }

    #[cfg(test)]
    pub(crate) fn secrets(&self) -> &Path {
        &self.secrets
    }

    #[cfg(test)]
    pub(crate) fn sheet_url(&self) -> &str {
        &self.config_file.sheet_url
    }

    pub fn spreadsheet_id(&self) -> &str {
        &self.spreadsheet_id
    }

    pub fn backup_copies(&self) -> u32 {
        self.config_file.backup_copies
    }

    /// Creates a new `Backup` instance for managing backup files.
    pub fn backup(&self) -> Backup {
        Backup::new(self)
    }

    pub fn ranges(&self) -> &Ranges {
        &self.config_file.ranges
    }

    pub fn category_map(&self) -> &CategoryMap {
        &self.category_map
    }

    pub fn granularity(&self) -> Granularity {
        self.config_file.granularity
    }

    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.config_file.retry
    }

    /// Overrides the Sheets API host (scheme and authority, no trailing `/`). `None` means the
    /// client's default Google host.
    pub fn api_base(&self) -> Option<&str> {
        self.config_file
            .api_base
            .as_deref()
            .map(|base| base.trim_end_matches('/'))
    }

    /// The settings that the transform stage needs.
    pub fn clean_options(&self) -> CleanOptions {
        CleanOptions {
            categories: self.category_map.clone(),
            excluded_categories: self.config_file.excluded_categories.clone(),
            date_formats: self.config_file.date_formats.clone(),
            currency_symbols: self.config_file.currency_symbols.clone(),
        }
    }

    /// Returns the stored `client_secret_path` if it is absolute, otherwise resolves the relative path.
    pub fn client_secret_path(&self) -> PathBuf {
        self.resolve_secrets_file_path(self.config_file.client_secret_path())
    }

    /// Returns the stored `token_path` if it is absolute, otherwise resolves the relative path.
    pub fn token_path(&self) -> PathBuf {
        self.resolve_secrets_file_path(self.config_file.token_path())
    }

    fn resolve_secrets_file_path(&self, p: PathBuf) -> PathBuf {
        if p.is_absolute() {
            return p;
        }
        self.root.join(p)
    }

    #[cfg(test)]
    pub(crate) fn set_api_base(&mut self, base: impl Into<String>) {
        self.config_file.api_base = Some(base.into());
    }

    #[cfg(test)]
    pub(crate) fn set_retry_policy(&mut self, retry: RetryPolicy) {
        self.config_file.retry = retry;
    }

    #[cfg(test)]
    pub(crate) fn set_backup_copies(&mut self, copies: u32) {
        self.config_file.backup_copies = copies;
    }
}

/// The ranges that are read from and written to. Only `transactions` is read; the rest are
/// overwritten on every run.
#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq)]
pub struct Ranges {
    pub transactions: A1Range,
    pub summary: A1Range,
    pub metrics: A1Range,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deltas: Option<A1Range>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub accounts: Option<A1Range>,
}

impl Default for Ranges {
    fn default() -> Self {
        Self {
            transactions: A1Range::columns("Transactions", 0, 25),
            summary: A1Range::columns("Summary", 0, 4),
            metrics: A1Range::columns("Metrics", 0, 8),
            deltas: None,
            accounts: None,
        }
    }
}

impl Ranges {
    /// The report targets with a label for each, in publish order.
    pub fn targets(&self) -> Vec<(&'static str, &A1Range)> {
        let mut targets = vec![("summary", &self.summary), ("metrics", &self.metrics)];
        if let Some(deltas) = &self.deltas {
            targets.push(("deltas", deltas));
        }
        if let Some(accounts) = &self.accounts {
            targets.push(("accounts", accounts));
        }
        targets
    }

    /// Report targets must not overlap the transactions or each other, otherwise a publish would
    /// destroy input data or its own output.
    fn validate(&self) -> Res<()> {
        let targets = self.targets();
        for (ix, (name, range)) in targets.iter().enumerate() {
            if range.overlaps(&self.transactions) {
                return Err(tagged(
                    ErrorType::Config,
                    format!("The {name} range {range} overlaps the transactions range"),
                ));
            }
            for (other_name, other) in targets.iter().skip(ix + 1) {
                if range.overlaps(other) {
                    return Err(tagged(
                        ErrorType::Config,
                        format!("The {name} range {range} overlaps the {other_name} range {other}"),
                    ));
                }
            }
        }
        Ok(())
    }
}

/// Represents the serialization and deserialization format of the configuration file. Everything
/// except `app_name`, `config_version` and `sheet_url` has a default.
///
/// Example configuration:
/// ```json
/// {
///   "app_name": "finsheet",
///   "config_version": 1,
///   "sheet_url": "https://docs.google.com/spreadsheets/d/7KpXm2RfZwNJgs84QhVYno5DU6iM9Wlr3bCzAv1txRpL",
///   "backup_copies": 5,
///   "ranges": {
///     "transactions": "Transactions!A1:Z",
///     "summary": "Summary!A1:E",
///     "metrics": "Metrics!A1:I"
///   },
///   "granularity": "month",
///   "excluded_categories": ["Exclude", "Starting Balance"]
/// }
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq)]
struct ConfigFile {
    /// Application name, should always be "finsheet"
    app_name: String,

    config_version: u8,

    /// URL to the Google Sheet
    sheet_url: String,

    /// Number of pre-publish snapshots to keep, 0 disables them
    #[serde(default = "default_backup_copies")]
    backup_copies: u32,

    #[serde(default)]
    ranges: Ranges,

    #[serde(default = "default_rules")]
    categories: Vec<CategoryRule>,

    /// Rows in these categories are dropped before analysis. Matching ignores case.
    #[serde(default = "default_excluded_categories")]
    excluded_categories: Vec<String>,

    /// `chrono` format strings, tried in order
    #[serde(default = "default_date_formats")]
    date_formats: Vec<String>,

    #[serde(default = "default_currency_symbols")]
    currency_symbols: Vec<String>,

    #[serde(default)]
    granularity: Granularity,

    #[serde(default)]
    retry: RetryPolicy,

    /// Path to the OAuth 2.0 client credentials file (optional, relative to config.json or absolute)
    /// Defaults to $FINSHEET_HOME/.secrets/client_secret.json if not specified
    #[serde(default, skip_serializing_if = "Option::is_none")]
    client_secret_path: Option<PathBuf>,

    /// Path to the OAuth token file (optional, relative to config.json or absolute)
    /// Defaults to $FINSHEET_HOME/.secrets/token.json if not specified
    #[serde(default, skip_serializing_if = "Option::is_none")]
    token_path: Option<PathBuf>,

    /// Overrides the Sheets API host, e.g. `http://127.0.0.1:8080`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    api_base: Option<String>,
}

fn default_backup_copies() -> u32 {
    BACKUP_COPIES
}

fn default_excluded_categories() -> Vec<String> {
    owned(DEFAULT_EXCLUDED_CATEGORIES)
}

fn default_date_formats() -> Vec<String> {
    owned(DEFAULT_DATE_FORMATS)
}

fn default_currency_symbols() -> Vec<String> {
    owned(DEFAULT_CURRENCY_SYMBOLS)
}

impl ConfigFile {
    fn new(sheet_url: impl Into<String>) -> Self {
        Self {
            app_name: APP_NAME.to_string(),
            config_version: CONFIG_VERSION,
            sheet_url: sheet_url.into(),
            backup_copies: BACKUP_COPIES,
            ranges: Ranges::default(),
            categories: default_rules(),
            excluded_categories: default_excluded_categories(),
            date_formats: default_date_formats(),
            currency_symbols: default_currency_symbols(),
            granularity: Granularity::default(),
            retry: RetryPolicy::default(),
            client_secret_path: None,
            token_path: None,
            api_base: None,
        }
    }

    /// Loads and validates a ConfigFile from the specified path.
    async fn load(path: impl AsRef<Path>) -> Res<Self> {
        let path = path.as_ref();
        let content = utils::read(path).await?;
        let config: ConfigFile = serde_json::from_str(&content).map_err(|e| {
            tagged(
                ErrorType::Config,
                format!("Failed to parse config file at {}: {e}", path.display()),
            )
        })?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Res<()> {
        if self.app_name != APP_NAME {
            return Err(tagged(
                ErrorType::Config,
                format!(
                    "Invalid app_name in config file: expected '{APP_NAME}', got '{}'",
                    self.app_name
                ),
            ));
        }
        if self.config_version != CONFIG_VERSION {
            return Err(tagged(
                ErrorType::Config,
                format!(
                    "Unsupported config_version {}, expected {CONFIG_VERSION}",
                    self.config_version
                ),
            ));
        }
        if self.date_formats.is_empty() {
            return Err(tagged(ErrorType::Config, "'date_formats' is empty"));
        }
        self.retry.validate()?;
        self.ranges.validate()
    }

    async fn save(&self, path: impl AsRef<Path>) -> Res<()> {
        utils::serialize(path.as_ref(), self)
            .await
            .context("Unable to write config file")
    }

    /// Relative to the home directory unless absolute.
    fn client_secret_path(&self) -> PathBuf {
        self.client_secret_path
            .clone()
            .unwrap_or_else(|| PathBuf::from(SECRETS).join(CLIENT_SECRET_JSON))
    }

    fn token_path(&self) -> PathBuf {
        self.token_path
            .clone()
            .unwrap_or_else(|| PathBuf::from(SECRETS).join(TOKEN_JSON))
    }
}

fn config_error(e: anyhow::Error, message: &str) -> anyhow::Error {
    tagged(ErrorType::Config, format!("{message}: {e:#}"))
}

/// Extracts the spreadsheet ID from a Google Sheets URL such as
/// `https://docs.google.com/spreadsheets/d/SPREADSHEET_ID/edit#gid=0`. A value without any `/` is
/// taken to be the id itself.
fn extract_spreadsheet_id(url: &str) -> Res<&str> {
    let url = url.trim();
    if url.is_empty() {
        return Err(tagged(ErrorType::Config, "The sheet URL is empty"));
    }
    if !url.contains('/') {
        return Ok(url);
    }

    let parts: Vec<&str> = url.split('/').collect();
    for (i, part) in parts.iter().enumerate() {
        if *part == "d" && i + 1 < parts.len() {
            let id_part = parts[i + 1];
            let id = id_part
                .split(['?', '#'])
                .next()
                .unwrap_or(id_part);
            if !id.is_empty() {
                return Ok(id);
            }
        }
    }
    Err(tagged(
        ErrorType::Config,
        format!(
            "Invalid Google Sheets URL '{url}'. Expected: https://docs.google.com/spreadsheets/d/SPREADSHEET_ID"
        ),
    ))
}
