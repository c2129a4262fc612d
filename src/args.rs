//! These structs provide the CLI interface for the finsheet CLI.

use crate::analysis::Granularity;
use crate::pipeline::RunOptions;
use clap::{Parser, Subcommand};
use std::convert::Infallible;
use std::fmt::{Display, Formatter};
use std::ops::Deref;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::error;
use tracing_subscriber::filter::LevelFilter;

/// finsheet: summarize the transactions in a Google sheet and write the report back.
///
/// finsheet reads your transactions from a range in a Google sheet, cleans them up (dates,
/// amounts, category names), totals them by category and period and writes a summary, a set of
/// per-period metrics and optionally period-over-period changes and account totals back to other
/// ranges of the same sheet.
///
/// You will need to set up a Google Cloud OAuth client for this. Run 'finsheet init' with the
/// downloaded client secret, then 'finsheet auth', then 'finsheet run'.
#[derive(Debug, Parser, Clone)]
pub struct Args {
    #[clap(flatten)]
    common: Common,

    #[command(subcommand)]
    command: Command,
}

impl Args {
    pub fn new(common: Common, command: Command) -> Self {
        Self { common, command }
    }

    pub fn common(&self) -> &Common {
        &self.common
    }

    pub fn command(&self) -> &Command {
        &self.command
    }
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Create the data directory and initialize the configuration files.
    ///
    /// This is the first command you should run. You need two things ready beforehand:
    ///
    /// - The URL of the Google sheet that holds your transactions, passed as --sheet-url.
    ///
    /// - The OAuth client secret JSON downloaded from the Google Cloud console, passed as
    ///   --client-secret. The file is moved into the data directory.
    ///
    /// The data directory is --finsheet-home, which defaults to $HOME/finsheet.
    Init(InitArgs),
    /// Authenticate with Google Sheets via OAuth.
    Auth(AuthArgs),
    /// Read the transactions, compute the report and publish it to the sheet.
    Run(RunArgs),
}

/// Arguments common to all subcommands.
#[derive(Debug, Parser, Clone)]
pub struct Common {
    /// The logging verbosity. One of, from least to most verbose:
    /// off, error, warn, info, debug, trace
    ///
    /// This can be overridden by RUST_LOG.
    #[arg(long, default_value_t = LevelFilter::INFO)]
    log_level: LevelFilter,

    /// The directory where finsheet configuration, secrets and backups are held. Defaults to
    /// ~/finsheet
    #[arg(long, env = "FINSHEET_HOME", default_value_t = default_finsheet_home())]
    finsheet_home: DisplayPath,
}

impl Common {
    pub fn new(log_level: LevelFilter, finsheet_home: PathBuf) -> Self {
        Self {
            log_level,
            finsheet_home: finsheet_home.into(),
        }
    }

    pub fn log_level(&self) -> LevelFilter {
        self.log_level
    }

    pub fn finsheet_home(&self) -> &DisplayPath {
        &self.finsheet_home
    }
}

/// (Not shown): Args for the `finsheet init` command.
#[derive(Debug, Parser, Clone)]
pub struct InitArgs {
    /// The URL to your Google sheet. It looks like this:
    /// https://docs.google.com/spreadsheets/d/1a7Km9FxQwRbPt82JvN4LzYpH5OcGnWsT6iDuE3VhMjX
    #[arg(long)]
    sheet_url: String,

    /// The path to your downloaded OAuth client secret. This file will be moved to the default
    /// secrets location in the main data directory.
    #[arg(long)]
    client_secret: PathBuf,
}

impl InitArgs {
    pub fn new(sheet_url: impl Into<String>, client_secret: impl Into<PathBuf>) -> Self {
        Self {
            sheet_url: sheet_url.into(),
            client_secret: client_secret.into(),
        }
    }

    pub fn sheet_url(&self) -> &str {
        &self.sheet_url
    }

    pub fn client_secret(&self) -> &Path {
        &self.client_secret
    }
}

/// (Not shown): Args for the `finsheet auth` command.
#[derive(Debug, Parser, Clone)]
pub struct AuthArgs {
    /// Verify and refresh authentication without opening a browser.
    #[arg(long)]
    verify: bool,
}

impl AuthArgs {
    pub fn new(verify: bool) -> Self {
        Self { verify }
    }

    pub fn verify(&self) -> bool {
        self.verify
    }
}

/// (Not shown): Args for the `finsheet run` command.
#[derive(Debug, Parser, Clone)]
pub struct RunArgs {
    /// The period size to group by, overriding config.json. One of:
    /// day, week, month, quarter, year
    #[arg(long)]
    granularity: Option<Granularity>,

    /// Compute and print the report without backing up or writing anything to the sheet.
    #[arg(long)]
    dry_run: bool,
}

impl RunArgs {
    pub fn new(granularity: Option<Granularity>, dry_run: bool) -> Self {
        Self {
            granularity,
            dry_run,
        }
    }

    pub fn granularity(&self) -> Option<Granularity> {
        self.granularity
    }

    pub fn dry_run(&self) -> bool {
        self.dry_run
    }

    pub fn options(&self) -> RunOptions {
        RunOptions {
            granularity: self.granularity,
            dry_run: self.dry_run,
        }
    }
}

fn default_finsheet_home() -> DisplayPath {
    DisplayPath(match dirs::home_dir() {
        Some(home) => home.join("finsheet"),
        None => {
            error!(
                "There was an error when trying to get your home directory. You can get around \
                this by providing --finsheet-home or FINSHEET_HOME instead of relying on the \
                default finsheet home directory. If you continue using the program right now, you \
                may have problems!",
            );
            PathBuf::from("finsheet")
        }
    })
}

#[derive(Debug, Default, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct DisplayPath(PathBuf);

impl From<PathBuf> for DisplayPath {
    fn from(value: PathBuf) -> Self {
        DisplayPath(value)
    }
}

impl Deref for DisplayPath {
    type Target = Path;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl AsRef<Path> for DisplayPath {
    fn as_ref(&self) -> &Path {
        &self.0
    }
}

impl Display for DisplayPath {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0.to_string_lossy())
    }
}

impl FromStr for DisplayPath {
    type Err = Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(PathBuf::from(s)))
    }
}

impl DisplayPath {
    pub fn new(path: PathBuf) -> Self {
        Self(path)
    }

    pub fn path(&self) -> &Path {
        &self.0
    }
}
