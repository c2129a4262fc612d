//! The Credential Store and the Sheet Client: everything that talks to Google.

mod files;
mod oauth;
mod retry;
mod sheet;
mod sheet_test_client;
mod token;

use crate::error::Res;
use crate::model::A1Range;
use crate::Config;
use std::sync::Arc;
use tracing::debug;

pub use retry::RetryPolicy;
pub use sheet_test_client::{TestSheet, TestSheetState, SEED_TABS};
pub use token::{CredentialStore, Credentials, FileCredentialStore, TokenProvider};

pub(crate) use oauth::consent;
pub(crate) use sheet::GoogleSheet;

/// The only scope finsheet asks for: read and write access to spreadsheets.
pub(crate) const OAUTH_SCOPES: &[&str] = &["https://www.googleapis.com/auth/spreadsheets"];

/// Set this environment variable to anything non-empty to use the in-memory `TestSheet` instead
/// of Google Sheets.
pub const TEST_MODE_ENV: &str = "FINSHEET_IN_TEST_MODE";

/// Authenticated access to cell values of a spreadsheet.
///
/// Ranges are A1 ranges and rows are ordered lists of cell values rendered as text. Implementations
/// classify failures with an `ErrorType` so callers can tell transient faults from fatal ones.
#[async_trait::async_trait]
pub trait Sheet: Send {
    /// Reads the formatted values in `range`. Trailing empty cells and rows are omitted.
    async fn read(&mut self, spreadsheet_id: &str, range: &A1Range) -> Res<Vec<Vec<String>>>;

    /// Writes `rows` starting at the top-left of `range`. Writing the same rows twice leaves the
    /// same cells.
    async fn write(&mut self, spreadsheet_id: &str, range: &A1Range, rows: &[Vec<String>])
        -> Res<()>;

    /// Empties every cell in `range`.
    async fn clear(&mut self, spreadsheet_id: &str, range: &A1Range) -> Res<()>;
}

/// Whether to talk to Google or to the in-memory test sheet.
#[derive(Debug, Default, Clone, Copy, Eq, PartialEq)]
pub enum Mode {
    #[default]
    Google,
    Test,
}

impl Mode {
    pub fn from_env() -> Self {
        match std::env::var(TEST_MODE_ENV) {
            Ok(value) if !value.is_empty() => Mode::Test,
            _ => Mode::Google,
        }
    }
}

/// Creates the `Sheet` for `mode`. For `Mode::Google` this loads the credentials and makes sure
/// the access token is valid, refreshing it if needed.
pub async fn sheet(config: &Config, mode: Mode) -> Res<Box<dyn Sheet>> {
    match mode {
        Mode::Google => {
            let store: Arc<dyn CredentialStore> = Arc::new(FileCredentialStore::new(config)?);
            let token_provider = TokenProvider::load(store).await?;
            Ok(Box::new(GoogleSheet::new(config, token_provider).await?))
        }
        Mode::Test => {
            debug!("Using the in-memory test sheet");
            Ok(Box::new(TestSheet::new()))
        }
    }
}
