use crate::commands::Out;
use crate::error::{ErrorType, IntoResult};
use crate::{Config, Result};
use anyhow::Context;
use std::path::Path;

/// Creates the data directory, its subdirectories and:
/// - Creates an initial `config.json` file using `sheet_url` along with default settings
/// - Moves `secret_file` into its default location in the data dir.
///
/// # Arguments
/// - `finsheet_home` - The directory that will be the root of data directory, e.g.
///   `$HOME/finsheet`
/// - `secret_file` - The downloaded OAuth 2.0 client credentials JSON needed to start the Google
///   OAuth workflow.
/// - `sheet_url` - The URL of the Google Sheet that holds the transactions, e.g.
///   https://docs.google.com/spreadsheets/d/1a7Km9FxQwRbPt82JvN4LzYpH5OcGnWsT6iDuE3VhMjX
///
/// # Errors
/// - Returns an error if any file operations fail.
pub async fn init(finsheet_home: &Path, secret_file: &Path, sheet_url: &str) -> Result<Out<()>> {
    let config = Config::create(finsheet_home, secret_file, sheet_url)
        .await
        .context("Unable to create the data directory and configs")
        .pub_result(ErrorType::Config)?;
    Ok(format!(
        "Created {}. Review the ranges in {} and then run 'finsheet auth'",
        config.root().display(),
        config.config_path().display()
    )
    .into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_init() {
        let dir = TempDir::new().unwrap();
        let secret = dir.path().join("client_secret.json");
        std::fs::write(
            &secret,
            r#"{"installed":{"client_id":"id","client_secret":"s","redirect_uris":["http://localhost"],"auth_uri":"https://accounts.google.com/o/oauth2/auth","token_uri":"https://oauth2.googleapis.com/token"}}"#,
        )
        .unwrap();
        let home = dir.path().join("home");

        let out = init(&home, &secret, "https://docs.google.com/spreadsheets/d/abc123/edit")
            .await
            .unwrap();
        assert!(out.message().contains("finsheet auth"));

        let config = crate::commands::load_config(&home).await.unwrap();
        assert_eq!(config.spreadsheet_id(), "abc123");
    }

    #[tokio::test]
    async fn test_init_missing_secret() {
        let dir = TempDir::new().unwrap();
        let err = init(
            &dir.path().join("home"),
            &dir.path().join("nope.json"),
            "https://docs.google.com/spreadsheets/d/abc123",
        )
        .await
        .unwrap_err();
        assert_eq!(err.exit_code(), 6);
    }
}
