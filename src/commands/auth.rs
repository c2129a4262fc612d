//! Authentication command handlers for OAuth flow.
//!
//! This module implements the CLI commands for:
//! - `finsheet auth` - Initial OAuth consent flow
//! - `finsheet auth --verify` - Verify and refresh authentication

use crate::api::{consent, CredentialStore, FileCredentialStore, TokenProvider};
use crate::commands::Out;
use crate::error::{ErrorType, IntoResult, Res};
use crate::{Config, Result};
use anyhow::Context;
use std::sync::Arc;

/// Handles the `finsheet auth` command - runs the OAuth consent flow
///
/// This is the ONLY command that opens a browser for OAuth authentication.
///
/// This guides the user through setting up Google Sheets authentication:
/// 1. Checks for client_secret.json
/// 2. Prints the consent URL and waits for the browser to come back to a local callback
/// 3. Saves tokens to token.json with the required scope
///
/// # Errors
/// Returns an error if the OAuth flow fails or if client_secret.json is missing
pub async fn auth(config: &Config) -> Result<Out<()>> {
    consent(&config.client_secret_path(), &config.token_path())
        .await
        .pub_result(ErrorType::AuthConfig)?;
    Ok("Authorization complete, you can now run 'finsheet run'".into())
}

/// Handles the `finsheet auth --verify` command - verifies authentication
///
/// This command NEVER opens a browser. It loads the cached tokens and refreshes the access token
/// to prove that the refresh token is still accepted.
///
/// # Errors
/// - `ErrorType::AuthConfig` if the secret or token file is missing or malformed.
/// - `ErrorType::AuthExpired` if Google rejects the refresh token.
pub async fn auth_verify(config: &Config) -> Result<Out<()>> {
    let store: Arc<dyn CredentialStore> = Arc::new(
        FileCredentialStore::new(config).pub_result(ErrorType::AuthConfig)?,
    );
    verify(store).await.pub_result(ErrorType::AuthConfig)?;
    Ok("Your OAuth token is valid!".into())
}

async fn verify(store: Arc<dyn CredentialStore>) -> Res<()> {
    let mut token_provider = TokenProvider::load(store).await.context(
        "Unable to use the existing tokens found in the token JSON file. \n\n\
        You should run 'finsheet auth' (without the --verify flag).",
    )?;
    token_provider
        .refresh()
        .await
        .context("Unable to refresh the token")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::error_type_of;
    use crate::test::{FakeCredentialStore, RefreshOutcome, TestEnv};
    use chrono::Duration;

    #[tokio::test]
    async fn test_verify_refreshes_once() {
        let store = Arc::new(FakeCredentialStore::new(
            "valid-token",
            Duration::hours(1),
            RefreshOutcome::Succeed,
        ));
        verify(store.clone()).await.unwrap();
        assert_eq!(store.refresh_count(), 1);
    }

    #[tokio::test]
    async fn test_verify_revoked() {
        let store = Arc::new(FakeCredentialStore::new(
            "valid-token",
            Duration::hours(1),
            RefreshOutcome::Revoked,
        ));
        let err = verify(store).await.unwrap_err();
        assert_eq!(error_type_of(&err), Some(ErrorType::AuthExpired));
    }

    #[tokio::test]
    async fn test_auth_verify_without_token() {
        let env = TestEnv::new().await;
        let err = auth_verify(&env.config()).await.unwrap_err();
        assert_eq!(err.error_type(), ErrorType::AuthConfig);
        assert_eq!(err.exit_code(), 2);
        assert!(err.to_string().contains("finsheet auth"));
    }
}
