//! The credential store: OAuth client credentials plus the access and refresh tokens, and the
//! logic to refresh an expired access token.

use crate::api::files::{SecretFile, TokenFile};
use crate::error::{tagged, ErrorType, Res};
use crate::Config;
use anyhow::Context;
use chrono::{DateTime, Duration, Utc};
use oauth2::basic::{BasicClient, BasicErrorResponseType};
use oauth2::{
    ClientId, ClientSecret, RefreshToken, RequestTokenError, StandardErrorResponse,
    TokenResponse, TokenUrl,
};
use std::fmt::{Debug, Formatter};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info};

/// Tokens that expire within this window are treated as already expired.
const EXPIRY_BUFFER_MINUTES: i64 = 5;

/// Everything needed to call the Sheets API and to refresh access when it runs out.
#[derive(Clone, Default)]
pub struct Credentials {
    pub client_id: String,
    pub client_secret: String,
    pub auth_uri: String,
    pub token_uri: String,
    pub scopes: Vec<String>,
    pub access_token: String,
    pub refresh_token: String,
    pub expires_at: DateTime<Utc>,
}

impl Credentials {
    /// True if the access token is expired or will expire within five minutes of `now`.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now + Duration::minutes(EXPIRY_BUFFER_MINUTES)
    }

    pub(super) fn from_files(secret: &SecretFile, token: TokenFile) -> Self {
        Self {
            client_id: secret.client_id().to_string(),
            client_secret: secret.client_secret().to_string(),
            auth_uri: secret.auth_uri().to_string(),
            token_uri: secret.token_uri().to_string(),
            scopes: token.scopes,
            access_token: token.access_token,
            refresh_token: token.refresh_token,
            expires_at: token.expires_at,
        }
    }

    fn to_token_file(&self) -> TokenFile {
        TokenFile {
            scopes: self.scopes.clone(),
            access_token: self.access_token.clone(),
            refresh_token: self.refresh_token.clone(),
            expires_at: self.expires_at,
            id_token: None,
        }
    }
}

/// Secrets never reach the logs, even at trace level.
impl Debug for Credentials {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("client_id", &self.client_id)
            .field("client_secret", &"<redacted>")
            .field("auth_uri", &self.auth_uri)
            .field("token_uri", &self.token_uri)
            .field("scopes", &self.scopes)
            .field("access_token", &"<redacted>")
            .field("refresh_token", &"<redacted>")
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

/// Loads credentials and refreshes the access token.
#[async_trait::async_trait]
pub trait CredentialStore: Send + Sync {
    /// Fails with `ErrorType::AuthConfig` when required secrets are absent or malformed.
    async fn load(&self) -> Res<Credentials>;

    /// Exchanges the refresh token for a new access token. Fails with `ErrorType::AuthExpired`
    /// when the refresh token itself has been rejected.
    async fn refresh(&self, credentials: &Credentials) -> Res<Credentials>;
}

/// The `CredentialStore` backed by `client_secret.json` and `token.json` in the home directory.
/// A refresh writes the new access token back to `token.json`.
#[derive(Debug, Clone)]
pub struct FileCredentialStore {
    client_secret_path: PathBuf,
    token_path: PathBuf,
    http: reqwest::Client,
}

impl FileCredentialStore {
    pub fn new(config: &Config) -> Res<Self> {
        Self::from_paths(config.client_secret_path(), config.token_path())
    }

    pub fn from_paths(client_secret_path: PathBuf, token_path: PathBuf) -> Res<Self> {
        Ok(Self {
            client_secret_path,
            token_path,
            http: oauth_http_client()?,
        })
    }
}

#[async_trait::async_trait]
impl CredentialStore for FileCredentialStore {
    async fn load(&self) -> Res<Credentials> {
        let secret = SecretFile::load(&self.client_secret_path).await?;
        let token = TokenFile::load(&self.token_path).await?;
        debug!("Loaded OAuth token, valid until {}", token.expires_at);
        Ok(Credentials::from_files(&secret, token))
    }

    async fn refresh(&self, credentials: &Credentials) -> Res<Credentials> {
        let token_url = TokenUrl::new(credentials.token_uri.clone()).map_err(|e| {
            tagged(
                ErrorType::AuthConfig,
                format!("Invalid token_uri in the client secret file: {e}"),
            )
        })?;
        let client = BasicClient::new(ClientId::new(credentials.client_id.clone()))
            .set_client_secret(ClientSecret::new(credentials.client_secret.clone()))
            .set_token_uri(token_url);

        let response = client
            .exchange_refresh_token(&RefreshToken::new(credentials.refresh_token.clone()))
            .request_async(&self.http)
            .await
            .map_err(classify_token_error)?;

        let mut refreshed = credentials.clone();
        refreshed.access_token = response.access_token().secret().to_string();
        refreshed.expires_at = Utc::now()
            + response
                .expires_in()
                .and_then(|d| Duration::from_std(d).ok())
                .unwrap_or_else(|| Duration::hours(1));
        // Google usually omits the refresh token on refresh, keep the one we have.
        if let Some(rt) = response.refresh_token() {
            refreshed.refresh_token = rt.secret().to_string();
        }

        refreshed
            .to_token_file()
            .save(&self.token_path)
            .await
            .context("Unable to save the refreshed token")?;
        info!("Refreshed the OAuth access token");
        Ok(refreshed)
    }
}

/// The HTTP client for OAuth endpoints, with redirects disabled.
pub(super) fn oauth_http_client() -> Res<reqwest::Client> {
    reqwest::Client::builder()
        .redirect(reqwest::redirect::Policy::none())
        .build()
        .map_err(|e| tagged(ErrorType::Internal, format!("Unable to build HTTP client: {e}")))
}

/// Maps an OAuth token endpoint failure onto an `ErrorType`.
pub(super) fn classify_token_error<RE>(
    e: RequestTokenError<RE, StandardErrorResponse<BasicErrorResponseType>>,
) -> anyhow::Error
where
    RE: std::error::Error + 'static,
{
    match e {
        RequestTokenError::ServerResponse(response) => {
            let error_type = match response.error() {
                BasicErrorResponseType::InvalidGrant => ErrorType::AuthExpired,
                BasicErrorResponseType::InvalidClient
                | BasicErrorResponseType::UnauthorizedClient
                | BasicErrorResponseType::InvalidScope => ErrorType::AuthConfig,
                _ => ErrorType::AuthExpired,
            };
            let hint = match error_type {
                ErrorType::AuthExpired => "the refresh token was rejected, run 'finsheet auth'",
                _ => "the OAuth client credentials were rejected, check client_secret.json",
            };
            tagged(
                error_type,
                format!("OAuth token request failed ({response}): {hint}"),
            )
        }
        RequestTokenError::Request(inner) => tagged(
            ErrorType::RemoteUnavailable,
            format!("Unable to reach the OAuth token endpoint: {inner}"),
        ),
        RequestTokenError::Parse(inner, _) => tagged(
            ErrorType::RemoteUnavailable,
            format!("Unexpected response from the OAuth token endpoint: {inner}"),
        ),
        RequestTokenError::Other(message) => tagged(ErrorType::Internal, message),
    }
}

/// Holds the current credentials and hands out a valid access token.
pub struct TokenProvider {
    store: Arc<dyn CredentialStore>,
    credentials: Credentials,
}

impl TokenProvider {
    /// Loads the credentials from `store`. Does not refresh.
    pub async fn load(store: Arc<dyn CredentialStore>) -> Res<Self> {
        let credentials = store.load().await?;
        Ok(Self { store, credentials })
    }

    /// The current access token, which may be expired.
    pub fn token(&self) -> &str {
        &self.credentials.access_token
    }

    /// Returns a valid access token, refreshing once first if it is expired or about to expire.
    pub async fn token_with_refresh(&mut self) -> Res<&str> {
        if self.credentials.is_expired(Utc::now()) {
            debug!("The access token is expired or about to expire, refreshing");
            self.refresh().await?;
        }
        Ok(self.token())
    }

    /// Refreshes unconditionally.
    pub async fn refresh(&mut self) -> Res<()> {
        self.credentials = self.store.refresh(&self.credentials).await?;
        Ok(())
    }
}

impl Debug for TokenProvider {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenProvider")
            .field("credentials", &self.credentials)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::OAUTH_SCOPES;
    use crate::error::error_type_of;
    use crate::test::{serve_once, FakeCredentialStore};
    use tempfile::TempDir;

    async fn file_store(dir: &TempDir, token_uri: &str, expires_at: &str) -> FileCredentialStore {
        let secret_path = dir.path().join("client_secret.json");
        let token_path = dir.path().join("token.json");
        let secret = SecretFile::new("client-id", "client-secret", token_uri);
        crate::utils::serialize(&secret_path, &secret).await.unwrap();
        let token = format!(
            r#"{{
                "scopes": ["{}"],
                "access_token": "old-access",
                "refresh_token": "the-refresh-token",
                "expires_at": "{expires_at}"
            }}"#,
            OAUTH_SCOPES[0]
        );
        crate::utils::write(&token_path, token).await.unwrap();
        FileCredentialStore::from_paths(secret_path, token_path).unwrap()
    }

    #[test]
    fn test_debug_redacts_secrets() {
        let credentials = Credentials {
            client_secret: "s3cret".to_string(),
            access_token: "ya29.token".to_string(),
            refresh_token: "1//refresh".to_string(),
            ..Credentials::default()
        };
        let debug = format!("{credentials:?}");
        assert!(!debug.contains("s3cret"));
        assert!(!debug.contains("ya29.token"));
        assert!(!debug.contains("1//refresh"));
        assert!(debug.contains("<redacted>"));
    }

    #[test]
    fn test_is_expired_uses_buffer() {
        let now = Utc::now();
        let mut credentials = Credentials {
            expires_at: now + Duration::minutes(4),
            ..Credentials::default()
        };
        assert!(credentials.is_expired(now));
        credentials.expires_at = now + Duration::minutes(10);
        assert!(!credentials.is_expired(now));
    }

    #[tokio::test]
    async fn test_token_with_refresh_refreshes_once() {
        let store = Arc::new(FakeCredentialStore::expired());
        let mut provider = TokenProvider::load(store.clone()).await.unwrap();
        assert_eq!(provider.token_with_refresh().await.unwrap(), "fresh-token-1");
        // Now valid, so no second refresh.
        assert_eq!(provider.token_with_refresh().await.unwrap(), "fresh-token-1");
        assert_eq!(store.refresh_count(), 1);
    }

    #[tokio::test]
    async fn test_valid_token_is_not_refreshed() {
        let store = Arc::new(FakeCredentialStore::valid());
        let mut provider = TokenProvider::load(store.clone()).await.unwrap();
        assert_eq!(provider.token_with_refresh().await.unwrap(), "valid-token");
        assert_eq!(store.refresh_count(), 0);
    }

    #[tokio::test]
    async fn test_file_store_refresh_persists_token() {
        let dir = TempDir::new().unwrap();
        let server = serve_once(
            200,
            r#"{"access_token":"new-access","token_type":"Bearer","expires_in":3600}"#,
        )
        .await;
        let store = file_store(&dir, &server.url("/token"), "2020-01-01T00:00:00Z").await;

        let credentials = store.load().await.unwrap();
        assert!(credentials.is_expired(Utc::now()));
        let refreshed = store.refresh(&credentials).await.unwrap();
        assert_eq!(refreshed.access_token, "new-access");
        assert_eq!(refreshed.refresh_token, "the-refresh-token");
        assert!(!refreshed.is_expired(Utc::now()));

        let request = server.request(0);
        assert!(request.contains("grant_type=refresh_token"));
        assert!(request.contains("refresh_token=the-refresh-token"));

        let reloaded = store.load().await.unwrap();
        assert_eq!(reloaded.access_token, "new-access");
    }

    #[tokio::test]
    async fn test_file_store_invalid_grant_is_auth_expired() {
        let dir = TempDir::new().unwrap();
        let server = serve_once(
            400,
            r#"{"error":"invalid_grant","error_description":"Token has been expired or revoked."}"#,
        )
        .await;
        let store = file_store(&dir, &server.url("/token"), "2020-01-01T00:00:00Z").await;

        let credentials = store.load().await.unwrap();
        let err = store.refresh(&credentials).await.unwrap_err();
        assert_eq!(error_type_of(&err), Some(ErrorType::AuthExpired));
        assert!(err.to_string().contains("finsheet auth"));

        // The token file is left alone.
        let reloaded = store.load().await.unwrap();
        assert_eq!(reloaded.access_token, "old-access");
    }

    #[tokio::test]
    async fn test_file_store_missing_token_is_auth_config() {
        let dir = TempDir::new().unwrap();
        let store = file_store(&dir, "http://127.0.0.1:9/token", "2020-01-01T00:00:00Z").await;
        crate::utils::remove(&dir.path().join("token.json"))
            .await
            .unwrap();
        let err = store.load().await.unwrap_err();
        assert_eq!(error_type_of(&err), Some(ErrorType::AuthConfig));
    }
}
