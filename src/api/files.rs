//! Serialization and deserialization structures for Google OAuth credential files.
//! - `client_secret.json`: OAuth 2.0 client credentials from Google Cloud Console
//! - `token.json`: the tokens received at the end of the consent flow

use crate::api::OAUTH_SCOPES;
use crate::error::{tagged, ErrorType, Res};
use crate::utils;
use chrono::{DateTime, Utc};
use serde::de::Error;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::HashSet;
use std::path::Path;

/// This redirect needs to be present in the OAuth credential file, or else OAuth will not work.
const REDIRECT: &str = "http://localhost";

/// Represents the structure of the `client_secret.json` file downloaded from Google Cloud Console.
///
/// This file contains OAuth 2.0 Desktop Application credentials. The standard format from Google
/// has an "installed" wrapper around the actual credentials.
///
/// Example:
/// ```json
/// {
///   "installed": {
///     "client_id": "YOUR_CLIENT_ID.apps.googleusercontent.com",
///     "client_secret": "YOUR_CLIENT_SECRET",
///     "redirect_uris": ["http://localhost"],
///     "auth_uri": "https://accounts.google.com/o/oauth2/auth",
///     "token_uri": "https://oauth2.googleapis.com/token"
///   }
/// }
/// ```
#[derive(Default, Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub(crate) struct SecretFile {
    installed: InstalledCredentials,
}

impl SecretFile {
    /// Loads the OAuth client credentials. A missing or malformed file is an
    /// `ErrorType::AuthConfig` error.
    pub(crate) async fn load(path: &Path) -> Res<SecretFile> {
        if !path.is_file() {
            return Err(tagged(
                ErrorType::AuthConfig,
                format!(
                    "The OAuth client secret file is missing at '{}'. Download it from the \
                    Google Cloud Console and run 'finsheet init'",
                    path.display()
                ),
            ));
        }
        utils::deserialize(path).await.map_err(|e| {
            tagged(
                ErrorType::AuthConfig,
                format!("Unable to read the OAuth client secret file: {e:#}"),
            )
        })
    }

    pub(super) fn client_id(&self) -> &str {
        &self.installed.client_id
    }

    pub(super) fn client_secret(&self) -> &str {
        &self.installed.client_secret
    }

    pub(super) fn auth_uri(&self) -> &str {
        &self.installed.auth_uri
    }

    pub(super) fn token_uri(&self) -> &str {
        &self.installed.token_uri
    }

    #[cfg(test)]
    pub(crate) fn new(client_id: &str, client_secret: &str, token_uri: &str) -> Self {
        Self {
            installed: InstalledCredentials {
                client_id: client_id.to_string(),
                client_secret: client_secret.to_string(),
                redirect_uris: RedirectUris(vec![REDIRECT.to_string()]),
                auth_uri: "https://accounts.google.com/o/oauth2/auth".to_string(),
                token_uri: token_uri.to_string(),
            },
        }
    }
}

/// The actual OAuth credentials nested within the `client_secret.json` file.
#[derive(Default, Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
struct InstalledCredentials {
    client_id: String,
    client_secret: String,

    /// For this application, should contain "http://localhost" (without a port number)
    redirect_uris: RedirectUris,

    auth_uri: String,
    token_uri: String,
}

#[derive(Default, Debug, Clone)]
struct RedirectUris(Vec<String>);

impl Serialize for RedirectUris {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        self.0.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for RedirectUris {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let vec = Vec::<String>::deserialize(deserializer)?;
        if !vec.iter().any(|s| is_valid_redirect(s)) {
            return Err(D::Error::custom(format!(
                "At least one of the redirects needs to be {REDIRECT}, but this was not found. \
                When creating the redirect URI for your Google API Key, you must include \
                '{REDIRECT}'"
            )));
        }
        Ok(RedirectUris(vec))
    }
}

fn is_valid_redirect(s: &str) -> bool {
    s == REDIRECT || s == "http://127.0.0.1"
}

/// This is how we save the token information that we receive from Google OAuth.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub(super) struct TokenFile {
    pub(super) scopes: Vec<String>,
    pub(super) access_token: String,
    pub(super) refresh_token: String,
    pub(super) expires_at: DateTime<Utc>,
    #[serde(default)]
    pub(super) id_token: Option<String>,
}

impl TokenFile {
    /// Loads and validates `token.json`. Every failure here means the user needs to run
    /// `finsheet auth`, so all of them are `ErrorType::AuthConfig`.
    pub(super) async fn load(p: &Path) -> Res<Self> {
        if !p.is_file() {
            return Err(tagged(
                ErrorType::AuthConfig,
                format!(
                    "The OAuth token file is missing at '{}', run 'finsheet auth'",
                    p.display()
                ),
            ));
        }
        let token_file: Self = utils::deserialize(p).await.map_err(|e| {
            tagged(
                ErrorType::AuthConfig,
                format!("Unable to read the OAuth token file, run 'finsheet auth': {e:#}"),
            )
        })?;
        token_file.validate_scopes()?;
        if token_file.refresh_token.trim().is_empty() {
            return Err(tagged(
                ErrorType::AuthConfig,
                "The OAuth token file has no refresh token, run 'finsheet auth'",
            ));
        }
        Ok(token_file)
    }

    fn validate_scopes(&self) -> Res<()> {
        let found_scopes: HashSet<&str> = self.scopes.iter().map(|s| s.as_str()).collect();
        for &required_scope in OAUTH_SCOPES {
            if !found_scopes.contains(required_scope) {
                return Err(tagged(
                    ErrorType::AuthConfig,
                    format!("OAuth scope '{required_scope}' is missing, run 'finsheet auth'"),
                ));
            }
        }
        Ok(())
    }

    /// Writes the file, readable only by the current user.
    pub(super) async fn save(&self, p: &Path) -> Res<()> {
        let json = serde_json::to_string_pretty(self)?;
        utils::write_private(p, json).await
    }
}
