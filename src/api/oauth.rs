//! OAuth 2.0 consent flow for the Google Sheets API.
//!
//! This is the only place that needs a browser. It:
//! - Loads the OAuth client credentials from `client_secret.json`
//! - Starts a local loopback HTTP server to receive the callback
//! - Prints the Google consent URL for the user to open
//! - Exchanges the authorization code (with PKCE) for access and refresh tokens
//! - Saves the tokens to `token.json`

use crate::api::files::{SecretFile, TokenFile};
use crate::api::token::{classify_token_error, oauth_http_client, Credentials};
use crate::api::OAUTH_SCOPES;
use crate::error::{tagged, ErrorType, Res};
use anyhow::Context;
use chrono::{Duration, Utc};
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Request, Response, StatusCode, Uri};
use hyper_util::rt::TokioIo;
use oauth2::basic::BasicClient;
use oauth2::{
    AuthUrl, AuthorizationCode, ClientId, ClientSecret, CsrfToken, PkceCodeChallenge,
    RedirectUrl, Scope, TokenResponse, TokenUrl,
};
use std::convert::Infallible;
use std::path::Path;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tracing::{debug, info};

/// How long to wait for the user to finish in the browser.
const CONSENT_TIMEOUT_SECS: u64 = 300;

/// Runs the complete OAuth consent flow and writes `token_path`.
///
/// # Errors
/// - `ErrorType::AuthConfig` if `client_secret.json` is missing or invalid, or the user denies
///   access.
/// - `ErrorType::RemoteUnavailable` if the token endpoint cannot be reached.
pub(crate) async fn consent(client_secret_path: &Path, token_path: &Path) -> Res<Credentials> {
    info!("Starting OAuth consent flow");
    let secret = SecretFile::load(client_secret_path).await?;

    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .context("Unable to start the local OAuth callback server")?;
    let port = listener.local_addr()?.port();
    let redirect = format!("http://localhost:{port}");
    debug!("OAuth callback server listening on {redirect}");

    let auth_config = |what: &str, e: oauth2::url::ParseError| {
        tagged(
            ErrorType::AuthConfig,
            format!("Invalid {what} in the client secret file: {e}"),
        )
    };
    let client = BasicClient::new(ClientId::new(secret.client_id().to_string()))
        .set_client_secret(ClientSecret::new(secret.client_secret().to_string()))
        .set_auth_uri(
            AuthUrl::new(secret.auth_uri().to_string()).map_err(|e| auth_config("auth_uri", e))?,
        )
        .set_token_uri(
            TokenUrl::new(secret.token_uri().to_string())
                .map_err(|e| auth_config("token_uri", e))?,
        )
        .set_redirect_uri(RedirectUrl::new(redirect).map_err(|e| auth_config("redirect", e))?);

    let (pkce_challenge, pkce_verifier) = PkceCodeChallenge::new_random_sha256();
    let (auth_url, csrf_state) = client
        .authorize_url(CsrfToken::new_random)
        .add_scopes(OAUTH_SCOPES.iter().map(|s| Scope::new(s.to_string())))
        .add_extra_param("access_type", "offline")
        .add_extra_param("prompt", "consent")
        .set_pkce_challenge(pkce_challenge)
        .url();

    info!("Open this URL in your browser to authorize finsheet:\n\n{auth_url}\n");
    let code = wait_for_code(listener, csrf_state.secret().to_string()).await?;

    let http = oauth_http_client()?;
    let response = client
        .exchange_code(AuthorizationCode::new(code))
        .set_pkce_verifier(pkce_verifier)
        .request_async(&http)
        .await
        .map_err(classify_token_error)?;

    let refresh_token = response
        .refresh_token()
        .map(|rt| rt.secret().to_string())
        .ok_or_else(|| {
            tagged(
                ErrorType::AuthConfig,
                "Google did not return a refresh token, remove finsheet's access at \
                https://myaccount.google.com/permissions and run 'finsheet auth' again",
            )
        })?;
    let expires_in = response
        .expires_in()
        .and_then(|d| Duration::from_std(d).ok())
        .unwrap_or_else(|| Duration::hours(1));
    let token = TokenFile {
        scopes: OAUTH_SCOPES.iter().map(|s| s.to_string()).collect(),
        access_token: response.access_token().secret().to_string(),
        refresh_token,
        expires_at: Utc::now() + expires_in,
        id_token: None,
    };
    token.save(token_path).await?;
    info!("Authorization successful, tokens saved to {}", token_path.display());

    Ok(Credentials::from_files(&secret, token))
}

/// Serves the loopback callback until the browser delivers the authorization code or an error.
async fn wait_for_code(listener: TcpListener, state: String) -> Res<String> {
    let (tx, mut rx) = mpsc::channel::<Res<String>>(1);

    let server = tokio::spawn(async move {
        loop {
            let (stream, _) = match listener.accept().await {
                Ok(accepted) => accepted,
                Err(e) => {
                    debug!("Failed to accept a callback connection: {e}");
                    continue;
                }
            };
            let io = TokioIo::new(stream);
            let tx = tx.clone();
            let state = state.clone();
            tokio::spawn(async move {
                let service = service_fn(move |req: Request<Incoming>| {
                    let tx = tx.clone();
                    let outcome = parse_callback(req.uri(), &state);
                    async move { Ok::<_, Infallible>(callback_response(outcome, &tx).await) }
                });
                if let Err(e) = http1::Builder::new()
                    .keep_alive(false)
                    .serve_connection(io, service)
                    .await
                {
                    debug!("Callback connection error: {e}");
                }
            });
        }
    });

    let timeout = std::time::Duration::from_secs(CONSENT_TIMEOUT_SECS);
    let received = tokio::time::timeout(timeout, rx.recv()).await;
    server.abort();
    match received {
        Ok(Some(outcome)) => outcome,
        Ok(None) => Err(tagged(
            ErrorType::Internal,
            "The OAuth callback server stopped unexpectedly",
        )),
        Err(_) => Err(tagged(
            ErrorType::AuthConfig,
            format!("Timed out after {CONSENT_TIMEOUT_SECS}s waiting for the OAuth callback"),
        )),
    }
}

async fn callback_response(
    outcome: Option<Res<String>>,
    tx: &mpsc::Sender<Res<String>>,
) -> Response<String> {
    let (status, body) = match &outcome {
        Some(Ok(_)) => (
            StatusCode::OK,
            "finsheet is authorized. You can close this tab.".to_string(),
        ),
        Some(Err(e)) => (StatusCode::BAD_REQUEST, format!("Authorization failed: {e}")),
        None => (StatusCode::NOT_FOUND, "Not found".to_string()),
    };
    if let Some(outcome) = outcome {
        let _ = tx.send(outcome).await;
    }
    let mut response = Response::new(body);
    *response.status_mut() = status;
    response
}

/// Reads the OAuth redirect. Returns `None` for requests that are not the callback (e.g.
/// `/favicon.ico`), otherwise the authorization code or the reason there is none.
fn parse_callback(uri: &Uri, expected_state: &str) -> Option<Res<String>> {
    if uri.path() != "/" {
        return None;
    }
    let query = uri.query()?;
    let mut code = None;
    let mut state = None;
    let mut error = None;
    for (key, value) in url::form_urlencoded::parse(query.as_bytes()) {
        match key.as_ref() {
            "code" => code = Some(value.to_string()),
            "state" => state = Some(value.to_string()),
            "error" => error = Some(value.to_string()),
            _ => {}
        }
    }

    if let Some(error) = error {
        return Some(Err(tagged(
            ErrorType::AuthConfig,
            format!("Authorization was not granted: {error}"),
        )));
    }
    let code = code?;
    if state.as_deref() != Some(expected_state) {
        return Some(Err(tagged(
            ErrorType::AuthConfig,
            "The OAuth callback state does not match, try 'finsheet auth' again",
        )));
    }
    Some(Ok(code))
}
