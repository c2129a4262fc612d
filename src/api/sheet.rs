//! Implements the `Sheet` trait using the `sheets::Client` to interact with a Google sheet.

use crate::api::{RetryPolicy, Sheet, TokenProvider};
use crate::error::{tagged, ErrorType, Res};
use crate::model::A1Range;
use crate::Config;
use rust_decimal::Decimal;
use sheets::types::{
    BatchClearValuesRequest, BatchUpdateValuesRequest, DateTimeRenderOption, Dimension,
    ValueInputOption, ValueRange, ValueRenderOption,
};
use sheets::ClientError;
use std::str::FromStr;
use tracing::{debug, trace};

/// Implements the `Sheet` trait using the `sheets::Client`. It takes a `TokenProvider`, which
/// keeps the bearer token fresh, and wraps every call in the configured `RetryPolicy`.
#[derive(Debug)]
pub(crate) struct GoogleSheet {
    host: Option<String>,
    retry: RetryPolicy,
    token_provider: TokenProvider,
}

impl GoogleSheet {
    /// Makes sure a valid access token is available before any request is made, so a revoked
    /// refresh token fails here with `ErrorType::AuthExpired`.
    pub(crate) async fn new(config: &Config, mut token_provider: TokenProvider) -> Res<Self> {
        token_provider.token_with_refresh().await?;
        Ok(Self {
            host: config.api_base().map(|s| s.to_string()),
            retry: config.retry_policy().clone(),
            token_provider,
        })
    }

    /// Creates a sheets client with an access token that is good for at least a few more
    /// minutes, which outlasts any sequence of retries.
    async fn client(&mut self) -> Res<sheets::Client> {
        let access_token = self.token_provider.token_with_refresh().await?.to_string();
        // The sheets crate wants the OAuth client settings too, but only the access token is used
        // for API calls. Refreshing is the TokenProvider's job.
        let mut client = sheets::Client::new(
            String::new(),
            String::new(),
            String::new(),
            access_token,
            String::new(),
        );
        if let Some(host) = &self.host {
            client.with_host_override(host);
        }
        Ok(client)
    }
}

#[async_trait::async_trait]
impl Sheet for GoogleSheet {
    async fn read(&mut self, spreadsheet_id: &str, range: &A1Range) -> Res<Vec<Vec<String>>> {
        trace!("read {range}");
        let client = self.client().await?;
        let (client, a1) = (&client, range.to_string());
        let a1 = a1.as_str();

        let response = self
            .retry
            .run(&format!("Reading {range}"), move || async move {
                client
                    .spreadsheets()
                    .values_get(
                        spreadsheet_id,
                        a1,
                        DateTimeRenderOption::FormattedString,
                        Dimension::Rows,
                        ValueRenderOption::FormattedValue,
                    )
                    .await
                    .map_err(map_client_error)
            })
            .await?;
        let rows = response.body.values;
        debug!("Read {} rows from {range}", rows.len());
        Ok(rows)
    }

    async fn write(
        &mut self,
        spreadsheet_id: &str,
        range: &A1Range,
        rows: &[Vec<String>],
    ) -> Res<()> {
        trace!("write {range}");
        let client = self.client().await?;
        let request = BatchUpdateValuesRequest {
            data: vec![ValueRange {
                major_dimension: Some(Dimension::Rows),
                range: range.to_string(),
                values: rows
                    .iter()
                    .map(|row| row.iter().map(|cell| user_entered(cell)).collect())
                    .collect(),
            }],
            include_values_in_response: Some(false),
            response_date_time_render_option: None,
            response_value_render_option: None,
            value_input_option: Some(ValueInputOption::UserEntered),
        };
        let (client, request) = (&client, &request);

        self.retry
            .run(&format!("Writing {range}"), move || async move {
                client
                    .spreadsheets()
                    .values_batch_update(spreadsheet_id, request)
                    .await
                    .map_err(map_client_error)
            })
            .await?;
        debug!("Wrote {} rows to {range}", rows.len());
        Ok(())
    }

    async fn clear(&mut self, spreadsheet_id: &str, range: &A1Range) -> Res<()> {
        trace!("clear {range}");
        let client = self.client().await?;
        let request = BatchClearValuesRequest {
            ranges: vec![range.to_string()],
        };
        let (client, request) = (&client, &request);

        self.retry
            .run(&format!("Clearing {range}"), move || async move {
                client
                    .spreadsheets()
                    .values_batch_clear(spreadsheet_id, request)
                    .await
                    .map_err(map_client_error)
            })
            .await?;
        debug!("Cleared {range}");
        Ok(())
    }
}

/// Writes go through `USER_ENTERED` so that totals land as numbers. Everything that is not a
/// plain number gets a leading apostrophe, which Sheets strips and which keeps labels like
/// `2024-01` from turning into dates and text like `=SUM(...)` from running as a formula.
fn user_entered(cell: &str) -> String {
    if cell.is_empty() || Decimal::from_str(cell).is_ok() {
        cell.to_string()
    } else {
        format!("'{cell}")
    }
}

/// Classifies a non-success HTTP status.
fn status_class(status: u16) -> ErrorType {
    match status {
        401 => ErrorType::AuthExpired,
        403 | 404 => ErrorType::Permission,
        400 => ErrorType::Config,
        408 | 429 => ErrorType::RemoteUnavailable,
        s if s >= 500 => ErrorType::RemoteUnavailable,
        _ => ErrorType::Internal,
    }
}

/// Tags a `sheets` client error with the `ErrorType` its cause maps to. Anything that prevented
/// a response (connection refused, reset) is transient.
fn map_client_error(e: ClientError) -> anyhow::Error {
    let error_type = match &e {
        ClientError::HttpError { status, .. } => status_class(status.as_u16()),
        ClientError::ReqwestError(_) | ClientError::ReqwestMiddleWareError(_) => {
            ErrorType::RemoteUnavailable
        }
        ClientError::SerdeJsonError(_) | ClientError::FromUtf8Error(_) => {
            ErrorType::RemoteUnavailable
        }
        _ => ErrorType::Internal,
    };
    let hint = match error_type {
        ErrorType::AuthExpired => ", run 'finsheet auth'",
        ErrorType::Permission => ", check that the authorized account can open the spreadsheet",
        _ => "",
    };
    tagged(error_type, format!("Sheets API call failed: {e}{hint}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::CredentialStore;
    use crate::error::error_type_of;
    use crate::test::{closed_port_url, hang, serve, serve_once, FakeCredentialStore, TestEnv};
    use std::sync::Arc;

    const VALUES: &str = r#"{
        "range": "Transactions!A1:E3",
        "majorDimension": "ROWS",
        "values": [
            ["2024-01-05", "-42.50", "Groceries", "Market"],
            [],
            ["2024-01-07", "12", "Coffee"]
        ]
    }"#;

    fn retry(max_attempts: u32, timeout_secs: u64) -> RetryPolicy {
        RetryPolicy {
            max_attempts,
            initial_backoff_ms: 1,
            max_backoff_ms: 2,
            timeout_secs,
        }
    }

    async fn google_sheet(
        env: &mut TestEnv,
        host: String,
        store: Arc<dyn CredentialStore>,
        policy: RetryPolicy,
    ) -> Res<GoogleSheet> {
        env.config_mut().set_api_base(host);
        env.config_mut().set_retry_policy(policy);
        let provider = TokenProvider::load(store).await?;
        GoogleSheet::new(&env.config(), provider).await
    }

    fn range(s: &str) -> A1Range {
        s.parse().unwrap()
    }

    #[test]
    fn test_status_class() {
        assert_eq!(status_class(401), ErrorType::AuthExpired);
        assert_eq!(status_class(403), ErrorType::Permission);
        assert_eq!(status_class(404), ErrorType::Permission);
        assert_eq!(status_class(400), ErrorType::Config);
        assert_eq!(status_class(429), ErrorType::RemoteUnavailable);
        assert_eq!(status_class(503), ErrorType::RemoteUnavailable);
        assert_eq!(status_class(409), ErrorType::Internal);
    }

    #[test]
    fn test_user_entered_quotes_text() {
        assert_eq!(user_entered("-477.37"), "-477.37");
        assert_eq!(user_entered("0.2500"), "0.2500");
        assert_eq!(user_entered(""), "");
        assert_eq!(user_entered("2024-01"), "'2024-01");
        assert_eq!(user_entered("2024-01-05"), "'2024-01-05");
        assert_eq!(user_entered("=SUM(A1:A9)"), "'=SUM(A1:A9)");
        assert_eq!(user_entered("Groceries"), "'Groceries");
    }

    #[tokio::test]
    async fn test_read_values() {
        let mut env = TestEnv::new().await;
        let server = serve_once(200, VALUES).await;
        let store = Arc::new(FakeCredentialStore::valid());
        let mut sheet = google_sheet(&mut env, server.url(""), store, retry(1, 5))
            .await
            .unwrap();

        let rows = sheet
            .read("sheet-id", &range("Transactions!A1:E"))
            .await
            .unwrap();
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[0][1], "-42.50");
        assert!(rows[1].is_empty());
        assert_eq!(rows[2], vec!["2024-01-07", "12", "Coffee"]);

        let request = server.request(0);
        assert!(request.starts_with("GET /v4/spreadsheets/sheet-id/values/"));
        assert!(request.contains("majorDimension=ROWS"));
        assert!(request
            .to_lowercase()
            .contains("authorization: bearer valid-token"));
    }

    #[tokio::test]
    async fn test_expired_token_refreshed_once_before_read() {
        let mut env = TestEnv::new().await;
        let server = serve_once(200, VALUES).await;
        let store = Arc::new(FakeCredentialStore::expired());
        let mut sheet = google_sheet(&mut env, server.url(""), store.clone(), retry(1, 5))
            .await
            .unwrap();

        sheet
            .read("sheet-id", &range("Transactions!A1:E"))
            .await
            .unwrap();
        assert_eq!(store.refresh_count(), 1);
        assert!(server
            .request(0)
            .to_lowercase()
            .contains("authorization: bearer fresh-token-1"));
    }

    #[tokio::test]
    async fn test_revoked_refresh_token_fails_before_any_request() {
        let mut env = TestEnv::new().await;
        let server = serve_once(200, VALUES).await;
        let store = Arc::new(FakeCredentialStore::revoked());

        let err = google_sheet(&mut env, server.url(""), store.clone(), retry(3, 5))
            .await
            .unwrap_err();
        assert_eq!(error_type_of(&err), Some(ErrorType::AuthExpired));
        assert_eq!(store.refresh_count(), 1);
        assert!(server.requests().is_empty());
    }

    #[tokio::test]
    async fn test_403_is_not_retried() {
        let mut env = TestEnv::new().await;
        let server = serve(vec![
            (
                403,
                r#"{"error":{"message":"The caller does not have permission"}}"#.to_string(),
            ),
            (200, VALUES.to_string()),
        ])
        .await;
        let store = Arc::new(FakeCredentialStore::valid());
        let mut sheet = google_sheet(&mut env, server.url(""), store, retry(3, 5))
            .await
            .unwrap();

        let err = sheet
            .read("sheet-id", &range("Transactions!A1:E"))
            .await
            .unwrap_err();
        assert_eq!(error_type_of(&err), Some(ErrorType::Permission));
        assert!(err.to_string().contains("after 1 attempt(s)"));
        assert_eq!(server.requests().len(), 1);
    }

    #[tokio::test]
    async fn test_hung_server_times_out_on_every_attempt() {
        let mut env = TestEnv::new().await;
        let server = hang().await;
        let store = Arc::new(FakeCredentialStore::valid());
        let mut sheet = google_sheet(&mut env, server.url(), store, retry(2, 1))
            .await
            .unwrap();

        let err = sheet
            .read("sheet-id", &range("Transactions!A1:E"))
            .await
            .unwrap_err();
        assert_eq!(error_type_of(&err), Some(ErrorType::RemoteUnavailable));
        assert!(err.to_string().contains("after 2 attempt(s)"));
        assert!(format!("{err:#}").contains("timed out after 1s"));
        assert_eq!(server.connections(), 2);

        let rows = vec![vec!["Period".to_string()]];
        let err = sheet
            .write("sheet-id", &range("Summary!A1:E"), &rows)
            .await
            .unwrap_err();
        assert_eq!(error_type_of(&err), Some(ErrorType::RemoteUnavailable));
        assert!(err.to_string().contains("Writing Summary!A1:E failed after 2 attempt(s)"));
    }

    #[tokio::test]
    async fn test_refused_connection_is_retried() {
        let mut env = TestEnv::new().await;
        let store = Arc::new(FakeCredentialStore::valid());
        let mut sheet = google_sheet(&mut env, closed_port_url().await, store, retry(2, 1))
            .await
            .unwrap();

        let err = sheet
            .read("sheet-id", &range("Transactions!A1:E"))
            .await
            .unwrap_err();
        assert_eq!(error_type_of(&err), Some(ErrorType::RemoteUnavailable));
        assert!(err.to_string().contains("after 2 attempt(s)"));
    }

    #[tokio::test]
    async fn test_write_and_clear_requests() {
        let mut env = TestEnv::new().await;
        let server = serve(vec![(200, "{}".to_string()), (200, "{}".to_string())]).await;
        let store = Arc::new(FakeCredentialStore::valid());
        let mut sheet = google_sheet(&mut env, server.url(""), store, retry(1, 5))
            .await
            .unwrap();
        let target = range("'Money Summary'!A1:E");

        sheet.clear("sheet-id", &target).await.unwrap();
        let rows = vec![vec!["2024-01".to_string(), "-42.50".to_string()]];
        sheet.write("sheet-id", &target, &rows).await.unwrap();

        let clear = server.request(0);
        assert!(clear.starts_with("POST /v4/spreadsheets/sheet-id/values:batchClear"));
        assert!(clear.contains("Money Summary"));
        let write = server.request(1);
        assert!(write.starts_with("POST /v4/spreadsheets/sheet-id/values:batchUpdate"));
        assert!(write.contains(r#""USER_ENTERED""#));
        assert!(write.contains(r#"[["'2024-01","-42.50"]]"#));
    }
}
