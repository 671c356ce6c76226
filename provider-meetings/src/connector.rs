//! Meeting provider API connector implementation
//!
//! Implements the `RecordingProvider` trait over the provider's REST API.

use async_trait::async_trait;
use bridge_traits::error::Result;
use bridge_traits::http::{HttpClient, HttpMethod, HttpRequest, HttpResponse, RetryPolicy};
use bridge_traits::storage::{Recording, RecordingProvider};
use core_runtime::config::ProviderSettings;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

use crate::error::ProviderError;
use crate::types::parse_page;

/// Attempts per API call before a transient failure is reported
const MAX_ATTEMPTS: u32 = 3;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Endpoint layout of the provider API.
#[derive(Debug, Clone)]
pub struct ConnectorConfig {
    /// Base URL without trailing slash, e.g. `https://api.zoom.us/v2`
    pub api_base_url: String,
    /// Substituted into `{tenant}` placeholders
    pub tenant_id: Option<String>,
    /// Listing path, may contain `{tenant}`
    pub list_path: String,
    /// Deletion path, must contain `{id}`, may contain `{tenant}`
    pub delete_path: String,
    pub page_size: u32,
    /// Upper bound on pages followed in one listing
    pub max_pages: u32,
}

impl From<&ProviderSettings> for ConnectorConfig {
    fn from(settings: &ProviderSettings) -> Self {
        Self {
            api_base_url: settings.api_base_url.clone(),
            tenant_id: settings.tenant_id.clone(),
            list_path: settings.list_path.clone(),
            delete_path: settings.delete_path.clone(),
            page_size: settings.page_size,
            max_pages: settings.max_pages,
        }
    }
}

/// Meeting provider API connector
///
/// # Features
///
/// - Bounded pagination through `next_page_token`
/// - Field-name tolerant page parsing (see [`crate::types`])
/// - Exponential backoff for 429 and 5xx responses
/// - Source deletion, treating an already-missing recording as deleted
///
/// # Example
///
/// ```ignore
/// use provider_meetings::{ConnectorConfig, MeetingRecordingsConnector};
/// use bridge_traits::storage::RecordingProvider;
///
/// let connector = MeetingRecordingsConnector::new(http_client, config);
/// let recordings = connector.list_recordings(token.secret()).await?;
/// ```
pub struct MeetingRecordingsConnector {
    http_client: Arc<dyn HttpClient>,
    config: ConnectorConfig,
}

impl MeetingRecordingsConnector {
    pub fn new(http_client: Arc<dyn HttpClient>, config: ConnectorConfig) -> Self {
        Self {
            http_client,
            config,
        }
    }

    fn expand_path(&self, template: &str) -> String {
        let tenant = self.config.tenant_id.as_deref().unwrap_or_default();
        template.replace("{tenant}", &urlencoding::encode(tenant))
    }

    fn list_url(&self, page_token: Option<&str>) -> String {
        let path = self.expand_path(&self.config.list_path);
        let separator = if path.contains('?') { '&' } else { '?' };
        let mut url = format!(
            "{}{}{}page_size={}",
            self.config.api_base_url, path, separator, self.config.page_size
        );
        if let Some(token) = page_token {
            url.push_str(&format!("&next_page_token={}", urlencoding::encode(token)));
        }
        url
    }

    fn delete_url(&self, recording_id: &str) -> String {
        let path = self
            .expand_path(&self.config.delete_path)
            .replace("{id}", &urlencoding::encode(recording_id));
        format!("{}{}", self.config.api_base_url, path)
    }

    fn backoff(attempt: u32) -> Duration {
        Duration::from_millis(100u64 * 2u64.pow(attempt))
    }

    /// Execute an API request with retry logic
    ///
    /// Retries 429/5xx responses and transport failures with exponential
    /// backoff. Any other non-2xx status is returned as an error immediately.
    #[instrument(skip(self, request, access_token), fields(method = ?request.method))]
    async fn execute_with_retry(
        &self,
        request: HttpRequest,
        access_token: &str,
    ) -> std::result::Result<HttpResponse, ProviderError> {
        let mut attempt = 0;

        loop {
            let attempt_request = request
                .clone()
                .bearer_token(access_token)
                .header("Accept", "application/json")
                .timeout(REQUEST_TIMEOUT);

            match self
                .http_client
                .execute_with_retry(attempt_request, RetryPolicy::none())
                .await
            {
                Ok(response) if response.is_success() => {
                    debug!(status = response.status, "API request succeeded");
                    return Ok(response);
                }
                Ok(response) => {
                    let status = response.status;
                    let retryable = status == 429 || response.is_server_error();
                    attempt += 1;

                    if !retryable || attempt >= MAX_ATTEMPTS {
                        let message = String::from_utf8_lossy(&response.body)
                            .chars()
                            .take(300)
                            .collect::<String>();
                        warn!(status, attempt, "API request failed");
                        return Err(if status == 401 || status == 403 {
                            ProviderError::Unauthorized {
                                status_code: status,
                                message,
                            }
                        } else {
                            ProviderError::ApiError {
                                status_code: status,
                                message,
                            }
                        });
                    }

                    let delay = Self::backoff(attempt);
                    warn!(
                        status,
                        attempt,
                        max_attempts = MAX_ATTEMPTS,
                        delay_ms = delay.as_millis() as u64,
                        "API request failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(e) => {
                    attempt += 1;
                    if attempt >= MAX_ATTEMPTS {
                        warn!(error = %e, attempt, "API request failed");
                        return Err(e.into());
                    }

                    let delay = Self::backoff(attempt);
                    warn!(
                        error = %e,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        "API request failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }
}

#[async_trait]
impl RecordingProvider for MeetingRecordingsConnector {
    #[instrument(skip(self, access_token))]
    async fn list_recordings(&self, access_token: &str) -> Result<Vec<Recording>> {
        let mut recordings = Vec::new();
        let mut page_token: Option<String> = None;
        let mut pages = 0;

        loop {
            let url = self.list_url(page_token.as_deref());
            let response = self
                .execute_with_retry(HttpRequest::new(HttpMethod::Get, url), access_token)
                .await?;

            let page = parse_page(&response.body)?;
            pages += 1;

            if page.skipped_items > 0 {
                warn!(
                    skipped = page.skipped_items,
                    "Ignoring listing items without an identifier"
                );
            }
            debug!(page = pages, count = page.recordings.len(), "Fetched recordings page");
            recordings.extend(page.recordings);

            match page.next_page_token {
                Some(token) if pages < self.config.max_pages => page_token = Some(token),
                Some(_) => {
                    debug!(pages, "Page limit reached, remaining pages left for later runs");
                    break;
                }
                None => break,
            }
        }

        info!(count = recordings.len(), pages, "Listed recordings");
        Ok(recordings)
    }

    #[instrument(skip(self, access_token), fields(recording_id = %recording_id))]
    async fn delete_recording(&self, access_token: &str, recording_id: &str) -> Result<()> {
        let request = HttpRequest::new(HttpMethod::Delete, self.delete_url(recording_id));

        match self.execute_with_retry(request, access_token).await {
            Ok(_) => {
                info!("Deleted source recording");
                Ok(())
            }
            Err(ProviderError::ApiError {
                status_code: 404, ..
            }) => {
                debug!("Source recording already gone");
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bridge_traits::error::BridgeError;
    use bridge_traits::storage::{DynAsyncRead, ReadinessState};
    use bytes::Bytes;
    use mockall::mock;
    use std::collections::HashMap;

    mock! {
        HttpClient {}

        #[async_trait]
        impl HttpClient for HttpClient {
            async fn execute(&self, request: HttpRequest) -> Result<HttpResponse>;
            async fn download_stream(&self, request: HttpRequest) -> Result<Box<DynAsyncRead>>;
        }
    }

    fn config() -> ConnectorConfig {
        ConnectorConfig {
            api_base_url: "https://api.example.com/v2".to_string(),
            tenant_id: Some("acme".to_string()),
            list_path: "/accounts/{tenant}/recordings".to_string(),
            delete_path: "/accounts/{tenant}/recordings/{id}".to_string(),
            page_size: 300,
            max_pages: 1,
        }
    }

    fn json_response(status: u16, body: &str) -> HttpResponse {
        HttpResponse {
            status,
            headers: HashMap::new(),
            body: Bytes::from(body.to_string()),
        }
    }

    #[tokio::test]
    async fn test_list_recordings_success() {
        let mut mock_http = MockHttpClient::new();

        mock_http
            .expect_execute()
            .withf(|req| {
                req.method == HttpMethod::Get
                    && req.url == "https://api.example.com/v2/accounts/acme/recordings?page_size=300"
                    && req.headers.get("Authorization").map(String::as_str)
                        == Some("Bearer token-1")
            })
            .times(1)
            .returning(|_| {
                Ok(json_response(
                    200,
                    r#"{
                        "recordings": [
                            {"id": "m1", "status": "ready", "download_url": "https://media.example.com/m1.mp4"},
                            {"id": "m2", "status": "processing", "download_url": null}
                        ],
                        "next_page_token": "more"
                    }"#,
                ))
            });

        let connector = MeetingRecordingsConnector::new(Arc::new(mock_http), config());
        let recordings = connector.list_recordings("token-1").await.unwrap();

        assert_eq!(recordings.len(), 2);
        assert_eq!(recordings[0].id, "m1");
        assert!(recordings[0].readiness.is_ready());
        assert_eq!(recordings[1].readiness, ReadinessState::Pending);
        assert!(recordings[1].download_url.is_none());
    }

    #[tokio::test]
    async fn test_list_follows_pages_up_to_limit() {
        let mut mock_http = MockHttpClient::new();
        let mut seq = mockall::Sequence::new();

        mock_http
            .expect_execute()
            .withf(|req| !req.url.contains("next_page_token"))
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| {
                Ok(json_response(
                    200,
                    r#"{"recordings": [{"id": "a", "status": "ready"}], "next_page_token": "p2"}"#,
                ))
            });
        mock_http
            .expect_execute()
            .withf(|req| req.url.ends_with("&next_page_token=p2"))
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| {
                Ok(json_response(
                    200,
                    r#"{"recordings": [{"id": "b", "status": "ready"}], "next_page_token": "p3"}"#,
                ))
            });

        let connector = MeetingRecordingsConnector::new(
            Arc::new(mock_http),
            ConnectorConfig {
                max_pages: 2,
                ..config()
            },
        );
        let recordings = connector.list_recordings("t").await.unwrap();
        let ids: Vec<_> = recordings.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b"]);
    }

    #[tokio::test]
    async fn test_malformed_page_is_error() {
        let mut mock_http = MockHttpClient::new();
        mock_http
            .expect_execute()
            .times(1)
            .returning(|_| Ok(json_response(200, r#"{"error": "account suspended"}"#)));

        let connector = MeetingRecordingsConnector::new(Arc::new(mock_http), config());
        let err = connector.list_recordings("t").await.unwrap_err();
        assert!(err.to_string().contains("account suspended"));
    }

    #[tokio::test]
    async fn test_unauthorized_is_not_retried() {
        let mut mock_http = MockHttpClient::new();
        mock_http
            .expect_execute()
            .times(1)
            .returning(|_| Ok(json_response(401, r#"{"code":124,"message":"Invalid access token."}"#)));

        let connector = MeetingRecordingsConnector::new(Arc::new(mock_http), config());
        let err = connector.list_recordings("t").await.unwrap_err();
        assert_eq!(err.status(), Some(401));
    }

    #[tokio::test]
    async fn test_server_errors_are_retried() {
        let mut mock_http = MockHttpClient::new();
        let mut seq = mockall::Sequence::new();
        mock_http
            .expect_execute()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(json_response(503, "unavailable")));
        mock_http
            .expect_execute()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(json_response(200, r#"{"recordings": []}"#)));

        let connector = MeetingRecordingsConnector::new(Arc::new(mock_http), config());
        assert!(connector.list_recordings("t").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_transport_errors_exhaust_attempts() {
        let mut mock_http = MockHttpClient::new();
        mock_http
            .expect_execute()
            .times(MAX_ATTEMPTS as usize)
            .returning(|_| Err(BridgeError::OperationFailed("Connection failed".into())));

        let connector = MeetingRecordingsConnector::new(Arc::new(mock_http), config());
        assert!(connector.list_recordings("t").await.is_err());
    }

    #[tokio::test]
    async fn test_delete_recording_encodes_id() {
        let mut mock_http = MockHttpClient::new();
        mock_http
            .expect_execute()
            .withf(|req| {
                req.method == HttpMethod::Delete
                    && req.url == "https://api.example.com/v2/accounts/acme/recordings/a%2Fb%3D%3D"
            })
            .times(1)
            .returning(|_| Ok(json_response(204, "")));

        let connector = MeetingRecordingsConnector::new(Arc::new(mock_http), config());
        connector.delete_recording("t", "a/b==").await.unwrap();
    }

    #[tokio::test]
    async fn test_delete_missing_recording_is_ok() {
        let mut mock_http = MockHttpClient::new();
        mock_http
            .expect_execute()
            .times(1)
            .returning(|_| Ok(json_response(404, "not found")));

        let connector = MeetingRecordingsConnector::new(Arc::new(mock_http), config());
        assert!(connector.delete_recording("t", "gone").await.is_ok());
    }

    #[tokio::test]
    async fn test_delete_forbidden_is_error() {
        let mut mock_http = MockHttpClient::new();
        mock_http
            .expect_execute()
            .times(1)
            .returning(|_| Ok(json_response(403, "scope missing")));

        let connector = MeetingRecordingsConnector::new(Arc::new(mock_http), config());
        let err = connector.delete_recording("t", "m1").await.unwrap_err();
        assert_eq!(err.status(), Some(403));
    }
}
