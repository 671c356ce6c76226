//! # OAuth 2.0 Refresh Grant
//!
//! This module implements the `refresh_token` grant of RFC 6749 §6 against a
//! single token endpoint.
//!
//! ## Overview
//!
//! [`OAuthRefreshProvider`] posts the stored refresh credential to the token
//! endpoint and returns the access token from the response. The call is made
//! exactly once per [`CredentialProvider::acquire_token`] invocation with a
//! no-retry policy; transient failures surface to the caller unchanged.
//!
//! When the endpoint rotates the refresh credential, the new value replaces
//! the old one for subsequent calls. Rotation lives in memory only, so a
//! process restart falls back to the configured credential.
//!
//! ## Example
//!
//! ```no_run
//! use core_auth::{ClientAuthMethod, CredentialProvider, OAuthRefreshConfig, OAuthRefreshProvider};
//! use std::sync::Arc;
//!
//! # async fn example(http: Arc<dyn bridge_traits::http::HttpClient>) -> core_auth::Result<()> {
//! let config = OAuthRefreshConfig {
//!     token_url: "https://auth.example.com/oauth/token".to_string(),
//!     client_id: "client".to_string(),
//!     client_secret: "secret".to_string(),
//!     refresh_token: "refresh".to_string(),
//!     client_auth: ClientAuthMethod::Basic,
//! };
//! let provider = OAuthRefreshProvider::new(config, http);
//! let token = provider.acquire_token().await?;
//! # Ok(())
//! # }
//! ```

use crate::error::{AuthError, Result};
use crate::types::{AccessToken, TokenErrorResponse, TokenResponse};
use async_trait::async_trait;
use base64::Engine;
use bridge_traits::http::{HttpClient, HttpMethod, HttpRequest, RetryPolicy};
use bytes::Bytes;
use core_runtime::config::{ClientAuthMethod, OAuthSettings};
use std::fmt;
use std::sync::{Arc, Mutex};
use tracing::{debug, info, instrument, warn};

/// Source of access tokens for one sync run.
#[async_trait]
pub trait CredentialProvider: Send + Sync {
    /// Exchange the refresh credential for a fresh access token.
    ///
    /// # Errors
    ///
    /// Returns an [`AuthError`] when the exchange cannot complete or the
    /// endpoint refuses it. Implementations do not retry.
    async fn acquire_token(&self) -> Result<AccessToken>;
}

/// Token endpoint and client credentials.
#[derive(Clone)]
pub struct OAuthRefreshConfig {
    pub token_url: String,
    pub client_id: String,
    pub client_secret: String,
    pub refresh_token: String,
    pub client_auth: ClientAuthMethod,
}

impl fmt::Debug for OAuthRefreshConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OAuthRefreshConfig")
            .field("token_url", &self.token_url)
            .field("client_id", &self.client_id)
            .field("client_auth", &self.client_auth)
            .finish_non_exhaustive()
    }
}

impl From<&OAuthSettings> for OAuthRefreshConfig {
    fn from(settings: &OAuthSettings) -> Self {
        Self {
            token_url: settings.token_url.clone(),
            client_id: settings.client_id.clone(),
            client_secret: settings.client_secret.clone(),
            refresh_token: settings.refresh_token.clone(),
            client_auth: settings.client_auth,
        }
    }
}

/// Credential provider backed by the OAuth 2.0 refresh grant.
pub struct OAuthRefreshProvider {
    config: OAuthRefreshConfig,
    http_client: Arc<dyn HttpClient>,
    /// Latest refresh credential, updated when the endpoint rotates it
    refresh_token: Mutex<String>,
}

impl OAuthRefreshProvider {
    pub fn new(config: OAuthRefreshConfig, http_client: Arc<dyn HttpClient>) -> Self {
        let refresh_token = Mutex::new(config.refresh_token.clone());
        Self {
            config,
            http_client,
            refresh_token,
        }
    }

    fn current_refresh_token(&self) -> String {
        self.refresh_token
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    fn adopt_rotated_refresh_token(&self, rotated: String) {
        let mut current = self
            .refresh_token
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if *current != rotated {
            *current = rotated;
            info!("Token endpoint rotated the refresh credential");
        }
    }

    fn build_request(&self, refresh_token: &str) -> Result<HttpRequest> {
        let mut params = vec![
            ("grant_type", "refresh_token"),
            ("refresh_token", refresh_token),
        ];
        if self.config.client_auth == ClientAuthMethod::Body {
            params.push(("client_id", self.config.client_id.as_str()));
            params.push(("client_secret", self.config.client_secret.as_str()));
        }

        let encoded_body = serde_urlencoded::to_string(&params)
            .map_err(|e| AuthError::Encoding(e.to_string()))?;

        let mut request = HttpRequest::new(HttpMethod::Post, self.config.token_url.clone())
            .header("Content-Type", "application/x-www-form-urlencoded")
            .header("Accept", "application/json")
            .body(Bytes::from(encoded_body));

        if self.config.client_auth == ClientAuthMethod::Basic {
            let credentials = base64::engine::general_purpose::STANDARD.encode(format!(
                "{}:{}",
                self.config.client_id, self.config.client_secret
            ));
            request = request.header("Authorization", format!("Basic {}", credentials));
        }

        Ok(request)
    }
}

#[async_trait]
impl CredentialProvider for OAuthRefreshProvider {
    #[instrument(skip(self), fields(token_url = %self.config.token_url))]
    async fn acquire_token(&self) -> Result<AccessToken> {
        let refresh_token = self.current_refresh_token();
        let request = self.build_request(&refresh_token)?;

        debug!("Refreshing access token");

        let response = self
            .http_client
            .execute_with_retry(request, RetryPolicy::none())
            .await
            .map_err(|e| AuthError::Network(e.to_string()))?;

        // An explicit `error` field wins over the status code.
        if let Ok(error_body) = serde_json::from_slice::<TokenErrorResponse>(&response.body) {
            if let Some(code) = error_body.code() {
                warn!(status = response.status, error = %code, "Token endpoint rejected refresh");
                return Err(AuthError::Rejected {
                    error: code,
                    description: error_body.description(),
                });
            }
        }

        if !response.is_success() {
            let body = response.text().unwrap_or_default();
            let snippet: String = body.chars().take(200).collect();
            warn!(status = response.status, "Token refresh failed");
            return Err(AuthError::TokenRefreshFailed(format!(
                "Token endpoint returned {}: {}",
                response.status, snippet
            )));
        }

        let token_response: TokenResponse = response
            .json()
            .map_err(|e| AuthError::MalformedResponse(e.to_string()))?;

        let access_token = token_response
            .access_token
            .filter(|token| !token.is_empty())
            .ok_or_else(|| {
                AuthError::MalformedResponse("response has no access_token".to_string())
            })?;

        if let Some(rotated) = token_response.refresh_token.filter(|t| !t.is_empty()) {
            self.adopt_rotated_refresh_token(rotated);
        }

        info!(expires_in = ?token_response.expires_in, "Acquired access token");
        Ok(AccessToken::new(access_token))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bridge_traits::error::{BridgeError, Result as BridgeResult};
    use bridge_traits::http::HttpResponse;
    use bridge_traits::storage::DynAsyncRead;
    use mockall::mock;
    use std::collections::HashMap;

    mock! {
        HttpClient {}

        #[async_trait]
        impl HttpClient for HttpClient {
            async fn execute(&self, request: HttpRequest) -> BridgeResult<HttpResponse>;
            async fn download_stream(&self, request: HttpRequest) -> BridgeResult<Box<DynAsyncRead>>;
        }
    }

    fn config(client_auth: ClientAuthMethod) -> OAuthRefreshConfig {
        OAuthRefreshConfig {
            token_url: "https://auth.example.com/oauth/token".to_string(),
            client_id: "client".to_string(),
            client_secret: "secret".to_string(),
            refresh_token: "refresh-1".to_string(),
            client_auth,
        }
    }

    fn response(status: u16, body: &str) -> HttpResponse {
        HttpResponse {
            status,
            headers: HashMap::new(),
            body: Bytes::from(body.to_string()),
        }
    }

    fn body_of(request: &HttpRequest) -> String {
        String::from_utf8(request.body.clone().unwrap_or_default().to_vec()).unwrap()
    }

    #[tokio::test]
    async fn test_acquire_token_with_body_credentials() {
        let mut http = MockHttpClient::new();
        http.expect_execute()
            .withf(|req| {
                let body = body_of(req);
                req.method == HttpMethod::Post
                    && req.url == "https://auth.example.com/oauth/token"
                    && body.contains("grant_type=refresh_token")
                    && body.contains("refresh_token=refresh-1")
                    && body.contains("client_secret=secret")
                    && !req.headers.contains_key("Authorization")
            })
            .times(1)
            .returning(|_| Ok(response(200, r#"{"access_token":"at-1","expires_in":3600}"#)));

        let provider = OAuthRefreshProvider::new(config(ClientAuthMethod::Body), Arc::new(http));
        let token = provider.acquire_token().await.unwrap();
        assert_eq!(token.secret(), "at-1");
    }

    #[tokio::test]
    async fn test_basic_auth_keeps_secret_out_of_body() {
        let mut http = MockHttpClient::new();
        http.expect_execute()
            .withf(|req| {
                // base64("client:secret")
                req.headers.get("Authorization").map(String::as_str)
                    == Some("Basic Y2xpZW50OnNlY3JldA==")
                    && !body_of(req).contains("client_secret")
            })
            .times(1)
            .returning(|_| Ok(response(200, r#"{"access_token":"at-2"}"#)));

        let provider = OAuthRefreshProvider::new(config(ClientAuthMethod::Basic), Arc::new(http));
        assert_eq!(provider.acquire_token().await.unwrap().secret(), "at-2");
    }

    #[tokio::test]
    async fn test_error_payload_is_rejected_even_with_200() {
        let mut http = MockHttpClient::new();
        http.expect_execute().times(1).returning(|_| {
            Ok(response(
                200,
                r#"{"error":"invalid_grant","error_description":"refresh token expired"}"#,
            ))
        });

        let provider = OAuthRefreshProvider::new(config(ClientAuthMethod::Body), Arc::new(http));
        let err = provider.acquire_token().await.unwrap_err();

        match &err {
            AuthError::Rejected { error, description } => {
                assert_eq!(error, "invalid_grant");
                assert_eq!(description.as_deref(), Some("refresh token expired"));
            }
            other => panic!("unexpected error: {:?}", other),
        }
        assert!(err.to_string().contains("invalid_grant"));
        assert!(err.to_string().contains("refresh token expired"));
    }

    #[tokio::test]
    async fn test_non_success_without_error_body() {
        let mut http = MockHttpClient::new();
        http.expect_execute()
            .times(1)
            .returning(|_| Ok(response(502, "<html>bad gateway</html>")));

        let provider = OAuthRefreshProvider::new(config(ClientAuthMethod::Body), Arc::new(http));
        let err = provider.acquire_token().await.unwrap_err();
        assert!(matches!(err, AuthError::TokenRefreshFailed(ref msg) if msg.contains("502")));
    }

    #[tokio::test]
    async fn test_transport_failure_is_network_error() {
        let mut http = MockHttpClient::new();
        http.expect_execute()
            .times(1)
            .returning(|_| Err(BridgeError::OperationFailed("Connection failed".into())));

        let provider = OAuthRefreshProvider::new(config(ClientAuthMethod::Body), Arc::new(http));
        assert!(matches!(
            provider.acquire_token().await.unwrap_err(),
            AuthError::Network(_)
        ));
    }

    #[tokio::test]
    async fn test_missing_access_token_is_malformed() {
        let mut http = MockHttpClient::new();
        http.expect_execute()
            .times(1)
            .returning(|_| Ok(response(200, r#"{"token_type":"bearer"}"#)));

        let provider = OAuthRefreshProvider::new(config(ClientAuthMethod::Body), Arc::new(http));
        assert!(matches!(
            provider.acquire_token().await.unwrap_err(),
            AuthError::MalformedResponse(_)
        ));
    }

    #[tokio::test]
    async fn test_rotated_refresh_token_is_used_next_time() {
        let mut http = MockHttpClient::new();
        let mut seq = mockall::Sequence::new();
        http.expect_execute()
            .withf(|req| body_of(req).contains("refresh_token=refresh-1"))
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| {
                Ok(response(
                    200,
                    r#"{"access_token":"at-1","refresh_token":"refresh-2"}"#,
                ))
            });
        http.expect_execute()
            .withf(|req| body_of(req).contains("refresh_token=refresh-2"))
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(response(200, r#"{"access_token":"at-2"}"#)));

        let provider = OAuthRefreshProvider::new(config(ClientAuthMethod::Body), Arc::new(http));
        assert_eq!(provider.acquire_token().await.unwrap().secret(), "at-1");
        assert_eq!(provider.acquire_token().await.unwrap().secret(), "at-2");
    }

    #[test]
    fn test_config_debug_hides_secrets() {
        let rendered = format!("{:?}", config(ClientAuthMethod::Body));
        assert!(!rendered.contains("\"secret\""));
        assert!(!rendered.contains("refresh-1"));
    }
}
