//! Google Cloud Storage object sink
//!
//! Authenticates with a service-account key using the OAuth 2.0 JWT bearer
//! grant and uploads each object with a single streamed media upload. GCS
//! only creates the object once the request body completes, so an aborted
//! stream never leaves a partial object behind.

use async_trait::async_trait;
use bridge_traits::{
    error::{BridgeError, Result},
    storage::{DynAsyncRead, ObjectSink},
};
use futures_util::TryStreamExt;
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use reqwest::{Body, Client};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};
use tokio::sync::Mutex;
use tokio_util::io::ReaderStream;
use tracing::{debug, info, instrument};

const STORAGE_SCOPE: &str = "https://www.googleapis.com/auth/devstorage.read_write";
const DEFAULT_TOKEN_URI: &str = "https://oauth2.googleapis.com/token";
const DEFAULT_UPLOAD_BASE: &str = "https://storage.googleapis.com/upload/storage/v1";
const JWT_GRANT_TYPE: &str = "urn:ietf:params:oauth:grant-type:jwt-bearer";
const ASSERTION_LIFETIME_SECS: u64 = 3600;
const TOKEN_EXPIRY_SKEW: Duration = Duration::from_secs(60);

/// Fields of a service-account key file that the sink needs.
#[derive(Clone, Deserialize)]
pub struct ServiceAccountKey {
    pub client_email: String,
    pub private_key: String,
    #[serde(default)]
    pub token_uri: Option<String>,
}

impl std::fmt::Debug for ServiceAccountKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceAccountKey")
            .field("client_email", &self.client_email)
            .field("private_key", &"<redacted>")
            .field("token_uri", &self.token_uri)
            .finish()
    }
}

#[derive(Serialize)]
struct Claims<'a> {
    iss: &'a str,
    scope: &'a str,
    aud: &'a str,
    iat: u64,
    exp: u64,
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: Option<u64>,
}

#[derive(Deserialize)]
struct ObjectResource {
    #[serde(default)]
    size: Option<String>,
}

struct CachedToken {
    value: String,
    expires_at: Instant,
}

pub struct GcsObjectStore {
    client: Client,
    bucket: String,
    key: ServiceAccountKey,
    upload_base: String,
    token: Mutex<Option<CachedToken>>,
}

impl GcsObjectStore {
    pub fn new(bucket: impl Into<String>, key: ServiceAccountKey) -> Result<Self> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .user_agent(concat!("recording-sync/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| {
                BridgeError::OperationFailed(format!("Failed to build GCS client: {}", e))
            })?;

        Ok(Self {
            client,
            bucket: bucket.into(),
            key,
            upload_base: DEFAULT_UPLOAD_BASE.to_string(),
            token: Mutex::new(None),
        })
    }

    /// Build a sink from the JSON text of a service-account key.
    pub fn from_json(bucket: impl Into<String>, credentials_json: &str) -> Result<Self> {
        let key = parse_service_account(credentials_json)?;
        Self::new(bucket, key)
    }

    /// Build a sink from a service-account key file on disk.
    pub async fn from_file(bucket: impl Into<String>, path: &Path) -> Result<Self> {
        let json = tokio::fs::read_to_string(path).await?;
        Self::from_json(bucket, &json)
    }

    /// Override the upload endpoint (emulators, tests).
    pub fn with_upload_base(mut self, upload_base: impl Into<String>) -> Self {
        self.upload_base = upload_base.into().trim_end_matches('/').to_string();
        self
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    fn token_uri(&self) -> &str {
        self.key.token_uri.as_deref().unwrap_or(DEFAULT_TOKEN_URI)
    }

    fn upload_url(&self, key: &str) -> String {
        format!(
            "{}/b/{}/o?uploadType=media&name={}",
            self.upload_base,
            urlencoding::encode(&self.bucket),
            urlencoding::encode(key)
        )
    }

    fn signed_assertion(&self) -> Result<String> {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_err(|e| BridgeError::OperationFailed(format!("System clock error: {}", e)))?
            .as_secs();
        let claims = Claims {
            iss: &self.key.client_email,
            scope: STORAGE_SCOPE,
            aud: self.token_uri(),
            iat: now,
            exp: now + ASSERTION_LIFETIME_SECS,
        };
        let encoding_key = EncodingKey::from_rsa_pem(self.key.private_key.as_bytes())
            .map_err(|e| BridgeError::OperationFailed(format!("Invalid private key: {}", e)))?;

        jsonwebtoken::encode(&Header::new(Algorithm::RS256), &claims, &encoding_key)
            .map_err(|e| BridgeError::OperationFailed(format!("JWT signing failed: {}", e)))
    }

    /// Return a cached access token, exchanging a fresh assertion when the
    /// cached one is within the expiry skew.
    async fn access_token(&self) -> Result<String> {
        let mut cached = self.token.lock().await;
        if let Some(token) = cached.as_ref() {
            if token.expires_at > Instant::now() + TOKEN_EXPIRY_SKEW {
                return Ok(token.value.clone());
            }
        }

        let assertion = self.signed_assertion()?;
        let response = self
            .client
            .post(self.token_uri())
            .form(&[("grant_type", JWT_GRANT_TYPE), ("assertion", assertion.as_str())])
            .timeout(Duration::from_secs(30))
            .send()
            .await
            .map_err(|e| BridgeError::OperationFailed(format!("GCS token request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(BridgeError::HttpStatus {
                status: status.as_u16(),
                url: self.token_uri().to_string(),
                message,
            });
        }

        let token: TokenResponse = response.json().await.map_err(|e| {
            BridgeError::OperationFailed(format!("Malformed GCS token response: {}", e))
        })?;
        let lifetime = Duration::from_secs(token.expires_in.unwrap_or(ASSERTION_LIFETIME_SECS));
        info!(service_account = %self.key.client_email, "Obtained storage access token");

        *cached = Some(CachedToken {
            value: token.access_token.clone(),
            expires_at: Instant::now() + lifetime,
        });
        Ok(token.access_token)
    }
}

/// Parse the JSON text of a service-account key.
pub fn parse_service_account(credentials_json: &str) -> Result<ServiceAccountKey> {
    serde_json::from_str(credentials_json).map_err(|e| {
        BridgeError::OperationFailed(format!("Invalid service-account credentials: {}", e))
    })
}

#[async_trait]
impl ObjectSink for GcsObjectStore {
    #[instrument(skip(self, reader), fields(bucket = %self.bucket))]
    async fn upload(
        &self,
        key: &str,
        content_type: &str,
        reader: Box<DynAsyncRead>,
    ) -> Result<u64> {
        let token = self.access_token().await?;

        let sent = Arc::new(AtomicU64::new(0));
        let counter = Arc::clone(&sent);
        let stream = ReaderStream::new(reader).inspect_ok(move |chunk| {
            counter.fetch_add(chunk.len() as u64, Ordering::Relaxed);
        });

        let response = self
            .client
            .post(self.upload_url(key))
            .bearer_auth(token)
            .header(reqwest::header::CONTENT_TYPE, content_type)
            .body(Body::wrap_stream(stream))
            .send()
            .await
            .map_err(|e| BridgeError::OperationFailed(format!("GCS upload failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(BridgeError::HttpStatus {
                status: status.as_u16(),
                url: self.object_uri(key),
                message,
            });
        }

        let streamed = sent.load(Ordering::Relaxed);
        let reported = response
            .json::<ObjectResource>()
            .await
            .ok()
            .and_then(|object| object.size)
            .and_then(|size| size.parse::<u64>().ok());

        let bytes = reported.unwrap_or(streamed);
        debug!(key = %key, bytes, "Uploaded object");
        Ok(bytes)
    }

    fn object_uri(&self, key: &str) -> String {
        format!("gs://{}/{}", self.bucket, key)
    }
}
