//! Integration tests for service wiring, the HTTP trigger surface and the
//! scheduler.

use async_trait::async_trait;
use axum::{
    body::{to_bytes, Body},
    http::{Method, Request, StatusCode},
};
use bridge_desktop::TokioFileSystem;
use bridge_traits::{
    error::Result as BridgeResult,
    storage::{ReadinessState, Recording, RecordingProvider},
};
use core_auth::{AccessToken, AuthError, CredentialProvider};
use core_runtime::config::AppConfig;
use core_service::{SyncService, SyncServiceBuilder};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tower::ServiceExt;

struct CountingCredentials {
    reject: bool,
    calls: AtomicUsize,
}

impl CountingCredentials {
    fn new(reject: bool) -> Arc<Self> {
        Arc::new(Self {
            reject,
            calls: AtomicUsize::new(0),
        })
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CredentialProvider for CountingCredentials {
    async fn acquire_token(&self) -> core_auth::Result<AccessToken> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.reject {
            return Err(AuthError::Rejected {
                error: "invalid_grant".to_string(),
                description: None,
            });
        }
        Ok(AccessToken::new("token"))
    }
}

/// Provider with one recording that is still processing.
struct PendingOnlyProvider;

#[async_trait]
impl RecordingProvider for PendingOnlyProvider {
    async fn list_recordings(&self, _access_token: &str) -> BridgeResult<Vec<Recording>> {
        Ok(vec![Recording::new("m1", ReadinessState::Pending)])
    }

    async fn delete_recording(&self, _access_token: &str, _recording_id: &str) -> BridgeResult<()> {
        Ok(())
    }
}

fn config_for(dir: &tempfile::TempDir, extra: &[(&str, &str)]) -> AppConfig {
    let mut vars: HashMap<String, String> = [
        ("OAUTH_TOKEN_URL", "https://auth.example.com/oauth/token"),
        ("OAUTH_CLIENT_ID", "client"),
        ("OAUTH_CLIENT_SECRET", "secret"),
        ("OAUTH_REFRESH_TOKEN", "refresh"),
        ("PROVIDER_API_BASE_URL", "https://api.example.com/v2"),
        ("DELETE_SOURCE_AFTER_TRANSFER", "false"),
        ("FFMPEG_PATH", "none"),
        ("SYNC_INTERVAL", "60s"),
        ("HTTP_BIND", "127.0.0.1:0"),
    ]
    .iter()
    .map(|(k, v)| (k.to_string(), v.to_string()))
    .collect();

    vars.insert(
        "DESTINATION_DIR".to_string(),
        dir.path().join("bucket").display().to_string(),
    );
    vars.insert(
        "LEDGER_PATH".to_string(),
        dir.path().join("transfer-status.json").display().to_string(),
    );
    for (k, v) in extra {
        vars.insert(k.to_string(), v.to_string());
    }

    AppConfig::from_map(&vars).unwrap()
}

async fn service_with(
    dir: &tempfile::TempDir,
    credentials: Arc<CountingCredentials>,
) -> SyncService {
    SyncServiceBuilder::new(config_for(dir, &[]))
        .filesystem(Arc::new(TokioFileSystem::with_cache_directory(dir.path().join("cache"))))
        .credentials(credentials)
        .provider(Arc::new(PendingOnlyProvider))
        .build()
        .await
        .unwrap()
}

async fn call(service: &SyncService, method: Method, uri: &str) -> (StatusCode, Vec<u8>) {
    let response = service
        .router()
        .oneshot(
            Request::builder()
                .method(method)
                .uri(uri)
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    let status = response.status();
    let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, body.to_vec())
}

async fn wait_until_idle(service: &SyncService) {
    for _ in 0..500 {
        if !service.orchestrator().is_running() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("sync run did not finish");
}

#[tokio::test]
async fn test_health_endpoint() {
    let dir = tempfile::tempdir().unwrap();
    let service = service_with(&dir, CountingCredentials::new(false)).await;

    let (status, body) = call(&service, Method::GET, "/health").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, b"OK");
}

#[tokio::test]
async fn test_status_starts_idle() {
    let dir = tempfile::tempdir().unwrap();
    let service = service_with(&dir, CountingCredentials::new(false)).await;

    let (status, body) = call(&service, Method::GET, "/status").await;
    assert_eq!(status, StatusCode::OK);

    let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(json["status"], "idle");
    assert_eq!(json["processedCount"], 0);
    assert!(json["error"].is_null());
}

#[tokio::test]
async fn test_trigger_returns_accepted_and_run_completes() {
    let dir = tempfile::tempdir().unwrap();
    let credentials = CountingCredentials::new(false);
    let service = service_with(&dir, credentials.clone()).await;

    let (status, body) = call(&service, Method::POST, "/sync").await;
    assert_eq!(status, StatusCode::ACCEPTED);
    let started: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(started["status"], "running");
    assert!(started["runId"].is_string());

    wait_until_idle(&service).await;

    let (_, body) = call(&service, Method::GET, "/status").await;
    let finished: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(finished["status"], "completed");
    assert_eq!(finished["runId"], started["runId"]);
    assert_eq!(finished["totalRecordings"], 1);
    assert_eq!(finished["skippedCount"], 1);
    assert_eq!(finished["processedCount"], 0);
    assert_eq!(credentials.calls(), 1);
}

#[tokio::test]
async fn test_failed_run_is_reported_on_status() {
    let dir = tempfile::tempdir().unwrap();
    let service = service_with(&dir, CountingCredentials::new(true)).await;

    let summary = service.run_once().await;
    assert_eq!(summary.status, core_sync::RunStatus::Error);

    let (_, body) = call(&service, Method::GET, "/status").await;
    let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(json["status"], "error");
    assert!(json["error"].as_str().unwrap().contains("invalid_grant"));
}

#[tokio::test]
async fn test_sync_route_rejects_get() {
    let dir = tempfile::tempdir().unwrap();
    let service = service_with(&dir, CountingCredentials::new(false)).await;

    let (status, _) = call(&service, Method::GET, "/sync").await;
    assert_eq!(status, StatusCode::METHOD_NOT_ALLOWED);
}

#[tokio::test(start_paused = true)]
async fn test_scheduler_runs_at_start_and_on_interval() {
    let dir = tempfile::tempdir().unwrap();
    let credentials = CountingCredentials::new(true);
    let service = service_with(&dir, credentials.clone()).await;

    let shutdown = CancellationToken::new();
    let handle = service.scheduler().spawn(shutdown.clone());

    // Ticks at 0s, 60s and 120s.
    tokio::time::sleep(Duration::from_secs(150)).await;
    shutdown.cancel();
    handle.await.unwrap();

    assert_eq!(credentials.calls(), 3);
}

#[tokio::test]
async fn test_serve_stops_on_shutdown() {
    let dir = tempfile::tempdir().unwrap();
    let service = service_with(&dir, CountingCredentials::new(true)).await;

    let shutdown = CancellationToken::new();
    let server = {
        let service = service.clone();
        let shutdown = shutdown.clone();
        tokio::spawn(async move { service.serve(shutdown).await })
    };

    tokio::time::sleep(Duration::from_millis(50)).await;
    shutdown.cancel();

    let result = tokio::time::timeout(Duration::from_secs(5), server)
        .await
        .expect("server stopped")
        .unwrap();
    assert!(result.is_ok());
}

#[cfg(feature = "gcs")]
#[tokio::test]
async fn test_bucket_with_invalid_credentials_fails_to_build() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = config_for(&dir, &[]);
    config.destination.target = core_runtime::config::DestinationTarget::Bucket {
        bucket: "archive".to_string(),
        credentials: core_runtime::config::CredentialsSource::Inline("not json".to_string()),
    };

    let result = SyncServiceBuilder::new(config)
        .credentials(CountingCredentials::new(false))
        .provider(Arc::new(PendingOnlyProvider))
        .build()
        .await;
    assert!(result.is_err());
}
