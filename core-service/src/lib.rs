//! Service wiring and bootstrap helpers.
//!
//! This crate turns an [`AppConfig`] into a running service: it builds the
//! concrete bridges (reqwest HTTP client, tokio filesystem, object sink), the
//! credential provider and provider connector, hands them to the
//! [`SyncOrchestrator`], and exposes it through the scheduler and the HTTP
//! trigger surface.
//!
//! Every collaborator can be replaced on the [`SyncServiceBuilder`], which is
//! how tests run the full stack without network access.

pub mod error;
pub mod http;
pub mod scheduler;

pub use error::{CoreError, Result};
pub use scheduler::Scheduler;

use std::sync::Arc;

use axum::Router;
use bridge_desktop::{LocalObjectStore, ReqwestHttpClient, TokioFileSystem};
use bridge_traits::{
    http::HttpClient,
    storage::{FileSystemAccess, ObjectSink, RecordingProvider},
    time::{Clock, SystemClock},
};
use core_auth::{CredentialProvider, OAuthRefreshConfig, OAuthRefreshProvider};
use core_runtime::config::{AppConfig, CredentialsSource, DestinationTarget};
use core_sync::{
    RecordingTransfer, RunSummary, SyncConfig, SyncDependencies, SyncOrchestrator,
    TransferConfig, TransferStrategy,
};
use provider_meetings::{ConnectorConfig, MeetingRecordingsConnector};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::http::{create_router, AppState};

/// Assembles a [`SyncService`] from configuration, with optional overrides.
pub struct SyncServiceBuilder {
    config: AppConfig,
    http_client: Option<Arc<dyn HttpClient>>,
    filesystem: Option<Arc<dyn FileSystemAccess>>,
    sink: Option<Arc<dyn ObjectSink>>,
    credentials: Option<Arc<dyn CredentialProvider>>,
    provider: Option<Arc<dyn RecordingProvider>>,
    transfer: Option<Arc<dyn RecordingTransfer>>,
    clock: Option<Arc<dyn Clock>>,
}

impl SyncServiceBuilder {
    pub fn new(config: AppConfig) -> Self {
        Self {
            config,
            http_client: None,
            filesystem: None,
            sink: None,
            credentials: None,
            provider: None,
            transfer: None,
            clock: None,
        }
    }

    pub fn http_client(mut self, http_client: Arc<dyn HttpClient>) -> Self {
        self.http_client = Some(http_client);
        self
    }

    pub fn filesystem(mut self, filesystem: Arc<dyn FileSystemAccess>) -> Self {
        self.filesystem = Some(filesystem);
        self
    }

    pub fn sink(mut self, sink: Arc<dyn ObjectSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    pub fn credentials(mut self, credentials: Arc<dyn CredentialProvider>) -> Self {
        self.credentials = Some(credentials);
        self
    }

    pub fn provider(mut self, provider: Arc<dyn RecordingProvider>) -> Self {
        self.provider = Some(provider);
        self
    }

    pub fn transfer(mut self, transfer: Arc<dyn RecordingTransfer>) -> Self {
        self.transfer = Some(transfer);
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Build the service.
    ///
    /// # Errors
    ///
    /// Fails when the HTTP client cannot be created, the bucket credentials
    /// cannot be loaded, or a bucket is configured in a build without the
    /// `gcs` feature.
    pub async fn build(self) -> Result<SyncService> {
        let config = self.config;

        let http_client: Arc<dyn HttpClient> = match self.http_client {
            Some(client) => client,
            None => Arc::new(ReqwestHttpClient::new()?),
        };
        let filesystem: Arc<dyn FileSystemAccess> = self
            .filesystem
            .unwrap_or_else(|| Arc::new(TokioFileSystem::new()));
        let clock: Arc<dyn Clock> = self.clock.unwrap_or_else(|| Arc::new(SystemClock));

        let credentials: Arc<dyn CredentialProvider> = match self.credentials {
            Some(credentials) => credentials,
            None => Arc::new(OAuthRefreshProvider::new(
                OAuthRefreshConfig::from(&config.oauth),
                http_client.clone(),
            )),
        };

        let provider: Arc<dyn RecordingProvider> = match self.provider {
            Some(provider) => provider,
            None => Arc::new(MeetingRecordingsConnector::new(
                http_client.clone(),
                ConnectorConfig::from(&config.provider),
            )),
        };

        let transfer: Arc<dyn RecordingTransfer> = match self.transfer {
            Some(transfer) => transfer,
            None => {
                let sink = match self.sink {
                    Some(sink) => sink,
                    None => build_sink(&config.destination.target).await?,
                };
                info!(destination = %sink.object_uri(&config.destination.prefix), "Destination ready");

                Arc::new(TransferStrategy::new(
                    http_client.clone(),
                    filesystem.clone(),
                    sink,
                    TransferConfig {
                        key_prefix: config.destination.prefix.clone(),
                        download_auth: config.provider.download_auth,
                        scratch_dir: config.scratch_dir.clone(),
                        ffmpeg_path: config.ffmpeg_path.clone(),
                    },
                ))
            }
        };

        let orchestrator = Arc::new(SyncOrchestrator::new(
            SyncDependencies {
                credentials,
                provider,
                transfer,
                filesystem,
                clock,
            },
            SyncConfig {
                ledger_path: config.ledger_path.clone(),
                delete_source_after_transfer: config.delete_source_after_transfer,
            },
        ));

        Ok(SyncService {
            config,
            orchestrator,
        })
    }
}

async fn build_sink(target: &DestinationTarget) -> Result<Arc<dyn ObjectSink>> {
    match target {
        DestinationTarget::Directory(root) => Ok(Arc::new(LocalObjectStore::new(root.clone()))),
        DestinationTarget::Bucket {
            bucket,
            credentials,
        } => build_bucket_sink(bucket, credentials).await,
    }
}

#[cfg(feature = "gcs")]
async fn build_bucket_sink(
    bucket: &str,
    credentials: &CredentialsSource,
) -> Result<Arc<dyn ObjectSink>> {
    use bridge_desktop::GcsObjectStore;

    let store = match credentials {
        CredentialsSource::Inline(json) => GcsObjectStore::from_json(bucket, json)?,
        CredentialsSource::File(path) => GcsObjectStore::from_file(bucket, path).await?,
    };
    Ok(Arc::new(store))
}

#[cfg(not(feature = "gcs"))]
async fn build_bucket_sink(
    bucket: &str,
    _credentials: &CredentialsSource,
) -> Result<Arc<dyn ObjectSink>> {
    Err(CoreError::CapabilityMissing {
        capability: "gcs".to_string(),
        message: format!(
            "bucket {} is configured but this build has no Google Cloud Storage support",
            bucket
        ),
    })
}

/// A configured orchestrator plus the surfaces that drive it.
#[derive(Clone)]
pub struct SyncService {
    config: AppConfig,
    orchestrator: Arc<SyncOrchestrator>,
}

impl SyncService {
    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn orchestrator(&self) -> Arc<SyncOrchestrator> {
        Arc::clone(&self.orchestrator)
    }

    /// Run a sync pass and wait for it.
    pub async fn run_once(&self) -> RunSummary {
        self.orchestrator.run_sync().await
    }

    pub fn router(&self) -> Router {
        create_router(AppState::new(self.orchestrator()))
    }

    pub fn scheduler(&self) -> Scheduler {
        Scheduler::new(self.orchestrator(), self.config.sync_interval)
    }

    /// Serve HTTP and run the scheduler until `shutdown` is cancelled.
    ///
    /// On shutdown the scheduler stops issuing runs and the server drains
    /// in-flight requests. A sync run in progress is not interrupted.
    pub async fn serve(&self, shutdown: CancellationToken) -> Result<()> {
        let listener = TcpListener::bind(self.config.http_bind).await?;
        info!(address = %listener.local_addr()?, "HTTP server listening");

        let scheduler = self.scheduler().spawn(shutdown.child_token());

        let server = axum::serve(listener, self.router())
            .with_graceful_shutdown(shutdown.clone().cancelled_owned())
            .await;

        shutdown.cancel();
        if let Err(e) = scheduler.await {
            return Err(CoreError::InitializationFailed(format!(
                "scheduler task failed: {}",
                e
            )));
        }

        server?;
        info!("HTTP server stopped");
        Ok(())
    }
}
