//! # Transfer Strategy
//!
//! Moves one recording from the meeting provider into the destination sink.
//!
//! ## Decision policy
//!
//! Evaluated before any bytes move:
//!
//! 1. Not ready: skipped
//! 2. No download locator: skipped
//! 3. Segmented stream (`M3U8`/`HLS` format or a `.m3u8` locator): the
//!    segments are reassembled locally and uploaded as one object, see
//!    [`crate::segmented`]
//! 4. Anything else is streamed straight from the provider into the sink
//!
//! Object keys are deterministic, `{prefix}{encoded id}.{ext}`, so a retried
//! transfer overwrites rather than duplicates.

use async_trait::async_trait;
use bridge_traits::http::{HttpClient, HttpRequest};
use bridge_traits::storage::{
    DynAsyncRead, FileSystemAccess, ObjectSink, ReadinessState, Recording,
};
use core_auth::AccessToken;
use core_runtime::config::DownloadAuth;
use core_runtime::logging::redact_url;
use std::fmt;
use std::io;
use std::path::PathBuf;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;
use tokio::io::{AsyncRead, ReadBuf};
use tracing::{debug, info, instrument};

use crate::error::{Result, SyncError};
use crate::segmented::{self, SegmentedAssembler};

pub(crate) const MP4_CONTENT_TYPE: &str = "video/mp4";

/// Upper bound for a single download; large recordings stream for a while.
const DOWNLOAD_TIMEOUT: Duration = Duration::from_secs(60 * 60);

/// Why a recording was left alone this run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    NotReady(ReadinessState),
    NoLocator,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::NotReady(state) => write!(f, "recording not ready ({})", state),
            SkipReason::NoLocator => f.write_str("no download locator"),
        }
    }
}

/// Result of a transfer attempt that did not fail.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransferOutcome {
    /// The full recording is durably stored under `key`
    Transferred { key: String, bytes: u64 },
    Skipped(SkipReason),
}

/// Moves a single recording to the destination.
#[async_trait]
pub trait RecordingTransfer: Send + Sync {
    /// # Errors
    ///
    /// [`SyncError::Transfer`] when bytes could not be moved. Nothing is left
    /// under the destination key in that case.
    async fn transfer(&self, recording: &Recording, token: &AccessToken)
        -> Result<TransferOutcome>;
}

/// Which path a recording takes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransferPlan {
    Skip(SkipReason),
    Direct { url: String },
    Segmented { url: String },
}

impl TransferPlan {
    pub fn for_recording(recording: &Recording) -> Self {
        if !recording.readiness.is_ready() {
            return TransferPlan::Skip(SkipReason::NotReady(recording.readiness.clone()));
        }
        let Some(url) = recording
            .download_url
            .as_deref()
            .map(str::trim)
            .filter(|u| !u.is_empty())
        else {
            return TransferPlan::Skip(SkipReason::NoLocator);
        };

        if segmented::is_segmented_source(recording.format.as_deref(), url) {
            TransferPlan::Segmented {
                url: url.to_string(),
            }
        } else {
            TransferPlan::Direct {
                url: url.to_string(),
            }
        }
    }
}

/// Settings for [`TransferStrategy`].
#[derive(Debug, Clone, Default)]
pub struct TransferConfig {
    /// Prepended verbatim to every object key
    pub key_prefix: String,
    pub download_auth: DownloadAuth,
    /// Parent of the per-transfer scratch directories. The filesystem
    /// bridge's cache directory when unset.
    pub scratch_dir: Option<PathBuf>,
    /// Remuxer binary for segmented sources; MPEG-TS is uploaded as-is when unset
    pub ffmpeg_path: Option<PathBuf>,
}

/// Default [`RecordingTransfer`]: direct streaming or segmented reassembly.
pub struct TransferStrategy {
    http_client: Arc<dyn HttpClient>,
    sink: Arc<dyn ObjectSink>,
    segmented: SegmentedAssembler,
    config: TransferConfig,
}

impl TransferStrategy {
    pub fn new(
        http_client: Arc<dyn HttpClient>,
        filesystem: Arc<dyn FileSystemAccess>,
        sink: Arc<dyn ObjectSink>,
        config: TransferConfig,
    ) -> Self {
        let segmented = SegmentedAssembler::new(
            http_client.clone(),
            filesystem,
            config.download_auth,
            config.scratch_dir.clone(),
            config.ffmpeg_path.clone(),
        );
        Self {
            http_client,
            sink,
            segmented,
            config,
        }
    }

    #[instrument(skip_all, fields(key = %key))]
    async fn transfer_direct(
        &self,
        recording: &Recording,
        url: &str,
        key: &str,
        token: &AccessToken,
    ) -> Result<u64> {
        let request = authorized_request(url, token, self.config.download_auth)
            .map_err(|e| SyncError::transfer(&recording.id, e))?
            .timeout(DOWNLOAD_TIMEOUT);

        debug!(url = %redact_url(url), "Opening source stream");
        let source = self
            .http_client
            .download_stream(request)
            .await
            .map_err(|e| SyncError::transfer(&recording.id, format!("download: {}", e)))?;

        let reader: Box<DynAsyncRead> = Box::new(LengthCheckedReader::new(source, recording.size));
        let bytes = self
            .sink
            .upload(key, MP4_CONTENT_TYPE, reader)
            .await
            .map_err(|e| SyncError::transfer(&recording.id, format!("upload: {}", e)))?;

        Ok(bytes)
    }
}

#[async_trait]
impl RecordingTransfer for TransferStrategy {
    #[instrument(skip(self, recording, token), fields(recording_id = %recording.id))]
    async fn transfer(
        &self,
        recording: &Recording,
        token: &AccessToken,
    ) -> Result<TransferOutcome> {
        let (key, bytes) = match TransferPlan::for_recording(recording) {
            TransferPlan::Skip(reason) => {
                debug!(%reason, "Skipping recording");
                return Ok(TransferOutcome::Skipped(reason));
            }
            TransferPlan::Direct { url } => {
                let key = object_key(&self.config.key_prefix, &recording.id, "mp4");
                let bytes = self.transfer_direct(recording, &url, &key, token).await?;
                (key, bytes)
            }
            TransferPlan::Segmented { url } => {
                let stem = object_key_stem(&self.config.key_prefix, &recording.id);
                self.segmented
                    .transfer(&recording.id, &url, token, self.sink.as_ref(), &stem)
                    .await?
            }
        };

        info!(
            destination = %self.sink.object_uri(&key),
            bytes,
            "Recording stored"
        );
        Ok(TransferOutcome::Transferred { key, bytes })
    }
}

/// Percent-encode everything outside `[A-Za-z0-9._~-]`.
///
/// The encoding is injective, so distinct recording ids never share a key,
/// and the result holds no `/`.
pub fn encode_key_component(id: &str) -> String {
    urlencoding::encode(id).into_owned()
}

pub(crate) fn object_key_stem(prefix: &str, recording_id: &str) -> String {
    format!("{}{}", prefix, encode_key_component(recording_id))
}

/// `{prefix}{encoded id}.{ext}`
pub fn object_key(prefix: &str, recording_id: &str, ext: &str) -> String {
    format!("{}.{}", object_key_stem(prefix, recording_id), ext)
}

/// GET request for a provider-hosted download, carrying the token where the
/// provider expects it.
pub(crate) fn authorized_request(
    url: &str,
    token: &AccessToken,
    auth: DownloadAuth,
) -> std::result::Result<HttpRequest, String> {
    match auth {
        DownloadAuth::Header => Ok(HttpRequest::get(url).bearer_token(token.secret())),
        DownloadAuth::Query => {
            let mut parsed = url::Url::parse(url)
                .map_err(|e| format!("invalid download URL {}: {}", redact_url(url), e))?;
            parsed
                .query_pairs_mut()
                .append_pair("access_token", token.secret());
            Ok(HttpRequest::get(parsed.as_str()))
        }
    }
}

/// Reader that fails when the source ends before the advertised size.
///
/// Surfacing premature closure as a read error makes the sink discard its
/// staged object instead of committing a truncated one.
pub struct LengthCheckedReader<R> {
    inner: R,
    expected: Option<u64>,
    seen: u64,
}

impl<R> LengthCheckedReader<R> {
    pub fn new(inner: R, expected: Option<u64>) -> Self {
        Self {
            inner,
            expected: expected.filter(|&n| n > 0),
            seen: 0,
        }
    }
}

impl<R: AsyncRead + Unpin> AsyncRead for LengthCheckedReader<R> {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        let before = buf.filled().len();

        match Pin::new(&mut this.inner).poll_read(cx, buf) {
            Poll::Ready(Ok(())) => {
                let read = (buf.filled().len() - before) as u64;
                this.seen += read;
                if read == 0 && buf.remaining() > 0 {
                    if let Some(expected) = this.expected {
                        if this.seen < expected {
                            return Poll::Ready(Err(io::Error::new(
                                io::ErrorKind::UnexpectedEof,
                                format!(
                                    "source closed after {} of {} bytes",
                                    this.seen, expected
                                ),
                            )));
                        }
                    }
                }
                Poll::Ready(Ok(()))
            }
            other => other,
        }
    }
}
