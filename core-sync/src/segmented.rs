//! # Segmented Stream Reassembly
//!
//! Some recordings are only published as an HLS playlist: a text manifest
//! pointing at many short media segments. These are rebuilt into a single
//! file before upload.
//!
//! ## Workflow
//!
//! 1. Fetch the playlist. A master playlist is resolved to its highest
//!    bandwidth variant.
//! 2. Download the `#EXT-X-MAP` initialisation segment (if any) and every
//!    media segment, appending them to one file in a private scratch
//!    directory.
//! 3. Remux with `ffmpeg -c copy -bsf:a aac_adtstoasc` into MP4 when a remuxer
//!    is configured. Otherwise the joined stream is uploaded unchanged: as
//!    `.ts` for MPEG-TS segments, as `.mp4` for fMP4 segments behind an
//!    initialisation segment.
//! 4. Stream the artifact into the sink.
//!
//! The scratch directory is removed on every exit path.
//!
//! Encrypted playlists (`#EXT-X-KEY` with a method other than `NONE`) are
//! rejected.

use bridge_traits::http::HttpClient;
use bridge_traits::storage::{FileSystemAccess, ObjectSink};
use core_auth::AccessToken;
use core_runtime::config::DownloadAuth;
use core_runtime::logging::redact_url;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{debug, info, instrument, warn};
use url::Url;
use uuid::Uuid;

use crate::error::{Result, SyncError};
use crate::transfer::{authorized_request, MP4_CONTENT_TYPE};

const TS_CONTENT_TYPE: &str = "video/mp2t";
const PLAYLIST_TIMEOUT: Duration = Duration::from_secs(30);
const SEGMENT_TIMEOUT: Duration = Duration::from_secs(5 * 60);

/// Whether a recording should take the segmented path.
pub fn is_segmented_source(format: Option<&str>, url: &str) -> bool {
    let by_format = format
        .map(|f| matches!(f.trim().to_ascii_lowercase().as_str(), "m3u8" | "hls"))
        .unwrap_or(false);
    by_format || redact_url(url).to_ascii_lowercase().ends_with(".m3u8")
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum PlaylistError {
    #[error("not an HLS playlist")]
    NotAPlaylist,

    #[error("encrypted playlist (METHOD={0}) is not supported")]
    Encrypted(String),

    #[error("invalid segment URI {uri:?}: {reason}")]
    InvalidUri { uri: String, reason: String },

    #[error("playlist has no media segments")]
    Empty,
}

/// One rendition listed by a master playlist.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Variant {
    pub uri: Url,
    pub bandwidth: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaPlaylist {
    pub init_segment: Option<Url>,
    pub segments: Vec<Url>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Playlist {
    Master(Vec<Variant>),
    Media(MediaPlaylist),
}

impl Playlist {
    /// Parse playlist text. Relative URIs resolve against `base`.
    pub fn parse(text: &str, base: &Url) -> std::result::Result<Self, PlaylistError> {
        let mut lines = text.lines().map(str::trim).filter(|l| !l.is_empty());
        if !lines.next().is_some_and(|first| first.starts_with("#EXTM3U")) {
            return Err(PlaylistError::NotAPlaylist);
        }

        let mut variants = Vec::new();
        let mut segments = Vec::new();
        let mut init_segment = None;
        let mut pending_bandwidth: Option<u64> = None;

        for line in lines {
            if let Some(attrs) = line.strip_prefix("#EXT-X-STREAM-INF:") {
                let attrs = parse_attributes(attrs);
                pending_bandwidth = Some(
                    attrs
                        .get("BANDWIDTH")
                        .and_then(|b| b.parse().ok())
                        .unwrap_or(0),
                );
            } else if let Some(attrs) = line.strip_prefix("#EXT-X-KEY:") {
                let attrs = parse_attributes(attrs);
                let method = attrs.get("METHOD").map(String::as_str).unwrap_or("NONE");
                if !method.eq_ignore_ascii_case("NONE") {
                    return Err(PlaylistError::Encrypted(method.to_string()));
                }
            } else if let Some(attrs) = line.strip_prefix("#EXT-X-MAP:") {
                if let Some(uri) = parse_attributes(attrs).get("URI") {
                    init_segment = Some(resolve(base, uri)?);
                }
            } else if line.starts_with('#') {
                continue;
            } else if let Some(bandwidth) = pending_bandwidth.take() {
                variants.push(Variant {
                    uri: resolve(base, line)?,
                    bandwidth,
                });
            } else {
                segments.push(resolve(base, line)?);
            }
        }

        if !variants.is_empty() {
            return Ok(Playlist::Master(variants));
        }
        if segments.is_empty() {
            return Err(PlaylistError::Empty);
        }
        Ok(Playlist::Media(MediaPlaylist {
            init_segment,
            segments,
        }))
    }
}

fn resolve(base: &Url, uri: &str) -> std::result::Result<Url, PlaylistError> {
    base.join(uri).map_err(|e| PlaylistError::InvalidUri {
        uri: uri.to_string(),
        reason: e.to_string(),
    })
}

/// Parse an attribute list such as `BANDWIDTH=1280000,CODECS="avc1,mp4a"`.
fn parse_attributes(raw: &str) -> HashMap<String, String> {
    let mut attrs = HashMap::new();
    let mut rest = raw.trim();

    while !rest.is_empty() {
        let Some(eq) = rest.find('=') else { break };
        let key = rest[..eq].trim().to_ascii_uppercase();
        let after = &rest[eq + 1..];

        let (value, remainder) = if let Some(quoted) = after.strip_prefix('"') {
            match quoted.find('"') {
                Some(end) => (&quoted[..end], &quoted[end + 1..]),
                None => (quoted, ""),
            }
        } else {
            match after.find(',') {
                Some(end) => (&after[..end], &after[end..]),
                None => (after, ""),
            }
        };

        attrs.insert(key, value.trim().to_string());
        rest = remainder.trim_start_matches(',').trim_start();
    }

    attrs
}

/// `ffmpeg` invocation that rewraps MPEG-TS into MP4 without re-encoding.
#[derive(Debug, Clone)]
pub struct FfmpegRemuxer {
    binary: PathBuf,
}

impl FfmpegRemuxer {
    pub fn new(binary: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
        }
    }

    pub async fn remux(&self, input: &Path, output: &Path) -> std::result::Result<(), String> {
        let result = Command::new(&self.binary)
            .args(["-hide_banner", "-loglevel", "error", "-y", "-i"])
            .arg(input)
            .args(["-c", "copy", "-bsf:a", "aac_adtstoasc", "-movflags", "+faststart"])
            .arg(output)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| format!("failed to start {}: {}", self.binary.display(), e))?;

        if !result.status.success() {
            let stderr = String::from_utf8_lossy(&result.stderr);
            let stderr = stderr.trim();
            let start = stderr
                .char_indices()
                .rev()
                .nth(499)
                .map(|(i, _)| i)
                .unwrap_or(0);
            return Err(format!("remux failed ({}): {}", result.status, &stderr[start..]));
        }
        Ok(())
    }
}

/// Private scratch directory, removed by [`ScratchDir::cleanup`].
///
/// If the owning future is dropped or panics before cleanup, `Drop` removes
/// the directory synchronously.
struct ScratchDir {
    path: PathBuf,
    armed: bool,
}

impl ScratchDir {
    async fn cleanup(mut self, fs: &dyn FileSystemAccess) {
        match fs.delete_dir_all(&self.path).await {
            Ok(()) => {
                debug!(path = %self.path.display(), "Removed scratch directory");
                self.armed = false;
            }
            Err(e) => warn!(path = %self.path.display(), error = %e, "Failed to remove scratch directory"),
        }
    }
}

impl Drop for ScratchDir {
    fn drop(&mut self) {
        if self.armed {
            let _ = std::fs::remove_dir_all(&self.path);
        }
    }
}

/// Rebuilds segmented recordings and hands them to the sink.
pub struct SegmentedAssembler {
    http_client: Arc<dyn HttpClient>,
    filesystem: Arc<dyn FileSystemAccess>,
    download_auth: DownloadAuth,
    scratch_root: Option<PathBuf>,
    remuxer: Option<FfmpegRemuxer>,
}

impl SegmentedAssembler {
    pub fn new(
        http_client: Arc<dyn HttpClient>,
        filesystem: Arc<dyn FileSystemAccess>,
        download_auth: DownloadAuth,
        scratch_root: Option<PathBuf>,
        ffmpeg_path: Option<PathBuf>,
    ) -> Self {
        Self {
            http_client,
            filesystem,
            download_auth,
            scratch_root,
            remuxer: ffmpeg_path.map(FfmpegRemuxer::new),
        }
    }

    /// Reassemble the stream at `url` and upload it as `{key_stem}.mp4`
    /// (remuxed, or fMP4 segments) or `{key_stem}.ts`. Returns the key and stored size.
    #[instrument(skip_all, fields(recording_id = %recording_id))]
    pub async fn transfer(
        &self,
        recording_id: &str,
        url: &str,
        token: &AccessToken,
        sink: &dyn ObjectSink,
        key_stem: &str,
    ) -> Result<(String, u64)> {
        let scratch = self
            .create_scratch()
            .await
            .map_err(|e| SyncError::transfer(recording_id, format!("scratch directory: {}", e)))?;

        let result = self
            .assemble_and_upload(url, token, sink, key_stem, &scratch.path)
            .await
            .map_err(|reason| SyncError::transfer(recording_id, reason));

        scratch.cleanup(self.filesystem.as_ref()).await;
        result
    }

    async fn create_scratch(&self) -> bridge_traits::error::Result<ScratchDir> {
        let root = match &self.scratch_root {
            Some(root) => root.clone(),
            None => self.filesystem.get_cache_directory().await?,
        };
        let path = root.join(format!("segments-{}", Uuid::new_v4()));
        self.filesystem.create_dir_all(&path).await?;
        Ok(ScratchDir { path, armed: true })
    }

    async fn assemble_and_upload(
        &self,
        url: &str,
        token: &AccessToken,
        sink: &dyn ObjectSink,
        key_stem: &str,
        scratch: &Path,
    ) -> std::result::Result<(String, u64), String> {
        let playlist = self.resolve_media_playlist(url, token).await?;
        info!(
            segments = playlist.segments.len(),
            init_segment = playlist.init_segment.is_some(),
            "Reassembling segmented recording"
        );

        // An `EXT-X-MAP` init segment means fMP4 fragments, not MPEG-TS.
        let fragmented = playlist.init_segment.is_some();
        let joined = scratch.join(if fragmented { "stream.m4s" } else { "stream.ts" });
        let assembled = self.download_segments(&playlist, token, &joined).await?;
        debug!(bytes = assembled, "Segments concatenated");

        let (artifact, ext, content_type) = match &self.remuxer {
            Some(remuxer) => {
                let remuxed = scratch.join("stream.mp4");
                remuxer.remux(&joined, &remuxed).await?;
                (remuxed, "mp4", MP4_CONTENT_TYPE)
            }
            None if fragmented => (joined, "mp4", MP4_CONTENT_TYPE),
            None => (joined, "ts", TS_CONTENT_TYPE),
        };

        let key = format!("{}.{}", key_stem, ext);
        let reader = self
            .filesystem
            .open_read_stream(&artifact)
            .await
            .map_err(|e| format!("open {}: {}", artifact.display(), e))?;
        let bytes = sink
            .upload(&key, content_type, reader)
            .await
            .map_err(|e| format!("upload: {}", e))?;

        Ok((key, bytes))
    }

    async fn resolve_media_playlist(
        &self,
        url: &str,
        token: &AccessToken,
    ) -> std::result::Result<MediaPlaylist, String> {
        match self.fetch_playlist(url, token).await? {
            Playlist::Media(media) => Ok(media),
            Playlist::Master(variants) => {
                let best = variants
                    .into_iter()
                    .max_by_key(|v| v.bandwidth)
                    .ok_or_else(|| "master playlist lists no variants".to_string())?;
                debug!(bandwidth = best.bandwidth, "Selected variant");

                match self.fetch_playlist(best.uri.as_str(), token).await? {
                    Playlist::Media(media) => Ok(media),
                    Playlist::Master(_) => Err("variant is another master playlist".to_string()),
                }
            }
        }
    }

    async fn fetch_playlist(
        &self,
        url: &str,
        token: &AccessToken,
    ) -> std::result::Result<Playlist, String> {
        let base = Url::parse(url).map_err(|e| format!("invalid playlist URL: {}", e))?;
        let request = authorized_request(url, token, self.download_auth)?.timeout(PLAYLIST_TIMEOUT);

        let response = self
            .http_client
            .execute(request)
            .await
            .map_err(|e| format!("playlist fetch: {}", e))?;
        if !response.is_success() {
            return Err(format!(
                "playlist fetch: HTTP {} from {}",
                response.status,
                redact_url(url)
            ));
        }

        let text = String::from_utf8_lossy(&response.body);
        Playlist::parse(&text, &base).map_err(|e| e.to_string())
    }

    async fn download_segments(
        &self,
        playlist: &MediaPlaylist,
        token: &AccessToken,
        target: &Path,
    ) -> std::result::Result<u64, String> {
        let mut writer = self
            .filesystem
            .open_write_stream(target)
            .await
            .map_err(|e| format!("open {}: {}", target.display(), e))?;

        let mut total = 0u64;
        for (index, segment) in playlist
            .init_segment
            .iter()
            .chain(playlist.segments.iter())
            .enumerate()
        {
            let request = authorized_request(segment.as_str(), token, self.download_auth)?
                .timeout(SEGMENT_TIMEOUT);
            let mut reader = self
                .http_client
                .download_stream(request)
                .await
                .map_err(|e| format!("segment {}: {}", index, e))?;
            total += tokio::io::copy(&mut reader, &mut writer)
                .await
                .map_err(|e| format!("segment {}: {}", index, e))?;
        }

        writer
            .shutdown()
            .await
            .map_err(|e| format!("flush {}: {}", target.display(), e))?;
        Ok(total)
    }
}
