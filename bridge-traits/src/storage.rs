//! Storage and Transfer Endpoint Abstractions
//!
//! Provides traits for local file I/O, the meeting provider that holds
//! recordings, and the object store that receives them.

use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

use crate::error::Result;

/// Boxed async byte source handed between downloaders and sinks.
pub type DynAsyncRead = dyn tokio::io::AsyncRead + Send + Unpin;

/// File system access trait
///
/// Abstracts the file I/O the sync core needs: the status ledger and the
/// scratch space used while reassembling segmented recordings.
///
/// # Example
///
/// ```ignore
/// use bridge_traits::storage::FileSystemAccess;
///
/// async fn save(fs: &dyn FileSystemAccess, path: &Path, data: &[u8]) -> Result<()> {
///     let staged = path.with_extension("tmp");
///     fs.write_file(&staged, data.to_vec().into()).await?;
///     fs.rename(&staged, path).await
/// }
/// ```
#[async_trait]
pub trait FileSystemAccess: Send + Sync {
    /// Directory for scratch files that may be discarded at any time
    async fn get_cache_directory(&self) -> Result<PathBuf>;

    /// Check if a file or directory exists
    async fn exists(&self, path: &Path) -> Result<bool>;

    /// Create directory and all parent directories
    async fn create_dir_all(&self, path: &Path) -> Result<()>;

    /// Read entire file contents
    async fn read_file(&self, path: &Path) -> Result<Bytes>;

    /// Write data to file (overwrites existing) and flush it to stable storage
    async fn write_file(&self, path: &Path, data: Bytes) -> Result<()>;

    /// Atomically replace `to` with `from`
    async fn rename(&self, from: &Path, to: &Path) -> Result<()>;

    /// Delete a directory and all its contents
    async fn delete_dir_all(&self, path: &Path) -> Result<()>;

    /// Open file for streaming read
    async fn open_read_stream(&self, path: &Path) -> Result<Box<DynAsyncRead>>;

    /// Open file for streaming write (truncates existing)
    async fn open_write_stream(
        &self,
        path: &Path,
    ) -> Result<Box<dyn tokio::io::AsyncWrite + Send + Unpin>>;
}

/// Whether the provider has finished producing a recording.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReadinessState {
    Ready,
    Pending,
    /// A state string the provider reported that we do not recognise.
    Unknown(String),
}

impl ReadinessState {
    pub fn is_ready(&self) -> bool {
        matches!(self, ReadinessState::Ready)
    }
}

impl fmt::Display for ReadinessState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReadinessState::Ready => f.write_str("ready"),
            ReadinessState::Pending => f.write_str("pending"),
            ReadinessState::Unknown(raw) => write!(f, "unknown({})", raw),
        }
    }
}

/// A recording as reported by the meeting provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Recording {
    /// Provider-assigned identifier, unique within the provider
    pub id: String,
    pub title: Option<String>,
    pub readiness: ReadinessState,
    /// Absent while the provider is still processing the recording
    pub download_url: Option<String>,
    /// Container hint from the provider (`mp4`, `hls`, ...)
    pub format: Option<String>,
    /// Size hint in bytes
    pub size: Option<u64>,
}

impl Recording {
    pub fn new(id: impl Into<String>, readiness: ReadinessState) -> Self {
        Self {
            id: id.into(),
            title: None,
            readiness,
            download_url: None,
            format: None,
            size: None,
        }
    }

    pub fn with_download_url(mut self, url: impl Into<String>) -> Self {
        self.download_url = Some(url.into());
        self
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn with_format(mut self, format: impl Into<String>) -> Self {
        self.format = Some(format.into());
        self
    }

    pub fn with_size(mut self, size: u64) -> Self {
        self.size = Some(size);
        self
    }
}

/// Meeting provider that owns the source recordings
///
/// Implementations map the provider's wire format onto [`Recording`] and
/// perform the optional post-transfer delete.
#[async_trait]
pub trait RecordingProvider: Send + Sync {
    /// List every recording visible to `access_token`.
    async fn list_recordings(&self, access_token: &str) -> Result<Vec<Recording>>;

    /// Remove the recording from the provider.
    async fn delete_recording(&self, access_token: &str, recording_id: &str) -> Result<()>;
}

/// Destination object store
///
/// An upload either commits the complete object under `key` or leaves
/// nothing visible under it. Partial objects must never be observable.
#[async_trait]
pub trait ObjectSink: Send + Sync {
    /// Stream `reader` to the object named `key`, returning the bytes written.
    async fn upload(
        &self,
        key: &str,
        content_type: &str,
        reader: Box<DynAsyncRead>,
    ) -> Result<u64>;

    /// Human-readable location of `key`, used in logs.
    fn object_uri(&self, key: &str) -> String;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recording_builder() {
        let recording = Recording::new("r-1", ReadinessState::Ready)
            .with_download_url("https://media.example.com/r-1.mp4")
            .with_format("mp4")
            .with_size(1024);

        assert!(recording.readiness.is_ready());
        assert_eq!(recording.size, Some(1024));
        assert_eq!(recording.format.as_deref(), Some("mp4"));
        assert!(recording.title.is_none());
    }

    #[test]
    fn test_readiness_display() {
        assert_eq!(ReadinessState::Pending.to_string(), "pending");
        assert_eq!(
            ReadinessState::Unknown("archived".into()).to_string(),
            "unknown(archived)"
        );
        assert!(!ReadinessState::Pending.is_ready());
    }
}
