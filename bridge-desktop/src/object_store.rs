//! Local-directory object sink
//!
//! Writes each object to `{root}/{key}`. Bytes are staged to a sibling
//! `.partial` file, synced, then renamed into place, so a reader of the
//! root never sees a truncated object under its final name.

use async_trait::async_trait;
use bridge_traits::{
    error::{BridgeError, Result},
    storage::{DynAsyncRead, ObjectSink},
};
use std::path::{Component, Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};

const PARTIAL_SUFFIX: &str = ".partial";

pub struct LocalObjectStore {
    root: PathBuf,
}

impl LocalObjectStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn object_path(&self, key: &str) -> Result<PathBuf> {
        let relative = Path::new(key);
        let is_plain = !key.is_empty()
            && relative
                .components()
                .all(|c| matches!(c, Component::Normal(_)));
        if !is_plain {
            return Err(BridgeError::OperationFailed(format!(
                "Invalid object key: {:?}",
                key
            )));
        }
        Ok(self.root.join(relative))
    }

    async fn write_staged(
        path: &Path,
        staged: &Path,
        mut reader: Box<DynAsyncRead>,
    ) -> Result<u64> {
        let mut file = fs::File::create(staged).await?;
        let bytes = tokio::io::copy(&mut reader, &mut file).await?;
        file.flush().await?;
        file.sync_all().await?;
        drop(file);
        fs::rename(staged, path).await?;
        Ok(bytes)
    }
}

#[async_trait]
impl ObjectSink for LocalObjectStore {
    async fn upload(
        &self,
        key: &str,
        content_type: &str,
        reader: Box<DynAsyncRead>,
    ) -> Result<u64> {
        let path = self.object_path(key)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }

        let mut staged = path.clone().into_os_string();
        staged.push(PARTIAL_SUFFIX);
        let staged = PathBuf::from(staged);

        match Self::write_staged(&path, &staged, reader).await {
            Ok(bytes) => {
                debug!(key = %key, content_type = %content_type, bytes, "Stored object");
                Ok(bytes)
            }
            Err(err) => {
                if let Err(cleanup) = fs::remove_file(&staged).await {
                    if cleanup.kind() != std::io::ErrorKind::NotFound {
                        warn!(key = %key, error = %cleanup, "Failed to remove partial object");
                    }
                }
                Err(err)
            }
        }
    }

    fn object_uri(&self, key: &str) -> String {
        format!("file://{}", self.root.join(key).display())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;
    use std::pin::Pin;
    use std::task::{Context, Poll};
    use tokio::io::{AsyncRead, ReadBuf};

    /// Yields `data` once, then fails.
    struct FailingReader {
        data: Option<Vec<u8>>,
    }

    impl AsyncRead for FailingReader {
        fn poll_read(
            mut self: Pin<&mut Self>,
            _cx: &mut Context<'_>,
            buf: &mut ReadBuf<'_>,
        ) -> Poll<io::Result<()>> {
            match self.data.take() {
                Some(data) => {
                    buf.put_slice(&data);
                    Poll::Ready(Ok(()))
                }
                None => Poll::Ready(Err(io::Error::new(
                    io::ErrorKind::ConnectionReset,
                    "connection reset",
                ))),
            }
        }
    }

    #[tokio::test]
    async fn test_upload_commits_object() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalObjectStore::new(dir.path());

        let bytes = store
            .upload("recordings/m1.mp4", "video/mp4", Box::new(&b"abcdef"[..]))
            .await
            .unwrap();

        assert_eq!(bytes, 6);
        let stored = std::fs::read(dir.path().join("recordings/m1.mp4")).unwrap();
        assert_eq!(stored, b"abcdef");
        assert!(!dir.path().join("recordings/m1.mp4.partial").exists());
    }

    #[tokio::test]
    async fn test_failed_upload_leaves_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalObjectStore::new(dir.path());

        let reader = FailingReader {
            data: Some(b"half".to_vec()),
        };
        let result = store.upload("m2.mp4", "video/mp4", Box::new(reader)).await;

        assert!(result.is_err());
        assert!(!dir.path().join("m2.mp4").exists());
        assert!(!dir.path().join("m2.mp4.partial").exists());
    }

    #[tokio::test]
    async fn test_rejects_escaping_keys() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalObjectStore::new(dir.path());

        let result = store
            .upload("../outside.mp4", "video/mp4", Box::new(&b"x"[..]))
            .await;
        assert!(result.is_err());
    }

    #[test]
    fn test_object_uri() {
        let store = LocalObjectStore::new("/srv/archive");
        assert_eq!(store.object_uri("a/b.mp4"), "file:///srv/archive/a/b.mp4");
    }
}
