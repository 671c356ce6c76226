//! # Status Ledger
//!
//! Durable record of which recordings have already been copied to the
//! destination.
//!
//! ## Format
//!
//! A single JSON object mapping recording identifiers to the RFC 3339 UTC
//! timestamp of their successful transfer:
//!
//! ```json
//! { "m1": "2024-01-01T00:00:00Z" }
//! ```
//!
//! A key being present is what counts. An entry whose timestamp does not
//! parse is still treated as transferred.
//!
//! ## Durability
//!
//! Every [`StatusLedger::mark_transferred`] rewrites the whole document to a
//! sibling `*.tmp` file, which the filesystem bridge flushes to disk, and then
//! renames it over the ledger path. A crash therefore leaves either the
//! previous or the new document, never a torn one.

use bridge_traits::storage::FileSystemAccess;
use chrono::{DateTime, SecondsFormat, Utc};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::error::{Result, SyncError};

pub struct StatusLedger {
    fs: Arc<dyn FileSystemAccess>,
    path: PathBuf,
    entries: BTreeMap<String, String>,
}

impl StatusLedger {
    /// Load the ledger at `path`.
    ///
    /// A missing file starts an empty ledger. So does an unreadable or
    /// corrupt one, with a warning: re-transferring is idempotent, refusing
    /// to run is not recoverable without an operator.
    pub async fn load(fs: Arc<dyn FileSystemAccess>, path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let entries = match Self::read_entries(fs.as_ref(), &path).await {
            Ok(Some(entries)) => {
                debug!(path = %path.display(), entries = entries.len(), "Loaded status ledger");
                entries
            }
            Ok(None) => {
                info!(path = %path.display(), "No status ledger yet, starting empty");
                BTreeMap::new()
            }
            Err(reason) => {
                warn!(path = %path.display(), %reason, "Status ledger unusable, starting empty");
                BTreeMap::new()
            }
        };

        Self { fs, path, entries }
    }

    async fn read_entries(
        fs: &dyn FileSystemAccess,
        path: &Path,
    ) -> std::result::Result<Option<BTreeMap<String, String>>, String> {
        if !fs.exists(path).await.map_err(|e| e.to_string())? {
            return Ok(None);
        }
        let raw = fs.read_file(path).await.map_err(|e| e.to_string())?;
        if raw.iter().all(u8::is_ascii_whitespace) {
            return Ok(Some(BTreeMap::new()));
        }

        let document: serde_json::Map<String, serde_json::Value> =
            serde_json::from_slice(&raw).map_err(|e| format!("invalid JSON: {}", e))?;

        // Non-string values are kept as their JSON text; presence is what matters.
        let entries = document
            .into_iter()
            .map(|(id, value)| {
                let stamp = match value {
                    serde_json::Value::String(s) => s,
                    other => other.to_string(),
                };
                (id, stamp)
            })
            .collect();
        Ok(Some(entries))
    }

    pub fn is_transferred(&self, recording_id: &str) -> bool {
        self.entries.contains_key(recording_id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Record a successful transfer and persist before returning.
    ///
    /// The in-memory entry is kept even when persisting fails, so the same
    /// run does not transfer the recording twice.
    pub async fn mark_transferred(
        &mut self,
        recording_id: &str,
        timestamp: DateTime<Utc>,
    ) -> Result<()> {
        self.entries.insert(
            recording_id.to_string(),
            timestamp.to_rfc3339_opts(SecondsFormat::Secs, true),
        );
        self.persist().await
    }

    /// Rewrite the full document atomically.
    pub async fn persist(&self) -> Result<()> {
        let document = serde_json::to_vec_pretty(&self.entries)
            .map_err(|e| SyncError::Ledger(format!("serialize: {}", e)))?;

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            self.fs
                .create_dir_all(parent)
                .await
                .map_err(|e| SyncError::Ledger(format!("create {}: {}", parent.display(), e)))?;
        }

        let staged = self.staging_path();
        self.fs
            .write_file(&staged, document.into())
            .await
            .map_err(|e| SyncError::Ledger(format!("write {}: {}", staged.display(), e)))?;
        self.fs.rename(&staged, &self.path).await.map_err(|e| {
            SyncError::Ledger(format!("replace {}: {}", self.path.display(), e))
        })?;

        debug!(path = %self.path.display(), entries = self.entries.len(), "Persisted status ledger");
        Ok(())
    }

    fn staging_path(&self) -> PathBuf {
        let mut staged = self.path.clone().into_os_string();
        staged.push(".tmp");
        PathBuf::from(staged)
    }
}
