//! # Sync Orchestrator
//!
//! Runs one pass of "copy every new, finished recording to the destination".
//!
//! ## Overview
//!
//! A run:
//! 1. Acquires a fresh access token from the [`CredentialProvider`]
//! 2. Loads the [`StatusLedger`]
//! 3. Lists recordings from the [`RecordingProvider`]
//! 4. For each recording not yet in the ledger, in order, asks the
//!    [`RecordingTransfer`] to move it, marking the ledger after each success
//! 5. Optionally deletes the source recording once it is marked
//! 6. Publishes a [`RunSummary`]
//!
//! Credential and listing failures end the run in [`RunStatus::Error`].
//! A failure on one recording is logged and counted; the run continues.
//!
//! ## Concurrency
//!
//! At most one run is in progress per orchestrator. A caller that arrives
//! while a run is active gets the in-progress summary back and nothing else
//! happens. The guard is released on every exit path, including panics.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use core_sync::SyncOrchestrator;
//! use std::sync::Arc;
//!
//! let orchestrator = Arc::new(SyncOrchestrator::new(deps, config));
//!
//! // Fire and forget; poll sync_status() for the outcome.
//! let summary = orchestrator.trigger();
//! assert!(summary.is_running());
//! ```

use bridge_traits::storage::{FileSystemAccess, RecordingProvider};
use bridge_traits::time::Clock;
use core_auth::CredentialProvider;
use futures::FutureExt;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};
use tracing::{debug, error, info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::ledger::StatusLedger;
use crate::summary::{RunStatus, RunSummary};
use crate::transfer::{RecordingTransfer, TransferOutcome};
use crate::{Result, SyncError};

/// Orchestrator settings.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Path of the JSON status ledger
    pub ledger_path: PathBuf,
    /// Delete the provider's copy after a confirmed transfer
    pub delete_source_after_transfer: bool,
}

/// Collaborators the orchestrator drives.
#[derive(Clone)]
pub struct SyncDependencies {
    pub credentials: Arc<dyn CredentialProvider>,
    pub provider: Arc<dyn RecordingProvider>,
    pub transfer: Arc<dyn RecordingTransfer>,
    pub filesystem: Arc<dyn FileSystemAccess>,
    pub clock: Arc<dyn Clock>,
}

/// Holds the single-flight flag for the lifetime of a run.
struct RunGuard {
    flag: Arc<AtomicBool>,
}

impl RunGuard {
    fn try_acquire(flag: &Arc<AtomicBool>) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self { flag: flag.clone() })
    }
}

impl Drop for RunGuard {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::Release);
    }
}

#[derive(Debug, Default)]
struct RunCounts {
    processed: u32,
    failed: u32,
    skipped: u32,
}

/// Single-flight sync coordinator. See the module docs.
pub struct SyncOrchestrator {
    deps: SyncDependencies,
    config: SyncConfig,
    running: Arc<AtomicBool>,
    summary: RwLock<RunSummary>,
}

impl SyncOrchestrator {
    pub fn new(deps: SyncDependencies, config: SyncConfig) -> Self {
        let summary = RunSummary::idle(deps.clock.now());
        Self {
            deps,
            config,
            running: Arc::new(AtomicBool::new(false)),
            summary: RwLock::new(summary),
        }
    }

    /// Latest summary. Never waits for a run to finish.
    pub fn sync_status(&self) -> RunSummary {
        self.summary
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Run a sync pass to completion and return its final summary.
    ///
    /// Returns the in-progress summary immediately when another run holds
    /// the guard. Never fails: errors are recorded in the summary.
    pub async fn run_sync(&self) -> RunSummary {
        match self.begin_run() {
            Ok((guard, run_id, _)) => self.execute(guard, run_id).await,
            Err(current) => {
                debug!("Sync already in progress, returning current summary");
                current
            }
        }
    }

    /// Start a run in the background and return without waiting for it.
    ///
    /// The guard is claimed before this returns, so the returned summary is
    /// `Running` either for the new run or for one already in progress.
    /// Must be called from within a Tokio runtime.
    pub fn trigger(self: &Arc<Self>) -> RunSummary {
        let (guard, run_id, started) = match self.begin_run() {
            Ok(claimed) => claimed,
            Err(current) => {
                debug!("Sync already in progress, trigger ignored");
                return current;
            }
        };

        let this = Arc::clone(self);
        tokio::spawn(async move {
            this.execute(guard, run_id).await;
        });
        started
    }

    /// Claim the guard and publish the `Running` summary as one step.
    ///
    /// Both happen under the summary write lock, so a caller that loses the
    /// race reads the new run's summary, never the previous one. On `Err`
    /// the current summary is returned.
    fn begin_run(&self) -> std::result::Result<(RunGuard, String, RunSummary), RunSummary> {
        let mut summary = self
            .summary
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        match RunGuard::try_acquire(&self.running) {
            Some(guard) => {
                let run_id = Uuid::new_v4().to_string();
                *summary = RunSummary::started(&run_id, self.deps.clock.now());
                Ok((guard, run_id, summary.clone()))
            }
            None => Err(summary.clone()),
        }
    }

    async fn execute(&self, guard: RunGuard, run_id: String) -> RunSummary {
        let span = info_span!("sync_run", run_id = %run_id);

        async {
            info!("Sync run started");
            let outcome = AssertUnwindSafe(self.run_pass()).catch_unwind().await;
            let now = self.deps.clock.now();

            match outcome {
                Ok(Ok(counts)) => {
                    self.update_summary(|s| s.complete(now));
                    info!(
                        processed = counts.processed,
                        failed = counts.failed,
                        skipped = counts.skipped,
                        "Sync run completed"
                    );
                }
                Ok(Err(e)) => {
                    error!(error = %e, "Sync run failed");
                    self.update_summary(|s| s.fail(e.to_string(), now));
                }
                Err(panic) => {
                    let message = format!("Sync run panicked: {}", panic_message(panic.as_ref()));
                    error!("{}", message);
                    self.update_summary(|s| s.fail(message, now));
                }
            }
        }
        .instrument(span)
        .await;

        drop(guard);
        self.sync_status()
    }

    async fn run_pass(&self) -> Result<RunCounts> {
        let token = self.deps.credentials.acquire_token().await?;
        debug!("Access token acquired");

        let mut ledger =
            StatusLedger::load(self.deps.filesystem.clone(), self.config.ledger_path.clone())
                .await;

        let recordings = self
            .deps
            .provider
            .list_recordings(token.secret())
            .await
            .map_err(SyncError::List)?;
        info!(
            count = recordings.len(),
            ledger_entries = ledger.len(),
            "Recordings listed"
        );
        let total = u32::try_from(recordings.len()).unwrap_or(u32::MAX);
        self.update_summary(|s| {
            s.total_recordings = total;
        });

        let mut counts = RunCounts::default();
        for recording in &recordings {
            if ledger.is_transferred(&recording.id) {
                debug!(recording_id = %recording.id, "Already transferred");
                continue;
            }

            match self.deps.transfer.transfer(recording, &token).await {
                Ok(TransferOutcome::Transferred { key, bytes }) => {
                    if let Err(e) = ledger
                        .mark_transferred(&recording.id, self.deps.clock.now())
                        .await
                    {
                        error!(
                            recording_id = %recording.id,
                            error = %e,
                            "Stored recording but failed to persist ledger"
                        );
                    }
                    counts.processed += 1;
                    let processed = counts.processed;
                    self.update_summary(|s| s.processed_count = processed);
                    debug!(recording_id = %recording.id, key = %key, bytes, "Recording marked transferred");

                    if self.config.delete_source_after_transfer {
                        if let Err(e) = self
                            .deps
                            .provider
                            .delete_recording(token.secret(), &recording.id)
                            .await
                        {
                            warn!(
                                recording_id = %recording.id,
                                error = %e,
                                "Failed to delete source recording"
                            );
                        }
                    }
                }
                Ok(TransferOutcome::Skipped(reason)) => {
                    counts.skipped += 1;
                    let skipped = counts.skipped;
                    self.update_summary(|s| s.skipped_count = skipped);
                    debug!(recording_id = %recording.id, %reason, "Recording skipped");
                }
                Err(e) => {
                    counts.failed += 1;
                    let failed = counts.failed;
                    self.update_summary(|s| s.failed_count = failed);
                    error!(recording_id = %recording.id, error = %e, "Recording transfer failed");
                }
            }
        }

        Ok(counts)
    }

    fn update_summary(&self, apply: impl FnOnce(&mut RunSummary)) {
        let now = self.deps.clock.now();
        let mut summary = self
            .summary
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        apply(&mut summary);
        if summary.status == RunStatus::Running {
            summary.timestamp = now;
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    payload
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("unknown panic")
}
