//! # Recording Sync Core
//!
//! Copies finished meeting recordings into an object store, exactly once.
//!
//! ## Overview
//!
//! This crate owns the business logic of a sync run:
//! - Acquiring a fresh access token per run via `CredentialProvider`
//! - Listing recordings via `RecordingProvider`
//! - Choosing between direct streaming and segmented reassembly per recording
//! - Recording completed transfers in a durable status ledger
//! - Publishing a run summary for status polling
//!
//! ## Components
//!
//! - **Status Ledger** (`ledger`): JSON map of transferred recording ids, rewritten atomically
//! - **Transfer Strategy** (`transfer`): Skip / direct / segmented decision and the direct path
//! - **Segmented Reassembly** (`segmented`): HLS playlist parsing, segment concatenation, remux
//! - **Run Summary** (`summary`): Serializable state of the last run
//! - **Sync Orchestrator** (`coordinator`): Single-flight run loop tying the above together

pub mod coordinator;
pub mod error;
pub mod ledger;
pub mod segmented;
pub mod summary;
pub mod transfer;

pub use coordinator::{SyncConfig, SyncDependencies, SyncOrchestrator};
pub use error::{Result, SyncError};
pub use ledger::StatusLedger;
pub use segmented::{FfmpegRemuxer, Playlist, PlaylistError, SegmentedAssembler};
pub use summary::{RunStatus, RunSummary};
pub use transfer::{
    encode_key_component, object_key, LengthCheckedReader, RecordingTransfer, SkipReason,
    TransferConfig, TransferOutcome, TransferPlan, TransferStrategy,
};
