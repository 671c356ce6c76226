//! Workspace placeholder crate.
//!
//! This crate exists to expose shared feature flags that map to the individual
//! workspace crates (e.g., `core-service`, `bridge-desktop`). Deployments can
//! depend on `recording-sync-workspace` and enable the documented features
//! without needing to wire each crate individually.
//!
//! - `gcs` (default): Google Cloud Storage destination sink.

pub use core_service::{SyncService, SyncServiceBuilder};
