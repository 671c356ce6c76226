//! # Meeting Recordings Provider
//!
//! Implements `RecordingProvider` for a meeting-platform REST API.
//!
//! ## Overview
//!
//! This module provides:
//! - Recording listing with bounded pagination
//! - A shape adapter that normalises the field-name variants seen across
//!   provider API versions into [`Recording`](bridge_traits::storage::Recording)
//! - Readiness normalisation (`completed`, `processing`, ...)
//! - Source-recording deletion after a confirmed transfer
//! - Exponential backoff for rate limiting and transient server errors

pub mod connector;
pub mod error;
pub mod types;

pub use connector::{ConnectorConfig, MeetingRecordingsConnector};
pub use error::{ProviderError, Result};
