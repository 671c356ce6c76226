//! # Host Bridge Traits
//!
//! Capability traits that separate the sync core from concrete I/O.
//!
//! ## Overview
//!
//! This crate defines the contract between the sync core and the adapters that
//! talk to the outside world. Each trait represents a capability the core
//! requires but that is implemented elsewhere (`bridge-desktop`,
//! `provider-meetings`) or by test doubles.
//!
//! ## Traits
//!
//! ### Networking & I/O
//! - [`HttpClient`](http::HttpClient) - Async HTTP operations with retry policy and streaming downloads
//! - [`FileSystemAccess`](storage::FileSystemAccess) - Local file I/O for the status ledger and scratch space
//!
//! ### Transfer endpoints
//! - [`RecordingProvider`](storage::RecordingProvider) - Lists recordings held by the meeting provider
//! - [`ObjectSink`](storage::ObjectSink) - Destination object store that accepts a byte stream per key
//!
//! ### Utilities
//! - [`Clock`](time::Clock) - Time source for deterministic testing
//!
//! ## Error Handling
//!
//! All bridge traits use the [`BridgeError`](error::BridgeError) type. Adapters
//! should convert their native errors into `BridgeError` with enough context
//! (URL, key, path) for an operator to act on the message.
//!
//! ## Thread Safety
//!
//! All bridge traits require `Send + Sync` so implementations can be shared
//! across spawned tasks behind an `Arc`.

pub mod error;
pub mod http;
pub mod storage;
pub mod time;

pub use error::BridgeError;

// Re-export commonly used types
pub use http::{HttpClient, HttpMethod, HttpRequest, HttpResponse, RetryPolicy};
pub use storage::{
    DynAsyncRead, FileSystemAccess, ObjectSink, ReadinessState, Recording, RecordingProvider,
};
pub use time::{Clock, LogLevel, SystemClock};
