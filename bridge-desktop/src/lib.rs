//! # Desktop Bridge Implementations
//!
//! Default implementations of bridge traits for server and desktop hosts.
//!
//! ## Overview
//!
//! This crate provides production-ready implementations of the bridge traits:
//! - `HttpClient` using `reqwest`
//! - `FileSystemAccess` using `tokio::fs`
//! - `ObjectSink` backed by a local directory
//! - `ObjectSink` backed by Google Cloud Storage (`gcs` feature)
//!
//! ## Feature Flags
//!
//! - `gcs`: Enable the Google Cloud Storage sink (default)
//!
//! ## Usage
//!
//! ```ignore
//! use bridge_desktop::{LocalObjectStore, ReqwestHttpClient, TokioFileSystem};
//!
//! #[tokio::main]
//! async fn main() -> bridge_traits::error::Result<()> {
//!     let http_client = ReqwestHttpClient::new()?;
//!     let fs = TokioFileSystem::new();
//!     let sink = LocalObjectStore::new("/srv/recordings");
//!
//!     // Hand these to the sync service builder
//!     Ok(())
//! }
//! ```

mod filesystem;
mod http;
mod object_store;

#[cfg(feature = "gcs")]
mod gcs;

pub use filesystem::TokioFileSystem;
pub use http::ReqwestHttpClient;
pub use object_store::LocalObjectStore;

#[cfg(feature = "gcs")]
pub use gcs::{parse_service_account, GcsObjectStore, ServiceAccountKey};
