//! # Core Runtime Module
//!
//! Provides foundational runtime infrastructure for the recording sync service:
//! - Logging and tracing infrastructure
//! - Environment-driven configuration
//!
//! ## Overview
//!
//! This crate contains the runtime utilities that other crates depend on. It
//! loads and validates the process configuration once at startup and
//! establishes the logging conventions used throughout the workspace.

pub mod config;
pub mod error;
pub mod logging;

pub use error::{Error, Result};
