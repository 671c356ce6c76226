//! # Authentication Module
//!
//! Exchanges a long-lived OAuth 2.0 refresh credential for a short-lived
//! access token.
//!
//! ## Overview
//!
//! Every sync run asks the [`CredentialProvider`] for a fresh
//! [`AccessToken`]. Nothing is cached between calls and nothing is retried:
//! the orchestrator decides what a failed exchange means for the run.
//!
//! ## Features
//!
//! - `refresh_token` grant with client credentials in the form body or as
//!   HTTP Basic authentication
//! - In-memory adoption of rotated refresh credentials
//! - Error classification that keeps the token endpoint's own `error` code
//! - Tokens are redacted from `Debug` output and never logged

pub mod error;
pub mod oauth;
pub mod types;

pub use core_runtime::config::ClientAuthMethod;
pub use error::{AuthError, Result};
pub use oauth::{CredentialProvider, OAuthRefreshConfig, OAuthRefreshProvider};
pub use types::AccessToken;
