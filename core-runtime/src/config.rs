//! # Service Configuration
//!
//! Loads the recording sync configuration from the process environment.
//!
//! ## Overview
//!
//! Configuration is read once at startup by [`AppConfig::from_env`]. Every
//! required value is validated up front so a misconfigured deployment fails
//! before the first sync run, with an error naming the offending variable.
//! Tests drive the same parser through [`AppConfig::from_lookup`] with an
//! in-memory map instead of mutating the real environment.
//!
//! ## Usage
//!
//! ```ignore
//! use core_runtime::config::AppConfig;
//!
//! let config = AppConfig::from_env()?;
//! tracing::info!(?config, "Loaded configuration");
//! ```
//!
//! Secrets (client secret, refresh token, inline storage credentials) never
//! appear in the `Debug` output.

use crate::error::{Error, Result};
use crate::logging::{LogFormat, LoggingConfig};
use bridge_traits::time::LogLevel;
use std::collections::HashMap;
use std::fmt;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

const DEFAULT_TOKEN_PATH: &str = "/oauth/token";
const DEFAULT_LIST_PATH: &str = "/recordings";
const DEFAULT_DELETE_PATH: &str = "/recordings/{id}";
const DEFAULT_PAGE_SIZE: u32 = 300;
const MAX_PAGE_SIZE: u32 = 1000;
const DEFAULT_MAX_PAGES: u32 = 1;
const DEFAULT_LEDGER_PATH: &str = "data/transfer-status.json";
const DEFAULT_FFMPEG: &str = "ffmpeg";
const DEFAULT_SYNC_INTERVAL: Duration = Duration::from_secs(15 * 60);
const DEFAULT_HTTP_BIND: &str = "0.0.0.0:3000";

/// Where the OAuth client credentials go in the refresh request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ClientAuthMethod {
    /// `client_id` / `client_secret` form fields
    #[default]
    Body,
    /// HTTP Basic `Authorization` header
    Basic,
}

/// How the access token is attached to recording downloads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DownloadAuth {
    /// `Authorization: Bearer` header
    #[default]
    Header,
    /// `access_token` query parameter
    Query,
}

#[derive(Clone)]
pub struct OAuthSettings {
    pub token_url: String,
    pub client_id: String,
    pub client_secret: String,
    pub refresh_token: String,
    pub client_auth: ClientAuthMethod,
}

impl fmt::Debug for OAuthSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OAuthSettings")
            .field("token_url", &self.token_url)
            .field("client_id", &self.client_id)
            .field("client_secret", &"<redacted>")
            .field("refresh_token", &"<redacted>")
            .field("client_auth", &self.client_auth)
            .finish()
    }
}

#[derive(Debug, Clone)]
pub struct ProviderSettings {
    pub api_base_url: String,
    pub tenant_id: Option<String>,
    pub list_path: String,
    pub delete_path: String,
    pub page_size: u32,
    pub max_pages: u32,
    pub download_auth: DownloadAuth,
}

/// Service-account credentials for the bucket sink.
#[derive(Clone)]
pub enum CredentialsSource {
    Inline(String),
    File(PathBuf),
}

impl fmt::Debug for CredentialsSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CredentialsSource::Inline(_) => f.write_str("Inline(<redacted>)"),
            CredentialsSource::File(path) => f.debug_tuple("File").field(path).finish(),
        }
    }
}

#[derive(Debug, Clone)]
pub enum DestinationTarget {
    Bucket {
        bucket: String,
        credentials: CredentialsSource,
    },
    Directory(PathBuf),
}

#[derive(Debug, Clone)]
pub struct DestinationSettings {
    pub target: DestinationTarget,
    /// Prepended verbatim to every object key
    pub prefix: String,
}

/// Complete process configuration.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub oauth: OAuthSettings,
    pub provider: ProviderSettings,
    pub destination: DestinationSettings,
    pub delete_source_after_transfer: bool,
    pub ledger_path: PathBuf,
    pub scratch_dir: Option<PathBuf>,
    /// `None` disables remuxing of segmented recordings
    pub ffmpeg_path: Option<PathBuf>,
    pub sync_interval: Duration,
    pub http_bind: SocketAddr,
    pub logging: LoggingConfig,
}

impl AppConfig {
    /// Load configuration from the process environment.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Load configuration from an in-memory map.
    pub fn from_map(vars: &HashMap<String, String>) -> Result<Self> {
        Self::from_lookup(|name| vars.get(name).cloned())
    }

    /// Load configuration through an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let env = Env { lookup: &lookup };

        let oauth = OAuthSettings {
            token_url: env.token_url()?,
            client_id: env.required("OAUTH_CLIENT_ID")?,
            client_secret: env.required("OAUTH_CLIENT_SECRET")?,
            refresh_token: env.required("OAUTH_REFRESH_TOKEN")?,
            client_auth: env.parsed("OAUTH_CLIENT_AUTH", ClientAuthMethod::Body, |raw| {
                match raw.to_ascii_lowercase().as_str() {
                    "body" | "post" => Some(ClientAuthMethod::Body),
                    "basic" => Some(ClientAuthMethod::Basic),
                    _ => None,
                }
            })?,
        };

        let page_size = env.parsed("PROVIDER_PAGE_SIZE", DEFAULT_PAGE_SIZE, |raw| {
            raw.parse::<u32>()
                .ok()
                .filter(|n| (1..=MAX_PAGE_SIZE).contains(n))
        })?;
        let max_pages = env.parsed("PROVIDER_MAX_PAGES", DEFAULT_MAX_PAGES, |raw| {
            raw.parse::<u32>().ok().filter(|n| *n >= 1)
        })?;

        let provider = ProviderSettings {
            api_base_url: env.url("PROVIDER_API_BASE_URL")?,
            tenant_id: env.optional("PROVIDER_TENANT_ID"),
            list_path: env
                .optional("PROVIDER_LIST_PATH")
                .unwrap_or_else(|| DEFAULT_LIST_PATH.to_string()),
            delete_path: env
                .optional("PROVIDER_DELETE_PATH")
                .unwrap_or_else(|| DEFAULT_DELETE_PATH.to_string()),
            page_size,
            max_pages,
            download_auth: env.parsed("DOWNLOAD_AUTH", DownloadAuth::Header, |raw| {
                match raw.to_ascii_lowercase().as_str() {
                    "header" | "bearer" => Some(DownloadAuth::Header),
                    "query" => Some(DownloadAuth::Query),
                    _ => None,
                }
            })?,
        };

        if provider.list_path.contains("{tenant}") && provider.tenant_id.is_none() {
            return Err(Error::MissingVariable("PROVIDER_TENANT_ID".to_string()));
        }

        let destination = DestinationSettings {
            target: env.destination_target()?,
            prefix: env.optional("DESTINATION_PREFIX").unwrap_or_default(),
        };

        let delete_source_after_transfer = match env.optional("DELETE_SOURCE_AFTER_TRANSFER") {
            Some(raw) => parse_bool(&raw).ok_or_else(|| Error::InvalidVariable {
                variable: "DELETE_SOURCE_AFTER_TRANSFER".to_string(),
                message: format!("expected true or false, got '{}'", raw),
            })?,
            None => {
                return Err(Error::MissingVariable(
                    "DELETE_SOURCE_AFTER_TRANSFER".to_string(),
                ))
            }
        };

        let ffmpeg_path = match env.optional("FFMPEG_PATH") {
            Some(raw) if raw.eq_ignore_ascii_case("none") => None,
            Some(raw) => Some(PathBuf::from(raw)),
            None => Some(PathBuf::from(DEFAULT_FFMPEG)),
        };

        let sync_interval = match env.optional("SYNC_INTERVAL") {
            Some(raw) => parse_interval(&raw).ok_or_else(|| Error::InvalidVariable {
                variable: "SYNC_INTERVAL".to_string(),
                message: format!("expected seconds or a value like 30s, 15m, 1h; got '{}'", raw),
            })?,
            None => DEFAULT_SYNC_INTERVAL,
        };

        let http_bind = env
            .optional("HTTP_BIND")
            .unwrap_or_else(|| DEFAULT_HTTP_BIND.to_string());
        let http_bind = http_bind
            .parse::<SocketAddr>()
            .map_err(|e| Error::InvalidVariable {
                variable: "HTTP_BIND".to_string(),
                message: e.to_string(),
            })?;

        Ok(Self {
            oauth,
            provider,
            destination,
            delete_source_after_transfer,
            ledger_path: env
                .optional("LEDGER_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_LEDGER_PATH)),
            scratch_dir: env.optional("SCRATCH_DIR").map(PathBuf::from),
            ffmpeg_path,
            sync_interval,
            http_bind,
            logging: env.logging()?,
        })
    }
}

struct Env<'a> {
    lookup: &'a dyn Fn(&str) -> Option<String>,
}

impl Env<'_> {
    /// Non-empty, trimmed value or `None`.
    fn optional(&self, name: &str) -> Option<String> {
        (self.lookup)(name)
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    }

    fn required(&self, name: &str) -> Result<String> {
        self.optional(name)
            .ok_or_else(|| Error::MissingVariable(name.to_string()))
    }

    fn url(&self, name: &str) -> Result<String> {
        let value = self.required(name)?;
        if !(value.starts_with("http://") || value.starts_with("https://")) {
            return Err(Error::InvalidVariable {
                variable: name.to_string(),
                message: "expected an http(s) URL".to_string(),
            });
        }
        Ok(value.trim_end_matches('/').to_string())
    }

    fn parsed<T>(&self, name: &str, default: T, parse: impl Fn(&str) -> Option<T>) -> Result<T> {
        match self.optional(name) {
            Some(raw) => parse(&raw).ok_or_else(|| Error::InvalidVariable {
                variable: name.to_string(),
                message: format!("unsupported value '{}'", raw),
            }),
            None => Ok(default),
        }
    }

    fn token_url(&self) -> Result<String> {
        if self.optional("OAUTH_TOKEN_URL").is_some() {
            return self.url("OAUTH_TOKEN_URL");
        }
        let base = self
            .url("OAUTH_BASE_URL")
            .map_err(|err| match err {
                Error::MissingVariable(_) => {
                    Error::MissingVariable("OAUTH_BASE_URL or OAUTH_TOKEN_URL".to_string())
                }
                other => other,
            })?;
        let path = self
            .optional("OAUTH_TOKEN_PATH")
            .unwrap_or_else(|| DEFAULT_TOKEN_PATH.to_string());
        Ok(join_url(&base, &path))
    }

    fn destination_target(&self) -> Result<DestinationTarget> {
        let bucket = self.optional("DESTINATION_BUCKET");
        let directory = self.optional("DESTINATION_DIR");

        match (bucket, directory) {
            (Some(_), Some(_)) => Err(Error::Config(
                "Set only one of DESTINATION_BUCKET or DESTINATION_DIR".to_string(),
            )),
            (Some(bucket), None) => {
                let credentials = match (
                    self.optional("DESTINATION_CREDENTIALS"),
                    self.optional("DESTINATION_CREDENTIALS_FILE"),
                ) {
                    (Some(json), _) => CredentialsSource::Inline(json),
                    (None, Some(path)) => CredentialsSource::File(PathBuf::from(path)),
                    (None, None) => {
                        return Err(Error::MissingVariable(
                            "DESTINATION_CREDENTIALS or DESTINATION_CREDENTIALS_FILE".to_string(),
                        ))
                    }
                };
                Ok(DestinationTarget::Bucket {
                    bucket,
                    credentials,
                })
            }
            (None, Some(dir)) => Ok(DestinationTarget::Directory(PathBuf::from(dir))),
            (None, None) => Err(Error::MissingVariable(
                "DESTINATION_BUCKET or DESTINATION_DIR".to_string(),
            )),
        }
    }

    fn logging(&self) -> Result<LoggingConfig> {
        let mut config = LoggingConfig::default();
        if let Some(raw) = self.optional("LOG_FORMAT") {
            config = config.with_format(raw.parse::<LogFormat>()?);
        }
        if let Some(raw) = self.optional("LOG_LEVEL") {
            let level = raw
                .parse::<LogLevel>()
                .map_err(|message| Error::InvalidVariable {
                    variable: "LOG_LEVEL".to_string(),
                    message,
                })?;
            config = config.with_level(level);
        }
        if let Some(filter) = self.optional("LOG_FILTER") {
            config = config.with_filter(filter);
        }
        Ok(config)
    }
}

fn join_url(base: &str, path: &str) -> String {
    format!(
        "{}/{}",
        base.trim_end_matches('/'),
        path.trim_start_matches('/')
    )
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Parse `900`, `30s`, `15m` or `1h`. Zero is rejected.
pub fn parse_interval(raw: &str) -> Option<Duration> {
    let raw = raw.trim();
    let (digits, multiplier) = match raw.chars().last()? {
        's' | 'S' => (&raw[..raw.len() - 1], 1),
        'm' | 'M' => (&raw[..raw.len() - 1], 60),
        'h' | 'H' => (&raw[..raw.len() - 1], 3600),
        c if c.is_ascii_digit() => (raw, 1),
        _ => return None,
    };
    let value = digits.trim().parse::<u64>().ok()?;
    if value == 0 {
        return None;
    }
    value.checked_mul(multiplier).map(Duration::from_secs)
}
