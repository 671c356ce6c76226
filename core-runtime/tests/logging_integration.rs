//! Integration tests for logging system

use bridge_traits::time::LogLevel;
use core_runtime::logging::{init_logging, redact_url, LogFormat, LoggingConfig};
use core_runtime::Error;

#[test]
fn test_logging_initializes_once() {
    let config = LoggingConfig::default()
        .with_format(LogFormat::Compact)
        .with_level(LogLevel::Debug);

    assert!(init_logging(config.clone()).is_ok());
    // The global subscriber can only be installed once per process
    assert!(init_logging(config).is_err());

    tracing::info!(url = %redact_url("https://cdn.example.com/r.mp4?sig=abc"), "logging ready");
}

#[test]
fn test_invalid_custom_filter_is_config_error() {
    let config = LoggingConfig::default().with_filter("core_sync=loudest");
    assert!(matches!(init_logging(config), Err(Error::Config(_))));
}

#[test]
fn test_download_urls_lose_query_and_fragment() {
    // Signed links
    assert_eq!(
        redact_url("https://cdn.example.com/rec/1.mp4?X-Amz-Signature=abc&access_token=t"),
        "https://cdn.example.com/rec/1.mp4"
    );
    assert_eq!(
        redact_url("https://media.example.com/h1/index.m3u8#t=10"),
        "https://media.example.com/h1/index.m3u8"
    );

    // Nothing to strip
    assert_eq!(
        redact_url("https://cdn.example.com/rec/1.mp4"),
        "https://cdn.example.com/rec/1.mp4"
    );
    assert_eq!(redact_url(""), "");
}

#[test]
fn test_filter_configuration() {
    let config = LoggingConfig::default().with_filter("core_auth=debug,core_sync=trace");

    assert_eq!(
        config.filter,
        Some("core_auth=debug,core_sync=trace".to_string())
    );
}

#[test]
fn test_config_chaining() {
    let config = LoggingConfig::default()
        .with_format(LogFormat::Json)
        .with_level(LogLevel::Warn)
        .with_spans(false)
        .with_target(false)
        .with_thread_info(true);

    assert_eq!(config.format, LogFormat::Json);
    assert_eq!(config.level, LogLevel::Warn);
    assert!(!config.enable_spans);
    assert!(!config.display_target);
    assert!(config.display_thread_info);
}
