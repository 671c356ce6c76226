//! Error types for the meeting recordings provider

use bridge_traits::error::BridgeError;
use thiserror::Error;

/// Meeting provider errors
#[derive(Error, Debug)]
pub enum ProviderError {
    /// The access token was refused
    #[error("Provider refused the access token (status {status_code}): {message}")]
    Unauthorized { status_code: u16, message: String },

    /// API request returned an error status
    #[error("Provider API error (status {status_code}): {message}")]
    ApiError { status_code: u16, message: String },

    /// The listing response is not a recordings page
    #[error("Malformed recordings page: {0}")]
    MalformedPage(String),

    /// Failed to parse API response
    #[error("Failed to parse API response: {0}")]
    ParseError(String),

    /// Bridge error
    #[error(transparent)]
    BridgeError(#[from] BridgeError),
}

/// Result type for provider operations
pub type Result<T> = std::result::Result<T, ProviderError>;

impl From<ProviderError> for BridgeError {
    fn from(error: ProviderError) -> Self {
        match error {
            ProviderError::Unauthorized {
                status_code,
                message,
            }
            | ProviderError::ApiError {
                status_code,
                message,
            } => BridgeError::HttpStatus {
                status: status_code,
                url: "provider API".to_string(),
                message,
            },
            ProviderError::MalformedPage(msg) => {
                BridgeError::OperationFailed(format!("Malformed recordings page: {}", msg))
            }
            ProviderError::ParseError(msg) => {
                BridgeError::OperationFailed(format!("Parse error: {}", msg))
            }
            ProviderError::BridgeError(e) => e,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let error = ProviderError::ApiError {
            status_code: 404,
            message: "Meeting not found".to_string(),
        };

        assert_eq!(
            error.to_string(),
            "Provider API error (status 404): Meeting not found"
        );
    }

    #[test]
    fn test_error_conversion_keeps_status() {
        let error = ProviderError::Unauthorized {
            status_code: 401,
            message: "Invalid access token".to_string(),
        };
        let bridge_error: BridgeError = error.into();
        assert_eq!(bridge_error.status(), Some(401));

        let bridge_error: BridgeError = ProviderError::MalformedPage("no array".into()).into();
        assert!(matches!(bridge_error, BridgeError::OperationFailed(_)));
    }
}
