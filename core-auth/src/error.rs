use thiserror::Error;

#[derive(Error, Debug)]
pub enum AuthError {
    #[error("Token endpoint unreachable: {0}")]
    Network(String),

    #[error("Token endpoint rejected the refresh credential: {error}{}", describe(.description))]
    Rejected {
        error: String,
        description: Option<String>,
    },

    #[error("Token refresh failed: {0}")]
    TokenRefreshFailed(String),

    #[error("Malformed token response: {0}")]
    MalformedResponse(String),

    #[error("Failed to encode token request: {0}")]
    Encoding(String),
}

fn describe(description: &Option<String>) -> String {
    match description {
        Some(text) if !text.is_empty() => format!(" ({})", text),
        _ => String::new(),
    }
}

pub type Result<T> = std::result::Result<T, AuthError>;
