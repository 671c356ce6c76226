use serde::Deserialize;
use std::fmt;

/// Short-lived bearer credential for the meeting provider API.
///
/// Obtained once per sync run and dropped with it. The value is never
/// persisted and never logged: `Debug` prints a placeholder and there is no
/// `Display` implementation, so `%token` in a tracing macro does not compile.
///
/// # Examples
///
/// ```
/// use core_auth::AccessToken;
///
/// let token = AccessToken::new("eyJhbGciOi...");
/// assert_eq!(format!("{:?}", token), "AccessToken(<redacted>)");
/// assert_eq!(token.secret(), "eyJhbGciOi...");
/// ```
#[derive(Clone, PartialEq, Eq)]
pub struct AccessToken(String);

impl AccessToken {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// The raw bearer value, for building request headers only.
    pub fn secret(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("AccessToken(<redacted>)")
    }
}

/// Successful token endpoint response.
#[derive(Deserialize)]
pub(crate) struct TokenResponse {
    #[serde(default)]
    pub access_token: Option<String>,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub expires_in: Option<i64>,
}

/// Error payload returned by the token endpoint (RFC 6749 §5.2).
#[derive(Deserialize)]
pub(crate) struct TokenErrorResponse {
    pub error: serde_json::Value,
    #[serde(default)]
    pub error_description: Option<String>,
    #[serde(default)]
    pub reason: Option<String>,
}

impl TokenErrorResponse {
    /// Error code as text, or `None` when the field is null.
    pub fn code(&self) -> Option<String> {
        match &self.error {
            serde_json::Value::Null => None,
            serde_json::Value::String(code) => Some(code.clone()),
            other => Some(other.to_string()),
        }
    }

    pub fn description(&self) -> Option<String> {
        self.error_description
            .clone()
            .or_else(|| self.reason.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_access_token_debug_is_redacted() {
        let token = AccessToken::new("very-secret");
        let rendered = format!("{:?}", token);
        assert!(!rendered.contains("very-secret"));
        assert_eq!(token.secret(), "very-secret");
    }

    #[test]
    fn test_token_response_deserialization() {
        let json = r#"{
            "access_token": "at",
            "refresh_token": "rt",
            "expires_in": 3599,
            "token_type": "bearer",
            "scope": "recording:read"
        }"#;

        let response: TokenResponse = serde_json::from_str(json).unwrap();
        assert_eq!(response.access_token.as_deref(), Some("at"));
        assert_eq!(response.refresh_token.as_deref(), Some("rt"));
        assert_eq!(response.expires_in, Some(3599));
    }

    #[test]
    fn test_error_response_variants() {
        let response: TokenErrorResponse =
            serde_json::from_str(r#"{"error":"invalid_grant","reason":"Invalid Token!"}"#)
                .unwrap();
        assert_eq!(response.code().as_deref(), Some("invalid_grant"));
        assert_eq!(response.description().as_deref(), Some("Invalid Token!"));

        let response: TokenErrorResponse =
            serde_json::from_str(r#"{"error":{"code":4700}}"#).unwrap();
        assert_eq!(response.code().as_deref(), Some(r#"{"code":4700}"#));

        let response: TokenErrorResponse = serde_json::from_str(r#"{"error":null}"#).unwrap();
        assert!(response.code().is_none());
    }
}
