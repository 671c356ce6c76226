use bridge_traits::BridgeError;
use core_auth::AuthError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SyncError {
    /// Credential exchange failed; fatal to the run
    #[error("Authentication failed: {0}")]
    Auth(#[from] AuthError),

    /// Recording listing failed; fatal to the run
    #[error("Listing recordings failed: {0}")]
    List(#[source] BridgeError),

    /// One recording could not be transferred; the run continues
    #[error("Transfer of recording {recording_id} failed: {reason}")]
    Transfer {
        recording_id: String,
        reason: String,
    },

    #[error("Status ledger error: {0}")]
    Ledger(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl SyncError {
    pub fn transfer(recording_id: impl Into<String>, reason: impl ToString) -> Self {
        SyncError::Transfer {
            recording_id: recording_id.into(),
            reason: reason.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, SyncError>;
