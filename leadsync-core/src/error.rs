//! Error types for the leadsync engine.

use thiserror::Error;
use uuid::Uuid;

/// Errors that can occur during synchronization.
#[derive(Error, Debug)]
pub enum SyncError {
    #[error("CRM API error {status}: {body}")]
    Api { status: u16, body: String },

    #[error("CRM request timed out after {0}s")]
    Timeout(u64),

    #[error("CRM transport error: {0}")]
    Transport(String),

    #[error("Tenant {0} has no usable API credential")]
    Credentials(Uuid),

    #[error("Lead not found: {0}")]
    LeadNotFound(Uuid),

    #[error("Tenant not found: {0}")]
    TenantNotFound(Uuid),

    #[error("Store error: {0}")]
    Store(String),

    #[error("Missing required field: {0}")]
    MissingField(&'static str),

    #[error("Invalid time value: {0}")]
    InvalidTime(String),
}

impl From<reqwest::Error> for SyncError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            SyncError::Timeout(crate::crm::REQUEST_TIMEOUT.as_secs())
        } else {
            SyncError::Transport(err.to_string())
        }
    }
}

/// Result type alias for sync operations.
pub type SyncResult<T> = Result<T, SyncError>;
