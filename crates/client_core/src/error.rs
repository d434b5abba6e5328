use shared::{
    domain::{PurifierId, ValidationError},
    error::ErrorCode,
};
use thiserror::Error;

/// Rejections reported to the caller; registry state is left untouched.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    #[error("invalid purifier: {0}")]
    Validation(#[from] ValidationError),
    #[error("purifier {0} not found")]
    NotFound(String),
}

/// Failure of a call to the remote record service. Never fatal for the registry.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SyncError {
    #[error("record service request failed: {0}")]
    Transport(String),
    #[error("record service answered {status}: {message}")]
    Status {
        status: u16,
        code: Option<ErrorCode>,
        message: String,
    },
    #[error("record service response could not be decoded: {0}")]
    Decode(String),
    #[error("record service returned purifier {returned} for a request on {requested}")]
    Mismatch {
        requested: PurifierId,
        returned: PurifierId,
    },
    #[error("record service returned an invalid purifier: {0}")]
    InvalidRecord(ValidationError),
}

impl From<reqwest::Error> for SyncError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            Self::Decode(err.to_string())
        } else {
            Self::Transport(err.to_string())
        }
    }
}
