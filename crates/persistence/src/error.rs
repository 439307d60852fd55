use thiserror::Error;

/// Storage errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("Session not found: {0}")]
    NotFound(String),

    #[error("Session already exists: {0}")]
    AlreadyExists(String),

    #[error("Storage backend error: {0}")]
    Backend(String),
}

impl From<StoreError> for call_agent_core::Error {
    fn from(err: StoreError) -> Self {
        call_agent_core::Error::Session(err.to_string())
    }
}
