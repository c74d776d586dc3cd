/// Error types for the service layer
use thiserror::Error;

use crate::protocol::ConnectionError;
use crate::pty::PtyError;

/// Service layer error type
#[derive(Error, Debug)]
pub enum ServiceError {
    /// Session or process absent for the given id
    #[error("Session not found: {0}")]
    NotFound(String),

    /// Rejected before any state was touched
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    /// Native process failed to start
    #[error("Process spawn failed: {0}")]
    ProcessSpawn(#[from] PtyError),

    /// Protocol send/receive failure
    #[error("Transport error: {0}")]
    Transport(#[from] ConnectionError),
}

impl ServiceError {
    /// Stable machine-readable code
    pub fn code(&self) -> &'static str {
        match self {
            ServiceError::NotFound(_) => "NOT_FOUND",
            ServiceError::InvalidParameter(_) => "INVALID_PARAMETER",
            ServiceError::ProcessSpawn(_) => "PROCESS_SPAWN_FAILED",
            ServiceError::Transport(_) => "TRANSPORT_FAILURE",
        }
    }
}

/// Result type for the service layer
pub type ServiceResult<T> = Result<T, ServiceError>;
