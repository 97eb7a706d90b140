use thiserror::Error;

#[derive(Error, Debug)]
pub enum BridgeError {
    #[error("Bridge capability not available: {0}")]
    NotAvailable(String),

    #[error("Bridge operation failed: {0}")]
    OperationFailed(String),

    #[error("Remote request failed: {0}")]
    RequestFailed(String),

    #[error("Database error: {0}")]
    DatabaseError(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl BridgeError {
    /// Returns `true` if the failure came from a remote call and may clear up
    /// on retry.
    pub fn is_request_error(&self) -> bool {
        matches!(self, BridgeError::RequestFailed(_))
    }
}

pub type Result<T> = std::result::Result<T, BridgeError>;
