use thiserror::Error;

/// Errors that can occur in session reporting and media-session integration.
#[derive(Error, Debug)]
pub enum SessionError {
    /// A playback report could not be delivered.
    #[error("Report delivery failed: {0}")]
    ReportFailed(String),

    /// The media-session host rejected an operation.
    #[error("Media session error: {0}")]
    MediaSession(String),

    /// Error surfaced by a host bridge.
    #[error("Bridge error: {0}")]
    Bridge(#[from] bridge_traits::BridgeError),
}

impl SessionError {
    /// Returns `true` if this error is due to network issues and the report
    /// can simply be retried on the next tick.
    pub fn is_network_error(&self) -> bool {
        match self {
            SessionError::ReportFailed(_) => true,
            SessionError::Bridge(e) => e.is_request_error(),
            SessionError::MediaSession(_) => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, SessionError>;
