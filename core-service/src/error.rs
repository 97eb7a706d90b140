use thiserror::Error;

#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("Service initialization failed: {0}")]
    InitializationFailed(String),

    #[error("Queue error: {0}")]
    Queue(#[from] core_queue::QueueError),

    #[error("Playback error: {0}")]
    Playback(#[from] core_playback::PlaybackError),

    #[error("Session error: {0}")]
    Session(#[from] core_session::SessionError),

    #[error("Settings error: {0}")]
    Settings(#[from] core_runtime::Error),

    #[error("Bridge error: {0}")]
    Bridge(#[from] bridge_traits::BridgeError),
}

pub type Result<T> = std::result::Result<T, ServiceError>;
