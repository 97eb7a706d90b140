//! # Playback Error Types
//!
//! Error types for source resolution, segment serving, and the dual-buffer
//! engine.

use thiserror::Error;

/// Errors that can occur during playback operations.
#[derive(Error, Debug)]
pub enum PlaybackError {
    // ========================================================================
    // Source Errors
    // ========================================================================
    /// The stream URL could not be obtained for a track.
    #[error("Audio source unavailable: {0}")]
    SourceUnavailable(String),

    /// Attempted operation when no source is loaded.
    #[error("No source loaded")]
    NoSource,

    // ========================================================================
    // Segment Errors
    // ========================================================================
    /// The stored segment manifest could not be parsed.
    #[error("Invalid segment manifest: {0}")]
    ManifestParse(String),

    // ========================================================================
    // Output Errors
    // ========================================================================
    /// The audio output refused or failed an operation.
    #[error("Audio output error: {0}")]
    OutputFailed(String),

    // ========================================================================
    // Generic Errors
    // ========================================================================
    /// Error surfaced by a host bridge.
    #[error("Bridge error: {0}")]
    Bridge(#[from] bridge_traits::BridgeError),

    /// Internal error (should not occur in normal operation).
    #[error("Internal error: {0}")]
    Internal(String),
}

impl PlaybackError {
    /// Returns `true` if this error is transient and the operation can be retried.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            PlaybackError::SourceUnavailable(_) | PlaybackError::OutputFailed(_)
        )
    }

    /// Returns `true` if this error is due to network issues.
    pub fn is_network_error(&self) -> bool {
        match self {
            PlaybackError::SourceUnavailable(_) => true,
            PlaybackError::Bridge(e) => e.is_request_error(),
            _ => false,
        }
    }
}

/// Result type for playback operations.
pub type Result<T> = std::result::Result<T, PlaybackError>;
