//! Audio Output Abstraction
//!
//! An [`AudioOutput`] is one decode-and-render sink: it loads a source URL,
//! plays, pauses, seeks, and pushes lifecycle events to subscribers. The
//! engine owns exactly two outputs for its whole lifetime and alternates
//! between them; outputs are never created per track.

use async_trait::async_trait;
use tokio::sync::broadcast;

use crate::error::Result;

/// Load state of an output's current source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadyState {
    /// No source attached, or nothing fetched yet.
    Empty,
    /// Source attached, still buffering toward playable.
    Loading,
    /// Enough data buffered to start or continue playback.
    Ready,
}

/// Coarse classification of an output error, used to pick a recovery path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputErrorKind {
    /// Fetching media data failed.
    Network,
    /// The media data could not be decoded.
    Media,
    /// Anything else.
    Other,
}

/// Events an output pushes while a source is attached.
#[derive(Debug, Clone, PartialEq)]
pub enum OutputEvent {
    /// Source metadata became available.
    MetadataLoaded { duration_secs: Option<f64> },
    /// Periodic position update while playing.
    TimeUpdate {
        position_secs: f64,
        duration_secs: Option<f64>,
    },
    /// Playback started or resumed.
    Playing,
    /// Playback paused.
    Paused,
    /// The source played to its end.
    Ended,
    /// The output hit an error.
    Error {
        kind: OutputErrorKind,
        /// Fatal errors stop playback on this output until recovered;
        /// non-fatal ones are informational.
        fatal: bool,
        message: String,
    },
}

/// One audio rendering sink.
///
/// Implementations wrap the host's playback element (an HTML audio element,
/// a native player object, or a test double). All methods must be safe to
/// call in any state; operations on an output with no source are no-ops or
/// return a descriptive error, never panic.
#[async_trait]
pub trait AudioOutput: Send + Sync {
    /// Attach a source URL, replacing any previous source.
    async fn set_source(&self, url: &str) -> Result<()>;

    /// Detach the current source and release its resources.
    async fn clear_source(&self) -> Result<()>;

    /// Start or resume playback.
    ///
    /// Fails when the host refuses (e.g. autoplay restrictions); the caller
    /// decides whether that is fatal.
    async fn play(&self) -> Result<()>;

    /// Pause playback, keeping the source attached.
    async fn pause(&self) -> Result<()>;

    /// Current playback position in seconds.
    async fn position(&self) -> f64;

    /// Duration of the attached source, when known.
    async fn duration(&self) -> Option<f64>;

    /// Seek to an absolute position in seconds.
    async fn seek(&self, position_secs: f64) -> Result<()>;

    /// Set output volume in `[0.0, 1.0]`.
    async fn set_volume(&self, volume: f64) -> Result<()>;

    /// Load state of the current source.
    async fn ready_state(&self) -> ReadyState;

    /// Whether a source is currently attached.
    async fn has_source(&self) -> bool;

    /// Subscribe to this output's event stream.
    ///
    /// Each call returns an independent receiver; past events are not
    /// replayed.
    fn subscribe(&self) -> broadcast::Receiver<OutputEvent>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_event_carries_classification() {
        let event = OutputEvent::Error {
            kind: OutputErrorKind::Network,
            fatal: true,
            message: "manifest fetch failed".to_string(),
        };
        assert!(matches!(
            event,
            OutputEvent::Error {
                kind: OutputErrorKind::Network,
                fatal: true,
                ..
            }
        ));
    }
}
