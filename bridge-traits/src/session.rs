//! Media Session Host Abstraction
//!
//! The host's now-playing integration: metadata shown on lock screens and
//! system overlays, plus transport commands coming back from hardware keys,
//! headsets, and OS media controls.

use tokio::sync::broadcast;

use crate::error::Result;

/// Metadata pushed to the host's now-playing surface.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct NowPlaying {
    pub title: String,
    pub artist: String,
    pub album: Option<String>,
    pub artwork_url: Option<String>,
}

/// Transport state mirrored to the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportState {
    Playing,
    Paused,
    /// Nothing loaded; the host may hide its controls.
    None,
}

/// A transport command issued by the host.
#[derive(Debug, Clone, PartialEq)]
pub enum TransportCommand {
    Play,
    Pause,
    NextTrack,
    PreviousTrack,
    SeekTo(f64),
}

/// Host-side media session surface.
///
/// Implementations forward metadata and state to the platform and translate
/// platform callbacks into [`TransportCommand`]s. The adapter in
/// `core-session` owns the subscribe/forward lifecycle so commands land on
/// the same handlers the UI uses.
pub trait MediaSessionHost: Send + Sync {
    /// Replace the displayed metadata.
    fn set_metadata(&self, now_playing: &NowPlaying) -> Result<()>;

    /// Mirror the player's transport state.
    fn set_transport_state(&self, state: TransportState) -> Result<()>;

    /// Clear metadata and hide the session.
    fn clear(&self) -> Result<()>;

    /// Subscribe to transport commands from the host.
    fn commands(&self) -> broadcast::Receiver<TransportCommand>;

    /// Subscribe to audio device change notifications (e.g. headphones
    /// unplugged). Hosts without the signal may return a receiver that never
    /// yields.
    fn device_changes(&self) -> broadcast::Receiver<()>;
}
