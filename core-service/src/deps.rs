//! Player dependency bundle
//!
//! Hosts hand the service one [`PlayerDependencies`] value containing every
//! bridge the core needs. Desktop builds can assemble the native pieces with
//! the `local-bridges` feature; embedders with their own adapters construct
//! the bundle directly.

use std::sync::Arc;

use bridge_traits::{
    catalog::CatalogClient,
    offline::OfflineStore,
    output::AudioOutput,
    session::MediaSessionHost,
    storage::SettingsStore,
    time::{Clock, SystemClock},
};

/// Aggregated handle to all bridge dependencies the player requires.
pub struct PlayerDependencies {
    pub catalog: Arc<dyn CatalogClient>,
    pub offline: Arc<dyn OfflineStore>,
    /// Exactly two outputs: the engine alternates between them.
    pub outputs: [Arc<dyn AudioOutput>; 2],
    pub settings_store: Arc<dyn SettingsStore>,
    /// Host media-session surface; `None` for headless embedders.
    pub media_session: Option<Arc<dyn MediaSessionHost>>,
    pub clock: Arc<dyn Clock>,
}

impl PlayerDependencies {
    /// Construct a dependency bundle from explicit bridge handles, using the
    /// system clock.
    pub fn new(
        catalog: Arc<dyn CatalogClient>,
        offline: Arc<dyn OfflineStore>,
        outputs: [Arc<dyn AudioOutput>; 2],
        settings_store: Arc<dyn SettingsStore>,
    ) -> Self {
        Self {
            catalog,
            offline,
            outputs,
            settings_store,
            media_session: None,
            clock: Arc::new(SystemClock),
        }
    }

    /// Attach a host media-session surface.
    pub fn with_media_session(mut self, host: Arc<dyn MediaSessionHost>) -> Self {
        self.media_session = Some(host);
        self
    }

    /// Replace the clock (for deterministic tests).
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }
}
