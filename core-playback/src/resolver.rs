//! Streaming source resolution.
//!
//! Decides where the audio for a track comes from and in which mode it is
//! delivered. Offline artifacts always win and dictate the mode; otherwise
//! the configured bitrate decides between the segmented transcode tiers and
//! direct source-quality streaming.

use bridge_traits::catalog::{CatalogClient, StreamSelection, Track};
use bridge_traits::offline::{OfflinePlayable, OfflineSourceKind, OfflineStore};
use tracing::{debug, warn};

use crate::error::Result;

/// Bitrates served as segmented transcodes. Anything else streams the
/// original file directly.
pub const SEGMENTED_BITRATES: [u32; 4] = [128_000, 192_000, 256_000, 320_000];

/// Delivery mode of a resolved source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceMode {
    /// Single progressive stream of the original file.
    Direct,
    /// Segment-manifest stream at a transcode tier.
    Segmented,
}

/// A playable source for one track.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedSource {
    pub url: String,
    pub mode: SourceMode,
    /// Set when the source came from local offline storage.
    pub from_offline: bool,
}

/// Whether a configured bitrate selects a segmented transcode.
pub fn is_segmented_bitrate(bitrate: u32) -> bool {
    SEGMENTED_BITRATES.contains(&bitrate)
}

/// Resolve the source for a track.
///
/// Offline storage is consulted first; a stored artifact is used as-is and
/// its stored form dictates the mode. Online, a bitrate matching one of the
/// [`SEGMENTED_BITRATES`] tiers requests a segmented transcode, anything
/// else the direct stream. Offline lookup failures degrade to online
/// resolution with a warning.
pub async fn resolve_source(
    track: &Track,
    bitrate: Option<u32>,
    offline: &dyn OfflineStore,
    catalog: &dyn CatalogClient,
) -> Result<ResolvedSource> {
    match offline.playable_source(&track.id).await {
        Ok(Some(playable)) => {
            debug!(track_id = %track.id, "Using offline source");
            return Ok(resolved_from_offline(playable));
        }
        Ok(None) => {}
        Err(e) => {
            warn!(track_id = %track.id, error = %e, "Offline lookup failed, resolving online");
        }
    }

    let selection = match bitrate {
        Some(bitrate) if is_segmented_bitrate(bitrate) => StreamSelection::Segmented { bitrate },
        _ => StreamSelection::Direct,
    };
    let mode = match selection {
        StreamSelection::Direct => SourceMode::Direct,
        StreamSelection::Segmented { .. } => SourceMode::Segmented,
    };

    let url = catalog.stream_url(&track.id, selection).await?;
    debug!(track_id = %track.id, ?mode, "Resolved online source");
    Ok(ResolvedSource {
        url,
        mode,
        from_offline: false,
    })
}

fn resolved_from_offline(playable: OfflinePlayable) -> ResolvedSource {
    let mode = match playable.kind {
        OfflineSourceKind::Direct => SourceMode::Direct,
        OfflineSourceKind::SegmentManifest => SourceMode::Segmented,
    };
    ResolvedSource {
        url: playable.url,
        mode,
        from_offline: true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use bridge_traits::catalog::{ListRequest, TrackPage};
    use bridge_traits::offline::StoredSegments;
    use bridge_traits::BridgeError;

    fn track(id: &str) -> Track {
        Track {
            id: id.to_string(),
            title: id.to_string(),
            artists: vec![],
            album: None,
            album_artist: None,
            run_length_secs: 60.0,
            favorite: false,
            container: None,
            codec: None,
            artwork_item_id: None,
        }
    }

    struct StubOffline {
        playable: Option<OfflinePlayable>,
        fail: bool,
    }

    #[async_trait]
    impl OfflineStore for StubOffline {
        async fn playable_source(
            &self,
            _track_id: &str,
        ) -> bridge_traits::error::Result<Option<OfflinePlayable>> {
            if self.fail {
                return Err(BridgeError::OperationFailed("disk".to_string()));
            }
            Ok(self.playable.clone())
        }

        async fn stored_segments(
            &self,
            _track_id: &str,
        ) -> bridge_traits::error::Result<Option<StoredSegments>> {
            Ok(None)
        }
    }

    struct StubCatalog;

    #[async_trait]
    impl CatalogClient for StubCatalog {
        async fn fetch_list(
            &self,
            _request: &ListRequest,
        ) -> bridge_traits::error::Result<TrackPage> {
            Ok(TrackPage::empty())
        }

        async fn stream_url(
            &self,
            track_id: &str,
            selection: StreamSelection,
        ) -> bridge_traits::error::Result<String> {
            Ok(match selection {
                StreamSelection::Direct => format!("https://host/audio/{track_id}/direct"),
                StreamSelection::Segmented { bitrate } => {
                    format!("https://host/audio/{track_id}/main.m3u8?bitrate={bitrate}")
                }
            })
        }

        fn artwork_url(&self, _track: &Track, _max_width: u32) -> Option<String> {
            None
        }

        async fn report_playback_start(&self, _track_id: &str) -> bridge_traits::error::Result<()> {
            Ok(())
        }

        async fn report_playback_progress(
            &self,
            _track_id: &str,
            _position_secs: f64,
            _paused: bool,
        ) -> bridge_traits::error::Result<()> {
            Ok(())
        }

        async fn report_playback_stopped(
            &self,
            _track_id: &str,
            _position_secs: f64,
        ) -> bridge_traits::error::Result<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn offline_artifact_wins_and_sets_mode() {
        let offline = StubOffline {
            playable: Some(OfflinePlayable {
                url: "file:///cache/t1/main.m3u8".to_string(),
                kind: OfflineSourceKind::SegmentManifest,
            }),
            fail: false,
        };

        let source = resolve_source(&track("t1"), None, &offline, &StubCatalog)
            .await
            .unwrap();
        assert!(source.from_offline);
        assert_eq!(source.mode, SourceMode::Segmented);
        assert_eq!(source.url, "file:///cache/t1/main.m3u8");
    }

    #[tokio::test]
    async fn tier_bitrate_selects_segmented() {
        let offline = StubOffline {
            playable: None,
            fail: false,
        };

        let source = resolve_source(&track("t1"), Some(192_000), &offline, &StubCatalog)
            .await
            .unwrap();
        assert_eq!(source.mode, SourceMode::Segmented);
        assert!(!source.from_offline);
        assert!(source.url.contains("main.m3u8"));
    }

    #[tokio::test]
    async fn off_tier_bitrate_streams_direct() {
        let offline = StubOffline {
            playable: None,
            fail: false,
        };

        for bitrate in [None, Some(96_000), Some(500_000)] {
            let source = resolve_source(&track("t1"), bitrate, &offline, &StubCatalog)
                .await
                .unwrap();
            assert_eq!(source.mode, SourceMode::Direct);
        }
    }

    #[tokio::test]
    async fn offline_failure_degrades_to_online() {
        let offline = StubOffline {
            playable: None,
            fail: true,
        };

        let source = resolve_source(&track("t1"), None, &offline, &StubCatalog)
            .await
            .unwrap();
        assert!(!source.from_offline);
        assert_eq!(source.mode, SourceMode::Direct);
    }

    #[test]
    fn tier_table_is_exact() {
        for bitrate in SEGMENTED_BITRATES {
            assert!(is_segmented_bitrate(bitrate));
        }
        assert!(!is_segmented_bitrate(128_001));
        assert!(!is_segmented_bitrate(64_000));
    }
}
