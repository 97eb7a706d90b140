//! Segmented stream decoding configuration and error recovery.
//!
//! The decoder sits between a resolved source and an audio output slot. It
//! keeps the forward buffering window deliberately small so bitrate changes
//! and skips do not discard much fetched audio, and it classifies fatal
//! output errors into the recovery action the engine should take.

use std::sync::Arc;

use bridge_traits::offline::StoredSegments;
use bridge_traits::output::{AudioOutput, OutputErrorKind};
use bytes::Bytes;
use tracing::debug;

use crate::error::Result;
use crate::segments::OfflineSegmentLoader;

/// Buffering windows for segmented playback, in seconds of audio held ahead
/// of the playhead.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DecoderConfig {
    /// Target forward buffer.
    pub max_buffer_secs: f64,
    /// Hard cap on the forward buffer.
    pub max_max_buffer_secs: f64,
}

impl Default for DecoderConfig {
    fn default() -> Self {
        Self {
            max_buffer_secs: 10.0,
            max_max_buffer_secs: 20.0,
        }
    }
}

/// What the engine should do after a fatal output error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecoveryAction {
    /// Tear down and mark the track for re-resolution on the next resume.
    Reload,
    /// Ask the output to recover without losing the loaded source.
    RecoverInPlace,
    /// Non-fatal; log and continue.
    LogOnly,
}

/// Classify an output error into a recovery action.
///
/// Fatal media errors are recoverable in place; fatal network and unknown
/// errors need a full reload. Non-fatal errors are only logged.
pub fn classify_error(kind: OutputErrorKind, fatal: bool) -> RecoveryAction {
    if !fatal {
        return RecoveryAction::LogOnly;
    }
    match kind {
        OutputErrorKind::Media => RecoveryAction::RecoverInPlace,
        OutputErrorKind::Network | OutputErrorKind::Other => RecoveryAction::Reload,
    }
}

/// A prepared segmented stream: URL, buffering windows, and (offline) the
/// stored segment loader.
#[derive(Debug, Clone)]
pub struct SegmentedDecoder {
    url: String,
    config: DecoderConfig,
    offline: Option<Arc<OfflineSegmentLoader>>,
}

impl SegmentedDecoder {
    pub fn new(url: impl Into<String>, config: DecoderConfig) -> Self {
        Self {
            url: url.into(),
            config,
            offline: None,
        }
    }

    /// Serve segments from stored buffers instead of the network.
    pub fn with_stored_segments(mut self, stored: StoredSegments) -> Self {
        self.offline = Some(Arc::new(OfflineSegmentLoader::new(stored)));
        self
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn config(&self) -> DecoderConfig {
        self.config
    }

    pub fn is_offline(&self) -> bool {
        self.offline.is_some()
    }

    /// Stored buffer for a manifest sequence number, when serving offline.
    pub fn segment(&self, sequence_number: u64) -> Option<Bytes> {
        self.offline
            .as_ref()
            .and_then(|loader| loader.segment(sequence_number))
    }

    /// Point an output at this stream.
    pub async fn attach(&self, output: &dyn AudioOutput) -> Result<()> {
        debug!(url = %self.url, offline = self.is_offline(), "Attaching segmented source");
        output.set_source(&self.url).await?;
        Ok(())
    }

    /// Detach from an output, releasing the source.
    pub async fn detach(&self, output: &dyn AudioOutput) -> Result<()> {
        output.clear_source().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_windows_are_small() {
        let config = DecoderConfig::default();
        assert_eq!(config.max_buffer_secs, 10.0);
        assert_eq!(config.max_max_buffer_secs, 20.0);
    }

    #[test]
    fn fatal_media_errors_recover_in_place() {
        assert_eq!(
            classify_error(OutputErrorKind::Media, true),
            RecoveryAction::RecoverInPlace
        );
    }

    #[test]
    fn fatal_network_and_other_errors_reload() {
        assert_eq!(
            classify_error(OutputErrorKind::Network, true),
            RecoveryAction::Reload
        );
        assert_eq!(
            classify_error(OutputErrorKind::Other, true),
            RecoveryAction::Reload
        );
    }

    #[test]
    fn non_fatal_errors_only_log() {
        for kind in [
            OutputErrorKind::Network,
            OutputErrorKind::Media,
            OutputErrorKind::Other,
        ] {
            assert_eq!(classify_error(kind, false), RecoveryAction::LogOnly);
        }
    }

    #[test]
    fn segment_lookup_requires_offline_loader() {
        let decoder = SegmentedDecoder::new("https://host/main.m3u8", DecoderConfig::default());
        assert!(!decoder.is_offline());
        assert!(decoder.segment(1).is_none());

        let decoder = decoder.with_stored_segments(StoredSegments {
            manifest: "#EXTM3U\n#EXT-X-MEDIA-SEQUENCE:3\n".to_string(),
            segments: vec![Bytes::from_static(b"a"), Bytes::from_static(b"b")],
        });
        assert!(decoder.is_offline());
        assert_eq!(decoder.segment(4), Some(Bytes::from_static(b"b")));
        assert!(decoder.segment(9).is_none());
    }
}
