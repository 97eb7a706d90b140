//! Offline segment serving.
//!
//! Downloaded segmented tracks are stored as a manifest plus an ordered list
//! of segment buffers. At playback time the decoder asks for segments by
//! their manifest sequence number; the loader translates that to a buffer
//! index using the manifest's media-sequence offset.

use bridge_traits::offline::StoredSegments;
use bytes::Bytes;
use tracing::debug;

/// Manifest tag carrying the first sequence number.
const MEDIA_SEQUENCE_TAG: &str = "#EXT-X-MEDIA-SEQUENCE:";

/// Sequence number of the first stored segment when the manifest does not
/// carry the tag.
pub const DEFAULT_MEDIA_SEQUENCE: u64 = 1;

/// Parse the media-sequence offset out of a stored manifest.
///
/// Falls back to [`DEFAULT_MEDIA_SEQUENCE`] when the tag is missing or
/// malformed.
pub fn parse_media_sequence(manifest: &str) -> u64 {
    manifest
        .lines()
        .find_map(|line| line.trim().strip_prefix(MEDIA_SEQUENCE_TAG))
        .and_then(|value| value.trim().parse().ok())
        .unwrap_or(DEFAULT_MEDIA_SEQUENCE)
}

/// Serves stored segment buffers by manifest sequence number.
#[derive(Debug, Clone)]
pub struct OfflineSegmentLoader {
    manifest: String,
    segments: Vec<Bytes>,
    media_sequence_offset: u64,
}

impl OfflineSegmentLoader {
    pub fn new(stored: StoredSegments) -> Self {
        let media_sequence_offset = parse_media_sequence(&stored.manifest);
        debug!(
            media_sequence_offset,
            segment_count = stored.segments.len(),
            "Prepared offline segment loader"
        );
        Self {
            manifest: stored.manifest,
            segments: stored.segments,
            media_sequence_offset,
        }
    }

    pub fn manifest(&self) -> &str {
        &self.manifest
    }

    pub fn segment_count(&self) -> usize {
        self.segments.len()
    }

    pub fn media_sequence_offset(&self) -> u64 {
        self.media_sequence_offset
    }

    /// Buffer for a manifest sequence number.
    ///
    /// Sequence numbers outside the stored range return `None` without
    /// raising an error; the decoder treats a miss as a cache gap.
    pub fn segment(&self, sequence_number: u64) -> Option<Bytes> {
        let index = sequence_number.checked_sub(self.media_sequence_offset)?;
        let index = usize::try_from(index).ok()?;
        self.segments.get(index).cloned()
    }
}
