//! Offline Media Abstractions
//!
//! Provides access to locally stored track copies. A track may be stored as a
//! single playable file or as a segmented download (manifest plus segment
//! buffers); the store reports which, and the resolver picks the pipeline
//! accordingly.

use async_trait::async_trait;
use bytes::Bytes;

use crate::error::Result;

/// How a locally stored track can be played back.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OfflineSourceKind {
    /// A whole media file; feed the URL straight to an output.
    Direct,
    /// A stored segment manifest; playback goes through the segmented decoder
    /// with segments served from [`OfflineStore::stored_segments`].
    SegmentManifest,
}

/// A locally available source for a track.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OfflinePlayable {
    /// URL the output (or decoder) should load. For stored files this is a
    /// local file or blob URL; for segmented copies it is the manifest URL.
    pub url: String,
    pub kind: OfflineSourceKind,
}

/// The stored pieces of a segmented download.
#[derive(Debug, Clone)]
pub struct StoredSegments {
    /// The manifest text as originally downloaded.
    pub manifest: String,
    /// Segment payloads in manifest order.
    pub segments: Vec<Bytes>,
}

/// Local store of downloaded tracks.
///
/// Both lookups return `Ok(None)` when the track simply isn't stored; errors
/// are reserved for storage failures.
#[async_trait]
pub trait OfflineStore: Send + Sync {
    /// Look up a playable local source for a track.
    async fn playable_source(&self, track_id: &str) -> Result<Option<OfflinePlayable>>;

    /// Load the stored segment set for a track downloaded in segmented form.
    ///
    /// Returns `Ok(None)` when the track is not stored, or is stored as a
    /// whole file.
    async fn stored_segments(&self, track_id: &str) -> Result<Option<StoredSegments>>;
}
