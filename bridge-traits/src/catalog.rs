//! Remote Catalog Abstractions
//!
//! Provides the contract for talking to the media server: paged track
//! listings, stream URL construction, artwork URLs, and playback reporting.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// A playable track as described by the catalog.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Track {
    /// Catalog-assigned identifier, stable across sessions.
    pub id: String,
    pub title: String,
    pub artists: Vec<String>,
    pub album: Option<String>,
    pub album_artist: Option<String>,
    /// Track length in seconds.
    pub run_length_secs: f64,
    pub favorite: bool,
    /// Container format as reported by the server (e.g. "flac", "mp4").
    pub container: Option<String>,
    pub codec: Option<String>,
    /// Item id to use when requesting artwork, when different from `id`.
    pub artwork_item_id: Option<String>,
}

impl Track {
    /// Joined artist names for display and now-playing metadata.
    pub fn artist_line(&self) -> String {
        self.artists.join(", ")
    }
}

/// The closed set of list queries the catalog supports.
///
/// Each kind maps to a distinct server endpoint with its own argument shape.
/// A descriptor naming an unknown kind fails validation instead of being
/// dispatched dynamically.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum QueryKind {
    /// Tracks the user marked as favorite.
    FavoriteTracks,
    /// All tracks in a given genre.
    GenreTracks,
    /// Tracks of a playlist, in playlist order.
    PlaylistTracks,
    /// Tracks of an album, in album order.
    AlbumTracks,
    /// Free-text track search results.
    SearchTracks,
}

impl QueryKind {
    /// Whether the server can return this query in random order itself.
    ///
    /// Order-preserving queries (playlists, albums) are shuffled client-side
    /// instead.
    pub fn supports_server_shuffle(&self) -> bool {
        matches!(
            self,
            QueryKind::FavoriteTracks | QueryKind::GenreTracks | QueryKind::SearchTracks
        )
    }

    /// Whether the query needs a term argument (genre name, playlist id,
    /// album id, or search text).
    pub fn requires_term(&self) -> bool {
        !matches!(self, QueryKind::FavoriteTracks)
    }
}

/// A fully resolved page request ready to be sent to the server.
///
/// Produced by the queue layer from a persisted descriptor; the catalog
/// client only has to translate it to its wire format.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ListRequest {
    pub kind: QueryKind,
    /// Zero-based index of the first item to return.
    pub start_index: u32,
    /// Maximum number of items to return.
    pub limit: u32,
    /// Server-side sort field, if any.
    pub sort_by: Option<String>,
    /// Server-side sort direction, or the random-order token.
    pub sort_order: Option<String>,
    /// Kind-specific argument: genre name, playlist id, album id, or search
    /// term. `None` only for kinds that don't take one.
    pub term: Option<String>,
}

/// One page of tracks returned by [`CatalogClient::fetch_list`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackPage {
    pub tracks: Vec<Track>,
    /// Total number of items matching the query, when the server reports it.
    pub total_count: Option<u64>,
}

impl TrackPage {
    pub fn empty() -> Self {
        Self {
            tracks: Vec::new(),
            total_count: None,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }
}

/// How a track should be streamed from the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamSelection {
    /// Fetch the original file as a single progressive download.
    Direct,
    /// Request a segmented transcode capped at the given bitrate (bits/s).
    Segmented { bitrate: u32 },
}

/// Media server client.
///
/// Implementations are thin: they translate requests to the server's wire
/// format and map responses back. Pagination, shuffling, and retry policy
/// live above this trait.
///
/// # Example
///
/// ```ignore
/// use bridge_traits::catalog::{CatalogClient, ListRequest, QueryKind};
///
/// async fn first_page(catalog: &dyn CatalogClient) -> bridge_traits::error::Result<()> {
///     let page = catalog
///         .fetch_list(&ListRequest {
///             kind: QueryKind::FavoriteTracks,
///             start_index: 0,
///             limit: 100,
///             sort_by: Some("SortName".into()),
///             sort_order: Some("Ascending".into()),
///             term: None,
///         })
///         .await?;
///     println!("{} tracks", page.tracks.len());
///     Ok(())
/// }
/// ```
#[async_trait]
pub trait CatalogClient: Send + Sync {
    /// Fetch one page of tracks for the given request.
    async fn fetch_list(&self, request: &ListRequest) -> Result<TrackPage>;

    /// Build the streaming URL for a track.
    async fn stream_url(&self, track_id: &str, selection: StreamSelection) -> Result<String>;

    /// Build an artwork URL for a track, constrained to `max_width` pixels.
    ///
    /// Returns `None` when the track has no artwork.
    fn artwork_url(&self, track: &Track, max_width: u32) -> Option<String>;

    /// Tell the server a track started playing.
    async fn report_playback_start(&self, track_id: &str) -> Result<()>;

    /// Periodic progress report while a track is active.
    async fn report_playback_progress(
        &self,
        track_id: &str,
        position_secs: f64,
        paused: bool,
    ) -> Result<()>;

    /// Tell the server a track stopped playing at the given position.
    async fn report_playback_stopped(&self, track_id: &str, position_secs: f64) -> Result<()>;
}
