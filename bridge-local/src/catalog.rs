//! HTTP catalog client using Reqwest
//!
//! Talks to a Jellyfin-compatible media server: paged track listing for the
//! queue queries, stream URL construction for direct and segmented delivery,
//! artwork URLs, and playback session reports.

use async_trait::async_trait;
use bridge_traits::{
    catalog::{CatalogClient, ListRequest, QueryKind, StreamSelection, Track, TrackPage},
    error::{BridgeError, Result},
};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;
use tracing::{debug, warn};

/// Server ticks per second (one tick is 100ns).
const TICKS_PER_SECOND: f64 = 10_000_000.0;

/// Connection details for one server.
#[derive(Debug, Clone)]
pub struct CatalogConfig {
    /// Server base URL without a trailing slash.
    pub base_url: String,
    pub user_id: String,
    pub access_token: String,
}

/// Reqwest-based catalog client.
pub struct HttpCatalogClient {
    client: Client,
    config: CatalogConfig,
}

impl HttpCatalogClient {
    pub fn new(config: CatalogConfig) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .connect_timeout(Duration::from_secs(10))
            .pool_max_idle_per_host(10)
            .user_agent("playhead/0.1.0")
            .build()
            .expect("Failed to build HTTP client");

        Self { client, config }
    }

    pub fn with_client(client: Client, config: CatalogConfig) -> Self {
        Self { client, config }
    }

    fn items_url(&self) -> String {
        format!(
            "{}/Users/{}/Items",
            self.config.base_url, self.config.user_id
        )
    }

    /// Query parameters for one list request, by query kind.
    fn list_params(&self, request: &ListRequest) -> Vec<(String, String)> {
        let mut params: Vec<(String, String)> = vec![
            ("IncludeItemTypes".to_string(), "Audio".to_string()),
            ("Recursive".to_string(), "true".to_string()),
            ("StartIndex".to_string(), request.start_index.to_string()),
            ("Limit".to_string(), request.limit.to_string()),
        ];
        if let Some(sort_by) = &request.sort_by {
            params.push(("SortBy".to_string(), sort_by.clone()));
        }
        if let Some(sort_order) = &request.sort_order {
            params.push(("SortOrder".to_string(), sort_order.clone()));
        }

        let term = request.term.as_deref().unwrap_or("");
        match request.kind {
            QueryKind::FavoriteTracks => {
                params.push(("Filters".to_string(), "IsFavorite".to_string()));
            }
            QueryKind::GenreTracks => {
                params.push(("Genres".to_string(), term.to_string()));
            }
            QueryKind::PlaylistTracks | QueryKind::AlbumTracks => {
                params.push(("ParentId".to_string(), term.to_string()));
            }
            QueryKind::SearchTracks => {
                params.push(("SearchTerm".to_string(), term.to_string()));
            }
        }
        params
    }

    async fn check(response: reqwest::Response) -> Result<reqwest::Response> {
        let status = response.status();
        if !status.is_success() {
            return Err(BridgeError::RequestFailed(format!(
                "HTTP {} from {}",
                status,
                response.url()
            )));
        }
        Ok(response)
    }
}

// ============================================================================
// Wire DTOs
// ============================================================================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ItemsResponse {
    #[serde(default)]
    items: Vec<ItemDto>,
    total_record_count: Option<u64>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ItemDto {
    id: String,
    name: Option<String>,
    #[serde(default)]
    artists: Vec<String>,
    album: Option<String>,
    album_artist: Option<String>,
    run_time_ticks: Option<i64>,
    container: Option<String>,
    album_id: Option<String>,
    #[serde(default)]
    image_tags: HashMap<String, String>,
    user_data: Option<UserDataDto>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct UserDataDto {
    #[serde(default)]
    is_favorite: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
struct PlayingReport<'a> {
    item_id: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
struct ProgressReport<'a> {
    item_id: &'a str,
    position_ticks: i64,
    is_paused: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
struct StoppedReport<'a> {
    item_id: &'a str,
    position_ticks: i64,
}

fn secs_to_ticks(secs: f64) -> i64 {
    (secs * TICKS_PER_SECOND) as i64
}

fn ticks_to_secs(ticks: i64) -> f64 {
    ticks as f64 / TICKS_PER_SECOND
}

impl ItemDto {
    fn into_track(self) -> Track {
        // Artwork comes from the item itself when it has a primary image,
        // falling back to the album item.
        let artwork_item_id = if self.image_tags.contains_key("Primary") {
            Some(self.id.clone())
        } else {
            self.album_id
        };

        Track {
            favorite: self.user_data.map(|u| u.is_favorite).unwrap_or(false),
            title: self.name.unwrap_or_default(),
            run_length_secs: self.run_time_ticks.map(ticks_to_secs).unwrap_or(0.0),
            id: self.id,
            artists: self.artists,
            album: self.album,
            album_artist: self.album_artist,
            container: self.container,
            codec: None,
            artwork_item_id,
        }
    }
}

// ============================================================================
// CatalogClient implementation
// ============================================================================

#[async_trait]
impl CatalogClient for HttpCatalogClient {
    async fn fetch_list(&self, request: &ListRequest) -> Result<TrackPage> {
        debug!(
            kind = ?request.kind,
            start_index = request.start_index,
            limit = request.limit,
            "Fetching track list"
        );

        let response = self
            .client
            .get(self.items_url())
            .header("X-Emby-Token", &self.config.access_token)
            .query(&self.list_params(request))
            .send()
            .await
            .map_err(|e| BridgeError::RequestFailed(e.to_string()))?;
        let response = Self::check(response).await?;

        let body: ItemsResponse = response
            .json()
            .await
            .map_err(|e| BridgeError::RequestFailed(format!("Malformed list response: {}", e)))?;

        Ok(TrackPage {
            tracks: body.items.into_iter().map(ItemDto::into_track).collect(),
            total_count: body.total_record_count,
        })
    }

    async fn stream_url(&self, track_id: &str, selection: StreamSelection) -> Result<String> {
        let url = match selection {
            StreamSelection::Direct => format!(
                "{}/Audio/{}/stream?static=true&api_key={}",
                self.config.base_url, track_id, self.config.access_token
            ),
            StreamSelection::Segmented { bitrate } => format!(
                "{}/Audio/{}/main.m3u8?audioBitRate={}&api_key={}",
                self.config.base_url, track_id, bitrate, self.config.access_token
            ),
        };
        Ok(url)
    }

    fn artwork_url(&self, track: &Track, max_width: u32) -> Option<String> {
        let item_id = track.artwork_item_id.as_ref()?;
        Some(format!(
            "{}/Items/{}/Images/Primary?maxWidth={}",
            self.config.base_url, item_id, max_width
        ))
    }

    async fn report_playback_start(&self, track_id: &str) -> Result<()> {
        let response = self
            .client
            .post(format!("{}/Sessions/Playing", self.config.base_url))
            .header("X-Emby-Token", &self.config.access_token)
            .json(&PlayingReport { item_id: track_id })
            .send()
            .await
            .map_err(|e| BridgeError::RequestFailed(e.to_string()))?;
        Self::check(response).await?;
        Ok(())
    }

    async fn report_playback_progress(
        &self,
        track_id: &str,
        position_secs: f64,
        paused: bool,
    ) -> Result<()> {
        let response = self
            .client
            .post(format!(
                "{}/Sessions/Playing/Progress",
                self.config.base_url
            ))
            .header("X-Emby-Token", &self.config.access_token)
            .json(&ProgressReport {
                item_id: track_id,
                position_ticks: secs_to_ticks(position_secs),
                is_paused: paused,
            })
            .send()
            .await
            .map_err(|e| BridgeError::RequestFailed(e.to_string()))?;
        Self::check(response).await?;
        Ok(())
    }

    async fn report_playback_stopped(&self, track_id: &str, position_secs: f64) -> Result<()> {
        let response = self
            .client
            .post(format!("{}/Sessions/Playing/Stopped", self.config.base_url))
            .header("X-Emby-Token", &self.config.access_token)
            .json(&StoppedReport {
                item_id: track_id,
                position_ticks: secs_to_ticks(position_secs),
            })
            .send()
            .await
            .map_err(|e| {
                warn!(track_id, error = %e, "Stop report request failed");
                BridgeError::RequestFailed(e.to_string())
            })?;
        Self::check(response).await?;
        Ok(())
    }
}
