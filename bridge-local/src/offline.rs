//! Filesystem-backed offline store
//!
//! Downloaded tracks live under one directory per track id. Segmented
//! downloads keep the manifest as `main.m3u8` next to segment files named by
//! their zero-based buffer index (`0.ts`, `1.ts`, ...); direct downloads
//! keep a single audio file.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use bridge_traits::{
    error::{BridgeError, Result},
    offline::{OfflinePlayable, OfflineSourceKind, OfflineStore, StoredSegments},
};
use bytes::Bytes;
use tracing::debug;

const MANIFEST_FILE: &str = "main.m3u8";
const SEGMENT_EXTENSION: &str = "ts";

pub struct FsOfflineStore {
    root: PathBuf,
}

impl FsOfflineStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn track_dir(&self, track_id: &str) -> PathBuf {
        self.root.join(track_id)
    }

    fn file_url(path: &Path) -> String {
        format!("file://{}", path.to_string_lossy().replace('\\', "/"))
    }

    /// First non-manifest file in a track directory, for direct downloads.
    async fn direct_file(dir: &Path) -> Result<Option<PathBuf>> {
        let mut entries = tokio::fs::read_dir(dir).await.map_err(BridgeError::Io)?;
        while let Some(entry) = entries.next_entry().await.map_err(BridgeError::Io)? {
            let path = entry.path();
            if path.is_file() && path.file_name().and_then(|n| n.to_str()) != Some(MANIFEST_FILE) {
                return Ok(Some(path));
            }
        }
        Ok(None)
    }
}

#[async_trait]
impl OfflineStore for FsOfflineStore {
    async fn playable_source(&self, track_id: &str) -> Result<Option<OfflinePlayable>> {
        let dir = self.track_dir(track_id);
        if !dir.is_dir() {
            return Ok(None);
        }

        let manifest = dir.join(MANIFEST_FILE);
        if manifest.is_file() {
            debug!(track_id, "Found offline segment manifest");
            return Ok(Some(OfflinePlayable {
                url: Self::file_url(&manifest),
                kind: OfflineSourceKind::SegmentManifest,
            }));
        }

        match Self::direct_file(&dir).await? {
            Some(path) => {
                debug!(track_id, path = ?path, "Found offline direct file");
                Ok(Some(OfflinePlayable {
                    url: Self::file_url(&path),
                    kind: OfflineSourceKind::Direct,
                }))
            }
            None => Ok(None),
        }
    }

    async fn stored_segments(&self, track_id: &str) -> Result<Option<StoredSegments>> {
        let dir = self.track_dir(track_id);
        let manifest_path = dir.join(MANIFEST_FILE);
        if !manifest_path.is_file() {
            return Ok(None);
        }

        let manifest = tokio::fs::read_to_string(&manifest_path)
            .await
            .map_err(BridgeError::Io)?;

        // Collect segment files by their numeric index
        let mut indexed: Vec<(u64, PathBuf)> = Vec::new();
        let mut entries = tokio::fs::read_dir(&dir).await.map_err(BridgeError::Io)?;
        while let Some(entry) = entries.next_entry().await.map_err(BridgeError::Io)? {
            let path = entry.path();
            let is_segment = path
                .extension()
                .and_then(|e| e.to_str())
                .is_some_and(|e| e == SEGMENT_EXTENSION);
            if !is_segment {
                continue;
            }
            if let Some(index) = path
                .file_stem()
                .and_then(|s| s.to_str())
                .and_then(|s| s.parse().ok())
            {
                indexed.push((index, path));
            }
        }
        indexed.sort_by_key(|(index, _)| *index);

        let mut segments = Vec::with_capacity(indexed.len());
        for (_, path) in indexed {
            let data = tokio::fs::read(&path).await.map_err(BridgeError::Io)?;
            segments.push(Bytes::from(data));
        }

        debug!(track_id, count = segments.len(), "Loaded stored segments");
        Ok(Some(StoredSegments { manifest, segments }))
    }
}
