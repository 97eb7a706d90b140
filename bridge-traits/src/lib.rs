//! # Host Bridge Traits
//!
//! Platform abstraction traits that must be implemented by each host platform.
//!
//! ## Overview
//!
//! This crate defines the contract between the playback core and its external
//! collaborators. Each trait represents a capability the core requires but that
//! must be implemented differently per host (desktop, mobile, web, test
//! harness).
//!
//! ## Traits
//!
//! ### Remote Catalog
//! - [`CatalogClient`](catalog::CatalogClient) - Paged track listing, stream
//!   URL construction, and playback reporting against the media server
//!
//! ### Local Media
//! - [`OfflineStore`](offline::OfflineStore) - Locally stored copies of tracks,
//!   either whole files or segmented downloads
//! - [`AudioOutput`](output::AudioOutput) - A single decode-and-render sink;
//!   the engine owns exactly two of these
//!
//! ### Platform Integration
//! - [`MediaSessionHost`](session::MediaSessionHost) - OS now-playing surface
//!   and hardware transport keys
//! - [`SettingsStore`](storage::SettingsStore) - Key-value preferences storage
//!
//! ### Utilities
//! - [`Clock`](time::Clock) - Time source for deterministic testing
//!
//! ## Error Handling
//!
//! All bridge traits use the [`BridgeError`](error::BridgeError) type for
//! consistent error handling. Platform implementations should:
//!
//! - Convert platform-specific errors to `BridgeError`
//! - Provide actionable error messages
//! - Include error context (e.g., track ids, HTTP status)
//!
//! ## Thread Safety
//!
//! All bridge traits require `Send + Sync` bounds to support safe concurrent
//! usage across async tasks. Implementations must ensure thread safety.

pub mod catalog;
pub mod error;
pub mod offline;
pub mod output;
pub mod session;
pub mod storage;
pub mod time;

pub use error::BridgeError;

// Re-export commonly used types
pub use catalog::{CatalogClient, ListRequest, QueryKind, StreamSelection, Track, TrackPage};
pub use offline::{OfflinePlayable, OfflineSourceKind, OfflineStore, StoredSegments};
pub use output::{AudioOutput, OutputErrorKind, OutputEvent, ReadyState};
pub use session::{MediaSessionHost, NowPlaying, TransportCommand, TransportState};
pub use storage::{SettingsStore, SettingsTransaction};
pub use time::{Clock, SystemClock};
