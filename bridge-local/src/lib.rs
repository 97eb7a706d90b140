//! # Local Bridges
//!
//! Native implementations of the host bridge traits.
//!
//! ## Overview
//!
//! - [`settings`] - SQLite key-value settings store
//! - [`catalog`] - Reqwest client for a Jellyfin-compatible media server
//! - [`offline`] - Filesystem-backed offline track store

pub mod catalog;
pub mod offline;
pub mod settings;

pub use catalog::{CatalogConfig, HttpCatalogClient};
pub use offline::FsOfflineStore;
pub use settings::SqliteSettingsStore;
