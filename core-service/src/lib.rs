//! # Playback Service Façade
//!
//! Wires host-provided bridges (catalog client, offline store, audio
//! outputs, settings store, media-session surface) into one
//! [`PlayerService`]: the async command surface host applications drive and
//! observe.
//!
//! ## Overview
//!
//! - [`deps`] - the [`PlayerDependencies`] bundle hosts assemble
//! - [`service`] - the [`PlayerService`] command surface and snapshot
//! - [`format`] - time display helpers
//!
//! Native hosts can enable the `local-bridges` feature and assemble the
//! bundled SQLite, HTTP, and filesystem bridges with
//! [`local_dependencies`]; embedders with their own adapters construct
//! [`PlayerDependencies`] directly. Audio outputs always come from the host.

pub mod deps;
pub mod error;
pub mod format;
pub mod service;
mod watcher;

#[cfg(test)]
pub(crate) mod testutil;

pub use deps::PlayerDependencies;
pub use error::{Result, ServiceError};
pub use format::format_time;
pub use service::{PlayerService, PlayerSnapshot, NEAR_END_PREFETCH_ITEMS};

#[cfg(feature = "local-bridges")]
pub use bridge_local::CatalogConfig;

/// Assemble the native bridge set: SQLite settings, HTTP catalog client,
/// filesystem offline store.
///
/// ```ignore
/// use core_service::{local_dependencies, CatalogConfig, PlayerService};
///
/// # async fn example(outputs: [std::sync::Arc<dyn bridge_traits::output::AudioOutput>; 2])
/// # -> core_service::Result<()> {
/// let config = CatalogConfig {
///     base_url: "https://media.example.org".into(),
///     user_id: "u1".into(),
///     access_token: "token".into(),
/// };
/// let deps = local_dependencies(config, "player.db", "offline", outputs).await?;
/// let player = PlayerService::new(deps).await?;
/// player.start();
/// # Ok(())
/// # }
/// ```
#[cfg(feature = "local-bridges")]
pub async fn local_dependencies(
    catalog: bridge_local::CatalogConfig,
    settings_db: impl Into<std::path::PathBuf>,
    offline_root: impl Into<std::path::PathBuf>,
    outputs: [std::sync::Arc<dyn bridge_traits::output::AudioOutput>; 2],
) -> Result<PlayerDependencies> {
    use std::sync::Arc;

    let settings = bridge_local::SqliteSettingsStore::new(settings_db.into())
        .await
        .map_err(|err| ServiceError::InitializationFailed(err.to_string()))?;
    Ok(PlayerDependencies::new(
        Arc::new(bridge_local::HttpCatalogClient::new(catalog)),
        Arc::new(bridge_local::FsOfflineStore::new(offline_root.into())),
        outputs,
        Arc::new(settings),
    ))
}
