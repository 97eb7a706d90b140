//! Settings Storage Abstraction
//!
//! Key-value storage for persisted player state: volume, shuffle, repeat
//! mode, the serialized queue descriptor, and the rest of the settings the
//! player writes through on every change.

use async_trait::async_trait;

use crate::error::Result;

/// Key-value settings storage trait
///
/// Abstracts platform-specific preferences storage:
/// - Desktop: SQLite or config files
/// - Mobile: UserDefaults / DataStore
/// - Web: localStorage / IndexedDB
///
/// # Example
///
/// ```ignore
/// use bridge_traits::storage::SettingsStore;
///
/// async fn save_volume(store: &dyn SettingsStore) -> Result<()> {
///     store.set_f64("volume", 0.8).await?;
///     store.set_bool("shuffle", true).await?;
///     Ok(())
/// }
/// ```
#[async_trait]
pub trait SettingsStore: Send + Sync {
    /// Store a string value
    async fn set_string(&self, key: &str, value: &str) -> Result<()>;

    /// Retrieve a string value
    async fn get_string(&self, key: &str) -> Result<Option<String>>;

    /// Store a boolean value
    async fn set_bool(&self, key: &str, value: bool) -> Result<()>;

    /// Retrieve a boolean value
    async fn get_bool(&self, key: &str) -> Result<Option<bool>>;

    /// Store an integer value
    async fn set_i64(&self, key: &str, value: i64) -> Result<()>;

    /// Retrieve an integer value
    async fn get_i64(&self, key: &str) -> Result<Option<i64>>;

    /// Store a floating-point value
    async fn set_f64(&self, key: &str, value: f64) -> Result<()>;

    /// Retrieve a floating-point value
    async fn get_f64(&self, key: &str) -> Result<Option<f64>>;

    /// Delete a setting
    async fn delete(&self, key: &str) -> Result<()>;

    /// Check if a setting exists
    async fn has_key(&self, key: &str) -> Result<bool>;

    /// List all setting keys
    async fn list_keys(&self) -> Result<Vec<String>>;

    /// Clear all settings
    async fn clear_all(&self) -> Result<()>;

    /// Begin a transaction for atomic multi-key updates
    ///
    /// Used when several related keys must change together (e.g. replacing
    /// the persisted queue descriptor and resetting the position).
    async fn begin_transaction(&self) -> Result<Box<dyn SettingsTransaction + Send>>;
}

/// Transaction for atomic settings updates
#[async_trait]
pub trait SettingsTransaction: Send {
    /// Set a string value within the transaction
    async fn set_string(&mut self, key: &str, value: &str) -> Result<()>;

    /// Delete a key within the transaction
    async fn delete(&mut self, key: &str) -> Result<()>;

    /// Commit the transaction
    async fn commit(self: Box<Self>) -> Result<()>;

    /// Rollback the transaction
    async fn rollback(self: Box<Self>) -> Result<()>;
}
