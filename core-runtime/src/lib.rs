//! # Core Runtime Module
//!
//! Provides foundational runtime infrastructure for the playback core:
//! - Logging and tracing infrastructure
//! - Event bus system
//! - Persisted player settings
//!
//! ## Overview
//!
//! This crate contains the runtime utilities the other crates depend on. It
//! establishes the logging conventions, the event broadcasting mechanism, and
//! the write-through settings layer used throughout the system.

pub mod error;
pub mod events;
pub mod logging;
pub mod settings;

pub use error::{Error, Result};
pub use settings::{PlayerSettings, RepeatMode, SettingsHandle};
