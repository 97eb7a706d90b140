//! Workspace placeholder crate.
//!
//! This crate exists to expose shared feature flags that map to the individual
//! workspace crates (e.g., `core-service`, `core-playback`, `core-queue`).
//! Host applications can depend on `playhead-workspace` and enable the
//! documented features without needing to wire each crate individually.

#[cfg(feature = "playback")]
pub use core_playback as playback;
#[cfg(feature = "queue")]
pub use core_queue as queue;
#[cfg(feature = "service")]
pub use core_service as service;
