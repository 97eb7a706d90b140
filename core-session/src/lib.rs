//! # Playback Sessions
//!
//! Server session reporting, the login-scoped play counter, and
//! media-session integration.
//!
//! ## Overview
//!
//! - [`reporting`] - Start/progress/stop reports with stop de-duplication
//! - [`counter`] - Persisted per-login play counter
//! - [`media_session`] - Host media-session adapter, transport-command
//!   dispatch, and the user-pause grace window

pub mod counter;
pub mod error;
pub mod media_session;
pub mod reporting;

pub use counter::{SessionCounter, PLAY_COUNT_KEY};
pub use error::{Result, SessionError};
pub use media_session::{
    MediaSessionAdapter, PauseGuard, TransportControl, USER_PAUSE_GRACE_MS,
};
pub use reporting::{SessionReporter, PROGRESS_REPORT_INTERVAL_SECS};
