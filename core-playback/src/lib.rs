//! # Playback Engine
//!
//! Source resolution and the dual-buffer audio engine.
//!
//! ## Overview
//!
//! - [`resolver`] - Decides where a track's audio comes from (offline
//!   artifact, segmented transcode tier, or direct stream)
//! - [`segments`] - Serves stored segment buffers by manifest sequence number
//! - [`decoder`] - Segmented stream configuration and error recovery
//!   classification
//! - [`engine`] - The two-slot engine with its prepare/commit rotation
//!   protocol
//!
//! The engine drives [`AudioOutput`](bridge_traits::output::AudioOutput)
//! bridges supplied by the host; it never creates outputs itself.

pub mod decoder;
pub mod engine;
pub mod error;
pub mod resolver;
pub mod segments;

pub use decoder::{classify_error, DecoderConfig, RecoveryAction, SegmentedDecoder};
pub use engine::{DualBufferEngine, PreparedSource};
pub use error::{PlaybackError, Result};
pub use resolver::{
    is_segmented_bitrate, resolve_source, ResolvedSource, SourceMode, SEGMENTED_BITRATES,
};
pub use segments::{parse_media_sequence, OfflineSegmentLoader, DEFAULT_MEDIA_SEQUENCE};
