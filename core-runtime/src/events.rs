//! # Event Bus System
//!
//! Provides an event-driven architecture for the playback core using
//! `tokio::sync::broadcast`. This module enables decoupled communication
//! between the queue, engine, and session layers and the embedding UI.
//!
//! ## Overview
//!
//! The event bus system consists of:
//! - **Event Types**: Strongly-typed enum hierarchies for different domains
//! - **EventBus**: Central broadcast channel for publishing events
//! - **EventStream**: Wrapper for consuming events with filtering
//! - **Subscription Management**: Multiple subscribers can listen independently
//!
//! ## Usage
//!
//! ```rust
//! use core_runtime::events::{EventBus, PlayerEvent, PlaybackEvent};
//!
//! let event_bus = EventBus::new(100);
//! let mut subscriber = event_bus.subscribe();
//!
//! let event = PlayerEvent::Playback(PlaybackEvent::TrackStarted {
//!     track_id: "track-1".to_string(),
//!     title: "Song".to_string(),
//! });
//! event_bus.emit(event).ok();
//! ```
//!
//! ## Error Handling
//!
//! The event bus uses `tokio::sync::broadcast`, which can produce two types
//! of errors:
//!
//! - **`RecvError::Lagged(n)`**: Subscriber was too slow and missed `n`
//!   events. This is non-fatal; the subscriber can continue receiving new
//!   events.
//! - **`RecvError::Closed`**: All senders have been dropped. This indicates
//!   shutdown.
//!
//! Subscribers should handle `Lagged` gracefully and treat `Closed` as a
//! signal to exit.

use serde::{Deserialize, Serialize};
use std::fmt;
use tokio::sync::broadcast;

// Re-export commonly used types
pub use tokio::sync::broadcast::error::{RecvError, SendError};
pub use tokio::sync::broadcast::Receiver;

/// Default buffer size for the event bus channel.
///
/// Position updates dominate the event volume; subscribers that can't keep
/// up receive `RecvError::Lagged` rather than blocking the player.
pub const DEFAULT_EVENT_BUFFER_SIZE: usize = 100;

// ============================================================================
// Core Event Types
// ============================================================================

/// Top-level event enum encompassing all event categories.
///
/// This is the main event type published and received through the event bus.
/// It wraps domain-specific event types for the queue, the audio engine, and
/// session reporting.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", content = "payload")]
pub enum PlayerEvent {
    /// Queue state changes
    Queue(QueueEvent),
    /// Audio engine / transport events
    Playback(PlaybackEvent),
    /// Server reporting and session counter events
    Session(SessionEvent),
}

impl PlayerEvent {
    /// Returns a human-readable description of the event.
    pub fn description(&self) -> &str {
        match self {
            PlayerEvent::Queue(e) => e.description(),
            PlayerEvent::Playback(e) => e.description(),
            PlayerEvent::Session(e) => e.description(),
        }
    }

    /// Returns the severity level of the event.
    pub fn severity(&self) -> EventSeverity {
        match self {
            PlayerEvent::Playback(PlaybackEvent::Error { .. }) => EventSeverity::Error,
            PlayerEvent::Playback(PlaybackEvent::NeedsReload { .. }) => EventSeverity::Warning,
            PlayerEvent::Session(SessionEvent::ReportFailed { .. }) => EventSeverity::Warning,
            PlayerEvent::Queue(QueueEvent::Replaced { .. }) => EventSeverity::Info,
            PlayerEvent::Playback(PlaybackEvent::TrackStarted { .. }) => EventSeverity::Info,
            _ => EventSeverity::Debug,
        }
    }
}

/// Event severity levels for filtering and logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum EventSeverity {
    /// Debug-level events (verbose)
    Debug,
    /// Informational events
    Info,
    /// Warning events
    Warning,
    /// Error events
    Error,
}

// ============================================================================
// Queue Events
// ============================================================================

/// Events related to track queue changes.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "event")]
pub enum QueueEvent {
    /// The whole queue was replaced.
    Replaced {
        /// Display title of the new queue, if any.
        title: Option<String>,
        /// Number of tracks loaded so far.
        track_count: usize,
    },
    /// Another page was appended to the queue.
    PageAppended {
        /// Zero-based index of the appended page.
        page_index: usize,
        /// Number of tracks in the page.
        track_count: usize,
    },
    /// Shuffle was toggled.
    ShuffleChanged { enabled: bool },
    /// Repeat mode changed ("off", "all", "one").
    RepeatChanged { mode: String },
    /// A track was moved within the queue.
    ItemMoved { from: usize, to: usize },
    /// The active position changed. `-1` means nothing is selected.
    IndexChanged { index: i64 },
}

impl QueueEvent {
    fn description(&self) -> &str {
        match self {
            QueueEvent::Replaced { .. } => "Queue replaced",
            QueueEvent::PageAppended { .. } => "Queue page appended",
            QueueEvent::ShuffleChanged { .. } => "Shuffle changed",
            QueueEvent::RepeatChanged { .. } => "Repeat mode changed",
            QueueEvent::ItemMoved { .. } => "Queue item moved",
            QueueEvent::IndexChanged { .. } => "Queue position changed",
        }
    }
}

// ============================================================================
// Playback Events
// ============================================================================

/// Events related to the audio engine and transport.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "event")]
pub enum PlaybackEvent {
    /// A track was loaded and started.
    TrackStarted {
        /// The track ID being played.
        track_id: String,
        /// Track title.
        title: String,
    },
    /// Playback paused.
    Paused {
        track_id: String,
        position_secs: f64,
    },
    /// Playback resumed after pause.
    Resumed {
        track_id: String,
        position_secs: f64,
    },
    /// Track finished playing naturally.
    Ended { track_id: String },
    /// Playback position changed.
    PositionChanged {
        track_id: String,
        position_secs: f64,
        duration_secs: Option<f64>,
    },
    /// A fatal source error marked the track for reload; playback is paused
    /// until the user resumes.
    NeedsReload { track_id: String },
    /// Playback error occurred.
    Error {
        /// The track ID if available.
        track_id: Option<String>,
        /// Human-readable error message.
        message: String,
        /// Whether playback can be retried.
        recoverable: bool,
    },
}

impl PlaybackEvent {
    fn description(&self) -> &str {
        match self {
            PlaybackEvent::TrackStarted { .. } => "Playback started",
            PlaybackEvent::Paused { .. } => "Playback paused",
            PlaybackEvent::Resumed { .. } => "Playback resumed",
            PlaybackEvent::Ended { .. } => "Track completed",
            PlaybackEvent::PositionChanged { .. } => "Playback position changed",
            PlaybackEvent::NeedsReload { .. } => "Source marked for reload",
            PlaybackEvent::Error { .. } => "Playback error",
        }
    }
}

// ============================================================================
// Session Events
// ============================================================================

/// Events related to server reporting and the session play counter.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "event")]
pub enum SessionEvent {
    /// A playback-start report was delivered.
    StartReported { track_id: String },
    /// A playback-stop report was delivered.
    StopReported { track_id: String },
    /// A report could not be delivered. Reporting failures never interrupt
    /// playback.
    ReportFailed {
        track_id: String,
        message: String,
    },
    /// The session play counter changed.
    PlayCountChanged { count: u64 },
}

impl SessionEvent {
    fn description(&self) -> &str {
        match self {
            SessionEvent::StartReported { .. } => "Playback start reported",
            SessionEvent::StopReported { .. } => "Playback stop reported",
            SessionEvent::ReportFailed { .. } => "Playback report failed",
            SessionEvent::PlayCountChanged { .. } => "Session play count changed",
        }
    }
}

// ============================================================================
// Event Bus
// ============================================================================

/// Central event bus for publishing and subscribing to events.
///
/// Uses `tokio::sync::broadcast` internally, which provides:
/// - Multiple producers (clone the `EventBus`)
/// - Multiple consumers (each `subscribe()` creates a new receiver)
/// - Non-blocking sends (events are cloned for each subscriber)
/// - Lagging detection (slow subscribers get `RecvError::Lagged`)
///
/// # Example
///
/// ```rust
/// use core_runtime::events::{EventBus, PlayerEvent, QueueEvent};
///
/// # #[tokio::main]
/// # async fn main() {
/// let event_bus = EventBus::new(100);
/// let mut subscriber = event_bus.subscribe();
///
/// let event = PlayerEvent::Queue(QueueEvent::ShuffleChanged { enabled: true });
/// event_bus.emit(event).ok();
/// # }
/// ```
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<PlayerEvent>,
}

impl EventBus {
    /// Creates a new event bus with the specified buffer size.
    ///
    /// # Arguments
    ///
    /// * `capacity` - Maximum number of events to buffer per subscriber.
    ///   When a subscriber falls behind by more than this amount, it will
    ///   receive a `RecvError::Lagged` error.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Creates a new event bus with the default buffer size.
    #[allow(clippy::should_implement_trait)]
    pub fn default() -> Self {
        Self::new(DEFAULT_EVENT_BUFFER_SIZE)
    }

    /// Publishes an event to all subscribers.
    ///
    /// Returns the number of subscribers that received the event.
    /// Returns an error if there are no active subscribers.
    pub fn emit(&self, event: PlayerEvent) -> Result<usize, SendError<PlayerEvent>> {
        self.sender.send(event)
    }

    /// Creates a new subscriber to receive events.
    ///
    /// Each call creates an independent receiver that will receive all future
    /// events. Past events are not replayed.
    pub fn subscribe(&self) -> Receiver<PlayerEvent> {
        self.sender.subscribe()
    }

    /// Returns the number of active subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBus")
            .field("subscriber_count", &self.subscriber_count())
            .finish()
    }
}

// ============================================================================
// Event Stream Wrapper
// ============================================================================

/// Type alias for event filter functions.
type EventFilter = Box<dyn Fn(&PlayerEvent) -> bool + Send + Sync>;

/// A wrapper around `broadcast::Receiver` with additional filtering
/// capabilities.
///
/// This provides a more ergonomic API for consuming events with optional
/// filtering by event type or severity.
///
/// # Example
///
/// ```rust
/// use core_runtime::events::{EventBus, EventStream, PlayerEvent};
///
/// let event_bus = EventBus::new(100);
/// let stream = EventStream::new(event_bus.subscribe());
///
/// // Filter for queue events only
/// let mut queue_stream = stream.filter(|event| {
///     matches!(event, PlayerEvent::Queue(_))
/// });
/// ```
pub struct EventStream {
    receiver: Receiver<PlayerEvent>,
    filter: Option<EventFilter>,
}

impl EventStream {
    /// Creates a new event stream from a receiver.
    pub fn new(receiver: Receiver<PlayerEvent>) -> Self {
        Self {
            receiver,
            filter: None,
        }
    }

    /// Adds a filter function to this stream.
    ///
    /// Only events that match the filter will be returned by `recv()`.
    pub fn filter<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&PlayerEvent) -> bool + Send + Sync + 'static,
    {
        self.filter = Some(Box::new(predicate));
        self
    }

    /// Receives the next event that passes the filter (if any).
    ///
    /// This will skip events that don't match the filter and return the next
    /// matching event.
    ///
    /// # Errors
    ///
    /// Returns `RecvError::Lagged(n)` if the subscriber fell behind by `n`
    /// events. Returns `RecvError::Closed` if all senders have been dropped.
    pub async fn recv(&mut self) -> Result<PlayerEvent, RecvError> {
        loop {
            let event = self.receiver.recv().await?;

            let Some(filter) = &self.filter else {
                return Ok(event);
            };

            if filter(&event) {
                return Ok(event);
            }
        }
    }

    /// Attempts to receive an event without blocking.
    ///
    /// Returns `None` if no events are currently available.
    pub fn try_recv(&mut self) -> Option<Result<PlayerEvent, RecvError>> {
        loop {
            match self.receiver.try_recv() {
                Ok(event) => {
                    let Some(filter) = &self.filter else {
                        return Some(Ok(event));
                    };

                    if filter(&event) {
                        return Some(Ok(event));
                    }
                }
                Err(broadcast::error::TryRecvError::Empty) => return None,
                Err(broadcast::error::TryRecvError::Lagged(n)) => {
                    return Some(Err(RecvError::Lagged(n)))
                }
                Err(broadcast::error::TryRecvError::Closed) => return Some(Err(RecvError::Closed)),
            }
        }
    }
}

impl fmt::Debug for EventStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventStream")
            .field("has_filter", &self.filter.is_some())
            .finish()
    }
}

// ============================================================================
// Tests
// ============================================================================
