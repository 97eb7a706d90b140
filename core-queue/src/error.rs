use thiserror::Error;

/// Errors that can occur during queue operations.
#[derive(Error, Debug)]
pub enum QueueError {
    /// An index fell outside the currently loaded queue.
    #[error("Queue index {index} out of range (len {len})")]
    IndexOutOfRange { index: usize, len: usize },

    /// An operation that needs a queue was called with none loaded.
    #[error("No queue loaded")]
    EmptyQueue,

    /// The reviver descriptor failed validation.
    #[error("Invalid queue descriptor: {0}")]
    InvalidDescriptor(String),

    /// The persisted descriptor could not be parsed.
    #[error("Descriptor serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, QueueError>;
