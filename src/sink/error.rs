use thiserror::Error;

/// Error returned by a [`Sink`](crate::sink::Sink) that failed to write a record.
#[derive(Debug, Error)]
pub enum SinkError {
    /// Writing to the underlying output failed.
    #[error("sink io error: {0}")]
    Io(#[from] std::io::Error),
    /// The sink no longer accepts records.
    #[error("sink closed")]
    Closed,
    /// The sink refused this record.
    #[error("sink rejected record: {0}")]
    Rejected(String),
    /// Any other downstream failure.
    #[error("sink error: {0}")]
    Other(#[source] Box<dyn std::error::Error + Send + Sync>),
}
