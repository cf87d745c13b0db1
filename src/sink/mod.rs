//! Downstream outputs a trap writes to.
//!
//! A [`Sink`] is anything that accepts finished records and can say which
//! levels it cares about. The trap consults [`Sink::enabled`] before doing any
//! buffering work and hands every released record to [`Sink::emit`].

mod error;
mod memory;
mod writer;

use std::sync::Arc;

pub use error::SinkError;
pub use memory::MemorySink;
pub use writer::WriterSink;

use crate::record::{Level, LogRecord};

/// Destination for records released by a trap.
pub trait Sink: Send + Sync {
    /// Whether records at `level` would be written at all.
    fn enabled(&self, level: Level) -> bool;

    /// Write one record.
    fn emit(&self, record: &LogRecord) -> Result<(), SinkError>;
}

impl<S> Sink for Arc<S>
where
    S: Sink + ?Sized,
{
    fn enabled(&self, level: Level) -> bool {
        (**self).enabled(level)
    }

    fn emit(&self, record: &LogRecord) -> Result<(), SinkError> {
        (**self).emit(record)
    }
}

impl<S> Sink for Box<S>
where
    S: Sink + ?Sized,
{
    fn enabled(&self, level: Level) -> bool {
        (**self).enabled(level)
    }

    fn emit(&self, record: &LogRecord) -> Result<(), SinkError> {
        (**self).emit(record)
    }
}
