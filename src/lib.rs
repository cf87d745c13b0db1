#![deny(missing_docs)]
//! Tail buffering for logs.
//!
//! logtrap sits between logging call sites and a downstream [`Sink`]. Low
//! severity records are held back per correlation key (for example a request
//! id) in a small ring. Nothing is written for them under normal operation,
//! but as soon as a record at the flush level arrives for that key, the held
//! records are released in arrival order, followed by the record that
//! triggered the flush.
//!
//! ```
//! use std::sync::Arc;
//!
//! use logtrap::{CallContext, HandlerConfig, Level, LogRecord, LogTrap, MemorySink};
//!
//! let sink = Arc::new(MemorySink::new());
//! let trap = LogTrap::new(sink.clone(), HandlerConfig::default().attr_key("request_id"));
//! let ctx = CallContext::new().with_value("request_id", "req-1");
//!
//! trap.handle(&ctx, &LogRecord::new(Level::Debug, "loading user")).unwrap();
//! assert!(sink.is_empty());
//!
//! trap.handle(&ctx, &LogRecord::new(Level::Error, "user not found")).unwrap();
//! assert_eq!(sink.messages(), vec!["loading user", "user not found"]);
//! ```
//!
//! Buffers for keys that are never seen again are reclaimed without a
//! background thread; see [`registry`].

mod observability;

/// Monotonic clocks used for idle tracking.
pub mod clock;
/// Correlation keys, call contexts and key extraction.
pub mod key;
/// `tracing_subscriber` layer feeding a trap.
#[cfg(feature = "layer")]
pub mod layer;
/// Trap counters.
pub mod metrics;
/// Handler configuration.
pub mod option;
/// Log records, levels and attribute values.
pub mod record;
pub mod registry;
/// Downstream sinks.
pub mod sink;
/// Per-key ring buffer.
pub mod tail;
mod trap;

pub use crate::{
    key::{CallContext, CorrelationKey, KeyExtractor},
    metrics::TrapMetricsSnapshot,
    option::HandlerConfig,
    record::{Attr, Level, LogRecord, Value},
    registry::BufferRegistry,
    sink::{MemorySink, Sink, SinkError, WriterSink},
    tail::TailBuffer,
    trap::LogTrap,
};
