//! Counters describing what a trap did with the records it saw.
//!
//! Counters are cumulative for the lifetime of the trap and shared by every
//! handler derived from it.

use std::sync::atomic::{AtomicU64, Ordering};

/// Snapshot of trap counters.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub struct TrapMetricsSnapshot {
    /// Records held back in a tail buffer.
    pub records_buffered: u64,
    /// Records emitted straight to the sink without buffering.
    pub records_passed_through: u64,
    /// Buffered records released to the sink by a flush.
    pub records_flushed: u64,
    /// Buffered records overwritten because their ring was full.
    pub records_overwritten: u64,
    /// Flush-level records handled.
    pub flushes: u64,
    /// Tail buffers created.
    pub buffers_created: u64,
    /// Registry entries removed by reclamation.
    pub buffers_reclaimed: u64,
    /// Emits the sink rejected.
    pub sink_errors: u64,
}

#[derive(Debug, Default)]
pub(crate) struct TrapMetrics {
    records_buffered: AtomicU64,
    records_passed_through: AtomicU64,
    records_flushed: AtomicU64,
    records_overwritten: AtomicU64,
    flushes: AtomicU64,
    buffers_created: AtomicU64,
    buffers_reclaimed: AtomicU64,
    sink_errors: AtomicU64,
}

impl TrapMetrics {
    pub(crate) fn record_buffered(&self, overwrote: bool) {
        self.records_buffered.fetch_add(1, Ordering::Relaxed);
        if overwrote {
            self.records_overwritten.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub(crate) fn record_passed_through(&self) {
        self.records_passed_through.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_flush(&self, drained: u64) {
        self.flushes.fetch_add(1, Ordering::Relaxed);
        self.records_flushed.fetch_add(drained, Ordering::Relaxed);
    }

    pub(crate) fn record_buffer_created(&self) {
        self.buffers_created.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_reclaimed(&self, count: u64) {
        if count > 0 {
            self.buffers_reclaimed.fetch_add(count, Ordering::Relaxed);
        }
    }

    pub(crate) fn record_sink_error(&self) {
        self.sink_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn snapshot(&self) -> TrapMetricsSnapshot {
        TrapMetricsSnapshot {
            records_buffered: self.records_buffered.load(Ordering::Relaxed),
            records_passed_through: self.records_passed_through.load(Ordering::Relaxed),
            records_flushed: self.records_flushed.load(Ordering::Relaxed),
            records_overwritten: self.records_overwritten.load(Ordering::Relaxed),
            flushes: self.flushes.load(Ordering::Relaxed),
            buffers_created: self.buffers_created.load(Ordering::Relaxed),
            buffers_reclaimed: self.buffers_reclaimed.load(Ordering::Relaxed),
            sink_errors: self.sink_errors.load(Ordering::Relaxed),
        }
    }
}
