//! Diagnostics logtrap emits about itself.
//!
//! Buffer creation, reclamation, flushes and sink failures are reported as
//! `tracing` events under the "logtrap" target, each tagged with `component`
//! and `event` fields. The crate only emits; wiring up a subscriber is left to
//! the application.
//!
//! These events can reach the `TrapLayer` of the `layer` feature when it is
//! installed in the same subscriber. The layer drops anything under the
//! "logtrap" target, and no event is emitted while the registry lock is held, so a
//! diagnostic never re-enters a trap that is still busy with the record that
//! caused it.

/// Target for all logtrap diagnostic events.
pub(crate) const TRAP_TARGET: &str = "logtrap";

/// Macro for trace-level diagnostic events.
///
/// # Example
/// ```ignore
/// log_trace!(
///     component = "registry",
///     event = "tail_created",
///     key = %key,
///     capacity,
/// );
/// ```
macro_rules! log_trace {
    ($($field:tt)*) => {
        ::tracing::trace!(target: $crate::observability::TRAP_TARGET, $($field)*)
    };
}

/// Macro for debug-level diagnostic events.
macro_rules! log_debug {
    ($($field:tt)*) => {
        ::tracing::debug!(target: $crate::observability::TRAP_TARGET, $($field)*)
    };
}

/// Macro for warn-level diagnostic events.
macro_rules! log_warn {
    ($($field:tt)*) => {
        ::tracing::warn!(target: $crate::observability::TRAP_TARGET, $($field)*)
    };
}

pub(crate) use log_debug;
pub(crate) use log_trace;
pub(crate) use log_warn;
