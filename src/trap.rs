//! The trap: decides per record whether to pass it through, hold it, or
//! release a key's held records.
//!
//! Per key the trap cycles between two implicit states derived from the
//! registry: no buffer, and buffering. A flush-level record or reclamation
//! moves the key back to no buffer.

use std::{fmt, sync::Arc};

use crate::{
    clock::{Clock, SystemClock},
    key::{CallContext, CorrelationKey, KeyExtractor},
    metrics::{TrapMetrics, TrapMetricsSnapshot},
    observability::{log_debug, log_warn},
    option::HandlerConfig,
    record::{Attr, Level, LogRecord},
    registry::BufferRegistry,
    sink::{Sink, SinkError},
};

/// Tail-buffering log handler in front of a [`Sink`].
///
/// Records at or below the tail level are held per correlation key. A record
/// at or above the flush level releases the key's held records, oldest first,
/// and is then written itself. Everything in between goes straight through.
///
/// Cloning a `LogTrap`, or deriving one with [`with_attrs`](Self::with_attrs)
/// or [`with_group`](Self::with_group), shares the buffers and the sink.
pub struct LogTrap<S> {
    shared: Arc<Shared<S>>,
    scope: Arc<Scope>,
}

struct Shared<S> {
    sink: S,
    config: HandlerConfig,
    extractor: KeyExtractor,
    registry: BufferRegistry,
    metrics: Arc<TrapMetrics>,
}

/// Attributes and group prefix added by derived handlers.
#[derive(Clone, Debug, Default)]
struct Scope {
    attrs: Vec<Attr>,
    prefix: String,
}

impl Scope {
    fn is_empty(&self) -> bool {
        self.attrs.is_empty() && self.prefix.is_empty()
    }
}

impl<S> Clone for LogTrap<S> {
    fn clone(&self) -> Self {
        Self {
            shared: self.shared.clone(),
            scope: self.scope.clone(),
        }
    }
}

impl<S> LogTrap<S>
where
    S: Sink,
{
    /// Trap writing to `sink`. `None` uses [`HandlerConfig::default`].
    pub fn new(sink: S, config: impl Into<Option<HandlerConfig>>) -> Self {
        Self::with_clock(sink, config, Arc::new(SystemClock))
    }

    /// Same as [`LogTrap::new`] with an explicit clock for idle tracking.
    pub fn with_clock(
        sink: S,
        config: impl Into<Option<HandlerConfig>>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let config = config.into().unwrap_or_default();
        let metrics = Arc::new(TrapMetrics::default());
        let registry = BufferRegistry::build(
            config.resolved_max_tracked_keys(),
            config.resolved_idle_timeout(),
            clock,
            metrics.clone(),
        );
        let extractor = KeyExtractor::new(config.resolved_attr_key());
        Self {
            shared: Arc::new(Shared {
                sink,
                config,
                extractor,
                registry,
                metrics,
            }),
            scope: Arc::new(Scope::default()),
        }
    }

    /// Whether the sink accepts `level` at all.
    pub fn enabled(&self, level: Level) -> bool {
        self.shared.sink.enabled(level)
    }

    /// Route one record.
    ///
    /// Returns the sink's error if a write fails. When a flush hits a failing
    /// write, the remaining held records are dropped, the triggering record is
    /// still written, and its error wins over the earlier one.
    pub fn handle(&self, ctx: &CallContext, record: &LogRecord) -> Result<(), SinkError> {
        let shared = &*self.shared;
        if !shared.sink.enabled(record.level()) {
            return Ok(());
        }

        // The key comes from the record as logged; group prefixes only apply
        // to what is held or written.
        let key = shared.config.buffering_enabled().then(|| {
            shared
                .extractor
                .extract_scoped(ctx, &self.scope.attrs, record)
        });

        let scoped;
        let record = if self.scope.is_empty() {
            record
        } else {
            scoped = record.scoped(&self.scope.attrs, &self.scope.prefix);
            &scoped
        };

        let Some(key) = key else {
            shared.metrics.record_passed_through();
            return self.emit(record);
        };

        let level = record.level();
        if level >= shared.config.resolved_flush_level() {
            return self.flush(&key, record);
        }
        if level > shared.config.resolved_tail_level() {
            shared.metrics.record_passed_through();
            return self.emit(record);
        }

        let outcome = shared.registry.append(
            &key,
            shared.config.resolved_tail_capacity(),
            record.clone(),
        );
        shared.metrics.record_buffered(outcome.overwrote);
        Ok(())
    }

    fn flush(&self, key: &CorrelationKey, record: &LogRecord) -> Result<(), SinkError> {
        let shared = &*self.shared;
        let mut drained = 0u64;
        let mut drain_error = None;
        if let Some(tail) = shared.registry.take_and_remove(key) {
            let ring = tail.lock();
            for held in ring.drain_in_order() {
                if let Err(err) = self.emit(held) {
                    drain_error = Some(err);
                    break;
                }
                drained += 1;
            }
        }
        shared.metrics.record_flush(drained);
        log_debug!(
            component = "trap",
            event = "tail_flushed",
            key = %key,
            drained,
            aborted = drain_error.is_some(),
        );

        self.emit(record)?;
        match drain_error {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    fn emit(&self, record: &LogRecord) -> Result<(), SinkError> {
        self.shared.sink.emit(record).inspect_err(|err| {
            self.shared.metrics.record_sink_error();
            log_warn!(
                component = "trap",
                event = "sink_emit_failed",
                level = %record.level(),
                error = %err,
            );
        })
    }

    /// Derived handler that adds `attrs` to every record it handles.
    ///
    /// Inside a group the attribute names are qualified with the group path.
    pub fn with_attrs(&self, attrs: impl IntoIterator<Item = Attr>) -> Self {
        let mut scope = (*self.scope).clone();
        let before = scope.attrs.len();
        scope.attrs.extend(attrs.into_iter().map(|attr| Attr {
            key: format!("{}{}", scope.prefix, attr.key),
            value: attr.value,
        }));
        if scope.attrs.len() == before {
            return self.clone();
        }
        self.derive(scope)
    }

    /// Derived handler that qualifies the names of attributes added from now
    /// on, including each record's own attributes, with `name.`.
    pub fn with_group(&self, name: &str) -> Self {
        if name.is_empty() {
            return self.clone();
        }
        let mut scope = (*self.scope).clone();
        scope.prefix.push_str(name);
        scope.prefix.push('.');
        self.derive(scope)
    }

    fn derive(&self, scope: Scope) -> Self {
        Self {
            shared: self.shared.clone(),
            scope: Arc::new(scope),
        }
    }

    /// Number of keys that currently hold a buffer.
    pub fn current_buffer_count(&self) -> usize {
        self.shared.registry.len()
    }

    /// Counters accumulated since the trap was created.
    pub fn metrics(&self) -> TrapMetricsSnapshot {
        self.shared.metrics.snapshot()
    }

    /// Active configuration.
    pub fn config(&self) -> &HandlerConfig {
        &self.shared.config
    }

    /// The wrapped sink.
    pub fn sink(&self) -> &S {
        &self.shared.sink
    }
}

impl<S> fmt::Debug for LogTrap<S>
where
    S: fmt::Debug,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LogTrap")
            .field("sink", &self.shared.sink)
            .field("config", &self.shared.config)
            .field("registry", &self.shared.registry)
            .field("scope", &self.scope)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{record::Value, sink::MemorySink};

    fn trap(config: HandlerConfig) -> LogTrap<Arc<MemorySink>> {
        LogTrap::new(Arc::new(MemorySink::new()), config)
    }

    fn keyed(level: Level, msg: &str, key: &str) -> LogRecord {
        LogRecord::new(level, msg).with_attr("request_id", key)
    }

    #[test]
    fn scenario_capacity_two() {
        let trap = trap(HandlerConfig::default().tail_capacity(2));
        let ctx = CallContext::new().with_value("request_id", "req-1");
        for msg in ["a", "b", "c"] {
            trap.handle(&ctx, &LogRecord::new(Level::Info, msg)).unwrap();
        }
        assert!(trap.sink().is_empty());
        assert_eq!(trap.current_buffer_count(), 1);

        trap.handle(&ctx, &LogRecord::new(Level::Error, "boom"))
            .unwrap();
        assert_eq!(trap.sink().messages(), vec!["b", "c", "boom"]);
        assert_eq!(trap.current_buffer_count(), 0);

        trap.sink().clear();
        trap.handle(&ctx, &LogRecord::new(Level::Info, "d")).unwrap();
        assert_eq!(trap.current_buffer_count(), 1);
        trap.handle(&ctx, &LogRecord::new(Level::Error, "again"))
            .unwrap();
        assert_eq!(trap.sink().messages(), vec!["d", "again"]);
    }

    #[test]
    fn threshold_boundaries() {
        let trap = trap(
            HandlerConfig::default()
                .tail_level(Level::Info)
                .flush_level(Level::Error),
        );
        let ctx = CallContext::new();
        trap.handle(&ctx, &keyed(Level::Info, "at-tail", "k")).unwrap();
        assert!(trap.sink().is_empty());

        trap.handle(&ctx, &keyed(Level::Warn, "between", "k")).unwrap();
        assert_eq!(trap.sink().messages(), vec!["between"]);

        trap.handle(&ctx, &keyed(Level::Error, "at-flush", "k")).unwrap();
        assert_eq!(
            trap.sink().messages(),
            vec!["between", "at-tail", "at-flush"]
        );
    }

    #[test]
    fn disabled_buffering_passes_everything_through() {
        let trap = trap(HandlerConfig::default().tail_capacity(0));
        let ctx = CallContext::new();
        for level in [Level::Trace, Level::Debug, Level::Info, Level::Warn, Level::Error] {
            trap.handle(&ctx, &keyed(level, level.as_str(), "k")).unwrap();
        }
        assert_eq!(trap.sink().len(), 5);
        assert_eq!(trap.current_buffer_count(), 0);
        assert_eq!(trap.metrics().buffers_created, 0);
    }

    #[test]
    fn keys_are_flushed_independently() {
        let trap = trap(HandlerConfig::default());
        let ctx = CallContext::new();
        trap.handle(&ctx, &keyed(Level::Debug, "a1", "a")).unwrap();
        trap.handle(&ctx, &keyed(Level::Debug, "b1", "b")).unwrap();
        trap.handle(&ctx, &keyed(Level::Debug, "a2", "a")).unwrap();
        trap.handle(&ctx, &keyed(Level::Error, "a-err", "a")).unwrap();
        assert_eq!(trap.sink().messages(), vec!["a1", "a2", "a-err"]);
        assert_eq!(trap.current_buffer_count(), 1);
    }

    #[test]
    fn flush_without_buffer_emits_only_trigger() {
        let trap = trap(HandlerConfig::default());
        trap.handle(&CallContext::new(), &keyed(Level::Error, "boom", "k"))
            .unwrap();
        assert_eq!(trap.sink().messages(), vec!["boom"]);
        assert_eq!(trap.metrics().flushes, 1);
        assert_eq!(trap.metrics().records_flushed, 0);
    }

    #[test]
    fn sink_disabled_levels_are_dropped_entirely() {
        let sink = Arc::new(MemorySink::new().with_min_level(Level::Info));
        let trap = LogTrap::new(sink, None);
        let ctx = CallContext::new();
        trap.handle(&ctx, &keyed(Level::Debug, "hidden", "k")).unwrap();
        assert_eq!(trap.current_buffer_count(), 0);
        trap.handle(&ctx, &keyed(Level::Error, "boom", "k")).unwrap();
        assert_eq!(trap.sink().messages(), vec!["boom"]);
    }

    #[test]
    fn drain_failure_aborts_drain_but_emits_trigger() {
        let sink = Arc::new(MemorySink::new().failing_when(|r| r.message() == "bad"));
        let trap = LogTrap::new(sink, HandlerConfig::default());
        let ctx = CallContext::new();
        for msg in ["ok", "bad", "lost"] {
            trap.handle(&ctx, &keyed(Level::Info, msg, "k")).unwrap();
        }
        let err = trap
            .handle(&ctx, &keyed(Level::Error, "boom", "k"))
            .unwrap_err();
        assert!(matches!(err, SinkError::Rejected(msg) if msg == "bad"));
        assert_eq!(trap.sink().messages(), vec!["ok", "boom"]);
        assert_eq!(trap.current_buffer_count(), 0);
        assert_eq!(trap.metrics().sink_errors, 1);
    }

    #[test]
    fn trigger_failure_is_returned() {
        let sink = Arc::new(MemorySink::new().failing_when(|r| r.level() == Level::Error));
        let trap = LogTrap::new(sink, HandlerConfig::default());
        let ctx = CallContext::new();
        trap.handle(&ctx, &keyed(Level::Info, "held", "k")).unwrap();
        let err = trap
            .handle(&ctx, &keyed(Level::Error, "boom", "k"))
            .unwrap_err();
        assert!(matches!(err, SinkError::Rejected(msg) if msg == "boom"));
        assert_eq!(trap.sink().messages(), vec!["held"]);
    }

    #[test]
    fn unkeyed_records_share_one_buffer() {
        let trap = trap(HandlerConfig::default());
        let ctx = CallContext::new();
        trap.handle(&ctx, &LogRecord::new(Level::Info, "x")).unwrap();
        trap.handle(&ctx, &LogRecord::new(Level::Debug, "y")).unwrap();
        assert_eq!(trap.current_buffer_count(), 1);
        trap.handle(&ctx, &LogRecord::new(Level::Error, "z")).unwrap();
        assert_eq!(trap.sink().messages(), vec!["x", "y", "z"]);
    }

    #[test]
    fn derived_handlers_share_buffers_and_scope_attrs() {
        let root = trap(HandlerConfig::default());
        let request = root.with_attrs([Attr::new("request_id", "r-7")]);
        let ctx = CallContext::new();
        request
            .handle(&ctx, &LogRecord::new(Level::Info, "scoped"))
            .unwrap();
        root.handle(&ctx, &keyed(Level::Error, "boom", "r-7")).unwrap();

        let records = root.sink().records();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].message(), "scoped");
        assert_eq!(records[0].attr("request_id"), Some(&Value::from("r-7")));
    }

    #[test]
    fn groups_qualify_later_attributes() {
        let root = trap(HandlerConfig::default().tail_capacity(0));
        let grouped = root
            .with_attrs([Attr::new("svc", "api")])
            .with_group("http")
            .with_attrs([Attr::new("method", "GET")]);
        grouped
            .handle(
                &CallContext::new(),
                &LogRecord::new(Level::Info, "m").with_attr("status", 200),
            )
            .unwrap();
        let record = &root.sink().records()[0];
        let keys: Vec<_> = record.attrs().iter().map(|a| a.key.as_str()).collect();
        assert_eq!(keys, vec!["svc", "http.method", "http.status"]);
    }

    #[test]
    fn grouped_records_keep_their_own_key() {
        let root = trap(HandlerConfig::default());
        let http = root.with_group("http");
        let ctx = CallContext::new();
        http.handle(&ctx, &keyed(Level::Info, "a-step", "A")).unwrap();
        http.handle(&ctx, &keyed(Level::Info, "b-step", "B")).unwrap();
        assert_eq!(root.current_buffer_count(), 2);

        http.handle(&ctx, &keyed(Level::Error, "b-boom", "B")).unwrap();
        assert_eq!(root.sink().messages(), vec!["b-step", "b-boom"]);
        let records = root.sink().records();
        assert_eq!(records[0].attr("http.request_id"), Some(&Value::from("B")));
        assert_eq!(records[0].attr("request_id"), None);

        root.handle(&ctx, &keyed(Level::Error, "a-boom", "A")).unwrap();
        assert_eq!(
            root.sink().messages(),
            vec!["b-step", "b-boom", "a-step", "a-boom"]
        );
        assert_eq!(root.current_buffer_count(), 0);
    }

    #[test]
    fn empty_scopes_are_no_ops() {
        let root = trap(HandlerConfig::default());
        let same = root.with_attrs(Vec::new()).with_group("");
        assert!(Arc::ptr_eq(&root.scope, &same.scope));
    }
}
