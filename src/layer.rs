//! `tracing` integration.
//!
//! [`TrapLayer`] feeds `tracing` events through a [`LogTrap`]. The ambient
//! context of an event is the set of fields recorded on its enclosing spans;
//! fields of inner spans shadow those of outer ones. Events emitted by
//! logtrap itself are ignored.
//!
//! ```no_run
//! use std::io;
//!
//! use logtrap::{layer::TrapLayer, HandlerConfig, LogTrap, WriterSink};
//! use tracing_subscriber::prelude::*;
//!
//! let trap = LogTrap::new(WriterSink::new(io::stdout()), HandlerConfig::default());
//! tracing_subscriber::registry()
//!     .with(TrapLayer::new(trap))
//!     .init();
//!
//! let span = tracing::info_span!("request", request_id = "r-1").entered();
//! tracing::debug!("cache miss");
//! tracing::error!("upstream timed out"); // writes "cache miss", then this
//! # drop(span);
//! ```

use std::fmt;

use tracing::{
    field::{Field, Visit},
    span, Event, Subscriber,
};
use tracing_subscriber::{layer::Context, registry::LookupSpan, Layer};

use crate::{
    key::CallContext,
    observability::TRAP_TARGET,
    record::{Attr, Level, LogRecord, Value},
    sink::Sink,
    trap::LogTrap,
};

/// [`Layer`] that routes events through a [`LogTrap`].
///
/// Sink failures cannot be returned from a layer; they show up in
/// [`LogTrap::metrics`] as `sink_errors`.
#[derive(Debug)]
pub struct TrapLayer<S> {
    trap: LogTrap<S>,
}

impl<S> TrapLayer<S>
where
    S: Sink,
{
    /// Layer writing through `trap`.
    pub fn new(trap: LogTrap<S>) -> Self {
        Self { trap }
    }

    /// The trap behind this layer.
    pub fn trap(&self) -> &LogTrap<S> {
        &self.trap
    }
}

/// Fields recorded on a span, kept in the span's extensions.
struct SpanFields(Vec<Attr>);

#[derive(Default)]
struct FieldVisitor {
    message: Option<String>,
    attrs: Vec<Attr>,
}

impl FieldVisitor {
    fn push(&mut self, field: &Field, value: Value) {
        if field.name() == "message" {
            self.message = Some(value.to_string());
        } else {
            self.attrs.push(Attr::new(field.name(), value));
        }
    }
}

impl Visit for FieldVisitor {
    fn record_f64(&mut self, field: &Field, value: f64) {
        self.push(field, Value::F64(value));
    }

    fn record_i64(&mut self, field: &Field, value: i64) {
        self.push(field, Value::I64(value));
    }

    fn record_u64(&mut self, field: &Field, value: u64) {
        self.push(field, Value::U64(value));
    }

    fn record_bool(&mut self, field: &Field, value: bool) {
        self.push(field, Value::Bool(value));
    }

    fn record_str(&mut self, field: &Field, value: &str) {
        self.push(field, Value::from(value));
    }

    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        self.push(field, Value::Str(format!("{value:?}")));
    }
}

impl<S, Sub> Layer<Sub> for TrapLayer<S>
where
    S: Sink + 'static,
    Sub: Subscriber + for<'a> LookupSpan<'a>,
{
    fn on_new_span(&self, attrs: &span::Attributes<'_>, id: &span::Id, ctx: Context<'_, Sub>) {
        let Some(span) = ctx.span(id) else {
            return;
        };
        let mut visitor = FieldVisitor::default();
        attrs.record(&mut visitor);
        span.extensions_mut().replace(SpanFields(visitor.attrs));
    }

    fn on_record(&self, id: &span::Id, values: &span::Record<'_>, ctx: Context<'_, Sub>) {
        let Some(span) = ctx.span(id) else {
            return;
        };
        let mut visitor = FieldVisitor::default();
        values.record(&mut visitor);
        let mut extensions = span.extensions_mut();
        match extensions.get_mut::<SpanFields>() {
            Some(fields) => fields.0.extend(visitor.attrs),
            None => extensions.insert(SpanFields(visitor.attrs)),
        }
    }

    fn on_event(&self, event: &Event<'_>, ctx: Context<'_, Sub>) {
        let metadata = event.metadata();
        if metadata.target() == TRAP_TARGET {
            return;
        }
        let level = Level::from(*metadata.level());
        if !self.trap.enabled(level) {
            return;
        }

        let mut visitor = FieldVisitor::default();
        event.record(&mut visitor);
        let record = LogRecord::new(level, visitor.message.unwrap_or_default())
            .with_attrs(visitor.attrs);

        let mut call_ctx = CallContext::new();
        if let Some(scope) = ctx.event_scope(event) {
            for span in scope.from_root() {
                let extensions = span.extensions();
                if let Some(fields) = extensions.get::<SpanFields>() {
                    for attr in &fields.0 {
                        call_ctx.insert(attr.clone());
                    }
                }
            }
        }

        // Failures are already counted and reported by the trap.
        let _ = self.trap.handle(&call_ctx, &record);
    }
}
