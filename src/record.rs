//! Log records handed to a trap by callers.
//!
//! A [`LogRecord`] owns all of its data. The trap clones whatever it keeps, so
//! a caller may reuse or drop its record as soon as `handle` returns.

use std::{
    fmt,
    time::{SystemTime, UNIX_EPOCH},
};

/// Ordered severity of a record, lowest first.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Level {
    /// Very fine grained diagnostics.
    Trace,
    /// Diagnostics useful while debugging.
    Debug,
    /// Normal operational messages.
    Info,
    /// Something unexpected that the process recovered from.
    Warn,
    /// A failure.
    Error,
}

impl Level {
    /// Upper-case name, as written by text sinks.
    pub fn as_str(&self) -> &'static str {
        match self {
            Level::Trace => "TRACE",
            Level::Debug => "DEBUG",
            Level::Info => "INFO",
            Level::Warn => "WARN",
            Level::Error => "ERROR",
        }
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// `tracing::Level` orders TRACE above ERROR, so map by name rather than by rank.
impl From<tracing::Level> for Level {
    fn from(level: tracing::Level) -> Self {
        if level == tracing::Level::ERROR {
            Level::Error
        } else if level == tracing::Level::WARN {
            Level::Warn
        } else if level == tracing::Level::INFO {
            Level::Info
        } else if level == tracing::Level::DEBUG {
            Level::Debug
        } else {
            Level::Trace
        }
    }
}

/// Attribute value.
#[derive(Clone, Debug, PartialEq)]
pub enum Value {
    /// Text.
    Str(String),
    /// Signed integer.
    I64(i64),
    /// Unsigned integer.
    U64(u64),
    /// Floating point number.
    F64(f64),
    /// Boolean.
    Bool(bool),
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Str(v) => f.write_str(v),
            Value::I64(v) => write!(f, "{v}"),
            Value::U64(v) => write!(f, "{v}"),
            Value::F64(v) => write!(f, "{v}"),
            Value::Bool(v) => write!(f, "{v}"),
        }
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::Str(value.to_owned())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::Str(value)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::I64(value)
    }
}

impl From<i32> for Value {
    fn from(value: i32) -> Self {
        Value::I64(value.into())
    }
}

impl From<u64> for Value {
    fn from(value: u64) -> Self {
        Value::U64(value)
    }
}

impl From<u32> for Value {
    fn from(value: u32) -> Self {
        Value::U64(value.into())
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::F64(value)
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Bool(value)
    }
}

/// A named attribute attached to a record or a call context.
#[derive(Clone, Debug, PartialEq)]
pub struct Attr {
    /// Attribute name.
    pub key: String,
    /// Attribute value.
    pub value: Value,
}

impl Attr {
    /// Build an attribute from anything convertible to a [`Value`].
    pub fn new(key: impl Into<String>, value: impl Into<Value>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

/// One log event.
///
/// Records are built once and never mutated afterwards; the builder methods
/// consume `self`.
#[derive(Clone, Debug, PartialEq)]
pub struct LogRecord {
    level: Level,
    message: String,
    timestamp: SystemTime,
    attrs: Vec<Attr>,
}

impl LogRecord {
    /// A record stamped with the current wall-clock time.
    pub fn new(level: Level, message: impl Into<String>) -> Self {
        Self {
            level,
            message: message.into(),
            timestamp: SystemTime::now(),
            attrs: Vec::new(),
        }
    }

    /// Replace the timestamp.
    pub fn at(self, timestamp: SystemTime) -> Self {
        Self { timestamp, ..self }
    }

    /// Append one attribute.
    pub fn with_attr(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.attrs.push(Attr::new(key, value));
        self
    }

    /// Append several attributes, preserving their order.
    pub fn with_attrs(mut self, attrs: impl IntoIterator<Item = Attr>) -> Self {
        self.attrs.extend(attrs);
        self
    }

    /// Severity.
    pub fn level(&self) -> Level {
        self.level
    }

    /// Message text.
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Creation time.
    pub fn timestamp(&self) -> SystemTime {
        self.timestamp
    }

    /// Attributes in insertion order.
    pub fn attrs(&self) -> &[Attr] {
        &self.attrs
    }

    /// First attribute named `key`, if any.
    pub fn attr(&self, key: &str) -> Option<&Value> {
        self.attrs
            .iter()
            .find(|attr| attr.key == key)
            .map(|attr| &attr.value)
    }

    /// Copy of this record with `leading` placed before its own attributes and
    /// `prefix` prepended to the names of its own attributes.
    pub(crate) fn scoped(&self, leading: &[Attr], prefix: &str) -> LogRecord {
        let mut attrs = Vec::with_capacity(leading.len() + self.attrs.len());
        attrs.extend_from_slice(leading);
        attrs.extend(self.attrs.iter().map(|attr| Attr {
            key: format!("{prefix}{}", attr.key),
            value: attr.value.clone(),
        }));
        LogRecord {
            level: self.level,
            message: self.message.clone(),
            timestamp: self.timestamp,
            attrs,
        }
    }

    /// Milliseconds since the unix epoch, saturating at zero for earlier times.
    pub(crate) fn unix_millis(&self) -> u128 {
        self.timestamp
            .duration_since(UNIX_EPOCH)
            .map(|elapsed| elapsed.as_millis())
            .unwrap_or_default()
    }
}
