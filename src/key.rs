//! Correlation keys and how a record is mapped to one.

use std::{fmt, sync::Arc};

use crate::record::{Attr, LogRecord, Value};

/// Identity of a group of related records, e.g. one request.
///
/// Records that carry no key at all share [`CorrelationKey::Unkeyed`].
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum CorrelationKey {
    /// Shared key for every record without a resolvable key.
    Unkeyed,
    /// Text key.
    Str(Arc<str>),
    /// Signed integer key.
    I64(i64),
    /// Unsigned integer key.
    U64(u64),
    /// Boolean key.
    Bool(bool),
    /// Float key, compared by bit pattern.
    F64Bits(u64),
}

impl From<&Value> for CorrelationKey {
    fn from(value: &Value) -> Self {
        match value {
            Value::Str(v) => CorrelationKey::Str(Arc::from(v.as_str())),
            Value::I64(v) => CorrelationKey::I64(*v),
            Value::U64(v) => CorrelationKey::U64(*v),
            Value::F64(v) => CorrelationKey::F64Bits(v.to_bits()),
            Value::Bool(v) => CorrelationKey::Bool(*v),
        }
    }
}

impl From<&str> for CorrelationKey {
    fn from(value: &str) -> Self {
        CorrelationKey::Str(Arc::from(value))
    }
}

impl fmt::Display for CorrelationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CorrelationKey::Unkeyed => f.write_str("nokey"),
            CorrelationKey::Str(v) => f.write_str(v),
            CorrelationKey::I64(v) => write!(f, "{v}"),
            CorrelationKey::U64(v) => write!(f, "{v}"),
            CorrelationKey::Bool(v) => write!(f, "{v}"),
            CorrelationKey::F64Bits(bits) => write!(f, "{}", f64::from_bits(*bits)),
        }
    }
}

/// Ambient values in scope for a logging call, e.g. fields of the enclosing
/// spans or values attached by request middleware.
///
/// Later values shadow earlier ones with the same name.
#[derive(Clone, Debug, Default)]
pub struct CallContext {
    values: Vec<Attr>,
}

impl CallContext {
    /// An empty context.
    pub fn new() -> Self {
        Self::default()
    }

    /// A copy of this context with one more value.
    pub fn with_value(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.values.push(Attr::new(key, value));
        self
    }

    /// Add a value in place.
    pub fn insert(&mut self, attr: Attr) {
        self.values.push(attr);
    }

    /// Most recently inserted value named `key`.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.values
            .iter()
            .rev()
            .find(|attr| attr.key == key)
            .map(|attr| &attr.value)
    }

    /// Whether the context holds no values.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// Resolves the correlation key of a record.
///
/// Lookup order is fixed: the call context first, then attributes attached
/// by the handler, then the record's own attributes in order, then
/// [`CorrelationKey::Unkeyed`]. Record attributes are matched by their own
/// name, whatever group the handler places them in.
#[derive(Clone, Debug)]
pub struct KeyExtractor {
    attr_key: Arc<str>,
}

impl KeyExtractor {
    /// Extractor looking for values named `attr_key`.
    pub fn new(attr_key: impl AsRef<str>) -> Self {
        Self {
            attr_key: Arc::from(attr_key.as_ref()),
        }
    }

    /// Name this extractor looks for.
    pub fn attr_key(&self) -> &str {
        &self.attr_key
    }

    /// Never fails; an unmatched record resolves to the shared sentinel key.
    pub fn extract(&self, ctx: &CallContext, record: &LogRecord) -> CorrelationKey {
        self.extract_scoped(ctx, &[], record)
    }

    /// Like [`extract`](Self::extract), checking `handler_attrs` between the
    /// context and the record.
    pub(crate) fn extract_scoped(
        &self,
        ctx: &CallContext,
        handler_attrs: &[Attr],
        record: &LogRecord,
    ) -> CorrelationKey {
        if self.attr_key.is_empty() {
            return CorrelationKey::Unkeyed;
        }
        ctx.get(&self.attr_key)
            .or_else(|| {
                handler_attrs
                    .iter()
                    .find(|attr| *attr.key == *self.attr_key)
                    .map(|attr| &attr.value)
            })
            .or_else(|| record.attr(&self.attr_key))
            .map(CorrelationKey::from)
            .unwrap_or(CorrelationKey::Unkeyed)
    }
}
