use std::fmt;

use parking_lot::Mutex;

use super::{Sink, SinkError};
use crate::record::{Level, LogRecord};

type FailWhen = Box<dyn Fn(&LogRecord) -> bool + Send + Sync>;

/// Sink that keeps every emitted record in memory.
///
/// Useful for tests and for inspecting what a trap released. A predicate set
/// with [`MemorySink::failing_when`] makes matching emits fail with
/// [`SinkError::Rejected`]; rejected records are not stored.
pub struct MemorySink {
    min_level: Level,
    records: Mutex<Vec<LogRecord>>,
    fail_when: Option<FailWhen>,
}

impl MemorySink {
    /// Sink accepting every level.
    pub fn new() -> Self {
        Self {
            min_level: Level::Trace,
            records: Mutex::new(Vec::new()),
            fail_when: None,
        }
    }

    /// Only accept records at `min_level` or above.
    pub fn with_min_level(self, min_level: Level) -> Self {
        Self { min_level, ..self }
    }

    /// Reject records matching `predicate`.
    pub fn failing_when<F>(self, predicate: F) -> Self
    where
        F: Fn(&LogRecord) -> bool + Send + Sync + 'static,
    {
        Self {
            fail_when: Some(Box::new(predicate)),
            ..self
        }
    }

    /// Copies of the records emitted so far, in emit order.
    pub fn records(&self) -> Vec<LogRecord> {
        self.records.lock().clone()
    }

    /// Messages of the records emitted so far, in emit order.
    pub fn messages(&self) -> Vec<String> {
        self.records
            .lock()
            .iter()
            .map(|record| record.message().to_owned())
            .collect()
    }

    /// Number of records emitted so far.
    pub fn len(&self) -> usize {
        self.records.lock().len()
    }

    /// Whether nothing has been emitted.
    pub fn is_empty(&self) -> bool {
        self.records.lock().is_empty()
    }

    /// Forget every stored record.
    pub fn clear(&self) {
        self.records.lock().clear();
    }
}

impl Default for MemorySink {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for MemorySink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemorySink")
            .field("min_level", &self.min_level)
            .field("records", &self.len())
            .field("fails", &self.fail_when.is_some())
            .finish()
    }
}

impl Sink for MemorySink {
    fn enabled(&self, level: Level) -> bool {
        level >= self.min_level
    }

    fn emit(&self, record: &LogRecord) -> Result<(), SinkError> {
        if let Some(fail_when) = &self.fail_when {
            if fail_when(record) {
                return Err(SinkError::Rejected(record.message().to_owned()));
            }
        }
        self.records.lock().push(record.clone());
        Ok(())
    }
}
