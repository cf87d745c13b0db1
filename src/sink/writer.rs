use std::io::Write;

use parking_lot::Mutex;

use super::{Sink, SinkError};
use crate::record::{Level, LogRecord, Value};

/// Line-oriented text sink over any [`Write`].
///
/// Each record becomes one line of `key=value` pairs:
///
/// ```text
/// time=1700000000123 level=ERROR msg="payment failed" request_id=r-1
/// ```
///
/// `time` is milliseconds since the unix epoch. Strings containing spaces,
/// quotes or `=` are quoted.
#[derive(Debug)]
pub struct WriterSink<W> {
    writer: Mutex<W>,
    min_level: Level,
    with_time: bool,
}

impl<W> WriterSink<W>
where
    W: Write + Send,
{
    /// Sink accepting every level.
    pub fn new(writer: W) -> Self {
        Self {
            writer: Mutex::new(writer),
            min_level: Level::Trace,
            with_time: true,
        }
    }

    /// Only accept records at `min_level` or above.
    pub fn with_min_level(self, min_level: Level) -> Self {
        Self { min_level, ..self }
    }

    /// Leave the `time` field out, for reproducible output.
    pub fn without_time(self) -> Self {
        Self {
            with_time: false,
            ..self
        }
    }

    /// Give the writer back.
    pub fn into_inner(self) -> W {
        self.writer.into_inner()
    }

    fn format(&self, record: &LogRecord) -> String {
        let mut line = String::new();
        if self.with_time {
            line.push_str(&format!("time={} ", record.unix_millis()));
        }
        line.push_str(&format!("level={} msg=", record.level()));
        push_text(&mut line, record.message());
        for attr in record.attrs() {
            line.push(' ');
            push_text(&mut line, &attr.key);
            line.push('=');
            match &attr.value {
                Value::Str(text) => push_text(&mut line, text),
                other => line.push_str(&other.to_string()),
            }
        }
        line.push('\n');
        line
    }
}

fn push_text(line: &mut String, text: &str) {
    if text.is_empty() || text.contains([' ', '"', '=', '\n', '\t']) {
        line.push_str(&format!("{text:?}"));
    } else {
        line.push_str(text);
    }
}

impl<W> Sink for WriterSink<W>
where
    W: Write + Send,
{
    fn enabled(&self, level: Level) -> bool {
        level >= self.min_level
    }

    fn emit(&self, record: &LogRecord) -> Result<(), SinkError> {
        let line = self.format(record);
        let mut writer = self.writer.lock();
        writer.write_all(line.as_bytes())?;
        writer.flush()?;
        Ok(())
    }
}
