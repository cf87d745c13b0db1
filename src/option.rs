use std::time::Duration;

use crate::{record::Level, tail::DEFAULT_TAIL_CAPACITY};

/// Default upper bound on keys whose buffers the registry keeps alive.
pub const DEFAULT_MAX_TRACKED_KEYS: usize = 4096;

/// Default time a buffer may sit untouched before the registry lets go of it.
pub const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(60);

/// Handler configuration.
///
/// Every field has a default, and unset thresholds fall back to
/// [`Level::Info`] (tail) and [`Level::Error`] (flush).
#[derive(Debug, Clone)]
pub struct HandlerConfig {
    pub(crate) tail_capacity: usize,
    pub(crate) attr_key: String,
    pub(crate) tail_level: Option<Level>,
    pub(crate) flush_level: Option<Level>,
    pub(crate) max_tracked_keys: usize,
    pub(crate) idle_timeout: Option<Duration>,
}

impl Default for HandlerConfig {
    fn default() -> Self {
        HandlerConfig {
            tail_capacity: DEFAULT_TAIL_CAPACITY,
            attr_key: "request_id".to_owned(),
            tail_level: None,
            flush_level: None,
            max_tracked_keys: DEFAULT_MAX_TRACKED_KEYS,
            idle_timeout: Some(DEFAULT_IDLE_TIMEOUT),
        }
    }
}

impl HandlerConfig {
    /// Records kept per key. 0 disables buffering: every record goes straight
    /// to the sink.
    pub fn tail_capacity(self, tail_capacity: usize) -> Self {
        HandlerConfig {
            tail_capacity,
            ..self
        }
    }

    /// Name of the context value or record attribute holding the correlation key.
    pub fn attr_key(self, attr_key: impl Into<String>) -> Self {
        HandlerConfig {
            attr_key: attr_key.into(),
            ..self
        }
    }

    /// Highest level that is buffered. `None` restores the default.
    pub fn tail_level(self, tail_level: impl Into<Option<Level>>) -> Self {
        HandlerConfig {
            tail_level: tail_level.into(),
            ..self
        }
    }

    /// Lowest level that flushes the key's buffer. `None` restores the default.
    pub fn flush_level(self, flush_level: impl Into<Option<Level>>) -> Self {
        HandlerConfig {
            flush_level: flush_level.into(),
            ..self
        }
    }

    /// Keys whose buffers stay alive without outside references. 0 restores
    /// the default.
    pub fn max_tracked_keys(self, max_tracked_keys: usize) -> Self {
        HandlerConfig {
            max_tracked_keys,
            ..self
        }
    }

    /// How long an untouched buffer is kept alive. `None` keeps it until it is
    /// pushed out by `max_tracked_keys`.
    pub fn idle_timeout(self, idle_timeout: impl Into<Option<Duration>>) -> Self {
        HandlerConfig {
            idle_timeout: idle_timeout.into(),
            ..self
        }
    }

    pub(crate) fn buffering_enabled(&self) -> bool {
        self.tail_capacity > 0
    }

    pub(crate) fn resolved_tail_capacity(&self) -> usize {
        self.tail_capacity
    }

    pub(crate) fn resolved_attr_key(&self) -> &str {
        &self.attr_key
    }

    pub(crate) fn resolved_tail_level(&self) -> Level {
        self.tail_level.unwrap_or(Level::Info)
    }

    pub(crate) fn resolved_flush_level(&self) -> Level {
        self.flush_level.unwrap_or(Level::Error)
    }

    pub(crate) fn resolved_max_tracked_keys(&self) -> usize {
        if self.max_tracked_keys == 0 {
            DEFAULT_MAX_TRACKED_KEYS
        } else {
            self.max_tracked_keys
        }
    }

    pub(crate) fn resolved_idle_timeout(&self) -> Option<Duration> {
        self.idle_timeout
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = HandlerConfig::default();
        assert_eq!(config.resolved_tail_capacity(), 10);
        assert_eq!(config.resolved_tail_level(), Level::Info);
        assert_eq!(config.resolved_flush_level(), Level::Error);
        assert_eq!(config.resolved_max_tracked_keys(), DEFAULT_MAX_TRACKED_KEYS);
        assert!(config.buffering_enabled());
    }

    #[test]
    fn unset_values_fall_back_to_defaults() {
        let config = HandlerConfig::default()
            .tail_level(Level::Debug)
            .flush_level(Level::Warn)
            .tail_level(None)
            .flush_level(None)
            .max_tracked_keys(0);
        assert_eq!(config.resolved_tail_level(), Level::Info);
        assert_eq!(config.resolved_flush_level(), Level::Error);
        assert_eq!(config.resolved_max_tracked_keys(), DEFAULT_MAX_TRACKED_KEYS);
    }

    #[test]
    fn zero_capacity_disables_buffering() {
        assert!(!HandlerConfig::default().tail_capacity(0).buffering_enabled());
    }
}
