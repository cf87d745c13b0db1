//! Per-key tail buffers and their reclamation.
//!
//! The registry maps each correlation key to at most one live buffer. It
//! keeps only a [`Weak`] reference to every buffer, plus a strong "pin" for
//! keys that were touched recently. Pins are bounded by an LRU of
//! `max_tracked_keys` entries and released once idle for longer than
//! `idle_timeout`. When the last strong reference to a buffer goes away, the
//! buffer's `Drop` sends a reclamation notice; queued notices are applied at
//! the start of the next registry operation. Nothing sweeps in the
//! background.
//!
//! Lock order is registry, then buffer. Draining a buffer that has already
//! been taken out of the registry only needs the buffer lock.

use std::{
    collections::HashMap,
    num::NonZeroUsize,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc, Weak,
    },
    time::{Duration, Instant},
};

use flume::{Receiver, Sender};
use lru::LruCache;
use parking_lot::{Mutex, MutexGuard};

use crate::{
    clock::{Clock, SystemClock},
    key::CorrelationKey,
    metrics::TrapMetrics,
    observability::log_trace,
    option::DEFAULT_MAX_TRACKED_KEYS,
    record::LogRecord,
    tail::TailBuffer,
};

/// Identifier of one buffer instance. A key that is flushed and written to
/// again gets a buffer with a new id.
pub type BufferId = u64;

/// A tail buffer registered under a correlation key.
///
/// Holding an `Arc<TrackedTail>` keeps the buffer alive and reachable through
/// the registry.
#[derive(Debug)]
pub struct TrackedTail {
    key: CorrelationKey,
    id: BufferId,
    ring: Mutex<TailBuffer>,
    reclaim: Sender<Reclaim>,
}

impl TrackedTail {
    fn new(key: CorrelationKey, id: BufferId, capacity: usize, reclaim: Sender<Reclaim>) -> Self {
        Self {
            key,
            id,
            ring: Mutex::new(TailBuffer::new(capacity)),
            reclaim,
        }
    }

    /// Key this buffer is registered under.
    pub fn key(&self) -> &CorrelationKey {
        &self.key
    }

    /// Instance id.
    pub fn id(&self) -> BufferId {
        self.id
    }

    /// Lock the ring.
    ///
    /// Do not call back into the registry while holding the guard.
    pub fn lock(&self) -> MutexGuard<'_, TailBuffer> {
        self.ring.lock()
    }
}

impl Drop for TrackedTail {
    fn drop(&mut self) {
        let key = std::mem::replace(&mut self.key, CorrelationKey::Unkeyed);
        // The receiver lives in the registry; once it is gone there is no
        // entry left to clean up.
        let _ = self.reclaim.send(Reclaim { key, id: self.id });
    }
}

/// Notice that the buffer `id` for `key` has been dropped.
#[derive(Debug)]
struct Reclaim {
    key: CorrelationKey,
    id: BufferId,
}

#[derive(Debug)]
struct Slot {
    id: BufferId,
    tail: Weak<TrackedTail>,
}

#[derive(Debug)]
struct Pin {
    tail: Arc<TrackedTail>,
    touched: Instant,
}

struct RegistryState {
    entries: HashMap<CorrelationKey, Slot>,
    pins: LruCache<CorrelationKey, Pin>,
}

/// Result of [`BufferRegistry::append`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AppendOutcome {
    /// A fresh buffer was created for the key.
    pub created: bool,
    /// The ring was full and its oldest record was overwritten.
    pub overwrote: bool,
    /// Id of the buffer that received the record.
    pub buffer: BufferId,
}

/// Concurrency-safe map from correlation key to its tail buffer.
pub struct BufferRegistry {
    state: Mutex<RegistryState>,
    notices: Receiver<Reclaim>,
    notifier: Sender<Reclaim>,
    next_id: AtomicU64,
    idle_timeout: Option<Duration>,
    clock: Arc<dyn Clock>,
    metrics: Arc<TrapMetrics>,
}

impl BufferRegistry {
    /// Registry pinning at most `max_tracked_keys` buffers (0 means the
    /// default), each for at most `idle_timeout` since it was last touched.
    pub fn new(max_tracked_keys: usize, idle_timeout: Option<Duration>) -> Self {
        Self::with_clock(max_tracked_keys, idle_timeout, Arc::new(SystemClock))
    }

    /// Same as [`BufferRegistry::new`] with an explicit clock.
    pub fn with_clock(
        max_tracked_keys: usize,
        idle_timeout: Option<Duration>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self::build(
            max_tracked_keys,
            idle_timeout,
            clock,
            Arc::new(TrapMetrics::default()),
        )
    }

    pub(crate) fn build(
        max_tracked_keys: usize,
        idle_timeout: Option<Duration>,
        clock: Arc<dyn Clock>,
        metrics: Arc<TrapMetrics>,
    ) -> Self {
        let pin_limit = NonZeroUsize::new(max_tracked_keys)
            .or(NonZeroUsize::new(DEFAULT_MAX_TRACKED_KEYS))
            .unwrap_or(NonZeroUsize::MIN);
        let (notifier, notices) = flume::unbounded();
        Self {
            state: Mutex::new(RegistryState {
                entries: HashMap::new(),
                pins: LruCache::new(pin_limit),
            }),
            notices,
            notifier,
            next_id: AtomicU64::new(0),
            idle_timeout,
            clock,
            metrics,
        }
    }

    /// Live buffer for `key`, creating one with `capacity` slots if none exists.
    pub fn get_or_create(&self, key: &CorrelationKey, capacity: usize) -> Arc<TrackedTail> {
        let (tail, created, reclaimed) = {
            let mut state = self.state.lock();
            let reclaimed = self.maintain(&mut state);
            let (tail, created) = self.resolve(&mut state, key, capacity);
            (tail, created, reclaimed)
        };
        self.report(reclaimed, created.then_some((key, tail.id(), capacity)));
        tail
    }

    /// Append `record` to the buffer for `key`, creating it if needed.
    ///
    /// Lookup and append happen under the registry lock, so a concurrent
    /// [`take_and_remove`](Self::take_and_remove) either sees the record or
    /// the record lands in a fresh buffer.
    pub fn append(
        &self,
        key: &CorrelationKey,
        capacity: usize,
        record: LogRecord,
    ) -> AppendOutcome {
        let (outcome, reclaimed) = {
            let mut state = self.state.lock();
            let reclaimed = self.maintain(&mut state);
            let (tail, created) = self.resolve(&mut state, key, capacity);
            let overwrote = tail.lock().append(record).is_some();
            let outcome = AppendOutcome {
                created,
                overwrote,
                buffer: tail.id(),
            };
            (outcome, reclaimed)
        };
        self.report(
            reclaimed,
            outcome
                .created
                .then_some((key, outcome.buffer, capacity)),
        );
        outcome
    }

    /// Remove the entry for `key` and hand back its buffer, if one is alive.
    pub fn take_and_remove(&self, key: &CorrelationKey) -> Option<Arc<TrackedTail>> {
        let (tail, reclaimed) = {
            let mut state = self.state.lock();
            let reclaimed = self.maintain(&mut state);
            let pinned = state.pins.pop(key).map(|pin| pin.tail);
            let slot = state.entries.remove(key);
            let tail = pinned.or_else(|| slot.and_then(|slot| slot.tail.upgrade()));
            (tail, reclaimed)
        };
        self.report(reclaimed, None);
        tail
    }

    /// Drop the entry for `key` if it still refers to the buffer `id` and that
    /// buffer is gone. Returns whether an entry was removed.
    ///
    /// Called for every reclamation notice; a key that has since been given a
    /// newer buffer is left alone.
    pub fn reclaim(&self, key: &CorrelationKey, id: BufferId) -> bool {
        let (removed, reclaimed) = {
            let mut state = self.state.lock();
            let removed = Self::reclaim_locked(&mut state, key, id);
            (removed, self.maintain(&mut state))
        };
        self.report(reclaimed + u64::from(removed), None);
        removed
    }

    /// Number of keys with a live buffer.
    pub fn len(&self) -> usize {
        let (len, reclaimed) = {
            let mut state = self.state.lock();
            let reclaimed = self.maintain(&mut state);
            (state.entries.len(), reclaimed)
        };
        self.report(reclaimed, None);
        len
    }

    /// Whether no key has a live buffer.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn resolve(
        &self,
        state: &mut RegistryState,
        key: &CorrelationKey,
        capacity: usize,
    ) -> (Arc<TrackedTail>, bool) {
        let now = self.clock.now();
        if let Some(pin) = state.pins.get_mut(key) {
            pin.touched = now;
            return (pin.tail.clone(), false);
        }
        // Unpinned but still held elsewhere: re-pin the same buffer.
        if let Some(tail) = state.entries.get(key).and_then(|slot| slot.tail.upgrade()) {
            state.pins.push(
                key.clone(),
                Pin {
                    tail: tail.clone(),
                    touched: now,
                },
            );
            return (tail, false);
        }

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let tail = Arc::new(TrackedTail::new(
            key.clone(),
            id,
            capacity,
            self.notifier.clone(),
        ));
        state.entries.insert(
            key.clone(),
            Slot {
                id,
                tail: Arc::downgrade(&tail),
            },
        );
        state.pins.push(
            key.clone(),
            Pin {
                tail: tail.clone(),
                touched: now,
            },
        );
        (tail, true)
    }

    /// Release idle pins, then apply queued reclamation notices.
    fn maintain(&self, state: &mut RegistryState) -> u64 {
        if let Some(idle_timeout) = self.idle_timeout {
            let now = self.clock.now();
            loop {
                let expired = match state.pins.peek_lru() {
                    Some((_, pin)) => now.saturating_duration_since(pin.touched) >= idle_timeout,
                    None => false,
                };
                if !expired {
                    break;
                }
                state.pins.pop_lru();
            }
        }

        let mut reclaimed = 0;
        for Reclaim { key, id } in self.notices.try_iter() {
            if Self::reclaim_locked(state, &key, id) {
                reclaimed += 1;
            }
        }
        reclaimed
    }

    fn reclaim_locked(state: &mut RegistryState, key: &CorrelationKey, id: BufferId) -> bool {
        match state.entries.get(key) {
            Some(slot) if slot.id == id && slot.tail.strong_count() == 0 => {
                state.entries.remove(key);
                true
            }
            _ => false,
        }
    }

    // Runs after the registry lock is released.
    fn report(&self, reclaimed: u64, created: Option<(&CorrelationKey, BufferId, usize)>) {
        if let Some((key, buffer, capacity)) = created {
            self.metrics.record_buffer_created();
            log_trace!(
                component = "registry",
                event = "tail_created",
                key = %key,
                buffer,
                capacity,
            );
        }
        if reclaimed > 0 {
            self.metrics.record_reclaimed(reclaimed);
            log_trace!(component = "registry", event = "tails_reclaimed", reclaimed);
        }
    }

    #[cfg(test)]
    pub(crate) fn metrics(&self) -> &TrapMetrics {
        &self.metrics
    }
}

impl std::fmt::Debug for BufferRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BufferRegistry")
            .field("idle_timeout", &self.idle_timeout)
            .field("pending_notices", &self.notices.len())
            .finish_non_exhaustive()
    }
}
