//! Fixed-capacity ring of records for one correlation key.

use std::iter::FusedIterator;

use crate::record::LogRecord;

/// Capacity used when a buffer is requested with capacity 0.
pub const DEFAULT_TAIL_CAPACITY: usize = 10;

/// Overwrite-on-full ring holding the most recent records of one key.
///
/// Capacity is fixed at construction. Once full, every append replaces the
/// oldest record.
#[derive(Clone, Debug)]
pub struct TailBuffer {
    slots: Vec<Option<LogRecord>>,
    cursor: usize,
    len: usize,
}

impl TailBuffer {
    /// A ring of `capacity` slots; 0 is normalised to [`DEFAULT_TAIL_CAPACITY`].
    pub fn new(capacity: usize) -> Self {
        let capacity = if capacity == 0 {
            DEFAULT_TAIL_CAPACITY
        } else {
            capacity
        };
        Self {
            slots: (0..capacity).map(|_| None).collect(),
            cursor: 0,
            len: 0,
        }
    }

    /// Number of slots.
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Number of records currently held.
    pub fn len(&self) -> usize {
        self.len
    }

    /// Whether no record is held.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Store `record` in the cursor slot and advance the cursor.
    ///
    /// Returns the record it overwrote, if the ring was full.
    pub fn append(&mut self, record: LogRecord) -> Option<LogRecord> {
        let overwritten = self.slots[self.cursor].replace(record);
        self.cursor = (self.cursor + 1) % self.slots.len();
        if overwritten.is_none() {
            self.len += 1;
        }
        overwritten
    }

    /// Records from oldest to newest.
    ///
    /// The iterator borrows the ring without changing it; call again, or clone
    /// the iterator, to walk the records a second time.
    pub fn drain_in_order(&self) -> DrainInOrder<'_> {
        // Until the ring wraps, records sit in slots `0..len` and the cursor
        // equals `len`; after that the cursor points at the oldest record.
        let start = if self.len < self.slots.len() {
            0
        } else {
            self.cursor
        };
        DrainInOrder {
            slots: &self.slots,
            next: start,
            remaining: self.len,
        }
    }

    /// Drop every record, keeping the capacity.
    pub fn clear(&mut self) {
        self.slots.iter_mut().for_each(|slot| *slot = None);
        self.cursor = 0;
        self.len = 0;
    }
}

/// Oldest-to-newest view over a [`TailBuffer`].
#[derive(Clone, Debug)]
pub struct DrainInOrder<'a> {
    slots: &'a [Option<LogRecord>],
    next: usize,
    remaining: usize,
}

impl<'a> Iterator for DrainInOrder<'a> {
    type Item = &'a LogRecord;

    fn next(&mut self) -> Option<Self::Item> {
        if self.remaining == 0 {
            return None;
        }
        let slot = &self.slots[self.next];
        self.next = (self.next + 1) % self.slots.len();
        self.remaining -= 1;
        slot.as_ref()
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}

impl ExactSizeIterator for DrainInOrder<'_> {}

impl FusedIterator for DrainInOrder<'_> {}
