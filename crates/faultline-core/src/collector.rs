//! Bounded history of recent error events
//!
//! The collector is a fixed-capacity circular buffer shared by every caller in
//! the process. Writes past capacity evict the oldest surviving event, with no
//! weighting by severity: a `Panic` can be evicted by a later `Debug`.

use crate::event::{ErrorEvent, Severity};
use chrono::{DateTime, Utc};
use futures::stream::{self, Stream};
use parking_lot::Mutex;

/// Capacity used when none is configured
pub const DEFAULT_CAPACITY: usize = 20;

#[derive(Debug)]
struct Ring {
    slots: Vec<Option<ErrorEvent>>,
    cursor: usize,
}

impl Ring {
    fn with_capacity(capacity: usize) -> Self {
        Self {
            slots: vec![None; capacity],
            cursor: 0,
        }
    }

    fn push(&mut self, event: ErrorEvent) {
        let capacity = self.slots.len();
        self.slots[self.cursor] = Some(event);
        self.cursor = (self.cursor + 1) % capacity;
    }

    /// Live events, oldest first
    fn live(&self) -> Vec<ErrorEvent> {
        let (newer, older) = self.slots.split_at(self.cursor);
        older
            .iter()
            .chain(newer.iter())
            .filter_map(|slot| slot.clone())
            .collect()
    }

    fn len(&self) -> usize {
        self.slots.iter().filter(|slot| slot.is_some()).count()
    }
}

/// Fixed-capacity, concurrency-safe store of recent error events
#[derive(Debug)]
pub struct HistoryCollector {
    capacity: usize,
    ring: Mutex<Ring>,
}

impl HistoryCollector {
    /// Create a collector holding at most `capacity` events
    ///
    /// A capacity of zero is raised to one.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let capacity = if capacity == 0 {
            tracing::warn!("history capacity of 0 requested, using 1");
            1
        } else {
            capacity
        };

        Self {
            capacity,
            ring: Mutex::new(Ring::with_capacity(capacity)),
        }
    }

    /// Append one event, evicting the oldest when full
    pub fn add(&self, event: ErrorEvent) {
        self.ring.lock().push(event);
    }

    /// Append an optional cause; `None` records nothing
    ///
    /// Returns whether an event was recorded.
    pub fn record<E>(&self, cause: Option<E>, severity: Severity) -> bool
    where
        E: Into<crate::event::BoxedCause>,
    {
        match cause {
            Some(cause) => {
                self.add(ErrorEvent::new(cause, severity));
                true
            }
            None => false,
        }
    }

    /// Point-in-time view of the live events, oldest to newest
    #[must_use]
    pub fn snapshot(&self) -> Snapshot {
        let events = self.ring.lock().live();
        Snapshot {
            events,
            taken_at: Utc::now(),
        }
    }

    /// One-shot sequence over the live events
    ///
    /// Consuming it leaves the collector untouched.
    #[must_use]
    pub fn drain(&self) -> Drain {
        Drain {
            inner: self.snapshot().events.into_iter(),
        }
    }

    /// Messages of the live events, oldest to newest
    #[must_use]
    pub fn messages(&self) -> Vec<String> {
        self.snapshot().iter().map(ErrorEvent::message).collect()
    }

    /// Maximum number of events held
    #[inline]
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of live events
    #[must_use]
    pub fn len(&self) -> usize {
        self.ring.lock().len()
    }

    /// Whether nothing has been recorded yet
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for HistoryCollector {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

/// Read-only view of the collector at one instant
#[derive(Debug, Clone, Default)]
pub struct Snapshot {
    events: Vec<ErrorEvent>,
    taken_at: DateTime<Utc>,
}

impl Snapshot {
    /// Build a snapshot from events already in oldest-to-newest order
    #[must_use]
    pub fn from_events(events: Vec<ErrorEvent>) -> Self {
        Self {
            events,
            taken_at: Utc::now(),
        }
    }

    /// Iterate events oldest to newest
    pub fn iter(&self) -> std::slice::Iter<'_, ErrorEvent> {
        self.events.iter()
    }

    /// Events as a slice
    #[inline]
    #[must_use]
    pub fn events(&self) -> &[ErrorEvent] {
        &self.events
    }

    /// Number of events
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.events.len()
    }

    /// Whether the snapshot holds no events
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Count of events in the severe bucket (Panic, Fatal, Critical)
    #[must_use]
    pub fn severe_count(&self) -> usize {
        self.events.iter().filter(|e| e.severity().is_severe()).count()
    }

    /// When the snapshot was taken
    #[inline]
    #[must_use]
    pub fn taken_at(&self) -> DateTime<Utc> {
        self.taken_at
    }
}

impl<'a> IntoIterator for &'a Snapshot {
    type Item = &'a ErrorEvent;
    type IntoIter = std::slice::Iter<'a, ErrorEvent>;

    fn into_iter(self) -> Self::IntoIter {
        self.events.iter()
    }
}

impl IntoIterator for Snapshot {
    type Item = ErrorEvent;
    type IntoIter = std::vec::IntoIter<ErrorEvent>;

    fn into_iter(self) -> Self::IntoIter {
        self.events.into_iter()
    }
}

/// Finite, one-shot sequence produced by [`HistoryCollector::drain`]
#[derive(Debug)]
pub struct Drain {
    inner: std::vec::IntoIter<ErrorEvent>,
}

impl Drain {
    /// Hand the remaining events to an async consumer
    pub fn into_stream(self) -> impl Stream<Item = ErrorEvent> + Send + Unpin {
        stream::iter(self.inner)
    }
}

impl Iterator for Drain {
    type Item = ErrorEvent;

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next()
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

impl ExactSizeIterator for Drain {}
