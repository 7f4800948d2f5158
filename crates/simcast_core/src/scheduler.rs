//! Time-ordered event scheduler.
//!
//! The scheduler is the only thing that moves the simulation clock. Pending
//! events are kept in a min-heap keyed by `(time, priority, id)`; IDs are
//! handed out in increasing order, so events with the same time and priority
//! run in the order they were scheduled.
//!
//! Cancellation removes the event from the live table and leaves a tombstone
//! in the heap. Tombstones are skipped when popped and the heap is rebuilt
//! once they outnumber live events.

use std::cell::RefCell;
use std::cmp::Reverse;
use std::collections::{BTreeMap, BinaryHeap};
use std::fmt;
use std::rc::Rc;

use serde::{Deserialize, Serialize};

use crate::error::{Result, SimError};
use crate::state::StateService;
use crate::time::SimTime;

/// Rebuild the heap once it holds at least this many tombstones and they
/// outnumber live events.
const COMPACT_THRESHOLD: usize = 64;

/// Unique identifier of a scheduled event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EventId(pub u64);

impl fmt::Display for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "evt-{}", self.0)
    }
}

/// An event waiting in the scheduler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScheduledEvent<P> {
    /// Unique ID (also the FIFO tie-breaker).
    pub id: EventId,
    /// When the event runs.
    pub time: SimTime,
    /// Lower runs first among events at the same time.
    pub priority: u8,
    /// What to do.
    pub payload: P,
}

impl<P> ScheduledEvent<P> {
    const fn key(&self) -> QueueKey {
        (self.time, self.priority, self.id)
    }
}

type QueueKey = (SimTime, u8, EventId);

/// Priority queue of pending events that owns the clock.
#[derive(Debug)]
pub struct EventScheduler<P> {
    state: StateService,
    heap: BinaryHeap<Reverse<QueueKey>>,
    live: BTreeMap<EventId, ScheduledEvent<P>>,
    tombstones: usize,
    next_id: u64,
    #[cfg(feature = "debug-validation")]
    last_popped: SimTime,
}

impl<P> EventScheduler<P> {
    /// Create an empty scheduler driving the clock of `state`.
    #[must_use]
    pub fn new(state: StateService) -> Self {
        Self {
            state,
            heap: BinaryHeap::new(),
            live: BTreeMap::new(),
            tombstones: 0,
            next_id: 1,
            #[cfg(feature = "debug-validation")]
            last_popped: SimTime::ZERO,
        }
    }

    /// Current virtual time.
    #[must_use]
    pub fn now(&self) -> SimTime {
        self.state.current_time()
    }

    /// Enqueue `payload` to run at `time`.
    ///
    /// # Errors
    ///
    /// Returns [`SimError::ScheduledInPast`] if `time` is before the current
    /// clock. This is an ordering violation and aborts the run.
    pub fn schedule(&mut self, time: SimTime, priority: u8, payload: P) -> Result<EventId> {
        let now = self.now();
        if time < now {
            tracing::error!(now = %now, requested = %time, "Event scheduled in the past");
            return Err(SimError::ScheduledInPast {
                now,
                requested: time,
            });
        }

        let id = EventId(self.next_id);
        self.next_id += 1;

        let event = ScheduledEvent {
            id,
            time,
            priority,
            payload,
        };
        self.heap.push(Reverse(event.key()));
        self.live.insert(id, event);

        tracing::trace!(event = %id, time = %time, priority, "Scheduled event");

        Ok(id)
    }

    /// Enqueue `payload` to run `delay` after the current time.
    ///
    /// # Errors
    ///
    /// Never fails in practice; see [`EventScheduler::schedule`].
    pub fn schedule_after(&mut self, delay: SimTime, priority: u8, payload: P) -> Result<EventId> {
        let time = self.now() + delay;
        self.schedule(time, priority, payload)
    }

    /// Remove a pending event. Returns `false` if it already ran or was
    /// already cancelled.
    pub fn cancel(&mut self, id: EventId) -> bool {
        if self.live.remove(&id).is_none() {
            return false;
        }

        self.tombstones += 1;
        self.maybe_compact();
        tracing::trace!(event = %id, "Cancelled event");
        true
    }

    /// Cancel every pending event matching `predicate`. Returns how many
    /// were removed.
    pub fn cancel_where(&mut self, mut predicate: impl FnMut(&ScheduledEvent<P>) -> bool) -> usize {
        let before = self.live.len();
        self.live.retain(|_, event| !predicate(event));
        let removed = before - self.live.len();

        self.tombstones += removed;
        self.maybe_compact();
        removed
    }

    /// The pending event that would run first among those matching
    /// `predicate`.
    pub fn find(&self, mut predicate: impl FnMut(&ScheduledEvent<P>) -> bool) -> Option<&ScheduledEvent<P>> {
        self.live
            .values()
            .filter(|event| predicate(event))
            .min_by_key(|event| event.key())
    }

    /// Look up a pending event by ID.
    #[must_use]
    pub fn get(&self, id: EventId) -> Option<&ScheduledEvent<P>> {
        self.live.get(&id)
    }

    /// The next event to run.
    pub fn peek(&mut self) -> Option<&ScheduledEvent<P>> {
        self.discard_dead_head();
        let Reverse((_, _, id)) = self.heap.peek()?;
        self.live.get(id)
    }

    /// Time of the next event to run.
    pub fn next_time(&mut self) -> Option<SimTime> {
        self.peek().map(|event| event.time)
    }

    /// Remove and return the next event if it is due at or before `target`,
    /// advancing the clock to its time.
    pub fn pop_due(&mut self, target: SimTime) -> Option<ScheduledEvent<P>> {
        self.discard_dead_head();

        let &Reverse((time, _, id)) = self.heap.peek()?;
        if time > target {
            return None;
        }

        self.heap.pop();
        let event = self.live.remove(&id)?;

        // Same-time events scheduled by a handler may carry a lower priority
        // than the handler's own event, so only time is monotonic here.
        #[cfg(feature = "debug-validation")]
        {
            debug_assert!(self.last_popped <= event.time, "clock moved backwards");
            self.last_popped = event.time;
        }

        self.state.advance_clock(event.time);
        Some(event)
    }

    /// Move the clock to `target` once nothing is due before it.
    pub fn advance_to(&mut self, target: SimTime) {
        #[cfg(feature = "debug-validation")]
        debug_assert!(
            self.next_time().map_or(true, |next| next > target),
            "advancing past pending events"
        );
        self.state.advance_clock(target);
    }

    /// Number of pending events.
    #[must_use]
    pub fn len(&self) -> usize {
        self.live.len()
    }

    /// Whether nothing is pending.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.live.is_empty()
    }

    /// All pending events in execution order.
    #[must_use]
    pub fn pending(&self) -> Vec<&ScheduledEvent<P>> {
        let mut events: Vec<_> = self.live.values().collect();
        events.sort_by_key(|event| event.key());
        events
    }

    /// Drop every pending event.
    pub fn clear(&mut self) {
        self.heap.clear();
        self.live.clear();
        self.tombstones = 0;
    }

    fn discard_dead_head(&mut self) {
        while let Some(Reverse((_, _, id))) = self.heap.peek() {
            if self.live.contains_key(id) {
                break;
            }
            self.heap.pop();
            self.tombstones = self.tombstones.saturating_sub(1);
        }
    }

    fn maybe_compact(&mut self) {
        if self.tombstones < COMPACT_THRESHOLD || self.tombstones <= self.live.len() {
            return;
        }

        self.heap = self.live.values().map(|event| Reverse(event.key())).collect();
        tracing::trace!(
            dropped = self.tombstones,
            live = self.live.len(),
            "Compacted scheduler heap"
        );
        self.tombstones = 0;
    }
}

/// Shared handle to an [`EventScheduler`].
///
/// The cast queue, unit service and run loop all schedule into the same
/// queue. Each method borrows the scheduler only for the duration of the
/// call, so handlers run by [`SharedScheduler::drain_until`] may schedule
/// and cancel freely.
#[derive(Debug)]
pub struct SharedScheduler<P> {
    inner: Rc<RefCell<EventScheduler<P>>>,
}

impl<P> Clone for SharedScheduler<P> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<P> SharedScheduler<P> {
    /// Create a scheduler driving the clock of `state`.
    #[must_use]
    pub fn new(state: StateService) -> Self {
        Self {
            inner: Rc::new(RefCell::new(EventScheduler::new(state))),
        }
    }

    /// See [`EventScheduler::now`].
    #[must_use]
    pub fn now(&self) -> SimTime {
        self.inner.borrow().now()
    }

    /// See [`EventScheduler::schedule`].
    ///
    /// # Errors
    ///
    /// Returns [`SimError::ScheduledInPast`] if `time` is before the clock.
    pub fn schedule(&self, time: SimTime, priority: u8, payload: P) -> Result<EventId> {
        self.inner.borrow_mut().schedule(time, priority, payload)
    }

    /// See [`EventScheduler::cancel`].
    pub fn cancel(&self, id: EventId) -> bool {
        self.inner.borrow_mut().cancel(id)
    }

    /// See [`EventScheduler::cancel_where`].
    pub fn cancel_where(&self, predicate: impl FnMut(&ScheduledEvent<P>) -> bool) -> usize {
        self.inner.borrow_mut().cancel_where(predicate)
    }

    /// See [`EventScheduler::pop_due`].
    pub fn pop_due(&self, target: SimTime) -> Option<ScheduledEvent<P>> {
        self.inner.borrow_mut().pop_due(target)
    }

    /// See [`EventScheduler::advance_to`].
    pub fn advance_to(&self, target: SimTime) {
        self.inner.borrow_mut().advance_to(target);
    }

    /// See [`EventScheduler::next_time`].
    #[must_use]
    pub fn next_time(&self) -> Option<SimTime> {
        self.inner.borrow_mut().next_time()
    }

    /// See [`EventScheduler::len`].
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.borrow().len()
    }

    /// See [`EventScheduler::is_empty`].
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.borrow().is_empty()
    }

    /// See [`EventScheduler::clear`].
    pub fn clear(&self) {
        self.inner.borrow_mut().clear();
    }

    /// Run `f` with shared access to the scheduler.
    pub fn with<R>(&self, f: impl FnOnce(&EventScheduler<P>) -> R) -> R {
        f(&self.inner.borrow())
    }

    /// Run `f` with exclusive access to the scheduler.
    ///
    /// `f` must not call back into this handle.
    pub fn with_mut<R>(&self, f: impl FnOnce(&mut EventScheduler<P>) -> R) -> R {
        f(&mut self.inner.borrow_mut())
    }

    /// Pop and handle every event due at or before `target`, then advance
    /// the clock to `target`.
    ///
    /// Events scheduled by `handler` run in the same pass if they are due.
    /// Returns the number of events handled.
    ///
    /// # Errors
    ///
    /// Stops at the first error returned by `handler`; the clock stays at
    /// that event's time.
    pub fn drain_until(
        &self,
        target: SimTime,
        mut handler: impl FnMut(ScheduledEvent<P>) -> Result<()>,
    ) -> Result<usize> {
        let mut executed = 0;
        // The borrow ends before the handler runs.
        while let Some(event) = self.pop_due(target) {
            handler(event)?;
            executed += 1;
        }
        self.advance_to(target);
        Ok(executed)
    }
}

impl<P: Clone> SharedScheduler<P> {
    /// Copies of all pending events in execution order.
    #[must_use]
    pub fn pending(&self) -> Vec<ScheduledEvent<P>> {
        self.inner.borrow().pending().into_iter().cloned().collect()
    }
}
