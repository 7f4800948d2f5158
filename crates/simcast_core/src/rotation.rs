//! Priority-list rotation.
//!
//! A [`RotationRunner`] holds an ordered list of candidate abilities. Each
//! activation tries them in order. The first accepted cast interrupts the
//! activation through a oneshot channel armed on the cast queue; the queue
//! has already scheduled the next re-evaluation by then. If every candidate
//! is rejected, the runner schedules its own retry after a fixed delay.

use std::cell::Cell;
use std::fmt;
use std::rc::Rc;

use tokio::sync::oneshot;

use crate::cast_queue::{CastAccepted, CastQueue};
use crate::components::{SpellId, Unit, UnitId};
use crate::error::Result;
use crate::events::{priority, SimEvent};
use crate::scheduler::{EventId, SharedScheduler};
use crate::state::UnitAccessor;
use crate::time::SimTime;

/// Condition deciding whether a candidate is tried.
pub type RotationCondition = Rc<dyn Fn(&Unit, SimTime) -> bool>;

/// One candidate in a rotation.
#[derive(Clone)]
pub struct RotationEntry {
    /// Ability to try.
    pub spell: SpellId,
    condition: Option<RotationCondition>,
}

impl fmt::Debug for RotationEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RotationEntry")
            .field("spell", &self.spell)
            .field("conditional", &self.condition.is_some())
            .finish()
    }
}

impl RotationEntry {
    /// An unconditional candidate.
    #[must_use]
    pub fn new(spell: SpellId) -> Self {
        Self {
            spell,
            condition: None,
        }
    }

    /// Only try this candidate while `condition` holds for the caster.
    #[must_use]
    pub fn when(mut self, condition: impl Fn(&Unit, SimTime) -> bool + 'static) -> Self {
        self.condition = Some(Rc::new(condition));
        self
    }

    fn applies(&self, caster: &Unit, now: SimTime) -> bool {
        self.condition
            .as_ref()
            .map_or(true, |condition| condition(caster, now))
    }
}

impl From<SpellId> for RotationEntry {
    fn from(spell: SpellId) -> Self {
        Self::new(spell)
    }
}

/// What one activation did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RotationStep {
    /// A cast was accepted and the activation stopped there.
    Interrupted(CastAccepted),
    /// Every candidate was rejected; a retry is scheduled.
    Exhausted {
        /// When the retry runs.
        retry_at: SimTime,
    },
    /// The caster is dead; nothing was tried or scheduled.
    Stopped,
}

/// Drives one unit through a priority list.
#[derive(Debug, Clone)]
pub struct RotationRunner {
    caster: UnitId,
    target: UnitId,
    entries: Vec<RotationEntry>,
    activations: u64,
}

impl RotationRunner {
    /// Create a runner for `caster` attacking `target`.
    #[must_use]
    pub fn new(caster: UnitId, target: UnitId) -> Self {
        Self {
            caster,
            target,
            entries: Vec::new(),
            activations: 0,
        }
    }

    /// Append a candidate.
    #[must_use]
    pub fn with(mut self, entry: impl Into<RotationEntry>) -> Self {
        self.entries.push(entry.into());
        self
    }

    /// Casting unit.
    #[must_use]
    pub const fn caster(&self) -> UnitId {
        self.caster
    }

    /// Target unit.
    #[must_use]
    pub const fn target(&self) -> UnitId {
        self.target
    }

    /// Candidates in priority order.
    #[must_use]
    pub fn entries(&self) -> &[RotationEntry] {
        &self.entries
    }

    /// Number of activations so far.
    #[must_use]
    pub const fn activations(&self) -> u64 {
        self.activations
    }

    /// Try candidates in order until one is accepted.
    ///
    /// # Errors
    ///
    /// Propagates lookup and scheduling errors from the cast queue.
    pub fn activate(&mut self, queue: &CastQueue) -> Result<RotationStep> {
        self.activations += 1;

        let now = queue.units().now();
        let caster = queue.units().get(self.caster)?;
        if !caster.is_alive() {
            tracing::debug!(caster = %self.caster, "Rotation stopped, caster is dead");
            return Ok(RotationStep::Stopped);
        }

        let (tx, mut rx) = oneshot::channel();
        queue.arm_interrupt(tx);

        for entry in &self.entries {
            if !entry.applies(&caster, now) {
                continue;
            }

            queue.enqueue(self.caster, entry.spell, self.target)?;

            if let Ok(accepted) = rx.try_recv() {
                tracing::trace!(caster = %self.caster, spell = %accepted.spell, "Rotation interrupted by cast");
                return Ok(RotationStep::Interrupted(accepted));
            }
        }

        queue.disarm_interrupt();

        let retry_at = now + queue.config().rotation_fallback_delay;
        queue.schedule_reevaluation(retry_at)?;
        tracing::trace!(caster = %self.caster, retry_at = %retry_at, "No castable candidate");

        Ok(RotationStep::Exhausted { retry_at })
    }
}

/// Tracks the one pending rotation re-evaluation.
#[derive(Debug, Default)]
pub struct ReevaluationSlot {
    pending: Cell<Option<(EventId, SimTime)>>,
}

impl ReevaluationSlot {
    /// Schedule a re-evaluation at `at`, keeping at most one pending.
    ///
    /// A request at or after the pending one is dropped; an earlier request
    /// replaces it. Returns the new event, if one was scheduled.
    ///
    /// # Errors
    ///
    /// Returns [`SimError::ScheduledInPast`](crate::error::SimError::ScheduledInPast)
    /// if `at` is before the current time.
    pub fn schedule(&self, scheduler: &SharedScheduler<SimEvent>, at: SimTime) -> Result<Option<EventId>> {
        if let Some((id, time)) = self.live(scheduler) {
            if time <= at {
                return Ok(None);
            }
            scheduler.cancel(id);
        }

        let id = scheduler.schedule(at, priority::REEVALUATE, SimEvent::Reevaluate)?;
        self.pending.set(Some((id, at)));
        Ok(Some(id))
    }

    /// Cancel the pending re-evaluation. Returns `false` if none was pending.
    pub fn cancel(&self, scheduler: &SharedScheduler<SimEvent>) -> bool {
        self.pending
            .take()
            .is_some_and(|(id, _)| scheduler.cancel(id))
    }

    /// When the pending re-evaluation runs, if one is pending.
    #[must_use]
    pub fn pending_at(&self, scheduler: &SharedScheduler<SimEvent>) -> Option<SimTime> {
        self.live(scheduler).map(|(_, time)| time)
    }

    /// The recorded event, if it has neither run nor been cancelled.
    fn live(&self, scheduler: &SharedScheduler<SimEvent>) -> Option<(EventId, SimTime)> {
        let pending = self.pending.get()?;
        if scheduler.with(|s| s.get(pending.0).is_some()) {
            Some(pending)
        } else {
            self.pending.set(None);
            None
        }
    }
}
