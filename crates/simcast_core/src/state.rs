//! Authoritative simulation state.
//!
//! [`GameState`] is an immutable, versioned value. [`StateService`] holds the
//! current value and is the only way to replace it; readers get an
//! `Arc<GameState>` snapshot that never changes underneath them.
//!
//! Units are stored behind `Arc`, so committing a change copies the map spine
//! and the one unit that changed. Everything else is shared with earlier
//! snapshots.

use std::cell::RefCell;
use std::collections::hash_map::DefaultHasher;
use std::collections::BTreeMap;
use std::hash::{Hash, Hasher};
use std::rc::Rc;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::components::{Unit, UnitId};
use crate::error::{Result, SimError};
use crate::time::SimTime;

/// A snapshot of the whole simulation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GameState {
    /// Version, incremented on every committed change to unit data.
    pub state_id: u64,
    /// Virtual clock.
    pub current_time: SimTime,
    /// All units by ID.
    pub units: BTreeMap<UnitId, Arc<Unit>>,
}

impl GameState {
    /// Look up a unit.
    #[must_use]
    pub fn unit(&self, id: UnitId) -> Option<&Arc<Unit>> {
        self.units.get(&id)
    }

    /// Mutable access to a unit, copying it first if a snapshot shares it.
    pub fn unit_mut(&mut self, id: UnitId) -> Option<&mut Unit> {
        self.units.get_mut(&id).map(Arc::make_mut)
    }

    /// Insert or replace a unit.
    pub fn insert_unit(&mut self, unit: Unit) {
        self.units.insert(unit.id, Arc::new(unit));
    }

    /// Unit IDs in ascending order.
    pub fn unit_ids(&self) -> impl Iterator<Item = UnitId> + '_ {
        self.units.keys().copied()
    }

    /// Deterministic hash of the full state.
    ///
    /// Two runs of the same scenario produce the same value.
    #[must_use]
    pub fn state_hash(&self) -> u64 {
        let mut hasher = DefaultHasher::new();
        self.hash(&mut hasher);
        hasher.finish()
    }
}

/// Read and write access to units by ID.
///
/// This is the interface modifiers and external collaborators use; the
/// engine never hands out mutable references into committed state.
pub trait UnitAccessor {
    /// Current value of a unit.
    ///
    /// # Errors
    ///
    /// Returns [`SimError::UnitNotFound`] if no such unit exists.
    fn get(&self, id: UnitId) -> Result<Arc<Unit>>;

    /// Replace a unit wholesale.
    ///
    /// # Errors
    ///
    /// Returns [`SimError::UnitNotFound`] if no unit with that ID exists.
    fn update(&self, unit: Unit) -> Result<()>;
}

/// Owner of the current [`GameState`].
///
/// Cloning the service clones the handle, not the state. Every clone sees
/// and commits to the same value.
#[derive(Debug, Clone, Default)]
pub struct StateService {
    current: Rc<RefCell<Arc<GameState>>>,
}

impl StateService {
    /// Create a service holding `initial`.
    #[must_use]
    pub fn new(initial: GameState) -> Self {
        Self {
            current: Rc::new(RefCell::new(Arc::new(initial))),
        }
    }

    /// O(1) snapshot of the current state.
    #[must_use]
    pub fn get_state(&self) -> Arc<GameState> {
        Arc::clone(&self.current.borrow())
    }

    /// Current virtual time.
    #[must_use]
    pub fn current_time(&self) -> SimTime {
        self.current.borrow().current_time
    }

    /// Current state version.
    #[must_use]
    pub fn state_id(&self) -> u64 {
        self.current.borrow().state_id
    }

    /// Apply a change and commit it as a new version.
    ///
    /// `f` must not call back into this service.
    pub fn update_state<R>(&self, f: impl FnOnce(&mut GameState) -> R) -> R {
        let mut next = GameState::clone(&self.current.borrow());
        let result = f(&mut next);
        next.state_id += 1;
        *self.current.borrow_mut() = Arc::new(next);
        result
    }

    /// Apply a fallible change, committing only if it succeeds.
    ///
    /// # Errors
    ///
    /// Returns whatever `f` returns; the state is left untouched in that case.
    pub fn try_update_state<R>(&self, f: impl FnOnce(&mut GameState) -> Result<R>) -> Result<R> {
        let mut next = GameState::clone(&self.current.borrow());
        let result = f(&mut next)?;
        next.state_id += 1;
        *self.current.borrow_mut() = Arc::new(next);
        Ok(result)
    }

    /// Move the clock forward. Only the scheduler calls this.
    ///
    /// Does not bump the version; moving time alone is not a unit change.
    pub(crate) fn advance_clock(&self, to: SimTime) {
        let mut current = self.current.borrow_mut();
        if to <= current.current_time {
            return;
        }
        Arc::make_mut(&mut *current).current_time = to;
    }
}

impl UnitAccessor for StateService {
    fn get(&self, id: UnitId) -> Result<Arc<Unit>> {
        self.current
            .borrow()
            .unit(id)
            .cloned()
            .ok_or(SimError::UnitNotFound(id))
    }

    fn update(&self, unit: Unit) -> Result<()> {
        self.try_update_state(|state| {
            let slot = state
                .units
                .get_mut(&unit.id)
                .ok_or(SimError::UnitNotFound(unit.id))?;
            *slot = Arc::new(unit);
            Ok(())
        })
    }
}
