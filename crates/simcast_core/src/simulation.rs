//! Core simulation loop.
//!
//! The [`Simulation`] owns every engine component and drives the scheduler:
//! it pops due events in `(time, priority, schedule order)` order, dispatches
//! each kind to its behavior and publishes a snapshot whenever an event
//! changed the state. Events scheduled while draining, including follow-up
//! actions scheduled by actions, run in the same drain when they are due.
//!
//! # Determinism
//!
//! All operations in this module are fully deterministic:
//! - The clock is logical and only moves through scheduled events
//! - All maps are ordered, so iteration order never depends on hashing
//! - Same units, abilities, modifiers and commands always produce the same
//!   event stream and state hash
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//!
//! use simcast_core::prelude::*;
//!
//! # tokio::runtime::Builder::new_current_thread().enable_time().build().unwrap().block_on(async {
//! let mut steady = AbilityDefinition::new(SpellId(1), "Steady Shot");
//! steady.cast_time = SimTime::from_millis(1500);
//! steady.base_damage = 40;
//!
//! let mut sim = Simulation::new();
//! sim.add_unit(
//!     Unit::new(UnitId(1), "Hunter")
//!         .player()
//!         .with_spell(Spell::new(Arc::new(steady))),
//! )
//! .unwrap();
//! sim.add_unit(Unit::new(UnitId(2), "Training Dummy").with_health(1000)).unwrap();
//!
//! sim.set_rotation(RotationRunner::new(UnitId(1), UnitId(2)).with(SpellId(1)))
//!     .unwrap();
//!
//! let summary = sim.run_until(SimTime::from_secs(6)).await.unwrap();
//! assert_eq!(summary.casts_accepted, 5);
//! # });
//! ```

use std::future::Future;
use std::rc::Rc;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::cast_queue::{CastOutcome, CastQueue};
use crate::components::{SpellId, Unit, UnitId};
use crate::config::SimConfig;
use crate::error::{Result, SimError};
use crate::event_bus::{EventBus, Subscription};
use crate::events::{priority, CombatEventKind, SimEvent};
use crate::lifecycle::{HookContext, HookError, Modifier, ScheduledAction, SpellLifecycle};
use crate::rotation::{RotationRunner, RotationStep};
use crate::scheduler::{EventId, ScheduledEvent, SharedScheduler};
use crate::state::{GameState, StateService, UnitAccessor};
use crate::time::SimTime;
use crate::unit_service::UnitService;

/// Totals for one [`Simulation::run_until`] call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunSummary {
    /// Clock at the end of the run.
    pub end_time: SimTime,
    /// Events executed during the run.
    pub events_executed: u64,
    /// Casts accepted during the run.
    pub casts_accepted: u64,
    /// Casts rejected during the run.
    pub casts_rejected: u64,
    /// Events still pending afterwards.
    pub pending_events: usize,
}

/// The combat simulation.
///
/// Owns the state, the scheduler, the event bus, the modifier pipeline, the
/// cast queue and at most one rotation.
#[derive(Debug)]
pub struct Simulation {
    config: Rc<SimConfig>,
    state: StateService,
    scheduler: SharedScheduler<SimEvent>,
    bus: EventBus,
    units: UnitService,
    queue: CastQueue,
    rotation: Option<RotationRunner>,
    power_regen: bool,
    events_executed: u64,
}

impl Simulation {
    /// Create an empty simulation with default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::build(SimConfig::default())
    }

    /// Create an empty simulation with a validated configuration.
    ///
    /// # Errors
    ///
    /// Returns [`SimError::Config`] listing every out-of-range value.
    pub fn with_config(config: SimConfig) -> Result<Self> {
        let errors = config.validate();
        if !errors.is_empty() {
            let message = errors.join("; ");
            tracing::error!(%message, "Rejected simulation config");
            return Err(SimError::Config { message });
        }

        Ok(Self::build(config))
    }

    fn build(config: SimConfig) -> Self {
        let config = Rc::new(config);
        let state = StateService::new(GameState::default());
        let scheduler = SharedScheduler::new(state.clone());
        let bus = EventBus::new(state.clone());
        let units = UnitService::new(
            state.clone(),
            scheduler.clone(),
            bus.clone(),
            Rc::clone(&config),
        );
        let lifecycle = SpellLifecycle::new(bus.clone(), config.hook_timeout());
        let queue = CastQueue::new(
            units.clone(),
            scheduler.clone(),
            lifecycle,
            bus.clone(),
            Rc::clone(&config),
        );

        Self {
            config,
            state,
            scheduler,
            bus,
            units,
            queue,
            rotation: None,
            power_regen: false,
            events_executed: 0,
        }
    }

    /// Engine configuration.
    #[must_use]
    pub fn config(&self) -> &SimConfig {
        &self.config
    }

    /// Current virtual time.
    #[must_use]
    pub fn now(&self) -> SimTime {
        self.state.current_time()
    }

    /// O(1) snapshot of the current state.
    #[must_use]
    pub fn state(&self) -> Arc<GameState> {
        self.state.get_state()
    }

    /// Deterministic hash of the current state.
    #[must_use]
    pub fn state_hash(&self) -> u64 {
        self.state.get_state().state_hash()
    }

    /// Unit accessor shared with hooks.
    #[must_use]
    pub fn units(&self) -> &UnitService {
        &self.units
    }

    /// The modifier pipeline.
    #[must_use]
    pub fn lifecycle(&self) -> &SpellLifecycle {
        self.queue.lifecycle()
    }

    /// The cast queue.
    #[must_use]
    pub fn cast_queue(&self) -> &CastQueue {
        &self.queue
    }

    /// The shared scheduler.
    #[must_use]
    pub fn scheduler(&self) -> &SharedScheduler<SimEvent> {
        &self.scheduler
    }

    /// The installed rotation, if any.
    #[must_use]
    pub fn rotation(&self) -> Option<&RotationRunner> {
        self.rotation.as_ref()
    }

    /// Total events executed since creation.
    #[must_use]
    pub const fn events_executed(&self) -> u64 {
        self.events_executed
    }

    /// Add a unit.
    ///
    /// # Errors
    ///
    /// Returns an error if a unit with the same ID exists.
    pub fn add_unit(&self, unit: Unit) -> Result<()> {
        self.units.add_unit(unit)
    }

    /// Register a modifier for one ability.
    pub fn register_modifier(&self, spell: SpellId, modifier: Modifier) {
        self.lifecycle().register(spell, modifier);
    }

    /// Register a modifier for every ability.
    pub fn register_generic_modifier(&self, modifier: Modifier) {
        self.lifecycle().register_generic(modifier);
    }

    /// Request a cast now, outside any rotation.
    ///
    /// # Errors
    ///
    /// See [`CastQueue::enqueue`].
    pub fn enqueue(&self, caster: UnitId, spell: SpellId, target: UnitId) -> Result<CastOutcome> {
        self.queue.enqueue(caster, spell, target)
    }

    /// Install a rotation and schedule its first evaluation now.
    ///
    /// Replaces any earlier rotation.
    ///
    /// # Errors
    ///
    /// Returns an error if the rotation's caster does not exist.
    pub fn set_rotation(&mut self, runner: RotationRunner) -> Result<()> {
        self.units.get(runner.caster())?;

        tracing::info!(
            caster = %runner.caster(),
            target = %runner.target(),
            candidates = runner.entries().len(),
            "Rotation installed"
        );

        self.queue.set_rotation_caster(Some(runner.caster()));
        self.rotation = Some(runner);
        self.queue.schedule_reevaluation(self.now())?;
        Ok(())
    }

    /// Remove the rotation and its pending re-evaluation.
    pub fn clear_rotation(&mut self) -> Option<RotationRunner> {
        self.queue.set_rotation_caster(None);
        self.queue.disarm_interrupt();
        self.queue.cancel_reevaluation();
        self.rotation.take()
    }

    /// Start periodic power regeneration. Does nothing if already running.
    ///
    /// # Errors
    ///
    /// Returns an error if scheduling fails.
    pub fn enable_power_regen(&mut self) -> Result<()> {
        if self.power_regen {
            return Ok(());
        }

        self.power_regen = true;
        self.schedule_power_tick()?;
        Ok(())
    }

    /// Stop periodic power regeneration.
    pub fn disable_power_regen(&mut self) {
        self.power_regen = false;
        self.scheduler
            .cancel_where(|event| event.payload == SimEvent::PeriodicPower);
    }

    /// Schedule a labelled marker that is echoed to observers at `at`.
    ///
    /// # Errors
    ///
    /// Returns [`SimError::ScheduledInPast`] if `at` is before now.
    pub fn schedule_marker(&self, at: SimTime, label: impl Into<String>) -> Result<EventId> {
        self.scheduler.schedule(
            at,
            priority::MARKER,
            SimEvent::Marker {
                label: label.into(),
            },
        )
    }

    /// Schedule `action` to run at `at` with a context for `caster` and
    /// `target`.
    ///
    /// The action can schedule further actions through its context; those
    /// due before the end of the current run execute in the same run.
    ///
    /// # Errors
    ///
    /// Returns [`SimError::ScheduledInPast`] if `at` is before now.
    pub fn schedule_action<F, Fut>(
        &self,
        at: SimTime,
        caster: UnitId,
        target: UnitId,
        label: impl Into<String>,
        action: F,
    ) -> Result<EventId>
    where
        F: Fn(HookContext) -> Fut + 'static,
        Fut: Future<Output = std::result::Result<(), HookError>> + 'static,
    {
        let action = ScheduledAction::new(label, caster, target, action);
        self.scheduler
            .schedule(at, priority::ACTION, SimEvent::Action(action))
    }

    /// Cancel a pending event. Returns `false` if it already ran.
    pub fn cancel(&self, id: EventId) -> bool {
        self.scheduler.cancel(id)
    }

    /// Subscribe to combat events and snapshots from now on.
    #[must_use]
    pub fn subscribe(&self) -> Subscription {
        self.bus.subscribe()
    }

    /// Execute the next pending event, whatever its time.
    ///
    /// Returns the time of the executed event, or `None` if nothing is
    /// pending.
    ///
    /// # Errors
    ///
    /// Returns the first fatal error raised while executing the event.
    pub async fn step(&mut self) -> Result<Option<SimTime>> {
        let Some(event) = self.scheduler.pop_due(SimTime::MAX) else {
            return Ok(None);
        };

        let time = event.time;
        self.execute(event).await?;
        Ok(Some(time))
    }

    /// Execute every event due at or before `target`, then move the clock
    /// to `target`.
    ///
    /// # Errors
    ///
    /// Returns [`SimError::ScheduledInPast`] if `target` is before now, or the
    /// first fatal error raised by an event. The run stops at that event.
    pub async fn run_until(&mut self, target: SimTime) -> Result<RunSummary> {
        let now = self.now();
        if target < now {
            return Err(SimError::ScheduledInPast {
                now,
                requested: target,
            });
        }

        let stats_before = self.queue.stats();
        let mut executed = 0;

        while let Some(event) = self.scheduler.pop_due(target) {
            self.execute(event).await?;
            executed += 1;
        }
        self.scheduler.advance_to(target);

        let stats = self.queue.stats();
        let summary = RunSummary {
            end_time: self.now(),
            events_executed: executed,
            casts_accepted: stats.accepted - stats_before.accepted,
            casts_rejected: stats.rejected - stats_before.rejected,
            pending_events: self.scheduler.len(),
        };

        tracing::debug!(
            end_time = %summary.end_time,
            events = summary.events_executed,
            accepted = summary.casts_accepted,
            rejected = summary.casts_rejected,
            "Run complete"
        );

        Ok(summary)
    }

    /// Run for `duration` from the current time.
    ///
    /// # Errors
    ///
    /// See [`Simulation::run_until`].
    pub async fn run_for(&mut self, duration: SimTime) -> Result<RunSummary> {
        let target = self.now() + duration;
        self.run_until(target).await
    }

    async fn execute(&mut self, event: ScheduledEvent<SimEvent>) -> Result<()> {
        let version = self.state.state_id();

        tracing::trace!(
            event = %event.id,
            kind = event.payload.kind(),
            time = %event.time,
            "Executing event"
        );

        self.bus.set_source(Some(event.id));
        let result = self.dispatch(event.payload).await;
        self.bus.set_source(None);
        result?;

        self.events_executed += 1;

        if self.state.state_id() != version {
            self.bus.publish_snapshot(self.state.get_state());
        }

        Ok(())
    }

    async fn dispatch(&mut self, payload: SimEvent) -> Result<()> {
        match payload {
            SimEvent::CastStart {
                caster,
                spell,
                target,
                cast_time,
            } => {
                self.queue.start(caster, spell, target, cast_time);
            }
            SimEvent::CastComplete(record) => {
                self.queue.complete(record).await?;
            }
            SimEvent::CooldownReady { unit, spell } => {
                self.queue.cooldown_ready(unit, spell);
            }
            SimEvent::ChargeReady { unit, spell } => {
                self.queue.restore_charge(unit, spell)?;
            }
            SimEvent::AuraTick {
                unit,
                spell,
                applied_version,
            } => {
                self.units.tick_aura(unit, spell, applied_version)?;
            }
            SimEvent::AuraExpire {
                unit,
                spell,
                expires_at,
            } => {
                self.units.expire_aura(unit, spell, expires_at);
            }
            SimEvent::PeriodicPower => {
                self.units.regenerate_all()?;
                if self.power_regen {
                    self.schedule_power_tick()?;
                }
            }
            SimEvent::Marker { label } => {
                self.bus.emit(CombatEventKind::Marker { label });
            }
            SimEvent::Action(action) => {
                self.queue
                    .lifecycle()
                    .execute_action(&self.units, &action)
                    .await?;
            }
            SimEvent::Reevaluate => {
                if let Some(runner) = self.rotation.as_mut() {
                    if let RotationStep::Stopped = runner.activate(&self.queue)? {
                        tracing::info!(caster = %runner.caster(), "Rotation finished");
                    }
                }
            }
        }

        Ok(())
    }

    fn schedule_power_tick(&self) -> Result<EventId> {
        let at = self.now() + self.config.power_regen_interval;
        self.scheduler
            .schedule(at, priority::PERIODIC_POWER, SimEvent::PeriodicPower)
    }
}

impl Default for Simulation {
    fn default() -> Self {
        Self::new()
    }
}
