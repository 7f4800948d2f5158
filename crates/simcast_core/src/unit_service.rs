//! Unit, aura and resource operations.
//!
//! The [`UnitService`] is the accessor the engine and modifier hooks share.
//! Every operation reads the current unit, computes the new value and
//! commits it through the [`StateService`] in one step, then publishes what
//! happened on the [`EventBus`].

use std::rc::Rc;
use std::sync::Arc;

use crate::components::{Aura, PeriodicEffect, PowerType, Spell, SpellId, Unit, UnitId};
use crate::config::SimConfig;
use crate::error::{Result, SimError};
use crate::event_bus::EventBus;
use crate::events::{priority, CombatEventKind, SimEvent};
use crate::math::regen_amount;
use crate::scheduler::SharedScheduler;
use crate::state::{StateService, UnitAccessor};
use crate::time::SimTime;

/// Read-modify-write access to units.
///
/// Cloning the service clones the handles; all clones operate on the same
/// state, scheduler and bus.
#[derive(Debug, Clone)]
pub struct UnitService {
    state: StateService,
    scheduler: SharedScheduler<SimEvent>,
    bus: EventBus,
    config: Rc<SimConfig>,
}

impl UnitService {
    /// Create a service over shared engine handles.
    #[must_use]
    pub fn new(
        state: StateService,
        scheduler: SharedScheduler<SimEvent>,
        bus: EventBus,
        config: Rc<SimConfig>,
    ) -> Self {
        Self {
            state,
            scheduler,
            bus,
            config,
        }
    }

    /// Current virtual time.
    #[must_use]
    pub fn now(&self) -> SimTime {
        self.state.current_time()
    }

    /// The scheduler unit effects are scheduled into.
    #[must_use]
    pub fn scheduler(&self) -> &SharedScheduler<SimEvent> {
        &self.scheduler
    }

    /// Apply `f` to a unit and commit the result.
    ///
    /// # Errors
    ///
    /// Returns [`SimError::UnitNotFound`] if the unit does not exist.
    pub fn modify<R>(&self, id: UnitId, f: impl FnOnce(&mut Unit) -> R) -> Result<R> {
        self.state.try_update_state(|state| {
            let unit = state.unit_mut(id).ok_or(SimError::UnitNotFound(id))?;
            Ok(f(unit))
        })
    }

    /// Apply a fallible `f` to a unit, committing only on success.
    ///
    /// # Errors
    ///
    /// Returns [`SimError::UnitNotFound`] if the unit does not exist, or the
    /// error returned by `f`.
    pub fn try_modify<R>(&self, id: UnitId, f: impl FnOnce(&mut Unit) -> Result<R>) -> Result<R> {
        self.state.try_update_state(|state| {
            let unit = state.unit_mut(id).ok_or(SimError::UnitNotFound(id))?;
            f(unit)
        })
    }

    /// Add a new unit.
    ///
    /// # Errors
    ///
    /// Returns [`SimError::InvalidState`] if the ID is already taken.
    pub fn add_unit(&self, unit: Unit) -> Result<()> {
        let id = unit.id;
        self.state.try_update_state(|state| {
            if state.units.contains_key(&id) {
                return Err(SimError::InvalidState(format!("unit {id} already exists")));
            }
            state.insert_unit(unit);
            Ok(())
        })?;

        tracing::debug!(unit = %id, "Added unit");
        Ok(())
    }

    /// Remove a unit and cancel every pending event that refers to it.
    ///
    /// # Errors
    ///
    /// Returns [`SimError::UnitNotFound`] if the unit does not exist.
    pub fn remove_unit(&self, id: UnitId) -> Result<Arc<Unit>> {
        let removed = self.state.try_update_state(|state| {
            state.units.remove(&id).ok_or(SimError::UnitNotFound(id))
        })?;

        let cancelled = self.scheduler.cancel_where(|event| match &event.payload {
            SimEvent::CastStart { caster, .. } => *caster == id,
            SimEvent::CastComplete(record) => record.caster == id,
            SimEvent::CooldownReady { unit, .. }
            | SimEvent::ChargeReady { unit, .. }
            | SimEvent::AuraTick { unit, .. }
            | SimEvent::AuraExpire { unit, .. } => *unit == id,
            SimEvent::PeriodicPower
            | SimEvent::Marker { .. }
            | SimEvent::Action(_)
            | SimEvent::Reevaluate => false,
        });

        tracing::debug!(unit = %id, cancelled, "Removed unit");
        Ok(removed)
    }

    // ========================================================================
    // Health
    // ========================================================================

    /// Deal `amount` damage from `caster` to `target` with `spell`.
    ///
    /// Health is clamped at zero. Returns the damage actually dealt.
    ///
    /// # Errors
    ///
    /// Returns [`SimError::UnitNotFound`] if the target does not exist.
    pub fn damage(&self, caster: UnitId, target: UnitId, spell: &Spell, amount: u32) -> Result<u32> {
        let (dealt, died) = self.remove_health(target, amount)?;

        self.bus.emit(CombatEventKind::SpellDamage {
            caster,
            target,
            spell: spell.id(),
            school: spell.info().school,
            amount: dealt,
        });
        self.report_death(caster, target, died);

        Ok(dealt)
    }

    fn remove_health(&self, target: UnitId, amount: u32) -> Result<(u32, bool)> {
        self.modify(target, |unit| {
            let was_alive = unit.is_alive();
            let dealt = unit.health.decrement(amount);
            (dealt, was_alive && !unit.is_alive())
        })
    }

    fn report_death(&self, killer: UnitId, unit: UnitId, died: bool) {
        if died {
            tracing::debug!(unit = %unit, killer = %killer, "Unit died");
            self.bus.emit(CombatEventKind::UnitDied { unit });
        }
    }

    /// Restore `amount` health to `target`, clamped at max. Returns the
    /// amount actually restored.
    ///
    /// # Errors
    ///
    /// Returns [`SimError::UnitNotFound`] if the target does not exist.
    pub fn heal(&self, caster: UnitId, target: UnitId, spell: SpellId, amount: u32) -> Result<u32> {
        let healed = self.modify(target, |unit| unit.health.increment(amount))?;

        self.bus.emit(CombatEventKind::Heal {
            caster,
            target,
            spell,
            amount: healed,
        });

        Ok(healed)
    }

    // ========================================================================
    // Auras
    // ========================================================================

    /// Apply `aura` to `target`.
    ///
    /// If the target already has the aura, it is refreshed instead: the new
    /// expiry replaces the old one and one stack is added up to the cap. An
    /// expiry event is scheduled for the resulting expiry time; the event
    /// for the previous expiry becomes stale and is ignored when it fires.
    ///
    /// A periodic aura also starts a new tick chain from now. Ticks
    /// scheduled under an earlier application are stale.
    ///
    /// # Errors
    ///
    /// Returns [`SimError::UnitNotFound`] if the target does not exist, or
    /// [`SimError::ScheduledInPast`] if the aura expires before now. Nothing
    /// is committed in either case.
    pub fn apply_aura(&self, target: UnitId, aura: Aura) -> Result<Aura> {
        let spell = aura.spell_id();
        let now = self.now();

        if aura.expires_at < now {
            tracing::error!(
                unit = %target,
                aura = %spell,
                expires_at = %aura.expires_at,
                now = %now,
                "Aura would expire in the past"
            );
            return Err(SimError::ScheduledInPast {
                now,
                requested: aura.expires_at,
            });
        }

        let version = self.state.state_id() + 1;
        let (applied, refreshed) = self.modify(target, |unit| {
            if let Some(existing) = unit.auras.get_mut(&spell) {
                existing.caster = aura.caster;
                existing.applied_at = aura.applied_at;
                existing.expires_at = aura.expires_at;
                existing.max_stacks = aura.max_stacks;
                existing.periodic = aura.periodic;
                existing.stacks = existing.stacks.saturating_add(1).min(existing.max_stacks);
                existing.applied_version = version;
                (existing.clone(), true)
            } else {
                let mut fresh = aura;
                fresh.applied_version = version;
                unit.auras.insert(spell, fresh.clone());
                (fresh, false)
            }
        })?;

        self.scheduler.schedule(
            applied.expires_at,
            priority::AURA_EXPIRE,
            SimEvent::AuraExpire {
                unit: target,
                spell,
                expires_at: applied.expires_at,
            },
        )?;

        let kind = if refreshed {
            CombatEventKind::AuraRefreshed {
                caster: applied.caster,
                target,
                spell,
                stacks: applied.stacks,
                expires_at: applied.expires_at,
            }
        } else {
            CombatEventKind::AuraApplied {
                caster: applied.caster,
                target,
                spell,
                stacks: applied.stacks,
                expires_at: applied.expires_at,
            }
        };
        self.bus.emit(kind);

        tracing::debug!(
            unit = %target,
            aura = %spell,
            stacks = applied.stacks,
            expires_at = %applied.expires_at,
            refreshed,
            "Applied aura"
        );

        if let Some(periodic) = applied.periodic {
            let first = if periodic.tick_on_application {
                now
            } else {
                now + periodic.period
            };
            self.schedule_tick(target, &applied, first)?;
        }

        Ok(applied)
    }

    fn schedule_tick(&self, target: UnitId, aura: &Aura, at: SimTime) -> Result<()> {
        if at > aura.expires_at {
            return Ok(());
        }

        self.scheduler.schedule(
            at,
            priority::AURA_TICK,
            SimEvent::AuraTick {
                unit: target,
                spell: aura.spell_id(),
                applied_version: aura.applied_version,
            },
        )?;
        Ok(())
    }

    /// One periodic tick of an aura scheduled under `applied_version`.
    ///
    /// Deals the aura's damage or healing, scaled by stacks, and schedules
    /// the next tick if it lands at or before expiry. Returns the amount
    /// dealt or restored, or `None` for stale ticks (aura refreshed, removed
    /// or expired) and missing units.
    ///
    /// # Errors
    ///
    /// Returns an error if scheduling the next tick fails.
    pub(crate) fn tick_aura(&self, target: UnitId, spell: SpellId, applied_version: u64) -> Result<Option<u32>> {
        let now = self.now();
        let live = self
            .get(target)
            .ok()
            .and_then(|unit| unit.aura(spell).cloned())
            .filter(|aura| aura.applied_version == applied_version && aura.expires_at >= now);

        let Some(aura) = live else {
            tracing::trace!(unit = %target, aura = %spell, "Ignoring stale aura tick");
            return Ok(None);
        };
        let Some(periodic) = aura.periodic else {
            return Ok(None);
        };

        let amount = periodic.amount.saturating_mul(u32::from(aura.stacks));
        let applied = match periodic.effect {
            PeriodicEffect::Damage => {
                let (dealt, died) = self.remove_health(target, amount)?;
                self.bus.emit(CombatEventKind::PeriodicDamage {
                    caster: aura.caster,
                    target,
                    spell,
                    school: aura.info.school,
                    amount: dealt,
                });
                self.report_death(aura.caster, target, died);
                dealt
            }
            PeriodicEffect::Heal => {
                let healed = self.modify(target, |unit| unit.health.increment(amount))?;
                self.bus.emit(CombatEventKind::PeriodicHeal {
                    caster: aura.caster,
                    target,
                    spell,
                    amount: healed,
                });
                healed
            }
        };

        tracing::trace!(unit = %target, aura = %spell, amount = applied, "Aura ticked");

        self.schedule_tick(target, &aura, now + periodic.period)?;
        Ok(Some(applied))
    }

    /// Remove an aura explicitly. Returns the removed aura, if any.
    ///
    /// # Errors
    ///
    /// Returns [`SimError::UnitNotFound`] if the target does not exist.
    pub fn remove_aura(&self, target: UnitId, spell: SpellId) -> Result<Option<Aura>> {
        let removed = self.modify(target, |unit| unit.auras.remove(&spell))?;

        if removed.is_some() {
            self.bus.emit(CombatEventKind::AuraRemoved {
                target,
                spell,
                expired: false,
            });
        }

        Ok(removed)
    }

    /// Expire an aura if its expiry is still `expires_at`.
    ///
    /// Returns `false` for stale expiry events (aura refreshed or already
    /// removed) and missing units.
    pub(crate) fn expire_aura(&self, target: UnitId, spell: SpellId, expires_at: SimTime) -> bool {
        let current = self
            .get(target)
            .ok()
            .and_then(|unit| unit.aura(spell).map(|aura| aura.expires_at));

        if current != Some(expires_at) {
            tracing::trace!(unit = %target, aura = %spell, "Ignoring stale aura expiry");
            return false;
        }

        if self.modify(target, |unit| unit.auras.remove(&spell)).is_err() {
            return false;
        }

        self.bus.emit(CombatEventKind::AuraRemoved {
            target,
            spell,
            expired: true,
        });
        true
    }

    // ========================================================================
    // Power
    // ========================================================================

    /// Spend `amount` of a power type. Returns `false` (and spends nothing)
    /// if the unit lacks the pool or enough power.
    ///
    /// # Errors
    ///
    /// Returns [`SimError::UnitNotFound`] if the unit does not exist.
    pub fn consume_power(&self, id: UnitId, power: PowerType, amount: u32) -> Result<bool> {
        let current = self.get(id)?.power(power).map(|pool| pool.current());
        if current.map_or(true, |current| current < amount) {
            return Ok(false);
        }

        self.modify(id, |unit| {
            if let Some(pool) = unit.power.get_mut(&power) {
                pool.decrement(amount);
            }
        })?;
        Ok(true)
    }

    /// Add `amount` to a power pool, clamped at max. Returns the amount
    /// actually added (zero if the unit lacks the pool).
    ///
    /// # Errors
    ///
    /// Returns [`SimError::UnitNotFound`] if the unit does not exist.
    pub fn regenerate_power(&self, id: UnitId, power: PowerType, amount: u32) -> Result<u32> {
        let added = self.modify(id, |unit| {
            unit.power
                .get_mut(&power)
                .map_or(0, |pool| pool.increment(amount))
        })?;

        if added > 0 {
            self.bus.emit(CombatEventKind::Energize {
                unit: id,
                power,
                amount: added,
            });
        }

        Ok(added)
    }

    /// One periodic regeneration tick: every player unit regains
    /// `power_regen_percent` of its maximum mana per second of
    /// `power_regen_interval`, rounded down.
    ///
    /// # Errors
    ///
    /// Propagates unit lookup failures.
    pub fn regenerate_all(&self) -> Result<()> {
        let snapshot = self.state.get_state();
        let percent = self.config.power_regen_percent;
        let interval = self.config.power_regen_interval;

        for unit in snapshot.units.values().filter(|unit| unit.is_player) {
            let Some(pool) = unit.power(PowerType::Mana) else {
                continue;
            };
            let amount = regen_amount(pool.max(), percent, interval);
            if amount > 0 && !pool.is_full() {
                self.regenerate_power(unit.id, PowerType::Mana, amount)?;
            }
        }

        Ok(())
    }
}

impl UnitAccessor for UnitService {
    fn get(&self, id: UnitId) -> Result<Arc<Unit>> {
        self.state.get(id)
    }

    fn update(&self, unit: Unit) -> Result<()> {
        UnitAccessor::update(&self.state, unit)
    }
}
