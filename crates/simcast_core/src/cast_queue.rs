//! Cast validation and scheduling.
//!
//! A cast request goes through `Idle -> Validating -> (Rejected | Accepted)
//! -> Casting -> Complete`:
//!
//! 1. The caster's live spell instance is looked up.
//! 2. `beforeCast` hooks transform it.
//! 3. It is validated: not mid-cast, off cooldown, a charge left, GCD
//!    expired, enough power. The first failing check is the rejection.
//! 4. Immediate effects are committed in one state update.
//! 5. Start, completion, cooldown and recharge events are scheduled, plus a
//!    rotation re-evaluation when the caster is the one running the rotation.
//!
//! Rejections are ordinary outcomes ([`CastOutcome::Rejected`]), not errors.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::oneshot;

use crate::components::{ActiveCast, PowerType, Spell, SpellId, Unit, UnitId};
use crate::config::SimConfig;
use crate::error::{Result, SimError};
use crate::event_bus::EventBus;
use crate::events::{priority, CastRecord, CombatEventKind, SimEvent};
use crate::lifecycle::{HookContext, SpellLifecycle};
use crate::rotation::ReevaluationSlot;
use crate::scheduler::{EventId, SharedScheduler};
use crate::state::UnitAccessor;
use crate::time::SimTime;
use crate::unit_service::UnitService;

/// Why a cast request was rejected.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
pub enum CastRejection {
    /// The caster is already casting.
    #[error("Already casting {casting_spell} until {cast_ends_at}")]
    PlayerIsCasting {
        /// Spell being cast.
        casting_spell: SpellId,
        /// When the current cast completes.
        cast_ends_at: SimTime,
    },

    /// The ability's own cooldown has not expired.
    #[error("Spell on cooldown for another {remaining}")]
    SpellOnCooldown {
        /// Time left.
        remaining: SimTime,
    },

    /// The ability uses charges and none are left.
    #[error("No charges available")]
    NoChargesAvailable {
        /// When the next charge returns, if recharging.
        next_charge_at: Option<SimTime>,
    },

    /// The global cooldown is running.
    #[error("Global cooldown active until {gcd_ends_at}")]
    GcdActive {
        /// When the GCD ends.
        gcd_ends_at: SimTime,
    },

    /// The caster cannot pay the power cost.
    #[error("Insufficient {power:?}: need {required}, have {available}")]
    InsufficientPower {
        /// Pool that pays.
        power: PowerType,
        /// Cost.
        required: u32,
        /// Current amount.
        available: u32,
    },
}

/// A cast the queue accepted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CastAccepted {
    /// Casting unit.
    pub caster: UnitId,
    /// Ability.
    pub spell: SpellId,
    /// Target unit.
    pub target: UnitId,
    /// When the cast started.
    pub started_at: SimTime,
    /// When the cast completes.
    pub complete_at: SimTime,
    /// When the GCD this cast triggered ends (the start time if off-GCD).
    pub gcd_expiry: SimTime,
    /// The cast-start event.
    pub start_event: EventId,
    /// The cast-complete event.
    pub complete_event: EventId,
    /// When the rotation will re-evaluate, if a rotation is running.
    pub reevaluate_at: Option<SimTime>,
}

/// Result of [`CastQueue::enqueue`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CastOutcome {
    /// The cast was accepted and scheduled.
    Accepted(CastAccepted),
    /// The cast was rejected; nothing changed.
    Rejected(CastRejection),
}

impl CastOutcome {
    /// Whether the cast was accepted.
    #[must_use]
    pub const fn is_accepted(&self) -> bool {
        matches!(self, Self::Accepted(_))
    }

    /// The accepted cast, if any.
    #[must_use]
    pub const fn accepted(&self) -> Option<&CastAccepted> {
        match self {
            Self::Accepted(accepted) => Some(accepted),
            Self::Rejected(_) => None,
        }
    }

    /// The rejection, if any.
    #[must_use]
    pub const fn rejection(&self) -> Option<&CastRejection> {
        match self {
            Self::Accepted(_) => None,
            Self::Rejected(rejection) => Some(rejection),
        }
    }
}

/// Running totals of cast outcomes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CastStats {
    /// Accepted casts.
    pub accepted: u64,
    /// Rejected casts.
    pub rejected: u64,
}

/// What committing a cast changed, for scheduling follow-up events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct ImmediateEffects {
    gcd_expiry: SimTime,
    cooldown_ready_at: Option<SimTime>,
    charge_ready_at: Option<SimTime>,
}

/// Check a cast in fixed order, failing on the first problem.
fn validate_cast(
    spell: &Spell,
    caster: &Unit,
    now: SimTime,
    config: &SimConfig,
) -> std::result::Result<(), CastRejection> {
    if let Some(cast) = caster.casting {
        return Err(CastRejection::PlayerIsCasting {
            casting_spell: cast.spell,
            cast_ends_at: now + cast.remaining(now),
        });
    }

    if !spell.is_ready(now) {
        return Err(CastRejection::SpellOnCooldown {
            remaining: spell.cooldown_remaining(now),
        });
    }

    if spell.has_charge_system() && spell.charges() == 0 {
        return Err(CastRejection::NoChargesAvailable {
            next_charge_at: spell.next_charge_at(),
        });
    }

    let gcd_ends_at = caster.spells.category_expiry(config.gcd_category);
    if gcd_ends_at > now {
        return Err(CastRejection::GcdActive { gcd_ends_at });
    }

    if let Some(cost) = spell.info().power_cost {
        let available = caster.power(cost.power).map_or(0, |pool| pool.current());
        if available < cost.amount {
            return Err(CastRejection::InsufficientPower {
                power: cost.power,
                required: cost.amount,
                available,
            });
        }
    }

    Ok(())
}

/// Commit the effects of an accepted cast to the caster.
///
/// Runtime changes are made on the transformed `spell` (so its definition
/// decides cooldown and recharge lengths) and copied back onto the caster's
/// own instance, which keeps its original definition.
fn apply_immediate_effects(
    caster: &mut Unit,
    spell: &Spell,
    target: UnitId,
    now: SimTime,
    config: &SimConfig,
) -> Result<ImmediateEffects> {
    let info = spell.info();

    let gcd_expiry = if info.triggers_gcd(config.gcd_bypass_flag) {
        let expiry = now + config.gcd;
        caster.spells.set_category_expiry(config.gcd_category, expiry);
        expiry
    } else {
        now
    };

    let mut updated = spell.clone();

    let mut charge_ready_at = None;
    if updated.has_charge_system() {
        let was_recharging = updated.next_charge_at().is_some();
        updated.consume_charge(now);
        if !was_recharging {
            charge_ready_at = updated.next_charge_at();
        }
    }

    let mut cooldown_ready_at = None;
    if !info.recovery_time.is_zero() {
        updated.start_cooldown(now);
        cooldown_ready_at = Some(updated.cooldown_expiry());
    }

    let own = caster
        .spells
        .get_mut(spell.id())
        .ok_or(SimError::SpellNotFound {
            unit: caster.id,
            spell: spell.id(),
        })?;
    own.sync_runtime(&updated);

    if let Some(cost) = info.power_cost {
        if let Some(pool) = caster.power.get_mut(&cost.power) {
            pool.decrement(cost.amount);
        }
    }

    if !info.cast_time.is_zero() {
        caster.casting = Some(ActiveCast {
            spell: spell.id(),
            target,
            started_at: now,
            ends_at: now + info.cast_time,
        });
    }

    Ok(ImmediateEffects {
        gcd_expiry,
        cooldown_ready_at,
        charge_ready_at,
    })
}

/// Validates cast requests and schedules their consequences.
#[derive(Debug)]
pub struct CastQueue {
    units: UnitService,
    scheduler: SharedScheduler<SimEvent>,
    lifecycle: SpellLifecycle,
    bus: EventBus,
    config: Rc<SimConfig>,
    rotation_caster: Cell<Option<UnitId>>,
    reevaluation: ReevaluationSlot,
    interrupt: RefCell<Option<oneshot::Sender<CastAccepted>>>,
    stats: Cell<CastStats>,
}

impl CastQueue {
    /// Create a queue over shared engine handles.
    #[must_use]
    pub fn new(
        units: UnitService,
        scheduler: SharedScheduler<SimEvent>,
        lifecycle: SpellLifecycle,
        bus: EventBus,
        config: Rc<SimConfig>,
    ) -> Self {
        Self {
            units,
            scheduler,
            lifecycle,
            bus,
            config,
            rotation_caster: Cell::new(None),
            reevaluation: ReevaluationSlot::default(),
            interrupt: RefCell::new(None),
            stats: Cell::new(CastStats::default()),
        }
    }

    /// Request that `caster` casts `spell` at `target` now.
    ///
    /// # Errors
    ///
    /// Returns an error if the caster, the spell or the target does not
    /// exist, or if scheduling fails. Validation failures are not errors;
    /// they come back as [`CastOutcome::Rejected`].
    pub fn enqueue(&self, caster: UnitId, spell: SpellId, target: UnitId) -> Result<CastOutcome> {
        let now = self.units.now();

        let live = self
            .units
            .get(caster)?
            .spell(spell)
            .cloned()
            .ok_or(SimError::SpellNotFound {
                unit: caster,
                spell,
            })?;
        self.units.get(target)?;

        tracing::debug!(
            caster = %caster,
            spell = %spell,
            target = %target,
            name = %live.info().name,
            "Enqueueing cast"
        );

        let ctx = HookContext {
            units: self.units.clone(),
            caster,
            target,
        };
        let (modified, _) = self.lifecycle.execute_before_cast(&ctx, live)?;

        let unit = self.units.get(caster)?;
        if let Err(rejection) = validate_cast(&modified, &unit, now, &self.config) {
            return Ok(self.reject(caster, spell, rejection));
        }

        let effects = self.units.try_modify(caster, |unit| {
            apply_immediate_effects(unit, &modified, target, now, &self.config)
        })?;

        let accepted = self.schedule_cast(caster, target, modified, now, effects)?;

        let mut stats = self.stats.get();
        stats.accepted += 1;
        self.stats.set(stats);

        if let Some(tx) = self.interrupt.borrow_mut().take() {
            // The rotation may already have stopped listening.
            let _ = tx.send(accepted.clone());
        }

        Ok(CastOutcome::Accepted(accepted))
    }

    fn reject(&self, caster: UnitId, spell: SpellId, rejection: CastRejection) -> CastOutcome {
        tracing::debug!(caster = %caster, spell = %spell, reason = %rejection, "Cast rejected");

        let mut stats = self.stats.get();
        stats.rejected += 1;
        self.stats.set(stats);

        self.bus.emit(CombatEventKind::SpellCastFailed {
            caster,
            spell,
            reason: rejection.clone(),
        });

        CastOutcome::Rejected(rejection)
    }

    fn schedule_cast(
        &self,
        caster: UnitId,
        target: UnitId,
        spell: Spell,
        now: SimTime,
        effects: ImmediateEffects,
    ) -> Result<CastAccepted> {
        let spell_id = spell.id();
        let cast_time = spell.info().cast_time;
        let complete_at = now + cast_time;

        let start_event = self.scheduler.schedule(
            now,
            priority::CAST_START,
            SimEvent::CastStart {
                caster,
                spell: spell_id,
                target,
                cast_time,
            },
        )?;

        let name = spell.info().name.clone();
        let complete_event = self.scheduler.schedule(
            complete_at,
            priority::CAST_COMPLETE,
            SimEvent::CastComplete(CastRecord {
                caster,
                target,
                spell,
                started_at: now,
                completes_at: complete_at,
            }),
        )?;

        if let Some(at) = effects.cooldown_ready_at {
            self.scheduler.schedule(
                at,
                priority::COOLDOWN_READY,
                SimEvent::CooldownReady {
                    unit: caster,
                    spell: spell_id,
                },
            )?;
        }

        if let Some(at) = effects.charge_ready_at {
            self.scheduler.schedule(
                at,
                priority::CHARGE_READY,
                SimEvent::ChargeReady {
                    unit: caster,
                    spell: spell_id,
                },
            )?;
        }

        let reevaluate_at = if self.rotation_caster.get() == Some(caster) {
            let at = complete_at.max(effects.gcd_expiry);
            self.reevaluation.schedule(&self.scheduler, at)?;
            Some(at)
        } else {
            None
        };

        tracing::info!(
            caster = %caster,
            spell = %spell_id,
            name = %name,
            at = %now,
            complete_at = %complete_at,
            gcd_expiry = %effects.gcd_expiry,
            "Cast accepted"
        );

        Ok(CastAccepted {
            caster,
            spell: spell_id,
            target,
            started_at: now,
            complete_at,
            gcd_expiry: effects.gcd_expiry,
            start_event,
            complete_event,
            reevaluate_at,
        })
    }

    /// Announce a cast start to observers.
    pub(crate) fn start(&self, caster: UnitId, spell: SpellId, target: UnitId, cast_time: SimTime) {
        self.bus.emit(CombatEventKind::SpellCastStart {
            caster,
            spell,
            target,
            cast_time,
        });
    }

    /// Resolve a cast: clear the casting state, run `onCast` hooks, deal
    /// damage and run `onDamage` hooks.
    ///
    /// # Errors
    ///
    /// Returns an error if the caster no longer exists, or a fatal engine
    /// error raised by a hook.
    pub(crate) async fn complete(&self, record: CastRecord) -> Result<()> {
        let caster = self.units.get(record.caster)?;
        let spell_id = record.spell_id();

        let still_casting = caster
            .casting
            .is_some_and(|cast| cast.spell == spell_id && cast.ends_at == record.completes_at);
        if still_casting {
            self.units.modify(record.caster, |unit| unit.casting = None)?;
        }

        self.bus.emit(CombatEventKind::SpellCastSuccess {
            caster: record.caster,
            spell: spell_id,
            target: record.target,
        });

        let ctx = HookContext {
            units: self.units.clone(),
            caster: record.caster,
            target: record.target,
        };
        self.lifecycle.execute_on_cast(&ctx, &record).await?;

        let damage = record.spell.info().base_damage;
        if damage == 0 {
            return Ok(());
        }

        if self.units.get(record.target).is_err() {
            tracing::debug!(target = %record.target, spell = %spell_id, "Cast target gone, no damage");
            return Ok(());
        }

        let dealt = self
            .units
            .damage(record.caster, record.target, &record.spell, damage)?;
        self.lifecycle.execute_on_damage(&ctx, &record, dealt).await?;

        Ok(())
    }

    /// Restore one charge and schedule the next if the pool is still short.
    ///
    /// # Errors
    ///
    /// Returns an error if the unit or spell no longer exists.
    pub(crate) fn restore_charge(&self, unit: UnitId, spell: SpellId) -> Result<()> {
        let now = self.units.now();

        let (restored, charges, next) = self.units.try_modify(unit, |u| {
            let own = u
                .spells
                .get_mut(spell)
                .ok_or(SimError::SpellNotFound { unit, spell })?;
            let restored = own.restore_charge(now);
            Ok((restored, own.charges(), own.next_charge_at()))
        })?;

        if !restored {
            return Ok(());
        }

        self.bus.emit(CombatEventKind::SpellChargeReady {
            unit,
            spell,
            charges,
        });

        if let Some(at) = next {
            self.scheduler
                .schedule(at, priority::CHARGE_READY, SimEvent::ChargeReady { unit, spell })?;
        }

        Ok(())
    }

    /// Announce that an ability's cooldown has ended.
    pub(crate) fn cooldown_ready(&self, unit: UnitId, spell: SpellId) {
        self.bus
            .emit(CombatEventKind::SpellCooldownReady { unit, spell });
    }

    /// The unit whose accepted casts schedule rotation re-evaluation.
    #[must_use]
    pub fn rotation_caster(&self) -> Option<UnitId> {
        self.rotation_caster.get()
    }

    /// Set or clear the rotation's caster.
    pub fn set_rotation_caster(&self, caster: Option<UnitId>) {
        self.rotation_caster.set(caster);
    }

    /// Schedule a rotation re-evaluation at `at`, keeping only the earliest
    /// pending one.
    ///
    /// # Errors
    ///
    /// Returns [`SimError::ScheduledInPast`] if `at` is before now.
    pub fn schedule_reevaluation(&self, at: SimTime) -> Result<Option<EventId>> {
        self.reevaluation.schedule(&self.scheduler, at)
    }

    /// Cancel the pending rotation re-evaluation, if any.
    pub fn cancel_reevaluation(&self) -> bool {
        self.reevaluation.cancel(&self.scheduler)
    }

    /// When the pending rotation re-evaluation runs.
    #[must_use]
    pub fn reevaluation_at(&self) -> Option<SimTime> {
        self.reevaluation.pending_at(&self.scheduler)
    }

    /// Deliver the next accepted cast to `tx`. Replaces any earlier sender.
    pub fn arm_interrupt(&self, tx: oneshot::Sender<CastAccepted>) {
        *self.interrupt.borrow_mut() = Some(tx);
    }

    /// Drop the pending interrupt sender, if any.
    pub fn disarm_interrupt(&self) {
        self.interrupt.borrow_mut().take();
    }

    /// Running totals of outcomes.
    #[must_use]
    pub fn stats(&self) -> CastStats {
        self.stats.get()
    }

    /// The unit accessor casts are validated against.
    #[must_use]
    pub fn units(&self) -> &UnitService {
        &self.units
    }

    /// The scheduler casts are scheduled into.
    #[must_use]
    pub fn scheduler(&self) -> &SharedScheduler<SimEvent> {
        &self.scheduler
    }

    /// Engine configuration.
    #[must_use]
    pub fn config(&self) -> &SimConfig {
        &self.config
    }

    /// The shared modifier pipeline.
    #[must_use]
    pub fn lifecycle(&self) -> &SpellLifecycle {
        &self.lifecycle
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use crate::data::{AbilityDefinition, PowerCost};
    use crate::event_bus::Subscription;
    use crate::state::StateService;

    const HUNTER: UnitId = UnitId(1);
    const DUMMY: UnitId = UnitId(2);

    struct Harness {
        queue: CastQueue,
        state: StateService,
        scheduler: SharedScheduler<SimEvent>,
        events: Subscription,
    }

    fn def(id: u32) -> AbilityDefinition {
        AbilityDefinition::new(SpellId(id), format!("Ability {id}"))
    }

    fn harness(abilities: Vec<AbilityDefinition>) -> Harness {
        let state = StateService::default();
        let scheduler = SharedScheduler::new(state.clone());
        let bus = EventBus::new(state.clone());
        let events = bus.subscribe();
        let config = Rc::new(SimConfig::default());
        let units = UnitService::new(state.clone(), scheduler.clone(), bus.clone(), Rc::clone(&config));

        let mut hunter = Unit::new(HUNTER, "Hunter").player().with_power(PowerType::Focus, 100);
        for ability in abilities {
            hunter = hunter.with_spell(Spell::new(Arc::new(ability)));
        }
        units.add_unit(hunter).unwrap();
        units.add_unit(Unit::new(DUMMY, "Training Dummy").with_health(10_000)).unwrap();

        let lifecycle = SpellLifecycle::new(bus.clone(), config.hook_timeout());
        let queue = CastQueue::new(units, scheduler.clone(), lifecycle, bus, config);

        Harness {
            queue,
            state,
            scheduler,
            events,
        }
    }

    fn rejection(outcome: &CastOutcome) -> CastRejection {
        outcome.rejection().cloned().expect("expected a rejection")
    }

    #[test]
    fn test_gcd_blocks_second_instant_cast() {
        let h = harness(vec![def(1)]);

        let first = h.queue.enqueue(HUNTER, SpellId(1), DUMMY).unwrap();
        let accepted = first.accepted().unwrap();
        assert_eq!(accepted.gcd_expiry, SimTime::from_millis(1500));
        assert_eq!(accepted.complete_at, SimTime::ZERO);

        let second = h.queue.enqueue(HUNTER, SpellId(1), DUMMY).unwrap();
        assert_eq!(
            rejection(&second),
            CastRejection::GcdActive {
                gcd_ends_at: SimTime::from_millis(1500)
            }
        );
        assert_eq!(h.queue.stats(), CastStats { accepted: 1, rejected: 1 });
    }

    #[test]
    fn test_charges_and_gcd_bypass() {
        let mut ability = def(2);
        ability.max_charges = 2;
        ability.charge_recovery_time = SimTime::from_millis(1000);
        ability.interrupt_flags = 0x08;
        let h = harness(vec![ability]);

        assert!(h.queue.enqueue(HUNTER, SpellId(2), DUMMY).unwrap().is_accepted());
        assert!(h.queue.enqueue(HUNTER, SpellId(2), DUMMY).unwrap().is_accepted());
        let third = h.queue.enqueue(HUNTER, SpellId(2), DUMMY).unwrap();
        assert_eq!(
            rejection(&third),
            CastRejection::NoChargesAvailable {
                next_charge_at: Some(SimTime::from_millis(1000))
            }
        );

        let hunter = h.state.get_state().unit(HUNTER).unwrap().clone();
        assert_eq!(hunter.spell(SpellId(2)).unwrap().charges(), 0);
        assert_eq!(hunter.spells.category_expiry(133), SimTime::ZERO);

        // Only the first consumption (from a full pool) starts a recharge.
        let charge_events = h
            .scheduler
            .pending()
            .into_iter()
            .filter(|event| matches!(event.payload, SimEvent::ChargeReady { .. }))
            .count();
        assert_eq!(charge_events, 1);
    }

    #[test]
    fn test_cooldown_rejection_and_ready_event() {
        let mut ability = def(3);
        ability.recovery_time = SimTime::from_millis(6000);
        ability.interrupt_flags = 0x08;
        let h = harness(vec![ability]);

        h.queue.enqueue(HUNTER, SpellId(3), DUMMY).unwrap();
        let again = h.queue.enqueue(HUNTER, SpellId(3), DUMMY).unwrap();
        assert_eq!(
            rejection(&again),
            CastRejection::SpellOnCooldown {
                remaining: SimTime::from_millis(6000)
            }
        );

        let cooldown_event = h
            .scheduler
            .pending()
            .into_iter()
            .find(|event| matches!(event.payload, SimEvent::CooldownReady { .. }))
            .unwrap();
        assert_eq!(cooldown_event.time, SimTime::from_millis(6000));
    }

    #[test]
    fn test_casting_rejects_without_mutation() {
        let mut ability = def(4);
        ability.cast_time = SimTime::from_millis(2000);
        ability.interrupt_flags = 0x08;
        let h = harness(vec![ability, def(5)]);

        h.queue.enqueue(HUNTER, SpellId(4), DUMMY).unwrap();
        let before = h.state.get_state();
        let pending = h.scheduler.len();

        let outcome = h.queue.enqueue(HUNTER, SpellId(5), DUMMY).unwrap();
        assert_eq!(
            rejection(&outcome),
            CastRejection::PlayerIsCasting {
                casting_spell: SpellId(4),
                cast_ends_at: SimTime::from_millis(2000)
            }
        );
        assert_eq!(h.state.get_state(), before);
        assert_eq!(h.scheduler.len(), pending);
    }

    #[test]
    fn test_power_cost_checked_and_paid() {
        let mut ability = def(6);
        ability.interrupt_flags = 0x08;
        ability.power_cost = Some(PowerCost {
            power: PowerType::Focus,
            amount: 60,
        });
        let h = harness(vec![ability]);

        assert!(h.queue.enqueue(HUNTER, SpellId(6), DUMMY).unwrap().is_accepted());
        let second = h.queue.enqueue(HUNTER, SpellId(6), DUMMY).unwrap();
        assert_eq!(
            rejection(&second),
            CastRejection::InsufficientPower {
                power: PowerType::Focus,
                required: 60,
                available: 40
            }
        );
    }

    #[test]
    fn test_rejection_is_published() {
        let mut h = harness(vec![def(1)]);
        h.queue.enqueue(HUNTER, SpellId(1), DUMMY).unwrap();
        h.queue.enqueue(HUNTER, SpellId(1), DUMMY).unwrap();

        let failed = h
            .events
            .drain_events()
            .into_iter()
            .filter(|event| matches!(event.kind, CombatEventKind::SpellCastFailed { .. }))
            .count();
        assert_eq!(failed, 1);
    }

    #[test]
    fn test_unknown_spell_is_an_error() {
        let h = harness(vec![]);
        assert_eq!(
            h.queue.enqueue(HUNTER, SpellId(99), DUMMY).unwrap_err(),
            SimError::SpellNotFound {
                unit: HUNTER,
                spell: SpellId(99)
            }
        );
        assert_eq!(
            h.queue.enqueue(UnitId(7), SpellId(1), DUMMY).unwrap_err(),
            SimError::UnitNotFound(UnitId(7))
        );
    }

    #[test]
    fn test_interrupt_fires_once_on_success() {
        let h = harness(vec![def(1)]);
        let (tx, mut rx) = oneshot::channel();
        h.queue.arm_interrupt(tx);

        h.queue.enqueue(HUNTER, SpellId(1), DUMMY).unwrap();

        let delivered = rx.try_recv().unwrap();
        assert_eq!(delivered.spell, SpellId(1));
    }

    #[test]
    fn test_reevaluation_at_later_of_complete_and_gcd() {
        let mut ability = def(8);
        ability.cast_time = SimTime::from_millis(2500);
        let h = harness(vec![ability]);
        h.queue.set_rotation_caster(Some(HUNTER));

        let outcome = h.queue.enqueue(HUNTER, SpellId(8), DUMMY).unwrap();
        assert_eq!(
            outcome.accepted().unwrap().reevaluate_at,
            Some(SimTime::from_millis(2500))
        );
        assert_eq!(h.queue.reevaluation_at(), Some(SimTime::from_millis(2500)));
    }

    #[test]
    fn test_other_casters_leave_reevaluation_alone() {
        let mut ability = def(8);
        ability.cast_time = SimTime::from_millis(3000);
        let h = harness(vec![ability, def(9)]);
        h.queue
            .units()
            .add_unit(Unit::new(UnitId(3), "Pet").with_spell(Spell::new(Arc::new(def(9)))))
            .unwrap();
        h.queue.set_rotation_caster(Some(HUNTER));

        h.queue.enqueue(HUNTER, SpellId(8), DUMMY).unwrap();
        let pet_cast = h.queue.enqueue(UnitId(3), SpellId(9), DUMMY).unwrap();

        assert_eq!(pet_cast.accepted().unwrap().reevaluate_at, None);
        assert_eq!(h.queue.reevaluation_at(), Some(SimTime::from_millis(3000)));
        let reevaluations = h
            .scheduler
            .pending()
            .into_iter()
            .filter(|event| event.payload == SimEvent::Reevaluate)
            .count();
        assert_eq!(reevaluations, 1);
    }
}
