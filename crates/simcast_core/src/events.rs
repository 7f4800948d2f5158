//! Scheduler payloads and observable combat events.
//!
//! [`SimEvent`] is what sits in the scheduler; the
//! [`Simulation`](crate::simulation::Simulation) dispatches each kind to its
//! behavior. [`CombatEvent`] is what observers see on the
//! [`EventBus`](crate::event_bus::EventBus).

use serde::{Deserialize, Serialize};

use crate::cast_queue::CastRejection;
use crate::components::{PowerType, Spell, SpellId, UnitId};
use crate::data::SpellSchool;
use crate::lifecycle::{ModifierFailure, ScheduledAction};
use crate::scheduler::EventId;
use crate::time::SimTime;

/// Execution priorities for events at the same time. Lower runs first.
pub mod priority {
    /// Cast-start marker.
    pub const CAST_START: u8 = 10;
    /// Cast completion.
    pub const CAST_COMPLETE: u8 = 20;
    /// Cooldown expiry.
    pub const COOLDOWN_READY: u8 = 30;
    /// Charge restored.
    pub const CHARGE_READY: u8 = 30;
    /// Periodic aura tick. Runs before an expiry at the same time, so the
    /// last tick lands.
    pub const AURA_TICK: u8 = 35;
    /// Aura expiry.
    pub const AURA_EXPIRE: u8 = 40;
    /// Periodic power regeneration.
    pub const PERIODIC_POWER: u8 = 50;
    /// User-scheduled marker.
    pub const MARKER: u8 = 60;
    /// User- or hook-scheduled action.
    pub const ACTION: u8 = 60;
    /// Rotation re-evaluation. Runs after everything else at the same time,
    /// so a cast completing or a charge returning is visible to it.
    pub const REEVALUATE: u8 = 100;
}

/// A cast accepted by the cast queue, carried to its completion event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CastRecord {
    /// Casting unit.
    pub caster: UnitId,
    /// Target unit.
    pub target: UnitId,
    /// The spell as it was after `beforeCast` transforms.
    pub spell: Spell,
    /// When the cast was accepted.
    pub started_at: SimTime,
    /// When the cast completes.
    pub completes_at: SimTime,
}

impl CastRecord {
    /// The cast ability.
    #[must_use]
    pub fn spell_id(&self) -> SpellId {
        self.spell.id()
    }
}

/// Payload of a scheduled event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SimEvent {
    /// A cast started; announces it to observers.
    CastStart {
        /// Casting unit.
        caster: UnitId,
        /// Ability.
        spell: SpellId,
        /// Target unit.
        target: UnitId,
        /// Cast duration after transforms.
        cast_time: SimTime,
    },
    /// A cast completes.
    CastComplete(CastRecord),
    /// An ability's own cooldown ends.
    CooldownReady {
        /// Owner of the spell.
        unit: UnitId,
        /// Ability.
        spell: SpellId,
    },
    /// One charge is restored.
    ChargeReady {
        /// Owner of the spell.
        unit: UnitId,
        /// Ability.
        spell: SpellId,
    },
    /// A periodic aura ticks.
    AuraTick {
        /// Unit carrying the aura.
        unit: UnitId,
        /// Aura ability.
        spell: SpellId,
        /// Aura version the tick was scheduled under.
        applied_version: u64,
    },
    /// An aura reaches the expiry time it had when this event was scheduled.
    AuraExpire {
        /// Unit carrying the aura.
        unit: UnitId,
        /// Aura ability.
        spell: SpellId,
        /// Expiry this event was scheduled for.
        expires_at: SimTime,
    },
    /// Periodic power regeneration tick.
    PeriodicPower,
    /// A labelled marker scheduled by the embedder.
    Marker {
        /// Label echoed to observers.
        label: String,
    },
    /// An arbitrary deferred action.
    Action(ScheduledAction),
    /// Rotation re-evaluation.
    Reevaluate,
}

impl SimEvent {
    /// Same-time execution priority for this kind.
    #[must_use]
    pub const fn priority(&self) -> u8 {
        match self {
            Self::CastStart { .. } => priority::CAST_START,
            Self::CastComplete(_) => priority::CAST_COMPLETE,
            Self::CooldownReady { .. } => priority::COOLDOWN_READY,
            Self::ChargeReady { .. } => priority::CHARGE_READY,
            Self::AuraTick { .. } => priority::AURA_TICK,
            Self::AuraExpire { .. } => priority::AURA_EXPIRE,
            Self::PeriodicPower => priority::PERIODIC_POWER,
            Self::Marker { .. } => priority::MARKER,
            Self::Action(_) => priority::ACTION,
            Self::Reevaluate => priority::REEVALUATE,
        }
    }

    /// Short name for logging.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::CastStart { .. } => "cast_start",
            Self::CastComplete(_) => "cast_complete",
            Self::CooldownReady { .. } => "cooldown_ready",
            Self::ChargeReady { .. } => "charge_ready",
            Self::AuraTick { .. } => "aura_tick",
            Self::AuraExpire { .. } => "aura_expire",
            Self::PeriodicPower => "periodic_power",
            Self::Marker { .. } => "marker",
            Self::Action(_) => "action",
            Self::Reevaluate => "reevaluate",
        }
    }
}

/// Something observable that happened in combat.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CombatEvent {
    /// Virtual time it happened.
    pub time: SimTime,
    /// The scheduled event being executed when it happened, if any.
    pub source: Option<EventId>,
    /// What happened.
    pub kind: CombatEventKind,
}

/// The kinds of [`CombatEvent`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum CombatEventKind {
    /// A cast began.
    SpellCastStart {
        /// Casting unit.
        caster: UnitId,
        /// Ability.
        spell: SpellId,
        /// Target unit.
        target: UnitId,
        /// Cast duration.
        cast_time: SimTime,
    },
    /// A cast completed.
    SpellCastSuccess {
        /// Casting unit.
        caster: UnitId,
        /// Ability.
        spell: SpellId,
        /// Target unit.
        target: UnitId,
    },
    /// A cast request was rejected.
    SpellCastFailed {
        /// Unit that tried to cast.
        caster: UnitId,
        /// Ability.
        spell: SpellId,
        /// Why.
        reason: CastRejection,
    },
    /// Damage was dealt.
    SpellDamage {
        /// Source unit.
        caster: UnitId,
        /// Damaged unit.
        target: UnitId,
        /// Ability.
        spell: SpellId,
        /// School of the ability.
        school: SpellSchool,
        /// Health actually removed.
        amount: u32,
    },
    /// Health was restored.
    Heal {
        /// Source unit.
        caster: UnitId,
        /// Healed unit.
        target: UnitId,
        /// Ability.
        spell: SpellId,
        /// Health actually restored.
        amount: u32,
    },
    /// A damage-over-time aura ticked.
    PeriodicDamage {
        /// Unit that applied the aura.
        caster: UnitId,
        /// Damaged unit.
        target: UnitId,
        /// Aura ability.
        spell: SpellId,
        /// School of the aura.
        school: SpellSchool,
        /// Health actually removed.
        amount: u32,
    },
    /// A heal-over-time aura ticked.
    PeriodicHeal {
        /// Unit that applied the aura.
        caster: UnitId,
        /// Healed unit.
        target: UnitId,
        /// Aura ability.
        spell: SpellId,
        /// Health actually restored.
        amount: u32,
    },
    /// A new aura was applied.
    AuraApplied {
        /// Unit that applied it.
        caster: UnitId,
        /// Unit carrying it.
        target: UnitId,
        /// Aura ability.
        spell: SpellId,
        /// Stack count.
        stacks: u8,
        /// Expiry time.
        expires_at: SimTime,
    },
    /// An existing aura was refreshed.
    AuraRefreshed {
        /// Unit that refreshed it.
        caster: UnitId,
        /// Unit carrying it.
        target: UnitId,
        /// Aura ability.
        spell: SpellId,
        /// Stack count after refresh.
        stacks: u8,
        /// New expiry time.
        expires_at: SimTime,
    },
    /// An aura was removed.
    AuraRemoved {
        /// Unit that carried it.
        target: UnitId,
        /// Aura ability.
        spell: SpellId,
        /// Whether it ran out (rather than being removed explicitly).
        expired: bool,
    },
    /// An ability's own cooldown ended.
    SpellCooldownReady {
        /// Owner.
        unit: UnitId,
        /// Ability.
        spell: SpellId,
    },
    /// A charge was restored.
    SpellChargeReady {
        /// Owner.
        unit: UnitId,
        /// Ability.
        spell: SpellId,
        /// Charges after restoring.
        charges: u8,
    },
    /// Power was regenerated.
    Energize {
        /// Unit.
        unit: UnitId,
        /// Pool.
        power: PowerType,
        /// Amount actually added.
        amount: u32,
    },
    /// A unit's health reached zero.
    UnitDied {
        /// Unit.
        unit: UnitId,
    },
    /// A modifier hook failed or timed out.
    ModifierFailed(ModifierFailure),
    /// A scheduled action failed or timed out.
    ActionFailed {
        /// Label given when scheduling.
        label: String,
        /// What went wrong.
        reason: String,
    },
    /// An embedder-scheduled marker fired.
    Marker {
        /// Label given when scheduling.
        label: String,
    },
}
