//! Unit, spell and aura definitions.
//!
//! These are the runtime values stored in [`GameState`](crate::state::GameState).
//! They are plain data: every change goes through the
//! [`UnitService`](crate::unit_service::UnitService), which reads the current
//! value, builds a new one and writes it back in one step.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::data::{AbilityDefinition, SpellDataProvider};
use crate::error::Result;
use crate::math::{ratio, Fixed};
use crate::time::SimTime;

/// Unique identifier for units.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UnitId(pub u32);

impl UnitId {
    /// Create a new unit ID.
    #[must_use]
    pub const fn new(id: u32) -> Self {
        Self(id)
    }
}

impl fmt::Display for UnitId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unit-{}", self.0)
    }
}

/// Unique identifier for abilities (and the auras they create).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SpellId(pub u32);

impl SpellId {
    /// Create a new spell ID.
    #[must_use]
    pub const fn new(id: u32) -> Self {
        Self(id)
    }
}

impl fmt::Display for SpellId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "spell-{}", self.0)
    }
}

// ============================================================================
// Resources
// ============================================================================

/// Power types a unit may carry besides health.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum PowerType {
    /// Regenerates over time for player units.
    Mana,
    /// Generated by dealing or taking damage.
    Rage,
    /// Fast-regenerating melee resource.
    Energy,
    /// Ranged resource.
    Focus,
    /// Generated by spending runes.
    RunicPower,
}

/// A bounded resource value such as health or mana.
///
/// `current` is always within `[0, max]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ResourcePool {
    current: u32,
    max: u32,
}

impl ResourcePool {
    /// Create a full pool.
    #[must_use]
    pub const fn new(max: u32) -> Self {
        Self { current: max, max }
    }

    /// Create a pool with an explicit current value (clamped to `max`).
    #[must_use]
    pub fn with_current(current: u32, max: u32) -> Self {
        Self {
            current: current.min(max),
            max,
        }
    }

    /// Current value.
    #[must_use]
    pub const fn current(&self) -> u32 {
        self.current
    }

    /// Maximum value.
    #[must_use]
    pub const fn max(&self) -> u32 {
        self.max
    }

    /// Whether the pool is at zero.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.current == 0
    }

    /// Whether the pool is at its maximum.
    #[must_use]
    pub const fn is_full(&self) -> bool {
        self.current >= self.max
    }

    /// Current value as a fraction of max.
    #[must_use]
    pub fn fraction(&self) -> Fixed {
        ratio(self.current, self.max)
    }

    /// Remove up to `amount`, returning how much was actually removed.
    pub fn decrement(&mut self, amount: u32) -> u32 {
        let removed = amount.min(self.current);
        self.current -= removed;
        removed
    }

    /// Add up to `amount`, returning how much was actually added.
    pub fn increment(&mut self, amount: u32) -> u32 {
        let added = amount.min(self.max - self.current);
        self.current += added;
        added
    }
}

// ============================================================================
// Spells
// ============================================================================

/// A unit's runtime instance of an ability.
///
/// The definition is shared between every unit that knows the ability; the
/// charge count, cooldown and recharge timer belong to this instance only.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Spell {
    info: Arc<AbilityDefinition>,
    charges: u8,
    cooldown_expiry: SimTime,
    next_charge_at: Option<SimTime>,
}

impl Spell {
    /// Create a ready instance with a full charge pool.
    #[must_use]
    pub fn new(info: Arc<AbilityDefinition>) -> Self {
        let charges = info.max_charges;
        Self {
            info,
            charges,
            cooldown_expiry: SimTime::ZERO,
            next_charge_at: None,
        }
    }

    /// The ability this instance was created from.
    #[must_use]
    pub fn id(&self) -> SpellId {
        self.info.id
    }

    /// The ability definition.
    #[must_use]
    pub fn info(&self) -> &AbilityDefinition {
        &self.info
    }

    /// Mutable access to the definition for `beforeCast` transforms.
    ///
    /// Copies the definition first if it is shared, so other units (and the
    /// data provider) keep the original.
    pub fn info_mut(&mut self) -> &mut AbilityDefinition {
        Arc::make_mut(&mut self.info)
    }

    /// Return a copy of this spell with a different cast time.
    #[must_use]
    pub fn with_cast_time(mut self, cast_time: SimTime) -> Self {
        self.info_mut().cast_time = cast_time;
        self
    }

    /// Copy charges, cooldown and recharge timer from `other`, keeping this
    /// instance's definition.
    pub fn sync_runtime(&mut self, other: &Spell) {
        self.charges = other.charges.min(self.info.max_charges);
        self.cooldown_expiry = other.cooldown_expiry;
        self.next_charge_at = other.next_charge_at;
    }

    /// Remaining charges (always 0 for abilities without a charge system).
    #[must_use]
    pub const fn charges(&self) -> u8 {
        self.charges
    }

    /// When the ability's own cooldown ends.
    #[must_use]
    pub const fn cooldown_expiry(&self) -> SimTime {
        self.cooldown_expiry
    }

    /// When the next charge is restored, if the pool is recharging.
    #[must_use]
    pub const fn next_charge_at(&self) -> Option<SimTime> {
        self.next_charge_at
    }

    /// Whether the ability uses charges.
    #[must_use]
    pub fn has_charge_system(&self) -> bool {
        self.info.max_charges > 0
    }

    /// Whether every charge is available.
    #[must_use]
    pub fn is_full(&self) -> bool {
        self.charges >= self.info.max_charges
    }

    /// Whether the ability's own cooldown has expired at `now`.
    #[must_use]
    pub fn is_ready(&self, now: SimTime) -> bool {
        self.cooldown_expiry <= now
    }

    /// Time left on the ability's own cooldown.
    #[must_use]
    pub fn cooldown_remaining(&self, now: SimTime) -> SimTime {
        self.cooldown_expiry.saturating_sub(now)
    }

    /// Start the ability's own cooldown, if it has one.
    pub fn start_cooldown(&mut self, now: SimTime) {
        if !self.info.recovery_time.is_zero() {
            self.cooldown_expiry = now + self.info.recovery_time;
        }
    }

    /// Clear the ability's own cooldown.
    pub fn reset_cooldown(&mut self) {
        self.cooldown_expiry = SimTime::ZERO;
    }

    /// Spend one charge.
    ///
    /// Starts the recharge timer when spending from a full pool. Returns
    /// `false` (and changes nothing) when no charge is left.
    pub fn consume_charge(&mut self, now: SimTime) -> bool {
        if self.charges == 0 {
            return false;
        }

        let was_full = self.is_full();
        self.charges -= 1;

        if was_full && !self.info.charge_recovery_time.is_zero() {
            self.next_charge_at = Some(now + self.info.charge_recovery_time);
        }

        true
    }

    /// Restore one charge.
    ///
    /// Schedules the following charge if the pool is still not full. Returns
    /// `false` (and changes nothing) when the pool is already full.
    pub fn restore_charge(&mut self, now: SimTime) -> bool {
        if self.is_full() {
            self.next_charge_at = None;
            return false;
        }

        self.charges += 1;

        self.next_charge_at = if self.is_full() {
            None
        } else {
            Some(now + self.info.charge_recovery_time)
        };

        true
    }
}

/// Spells known by a unit plus cooldown-category expiry times.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SpellBook {
    all: BTreeMap<SpellId, Spell>,
    cooldown_categories: BTreeMap<u32, SimTime>,
}

impl SpellBook {
    /// Look up a spell.
    #[must_use]
    pub fn get(&self, id: SpellId) -> Option<&Spell> {
        self.all.get(&id)
    }

    /// Look up a spell mutably.
    pub fn get_mut(&mut self, id: SpellId) -> Option<&mut Spell> {
        self.all.get_mut(&id)
    }

    /// Add or replace a spell.
    pub fn insert(&mut self, spell: Spell) {
        self.all.insert(spell.id(), spell);
    }

    /// Iterate spells in ID order.
    pub fn iter(&self) -> impl Iterator<Item = &Spell> {
        self.all.values()
    }

    /// Number of spells.
    #[must_use]
    pub fn len(&self) -> usize {
        self.all.len()
    }

    /// Whether the unit knows no spells.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.all.is_empty()
    }

    /// Expiry of a cooldown category (zero when never set).
    #[must_use]
    pub fn category_expiry(&self, category: u32) -> SimTime {
        self.cooldown_categories
            .get(&category)
            .copied()
            .unwrap_or(SimTime::ZERO)
    }

    /// Set the expiry of a cooldown category, replacing any earlier entry.
    pub fn set_category_expiry(&mut self, category: u32, expiry: SimTime) {
        self.cooldown_categories.insert(category, expiry);
    }
}

// ============================================================================
// Auras
// ============================================================================

/// What a periodic aura does on each tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PeriodicEffect {
    /// Damage over time.
    Damage,
    /// Healing over time.
    Heal,
}

/// Tick schedule of a damage- or heal-over-time aura.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AuraPeriodic {
    /// Time between ticks.
    pub period: SimTime,
    /// Damage or healing per tick, per stack.
    pub amount: u32,
    /// Damage or heal.
    pub effect: PeriodicEffect,
    /// Whether the first tick lands when the aura is applied.
    pub tick_on_application: bool,
}

impl AuraPeriodic {
    /// Damage every `period`.
    #[must_use]
    pub const fn damage(period: SimTime, amount: u32) -> Self {
        Self {
            period,
            amount,
            effect: PeriodicEffect::Damage,
            tick_on_application: false,
        }
    }

    /// Healing every `period`.
    #[must_use]
    pub const fn heal(period: SimTime, amount: u32) -> Self {
        Self {
            period,
            amount,
            effect: PeriodicEffect::Heal,
            tick_on_application: false,
        }
    }

    /// Tick once immediately on application.
    #[must_use]
    pub const fn ticking_on_application(mut self) -> Self {
        self.tick_on_application = true;
        self
    }
}

/// A timed buff or debuff attached to a unit.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Aura {
    /// The ability that defines this aura.
    pub info: Arc<AbilityDefinition>,
    /// The unit that applied it.
    pub caster: UnitId,
    /// When it was (last) applied.
    pub applied_at: SimTime,
    /// When it expires.
    pub expires_at: SimTime,
    /// Current stack count (at least 1).
    pub stacks: u8,
    /// Stack cap.
    pub max_stacks: u8,
    /// Tick schedule, for damage- and heal-over-time auras.
    #[serde(default)]
    pub periodic: Option<AuraPeriodic>,
    /// State version that committed the latest application or refresh.
    /// Tick events scheduled under another version are stale.
    #[serde(default)]
    pub applied_version: u64,
}

impl Aura {
    /// Create a single-stack aura lasting `duration` from `now`.
    #[must_use]
    pub fn new(
        info: Arc<AbilityDefinition>,
        caster: UnitId,
        now: SimTime,
        duration: SimTime,
    ) -> Self {
        Self {
            info,
            caster,
            applied_at: now,
            expires_at: now + duration,
            stacks: 1,
            max_stacks: 1,
            periodic: None,
            applied_version: 0,
        }
    }

    /// Allow up to `max_stacks` stacks.
    #[must_use]
    pub fn with_max_stacks(mut self, max_stacks: u8) -> Self {
        self.max_stacks = max_stacks.max(1);
        self
    }

    /// Tick every `periodic.period` until expiry.
    ///
    /// A zero period is ignored.
    #[must_use]
    pub fn with_periodic(mut self, periodic: AuraPeriodic) -> Self {
        self.periodic = (!periodic.period.is_zero()).then_some(periodic);
        self
    }

    /// The aura's ability ID.
    #[must_use]
    pub fn spell_id(&self) -> SpellId {
        self.info.id
    }

    /// Whether the aura has run out at `now`.
    #[must_use]
    pub fn is_expired(&self, now: SimTime) -> bool {
        self.expires_at <= now
    }

    /// Time left before expiry.
    #[must_use]
    pub fn remaining(&self, now: SimTime) -> SimTime {
        self.expires_at.saturating_sub(now)
    }
}

// ============================================================================
// Units
// ============================================================================

/// The cast a unit is currently channelling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ActiveCast {
    /// Ability being cast.
    pub spell: SpellId,
    /// Cast target.
    pub target: UnitId,
    /// When the cast started.
    pub started_at: SimTime,
    /// When the cast completes.
    pub ends_at: SimTime,
}

impl ActiveCast {
    /// Time left until the cast completes.
    #[must_use]
    pub fn remaining(&self, now: SimTime) -> SimTime {
        self.ends_at.saturating_sub(now)
    }
}

/// A combatant.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Unit {
    /// Unique identifier.
    pub id: UnitId,
    /// Display name.
    pub name: String,
    /// Whether this unit is player-controlled (receives power regeneration).
    pub is_player: bool,
    /// Health pool.
    pub health: ResourcePool,
    /// Power pools by type.
    pub power: BTreeMap<PowerType, ResourcePool>,
    /// Active auras by ability ID.
    pub auras: BTreeMap<SpellId, Aura>,
    /// Known spells and cooldown categories.
    pub spells: SpellBook,
    /// The unresolved cast, if any. A unit has at most one.
    pub casting: Option<ActiveCast>,
}

impl Unit {
    /// Create a unit with 100 health and no spells.
    #[must_use]
    pub fn new(id: UnitId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            is_player: false,
            health: ResourcePool::new(100),
            power: BTreeMap::new(),
            auras: BTreeMap::new(),
            spells: SpellBook::default(),
            casting: None,
        }
    }

    /// Mark the unit as player-controlled.
    #[must_use]
    pub fn player(mut self) -> Self {
        self.is_player = true;
        self
    }

    /// Set maximum (and current) health.
    #[must_use]
    pub fn with_health(mut self, max: u32) -> Self {
        self.health = ResourcePool::new(max);
        self
    }

    /// Add a full power pool.
    #[must_use]
    pub fn with_power(mut self, power: PowerType, max: u32) -> Self {
        self.power.insert(power, ResourcePool::new(max));
        self
    }

    /// Teach the unit a spell.
    #[must_use]
    pub fn with_spell(mut self, spell: Spell) -> Self {
        self.spells.insert(spell);
        self
    }

    /// Teach the unit spells looked up from a data provider.
    ///
    /// # Errors
    ///
    /// Returns an error if any ID is unknown to the provider.
    pub fn with_spells_from<P>(mut self, provider: &P, ids: &[SpellId]) -> Result<Self>
    where
        P: SpellDataProvider + ?Sized,
    {
        for &id in ids {
            self.spells.insert(Spell::new(provider.definition(id)?));
        }
        Ok(self)
    }

    /// Whether the unit has an unresolved cast.
    #[must_use]
    pub const fn is_casting(&self) -> bool {
        self.casting.is_some()
    }

    /// Ability currently being cast.
    #[must_use]
    pub fn casting_spell_id(&self) -> Option<SpellId> {
        self.casting.map(|cast| cast.spell)
    }

    /// Time left on the current cast (zero when idle).
    #[must_use]
    pub fn cast_remaining(&self, now: SimTime) -> SimTime {
        self.casting
            .map_or(SimTime::ZERO, |cast| cast.remaining(now))
    }

    /// Whether the unit is alive.
    #[must_use]
    pub const fn is_alive(&self) -> bool {
        !self.health.is_empty()
    }

    /// Look up an aura.
    #[must_use]
    pub fn aura(&self, id: SpellId) -> Option<&Aura> {
        self.auras.get(&id)
    }

    /// Whether an aura is present.
    #[must_use]
    pub fn has_aura(&self, id: SpellId) -> bool {
        self.auras.contains_key(&id)
    }

    /// Look up a known spell.
    #[must_use]
    pub fn spell(&self, id: SpellId) -> Option<&Spell> {
        self.spells.get(id)
    }

    /// Look up a power pool.
    #[must_use]
    pub fn power(&self, power: PowerType) -> Option<&ResourcePool> {
        self.power.get(&power)
    }
}
