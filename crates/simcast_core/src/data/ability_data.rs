//! Ability data structures for data-driven spell definitions.

use serde::{Deserialize, Serialize};

use crate::components::{PowerType, SpellId};
use crate::time::SimTime;

/// Magic school of an ability.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum SpellSchool {
    /// Weapon and melee damage.
    #[default]
    Physical,
    /// Holy magic.
    Holy,
    /// Fire magic.
    Fire,
    /// Nature magic.
    Nature,
    /// Frost magic.
    Frost,
    /// Shadow magic.
    Shadow,
    /// Arcane magic.
    Arcane,
}

/// Resource cost paid when a cast is accepted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PowerCost {
    /// Which pool pays.
    pub power: PowerType,
    /// Amount deducted.
    pub amount: u32,
}

/// Static definition of an ability.
///
/// Shared by reference between every [`Spell`](crate::components::Spell)
/// created from it.
///
/// # Example RON
///
/// ```ron
/// AbilityDefinition(
///     id: 217200,
///     name: "Barbed Shot",
///     max_charges: 2,
///     charge_recovery_time: 12000,
///     interrupt_flags: 8,
///     school: Physical,
///     base_damage: 120,
/// )
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AbilityDefinition {
    /// Unique ability ID.
    pub id: SpellId,

    /// Display name.
    pub name: String,

    /// Time from cast start to completion. Zero means instant.
    #[serde(default)]
    pub cast_time: SimTime,

    /// The ability's own cooldown. Zero means none.
    #[serde(default)]
    pub recovery_time: SimTime,

    /// Size of the charge pool. Zero means the ability has no charges.
    #[serde(default)]
    pub max_charges: u8,

    /// Time to restore one charge.
    #[serde(default)]
    pub charge_recovery_time: SimTime,

    /// Interrupt flag bits. See [`AbilityDefinition::triggers_gcd`].
    #[serde(default)]
    pub interrupt_flags: u32,

    /// Magic school.
    #[serde(default)]
    pub school: SpellSchool,

    /// Resource cost, if any.
    #[serde(default)]
    pub power_cost: Option<PowerCost>,

    /// Damage dealt to the target on completion. Zero means none.
    #[serde(default)]
    pub base_damage: u32,
}

impl AbilityDefinition {
    /// Create an instant, free, cooldown-free definition.
    #[must_use]
    pub fn new(id: SpellId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            cast_time: SimTime::ZERO,
            recovery_time: SimTime::ZERO,
            max_charges: 0,
            charge_recovery_time: SimTime::ZERO,
            interrupt_flags: 0,
            school: SpellSchool::default(),
            power_cost: None,
            base_damage: 0,
        }
    }

    /// Whether casting this ability starts the global cooldown.
    ///
    /// Abilities with `bypass_flag` set in their interrupt flags are off the
    /// GCD.
    #[must_use]
    pub const fn triggers_gcd(&self, bypass_flag: u32) -> bool {
        self.interrupt_flags & bypass_flag == 0
    }

    /// Whether the ability completes in the same instant it starts.
    #[must_use]
    pub const fn is_instant(&self) -> bool {
        self.cast_time.is_zero()
    }
}
