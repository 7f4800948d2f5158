//! Test fixtures and helpers.
//!
//! Pre-built abilities, units and simulations for consistent testing.

use std::sync::Arc;

use simcast_core::components::{PowerType, Spell, SpellId, Unit, UnitId};
use simcast_core::data::{AbilityDefinition, InMemorySpellData, PowerCost};
use simcast_core::simulation::Simulation;
use simcast_core::time::SimTime;

/// The casting unit in two-unit fixtures.
pub const CASTER: UnitId = UnitId(1);

/// The target unit in two-unit fixtures.
pub const TARGET: UnitId = UnitId(2);

/// Mana given to the fixture caster.
pub const CASTER_MANA: u32 = 10_000;

/// Health given to the fixture target. Large enough to never die in tests.
pub const TARGET_HEALTH: u32 = 1_000_000;

/// Shorthand for [`SimTime::from_millis`].
#[must_use]
pub const fn ms(millis: u64) -> SimTime {
    SimTime::from_millis(millis)
}

/// An instant, free ability on the GCD.
#[must_use]
pub fn instant(id: u32, name: &str) -> AbilityDefinition {
    AbilityDefinition::new(SpellId(id), name)
}

/// An ability with a cast time.
#[must_use]
pub fn cast(id: u32, name: &str, cast_ms: u64) -> AbilityDefinition {
    let mut def = instant(id, name);
    def.cast_time = ms(cast_ms);
    def
}

/// An instant ability with its own cooldown.
#[must_use]
pub fn cooldown(id: u32, name: &str, recovery_ms: u64) -> AbilityDefinition {
    let mut def = instant(id, name);
    def.recovery_time = ms(recovery_ms);
    def
}

/// An instant ability with a charge pool.
#[must_use]
pub fn charged(id: u32, name: &str, charges: u8, recovery_ms: u64) -> AbilityDefinition {
    let mut def = instant(id, name);
    def.max_charges = charges;
    def.charge_recovery_time = ms(recovery_ms);
    def
}

/// Add a mana cost to a definition.
#[must_use]
pub fn costing(mut def: AbilityDefinition, mana: u32) -> AbilityDefinition {
    def.power_cost = Some(PowerCost {
        power: PowerType::Mana,
        amount: mana,
    });
    def
}

/// Add base damage to a definition.
#[must_use]
pub fn damaging(mut def: AbilityDefinition, amount: u32) -> AbilityDefinition {
    def.base_damage = amount;
    def
}

/// Take a definition off the GCD.
#[must_use]
pub fn off_gcd(mut def: AbilityDefinition) -> AbilityDefinition {
    def.interrupt_flags |= simcast_core::config::SimConfig::default().gcd_bypass_flag;
    def
}

/// A player caster with mana and the given abilities.
#[must_use]
pub fn caster_with(abilities: &[AbilityDefinition]) -> Unit {
    abilities.iter().fold(
        Unit::new(CASTER, "Hunter")
            .player()
            .with_power(PowerType::Mana, CASTER_MANA),
        |unit, def| unit.with_spell(Spell::new(Arc::new(def.clone()))),
    )
}

/// A passive target dummy.
#[must_use]
pub fn target_dummy() -> Unit {
    Unit::new(TARGET, "Training Dummy").with_health(TARGET_HEALTH)
}

/// A simulation with [`CASTER`] knowing `abilities` and a [`TARGET`] dummy.
///
/// # Panics
///
/// Never in practice; the two unit IDs are distinct.
#[must_use]
pub fn duel(abilities: &[AbilityDefinition]) -> Simulation {
    let sim = Simulation::new();
    sim.add_unit(caster_with(abilities))
        .expect("fixture caster is unique");
    sim.add_unit(target_dummy())
        .expect("fixture target is unique");
    sim
}

/// A small hunter ability set in the RON data format.
pub const HUNTER_ABILITIES_RON: &str = r#"[
    (id: 34026, name: "Kill Command", recovery_time: 7500, base_damage: 200, school: Physical),
    (id: 217200, name: "Barbed Shot", max_charges: 2, charge_recovery_time: 12000, base_damage: 80),
    (id: 193455, name: "Cobra Shot", power_cost: Some((power: Focus, amount: 35)), base_damage: 90),
    (id: 56641, name: "Steady Shot", cast_time: 1750, base_damage: 60),
    (id: 19574, name: "Bestial Wrath", recovery_time: 90000, interrupt_flags: 8),
]"#;

/// Parse [`HUNTER_ABILITIES_RON`].
///
/// # Panics
///
/// Panics if the embedded data is malformed.
#[must_use]
pub fn hunter_abilities() -> InMemorySpellData {
    InMemorySpellData::from_ron_str(HUNTER_ABILITIES_RON).expect("embedded hunter data parses")
}
