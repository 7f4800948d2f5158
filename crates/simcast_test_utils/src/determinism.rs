//! Determinism testing utilities.
//!
//! Provides a harness for verifying that the simulation
//! produces identical results given identical inputs.
//!
//! # Testing Strategy
//!
//! Rotation comparisons are only meaningful if a run is 100% reproducible.
//! Sources of non-determinism include:
//!
//! - **Wall-clock time**: The engine only reads its virtual clock.
//!
//! - **HashMap iteration order**: Rust's default hasher is randomized.
//!   Units, spells and auras live in ordered maps.
//!
//! - **Scheduler ties**: Events at the same time and priority run in the
//!   order they were scheduled.
//!
//! - **Hook timing**: Async hooks run on a single-threaded runtime and are
//!   awaited one at a time.
//!
//! # Test Levels
//!
//! 1. **Unit tests**: Individual components (scheduler ordering, validation)
//! 2. **Property tests**: Random ability sets still produce identical runs
//! 3. **Integration tests**: Full rotation scenarios are reproducible

use std::collections::hash_map::DefaultHasher;
use std::future::Future;
use std::hash::{Hash, Hasher};

use simcast_core::events::CombatEvent;
use simcast_core::simulation::{RunSummary, Simulation};
use simcast_core::state::GameState;
use simcast_core::time::SimTime;

/// Result of a determinism test.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeterminismResult {
    /// Whether all runs produced identical results.
    pub is_deterministic: bool,
    /// Hashes from each run.
    pub hashes: Vec<u64>,
    /// Virtual time each run stopped at.
    pub end_time: SimTime,
}

impl DeterminismResult {
    /// Get all unique hashes (should be 1 for deterministic simulation).
    #[must_use]
    pub fn unique_hashes(&self) -> Vec<u64> {
        let mut unique: Vec<u64> = self.hashes.clone();
        unique.sort_unstable();
        unique.dedup();
        unique
    }

    /// Assert that the simulation was deterministic, with a detailed error message.
    ///
    /// # Panics
    ///
    /// Panics if the simulation produced different hashes across runs.
    pub fn assert_deterministic(&self) {
        if !self.is_deterministic {
            let unique = self.unique_hashes();
            panic!(
                "Simulation is non-deterministic!\n\
                 Runs: {}\n\
                 End time: {}\n\
                 Unique hashes: {} (expected 1)\n\
                 All hashes: {:?}",
                self.hashes.len(),
                self.end_time,
                unique.len(),
                self.hashes
            );
        }
    }
}

/// Everything observable about one run.
#[derive(Debug, Clone)]
pub struct RunTrace {
    /// Combat events in publication order.
    pub events: Vec<CombatEvent>,
    /// Final state hash.
    pub hash: u64,
    /// Run totals.
    pub summary: RunSummary,
}

/// Drive a future to completion on a fresh single-threaded runtime.
///
/// # Panics
///
/// Panics if the runtime cannot be built.
pub fn block_on<F: Future>(future: F) -> F::Output {
    tokio::runtime::Builder::new_current_thread()
        .enable_time()
        .build()
        .expect("current-thread runtime builds")
        .block_on(future)
}

/// Run a fresh simulation to `until` and record its trace.
///
/// # Panics
///
/// Panics if the run fails.
pub fn record_run<F>(setup_fn: F, until: SimTime) -> RunTrace
where
    F: FnOnce() -> Simulation,
{
    block_on(async move {
        let mut sim = setup_fn();
        let mut subscription = sim.subscribe();
        let summary = sim.run_until(until).await.expect("simulation run succeeds");

        RunTrace {
            events: subscription.drain_events(),
            hash: sim.state_hash(),
            summary,
        }
    })
}

/// Run a simulation several times and verify the final hash never changes.
///
/// # Example
///
/// ```ignore
/// use simcast_test_utils::determinism::verify_determinism;
/// use simcast_test_utils::fixtures::{duel, instant};
///
/// let result = verify_determinism(5, SimTime::from_secs(60), || {
///     duel(&[instant(1, "Arcane Shot")])
/// });
/// result.assert_deterministic();
/// ```
pub fn verify_determinism<F>(runs: usize, until: SimTime, setup_fn: F) -> DeterminismResult
where
    F: Fn() -> Simulation,
{
    let hashes: Vec<u64> = (0..runs)
        .map(|_| record_run(&setup_fn, until).hash)
        .collect();

    let is_deterministic = hashes.windows(2).all(|w| w[0] == w[1]);

    DeterminismResult {
        is_deterministic,
        hashes,
        end_time: until,
    }
}

/// Render an event stream as JSON lines, one event per line.
///
/// # Panics
///
/// Panics if an event fails to serialize.
#[must_use]
pub fn to_json_lines(events: &[CombatEvent]) -> String {
    events
        .iter()
        .map(|event| serde_json::to_string(event).expect("combat events serialize"))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Run twice and compare both the final hash and the recorded event stream.
///
/// Returns `true` if both runs are identical.
pub fn verify_simulation_determinism<F>(setup_fn: F, until: SimTime) -> bool
where
    F: Fn() -> Simulation,
{
    let first = record_run(&setup_fn, until);
    let second = record_run(&setup_fn, until);

    if first.hash != second.hash {
        return false;
    }

    to_json_lines(&first.events) == to_json_lines(&second.events)
}

/// Step two simulations event by event, finding the first divergence.
///
/// # Returns
///
/// `None` if both runs stay identical for `max_events` events, or
/// `Some(n)` if they differ after the `n`th event (`0` means the initial
/// states already differ).
///
/// # Panics
///
/// Panics if a step fails.
pub fn find_first_divergence<F>(setup_fn: F, max_events: u64) -> Option<u64>
where
    F: Fn() -> Simulation,
{
    block_on(async move {
        let mut sim1 = setup_fn();
        let mut sim2 = setup_fn();

        if sim1.state_hash() != sim2.state_hash() {
            return Some(0);
        }

        for step in 1..=max_events {
            let t1 = sim1.step().await.expect("step succeeds");
            let t2 = sim2.step().await.expect("step succeeds");

            if t1 != t2 || sim1.state_hash() != sim2.state_hash() {
                return Some(step);
            }
            if t1.is_none() {
                break;
            }
        }

        None
    })
}

/// Verify that a JSON round-trip of a snapshot preserves its hash exactly.
pub fn verify_snapshot_roundtrip(state: &GameState) -> bool {
    let Ok(json) = serde_json::to_string(state) else {
        return false;
    };
    let Ok(restored) = serde_json::from_str::<GameState>(&json) else {
        return false;
    };

    restored.state_hash() == state.state_hash()
}

/// Compute a simple hash for any hashable value.
pub fn compute_hash<T: Hash>(value: &T) -> u64 {
    let mut hasher = DefaultHasher::new();
    value.hash(&mut hasher);
    hasher.finish()
}

/// Proptest strategies for determinism testing.
///
/// These strategies generate random but reproducible inputs for
/// property-based testing of the engine.
pub mod strategies {
    use proptest::prelude::*;
    use simcast_core::components::SpellId;
    use simcast_core::data::AbilityDefinition;
    use simcast_core::time::SimTime;

    /// Generate a cast time in 100ms steps (0 to 3s, half of them instant).
    pub fn arb_cast_time() -> impl Strategy<Value = SimTime> {
        prop_oneof![
            Just(SimTime::ZERO),
            (1u64..=30).prop_map(|steps| SimTime::from_millis(steps * 100)),
        ]
    }

    /// Generate a cooldown (0 to 30s).
    pub fn arb_recovery_time() -> impl Strategy<Value = SimTime> {
        prop_oneof![
            Just(SimTime::ZERO),
            (1u64..=300).prop_map(|steps| SimTime::from_millis(steps * 100)),
        ]
    }

    /// Generate a charge pool: size and per-charge recovery.
    pub fn arb_charges() -> impl Strategy<Value = (u8, SimTime)> {
        prop_oneof![
            Just((0u8, SimTime::ZERO)),
            (1u8..=3, 10u64..=200)
                .prop_map(|(charges, steps)| (charges, SimTime::from_millis(steps * 100))),
        ]
    }

    /// Generate an ability with the given ID.
    ///
    /// Off-GCD abilities always have a cast time, a cooldown or charges.
    pub fn arb_ability(id: u32) -> impl Strategy<Value = AbilityDefinition> {
        (
            arb_cast_time(),
            arb_recovery_time(),
            arb_charges(),
            any::<bool>(),
            0u32..500,
        )
            .prop_map(move |(cast_time, recovery_time, charges, off_gcd, damage)| {
                let mut def = AbilityDefinition::new(SpellId(id), format!("Ability {id}"));
                def.cast_time = cast_time;
                def.recovery_time = recovery_time;
                (def.max_charges, def.charge_recovery_time) = charges;
                // An instant, free-running ability off the GCD would recast forever at one instant.
                let self_limiting = !def.cast_time.is_zero()
                    || !def.recovery_time.is_zero()
                    || def.max_charges > 0;
                def.interrupt_flags = if off_gcd && self_limiting { 0x08 } else { 0 };
                def.base_damage = damage;
                def
            })
    }

    /// Generate a set of abilities with IDs `1..=len`.
    pub fn arb_ability_set(max_len: u32) -> impl Strategy<Value = Vec<AbilityDefinition>> {
        (1..=max_len).prop_flat_map(|len| (1..=len).map(arb_ability).collect::<Vec<_>>())
    }

    /// Generate `(time_ms, priority)` pairs for scheduler tests.
    pub fn arb_schedule(max_len: usize) -> impl Strategy<Value = Vec<(u64, u8)>> {
        proptest::collection::vec((0u64..10_000, 0u8..=100), 0..max_len)
    }
}
