//! End-to-end combat scenarios.
//!
//! Each test builds a small duel with the shared fixtures, drives the
//! simulation and checks the resulting state and event stream.

use std::sync::Arc;
use std::time::Duration;

use simcast_core::prelude::*;
use simcast_test_utils::determinism::{record_run, verify_simulation_determinism};
use simcast_test_utils::fixtures::{
    cast, caster_with, charged, cooldown, costing, damaging, duel, hunter_abilities, instant, ms,
    off_gcd, target_dummy, CASTER, TARGET,
};
use simcast_test_utils::logging::init_test_tracing;

fn kinds(events: &[CombatEvent]) -> Vec<&CombatEventKind> {
    events.iter().map(|event| &event.kind).collect()
}

fn success_times(events: &[CombatEvent], spell: SpellId) -> Vec<SimTime> {
    events
        .iter()
        .filter(|event| {
            matches!(event.kind, CombatEventKind::SpellCastSuccess { spell: s, .. } if s == spell)
        })
        .map(|event| event.time)
        .collect()
}

fn rejection(outcome: &CastOutcome) -> CastRejection {
    outcome.rejection().cloned().expect("cast should be rejected")
}

// ============================================================================
// Cast validation
// ============================================================================

#[test]
fn test_gcd_blocks_second_instant_cast() {
    init_test_tracing();
    let sim = duel(&[instant(1, "Arcane Shot")]);

    let first = sim.enqueue(CASTER, SpellId(1), TARGET).unwrap();
    assert!(first.is_accepted());
    assert_eq!(first.accepted().unwrap().gcd_expiry, ms(1500));

    let caster = sim.state().unit(CASTER).unwrap().clone();
    assert_eq!(caster.spells.category_expiry(sim.config().gcd_category), ms(1500));
    assert!(!caster.is_casting());

    let second = sim.enqueue(CASTER, SpellId(1), TARGET).unwrap();
    assert_eq!(
        rejection(&second),
        CastRejection::GcdActive {
            gcd_ends_at: ms(1500)
        }
    );
}

#[test]
fn test_charges_deplete_without_gcd() {
    let sim = duel(&[off_gcd(charged(1, "Barbed Shot", 2, 1000))]);

    assert!(sim.enqueue(CASTER, SpellId(1), TARGET).unwrap().is_accepted());
    assert!(sim.enqueue(CASTER, SpellId(1), TARGET).unwrap().is_accepted());

    let spell = sim.state().unit(CASTER).unwrap().spell(SpellId(1)).unwrap().clone();
    assert_eq!(spell.charges(), 0);
    assert_eq!(spell.next_charge_at(), Some(ms(1000)));

    let third = sim.enqueue(CASTER, SpellId(1), TARGET).unwrap();
    assert_eq!(
        rejection(&third),
        CastRejection::NoChargesAvailable {
            next_charge_at: Some(ms(1000))
        }
    );
}

#[tokio::test]
async fn test_casting_unit_rejects_without_mutation() {
    let mut sim = duel(&[cast(1, "Steady Shot", 3000), instant(2, "Arcane Shot")]);

    assert!(sim.enqueue(CASTER, SpellId(1), TARGET).unwrap().is_accepted());
    sim.run_until(ms(2000)).await.unwrap();

    let before = sim.state();
    let outcome = sim.enqueue(CASTER, SpellId(2), TARGET).unwrap();
    let after = sim.state();

    assert_eq!(
        rejection(&outcome),
        CastRejection::PlayerIsCasting {
            casting_spell: SpellId(1),
            cast_ends_at: ms(3000)
        }
    );
    assert!(Arc::ptr_eq(&before, &after));
}

#[tokio::test]
async fn test_cooldown_and_power_rejections() {
    let mut sim = duel(&[
        cooldown(1, "Kill Command", 7500),
        costing(instant(2, "Multi-Shot"), 6000),
    ]);
    let mut sub = sim.subscribe();

    assert!(sim.enqueue(CASTER, SpellId(1), TARGET).unwrap().is_accepted());
    sim.run_until(ms(1500)).await.unwrap();

    let on_cooldown = sim.enqueue(CASTER, SpellId(1), TARGET).unwrap();
    assert_eq!(
        rejection(&on_cooldown),
        CastRejection::SpellOnCooldown {
            remaining: ms(6000)
        }
    );

    assert!(sim.enqueue(CASTER, SpellId(2), TARGET).unwrap().is_accepted());
    sim.run_until(ms(3000)).await.unwrap();

    let broke = sim.enqueue(CASTER, SpellId(2), TARGET).unwrap();
    assert_eq!(
        rejection(&broke),
        CastRejection::InsufficientPower {
            power: PowerType::Mana,
            required: 6000,
            available: 4000
        }
    );

    let failures = sub
        .drain_events()
        .into_iter()
        .filter(|event| matches!(event.kind, CombatEventKind::SpellCastFailed { .. }))
        .count();
    assert_eq!(failures, 2);

    sim.run_until(ms(7500)).await.unwrap();
    assert!(sim.enqueue(CASTER, SpellId(1), TARGET).unwrap().is_accepted());
}

// ============================================================================
// Modifier pipeline
// ============================================================================

const PRESENCE: SpellId = SpellId(99);

fn instant_cast_while_presence() -> Modifier {
    Modifier::new("presence-instant").before_cast(|ctx, mut spell| {
        let caster = ctx.units.get(ctx.caster)?;
        if caster.has_aura(PRESENCE) {
            spell.info_mut().cast_time = SimTime::ZERO;
        }
        Ok(spell)
    })
}

#[test]
fn test_before_cast_removes_cast_time_with_aura() {
    let with_aura = duel(&[cast(1, "Aimed Shot", 2500)]);
    with_aura.register_modifier(SpellId(1), instant_cast_while_presence());
    with_aura
        .units()
        .apply_aura(
            CASTER,
            Aura::new(
                Arc::new(instant(PRESENCE.0, "Trueshot Presence")),
                CASTER,
                SimTime::ZERO,
                ms(15_000),
            ),
        )
        .unwrap();

    let outcome = with_aura.enqueue(CASTER, SpellId(1), TARGET).unwrap();
    let accepted = outcome.accepted().unwrap();
    assert_eq!(accepted.complete_at, accepted.started_at);
    assert!(!with_aura.state().unit(CASTER).unwrap().is_casting());

    // The caster's own definition is untouched.
    let own = with_aura.state().unit(CASTER).unwrap().spell(SpellId(1)).unwrap().clone();
    assert_eq!(own.info().cast_time, ms(2500));

    let without_aura = duel(&[cast(1, "Aimed Shot", 2500)]);
    without_aura.register_modifier(SpellId(1), instant_cast_while_presence());

    let outcome = without_aura.enqueue(CASTER, SpellId(1), TARGET).unwrap();
    assert_eq!(outcome.accepted().unwrap().complete_at, ms(2500));
}

#[tokio::test(start_paused = true)]
async fn test_slow_on_cast_hook_times_out_and_cast_completes() {
    let mut sim = duel(&[damaging(instant(1, "Arcane Shot"), 100)]);
    sim.register_modifier(
        SpellId(1),
        Modifier::new("slow").on_cast(|_ctx, _record| async {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok::<(), HookError>(())
        }),
    );
    let mut sub = sim.subscribe();

    sim.enqueue(CASTER, SpellId(1), TARGET).unwrap();
    sim.run_until(ms(10)).await.unwrap();

    let events = sub.drain_events();
    let failure = events
        .iter()
        .find_map(|event| match &event.kind {
            CombatEventKind::ModifierFailed(failure) => Some(failure.clone()),
            _ => None,
        })
        .expect("timeout reported");
    assert_eq!(failure.modifier, "slow");
    assert_eq!(failure.phase, HookPhase::OnCast);
    assert!(failure.reason.contains("timed out"));

    assert!(kinds(&events)
        .iter()
        .any(|kind| matches!(kind, CombatEventKind::SpellDamage { amount: 100, .. })));
}

#[tokio::test]
async fn test_on_damage_hook_applies_aura() {
    let mut sim = duel(&[damaging(instant(1, "Serpent Sting"), 50)]);
    let sting = Arc::new(instant(77, "Serpent Sting DoT"));

    sim.register_modifier(
        SpellId(1),
        Modifier::new("sting-dot").on_damage(move |ctx, record, _amount| {
            let sting = Arc::clone(&sting);
            async move {
                let now = ctx.now();
                ctx.units
                    .apply_aura(record.target, Aura::new(sting, record.caster, now, ms(12_000)))?;
                Ok::<(), HookError>(())
            }
        }),
    );

    sim.enqueue(CASTER, SpellId(1), TARGET).unwrap();
    sim.run_until(ms(100)).await.unwrap();
    assert!(sim.state().unit(TARGET).unwrap().has_aura(SpellId(77)));

    sim.run_until(ms(12_000)).await.unwrap();
    assert!(!sim.state().unit(TARGET).unwrap().has_aura(SpellId(77)));
}

#[tokio::test]
async fn test_hook_scheduling_into_past_aborts_run() {
    init_test_tracing();
    let mut sim = duel(&[cast(1, "Aimed Shot", 500)]);
    let mark = Arc::new(instant(88, "Hunter's Mark"));

    sim.register_modifier(
        SpellId(1),
        Modifier::new("stale-mark").on_cast(move |ctx, record| {
            let mark = Arc::clone(&mark);
            async move {
                // Expires at 100ms while the clock is at 500ms.
                ctx.units
                    .apply_aura(record.target, Aura::new(mark, record.caster, SimTime::ZERO, ms(100)))?;
                Ok::<(), HookError>(())
            }
        }),
    );
    let mut sub = sim.subscribe();

    sim.enqueue(CASTER, SpellId(1), TARGET).unwrap();
    let err = sim.run_until(ms(60_000)).await.unwrap_err();

    assert_eq!(
        err,
        SimError::ScheduledInPast {
            now: ms(500),
            requested: ms(100)
        }
    );
    assert_eq!(sim.now(), ms(500));
    assert!(!sim.state().unit(TARGET).unwrap().has_aura(SpellId(88)));
    assert!(!kinds(&sub.drain_events())
        .iter()
        .any(|kind| matches!(kind, CombatEventKind::ModifierFailed(_))));
}

#[tokio::test]
async fn test_on_damage_hook_applies_dot() {
    let mut sim = duel(&[damaging(instant(1, "Serpent Sting"), 50)]);
    let sting = Arc::new(instant(77, "Serpent Sting DoT"));

    sim.register_modifier(
        SpellId(1),
        Modifier::new("sting-dot").on_damage(move |ctx, record, _amount| {
            let sting = Arc::clone(&sting);
            async move {
                let dot = Aura::new(sting, record.caster, ctx.now(), ms(9000))
                    .with_periodic(AuraPeriodic::damage(ms(3000), 40));
                ctx.units.apply_aura(record.target, dot)?;
                Ok::<(), HookError>(())
            }
        }),
    );
    let mut sub = sim.subscribe();

    sim.enqueue(CASTER, SpellId(1), TARGET).unwrap();
    sim.run_until(ms(20_000)).await.unwrap();

    let ticks: Vec<_> = sub
        .drain_events()
        .into_iter()
        .filter(|event| matches!(event.kind, CombatEventKind::PeriodicDamage { amount: 40, .. }))
        .map(|event| event.time)
        .collect();
    assert_eq!(ticks, vec![ms(3000), ms(6000), ms(9000)]);
    assert_eq!(
        sim.state().unit(TARGET).unwrap().health.current(),
        1_000_000 - 50 - 3 * 40
    );
}

// ============================================================================
// Rotation
// ============================================================================

#[tokio::test]
async fn test_reevaluation_waits_for_cast_completion() {
    let config = SimConfig {
        gcd: ms(50),
        ..SimConfig::default()
    };
    let mut sim = Simulation::with_config(config).unwrap();
    sim.add_unit(caster_with(&[cast(1, "Chain Lightning", 100)])).unwrap();
    sim.add_unit(target_dummy()).unwrap();

    sim.set_rotation(RotationRunner::new(CASTER, TARGET).with(SpellId(1)))
        .unwrap();
    sim.run_until(SimTime::ZERO).await.unwrap();

    let pending: Vec<_> = sim
        .scheduler()
        .pending()
        .into_iter()
        .filter(|event| event.payload == SimEvent::Reevaluate)
        .map(|event| event.time)
        .collect();
    assert_eq!(pending, vec![ms(100)]);
}

#[tokio::test]
async fn test_bystander_cast_leaves_rotation_reevaluation() {
    let mut sim = duel(&[cast(1, "Aimed Shot", 3000)]);
    sim.add_unit(Unit::new(UnitId(3), "Pet").with_spell(Spell::new(Arc::new(instant(2, "Claw")))))
        .unwrap();
    let mut sub = sim.subscribe();

    sim.set_rotation(RotationRunner::new(CASTER, TARGET).with(SpellId(1)))
        .unwrap();
    sim.run_until(SimTime::ZERO).await.unwrap();
    assert_eq!(sim.cast_queue().reevaluation_at(), Some(ms(3000)));

    let pet = sim.enqueue(UnitId(3), SpellId(2), TARGET).unwrap();
    assert_eq!(pet.accepted().unwrap().reevaluate_at, None);
    assert_eq!(sim.cast_queue().reevaluation_at(), Some(ms(3000)));

    let summary = sim.run_until(ms(2999)).await.unwrap();
    assert_eq!(summary.casts_rejected, 0);
    assert!(!kinds(&sub.drain_events())
        .iter()
        .any(|kind| matches!(kind, CombatEventKind::SpellCastFailed { .. })));
}

#[tokio::test]
async fn test_restored_charge_is_castable_at_same_timestamp() {
    let mut sim = duel(&[charged(1, "Barbed Shot", 1, 3000)]);
    let mut sub = sim.subscribe();

    sim.set_rotation(RotationRunner::new(CASTER, TARGET).with(SpellId(1)))
        .unwrap();
    sim.run_until(ms(3500)).await.unwrap();

    assert_eq!(success_times(&sub.drain_events(), SpellId(1)), vec![ms(0), ms(3000)]);
}

#[tokio::test]
async fn test_rotation_prefers_higher_priority_candidates() {
    let mut sim = duel(&[
        damaging(cooldown(1, "Kill Command", 6000), 200),
        damaging(instant(2, "Cobra Shot"), 50),
    ]);
    let mut sub = sim.subscribe();

    sim.set_rotation(
        RotationRunner::new(CASTER, TARGET)
            .with(SpellId(1))
            .with(SpellId(2)),
    )
    .unwrap();
    let summary = sim.run_until(ms(7000)).await.unwrap();

    let events = sub.drain_events();
    assert_eq!(success_times(&events, SpellId(1)), vec![ms(0), ms(6000)]);
    assert_eq!(
        success_times(&events, SpellId(2)),
        vec![ms(1500), ms(3000), ms(4500)]
    );
    assert_eq!(summary.casts_accepted, 5);

    let health = sim.state().unit(TARGET).unwrap().health.current();
    assert_eq!(health, 1_000_000 - 2 * 200 - 3 * 50);
}

#[tokio::test]
async fn test_conditional_candidate_is_skipped() {
    let mut sim = duel(&[instant(1, "Execute"), instant(2, "Auto Shot")]);
    let mut sub = sim.subscribe();

    sim.set_rotation(
        RotationRunner::new(CASTER, TARGET)
            .with(RotationEntry::new(SpellId(1)).when(|caster, _| caster.health.current() < 20))
            .with(SpellId(2)),
    )
    .unwrap();
    sim.run_until(ms(1000)).await.unwrap();

    let events = sub.drain_events();
    assert!(success_times(&events, SpellId(1)).is_empty());
    assert_eq!(success_times(&events, SpellId(2)), vec![ms(0)]);
}

#[tokio::test]
async fn test_cleared_rotation_stops_casting() {
    let mut sim = duel(&[instant(1, "Arcane Shot")]);

    sim.set_rotation(RotationRunner::new(CASTER, TARGET).with(SpellId(1)))
        .unwrap();
    sim.run_until(ms(1000)).await.unwrap();
    assert!(sim.clear_rotation().is_some());

    let summary = sim.run_until(ms(10_000)).await.unwrap();
    assert_eq!(summary.casts_accepted, 0);
}

// ============================================================================
// Auras, markers and determinism
// ============================================================================

#[tokio::test]
async fn test_refreshed_aura_ignores_stale_expiry() {
    let mut sim = duel(&[]);
    let mut sub = sim.subscribe();
    let info = Arc::new(instant(50, "Frenzy"));

    sim.units()
        .apply_aura(
            CASTER,
            Aura::new(Arc::clone(&info), CASTER, SimTime::ZERO, ms(5000)).with_max_stacks(3),
        )
        .unwrap();
    sim.run_until(ms(3000)).await.unwrap();
    let refreshed = sim
        .units()
        .apply_aura(
            CASTER,
            Aura::new(Arc::clone(&info), CASTER, ms(3000), ms(5000)).with_max_stacks(3),
        )
        .unwrap();
    assert_eq!(refreshed.stacks, 2);
    assert_eq!(refreshed.expires_at, ms(8000));

    sim.run_until(ms(6000)).await.unwrap();
    assert!(sim.state().unit(CASTER).unwrap().has_aura(SpellId(50)));

    sim.run_until(ms(8000)).await.unwrap();
    assert!(!sim.state().unit(CASTER).unwrap().has_aura(SpellId(50)));

    let removed: Vec<_> = sub
        .drain_events()
        .into_iter()
        .filter(|event| matches!(event.kind, CombatEventKind::AuraRemoved { expired: true, .. }))
        .map(|event| event.time)
        .collect();
    assert_eq!(removed, vec![ms(8000)]);
}

#[tokio::test]
async fn test_refreshed_dot_drops_stale_ticks() {
    let mut sim = duel(&[]);
    let mut sub = sim.subscribe();
    let info = Arc::new(instant(60, "Black Arrow"));
    let dot = |now| {
        Aura::new(Arc::clone(&info), CASTER, now, ms(4000))
            .with_periodic(AuraPeriodic::damage(ms(2000), 100))
    };

    sim.units().apply_aura(TARGET, dot(SimTime::ZERO)).unwrap();
    sim.run_until(ms(1000)).await.unwrap();
    sim.units().apply_aura(TARGET, dot(ms(1000))).unwrap();
    sim.run_until(ms(10_000)).await.unwrap();

    // The first application's tick at 2000 is stale.
    let ticks: Vec<_> = sub
        .drain_events()
        .into_iter()
        .filter(|event| matches!(event.kind, CombatEventKind::PeriodicDamage { .. }))
        .map(|event| event.time)
        .collect();
    assert_eq!(ticks, vec![ms(3000), ms(5000)]);
}

#[tokio::test]
async fn test_deferred_action_chains_follow_up() {
    let mut sim = duel(&[damaging(instant(1, "Explosive Shot"), 0)]);
    let mut sub = sim.subscribe();

    sim.schedule_action(ms(500), CASTER, TARGET, "explosive-trap", |ctx: HookContext| async move {
        ctx.schedule_action_after(ms(250), "detonate", |ctx: HookContext| async move {
            let spell = ctx.units.get(ctx.caster)?.spell(SpellId(1)).cloned();
            if let Some(spell) = spell {
                ctx.units.damage(ctx.caster, ctx.target, &spell, 300)?;
            }
            Ok::<(), HookError>(())
        })?;
        Ok::<(), HookError>(())
    })
    .unwrap();

    let summary = sim.run_until(ms(1000)).await.unwrap();

    assert_eq!(summary.events_executed, 2);
    let damage: Vec<_> = sub
        .drain_events()
        .into_iter()
        .filter(|event| matches!(event.kind, CombatEventKind::SpellDamage { amount: 300, .. }))
        .map(|event| event.time)
        .collect();
    assert_eq!(damage, vec![ms(750)]);
}

#[tokio::test]
async fn test_cancelled_marker_never_published() {
    let mut sim = duel(&[]);
    let mut sub = sim.subscribe();

    let kept = sim.schedule_marker(ms(100), "kept").unwrap();
    let dropped = sim.schedule_marker(ms(100), "dropped").unwrap();
    assert!(sim.cancel(dropped));

    sim.run_until(ms(200)).await.unwrap();
    assert!(!sim.cancel(kept));

    let labels: Vec<_> = sub
        .drain_events()
        .into_iter()
        .filter_map(|event| match event.kind {
            CombatEventKind::Marker { label } => Some(label),
            _ => None,
        })
        .collect();
    assert_eq!(labels, vec!["kept".to_string()]);
}

#[tokio::test]
async fn test_spells_from_ron_data() {
    let data = hunter_abilities();
    let mut sim = Simulation::new();
    sim.add_unit(
        Unit::new(CASTER, "Hunter")
            .player()
            .with_power(PowerType::Focus, 100)
            .with_spells_from(&data, &[SpellId(34026), SpellId(193_455)])
            .unwrap(),
    )
    .unwrap();
    sim.add_unit(target_dummy()).unwrap();

    sim.set_rotation(
        RotationRunner::new(CASTER, TARGET)
            .with(SpellId(34026))
            .with(SpellId(193_455)),
    )
    .unwrap();
    sim.run_until(ms(4000)).await.unwrap();

    // Kill Command, then Cobra Shot twice for 70 focus.
    let focus = sim.state().unit(CASTER).unwrap().power(PowerType::Focus).unwrap().current();
    assert_eq!(focus, 30);
}

fn marksman_duel() -> Simulation {
    let mut sim = duel(&[
        damaging(cooldown(1, "Rapid Fire", 20_000), 300),
        damaging(off_gcd(charged(2, "Barbed Shot", 2, 12_000)), 80),
        damaging(cast(3, "Aimed Shot", 2500), 250),
        damaging(instant(4, "Arcane Shot"), 60),
    ]);
    sim.set_rotation(
        RotationRunner::new(CASTER, TARGET)
            .with(SpellId(1))
            .with(SpellId(2))
            .with(SpellId(3))
            .with(SpellId(4)),
    )
    .unwrap();
    sim.enable_power_regen().unwrap();
    sim
}

#[test]
fn test_same_scenario_twice_is_identical() {
    assert!(verify_simulation_determinism(marksman_duel, ms(120_000)));

    let trace = record_run(marksman_duel, ms(60_000));
    assert!(trace.summary.casts_accepted > 20);
    assert!(trace
        .events
        .windows(2)
        .all(|pair| pair[0].time <= pair[1].time));
}
