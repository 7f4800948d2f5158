//! Per-ability modifier pipeline.
//!
//! Ability-specific behavior is injected as named [`Modifier`] bundles of
//! optional hooks:
//!
//! - `beforeCast` transforms the spell before validation (synchronous)
//! - `onCast` runs when the cast completes (asynchronous)
//! - `onDamage` runs after the cast's damage lands (asynchronous)
//!
//! For an ability, generic bundles run first, then bundles registered for
//! that ability, each group in registration order. A failing hook never
//! aborts the cast; it is logged and published as a
//! [`ModifierFailure`]. The exception is a fatal engine error
//! ([`SimError::is_fatal`]), which is returned to the caller and aborts the
//! run.
//!
//! Hooks, and the embedder, can also defer arbitrary work with a
//! [`ScheduledAction`]. Actions run under the same timeout and failure rules.

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::rc::Rc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::components::{Spell, SpellId, UnitId};
use crate::error::{Result as SimResult, SimError};
use crate::event_bus::EventBus;
use crate::events::{priority, CastRecord, CombatEventKind, SimEvent};
use crate::scheduler::EventId;
use crate::time::SimTime;
use crate::unit_service::UnitService;

/// Error returned by a hook.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HookError {
    /// The hook gave up.
    #[error("{0}")]
    Failed(String),

    /// An engine operation inside the hook failed.
    #[error(transparent)]
    Engine(#[from] SimError),
}

impl HookError {
    /// Convenience constructor for [`HookError::Failed`].
    pub fn failed(reason: impl Into<String>) -> Self {
        Self::Failed(reason.into())
    }
}

/// Boxed future returned by asynchronous hooks.
pub type HookFuture = Pin<Box<dyn Future<Output = Result<(), HookError>>>>;

/// `beforeCast` hook: returns the (possibly transformed) spell.
pub type BeforeCastHook = Rc<dyn Fn(&HookContext, Spell) -> Result<Spell, HookError>>;

/// `onCast` hook.
pub type OnCastHook = Rc<dyn Fn(HookContext, CastRecord) -> HookFuture>;

/// `onDamage` hook; receives the damage actually dealt.
pub type OnDamageHook = Rc<dyn Fn(HookContext, CastRecord, u32) -> HookFuture>;

/// What a hook can see and touch.
#[derive(Debug, Clone)]
pub struct HookContext {
    /// Unit accessor shared with the engine.
    pub units: UnitService,
    /// Casting unit.
    pub caster: UnitId,
    /// Cast target.
    pub target: UnitId,
}

impl HookContext {
    /// Current virtual time.
    #[must_use]
    pub fn now(&self) -> SimTime {
        self.units.now()
    }

    /// Run `action` at `at` with this context's caster and target.
    ///
    /// An action scheduled for the current time runs in the same drain,
    /// after every event already due at that time and priority.
    ///
    /// # Errors
    ///
    /// Returns [`SimError::ScheduledInPast`] if `at` is before now.
    pub fn schedule_action<F, Fut>(&self, at: SimTime, label: impl Into<String>, action: F) -> SimResult<EventId>
    where
        F: Fn(HookContext) -> Fut + 'static,
        Fut: Future<Output = Result<(), HookError>> + 'static,
    {
        let action = ScheduledAction::new(label, self.caster, self.target, action);
        self.units
            .scheduler()
            .schedule(at, priority::ACTION, SimEvent::Action(action))
    }

    /// Run `action` `delay` after now.
    ///
    /// # Errors
    ///
    /// See [`HookContext::schedule_action`].
    pub fn schedule_action_after<F, Fut>(
        &self,
        delay: SimTime,
        label: impl Into<String>,
        action: F,
    ) -> SimResult<EventId>
    where
        F: Fn(HookContext) -> Fut + 'static,
        Fut: Future<Output = Result<(), HookError>> + 'static,
    {
        self.schedule_action(self.now() + delay, label, action)
    }
}

/// Body of a [`ScheduledAction`].
pub type ActionFn = Rc<dyn Fn(HookContext) -> HookFuture>;

/// Deferred work carried by [`SimEvent::Action`].
///
/// Runs with a [`HookContext`] for the caster and target it was scheduled
/// with. Two actions are equal only if they share the same body.
#[derive(Clone)]
pub struct ScheduledAction {
    label: String,
    caster: UnitId,
    target: UnitId,
    run: ActionFn,
}

impl ScheduledAction {
    /// Wrap an async closure.
    #[must_use]
    pub fn new<F, Fut>(label: impl Into<String>, caster: UnitId, target: UnitId, action: F) -> Self
    where
        F: Fn(HookContext) -> Fut + 'static,
        Fut: Future<Output = Result<(), HookError>> + 'static,
    {
        Self {
            label: label.into(),
            caster,
            target,
            run: Rc::new(move |ctx: HookContext| -> HookFuture { Box::pin(action(ctx)) }),
        }
    }

    /// Label used in logs and failure events.
    #[must_use]
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Caster the action's context refers to.
    #[must_use]
    pub const fn caster(&self) -> UnitId {
        self.caster
    }

    /// Target the action's context refers to.
    #[must_use]
    pub const fn target(&self) -> UnitId {
        self.target
    }
}

impl fmt::Debug for ScheduledAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScheduledAction")
            .field("label", &self.label)
            .field("caster", &self.caster)
            .field("target", &self.target)
            .finish_non_exhaustive()
    }
}

impl PartialEq for ScheduledAction {
    fn eq(&self, other: &Self) -> bool {
        self.label == other.label
            && self.caster == other.caster
            && self.target == other.target
            && Rc::ptr_eq(&self.run, &other.run)
    }
}

impl Eq for ScheduledAction {}

/// Which hook a failure came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum HookPhase {
    /// `beforeCast`.
    BeforeCast,
    /// `onCast`.
    OnCast,
    /// `onDamage`.
    OnDamage,
}

impl fmt::Display for HookPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::BeforeCast => "beforeCast",
            Self::OnCast => "onCast",
            Self::OnDamage => "onDamage",
        };
        f.write_str(name)
    }
}

/// A hook that failed or timed out.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModifierFailure {
    /// Name of the modifier bundle.
    pub modifier: String,
    /// Hook that failed.
    pub phase: HookPhase,
    /// Ability being cast.
    pub spell: SpellId,
    /// What went wrong.
    pub reason: String,
}

impl fmt::Display for ModifierFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "modifier '{}' failed in {} for {}: {}",
            self.modifier, self.phase, self.spell, self.reason
        )
    }
}

/// A named bundle of optional hooks.
#[derive(Clone)]
pub struct Modifier {
    name: String,
    before_cast: Option<BeforeCastHook>,
    on_cast: Option<OnCastHook>,
    on_damage: Option<OnDamageHook>,
}

impl fmt::Debug for Modifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Modifier")
            .field("name", &self.name)
            .field("before_cast", &self.before_cast.is_some())
            .field("on_cast", &self.on_cast.is_some())
            .field("on_damage", &self.on_damage.is_some())
            .finish()
    }
}

impl Modifier {
    /// Create an empty bundle.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            before_cast: None,
            on_cast: None,
            on_damage: None,
        }
    }

    /// Bundle name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Set the `beforeCast` hook.
    #[must_use]
    pub fn before_cast<F>(mut self, hook: F) -> Self
    where
        F: Fn(&HookContext, Spell) -> Result<Spell, HookError> + 'static,
    {
        self.before_cast = Some(Rc::new(hook));
        self
    }

    /// Set the `onCast` hook.
    #[must_use]
    pub fn on_cast<F, Fut>(mut self, hook: F) -> Self
    where
        F: Fn(HookContext, CastRecord) -> Fut + 'static,
        Fut: Future<Output = Result<(), HookError>> + 'static,
    {
        self.on_cast = Some(Rc::new(move |ctx: HookContext, record: CastRecord| -> HookFuture {
            Box::pin(hook(ctx, record))
        }));
        self
    }

    /// Set the `onDamage` hook.
    #[must_use]
    pub fn on_damage<F, Fut>(mut self, hook: F) -> Self
    where
        F: Fn(HookContext, CastRecord, u32) -> Fut + 'static,
        Fut: Future<Output = Result<(), HookError>> + 'static,
    {
        self.on_damage = Some(Rc::new(
            move |ctx: HookContext, record: CastRecord, amount: u32| -> HookFuture {
                Box::pin(hook(ctx, record, amount))
            },
        ));
        self
    }
}

/// Modifier bundles by ability.
#[derive(Debug, Clone, Default)]
pub struct ModifierRegistry {
    generic: Vec<Modifier>,
    by_spell: BTreeMap<SpellId, Vec<Modifier>>,
}

impl ModifierRegistry {
    /// Register a bundle that applies to every ability.
    pub fn register_generic(&mut self, modifier: Modifier) {
        self.generic.push(modifier);
    }

    /// Register a bundle for one ability.
    pub fn register(&mut self, spell: SpellId, modifier: Modifier) {
        self.by_spell.entry(spell).or_default().push(modifier);
    }

    /// Bundles for `spell` in execution order.
    #[must_use]
    pub fn resolve(&self, spell: SpellId) -> Vec<Modifier> {
        self.generic
            .iter()
            .chain(self.by_spell.get(&spell).into_iter().flatten())
            .cloned()
            .collect()
    }

    /// Names of the bundles for `spell` in execution order.
    #[must_use]
    pub fn modifier_names(&self, spell: SpellId) -> Vec<String> {
        self.resolve(spell)
            .iter()
            .map(|modifier| modifier.name.clone())
            .collect()
    }

    /// Total number of registered bundles.
    #[must_use]
    pub fn len(&self) -> usize {
        self.generic.len() + self.by_spell.values().map(Vec::len).sum::<usize>()
    }

    /// Whether nothing is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Runs the hook pipeline and reports failures.
///
/// Cloning clones the handle; registrations are visible to every clone.
#[derive(Debug, Clone)]
pub struct SpellLifecycle {
    registry: Rc<RefCell<ModifierRegistry>>,
    bus: EventBus,
    timeout: Duration,
}

impl SpellLifecycle {
    /// Create an empty pipeline with a per-hook timeout for async hooks.
    #[must_use]
    pub fn new(bus: EventBus, timeout: Duration) -> Self {
        Self {
            registry: Rc::new(RefCell::new(ModifierRegistry::default())),
            bus,
            timeout,
        }
    }

    /// Register a bundle for every ability.
    pub fn register_generic(&self, modifier: Modifier) {
        tracing::debug!(modifier = modifier.name(), "Registered generic modifier");
        self.registry.borrow_mut().register_generic(modifier);
    }

    /// Register a bundle for one ability.
    pub fn register(&self, spell: SpellId, modifier: Modifier) {
        tracing::debug!(modifier = modifier.name(), spell = %spell, "Registered modifier");
        self.registry.borrow_mut().register(spell, modifier);
    }

    /// Names of the bundles that run for `spell`, in order.
    #[must_use]
    pub fn modifier_names(&self, spell: SpellId) -> Vec<String> {
        self.registry.borrow().modifier_names(spell)
    }

    fn resolve(&self, spell: SpellId) -> Vec<Modifier> {
        self.registry.borrow().resolve(spell)
    }

    /// Thread `spell` through every `beforeCast` hook.
    ///
    /// A failing hook leaves the spell as it was before that hook.
    ///
    /// # Errors
    ///
    /// Returns the first fatal engine error raised by a hook.
    pub fn execute_before_cast(
        &self,
        ctx: &HookContext,
        spell: Spell,
    ) -> SimResult<(Spell, Vec<ModifierFailure>)> {
        let spell_id = spell.id();
        let mut current = spell;
        let mut failures = Vec::new();

        for modifier in self.resolve(spell_id) {
            let Some(hook) = &modifier.before_cast else {
                continue;
            };

            match hook(ctx, current.clone()) {
                Ok(next) => current = next,
                Err(e) => {
                    let reason = failure_reason(e)?;
                    failures.push(self.report(&modifier, HookPhase::BeforeCast, spell_id, reason));
                }
            }
        }

        Ok((current, failures))
    }

    /// Run every `onCast` hook for a completed cast.
    ///
    /// # Errors
    ///
    /// Returns the first fatal engine error raised by a hook. Later hooks
    /// do not run.
    pub async fn execute_on_cast(
        &self,
        ctx: &HookContext,
        record: &CastRecord,
    ) -> SimResult<Vec<ModifierFailure>> {
        let spell_id = record.spell_id();
        let mut failures = Vec::new();

        for modifier in self.resolve(spell_id) {
            let Some(hook) = &modifier.on_cast else {
                continue;
            };

            let future = hook(ctx.clone(), record.clone());
            if let Some(reason) = self.await_hook(future).await? {
                failures.push(self.report(&modifier, HookPhase::OnCast, spell_id, reason));
            }
        }

        Ok(failures)
    }

    /// Run every `onDamage` hook after a cast dealt `amount` damage.
    ///
    /// # Errors
    ///
    /// Returns the first fatal engine error raised by a hook. Later hooks
    /// do not run.
    pub async fn execute_on_damage(
        &self,
        ctx: &HookContext,
        record: &CastRecord,
        amount: u32,
    ) -> SimResult<Vec<ModifierFailure>> {
        let spell_id = record.spell_id();
        let mut failures = Vec::new();

        for modifier in self.resolve(spell_id) {
            let Some(hook) = &modifier.on_damage else {
                continue;
            };

            let future = hook(ctx.clone(), record.clone(), amount);
            if let Some(reason) = self.await_hook(future).await? {
                failures.push(self.report(&modifier, HookPhase::OnDamage, spell_id, reason));
            }
        }

        Ok(failures)
    }

    /// Run a deferred action. Returns `false` if it failed or timed out.
    ///
    /// # Errors
    ///
    /// Returns a fatal engine error raised by the action.
    pub async fn execute_action(&self, units: &UnitService, action: &ScheduledAction) -> SimResult<bool> {
        let ctx = HookContext {
            units: units.clone(),
            caster: action.caster,
            target: action.target,
        };

        tracing::trace!(label = %action.label, caster = %action.caster, "Running scheduled action");

        let Some(reason) = self.await_hook((action.run)(ctx)).await? else {
            return Ok(true);
        };

        tracing::warn!(label = %action.label, reason = %reason, "Scheduled action failed");
        self.bus.emit(CombatEventKind::ActionFailed {
            label: action.label.clone(),
            reason,
        });
        Ok(false)
    }

    /// Await one hook under the timeout. Returns the failure reason, if any.
    async fn await_hook(&self, future: HookFuture) -> SimResult<Option<String>> {
        match tokio::time::timeout(self.timeout, future).await {
            Ok(Ok(())) => Ok(None),
            Ok(Err(e)) => failure_reason(e).map(Some),
            Err(_) => Ok(Some(format!("timed out after {}ms", self.timeout.as_millis()))),
        }
    }

    fn report(
        &self,
        modifier: &Modifier,
        phase: HookPhase,
        spell: SpellId,
        reason: String,
    ) -> ModifierFailure {
        let failure = ModifierFailure {
            modifier: modifier.name.clone(),
            phase,
            spell,
            reason,
        };

        tracing::warn!(
            modifier = %failure.modifier,
            phase = %failure.phase,
            spell = %failure.spell,
            reason = %failure.reason,
            "Modifier hook failed"
        );
        self.bus.emit(CombatEventKind::ModifierFailed(failure.clone()));

        failure
    }
}

/// Turn a hook error into a failure reason, passing fatal engine errors
/// through.
fn failure_reason(error: HookError) -> SimResult<String> {
    match error {
        HookError::Engine(e) if e.is_fatal() => {
            tracing::error!(error = %e, "Fatal engine error inside hook");
            Err(e)
        }
        other => Ok(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::sync::Arc;

    use crate::components::Unit;
    use crate::config::SimConfig;
    use crate::data::AbilityDefinition;
    use crate::events::SimEvent;
    use crate::scheduler::SharedScheduler;
    use crate::state::StateService;

    const SPELL: SpellId = SpellId(42);

    fn setup() -> (SpellLifecycle, HookContext, crate::event_bus::Subscription) {
        let state = StateService::default();
        let scheduler: SharedScheduler<SimEvent> = SharedScheduler::new(state.clone());
        let bus = EventBus::new(state.clone());
        let sub = bus.subscribe();
        let units = UnitService::new(state, scheduler, bus.clone(), Rc::new(SimConfig::default()));
        units.add_unit(Unit::new(UnitId(1), "Hunter")).unwrap();

        let lifecycle = SpellLifecycle::new(bus, Duration::from_millis(50));
        let ctx = HookContext {
            units,
            caster: UnitId(1),
            target: UnitId(1),
        };
        (lifecycle, ctx, sub)
    }

    fn spell() -> Spell {
        let mut def = AbilityDefinition::new(SPELL, "Aimed Shot");
        def.cast_time = SimTime::from_millis(2500);
        Spell::new(Arc::new(def))
    }

    fn record() -> CastRecord {
        CastRecord {
            caster: UnitId(1),
            target: UnitId(1),
            spell: spell(),
            started_at: SimTime::ZERO,
            completes_at: SimTime::from_millis(2500),
        }
    }

    #[test]
    fn test_generic_bundles_run_before_specific() {
        let (lifecycle, _, _) = setup();
        lifecycle.register(SPELL, Modifier::new("specific-a"));
        lifecycle.register_generic(Modifier::new("generic"));
        lifecycle.register(SPELL, Modifier::new("specific-b"));
        lifecycle.register(SpellId(7), Modifier::new("other"));

        assert_eq!(
            lifecycle.modifier_names(SPELL),
            vec!["generic", "specific-a", "specific-b"]
        );
        assert_eq!(lifecycle.modifier_names(SpellId(8)), vec!["generic"]);
    }

    #[test]
    fn test_before_cast_threads_spell_and_skips_failures() {
        let (lifecycle, ctx, mut sub) = setup();
        lifecycle.register(
            SPELL,
            Modifier::new("halve").before_cast(|_, spell| {
                let half = SimTime::from_millis(spell.info().cast_time.as_millis() / 2);
                Ok(spell.with_cast_time(half))
            }),
        );
        lifecycle.register(
            SPELL,
            Modifier::new("broken").before_cast(|_, _| Err(HookError::failed("no data"))),
        );
        lifecycle.register(
            SPELL,
            Modifier::new("halve-again").before_cast(|_, spell| {
                let half = SimTime::from_millis(spell.info().cast_time.as_millis() / 2);
                Ok(spell.with_cast_time(half))
            }),
        );

        let (result, failures) = lifecycle.execute_before_cast(&ctx, spell()).unwrap();

        assert_eq!(result.info().cast_time, SimTime::from_millis(625));
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].modifier, "broken");
        assert_eq!(failures[0].phase, HookPhase::BeforeCast);
        assert_eq!(sub.drain_events().len(), 1);
    }

    #[tokio::test]
    async fn test_on_cast_runs_in_order_and_reports_errors() {
        let (lifecycle, ctx, _) = setup();
        let log = Rc::new(RefCell::new(Vec::new()));

        let first = Rc::clone(&log);
        lifecycle.register_generic(Modifier::new("first").on_cast(move |_, _| {
            let log = Rc::clone(&first);
            async move {
                log.borrow_mut().push("first");
                Ok::<(), HookError>(())
            }
        }));
        lifecycle.register(
            SPELL,
            Modifier::new("failing").on_cast(|_, _| async { Err::<(), _>(HookError::failed("boom")) }),
        );
        let last = Rc::clone(&log);
        lifecycle.register(
            SPELL,
            Modifier::new("last").on_cast(move |_, _| {
                let log = Rc::clone(&last);
                async move {
                    log.borrow_mut().push("last");
                    Ok::<(), HookError>(())
                }
            }),
        );

        let failures = lifecycle.execute_on_cast(&ctx, &record()).await.unwrap();

        assert_eq!(*log.borrow(), vec!["first", "last"]);
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].reason, "boom");
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_hook_times_out() {
        let (lifecycle, ctx, mut sub) = setup();
        lifecycle.register(
            SPELL,
            Modifier::new("stalls").on_damage(|_, _, _| async {
                tokio::time::sleep(Duration::from_secs(60)).await;
                Ok::<(), HookError>(())
            }),
        );

        let failures = lifecycle.execute_on_damage(&ctx, &record(), 100).await.unwrap();

        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].phase, HookPhase::OnDamage);
        assert!(failures[0].reason.contains("timed out"));

        let events = sub.drain_events();
        assert!(matches!(
            events[0].kind,
            CombatEventKind::ModifierFailed(ModifierFailure {
                phase: HookPhase::OnDamage,
                ..
            })
        ));
    }

    #[tokio::test]
    async fn test_hooks_write_through_accessor() {
        let (lifecycle, ctx, _) = setup();
        lifecycle.register(
            SPELL,
            Modifier::new("rename").on_cast(|ctx: HookContext, _| async move {
                ctx.units.modify(ctx.caster, |unit| unit.name = "Renamed".to_string())?;
                Ok::<(), HookError>(())
            }),
        );

        let failures = lifecycle.execute_on_cast(&ctx, &record()).await.unwrap();

        assert!(failures.is_empty());
        let unit = crate::state::UnitAccessor::get(&ctx.units, UnitId(1)).unwrap();
        assert_eq!(unit.name, "Renamed");
    }

    #[tokio::test]
    async fn test_fatal_engine_error_stops_pipeline() {
        let (lifecycle, ctx, mut sub) = setup();
        let ran = Rc::new(RefCell::new(false));

        lifecycle.register(
            SPELL,
            Modifier::new("rewinds").on_cast(|ctx: HookContext, _| async move {
                ctx.units.scheduler().schedule(
                    SimTime::ZERO,
                    priority::MARKER,
                    SimEvent::Marker {
                        label: "late".to_string(),
                    },
                )?;
                Ok::<(), HookError>(())
            }),
        );
        let after = Rc::clone(&ran);
        lifecycle.register(
            SPELL,
            Modifier::new("after").on_cast(move |_, _| {
                let ran = Rc::clone(&after);
                async move {
                    *ran.borrow_mut() = true;
                    Ok::<(), HookError>(())
                }
            }),
        );

        ctx.units.scheduler().advance_to(SimTime::from_millis(500));
        let err = lifecycle.execute_on_cast(&ctx, &record()).await.unwrap_err();

        assert!(matches!(err, SimError::ScheduledInPast { .. }));
        assert!(!*ran.borrow());
        assert!(sub.drain_events().is_empty());
    }

    #[tokio::test]
    async fn test_non_fatal_engine_error_is_a_failure() {
        let (lifecycle, ctx, _) = setup();
        lifecycle.register(
            SPELL,
            Modifier::new("lost").on_damage(|ctx: HookContext, _, _| async move {
                ctx.units.modify(UnitId(99), |_| ())?;
                Ok::<(), HookError>(())
            }),
        );

        let failures = lifecycle.execute_on_damage(&ctx, &record(), 10).await.unwrap();

        assert_eq!(failures.len(), 1);
        assert!(failures[0].reason.contains("Unit not found"));
    }

    #[tokio::test]
    async fn test_failed_action_is_published() {
        let (lifecycle, ctx, mut sub) = setup();
        let action = ScheduledAction::new("empty-quiver", ctx.caster, ctx.target, |_| async {
            Err::<(), _>(HookError::failed("no arrows"))
        });

        assert!(!lifecycle.execute_action(&ctx.units, &action).await.unwrap());

        let events = sub.drain_events();
        assert_eq!(
            events[0].kind,
            CombatEventKind::ActionFailed {
                label: "empty-quiver".to_string(),
                reason: "no arrows".to_string(),
            }
        );
    }

    #[test]
    fn test_context_schedules_actions() {
        let (_, ctx, _) = setup();
        let id = ctx
            .schedule_action_after(SimTime::from_millis(250), "volley", |_| async {
                Ok::<(), HookError>(())
            })
            .unwrap();

        let event = ctx.units.scheduler().with(|s| s.get(id).cloned()).unwrap();
        assert_eq!(event.time, SimTime::from_millis(250));
        assert_eq!(event.priority, priority::ACTION);
        let SimEvent::Action(action) = event.payload else {
            panic!("expected an action");
        };
        assert_eq!(action.label(), "volley");
        assert_eq!(action.caster(), UnitId(1));
        assert_eq!(action, action.clone());
    }
}
