//! # Simcast Core
//!
//! Deterministic spell-cast combat simulation engine.
//!
//! This crate contains **only** deterministic logic:
//! - No wall clock (virtual time in milliseconds)
//! - No system randomness
//! - No unordered iteration (ordered maps everywhere)
//! - No floating-point math (integer and fixed-point)
//!
//! This separation enables:
//! - Reproducible rotation comparisons
//! - Headless batch runs
//! - Determinism testing via state hashes
//!
//! ## Crate Structure
//!
//! - [`scheduler`] - Time-ordered event queue with cancellation
//! - [`cast_queue`] - Cast validation and immediate effects
//! - [`lifecycle`] - Modifier hook pipeline and deferred actions
//! - [`event_bus`] - Combat event and snapshot fan-out
//! - [`rotation`] - Priority-list rotation runner
//! - [`state`] - Immutable snapshots and the state service
//! - [`unit_service`] - Unit, aura and periodic-effect mutations shared with hooks
//! - [`simulation`] - Core simulation loop
//! - [`data`] - Ability definitions and data providers

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all, clippy::pedantic)]

pub mod cast_queue;
pub mod components;
pub mod config;
pub mod data;
pub mod error;
pub mod event_bus;
pub mod events;
pub mod lifecycle;
pub mod math;
pub mod rotation;
pub mod scheduler;
pub mod simulation;
pub mod state;
pub mod time;
pub mod unit_service;

/// Re-export commonly used types
pub mod prelude {
    pub use crate::cast_queue::{CastAccepted, CastOutcome, CastQueue, CastRejection, CastStats};
    pub use crate::components::*;
    pub use crate::config::SimConfig;
    pub use crate::data::{
        AbilityDefinition, InMemorySpellData, PowerCost, SpellDataProvider, SpellSchool,
    };
    pub use crate::error::{Result, SimError};
    pub use crate::event_bus::{BusMessage, EventBus, Subscription};
    pub use crate::events::{CastRecord, CombatEvent, CombatEventKind, SimEvent};
    pub use crate::lifecycle::{
        HookContext, HookError, HookFuture, HookPhase, Modifier, ModifierFailure, ScheduledAction,
        SpellLifecycle,
    };
    pub use crate::math::Fixed;
    pub use crate::rotation::{ReevaluationSlot, RotationEntry, RotationRunner, RotationStep};
    pub use crate::scheduler::{EventId, EventScheduler, ScheduledEvent, SharedScheduler};
    pub use crate::simulation::{RunSummary, Simulation};
    pub use crate::state::{GameState, StateService, UnitAccessor};
    pub use crate::time::SimTime;
    pub use crate::unit_service::UnitService;
}
