//! Error types for the combat simulation.

use thiserror::Error;

use crate::components::{SpellId, UnitId};
use crate::time::SimTime;

/// Result type alias using [`SimError`].
pub type Result<T> = std::result::Result<T, SimError>;

/// Top-level error type for all simulation errors.
///
/// Cast validation failures are not errors; they are reported as
/// [`CastRejection`](crate::cast_queue::CastRejection) values.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SimError {
    /// No unit with the given ID exists.
    #[error("Unit not found: {0}")]
    UnitNotFound(UnitId),

    /// The unit does not know the requested spell.
    #[error("Unit {unit} does not know spell {spell}")]
    SpellNotFound {
        /// Unit that was asked.
        unit: UnitId,
        /// Requested spell.
        spell: SpellId,
    },

    /// The data provider has no definition for the ability.
    #[error("Ability definition not found: {0}")]
    AbilityNotFound(SpellId),

    /// An event was scheduled before the current clock.
    #[error("Cannot schedule event at {requested}: current time is {now}")]
    ScheduledInPast {
        /// Current simulation time.
        now: SimTime,
        /// Requested execution time.
        requested: SimTime,
    },

    /// Configuration could not be loaded or parsed.
    #[error("Invalid configuration: {message}")]
    Config {
        /// Error message.
        message: String,
    },

    /// Invalid simulation state.
    #[error("Invalid simulation state: {0}")]
    InvalidState(String),
}

impl SimError {
    /// Whether the error aborts the run even when raised inside a hook or
    /// scheduled action.
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        matches!(self, Self::ScheduledInPast { .. })
    }
}
