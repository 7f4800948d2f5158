//! Data structures for ability definitions.
//!
//! This module contains the static, shared description of each ability and
//! the provider interface the engine uses to look them up. Definitions can be
//! deserialized from RON so that ability tables live outside the code.
//!
//! **Note:** Loading and indexing the full game tables is the embedder's job;
//! [`InMemorySpellData`] covers tests and small embeddings.

mod ability_data;
mod provider;

pub use ability_data::{AbilityDefinition, PowerCost, SpellSchool};
pub use provider::{InMemorySpellData, SpellDataProvider};
