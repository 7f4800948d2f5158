//! Ability definition lookup.

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::components::SpellId;
use crate::error::{Result, SimError};

use super::AbilityDefinition;

/// Source of ability definitions.
///
/// The engine only ever asks for one definition at a time, by ID. Returned
/// definitions are shared: every [`Spell`](crate::components::Spell) built
/// from the same ID points at the same allocation.
pub trait SpellDataProvider {
    /// Look up the definition of an ability.
    ///
    /// # Errors
    ///
    /// Returns [`SimError::AbilityNotFound`] if the ID is unknown.
    fn definition(&self, id: SpellId) -> Result<Arc<AbilityDefinition>>;
}

/// A [`SpellDataProvider`] backed by an in-memory table.
#[derive(Debug, Clone, Default)]
pub struct InMemorySpellData {
    definitions: BTreeMap<SpellId, Arc<AbilityDefinition>>,
}

impl InMemorySpellData {
    /// Create an empty table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a RON list of [`AbilityDefinition`]s.
    ///
    /// # Errors
    ///
    /// Returns [`SimError::Config`] if the text is not a valid definition list.
    pub fn from_ron_str(text: &str) -> Result<Self> {
        let definitions: Vec<AbilityDefinition> =
            ron::from_str(text).map_err(|e| SimError::Config {
                message: format!("ability table: {e}"),
            })?;

        let mut data = Self::new();
        for definition in definitions {
            data.insert(definition);
        }
        Ok(data)
    }

    /// Add or replace a definition.
    pub fn insert(&mut self, definition: AbilityDefinition) -> Arc<AbilityDefinition> {
        let shared = Arc::new(definition);
        self.definitions.insert(shared.id, Arc::clone(&shared));
        shared
    }

    /// Builder form of [`InMemorySpellData::insert`].
    #[must_use]
    pub fn with(mut self, definition: AbilityDefinition) -> Self {
        self.insert(definition);
        self
    }

    /// Number of definitions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.definitions.len()
    }

    /// Whether the table is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.definitions.is_empty()
    }

    /// Known ability IDs in ascending order.
    pub fn ids(&self) -> impl Iterator<Item = SpellId> + '_ {
        self.definitions.keys().copied()
    }
}

impl SpellDataProvider for InMemorySpellData {
    fn definition(&self, id: SpellId) -> Result<Arc<AbilityDefinition>> {
        self.definitions
            .get(&id)
            .cloned()
            .ok_or(SimError::AbilityNotFound(id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::time::SimTime;

    #[test]
    fn test_lookup_shares_definition() {
        let data = InMemorySpellData::new().with(AbilityDefinition::new(SpellId(1), "Arcane Shot"));

        let a = data.definition(SpellId(1)).unwrap();
        let b = data.definition(SpellId(1)).unwrap();
        assert!(Arc::ptr_eq(&a, &b));
    }

    #[test]
    fn test_unknown_ability() {
        let data = InMemorySpellData::new();
        assert_eq!(
            data.definition(SpellId(99)),
            Err(SimError::AbilityNotFound(SpellId(99)))
        );
    }

    #[test]
    fn test_from_ron_str() {
        let data = InMemorySpellData::from_ron_str(
            r#"[
                AbilityDefinition(id: 1, name: "Steady Shot", cast_time: 1750),
                AbilityDefinition(id: 2, name: "Kill Command", recovery_time: 7500, base_damage: 80),
            ]"#,
        )
        .unwrap();

        assert_eq!(data.len(), 2);
        assert_eq!(data.ids().collect::<Vec<_>>(), vec![SpellId(1), SpellId(2)]);
        assert_eq!(
            data.definition(SpellId(1)).unwrap().cast_time,
            SimTime::from_millis(1750)
        );
    }

    #[test]
    fn test_from_ron_str_rejects_garbage() {
        let err = InMemorySpellData::from_ron_str("[not ron").unwrap_err();
        assert!(matches!(err, SimError::Config { .. }));
    }
}
