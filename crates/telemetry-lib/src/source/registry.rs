//! Registry of monitored units

use dashmap::DashMap;
use tracing::debug;

use crate::models::UnitConfig;

/// Concurrent map of unit_id -> configuration
#[derive(Default)]
pub struct UnitRegistry {
    units: DashMap<String, UnitConfig>,
}

impl UnitRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_units(units: impl IntoIterator<Item = UnitConfig>) -> Self {
        let registry = Self::new();
        for unit in units {
            registry.register(unit);
        }
        registry
    }

    /// Register or replace a unit
    pub fn register(&self, unit: UnitConfig) {
        debug!(unit_id = %unit.unit_id, "Registering unit");
        self.units.insert(unit.unit_id.clone(), unit);
    }

    pub fn unregister(&self, unit_id: &str) -> Option<UnitConfig> {
        debug!(unit_id = %unit_id, "Unregistering unit");
        self.units.remove(unit_id).map(|(_, v)| v)
    }

    pub fn get(&self, unit_id: &str) -> Option<UnitConfig> {
        self.units.get(unit_id).map(|r| r.clone())
    }

    /// All registered units, ordered by id
    pub fn list(&self) -> Vec<UnitConfig> {
        let mut units: Vec<_> = self.units.iter().map(|r| r.value().clone()).collect();
        units.sort_by(|a, b| a.unit_id.cmp(&b.unit_id));
        units
    }

    pub fn len(&self) -> usize {
        self.units.len()
    }

    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }
}
