//! Validated unit registry.

use std::collections::HashMap;

use derive_more::Display;

use crate::{ResolveError, Unit};

/// Typed handle to a unit in a [`UnitRegistry`]. Ordered by declaration.
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[display("#{_0}")]
pub struct UnitId(usize);

impl UnitId {
    pub fn index(self) -> usize {
        self.0
    }
}

/// Units of one network, with every name reference resolved to a [`UnitId`].
#[derive(Debug, Clone)]
pub struct UnitRegistry {
    units: Vec<Unit>,
    by_name: HashMap<String, UnitId>,
    /// Direct dependencies of each unit, deduplicated, in first-reference order.
    dependencies: Vec<Vec<UnitId>>,
}

impl UnitRegistry {
    /// Build the registry, rejecting duplicate names and unknown references.
    pub fn new(units: Vec<Unit>) -> Result<Self, ResolveError> {
        let mut by_name = HashMap::with_capacity(units.len());
        for (index, unit) in units.iter().enumerate() {
            if by_name.insert(unit.name.clone(), UnitId(index)).is_some() {
                return Err(ResolveError::DuplicateUnit(unit.name.clone()));
            }
        }

        let mut dependencies = Vec::with_capacity(units.len());
        for unit in &units {
            let mut deps = Vec::new();
            for reference in unit.references() {
                let id = by_name
                    .get(reference)
                    .copied()
                    .ok_or_else(|| ResolveError::UnknownReference {
                        unit: unit.name.clone(),
                        reference: reference.to_string(),
                    })?;
                if !deps.contains(&id) {
                    deps.push(id);
                }
            }
            dependencies.push(deps);
        }

        Ok(Self {
            units,
            by_name,
            dependencies,
        })
    }

    pub fn len(&self) -> usize {
        self.units.len()
    }

    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }

    pub fn id(&self, name: &str) -> Option<UnitId> {
        self.by_name.get(name).copied()
    }

    pub fn unit(&self, id: UnitId) -> &Unit {
        &self.units[id.0]
    }

    pub fn name(&self, id: UnitId) -> &str {
        &self.units[id.0].name
    }

    /// Units `id` references directly.
    pub fn dependencies(&self, id: UnitId) -> &[UnitId] {
        &self.dependencies[id.0]
    }

    /// All ids in declaration order.
    pub fn ids(&self) -> impl Iterator<Item = UnitId> + use<> {
        (0..self.units.len()).map(UnitId)
    }
}
