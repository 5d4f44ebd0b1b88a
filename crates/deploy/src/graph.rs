//! Dependency graph and deployment ordering.

use std::{cmp::Reverse, collections::BinaryHeap};

use crate::{ResolveError, Unit, UnitId, UnitRegistry};

/// A validated unit set together with its deployment order.
#[derive(Debug, Clone)]
pub struct DeploymentPlan {
    registry: UnitRegistry,
    order: Vec<UnitId>,
}

impl DeploymentPlan {
    /// Validate `units` and order them so every unit follows the units it
    /// references. Ties are broken by declaration order.
    pub fn build(units: Vec<Unit>) -> Result<Self, ResolveError> {
        let registry = UnitRegistry::new(units)?;
        let order = topological_order(&registry)?;
        let plan = Self { registry, order };
        tracing::debug!(
            units = plan.order.len(),
            order = ?plan.names(),
            "Resolved deployment order"
        );
        Ok(plan)
    }

    pub fn registry(&self) -> &UnitRegistry {
        &self.registry
    }

    /// Deployment order.
    pub fn order(&self) -> &[UnitId] {
        &self.order
    }

    /// Unit names in deployment order.
    pub fn names(&self) -> Vec<&str> {
        self.order.iter().map(|id| self.registry.name(*id)).collect()
    }
}

/// Kahn's algorithm with a min-heap on declaration index.
fn topological_order(registry: &UnitRegistry) -> Result<Vec<UnitId>, ResolveError> {
    let count = registry.len();
    let mut pending = vec![0usize; count];
    let mut dependents: Vec<Vec<UnitId>> = vec![Vec::new(); count];

    for id in registry.ids() {
        for dep in registry.dependencies(id) {
            pending[id.index()] += 1;
            dependents[dep.index()].push(id);
        }
    }

    let mut ready: BinaryHeap<Reverse<UnitId>> = registry
        .ids()
        .filter(|id| pending[id.index()] == 0)
        .map(Reverse)
        .collect();

    let mut order = Vec::with_capacity(count);
    while let Some(Reverse(id)) = ready.pop() {
        order.push(id);
        for dependent in &dependents[id.index()] {
            pending[dependent.index()] -= 1;
            if pending[dependent.index()] == 0 {
                ready.push(Reverse(*dependent));
            }
        }
    }

    if order.len() < count {
        return Err(ResolveError::CyclicDependency {
            members: find_cycle(registry, &pending),
        });
    }

    Ok(order)
}

/// Walk unresolved dependencies from the first blocked unit until a unit
/// repeats. Every blocked unit has at least one blocked dependency, so the
/// walk always closes a cycle.
fn find_cycle(registry: &UnitRegistry, pending: &[usize]) -> Vec<String> {
    let blocked = |id: &UnitId| pending[id.index()] > 0;

    let Some(start) = registry.ids().find(|id| blocked(id)) else {
        return Vec::new();
    };

    let mut path = vec![start];
    let mut current = start;
    loop {
        let Some(next) = registry.dependencies(current).iter().copied().find(blocked) else {
            break;
        };
        if let Some(position) = path.iter().position(|id| *id == next) {
            path.drain(..position);
            break;
        }
        path.push(next);
        current = next;
    }

    // `path` follows "depends on" edges; report in deployment direction.
    path.reverse();
    path.into_iter()
        .map(|id| registry.name(id).to_string())
        .collect()
}
