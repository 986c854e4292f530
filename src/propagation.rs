//! Breadth-first propagation with distance-based attenuation.
//!
//! Every origin starts at depth 0 with its own starting weight. An entity
//! reached at depth `d` from origin `o` weighs `weight(o) × attenuation^d`.
//! Smaller depth always wins; among equal depths the larger weight wins.

use std::collections::{BTreeMap, BTreeSet, HashMap, VecDeque};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::entity::{EntityId, EntityKind};
use crate::error::WhatIfResult;
use crate::params::{clamp_unit, finite_or};
use crate::storage::GraphStore;

/// Traversal parameters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PropagationSettings {
    /// Negative values mean "origins only".
    pub max_depth: i64,
    /// Clamped to `[0, 1]`.
    pub attenuation: f64,
    /// Weight given to origins that do not carry their own.
    pub starting_weight: f64,
}

impl Default for PropagationSettings {
    fn default() -> Self {
        Self {
            max_depth: 6,
            attenuation: 0.7,
            starting_weight: 1.0,
        }
    }
}

impl PropagationSettings {
    #[must_use]
    pub fn new(max_depth: i64, attenuation: f64) -> Self {
        Self {
            max_depth,
            attenuation,
            starting_weight: 1.0,
        }
    }

    #[must_use]
    pub fn starting_weight(mut self, weight: f64) -> Self {
        self.starting_weight = weight;
        self
    }

    /// Depth cap as an unsigned level.
    #[must_use]
    pub fn depth_cap(&self) -> u32 {
        u32::try_from(self.max_depth.max(0)).unwrap_or(u32::MAX)
    }

    #[must_use]
    pub fn clamped_attenuation(&self) -> f64 {
        clamp_unit(self.attenuation)
    }

    /// Weight at `depth` for an origin of weight `origin_weight`.
    #[must_use]
    pub fn weight_at(&self, origin_weight: f64, depth: u32) -> f64 {
        let exponent = i32::try_from(depth).unwrap_or(i32::MAX);
        finite_or(origin_weight * self.clamped_attenuation().powi(exponent), 0.0)
    }
}

/// How one entity was reached.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Reach {
    pub depth: u32,
    pub weight: f64,
    /// The origin the recorded path starts from.
    pub origin: EntityId,
}

/// Result of one traversal.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Propagation {
    reached: BTreeMap<EntityId, Reach>,
}

impl Propagation {
    #[must_use]
    pub fn get(&self, id: EntityId) -> Option<&Reach> {
        self.reached.get(&id)
    }

    #[must_use]
    pub fn contains(&self, id: EntityId) -> bool {
        self.reached.contains_key(&id)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.reached.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.reached.is_empty()
    }

    /// Reached entities, ascending by id.
    pub fn iter(&self) -> impl Iterator<Item = (EntityId, &Reach)> {
        self.reached.iter().map(|(id, r)| (*id, r))
    }

    /// `(depth, weight)` per entity.
    #[must_use]
    pub fn depths_and_weights(&self) -> BTreeMap<EntityId, (u32, f64)> {
        self.reached
            .iter()
            .map(|(id, r)| (*id, (r.depth, r.weight)))
            .collect()
    }
}

/// Propagates from a set of origins, all at the settings' starting weight.
///
/// # Errors
/// Only storage errors from neighbor lookups.
pub fn propagate(
    graph: &dyn GraphStore,
    kind: EntityKind,
    origins: &BTreeSet<EntityId>,
    settings: &PropagationSettings,
) -> WhatIfResult<Propagation> {
    let weighted: BTreeMap<EntityId, f64> = origins
        .iter()
        .map(|id| (*id, settings.starting_weight))
        .collect();
    propagate_weighted(graph, kind, &weighted, settings)
}

/// Propagates from origins carrying individual starting weights.
///
/// # Errors
/// Only storage errors from neighbor lookups.
pub fn propagate_weighted(
    graph: &dyn GraphStore,
    kind: EntityKind,
    origins: &BTreeMap<EntityId, f64>,
    settings: &PropagationSettings,
) -> WhatIfResult<Propagation> {
    let cap = settings.depth_cap();
    let mut reached: BTreeMap<EntityId, Reach> = BTreeMap::new();
    let mut queue: VecDeque<EntityId> = VecDeque::new();
    let mut neighbor_cache: HashMap<EntityId, Vec<EntityId>> = HashMap::new();

    for (id, weight) in origins {
        reached.insert(
            *id,
            Reach {
                depth: 0,
                weight: finite_or(*weight, 0.0),
                origin: *id,
            },
        );
        queue.push_back(*id);
    }

    let mut expansions = 0_usize;
    while let Some(current) = queue.pop_front() {
        let Some(here) = reached.get(&current).copied() else {
            continue;
        };
        if here.depth >= cap {
            continue;
        }
        expansions += 1;

        let neighbors = match neighbor_cache.get(&current) {
            Some(cached) => cached.clone(),
            None => {
                let fresh = graph.neighbors(kind, current)?;
                neighbor_cache.insert(current, fresh.clone());
                fresh
            }
        };

        let depth = here.depth + 1;
        let origin_weight = origins.get(&here.origin).copied().unwrap_or(0.0);
        let weight = settings.weight_at(finite_or(origin_weight, 0.0), depth);
        let candidate = Reach {
            depth,
            weight,
            origin: here.origin,
        };

        for next in neighbors {
            match reached.get_mut(&next) {
                None => {
                    reached.insert(next, candidate);
                    queue.push_back(next);
                }
                Some(seen) if seen.depth > depth => {
                    *seen = candidate;
                    queue.push_back(next);
                }
                Some(seen) if seen.depth == depth && seen.weight < weight => {
                    *seen = candidate;
                }
                Some(_) => {}
            }
        }
    }

    debug!(
        %kind,
        origins = origins.len(),
        reached = reached.len(),
        expansions,
        max_depth = cap,
        "propagation finished"
    );
    Ok(Propagation { reached })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{Direction, NewEdge};
    use crate::storage::InMemoryGraphStore;

    fn e(id: i64) -> EntityId {
        EntityId::new(id)
    }

    fn chain(graph: &InMemoryGraphStore, ids: &[i64]) {
        for pair in ids.windows(2) {
            graph
                .attach(NewEdge::new(EntityKind::Object, e(pair[0]), e(pair[1])))
                .unwrap();
        }
    }

    #[test]
    fn depth_cap_limits_expansion() {
        let graph = InMemoryGraphStore::new();
        chain(&graph, &[1, 2, 3, 4, 5]);
        let out = propagate(
            &graph,
            EntityKind::Object,
            &BTreeSet::from([e(1)]),
            &PropagationSettings::new(2, 0.7),
        )
        .unwrap();
        assert_eq!(out.len(), 3);
        assert_eq!(out.get(e(3)).unwrap().depth, 2);
        assert!(!out.contains(e(4)));
    }

    #[test]
    fn negative_depth_returns_origins_only() {
        let graph = InMemoryGraphStore::new();
        chain(&graph, &[1, 2]);
        let out = propagate(
            &graph,
            EntityKind::Object,
            &BTreeSet::from([e(1)]),
            &PropagationSettings::new(-3, 0.7),
        )
        .unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(out.get(e(1)).unwrap().weight, 1.0);
    }

    #[test]
    fn implication_is_not_walked_backwards() {
        let graph = InMemoryGraphStore::new();
        chain(&graph, &[1, 2]);
        let out = propagate(
            &graph,
            EntityKind::Object,
            &BTreeSet::from([e(2)]),
            &PropagationSettings::default(),
        )
        .unwrap();
        assert!(!out.contains(e(1)));
    }

    #[test]
    fn equivalence_is_walked_both_ways_and_cycles_terminate() {
        let graph = InMemoryGraphStore::new();
        for (a, b) in [(1, 2), (2, 3), (3, 1)] {
            graph
                .attach(
                    NewEdge::new(EntityKind::Object, e(a), e(b)).direction(Direction::Equivalence),
                )
                .unwrap();
        }
        let out = propagate(
            &graph,
            EntityKind::Object,
            &BTreeSet::from([e(2)]),
            &PropagationSettings::default(),
        )
        .unwrap();
        assert_eq!(out.get(e(1)).unwrap().depth, 1);
        assert_eq!(out.get(e(3)).unwrap().depth, 1);
    }

    #[test]
    fn attenuation_is_clamped() {
        let graph = InMemoryGraphStore::new();
        chain(&graph, &[1, 2]);
        let out = propagate(
            &graph,
            EntityKind::Object,
            &BTreeSet::from([e(1)]),
            &PropagationSettings::new(3, 4.0),
        )
        .unwrap();
        assert_eq!(out.get(e(2)).unwrap().weight, 1.0);
    }

    #[test]
    fn heavier_origin_wins_at_equal_depth() {
        let graph = InMemoryGraphStore::new();
        chain(&graph, &[1, 3]);
        chain(&graph, &[2, 3]);
        let origins = BTreeMap::from([(e(1), 0.2), (e(2), 0.9)]);
        let out = propagate_weighted(
            &graph,
            EntityKind::Object,
            &origins,
            &PropagationSettings::new(2, 0.5),
        )
        .unwrap();
        let reach = out.get(e(3)).unwrap();
        assert_eq!(reach.origin, e(2));
        assert!((reach.weight - 0.45).abs() < 1e-12);
    }
}
