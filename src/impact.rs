//! Event impact resolution.
//!
//! An impact is the effect magnitude of one event on one object before it is
//! applied to prices. Level-0 impacts come from explicit curation or from a
//! parametric event's scope; deeper levels come from propagating those over
//! the object graph. Resolved impacts are cached in the [`ImpactStore`].
//!
//! [`ImpactStore`]: crate::storage::ImpactStore

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::entity::{EntityId, EntityKind, EventId, ObjectId};
use crate::error::{ValidationError, WhatIfResult};
use crate::event::{EventParams, Scope};
use crate::params::clamp_unit;
use crate::propagation::{propagate_weighted, PropagationSettings};
use crate::universe::UniverseHandle;

/// How an impact was produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImpactRole {
    /// Reached through the object graph.
    Propagated,
    /// Matched by a parametric event's scope.
    Scoped,
    /// Explicitly curated for the event.
    Direct,
}

impl ImpactRole {
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Propagated => "propage",
            Self::Scoped => "portee",
            Self::Direct => "direct",
        }
    }

    #[must_use]
    pub fn from_label(label: &str) -> Self {
        match label.trim() {
            "direct" => Self::Direct,
            "portee" | "scoped" => Self::Scoped,
            _ => Self::Propagated,
        }
    }
}

/// Effect of one event on one object.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EventImpact {
    pub event: EventId,
    pub object: ObjectId,
    /// Propagation distance; 0 for directly targeted objects.
    pub level: u32,
    /// In `[0, 1]`.
    pub weight: f64,
    pub role: ImpactRole,
    /// The level-0 object this impact was propagated from.
    pub origin: ObjectId,
}

impl EventImpact {
    /// A level-0 impact of full weight.
    #[must_use]
    pub fn direct(event: EventId, object: ObjectId) -> Self {
        Self {
            event,
            object,
            level: 0,
            weight: 1.0,
            role: ImpactRole::Direct,
            origin: object,
        }
    }

    /// Combines two impacts on the same (event, object) pair.
    ///
    /// The smaller level wins, then the larger weight. At equal level and
    /// weight the stronger role is kept.
    #[must_use]
    pub fn merge(self, other: Self) -> Self {
        use std::cmp::Ordering;
        match self.level.cmp(&other.level) {
            Ordering::Less => self,
            Ordering::Greater => other,
            Ordering::Equal => {
                if other.weight > self.weight
                    || (other.weight == self.weight && other.role > self.role)
                {
                    other
                } else {
                    self
                }
            }
        }
    }
}

/// Impacts of one event, keyed by object.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ImpactSet {
    impacts: BTreeMap<ObjectId, EventImpact>,
}

impl ImpactSet {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts an impact, merging with any existing one for the object.
    pub fn insert(&mut self, impact: EventImpact) {
        let merged = match self.impacts.get(&impact.object) {
            Some(existing) => existing.merge(impact),
            None => impact,
        };
        self.impacts.insert(impact.object, merged);
    }

    #[must_use]
    pub fn get(&self, object: ObjectId) -> Option<&EventImpact> {
        self.impacts.get(&object)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.impacts.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.impacts.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &EventImpact> {
        self.impacts.values()
    }

    /// Final weight per object.
    #[must_use]
    pub fn weights(&self) -> BTreeMap<ObjectId, f64> {
        self.impacts
            .iter()
            .map(|(id, i)| (*id, i.weight))
            .collect()
    }
}

/// Replaces an event's curated impacts with `objects`, each at weight 1.0.
///
/// Ids missing from the catalog are skipped. Returns how many were stored.
///
/// # Errors
/// `UnknownEvent` if the event does not exist; storage errors otherwise.
pub fn curate_impacts(
    universe: &UniverseHandle,
    event: EventId,
    objects: &[ObjectId],
) -> WhatIfResult<usize> {
    if universe.events().get(event)?.is_none() {
        return Err(ValidationError::UnknownEvent { id: event }.into());
    }
    let existing: BTreeSet<ObjectId> = universe
        .catalog()
        .get_many(objects)?
        .into_iter()
        .map(|o| o.id)
        .collect();
    for missing in objects.iter().filter(|id| !existing.contains(id)) {
        warn!(%event, object = %missing, "curated impact references a missing object");
    }

    universe.impacts().clear_event(event)?;
    for object in &existing {
        universe
            .impacts()
            .upsert(EventImpact::direct(event, *object))?;
    }
    debug!(%event, count = existing.len(), "curated impacts stored");
    Ok(existing.len())
}

/// Resolves the objects an event affects and how strongly.
///
/// Curated impacts win over a parametric scope. The level-0 set is then
/// propagated over the object graph; a propagated weight is the origin's
/// weight times the attenuation at that distance, clamped to `[0, 1]`.
/// Objects missing from the catalog are left out.
///
/// # Errors
/// `UnknownEvent` if the event does not exist; storage errors otherwise.
pub fn resolve_impacts(
    universe: &UniverseHandle,
    event_id: EventId,
    settings: &PropagationSettings,
) -> WhatIfResult<ImpactSet> {
    let Some(event) = universe.events().get(event_id)? else {
        return Err(ValidationError::UnknownEvent { id: event_id }.into());
    };

    let mut resolved = ImpactSet::new();
    let curated = universe.impacts().direct_for_event(event_id)?;
    if curated.is_empty() {
        if let EventParams::Parametric(p) = &event.params {
            for object in scope_members(universe, &p.scope)? {
                resolved.insert(EventImpact {
                    role: ImpactRole::Scoped,
                    ..EventImpact::direct(event_id, object)
                });
            }
        }
    } else {
        let ids: Vec<ObjectId> = curated.iter().map(|i| i.object).collect();
        let existing: BTreeSet<ObjectId> = universe
            .catalog()
            .get_many(&ids)?
            .into_iter()
            .map(|o| o.id)
            .collect();
        for impact in curated {
            if existing.contains(&impact.object) {
                resolved.insert(EventImpact {
                    level: 0,
                    weight: clamp_unit(impact.weight),
                    ..impact
                });
            } else {
                warn!(event = %event_id, object = %impact.object, "impact references a missing object");
            }
        }
    }

    let origins: BTreeMap<EntityId, f64> = resolved
        .iter()
        .map(|i| (EntityId::from(i.object), i.weight))
        .collect();
    let reached = propagate_weighted(universe.graph(), EntityKind::Object, &origins, settings)?;

    let candidates: Vec<ObjectId> = reached
        .iter()
        .filter(|(id, _)| !origins.contains_key(id))
        .map(|(id, _)| ObjectId::from(id))
        .collect();
    let present: BTreeSet<ObjectId> = universe
        .catalog()
        .get_many(&candidates)?
        .into_iter()
        .map(|o| o.id)
        .collect();

    for (id, reach) in reached.iter() {
        let object = ObjectId::from(id);
        if origins.contains_key(&id) || !present.contains(&object) {
            continue;
        }
        resolved.insert(EventImpact {
            event: event_id,
            object,
            level: reach.depth,
            weight: clamp_unit(reach.weight),
            role: ImpactRole::Propagated,
            origin: ObjectId::from(reach.origin),
        });
    }

    for impact in resolved.iter() {
        if impact.role != ImpactRole::Direct {
            universe.impacts().upsert(*impact)?;
        }
    }

    debug!(
        event = %event_id,
        direct = origins.len(),
        total = resolved.len(),
        "impacts resolved"
    );
    Ok(resolved)
}

/// Catalog objects matched by a parametric scope. An empty list means all.
fn scope_members(universe: &UniverseHandle, scope: &Scope) -> WhatIfResult<Vec<ObjectId>> {
    let catalog = universe.catalog();
    let ids = match scope.clone().normalized() {
        Scope::All => catalog.all_ids()?,
        Scope::Family(family) => catalog.ids_by_family(&family)?,
        Scope::Type(object_type) => catalog.ids_by_type(&object_type)?,
        Scope::List(ids) => catalog.get_many(&ids)?.into_iter().map(|o| o.id).collect(),
    };
    Ok(ids)
}
