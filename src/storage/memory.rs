//! In-memory storage backend.
//!
//! Thread-safe implementations of the storage traits, used for embedded
//! universes, tests and as the reference for the SQLite backend.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::RwLock;

use chrono::Utc;

use crate::catalog::CatalogObject;
use crate::entity::{EdgeId, EntityId, EntityKind, EventId, NetworkId, ObjectId};
use crate::event::{EventDraft, EventRecord};
use crate::graph::{Edge, NewEdge};
use crate::impact::EventImpact;
use crate::network::{plan_network, NetworkPlan};
use crate::storage::traits::{CatalogStore, EventStore, GraphStore, ImpactStore, StorageError};

fn lock_err(context: &'static str) -> StorageError {
    StorageError::BackendError(format!("poisoned lock: {context}"))
}

/// In-memory object catalog.
#[derive(Debug, Default)]
pub struct InMemoryCatalogStore {
    objects: RwLock<BTreeMap<ObjectId, CatalogObject>>,
}

impl InMemoryCatalogStore {
    /// Create a new empty catalog.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a catalog holding `objects`.
    #[must_use]
    pub fn from_objects(objects: impl IntoIterator<Item = CatalogObject>) -> Self {
        Self {
            objects: RwLock::new(objects.into_iter().map(|o| (o.id, o)).collect()),
        }
    }

    /// Insert or replace an object.
    pub fn insert(&self, object: CatalogObject) -> Result<(), StorageError> {
        let mut objects = self.objects.write().map_err(|_| lock_err("catalog.insert"))?;
        objects.insert(object.id, object);
        Ok(())
    }

    fn ids_where(
        &self,
        context: &'static str,
        pred: impl Fn(&CatalogObject) -> bool,
    ) -> Result<Vec<ObjectId>, StorageError> {
        let objects = self.objects.read().map_err(|_| lock_err(context))?;
        Ok(objects
            .values()
            .filter(|o| pred(o))
            .map(|o| o.id)
            .collect())
    }
}

impl CatalogStore for InMemoryCatalogStore {
    fn get(&self, id: ObjectId) -> Result<Option<CatalogObject>, StorageError> {
        let objects = self.objects.read().map_err(|_| lock_err("catalog.get"))?;
        Ok(objects.get(&id).cloned())
    }

    fn get_many(&self, ids: &[ObjectId]) -> Result<Vec<CatalogObject>, StorageError> {
        let objects = self.objects.read().map_err(|_| lock_err("catalog.get_many"))?;
        let mut seen = BTreeSet::new();
        Ok(ids
            .iter()
            .filter(|id| seen.insert(**id))
            .filter_map(|id| objects.get(id).cloned())
            .collect())
    }

    fn all_ids(&self) -> Result<Vec<ObjectId>, StorageError> {
        self.ids_where("catalog.all_ids", |_| true)
    }

    fn ids_by_family(&self, family: &str) -> Result<Vec<ObjectId>, StorageError> {
        self.ids_where("catalog.ids_by_family", |o| o.family == family)
    }

    fn ids_by_type(&self, object_type: &str) -> Result<Vec<ObjectId>, StorageError> {
        self.ids_where("catalog.ids_by_type", |o| o.object_type == object_type)
    }
}

#[derive(Debug, Default)]
struct GraphState {
    edges: BTreeMap<EdgeId, Edge>,
    networks: BTreeMap<NetworkId, EntityKind>,
    last_edge: i64,
    last_network: i64,
}

impl GraphState {
    fn networks_of(&self, kind: EntityKind, id: EntityId) -> BTreeSet<NetworkId> {
        self.edges
            .values()
            .filter(|e| e.kind == kind && e.touches(id))
            .map(|e| e.network_id)
            .collect()
    }
}

/// In-memory object/event graph.
#[derive(Debug, Default)]
pub struct InMemoryGraphStore {
    state: RwLock<GraphState>,
}

impl InMemoryGraphStore {
    /// Create a new empty graph.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl GraphStore for InMemoryGraphStore {
    fn attach(&self, edge: NewEdge) -> Result<Edge, StorageError> {
        edge.validate()
            .map_err(|e| StorageError::InvalidEdge(e.to_string()))?;

        let mut state = self.state.write().map_err(|_| lock_err("graph.attach"))?;
        let kind = edge.kind;
        let plan = plan_network(
            &state.networks_of(kind, edge.source),
            &state.networks_of(kind, edge.target),
        );

        let network_id = match plan {
            NetworkPlan::Create => {
                state.last_network += 1;
                let id = NetworkId::new(state.last_network);
                state.networks.insert(id, kind);
                id
            }
            NetworkPlan::Join(id) => id,
            NetworkPlan::Merge { survivor, absorbed } => {
                for e in state.edges.values_mut() {
                    if e.kind == kind && absorbed.contains(&e.network_id) {
                        e.network_id = survivor;
                    }
                }
                for id in &absorbed {
                    state.networks.remove(id);
                }
                survivor
            }
        };

        state.last_edge += 1;
        let stored = edge.into_edge(EdgeId::new(state.last_edge), network_id, Utc::now());
        state.edges.insert(stored.id, stored.clone());
        Ok(stored)
    }

    fn detach(&self, kind: EntityKind, id: EdgeId) -> Result<(), StorageError> {
        let mut state = self.state.write().map_err(|_| lock_err("graph.detach"))?;
        if !state.edges.get(&id).is_some_and(|e| e.kind == kind) {
            return Err(StorageError::EdgeNotFound(id));
        }
        state.edges.remove(&id);
        Ok(())
    }

    fn get_edge(&self, kind: EntityKind, id: EdgeId) -> Result<Option<Edge>, StorageError> {
        let state = self.state.read().map_err(|_| lock_err("graph.get_edge"))?;
        Ok(state.edges.get(&id).filter(|e| e.kind == kind).cloned())
    }

    fn edges_touching(&self, kind: EntityKind, id: EntityId) -> Result<Vec<Edge>, StorageError> {
        let state = self.state.read().map_err(|_| lock_err("graph.edges_touching"))?;
        Ok(state
            .edges
            .values()
            .filter(|e| e.kind == kind && e.touches(id))
            .cloned()
            .collect())
    }

    fn networks_of(
        &self,
        kind: EntityKind,
        id: EntityId,
    ) -> Result<BTreeSet<NetworkId>, StorageError> {
        let state = self.state.read().map_err(|_| lock_err("graph.networks_of"))?;
        Ok(state.networks_of(kind, id))
    }

    fn network_ids(&self, kind: EntityKind) -> Result<Vec<NetworkId>, StorageError> {
        let state = self.state.read().map_err(|_| lock_err("graph.network_ids"))?;
        Ok(state
            .networks
            .iter()
            .filter(|(_, k)| **k == kind)
            .map(|(id, _)| *id)
            .collect())
    }

    fn edges_in_network(
        &self,
        kind: EntityKind,
        network: NetworkId,
    ) -> Result<Vec<Edge>, StorageError> {
        let state = self.state.read().map_err(|_| lock_err("graph.edges_in_network"))?;
        Ok(state
            .edges
            .values()
            .filter(|e| e.kind == kind && e.network_id == network)
            .cloned()
            .collect())
    }

    fn list_edges(&self, kind: EntityKind, limit: usize) -> Result<Vec<Edge>, StorageError> {
        let state = self.state.read().map_err(|_| lock_err("graph.list_edges"))?;
        Ok(state
            .edges
            .values()
            .rev()
            .filter(|e| e.kind == kind)
            .take(limit)
            .cloned()
            .collect())
    }
}

#[derive(Debug, Default)]
struct EventState {
    events: BTreeMap<EventId, EventRecord>,
    last_id: i64,
}

/// In-memory event definitions.
#[derive(Debug, Default)]
pub struct InMemoryEventStore {
    state: RwLock<EventState>,
}

impl InMemoryEventStore {
    /// Create a new empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl EventStore for InMemoryEventStore {
    fn insert(&self, draft: EventDraft) -> Result<EventRecord, StorageError> {
        let mut state = self.state.write().map_err(|_| lock_err("event.insert"))?;
        state.last_id += 1;
        let record = draft.into_record(EventId::new(state.last_id), Utc::now());
        state.events.insert(record.id, record.clone());
        Ok(record)
    }

    fn get(&self, id: EventId) -> Result<Option<EventRecord>, StorageError> {
        let state = self.state.read().map_err(|_| lock_err("event.get"))?;
        Ok(state.events.get(&id).cloned())
    }

    fn update(&self, event: EventRecord) -> Result<(), StorageError> {
        let mut state = self.state.write().map_err(|_| lock_err("event.update"))?;
        let slot = state
            .events
            .get_mut(&event.id)
            .ok_or(StorageError::EventNotFound(event.id))?;
        *slot = event;
        Ok(())
    }

    fn delete(&self, id: EventId) -> Result<(), StorageError> {
        let mut state = self.state.write().map_err(|_| lock_err("event.delete"))?;
        state
            .events
            .remove(&id)
            .map(|_| ())
            .ok_or(StorageError::EventNotFound(id))
    }

    fn list(&self) -> Result<Vec<EventRecord>, StorageError> {
        let state = self.state.read().map_err(|_| lock_err("event.list"))?;
        Ok(state.events.values().cloned().collect())
    }
}

/// In-memory impact cache.
#[derive(Debug, Default)]
pub struct InMemoryImpactStore {
    impacts: RwLock<BTreeMap<(EventId, ObjectId), EventImpact>>,
}

impl InMemoryImpactStore {
    /// Create a new empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl ImpactStore for InMemoryImpactStore {
    fn upsert(&self, impact: EventImpact) -> Result<(), StorageError> {
        let mut impacts = self.impacts.write().map_err(|_| lock_err("impact.upsert"))?;
        let key = (impact.event, impact.object);
        let merged = match impacts.get(&key) {
            Some(existing) => existing.merge(impact),
            None => impact,
        };
        impacts.insert(key, merged);
        Ok(())
    }

    fn for_event(&self, event: EventId) -> Result<Vec<EventImpact>, StorageError> {
        let impacts = self.impacts.read().map_err(|_| lock_err("impact.for_event"))?;
        Ok(impacts
            .range((event, ObjectId::new(i64::MIN))..=(event, ObjectId::new(i64::MAX)))
            .map(|(_, i)| *i)
            .collect())
    }

    fn clear_event(&self, event: EventId) -> Result<usize, StorageError> {
        let mut impacts = self.impacts.write().map_err(|_| lock_err("impact.clear_event"))?;
        let before = impacts.len();
        impacts.retain(|(e, _), _| *e != event);
        Ok(before - impacts.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::EventParams;
    use crate::impact::ImpactRole;

    fn edge(source: i64, target: i64) -> NewEdge {
        NewEdge::new(EntityKind::Object, EntityId::new(source), EntityId::new(target))
    }

    #[test]
    fn catalog_get_many_skips_missing_and_duplicates() {
        let catalog = InMemoryCatalogStore::from_objects([
            CatalogObject::new(ObjectId::new(1), "a", 1.0).with_family("f"),
            CatalogObject::new(ObjectId::new(2), "b", 2.0).with_type("t"),
        ]);
        let got = catalog
            .get_many(&[ObjectId::new(2), ObjectId::new(9), ObjectId::new(2)])
            .unwrap();
        assert_eq!(got.len(), 1);
        assert_eq!(got[0].name, "b");
        assert_eq!(catalog.ids_by_family("f").unwrap(), vec![ObjectId::new(1)]);
        assert_eq!(catalog.ids_by_type("t").unwrap(), vec![ObjectId::new(2)]);
        assert_eq!(catalog.all_ids().unwrap().len(), 2);
    }

    #[test]
    fn attach_creates_joins_and_merges_networks() {
        let graph = InMemoryGraphStore::new();
        let ab = graph.attach(edge(1, 2)).unwrap();
        let cd = graph.attach(edge(3, 4)).unwrap();
        assert_ne!(ab.network_id, cd.network_id);
        assert_eq!(graph.network_ids(EntityKind::Object).unwrap().len(), 2);

        let bc = graph.attach(edge(2, 3)).unwrap();
        assert_eq!(bc.network_id, ab.network_id);
        assert_eq!(graph.network_ids(EntityKind::Object).unwrap(), vec![ab.network_id]);
        let summary = graph
            .network_summary(EntityKind::Object, ab.network_id)
            .unwrap();
        assert_eq!(summary.edge_count, 3);
        assert_eq!(summary.members.len(), 4);
    }

    #[test]
    fn kinds_never_share_networks() {
        let graph = InMemoryGraphStore::new();
        graph.attach(edge(1, 2)).unwrap();
        let ev = graph
            .attach(NewEdge::new(EntityKind::Event, EntityId::new(2), EntityId::new(3)))
            .unwrap();
        assert_eq!(graph.network_ids(EntityKind::Event).unwrap(), vec![ev.network_id]);
        assert!(graph
            .networks_of(EntityKind::Event, EntityId::new(1))
            .unwrap()
            .is_empty());
    }

    #[test]
    fn attach_rejects_self_loop() {
        let graph = InMemoryGraphStore::new();
        let err = graph.attach(edge(5, 5)).unwrap_err();
        assert!(matches!(err, StorageError::InvalidEdge(_)));
    }

    #[test]
    fn detach_keeps_network_and_lists_newest_first() {
        let graph = InMemoryGraphStore::new();
        let first = graph.attach(edge(1, 2)).unwrap();
        let second = graph.attach(edge(2, 3)).unwrap();
        let listed = graph.list_edges(EntityKind::Object, 10).unwrap();
        assert_eq!(listed[0].id, second.id);

        graph.detach(EntityKind::Object, first.id).unwrap();
        assert!(matches!(
            graph.detach(EntityKind::Object, first.id),
            Err(StorageError::EdgeNotFound(_))
        ));
        assert!(matches!(
            graph.detach(EntityKind::Event, second.id),
            Err(StorageError::EdgeNotFound(_))
        ));
        assert_eq!(graph.network_ids(EntityKind::Object).unwrap().len(), 1);
    }

    #[test]
    fn event_crud() {
        let store = InMemoryEventStore::new();
        let rec = store
            .insert(EventDraft::new("crash", EventParams::default()).probability(0.4))
            .unwrap();
        assert_eq!(rec.id, EventId::new(1));
        let mut updated = store.get(rec.id).unwrap().unwrap();
        updated.name = "krach".to_string();
        store.update(updated).unwrap();
        assert_eq!(store.list().unwrap()[0].name, "krach");
        store.delete(rec.id).unwrap();
        assert!(store.get(rec.id).unwrap().is_none());
        assert!(matches!(store.delete(rec.id), Err(StorageError::EventNotFound(_))));
    }

    #[test]
    fn impact_upsert_merges_and_clears() {
        let store = InMemoryImpactStore::new();
        let event = EventId::new(1);
        let mut far = EventImpact::direct(event, ObjectId::new(2));
        far.level = 2;
        far.weight = 0.49;
        far.role = ImpactRole::Propagated;
        store.upsert(far).unwrap();
        store
            .upsert(EventImpact {
                level: 1,
                weight: 0.7,
                ..far
            })
            .unwrap();
        store.upsert(EventImpact::direct(EventId::new(3), ObjectId::new(2))).unwrap();

        let got = store.for_event(event).unwrap();
        assert_eq!(got.len(), 1);
        assert_eq!(got[0].level, 1);
        assert!(store.direct_for_event(event).unwrap().is_empty());
        assert_eq!(store.clear_event(event).unwrap(), 1);
        assert_eq!(store.for_event(EventId::new(3)).unwrap().len(), 1);
    }
}
