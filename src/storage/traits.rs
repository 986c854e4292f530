//! Abstract storage traits for whatif.
//!
//! A universe is made of four stores: the read-only object catalog, the
//! object/event graph, the event definitions and the cached event impacts.
//! Backends implement these traits; the engine only sees `Arc<dyn ...>`.

use std::collections::BTreeSet;

use thiserror::Error;

use crate::catalog::CatalogObject;
use crate::entity::{EdgeId, EntityId, EntityKind, EventId, NetworkId, ObjectId};
use crate::event::{EventDraft, EventRecord};
use crate::graph::{Edge, NetworkSummary, NewEdge};
use crate::impact::{EventImpact, ImpactRole};

/// Errors that can occur during storage operations.
#[derive(Debug, Error)]
pub enum StorageError {
    /// Event not found.
    #[error("Event not found: {0}")]
    EventNotFound(EventId),

    /// Edge not found.
    #[error("Edge not found: {0}")]
    EdgeNotFound(EdgeId),

    /// Edge rejected by the store itself.
    #[error("Invalid edge: {0}")]
    InvalidEdge(String),

    /// Backend error.
    #[error("Storage backend error: {0}")]
    BackendError(String),

    /// Serialization failed.
    #[error("Serialization error: {0}")]
    SerializationError(String),

    /// Connection failed or the database is busy.
    #[error("Connection error: {0}")]
    ConnectionError(String),

    /// Catalog table does not match its descriptor.
    #[error("Schema error: {0}")]
    Schema(String),
}

/// Read-only view over the object catalog.
pub trait CatalogStore: Send + Sync {
    /// Get one object by id.
    fn get(&self, id: ObjectId) -> Result<Option<CatalogObject>, StorageError>;

    /// Get several objects, in the order requested. Missing ids are skipped.
    fn get_many(&self, ids: &[ObjectId]) -> Result<Vec<CatalogObject>, StorageError>;

    /// Every object id, ascending.
    fn all_ids(&self) -> Result<Vec<ObjectId>, StorageError>;

    /// Ids of objects whose family equals `family`, ascending.
    fn ids_by_family(&self, family: &str) -> Result<Vec<ObjectId>, StorageError>;

    /// Ids of objects whose type equals `object_type`, ascending.
    fn ids_by_type(&self, object_type: &str) -> Result<Vec<ObjectId>, StorageError>;
}

/// Edges and the networks grouping them.
///
/// # Network invariant
/// For one entity kind, every edge carries exactly one network id and any two
/// entities connected by a path of edges share it. `attach` must run its
/// read-plan-write sequence as one atomic unit.
pub trait GraphStore: Send + Sync {
    /// Attach an edge, creating, extending or merging networks as needed.
    ///
    /// # Errors
    /// - `InvalidEdge`: self-loop or non-finite weight
    fn attach(&self, edge: NewEdge) -> Result<Edge, StorageError>;

    /// Delete an edge. Networks are never split afterwards.
    ///
    /// # Errors
    /// - `EdgeNotFound`: no edge of this kind with this id
    fn detach(&self, kind: EntityKind, id: EdgeId) -> Result<(), StorageError>;

    /// Get an edge by id.
    fn get_edge(&self, kind: EntityKind, id: EdgeId) -> Result<Option<Edge>, StorageError>;

    /// Every edge with `id` at either end, ascending by edge id.
    fn edges_touching(&self, kind: EntityKind, id: EntityId) -> Result<Vec<Edge>, StorageError>;

    /// Network ids of the edges touching `id`.
    fn networks_of(
        &self,
        kind: EntityKind,
        id: EntityId,
    ) -> Result<BTreeSet<NetworkId>, StorageError>;

    /// Every network id of this kind, ascending.
    fn network_ids(&self, kind: EntityKind) -> Result<Vec<NetworkId>, StorageError>;

    /// Edges of one network, ascending by edge id.
    fn edges_in_network(
        &self,
        kind: EntityKind,
        network: NetworkId,
    ) -> Result<Vec<Edge>, StorageError>;

    /// Most recent edges first, at most `limit`.
    fn list_edges(&self, kind: EntityKind, limit: usize) -> Result<Vec<Edge>, StorageError>;

    /// Entities reachable from `id` across one edge, honoring direction.
    ///
    /// Deduplicated, ascending.
    fn neighbors(&self, kind: EntityKind, id: EntityId) -> Result<Vec<EntityId>, StorageError> {
        let out: BTreeSet<EntityId> = self
            .edges_touching(kind, id)?
            .iter()
            .filter_map(|e| e.traverse_from(id))
            .filter(|n| *n != id)
            .collect();
        Ok(out.into_iter().collect())
    }

    /// Members and edge count of one network.
    fn network_summary(
        &self,
        kind: EntityKind,
        network: NetworkId,
    ) -> Result<NetworkSummary, StorageError> {
        let edges = self.edges_in_network(kind, network)?;
        Ok(NetworkSummary::from_edges(network, kind, &edges))
    }
}

/// An event whose stored parameters no longer decode.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedEvent {
    pub id: EventId,
    pub reason: String,
}

/// Every readable event plus the ones that had to be skipped.
#[derive(Debug, Clone, Default)]
pub struct EventListing {
    pub events: Vec<EventRecord>,
    pub skipped: Vec<SkippedEvent>,
}

/// Event definitions.
pub trait EventStore: Send + Sync {
    /// Insert a new event; the store assigns the id.
    fn insert(&self, draft: EventDraft) -> Result<EventRecord, StorageError>;

    /// Get an event by id.
    fn get(&self, id: EventId) -> Result<Option<EventRecord>, StorageError>;

    /// Replace an existing event's metadata and parameters.
    ///
    /// # Errors
    /// - `EventNotFound`
    fn update(&self, event: EventRecord) -> Result<(), StorageError>;

    /// Delete an event and its parameters.
    ///
    /// # Errors
    /// - `EventNotFound`
    fn delete(&self, id: EventId) -> Result<(), StorageError>;

    /// Every readable event, ascending by id.
    fn list(&self) -> Result<Vec<EventRecord>, StorageError>;

    /// Like [`EventStore::list`], but also names the events left out
    /// because their parameters could not be decoded.
    fn list_readable(&self) -> Result<EventListing, StorageError> {
        Ok(EventListing {
            events: self.list()?,
            skipped: Vec::new(),
        })
    }
}

/// Cached per-(event, object) impacts.
pub trait ImpactStore: Send + Sync {
    /// Insert or merge one impact.
    ///
    /// An existing row keeps the smaller level, then the larger weight.
    fn upsert(&self, impact: EventImpact) -> Result<(), StorageError>;

    /// Every impact of one event, ascending by object id.
    fn for_event(&self, event: EventId) -> Result<Vec<EventImpact>, StorageError>;

    /// Curated level-0 impacts of one event.
    fn direct_for_event(&self, event: EventId) -> Result<Vec<EventImpact>, StorageError> {
        Ok(self
            .for_event(event)?
            .into_iter()
            .filter(|i| i.role == ImpactRole::Direct)
            .collect())
    }

    /// Remove every impact of one event. Returns how many rows were removed.
    fn clear_event(&self, event: EventId) -> Result<usize, StorageError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn _assert_object_safe(
        _: &dyn CatalogStore,
        _: &dyn GraphStore,
        _: &dyn EventStore,
        _: &dyn ImpactStore,
    ) {
    }

    #[test]
    fn storage_error_messages_name_the_record() {
        let err = StorageError::EventNotFound(EventId::new(4));
        assert_eq!(err.to_string(), "Event not found: 4");
        let err = StorageError::EdgeNotFound(EdgeId::new(9));
        assert!(err.to_string().contains('9'));
    }
}
