//! The explicit universe context threaded through every engine call.

use std::collections::BTreeSet;
#[cfg(feature = "persistent")]
use std::path::Path;
use std::sync::Arc;

use tracing::debug;

#[cfg(feature = "persistent")]
use crate::catalog::SchemaDescriptor;
use crate::config::EngineConfig;
use crate::entity::{EdgeId, EntityId, EntityKind, EventId, ObjectId};
use crate::error::WhatIfResult;
use crate::graph::{Edge, NewEdge};
use crate::impact::{curate_impacts, resolve_impacts, ImpactSet};
use crate::network::attach_edge;
use crate::propagation::{propagate, Propagation, PropagationSettings};
use crate::simulation::{project, ProjectionPlan, ProjectionReport};
#[cfg(feature = "persistent")]
use crate::storage::SqliteUniverse;
use crate::storage::{
    CatalogStore, EventStore, GraphStore, ImpactStore, InMemoryCatalogStore, InMemoryEventStore,
    InMemoryGraphStore, InMemoryImpactStore,
};

/// One isolated simulation world: its stores plus the engine configuration.
///
/// Cheap to clone; clones share the same stores.
#[derive(Clone)]
pub struct UniverseHandle {
    catalog: Arc<dyn CatalogStore>,
    graph: Arc<dyn GraphStore>,
    events: Arc<dyn EventStore>,
    impacts: Arc<dyn ImpactStore>,
    config: EngineConfig,
}

impl std::fmt::Debug for UniverseHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UniverseHandle")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl UniverseHandle {
    /// Assembles a universe from arbitrary stores.
    ///
    /// # Errors
    /// `InvalidConfig` when the configuration does not validate.
    pub fn new(
        catalog: Arc<dyn CatalogStore>,
        graph: Arc<dyn GraphStore>,
        events: Arc<dyn EventStore>,
        impacts: Arc<dyn ImpactStore>,
        config: EngineConfig,
    ) -> WhatIfResult<Self> {
        config.validate()?;
        Ok(Self {
            catalog,
            graph,
            events,
            impacts,
            config,
        })
    }

    /// A universe held entirely in memory around `catalog`.
    ///
    /// # Errors
    /// `InvalidConfig` when the configuration does not validate.
    pub fn in_memory(catalog: InMemoryCatalogStore, config: EngineConfig) -> WhatIfResult<Self> {
        Self::new(
            Arc::new(catalog),
            Arc::new(InMemoryGraphStore::new()),
            Arc::new(InMemoryEventStore::new()),
            Arc::new(InMemoryImpactStore::new()),
            config,
        )
    }

    /// Opens a universe database. Without a descriptor, the catalog columns
    /// of the default table are discovered once.
    ///
    /// # Errors
    /// Schema, connection or configuration errors.
    #[cfg(feature = "persistent")]
    pub fn open_sqlite(
        path: impl AsRef<Path>,
        schema: Option<SchemaDescriptor>,
        config: EngineConfig,
    ) -> WhatIfResult<Self> {
        config.validate()?;
        let store = Arc::new(match schema {
            Some(schema) => SqliteUniverse::open(path, schema)?,
            None => SqliteUniverse::open_discovering(path, SchemaDescriptor::DEFAULT_TABLE)?,
        });
        Self::new(store.clone(), store.clone(), store.clone(), store, config)
    }

    #[must_use]
    pub fn catalog(&self) -> &dyn CatalogStore {
        self.catalog.as_ref()
    }

    #[must_use]
    pub fn graph(&self) -> &dyn GraphStore {
        self.graph.as_ref()
    }

    #[must_use]
    pub fn events(&self) -> &dyn EventStore {
        self.events.as_ref()
    }

    #[must_use]
    pub fn impacts(&self) -> &dyn ImpactStore {
        self.impacts.as_ref()
    }

    #[must_use]
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Attaches an edge, maintaining networks.
    ///
    /// # Errors
    /// `SelfLoop`, `InvalidWeight` or storage errors.
    pub fn attach_edge(&self, edge: NewEdge) -> WhatIfResult<Edge> {
        attach_edge(self.graph(), edge)
    }

    /// Deletes an edge. Its network is left as is.
    ///
    /// # Errors
    /// `EdgeNotFound` or storage errors.
    pub fn detach_edge(&self, kind: EntityKind, id: EdgeId) -> WhatIfResult<()> {
        self.graph.detach(kind, id)?;
        debug!(%kind, edge = %id, "detached edge");
        Ok(())
    }

    /// Breadth-first propagation from `origins`.
    ///
    /// The depth is capped by the configured limit.
    ///
    /// # Errors
    /// Storage errors only.
    pub fn propagate(
        &self,
        kind: EntityKind,
        origins: &BTreeSet<EntityId>,
        settings: &PropagationSettings,
    ) -> WhatIfResult<Propagation> {
        let capped = PropagationSettings {
            max_depth: settings
                .max_depth
                .min(i64::from(self.config.limits.max_depth)),
            ..*settings
        };
        propagate(self.graph(), kind, origins, &capped)
    }

    /// Resolves an event's impacts with the configured propagation.
    ///
    /// # Errors
    /// `UnknownEvent` or storage errors.
    pub fn resolve_impacts(&self, event: EventId) -> WhatIfResult<ImpactSet> {
        resolve_impacts(self, event, &self.config.propagation())
    }

    /// Replaces the curated impacts of an event.
    ///
    /// # Errors
    /// `UnknownEvent` or storage errors.
    pub fn curate_impacts(&self, event: EventId, objects: &[ObjectId]) -> WhatIfResult<usize> {
        curate_impacts(self, event, objects)
    }

    /// Deletes an event together with its cached impacts.
    ///
    /// # Errors
    /// `EventNotFound` or storage errors.
    pub fn delete_event(&self, event: EventId) -> WhatIfResult<()> {
        self.events.delete(event)?;
        let cleared = self.impacts.clear_event(event)?;
        debug!(%event, cleared, "deleted event");
        Ok(())
    }

    /// Runs a projection.
    ///
    /// # Errors
    /// See [`project`].
    pub fn project(&self, plan: &ProjectionPlan) -> WhatIfResult<ProjectionReport> {
        project(self, plan)
    }
}
