//! # whatif - a what-if economic simulator core
//!
//! A universe holds priced catalog objects, a graph linking objects (and
//! events) to each other, and events that shift prices and revenue. The
//! engine answers "what happens if...?" with deterministic projections.
//!
//! ## Core Concepts
//!
//! - **Network**: a connected component of same-kind edges, maintained
//!   eagerly as edges are attached (created, extended or merged)
//! - **Propagation**: breadth-first diffusion over the graph, each hop
//!   attenuating the weight
//! - **Impact**: the resolved weight of one event on one object
//! - **Projection**: year-by-year compounding with scheduled events applied
//!   through per-object local coefficients
//!
//! ## Usage
//!
//! ```rust,ignore
//! use whatif::{
//!     CatalogObject, EngineConfig, EntityKind, EventDraft, EventParams, InMemoryCatalogStore,
//!     NewEdge, ObjectId, ProjectionPlan, Schedule, Selection, UniverseHandle,
//! };
//!
//! let catalog = InMemoryCatalogStore::from_objects([
//!     CatalogObject::new(ObjectId::new(1), "copper", 100.0),
//!     CatalogObject::new(ObjectId::new(2), "cable", 200.0),
//! ]);
//! let universe = UniverseHandle::in_memory(catalog, EngineConfig::default())?;
//! universe.attach_edge(NewEdge::new(EntityKind::Object, ObjectId::new(1), ObjectId::new(2)))?;
//!
//! let shortage = universe.events().insert(EventDraft::new("shortage", EventParams::default()))?;
//! universe.curate_impacts(shortage.id, &[ObjectId::new(1)])?;
//!
//! let plan = ProjectionPlan::new(Selection::objects([ObjectId::new(1), ObjectId::new(2)]), 2025, 10)
//!     .schedule(Schedule::parse(&format!("{}:0:1.5:1", shortage.id)));
//! let report = universe.project(&plan)?;
//! ```

#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod catalog;
pub mod config;
pub mod entity;
pub mod error;
pub mod event;
pub mod graph;
pub mod impact;
pub mod network;
pub mod params;
pub mod propagation;
pub mod request;
pub mod simulation;
pub mod storage;
pub mod universe;

pub use catalog::{CatalogObject, SchemaDescriptor, Speculation, UsageFrequency};
pub use config::EngineConfig;
pub use entity::{EdgeId, EntityId, EntityKind, EventId, NetworkId, ObjectId};
pub use error::{ExecutionError, ValidationError, WhatIfError, WhatIfResult};
pub use event::{
    ActivityState, AlgorithmicParams, Comparison, ConstatCondition, ConstatParams, EventDraft,
    EventParams, EventRecord, ObjectField, ParametricAction, ParametricParams, RuleAction, Scope,
};
pub use graph::{Direction, Edge, EdgeType, NetworkSummary, NewEdge};
pub use impact::{curate_impacts, resolve_impacts, EventImpact, ImpactRole, ImpactSet};
pub use network::{attach_edge, plan_network, NetworkPlan};
pub use propagation::{propagate, propagate_weighted, Propagation, PropagationSettings, Reach};
pub use request::{edges_from_params, event_from_params, plan_from_params, QueryParams};
pub use simulation::{
    project, ProjectionLimits, ProjectionPlan, ProjectionReport, Schedule, ScheduledEvent,
    Selection,
};
#[cfg(feature = "persistent")]
pub use storage::SqliteUniverse;
pub use storage::{
    CatalogStore, EventListing, EventStore, GraphStore, ImpactStore, InMemoryCatalogStore,
    InMemoryEventStore, InMemoryGraphStore, InMemoryImpactStore, SkippedEvent, StorageError,
};
pub use universe::UniverseHandle;
