//! Projection engine.
//!
//! A run is a pure function of the universe's stores and a
//! [`ProjectionPlan`]; the catalog is never written back. The only side
//! effect is the impact cache filled while resolving scheduled events.

pub mod constraints;
pub mod effect;
pub mod projection;
pub mod rules;
pub mod schedule;
pub mod selection;
pub mod state;

pub use constraints::ProjectionLimits;
pub use effect::{EventEffect, LocalEffect};
pub use projection::{project, AppliedEvent, ObjectSeries, ProjectionPlan, ProjectionReport, RunId};
pub use rules::{EventState, EventStates, FiredRule};
pub use schedule::{Schedule, ScheduledEvent};
pub use selection::Selection;
pub use state::ObjectState;
