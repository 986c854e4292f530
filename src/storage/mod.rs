//! Storage traits and backends.
//!
//! [`memory`] is always available; [`sqlite`] stores a whole universe in one
//! database file and is enabled by the `persistent` feature.

mod traits;

pub mod memory;
#[cfg(feature = "persistent")]
pub mod sqlite;

pub use memory::{InMemoryCatalogStore, InMemoryEventStore, InMemoryGraphStore, InMemoryImpactStore};
#[cfg(feature = "persistent")]
pub use sqlite::SqliteUniverse;
pub use traits::{
    CatalogStore, EventListing, EventStore, GraphStore, ImpactStore, SkippedEvent, StorageError,
};
