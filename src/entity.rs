//! Entity identifiers and kinds.
//!
//! Every record in a universe is addressed by a plain integer id, the way the
//! embedded database hands them out. The newtypes below keep object ids,
//! event ids, edge ids and network ids from being mixed up, while
//! [`EntityId`] is the kind-agnostic id the graph layer works with.

use std::fmt;

use serde::{Deserialize, Serialize};

macro_rules! integer_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(i64);

        impl $name {
            /// Wraps a raw database id.
            #[must_use]
            pub const fn new(raw: i64) -> Self {
                Self(raw)
            }

            /// Returns the raw database id.
            #[must_use]
            pub const fn get(self) -> i64 {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<i64> for $name {
            fn from(raw: i64) -> Self {
                Self(raw)
            }
        }

        impl From<$name> for i64 {
            fn from(id: $name) -> Self {
                id.0
            }
        }
    };
}

integer_id!(
    /// Kind-agnostic id of a graph node (an object or an event).
    EntityId
);
integer_id!(
    /// Id of a catalog object.
    ObjectId
);
integer_id!(
    /// Id of an event.
    EventId
);
integer_id!(
    /// Id of a stored edge.
    EdgeId
);
integer_id!(
    /// Id of a network (connected component of edges of one kind).
    NetworkId
);

impl From<ObjectId> for EntityId {
    fn from(id: ObjectId) -> Self {
        Self(id.0)
    }
}

impl From<EventId> for EntityId {
    fn from(id: EventId) -> Self {
        Self(id.0)
    }
}

impl From<EntityId> for ObjectId {
    fn from(id: EntityId) -> Self {
        Self(id.0)
    }
}

impl From<EntityId> for EventId {
    fn from(id: EntityId) -> Self {
        Self(id.0)
    }
}

/// The kind of entity an edge connects.
///
/// Edges never mix kinds: an object graph and an event graph live side by
/// side in the same universe, each with its own networks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    /// Catalog objects.
    Object,
    /// Events.
    Event,
}

impl EntityKind {
    /// Single-letter code used in the universe database.
    #[must_use]
    pub const fn code(self) -> &'static str {
        match self {
            Self::Object => "O",
            Self::Event => "E",
        }
    }

    /// Parses a database code (`O` / `E`, case-insensitive).
    #[must_use]
    pub fn from_code(code: &str) -> Option<Self> {
        match code.trim() {
            "O" | "o" => Some(Self::Object),
            "E" | "e" => Some(Self::Event),
            _ => None,
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Object => write!(f, "object"),
            Self::Event => write!(f, "event"),
        }
    }
}
