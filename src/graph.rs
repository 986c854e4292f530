//! Edge and network types for the object and event graphs.

use std::collections::BTreeSet;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::entity::{EdgeId, EntityId, EntityKind, NetworkId};
use crate::error::ValidationError;

/// How an edge transmits effects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    /// `->`: the source affects the target, never the reverse.
    #[default]
    Implication,
    /// `<->`: both ends affect each other.
    Equivalence,
}

impl Direction {
    /// Marker stored in the universe database.
    #[must_use]
    pub const fn symbol(self) -> &'static str {
        match self {
            Self::Implication => "->",
            Self::Equivalence => "<->",
        }
    }

    /// Parses a stored marker. Anything other than `<->` is an implication.
    #[must_use]
    pub fn from_symbol(symbol: &str) -> Self {
        if symbol.trim() == "<->" {
            Self::Equivalence
        } else {
            Self::Implication
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

/// Semantic type of an edge. Informational only; propagation ignores it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EdgeType {
    #[default]
    Association,
    Dependency,
    Composition,
    Other(String),
}

impl EdgeType {
    /// Parses a stored label (`associe`, `depend`, `compose`, or free text).
    #[must_use]
    pub fn from_label(label: &str) -> Self {
        match label.trim() {
            "" | "associe" | "association" => Self::Association,
            "depend" | "dependance" | "dependency" => Self::Dependency,
            "compose" | "composition" => Self::Composition,
            other => Self::Other(other.to_string()),
        }
    }

    /// Label stored in the universe database.
    #[must_use]
    pub fn label(&self) -> &str {
        match self {
            Self::Association => "associe",
            Self::Dependency => "depend",
            Self::Composition => "compose",
            Self::Other(label) => label,
        }
    }
}

/// An edge about to be attached to the graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewEdge {
    pub kind: EntityKind,
    pub source: EntityId,
    pub target: EntityId,
    pub direction: Direction,
    pub edge_type: EdgeType,
    pub weight: f64,
    pub comment: String,
}

impl NewEdge {
    /// An association implication of weight 1.0.
    #[must_use]
    pub fn new(kind: EntityKind, source: impl Into<EntityId>, target: impl Into<EntityId>) -> Self {
        Self {
            kind,
            source: source.into(),
            target: target.into(),
            direction: Direction::default(),
            edge_type: EdgeType::default(),
            weight: 1.0,
            comment: String::new(),
        }
    }

    #[must_use]
    pub fn direction(mut self, direction: Direction) -> Self {
        self.direction = direction;
        self
    }

    #[must_use]
    pub fn edge_type(mut self, edge_type: EdgeType) -> Self {
        self.edge_type = edge_type;
        self
    }

    #[must_use]
    pub fn weight(mut self, weight: f64) -> Self {
        self.weight = weight;
        self
    }

    #[must_use]
    pub fn comment(mut self, comment: impl Into<String>) -> Self {
        self.comment = comment.into();
        self
    }

    /// Rejects self-loops and non-finite weights.
    ///
    /// # Errors
    /// `SelfLoop` or `InvalidWeight`.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.source == self.target {
            return Err(ValidationError::SelfLoop { id: self.source });
        }
        if !self.weight.is_finite() {
            return Err(ValidationError::InvalidWeight { value: self.weight });
        }
        Ok(())
    }

    /// Materializes the stored edge once ids are assigned.
    #[must_use]
    pub fn into_edge(self, id: EdgeId, network_id: NetworkId, created_at: DateTime<Utc>) -> Edge {
        Edge {
            id,
            kind: self.kind,
            network_id,
            source: self.source,
            target: self.target,
            direction: self.direction,
            edge_type: self.edge_type,
            weight: self.weight,
            comment: self.comment,
            created_at,
        }
    }
}

/// A stored edge.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Edge {
    pub id: EdgeId,
    pub kind: EntityKind,
    pub network_id: NetworkId,
    pub source: EntityId,
    pub target: EntityId,
    pub direction: Direction,
    pub edge_type: EdgeType,
    pub weight: f64,
    #[serde(default)]
    pub comment: String,
    pub created_at: DateTime<Utc>,
}

impl Edge {
    /// True when `id` is either end of this edge.
    #[must_use]
    pub fn touches(&self, id: EntityId) -> bool {
        self.source == id || self.target == id
    }

    /// The entity reachable from `from` across this edge, honoring direction.
    ///
    /// Implications are only traversed source → target; equivalences both ways.
    #[must_use]
    pub fn traverse_from(&self, from: EntityId) -> Option<EntityId> {
        if self.source == from {
            Some(self.target)
        } else if self.target == from && self.direction == Direction::Equivalence {
            Some(self.source)
        } else {
            None
        }
    }
}

/// Readable summary of one network.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkSummary {
    pub id: NetworkId,
    pub kind: EntityKind,
    /// Every entity appearing at either end of one of the network's edges.
    pub members: BTreeSet<EntityId>,
    pub edge_count: usize,
}

impl NetworkSummary {
    /// Summarizes a network from its edges.
    #[must_use]
    pub fn from_edges(id: NetworkId, kind: EntityKind, edges: &[Edge]) -> Self {
        let members = edges
            .iter()
            .flat_map(|e| [e.source, e.target])
            .collect();
        Self {
            id,
            kind,
            members,
            edge_count: edges.len(),
        }
    }
}
