//! Network maintenance: deciding which network a new edge joins.
//!
//! Stores call [`plan_network`] while holding their write lock (or inside
//! their write transaction) and then carry out the returned plan, so the
//! read-plan-write sequence is atomic for every backend.

use std::collections::BTreeSet;

use tracing::debug;

use crate::entity::NetworkId;
use crate::error::WhatIfResult;
use crate::graph::{Edge, NewEdge};
use crate::storage::GraphStore;

/// What to do with networks when an edge is attached.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NetworkPlan {
    /// Neither end is networked yet: allocate a fresh network.
    Create,
    /// Exactly one network touches the edge: join it.
    Join(NetworkId),
    /// The edge bridges several networks: the smallest id survives and the
    /// others are renumbered into it and removed.
    Merge {
        survivor: NetworkId,
        absorbed: Vec<NetworkId>,
    },
}

impl NetworkPlan {
    /// The network the new edge ends up in, if already known.
    #[must_use]
    pub fn target(&self) -> Option<NetworkId> {
        match self {
            Self::Create => None,
            Self::Join(id) => Some(*id),
            Self::Merge { survivor, .. } => Some(*survivor),
        }
    }
}

/// Plans network assignment from the networks touching each end.
///
/// Tolerates entities that already sit in several networks.
#[must_use]
pub fn plan_network(
    source_networks: &BTreeSet<NetworkId>,
    target_networks: &BTreeSet<NetworkId>,
) -> NetworkPlan {
    let union: BTreeSet<NetworkId> = source_networks.union(target_networks).copied().collect();
    let mut ids = union.into_iter();
    let plan = match ids.next() {
        None => NetworkPlan::Create,
        Some(first) => {
            let absorbed: Vec<NetworkId> = ids.collect();
            if absorbed.is_empty() {
                NetworkPlan::Join(first)
            } else {
                NetworkPlan::Merge {
                    survivor: first,
                    absorbed,
                }
            }
        }
    };
    debug!(?plan, "planned network assignment");
    plan
}

/// Validates an edge and attaches it through the store.
///
/// # Errors
/// `SelfLoop` / `InvalidWeight` before touching the store, or the store's
/// own error.
pub fn attach_edge(graph: &dyn GraphStore, edge: NewEdge) -> WhatIfResult<Edge> {
    edge.validate()?;
    let stored = graph.attach(edge)?;
    debug!(
        kind = %stored.kind,
        edge = %stored.id,
        network = %stored.network_id,
        "attached edge"
    );
    Ok(stored)
}
