//! Gene and wiring primitives.
//!
//! - [`NodeId`]: global, never-renumbered identifier of a network node
//! - [`Edge`]: a directed weighted connection gene, identified by `(begin, end)`
//! - [`SignalSlot`]: one endpoint of a materialized node's wiring

use std::fmt;

use serde::{Deserialize, Serialize};

/// Global identifier of a node.
///
/// Input and output ids are chosen by the fitness function; hidden ids are
/// allocated by the genome and are never renumbered or reused.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct NodeId(pub u32);

impl NodeId {
    /// The largest representable id. No hidden id can follow it.
    pub const MAX: Self = Self(u32::MAX);

    /// The id that follows this one, saturating at [`NodeId::MAX`].
    #[must_use]
    pub const fn next(self) -> Self {
        Self(self.0.saturating_add(1))
    }

    /// The id that follows this one, or `None` at [`NodeId::MAX`].
    #[must_use]
    pub const fn checked_next(self) -> Option<Self> {
        match self.0.checked_add(1) {
            Some(id) => Some(Self(id)),
            None => None,
        }
    }
}

impl From<u32> for NodeId {
    fn from(value: u32) -> Self {
        Self(value)
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A directed, weighted connection gene.
///
/// There is no lineage tracking: the gene's identity is exactly its
/// `(begin, end)` pair, and a genome holds at most one edge per identity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Edge {
    /// Source node.
    pub begin: NodeId,
    /// Target node.
    pub end: NodeId,
    /// Connection weight.
    pub weight: f32,
    /// Disabled edges are kept in the genome but skipped when building.
    pub enabled: bool,
}

impl Edge {
    /// Create a new enabled edge.
    #[must_use]
    pub fn new(begin: impl Into<NodeId>, end: impl Into<NodeId>, weight: f32) -> Self {
        Self {
            begin: begin.into(),
            end: end.into(),
            weight,
            enabled: true,
        }
    }

    /// The gene identity of this edge.
    #[inline]
    #[must_use]
    pub const fn key(&self) -> (NodeId, NodeId) {
        (self.begin, self.end)
    }

    /// Whether this edge starts or ends at `id`.
    #[inline]
    #[must_use]
    pub fn touches(&self, id: NodeId) -> bool {
        self.begin == id || self.end == id
    }
}

/// One endpoint of a node's wiring.
///
/// Input slots are keyed by the source node and carry the connection weight;
/// output slots are keyed by the node the signal is published under.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignalSlot {
    /// Global id of the node on the other side of this slot.
    pub id: NodeId,
    /// Weight applied to the signal passing through this slot.
    pub weight: f32,
    /// Last signal value observed on this slot.
    pub value: f32,
}

impl SignalSlot {
    #[must_use]
    pub const fn new(id: NodeId, weight: f32) -> Self {
        Self {
            id,
            weight,
            value: 0.0,
        }
    }
}
