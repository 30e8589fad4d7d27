//! Structural mutation operators and pressure-driven dispatch.
//!
//! Every operator takes `&self` and returns a new genome: the parent is
//! cloned, the clone's edge list or activation map is edited, and the clone's
//! phenotype is rebuilt. Node choices are made against the parent's cached
//! phenotype, whose accumulated activity biases the samplers.

use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use crate::error::{EvoError, Result};
use crate::gene::{Edge, NodeId};
use crate::genome::Genome;
use crate::sampling::{reverse_select_by_activity, select_by_activity, select_uniform};

/// Attempts AddConnection makes at finding a finish node distinct from the start.
const MAX_FINISH_RESAMPLES: usize = 64;

/// The structural edits a genome can undergo.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MutationKind {
    /// Connect two not-yet-connected nodes.
    AddConnection,
    /// Remove one edge.
    DeleteConnection,
    /// Insert a hidden node with one incoming and one outgoing edge.
    AddNode,
    /// Remove a hidden node and every edge touching it.
    DeleteNode,
    /// Perturb one edge weight.
    ChangeWeight,
}

impl MutationKind {
    /// Whether this mutation adds or removes nodes.
    #[must_use]
    pub const fn is_node_mutation(self) -> bool {
        matches!(self, Self::AddNode | Self::DeleteNode)
    }
}

/// A draw from `(0, 1]`, so that `draw > 0` always holds.
fn draw<R: Rng>(rng: &mut R) -> f32 {
    1.0 - rng.random::<f32>()
}

impl Genome {
    /// Pick the next mutation from the genome's structural pressure.
    ///
    /// Dense genomes (high `conn_factor`) tend to lose connections or gain
    /// nodes; sparse ones gain connections. While `nodes_locked` is set, every
    /// AddNode or DeleteNode outcome becomes ChangeWeight.
    pub fn choose_mutation<R: Rng>(&self, rng: &mut R, nodes_locked: bool) -> MutationKind {
        let conn_factor = self.conn_factor();
        let node_factor = self.node_factor();
        let has_hidden = self.hidden_count() > 0;

        let kind = if draw(rng) > conn_factor {
            if draw(rng) > conn_factor || !has_hidden {
                MutationKind::AddConnection
            } else {
                MutationKind::DeleteNode
            }
        } else if draw(rng) > node_factor {
            if draw(rng) > conn_factor && has_hidden {
                MutationKind::DeleteNode
            } else {
                MutationKind::DeleteConnection
            }
        } else {
            MutationKind::AddNode
        };

        if nodes_locked && kind.is_node_mutation() {
            MutationKind::ChangeWeight
        } else {
            kind
        }
    }

    /// Choose and apply one structural mutation.
    ///
    /// # Errors
    ///
    /// Returns [`EvoError::StructuralInvariantViolation`] if the edit would
    /// break a genome invariant.
    pub fn mutate_structure<R: Rng>(&self, rng: &mut R, nodes_locked: bool) -> Result<Self> {
        let kind = self.choose_mutation(rng, nodes_locked);
        trace!(?kind, edges = self.edges.len(), "mutating genome");
        self.mutate_with(kind, rng)
    }

    /// Apply a specific mutation.
    ///
    /// # Errors
    ///
    /// See [`Genome::mutate_structure`].
    pub fn mutate_with<R: Rng>(&self, kind: MutationKind, rng: &mut R) -> Result<Self> {
        match kind {
            MutationKind::AddConnection => self.add_connection(rng),
            MutationKind::DeleteConnection => self.delete_connection(rng),
            MutationKind::AddNode => self.add_node(rng),
            MutationKind::DeleteNode => self.delete_node(rng),
            MutationKind::ChangeWeight => self.change_weight(rng),
        }
    }

    fn sample_node<R: Rng>(&self, candidates: &[NodeId], rng: &mut R) -> Option<NodeId> {
        let idx = if self.config.use_node_degrees {
            select_by_activity(&self.activities(candidates), rng)
        } else {
            select_uniform(candidates.len(), rng)
        };
        idx.map(|i| candidates[i])
    }

    fn sample_prunable_node<R: Rng>(&self, candidates: &[NodeId], rng: &mut R) -> Option<NodeId> {
        let idx = if self.config.use_node_degrees {
            reverse_select_by_activity(&self.activities(candidates), rng)
        } else {
            select_uniform(candidates.len(), rng)
        };
        idx.map(|i| candidates[i])
    }

    fn require_node(&self, id: NodeId) -> Result<()> {
        if self.contains_node(id) {
            Ok(())
        } else {
            Err(EvoError::StructuralInvariantViolation(format!(
                "node {id} is not part of the genome"
            )))
        }
    }

    fn require_wiring(&self, start: NodeId, finish: NodeId) -> Result<()> {
        self.require_node(start)?;
        self.require_node(finish)?;
        if self.is_output(start) || self.is_input(finish) {
            return Err(EvoError::StructuralInvariantViolation(format!(
                "cannot wire {start} -> {finish}: connections run from inputs or hidden nodes to hidden nodes or outputs"
            )));
        }
        Ok(())
    }

    /// Finish a structural edit: validate, drop the stale phenotype and rebuild.
    fn finish_edit(mut self) -> Result<Self> {
        self.validate()?;
        self.phenotype = None;
        self.rebuild()?;
        Ok(self)
    }

    /// AddConnection with sampled endpoints.
    ///
    /// The start comes from inputs and hidden nodes, the finish from hidden
    /// nodes and outputs, resampled until it differs from the start. Cycles
    /// are allowed. An existing `(start, finish)` edge makes this a no-op.
    ///
    /// # Errors
    ///
    /// See [`Genome::add_connection_between`].
    pub fn add_connection<R: Rng>(&self, rng: &mut R) -> Result<Self> {
        let sources = self.non_output_ids();
        let targets = self.non_input_ids();
        let Some(start) = self.sample_node(&sources, rng) else {
            debug!("add_connection: no source nodes");
            return Ok(self.clone());
        };

        let mut finish = None;
        for _ in 0..MAX_FINISH_RESAMPLES {
            match self.sample_node(&targets, rng) {
                Some(candidate) if candidate != start => {
                    finish = Some(candidate);
                    break;
                }
                Some(_) => {}
                None => break,
            }
        }
        let Some(finish) = finish else {
            debug!(%start, "add_connection: no finish node distinct from start");
            return Ok(self.clone());
        };

        let weight = self.config.random_gene_value(rng);
        self.add_connection_between(start, finish, weight)
    }

    /// Add the edge `start -> finish`, or return an unchanged copy if that
    /// edge already exists (its weight is left as it is).
    ///
    /// # Errors
    ///
    /// Returns [`EvoError::StructuralInvariantViolation`] if either node is
    /// unknown, `start` is an output or `finish` is an input.
    pub fn add_connection_between(&self, start: NodeId, finish: NodeId, weight: f32) -> Result<Self> {
        self.require_wiring(start, finish)?;
        if self.find_edge(start, finish).is_some() {
            debug!(%start, %finish, "add_connection: edge exists, keeping its weight");
            return Ok(self.clone());
        }

        let mut child = self.clone();
        child.edges.push(Edge::new(start, finish, weight));
        trace!(%start, %finish, weight, "connection added");
        child.finish_edit()
    }

    /// DeleteConnection on a uniformly chosen edge.
    ///
    /// # Errors
    ///
    /// See [`Genome::delete_connection_at`].
    pub fn delete_connection<R: Rng>(&self, rng: &mut R) -> Result<Self> {
        match select_uniform(self.edges.len(), rng) {
            Some(index) => self.delete_connection_at(index),
            None => {
                debug!("delete_connection: genome has no edges");
                Ok(self.clone())
            }
        }
    }

    /// Remove the edge at `index`.
    ///
    /// A hidden endpoint left without any edge is dropped from the activation
    /// map.
    ///
    /// # Errors
    ///
    /// Returns [`EvoError::StructuralInvariantViolation`] if `index` is out of
    /// range or the removal orphans more than one node.
    pub fn delete_connection_at(&self, index: usize) -> Result<Self> {
        if index >= self.edges.len() {
            return Err(EvoError::StructuralInvariantViolation(format!(
                "edge index {index} out of range for {} edges",
                self.edges.len()
            )));
        }

        let mut child = self.clone();
        let removed = child.edges.remove(index);

        let mut orphans: Vec<NodeId> = [removed.begin, removed.end]
            .into_iter()
            .filter(|&id| !child.is_input(id) && !child.is_output(id))
            .filter(|&id| !child.edges.iter().any(|e| e.touches(id)))
            .collect();
        orphans.dedup();

        match orphans.as_slice() {
            [] => {}
            [orphan] => {
                child.activations.remove(orphan);
                debug!(node = %orphan, "delete_connection: dropped orphaned node");
            }
            _ => {
                return Err(EvoError::OrphanedNodes {
                    begin: removed.begin,
                    end: removed.end,
                    count: orphans.len(),
                });
            }
        }

        trace!(begin = %removed.begin, end = %removed.end, "connection deleted");
        child.finish_edit()
    }

    /// AddNode with sampled endpoints.
    ///
    /// With `use_add_single_node` the start is drawn from inputs and hidden
    /// nodes and the finish from hidden nodes and outputs. Otherwise the new
    /// node is placed alongside a uniformly chosen edge `b -> e`, wired
    /// `b -> new` with weight 1 and `new -> e` with that edge's weight, and
    /// `b -> e` stays in place. An edgeless genome always samples endpoints.
    ///
    /// # Errors
    ///
    /// See [`Genome::add_node_between`].
    pub fn add_node<R: Rng>(&self, rng: &mut R) -> Result<Self> {
        if !self.config.use_add_single_node {
            if let Some(index) = select_uniform(self.edges.len(), rng) {
                let edge = &self.edges[index];
                return self.add_node_between(edge.begin, edge.end, 1.0, edge.weight);
            }
        }

        let sources = self.non_output_ids();
        let targets = self.non_input_ids();
        // The new id is in neither set, so the finish can never equal it
        let (Some(start), Some(finish)) = (
            self.sample_node(&sources, rng),
            self.sample_node(&targets, rng),
        ) else {
            debug!("add_node: no endpoints available");
            return Ok(self.clone());
        };

        let weight_in = self.config.random_gene_value(rng);
        let weight_out = self.config.random_gene_value(rng);
        self.add_node_between(start, finish, weight_in, weight_out)
    }

    /// Insert a new hidden node wired `start -> new -> finish`.
    ///
    /// The new node takes the next id from the genome's allocator and the
    /// default hidden activation.
    ///
    /// # Errors
    ///
    /// Returns [`EvoError::StructuralInvariantViolation`] if either endpoint
    /// is unknown, `start` is an output or `finish` is an input.
    pub fn add_node_between(
        &self,
        start: NodeId,
        finish: NodeId,
        weight_in: f32,
        weight_out: f32,
    ) -> Result<Self> {
        self.require_wiring(start, finish)?;

        let mut child = self.clone();
        let id = match child.max_node_id() {
            Some(max) if max >= child.next_node_id => max.checked_next().ok_or_else(|| {
                EvoError::StructuralInvariantViolation(format!("no node id left after {max}"))
            })?,
            _ => child.next_node_id,
        };
        child.next_node_id = id.next();
        child.edges.push(Edge::new(start, id, weight_in));
        child.edges.push(Edge::new(id, finish, weight_out));
        child
            .activations
            .insert(id, child.config.hidden_activation);

        trace!(node = %id, %start, %finish, "node added");
        child.finish_edit()
    }

    /// DeleteNode on a hidden node, favouring the least active ones.
    ///
    /// A no-op when the genome has no hidden nodes.
    ///
    /// # Errors
    ///
    /// See [`Genome::remove_node`].
    pub fn delete_node<R: Rng>(&self, rng: &mut R) -> Result<Self> {
        let hidden = self.hidden_ids();
        match self.sample_prunable_node(&hidden, rng) {
            Some(id) => self.remove_node(id),
            None => {
                debug!("delete_node: genome has no hidden nodes");
                Ok(self.clone())
            }
        }
    }

    /// Remove hidden node `id` together with every edge touching it.
    ///
    /// Other ids are kept as they are. Hidden nodes that the rebuild prunes
    /// as isolated are dropped from the activation map as well.
    ///
    /// # Errors
    ///
    /// Returns [`EvoError::StructuralInvariantViolation`] if `id` is not a
    /// hidden node.
    pub fn remove_node(&self, id: NodeId) -> Result<Self> {
        if self.is_input(id) || self.is_output(id) || !self.activations.contains_key(&id) {
            return Err(EvoError::StructuralInvariantViolation(format!(
                "node {id} is not a hidden node"
            )));
        }

        let mut child = self.clone();
        child.edges.retain(|e| !e.touches(id));
        child.activations.remove(&id);
        let mut child = child.finish_edit()?;

        let stranded: Vec<NodeId> = child
            .hidden_ids()
            .into_iter()
            .filter(|&h| !child.edges.iter().any(|e| e.touches(h)))
            .collect();
        for node in &stranded {
            child.activations.remove(node);
        }
        if !stranded.is_empty() {
            debug!(?stranded, "delete_node: dropped stranded hidden nodes");
        }

        trace!(node = %id, "node deleted");
        Ok(child)
    }

    /// ChangeWeight on a uniformly chosen edge with a delta drawn from the
    /// gene range.
    ///
    /// # Errors
    ///
    /// See [`Genome::change_weight_at`].
    pub fn change_weight<R: Rng>(&self, rng: &mut R) -> Result<Self> {
        let Some(index) = select_uniform(self.edges.len(), rng) else {
            debug!("change_weight: genome has no edges");
            return Ok(self.clone());
        };
        let delta = self.config.random_gene_value(rng);
        self.change_weight_at(index, delta)
    }

    /// Add `delta` to the weight of the edge at `index`.
    ///
    /// # Errors
    ///
    /// Returns [`EvoError::StructuralInvariantViolation`] if `index` is out of
    /// range.
    pub fn change_weight_at(&self, index: usize, delta: f32) -> Result<Self> {
        if index >= self.edges.len() {
            return Err(EvoError::StructuralInvariantViolation(format!(
                "edge index {index} out of range for {} edges",
                self.edges.len()
            )));
        }
        let mut child = self.clone();
        child.edges[index].weight += delta;
        child.finish_edit()
    }
}
