//! Materialized networks and fixed-point signal propagation.
//!
//! A [`Phenotype`] is built from a genome's edge list and activation map. It
//! stores its nodes in a `SlotMap` arena indexed by global [`NodeId`], so
//! isolated nodes can be pruned after construction without invalidating the
//! remaining handles.
//!
//! ## Propagation
//!
//! Networks may be recurrent, so there is no topological order to follow.
//! Instead every node fires synchronously from the current *environment* (the
//! map of published node signals), the results are scattered into a fresh
//! environment, and the process repeats until two successive environments are
//! identical or `node_count` passes have run. Feed-forward graphs settle after
//! at most `depth + 1` passes.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use slotmap::{new_key_type, SlotMap};
use tracing::trace;

use crate::activation::Activation;
use crate::error::{EvoError, Result};
use crate::gene::{Edge, NodeId, SignalSlot};

new_key_type! {
    /// Arena handle of a node inside one phenotype.
    pub struct NodeKey;
}

/// The role of a node in the network.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NodeType {
    /// Receives external values and publishes them unchanged.
    Input,
    /// Internal node created by structural mutation.
    Hidden,
    /// Produces a network output.
    Output,
}

/// A materialized neuron.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Node {
    /// Global id of this node.
    pub index: NodeId,
    /// Role of this node.
    pub node_type: NodeType,
    /// Bias added to the weighted input sum before activation.
    pub bias: f32,
    /// Activation applied to the biased input sum.
    pub activation: Activation,
    /// Incoming wiring, one slot per source node.
    pub inputs: Vec<SignalSlot>,
    /// Outgoing wiring; every node publishes under its own id.
    pub outputs: Vec<SignalSlot>,
    /// Output of the most recent pass.
    pub output: f32,
    /// Cumulative `|output|` since the last build or reset.
    pub total_activity: f32,
}

impl Node {
    fn new(index: NodeId, node_type: NodeType, activation: Activation) -> Self {
        Self {
            index,
            node_type,
            bias: 0.0,
            activation,
            inputs: Vec::new(),
            outputs: Vec::new(),
            output: 0.0,
            total_activity: 0.0,
        }
    }

    /// Create an input node (identity pass-through).
    #[must_use]
    pub fn input(index: NodeId) -> Self {
        Self::new(index, NodeType::Input, Activation::Identity)
    }

    /// Create an output node with its self-id output slot.
    #[must_use]
    pub fn output(index: NodeId, activation: Activation) -> Self {
        let mut node = Self::new(index, NodeType::Output, activation);
        node.outputs.push(SignalSlot::new(index, 1.0));
        node
    }

    /// Create a hidden node.
    #[must_use]
    pub fn hidden(index: NodeId, activation: Activation) -> Self {
        Self::new(index, NodeType::Hidden, activation)
    }

    /// A node with no wiring at all.
    #[must_use]
    pub fn is_isolated(&self) -> bool {
        self.inputs.is_empty() && self.outputs.is_empty()
    }

    fn advertise_self(&mut self) {
        if !self.outputs.iter().any(|slot| slot.id == self.index) {
            self.outputs.push(SignalSlot::new(self.index, 1.0));
        }
    }

    fn connect_from(&mut self, source: NodeId, weight: f32) {
        match self.inputs.iter_mut().find(|slot| slot.id == source) {
            Some(slot) => slot.weight += weight,
            None => self.inputs.push(SignalSlot::new(source, weight)),
        }
    }

    /// Compute this node's output from the current environment.
    fn fire(&mut self, environment: &BTreeMap<NodeId, f32>) -> f32 {
        if self.node_type == NodeType::Input {
            return environment.get(&self.index).copied().unwrap_or(0.0);
        }

        let mut sum = self.bias;
        for slot in &mut self.inputs {
            slot.value = environment.get(&slot.id).copied().unwrap_or(0.0);
            sum += slot.value * slot.weight;
        }
        self.activation.apply(sum)
    }
}

/// A materialized, propagatable network.
///
/// Built by [`Phenotype::build`] and never edited structurally afterwards:
/// structural changes happen on the genome, which builds a new phenotype.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Phenotype {
    nodes: SlotMap<NodeKey, Node>,
    index: BTreeMap<NodeId, NodeKey>,
    input_ids: Vec<NodeId>,
    output_ids: Vec<NodeId>,
    hidden_count: usize,
    environment: BTreeMap<NodeId, f32>,
}

impl Phenotype {
    /// Build a phenotype from an edge list.
    ///
    /// Input nodes are identity pass-throughs; output and hidden nodes take
    /// their activation from `activations`. Disabled edges are skipped, edges
    /// repeating a `(begin, end)` pair accumulate into one input slot, and
    /// nodes left without any slot are pruned.
    ///
    /// # Errors
    ///
    /// Returns [`EvoError::StructuralInvariantViolation`] if an output id or an
    /// edge endpoint has no registered activation.
    pub fn build(
        input_ids: &[NodeId],
        output_ids: &[NodeId],
        edges: &[Edge],
        activations: &BTreeMap<NodeId, Activation>,
    ) -> Result<Self> {
        let mut phenotype = Self {
            nodes: SlotMap::with_capacity_and_key(input_ids.len() + output_ids.len()),
            index: BTreeMap::new(),
            input_ids: input_ids.to_vec(),
            output_ids: output_ids.to_vec(),
            hidden_count: 0,
            environment: BTreeMap::new(),
        };

        for &id in input_ids {
            phenotype.insert(Node::input(id));
        }
        for &id in output_ids {
            let activation = activations.get(&id).copied().ok_or_else(|| {
                EvoError::StructuralInvariantViolation(format!(
                    "output node {id} has no registered activation"
                ))
            })?;
            phenotype.insert(Node::output(id, activation));
        }

        for edge in edges.iter().filter(|e| e.enabled) {
            let begin = phenotype.ensure_node(edge.begin, activations)?;
            phenotype.nodes[begin].advertise_self();
            let end = phenotype.ensure_node(edge.end, activations)?;
            phenotype.nodes[end].connect_from(edge.begin, edge.weight);
        }

        let isolated: Vec<NodeId> = phenotype
            .index
            .iter()
            .filter(|(_, &key)| phenotype.nodes[key].is_isolated())
            .map(|(&id, _)| id)
            .collect();
        for id in isolated {
            if let Some(key) = phenotype.index.remove(&id) {
                phenotype.nodes.remove(key);
            }
        }

        phenotype.hidden_count = phenotype
            .nodes
            .values()
            .filter(|n| n.node_type == NodeType::Hidden)
            .count();

        trace!(
            nodes = phenotype.nodes.len(),
            hidden = phenotype.hidden_count,
            "phenotype built"
        );
        Ok(phenotype)
    }

    fn insert(&mut self, node: Node) -> NodeKey {
        let id = node.index;
        let key = self.nodes.insert(node);
        self.index.insert(id, key);
        key
    }

    fn ensure_node(
        &mut self,
        id: NodeId,
        activations: &BTreeMap<NodeId, Activation>,
    ) -> Result<NodeKey> {
        if let Some(&key) = self.index.get(&id) {
            return Ok(key);
        }
        let activation = activations.get(&id).copied().ok_or_else(|| {
            EvoError::StructuralInvariantViolation(format!(
                "edge references node {id}, which is neither an input, an output nor registered"
            ))
        })?;
        Ok(self.insert(Node::hidden(id, activation)))
    }

    /// Propagate `inputs` until the environment reaches a fixed point.
    ///
    /// Runs at most `node_count` passes. When `update_inputs` is false the
    /// given input values are re-imposed after every pass; otherwise the
    /// network may overwrite them. Returns the number of passes performed.
    ///
    /// # Errors
    ///
    /// - [`EvoError::InputMismatch`] if `inputs` does not match the input ids
    /// - [`EvoError::PropagationDivergence`] if the distance between two
    ///   successive environments is not finite
    pub fn propagate(&mut self, inputs: &[f32], update_inputs: bool) -> Result<usize> {
        if inputs.len() != self.input_ids.len() {
            return Err(EvoError::InputMismatch {
                expected: self.input_ids.len(),
                actual: inputs.len(),
            });
        }

        for node in self.nodes.values_mut() {
            node.output = 0.0;
        }

        let mut environment: BTreeMap<NodeId, f32> = self
            .input_ids
            .iter()
            .copied()
            .zip(inputs.iter().copied())
            .collect();

        let max_passes = self.nodes.len().max(1);
        let mut passes = 0;
        while passes < max_passes {
            passes += 1;

            let mut next = BTreeMap::new();
            for &key in self.index.values() {
                let node = &mut self.nodes[key];
                let output = node.fire(&environment);
                node.output = output;
                node.total_activity += output.abs();
                for slot in &mut node.outputs {
                    slot.value = output;
                    *next.entry(slot.id).or_insert(0.0) += output * slot.weight;
                }
            }

            if !update_inputs {
                for (&id, &value) in self.input_ids.iter().zip(inputs) {
                    next.insert(id, value);
                }
            }

            let distance = environment_distance(&environment, &next);
            environment = next;
            if !distance.is_finite() {
                self.environment = environment;
                return Err(EvoError::PropagationDivergence { passes });
            }
            if distance == 0.0 {
                break;
            }
        }

        self.environment = environment;
        Ok(passes)
    }

    /// Propagate `inputs`, holding the input values fixed.
    ///
    /// # Errors
    ///
    /// See [`Phenotype::propagate`].
    pub fn calculate(&mut self, inputs: &[f32]) -> Result<usize> {
        self.propagate(inputs, false)
    }

    /// Output signals of the last propagation, ordered by output ids.
    #[must_use]
    pub fn outputs(&self) -> Vec<f32> {
        self.output_ids
            .iter()
            .map(|id| self.environment.get(id).copied().unwrap_or(0.0))
            .collect()
    }

    /// The environment left by the last propagation.
    #[must_use]
    pub const fn environment(&self) -> &BTreeMap<NodeId, f32> {
        &self.environment
    }

    /// Ordered input ids.
    #[must_use]
    pub fn input_ids(&self) -> &[NodeId] {
        &self.input_ids
    }

    /// Ordered output ids.
    #[must_use]
    pub fn output_ids(&self) -> &[NodeId] {
        &self.output_ids
    }

    /// Number of materialized nodes.
    #[must_use]
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Number of materialized hidden nodes.
    #[must_use]
    pub const fn hidden_count(&self) -> usize {
        self.hidden_count
    }

    /// Whether a node with this id survived the build.
    #[must_use]
    pub fn contains(&self, id: NodeId) -> bool {
        self.index.contains_key(&id)
    }

    /// Look up a node by global id.
    #[must_use]
    pub fn node(&self, id: NodeId) -> Option<&Node> {
        self.index.get(&id).map(|&key| &self.nodes[key])
    }

    /// Ids of all materialized nodes, ascending.
    pub fn node_ids(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.index.keys().copied()
    }

    /// All materialized nodes in ascending id order.
    pub fn nodes(&self) -> impl Iterator<Item = &Node> + '_ {
        self.index.values().map(|&key| &self.nodes[key])
    }

    /// Activity of each id in `ids`; absent nodes report 0.
    #[must_use]
    pub fn activities(&self, ids: &[NodeId]) -> Vec<f32> {
        ids.iter()
            .map(|&id| self.node(id).map_or(0.0, |n| n.total_activity))
            .collect()
    }

    /// Clear the accumulated activity of every node.
    pub fn reset_activity(&mut self) {
        for node in self.nodes.values_mut() {
            node.total_activity = 0.0;
        }
    }

    /// Dense weight matrix over [`Phenotype::node_ids`] order.
    ///
    /// Entry `[i][j]` is the weight of the connection from node `i` to node `j`.
    #[must_use]
    pub fn weight_matrix(&self) -> Vec<Vec<f32>> {
        let ids: Vec<NodeId> = self.node_ids().collect();
        let mut matrix = vec![vec![0.0; ids.len()]; ids.len()];
        for (j, node) in self.nodes().enumerate() {
            for slot in &node.inputs {
                if let Ok(i) = ids.binary_search(&slot.id) {
                    matrix[i][j] = slot.weight;
                }
            }
        }
        matrix
    }
}

/// Euclidean distance, accumulated in `f64`: the square of any finite `f32`
/// signal is finite there.
fn environment_distance(a: &BTreeMap<NodeId, f32>, b: &BTreeMap<NodeId, f32>) -> f64 {
    let mut sum = 0.0_f64;
    for (id, &va) in a {
        let vb = b.get(id).copied().unwrap_or(0.0);
        let d = f64::from(va) - f64::from(vb);
        sum += d * d;
    }
    for (id, &vb) in b {
        if !a.contains_key(id) {
            sum += f64::from(vb) * f64::from(vb);
        }
    }
    sum.sqrt()
}
