//! Genome representation: an edge list plus an activation map.
//!
//! A [`Genome`] is independent of any built network. Its [`Phenotype`] is a
//! derived view, built on demand and cached; every operator that changes the
//! genome produces a new genome, so a cached phenotype can never drift out of
//! sync with the edges it was built from.

use std::collections::{BTreeMap, HashMap, HashSet};

use rand::Rng;
use serde::{Deserialize, Serialize};
use symbios_genetics::Genotype;
use tracing::warn;

use crate::activation::Activation;
use crate::error::{EvoError, Result};
use crate::gene::{Edge, NodeId};
use crate::phenotype::Phenotype;

/// Structural defaults carried by every genome.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenomeConfig {
    /// Activation registered for nodes created by AddNode.
    pub hidden_activation: Activation,
    /// Activation of output nodes.
    pub output_activation: Activation,
    /// Lower bound of initial weights and weight perturbations.
    pub min_gene_value: f32,
    /// Width of the interval `[min_gene_value, min_gene_value + gene_value_range)`.
    pub gene_value_range: f32,
    /// Bias node choices by activity instead of sampling uniformly.
    pub use_node_degrees: bool,
    /// AddNode samples both endpoints independently. When false, it inserts
    /// the new node alongside an existing edge instead.
    pub use_add_single_node: bool,
    /// BLX-alpha extension factor used when blending matching genes.
    pub blx_alpha: f32,
}

impl Default for GenomeConfig {
    fn default() -> Self {
        Self {
            hidden_activation: Activation::Sigmoid,
            output_activation: Activation::Sigmoid,
            min_gene_value: -1.0,
            gene_value_range: 2.0,
            use_node_degrees: true,
            use_add_single_node: true,
            blx_alpha: 0.5,
        }
    }
}

impl GenomeConfig {
    /// Draw a value uniformly from `[min_gene_value, min_gene_value + gene_value_range)`.
    pub fn random_gene_value<R: Rng>(&self, rng: &mut R) -> f32 {
        rng.random::<f32>().mul_add(self.gene_value_range, self.min_gene_value)
    }
}

/// Structural and weight description of a network.
///
/// Invariants, checked by [`Genome::validate`]:
/// - no two edges share a `(begin, end)` identity
/// - every edge endpoint is an input id, an output id or a key of the
///   activation map
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Genome {
    pub(crate) edges: Vec<Edge>,
    pub(crate) activations: BTreeMap<NodeId, Activation>,
    pub(crate) input_ids: Vec<NodeId>,
    pub(crate) output_ids: Vec<NodeId>,
    /// Next hidden id to hand out; never decreases, so deleted ids are not reused.
    pub(crate) next_node_id: NodeId,
    /// Structural defaults inherited by offspring.
    #[serde(default)]
    pub config: GenomeConfig,
    #[serde(skip)]
    pub(crate) phenotype: Option<Phenotype>,
}

impl Genome {
    /// Create a genome with input and output nodes but no edges.
    #[must_use]
    pub fn minimal(input_ids: &[NodeId], output_ids: &[NodeId], config: GenomeConfig) -> Self {
        let activations = output_ids
            .iter()
            .map(|&id| (id, config.output_activation))
            .collect();

        let mut genome = Self {
            edges: Vec::new(),
            activations,
            input_ids: input_ids.to_vec(),
            output_ids: output_ids.to_vec(),
            next_node_id: NodeId(0),
            config,
            phenotype: None,
        };
        genome.next_node_id = genome.max_node_id().map_or(NodeId(0), NodeId::next);
        genome
    }

    /// Create a genome with every input connected to every output and no
    /// hidden nodes. Weights are drawn from the configured gene range.
    #[must_use]
    pub fn fully_connected<R: Rng>(
        input_ids: &[NodeId],
        output_ids: &[NodeId],
        config: GenomeConfig,
        rng: &mut R,
    ) -> Self {
        let mut genome = Self::minimal(input_ids, output_ids, config);
        for &input in input_ids {
            for &output in output_ids {
                let weight = genome.config.random_gene_value(rng);
                genome.edges.push(Edge::new(input, output, weight));
            }
        }
        genome
    }

    /// Create a genome from an explicit edge list.
    ///
    /// `hidden` registers the activation of every hidden node the edges use.
    ///
    /// # Errors
    ///
    /// Returns [`EvoError::StructuralInvariantViolation`] if the result breaks
    /// a genome invariant.
    pub fn from_edges(
        input_ids: &[NodeId],
        output_ids: &[NodeId],
        edges: Vec<Edge>,
        hidden: impl IntoIterator<Item = (NodeId, Activation)>,
        config: GenomeConfig,
    ) -> Result<Self> {
        let mut genome = Self::minimal(input_ids, output_ids, config);
        genome.edges = edges;
        genome.activations.extend(hidden);
        genome.next_node_id = genome.max_node_id().map_or(NodeId(0), NodeId::next);
        genome.validate()?;
        Ok(genome)
    }

    /// Check the genome invariants.
    ///
    /// # Errors
    ///
    /// Returns [`EvoError::StructuralInvariantViolation`] naming the first
    /// violation found.
    pub fn validate(&self) -> Result<()> {
        let mut io = HashSet::with_capacity(self.input_ids.len() + self.output_ids.len());
        for &id in self.input_ids.iter().chain(&self.output_ids) {
            if !io.insert(id) {
                return Err(EvoError::StructuralInvariantViolation(format!(
                    "node {id} is declared twice among inputs and outputs"
                )));
            }
        }
        if self.max_node_id() == Some(NodeId::MAX) {
            return Err(EvoError::StructuralInvariantViolation(format!(
                "node id {} is reserved",
                NodeId::MAX
            )));
        }
        for id in &self.output_ids {
            if !self.activations.contains_key(id) {
                return Err(EvoError::StructuralInvariantViolation(format!(
                    "output node {id} has no activation"
                )));
            }
        }

        let mut seen = HashSet::with_capacity(self.edges.len());
        for edge in &self.edges {
            if !seen.insert(edge.key()) {
                return Err(EvoError::StructuralInvariantViolation(format!(
                    "duplicate edge {} -> {}",
                    edge.begin, edge.end
                )));
            }
            for id in [edge.begin, edge.end] {
                if !self.contains_node(id) {
                    return Err(EvoError::StructuralInvariantViolation(format!(
                        "edge {} -> {} references unknown node {id}",
                        edge.begin, edge.end
                    )));
                }
            }
        }
        Ok(())
    }

    /// The edge list.
    #[must_use]
    pub fn edges(&self) -> &[Edge] {
        &self.edges
    }

    /// Activations of output and hidden nodes.
    #[must_use]
    pub const fn activations(&self) -> &BTreeMap<NodeId, Activation> {
        &self.activations
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

    /// The id the next AddNode will allocate.
    #[must_use]
    pub const fn next_node_id(&self) -> NodeId {
        self.next_node_id
    }

    /// Number of edges.
    #[must_use]
    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    /// Whether `id` is one of the declared inputs.
    #[must_use]
    pub fn is_input(&self, id: NodeId) -> bool {
        self.input_ids.contains(&id)
    }

    /// Whether `id` is one of the declared outputs.
    #[must_use]
    pub fn is_output(&self, id: NodeId) -> bool {
        self.output_ids.contains(&id)
    }

    /// Whether `id` is an input, an output or a registered hidden node.
    #[must_use]
    pub fn contains_node(&self, id: NodeId) -> bool {
        self.is_input(id) || self.activations.contains_key(&id)
    }

    /// Registered hidden node ids, ascending.
    #[must_use]
    pub fn hidden_ids(&self) -> Vec<NodeId> {
        self.activations
            .keys()
            .copied()
            .filter(|&id| !self.is_output(id) && !self.is_input(id))
            .collect()
    }

    /// Number of registered hidden nodes.
    #[must_use]
    pub fn hidden_count(&self) -> usize {
        self.hidden_ids().len()
    }

    /// Inputs, outputs and hidden nodes.
    #[must_use]
    pub fn neuron_count(&self) -> usize {
        self.input_ids.len() + self.output_ids.len() + self.hidden_count()
    }

    /// Largest node id known to this genome.
    #[must_use]
    pub fn max_node_id(&self) -> Option<NodeId> {
        self.input_ids
            .iter()
            .chain(&self.output_ids)
            .chain(self.activations.keys())
            .copied()
            .chain(self.edges.iter().flat_map(|e| [e.begin, e.end]))
            .max()
    }

    /// Node ids that may start a connection: inputs, then hidden nodes.
    #[must_use]
    pub fn non_output_ids(&self) -> Vec<NodeId> {
        let mut ids = self.input_ids.clone();
        ids.extend(self.hidden_ids());
        ids
    }

    /// Node ids that may end a connection: hidden nodes, then outputs.
    #[must_use]
    pub fn non_input_ids(&self) -> Vec<NodeId> {
        let mut ids = self.hidden_ids();
        ids.extend_from_slice(&self.output_ids);
        ids
    }

    /// Number of distinct edges AddConnection could ever create.
    ///
    /// Sources are inputs and hidden nodes, targets are hidden nodes and
    /// outputs, and a hidden node is never connected to itself.
    #[must_use]
    pub fn max_possible_edges(&self) -> usize {
        let hidden = self.hidden_count();
        let sources = self.input_ids.len() + hidden;
        let targets = hidden + self.output_ids.len();
        (sources * targets).saturating_sub(hidden)
    }

    /// Connection pressure: `(edges / max_possible_edges)^2`, capped at 1.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn conn_factor(&self) -> f32 {
        let max = self.max_possible_edges();
        if self.edges.is_empty() || max == 0 {
            return 0.0;
        }
        let ratio = (self.edges.len() as f32 / max as f32).min(1.0);
        ratio * ratio
    }

    /// Node pressure: `((inputs + outputs) / total_nodes)^2 * conn_factor`.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn node_factor(&self) -> f32 {
        let total = self.neuron_count();
        if total == 0 {
            return 0.0;
        }
        let io = (self.input_ids.len() + self.output_ids.len()) as f32 / total as f32;
        io * io * self.conn_factor()
    }

    /// Position of the edge with the given identity.
    #[must_use]
    pub fn find_edge(&self, begin: NodeId, end: NodeId) -> Option<usize> {
        self.edges.iter().position(|e| e.begin == begin && e.end == end)
    }

    /// Map from gene identity to position in the edge list.
    #[must_use]
    pub fn edge_index(&self) -> HashMap<(NodeId, NodeId), usize> {
        self.edges
            .iter()
            .enumerate()
            .map(|(i, e)| (e.key(), i))
            .collect()
    }

    /// Build a fresh phenotype without touching the cache.
    ///
    /// # Errors
    ///
    /// Returns [`EvoError::StructuralInvariantViolation`] if an edge endpoint
    /// is unknown.
    pub fn build_phenotype(&self) -> Result<Phenotype> {
        Phenotype::build(
            &self.input_ids,
            &self.output_ids,
            &self.edges,
            &self.activations,
        )
    }

    /// Rebuild and cache the phenotype.
    ///
    /// # Errors
    ///
    /// See [`Genome::build_phenotype`].
    pub fn rebuild(&mut self) -> Result<&mut Phenotype> {
        let phenotype = self.build_phenotype()?;
        Ok(self.phenotype.insert(phenotype))
    }

    /// The cached phenotype, building it first if the genome is dirty.
    ///
    /// Propagating through the returned phenotype accumulates node activity,
    /// which later biases mutation choices on this genome.
    ///
    /// # Errors
    ///
    /// See [`Genome::build_phenotype`].
    pub fn phenotype(&mut self) -> Result<&mut Phenotype> {
        let phenotype = match self.phenotype.take() {
            Some(phenotype) => phenotype,
            None => self.build_phenotype()?,
        };
        Ok(self.phenotype.insert(phenotype))
    }

    /// The cached phenotype, if one has been built.
    #[must_use]
    pub const fn cached_phenotype(&self) -> Option<&Phenotype> {
        self.phenotype.as_ref()
    }

    /// Whether the phenotype must be rebuilt before evaluation.
    #[must_use]
    pub const fn is_dirty(&self) -> bool {
        self.phenotype.is_none()
    }

    /// Accumulated activity of `ids` in the cached phenotype; zeros when dirty.
    #[must_use]
    pub fn activities(&self, ids: &[NodeId]) -> Vec<f32> {
        self.phenotype
            .as_ref()
            .map_or_else(|| vec![0.0; ids.len()], |p| p.activities(ids))
    }
}

impl Genotype for Genome {
    fn mutate<R: Rng>(&mut self, rng: &mut R, rate: f32) {
        if rng.random::<f32>() >= rate {
            return;
        }
        match self.mutate_structure(rng, false) {
            Ok(child) => *self = child,
            Err(err) => warn!(%err, "structural mutation discarded"),
        }
    }

    /// Returns the child sourced from `self`.
    fn crossover<R: Rng>(&self, other: &Self, rng: &mut R) -> Self {
        match crate::crossover::crossover(self, other, rng) {
            // The first child is sourced from the parent with more edges
            Ok((_, child)) if other.edge_count() > self.edge_count() => child,
            Ok((child, _)) => child,
            Err(err) => {
                warn!(%err, "crossover discarded");
                self.clone()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    fn test_rng() -> ChaCha8Rng {
        ChaCha8Rng::seed_from_u64(42)
    }

    fn ids(raw: &[u32]) -> Vec<NodeId> {
        raw.iter().copied().map(NodeId).collect()
    }

    #[test]
    fn test_minimal_genome() {
        let genome = Genome::minimal(&ids(&[1, 2, 3]), &ids(&[4, 5]), GenomeConfig::default());

        assert_eq!(genome.input_ids().len(), 3);
        assert_eq!(genome.output_ids().len(), 2);
        assert_eq!(genome.edge_count(), 0);
        assert_eq!(genome.hidden_count(), 0);
        assert_eq!(genome.next_node_id(), NodeId(6));
        assert!(genome.is_dirty());
    }

    #[test]
    fn test_fully_connected_genome() {
        let mut rng = test_rng();
        let genome =
            Genome::fully_connected(&ids(&[1, 2]), &ids(&[3, 4]), GenomeConfig::default(), &mut rng);

        assert_eq!(genome.edge_count(), 4);
        assert!(genome.validate().is_ok());
        for edge in genome.edges() {
            assert!((-1.0..1.0).contains(&edge.weight));
        }
    }

    #[test]
    fn test_from_edges_rejects_duplicates() {
        let result = Genome::from_edges(
            &ids(&[1]),
            &ids(&[2]),
            vec![Edge::new(1, 2, 0.1), Edge::new(1, 2, 0.2)],
            [],
            GenomeConfig::default(),
        );
        assert!(matches!(
            result,
            Err(EvoError::StructuralInvariantViolation(_))
        ));
    }

    #[test]
    fn test_from_edges_rejects_unknown_nodes() {
        let result = Genome::from_edges(
            &ids(&[1]),
            &ids(&[2]),
            vec![Edge::new(1, 7, 0.1)],
            [],
            GenomeConfig::default(),
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_from_edges_allocates_past_max_id() {
        let genome = Genome::from_edges(
            &ids(&[1]),
            &ids(&[2]),
            vec![Edge::new(1, 9, 0.1), Edge::new(9, 2, 0.2)],
            [(NodeId(9), Activation::Tanh)],
            GenomeConfig::default(),
        )
        .unwrap();
        assert_eq!(genome.hidden_ids(), vec![NodeId(9)]);
        assert_eq!(genome.next_node_id(), NodeId(10));
        assert_eq!(genome.neuron_count(), 3);
    }

    #[test]
    fn test_reserved_node_id_is_rejected() {
        let genome = Genome::minimal(&ids(&[1]), &[NodeId::MAX], GenomeConfig::default());
        assert_eq!(genome.next_node_id(), NodeId::MAX);
        assert!(matches!(
            genome.validate(),
            Err(EvoError::StructuralInvariantViolation(_))
        ));
        assert!(Genome::from_edges(
            &ids(&[1]),
            &[NodeId::MAX],
            vec![Edge::new(1, u32::MAX, 0.5)],
            [],
            GenomeConfig::default(),
        )
        .is_err());
        assert!(genome
            .add_node_between(NodeId(1), NodeId::MAX, 0.3, 0.4)
            .is_err());
    }

    #[test]
    fn test_genotype_crossover_keeps_self_as_source() {
        let mut rng = test_rng();
        let sparse = Genome::from_edges(
            &ids(&[1]),
            &ids(&[2]),
            vec![Edge::new(1, 2, 0.5)],
            [],
            GenomeConfig {
                blx_alpha: 0.1,
                ..GenomeConfig::default()
            },
        )
        .unwrap();
        let dense = sparse
            .add_node_between(NodeId(1), NodeId(2), 0.3, 0.4)
            .unwrap();
        let dense = Genome {
            config: GenomeConfig::default(),
            ..dense
        };

        let child = Genotype::crossover(&sparse, &dense, &mut rng);
        assert_eq!(child.config, sparse.config);
        let child = Genotype::crossover(&dense, &sparse, &mut rng);
        assert_eq!(child.config, dense.config);
    }

    #[test]
    fn test_pressure_factors() {
        let empty = Genome::minimal(&ids(&[1, 2]), &ids(&[3]), GenomeConfig::default());
        assert_eq!(empty.conn_factor(), 0.0);
        assert_eq!(empty.node_factor(), 0.0);

        let mut rng = test_rng();
        let full =
            Genome::fully_connected(&ids(&[1, 2]), &ids(&[3]), GenomeConfig::default(), &mut rng);
        assert_eq!(full.max_possible_edges(), 2);
        assert!((full.conn_factor() - 1.0).abs() < 1e-6);
        assert!((full.node_factor() - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_phenotype_is_cached_until_rebuilt() {
        let mut rng = test_rng();
        let mut genome =
            Genome::fully_connected(&ids(&[1]), &ids(&[2]), GenomeConfig::default(), &mut rng);
        assert!(genome.is_dirty());

        genome.phenotype().unwrap().calculate(&[1.0]).unwrap();
        assert!(!genome.is_dirty());
        let activity = genome.activities(&ids(&[1]));
        assert!(activity[0] > 0.0);

        // A rebuild starts from a clean slate
        genome.rebuild().unwrap();
        assert_eq!(genome.activities(&ids(&[1]))[0], 0.0);
    }

    #[test]
    fn test_clone_does_not_share_phenotype() {
        let mut rng = test_rng();
        let mut genome =
            Genome::fully_connected(&ids(&[1]), &ids(&[2]), GenomeConfig::default(), &mut rng);
        genome.phenotype().unwrap();

        let mut copy = genome.clone();
        copy.phenotype().unwrap().calculate(&[3.0]).unwrap();

        assert_eq!(genome.activities(&ids(&[1]))[0], 0.0);
        assert!(copy.activities(&ids(&[1]))[0] > 0.0);
    }

    #[test]
    fn test_serialization_roundtrip_drops_cache() {
        let mut rng = test_rng();
        let mut genome =
            Genome::fully_connected(&ids(&[1, 2]), &ids(&[3]), GenomeConfig::default(), &mut rng);
        genome.phenotype().unwrap();

        let json = serde_json::to_string(&genome).expect("Serialization failed");
        let restored: Genome = serde_json::from_str(&json).expect("Deserialization failed");

        assert_eq!(restored.edges(), genome.edges());
        assert_eq!(restored.activations(), genome.activations());
        assert_eq!(restored.next_node_id(), genome.next_node_id());
        assert!(restored.is_dirty());
    }
}
