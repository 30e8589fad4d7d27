//! Run-level evolution parameters.

use serde::{Deserialize, Serialize};

use crate::activation::Activation;
use crate::error::ConfigError;
use crate::fitness::FitnessComparator;
use crate::genome::GenomeConfig;

/// Parameters of an evolution run.
///
/// The fitness function is not part of the configuration; it is handed to
/// [`Population::new`](crate::Population::new) next to it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EvolutionConfig {
    /// Genomes per generation.
    pub population_size: usize,
    /// Generations executed by [`Population::run`](crate::Population::run).
    pub generations_number: usize,
    /// Contestants drawn (with replacement) per tournament.
    pub tournament_size: usize,
    /// Probability that a pair of selected genomes is recombined.
    pub crossover_rate: f32,
    /// Probability that a selected genome undergoes one structural mutation.
    pub mutation_rate: f32,
    /// Width of the interval new weights and weight deltas are drawn from.
    pub gene_value_range: f32,
    /// Lower end of that interval.
    pub min_gene_value: f32,
    /// Generations averaged when watching the mean hidden-node count.
    pub nodes_window_size: usize,
    /// Generations node mutations stay frozen once the lock engages.
    pub nodes_mutation_lock_time: usize,
    /// Relative change of the windowed hidden-node mean below which the lock engages.
    pub nodes_mutation_lock_threshold: f32,
    /// Bias node sampling by accumulated activity; uniform picks when unset.
    pub use_node_degrees: bool,
    /// AddNode wires the new node between two sampled nodes. When unset it
    /// is inserted alongside a random edge instead.
    pub use_add_single_node: bool,
    /// Copy the best genome of each generation into slot 0 of the next.
    pub use_elitism: bool,
    /// Seed of the run's random stream. Required.
    pub random_seed: Option<u64>,
    /// Lower fitness is better.
    pub minimize: bool,
    /// Compare the secondary metrics lexicographically before the primary value.
    pub multiobjective: bool,
    /// Activation of newly created hidden nodes.
    pub hidden_activation: Activation,
    /// Activation of output nodes.
    pub output_activation: Activation,
    /// Extension factor of BLX-alpha weight blending in crossover.
    pub blx_alpha: f32,
}

impl Default for EvolutionConfig {
    fn default() -> Self {
        let genome = GenomeConfig::default();
        Self {
            population_size: 100,
            generations_number: 100,
            tournament_size: 3,
            crossover_rate: 0.3,
            mutation_rate: 0.8,
            gene_value_range: genome.gene_value_range,
            min_gene_value: genome.min_gene_value,
            nodes_window_size: 10,
            nodes_mutation_lock_time: 20,
            nodes_mutation_lock_threshold: 0.01,
            use_node_degrees: genome.use_node_degrees,
            use_add_single_node: genome.use_add_single_node,
            use_elitism: true,
            random_seed: None,
            minimize: false,
            multiobjective: false,
            hidden_activation: genome.hidden_activation,
            output_activation: genome.output_activation,
            blx_alpha: genome.blx_alpha,
        }
    }
}

impl EvolutionConfig {
    /// Set the seed of the run's random stream.
    #[must_use]
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.random_seed = Some(seed);
        self
    }

    /// Check every parameter.
    ///
    /// # Errors
    ///
    /// Returns the first [`ConfigError`] found.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.random_seed.is_none() {
            return Err(ConfigError::MissingRandomSource);
        }

        for (name, value) in [
            ("population_size", self.population_size),
            ("generations_number", self.generations_number),
            ("tournament_size", self.tournament_size),
            ("nodes_window_size", self.nodes_window_size),
            ("nodes_mutation_lock_time", self.nodes_mutation_lock_time),
        ] {
            if value == 0 {
                return Err(ConfigError::NonPositive(name));
            }
        }

        for (name, value) in [
            ("crossover_rate", self.crossover_rate),
            ("mutation_rate", self.mutation_rate),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(ConfigError::InvalidRate { name, value });
            }
        }

        for (name, value) in [
            ("gene_value_range", self.gene_value_range),
            ("min_gene_value", self.min_gene_value),
            ("nodes_mutation_lock_threshold", self.nodes_mutation_lock_threshold),
            ("blx_alpha", self.blx_alpha),
        ] {
            if !value.is_finite() {
                return Err(ConfigError::NonFinite(name));
            }
        }
        if self.gene_value_range <= 0.0 {
            return Err(ConfigError::NonPositive("gene_value_range"));
        }
        if self.nodes_mutation_lock_threshold < 0.0 {
            return Err(ConfigError::NonPositive("nodes_mutation_lock_threshold"));
        }
        if self.blx_alpha < 0.0 {
            return Err(ConfigError::NonPositive("blx_alpha"));
        }
        Ok(())
    }

    /// Structural defaults handed to every genome of the run.
    #[must_use]
    pub fn genome_config(&self) -> GenomeConfig {
        GenomeConfig {
            hidden_activation: self.hidden_activation,
            output_activation: self.output_activation,
            min_gene_value: self.min_gene_value,
            gene_value_range: self.gene_value_range,
            use_node_degrees: self.use_node_degrees,
            use_add_single_node: self.use_add_single_node,
            blx_alpha: self.blx_alpha,
        }
    }

    /// The comparator for this run's optimization mode.
    #[must_use]
    pub const fn comparator(&self) -> FitnessComparator {
        FitnessComparator::new(self.minimize, self.multiobjective)
    }
}
