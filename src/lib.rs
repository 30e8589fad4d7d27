//! # Symbios EvoNet
//!
//! Neuroevolution of variable-topology neural networks. Genomes are directed
//! weighted graphs of arbitrary, possibly recurrent, structure that grow and
//! shrink under adaptive structural pressure.
//!
//! ## Features
//!
//! - **Fixed-Point Propagation**: Cyclic networks are evaluated by repeated
//!   synchronous passes until the node signals stop changing
//! - **Pressure-Driven Mutation**: Dense genomes tend to gain nodes or lose
//!   connections, sparse ones gain connections
//! - **Gene-Alignment Crossover**: Genes are matched by their `(begin, end)`
//!   pair, with no global lineage tracking
//! - **Activity-Biased Sampling**: Active nodes attract new structure and
//!   dormant hidden nodes are pruned first
//! - **Adaptive Lock**: Node mutations freeze once the mean hidden-node count
//!   plateaus
//! - **Genotype Trait**: Implements `symbios_genetics::Genotype` for use with
//!   evolutionary algorithms
//!
//! ## Quick Start
//!
//! ```rust
//! use symbios_evonet::{
//!     EvoError, EvolutionConfig, Fitness, FitnessFunction, NodeId, Phenotype, Population,
//! };
//!
//! struct Half {
//!     inputs: Vec<NodeId>,
//!     outputs: Vec<NodeId>,
//! }
//!
//! impl FitnessFunction for Half {
//!     fn input_ids(&self) -> &[NodeId] {
//!         &self.inputs
//!     }
//!     fn output_ids(&self) -> &[NodeId] {
//!         &self.outputs
//!     }
//!     fn calculate(&self, phenotype: &mut Phenotype) -> Result<Fitness, EvoError> {
//!         phenotype.calculate(&[1.0])?;
//!         Ok(Fitness::new(-(phenotype.outputs()[0] - 0.5).abs()))
//!     }
//! }
//!
//! let config = EvolutionConfig {
//!     population_size: 20,
//!     generations_number: 10,
//!     ..EvolutionConfig::default().with_seed(42)
//! };
//! let fitness = Half {
//!     inputs: vec![NodeId(1)],
//!     outputs: vec![NodeId(2)],
//! };
//!
//! let mut population = Population::new(config, fitness)?;
//! population.run()?;
//! let best = population.best().expect("at least one generation ran");
//! println!("best fitness: {:?}", best.fitness);
//! # Ok::<(), EvoError>(())
//! ```
//!
//! ## Using with Symbios Genetics
//!
//! ```rust,ignore
//! use symbios_genetics::{Evaluator, Evolver, algorithms::simple::SimpleGA};
//! use symbios_evonet::{Genome, GenomeConfig, NodeId};
//!
//! struct Doubler;
//! impl Evaluator<Genome> for Doubler {
//!     fn evaluate(&self, genome: &Genome) -> (f32, Vec<f32>, Vec<f32>) {
//!         let Ok(mut phenotype) = genome.build_phenotype() else {
//!             return (f32::NEG_INFINITY, vec![], vec![]);
//!         };
//!         let error = match phenotype.calculate(&[0.25]) {
//!             Ok(_) => (phenotype.outputs()[0] - 0.5).abs(),
//!             Err(_) => f32::INFINITY,
//!         };
//!         (-error, vec![-error], vec![])
//!     }
//! }
//!
//! let mut rng = rand::rng();
//! let initial: Vec<Genome> = (0..100)
//!     .map(|_| Genome::fully_connected(&[NodeId(1)], &[NodeId(2)], GenomeConfig::default(), &mut rng))
//!     .collect();
//!
//! let mut ga = SimpleGA::new(initial, 0.3, 5, 42);
//! for _ in 0..100 {
//!     ga.step(&Doubler);
//! }
//! ```
//!
//! ## Architecture
//!
//! ### Genome and Phenotype
//!
//! A [`Genome`] is an edge list plus an activation map and never holds graph
//! pointers. Its [`Phenotype`] is built from it on demand and cached; every
//! structural operator returns a new genome, so the cache can never describe
//! stale edges.
//!
//! ### Node Ids
//!
//! Node ids are global and stable. Inputs and outputs use the ids declared by
//! the fitness function; hidden nodes take ids from a per-genome counter that
//! never goes backwards, so a deleted id is never handed out again.

pub mod activation;
pub mod config;
pub mod crossover;
pub mod error;
pub mod fitness;
pub mod gene;
pub mod genome;
pub mod mutation;
pub mod phenotype;
pub mod population;
pub mod sampling;
pub mod stats;

// Re-exports for convenience
pub use activation::Activation;
pub use config::EvolutionConfig;
pub use crossover::{blx_blend, crossover};
pub use error::{ConfigError, EvoError, Result};
pub use fitness::{Fitness, FitnessComparator, FitnessFunction};
pub use gene::{Edge, NodeId, SignalSlot};
pub use genome::{Genome, GenomeConfig};
pub use mutation::MutationKind;
pub use phenotype::{Node, NodeKey, NodeType, Phenotype};
pub use population::{Individual, NodeMutationLock, Population};
pub use sampling::{reverse_select_by_activity, select_by_activity, select_uniform};
pub use stats::GenerationStats;

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;
    use symbios_genetics::Genotype;

    fn ids(raw: &[u32]) -> Vec<NodeId> {
        raw.iter().copied().map(NodeId).collect()
    }

    #[test]
    fn test_genotype_trait_implementation() {
        let mut rng = ChaCha8Rng::seed_from_u64(42);
        let mut genome = Genome::fully_connected(
            &ids(&[1, 2]),
            &ids(&[3]),
            GenomeConfig::default(),
            &mut rng,
        );

        // Test mutation
        genome.mutate(&mut rng, 1.0);
        assert!(genome.validate().is_ok());

        // Test crossover
        let mut genome2 = genome.clone();
        genome2.mutate(&mut rng, 1.0);

        let child = genome.crossover(&genome2, &mut rng);
        assert_eq!(child.input_ids(), genome.input_ids());
        assert_eq!(child.output_ids(), genome.output_ids());
        assert!(child.validate().is_ok());
    }

    #[test]
    fn test_zero_rate_leaves_genome_untouched() {
        let mut rng = ChaCha8Rng::seed_from_u64(7);
        let mut genome =
            Genome::fully_connected(&ids(&[1]), &ids(&[2]), GenomeConfig::default(), &mut rng);
        let before = genome.edges().to_vec();
        genome.mutate(&mut rng, 0.0);
        assert_eq!(genome.edges(), before.as_slice());
    }

    #[test]
    fn test_serialization_roundtrip() {
        let mut rng = ChaCha8Rng::seed_from_u64(123);
        let genome = Genome::fully_connected(
            &ids(&[1, 2, 3]),
            &ids(&[4, 5]),
            GenomeConfig::default(),
            &mut rng,
        )
        .add_node_between(NodeId(1), NodeId(4), 0.5, -0.5)
        .unwrap();

        // Serialize
        let json = serde_json::to_string(&genome).expect("Serialization failed");

        // Deserialize
        let mut restored: Genome = serde_json::from_str(&json).expect("Deserialization failed");

        // Verify structure preserved
        assert_eq!(genome.edges(), restored.edges());
        assert_eq!(genome.hidden_ids(), restored.hidden_ids());
        assert_eq!(genome.next_node_id(), restored.next_node_id());
        assert_eq!(
            genome.build_phenotype().unwrap().weight_matrix(),
            restored.phenotype().unwrap().weight_matrix()
        );
    }

    #[test]
    fn test_stats_serialize() {
        let stats = GenerationStats {
            generation: 3,
            best_fitness: Fitness::with_extra(1.0, vec![2.0]),
            fitness_mean: 0.5,
            fitness_variance: 0.1,
            hidden_mean: 1.5,
            hidden_variance: 0.25,
            edges_mean: 4.0,
            edges_variance: 1.0,
            divergent_count: 0,
            nodes_locked: true,
        };
        let json = serde_json::to_string(&stats).expect("Serialization failed");
        let restored: GenerationStats = serde_json::from_str(&json).expect("Deserialization failed");
        assert_eq!(stats, restored);
    }
}
