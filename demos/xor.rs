//! XOR example driven by the built-in population controller.
//!
//! Evolves a recurrent-capable network to solve XOR. A third input carries a
//! constant 1.0 that acts as a bias signal.
//!
//! Run with: `RUST_LOG=info cargo run --example xor`

use symbios_evonet::{
    Activation, EvoError, EvolutionConfig, Fitness, FitnessFunction, NodeId, Phenotype, Population,
};
use tracing_subscriber::EnvFilter;

const CASES: [([f32; 2], f32); 4] = [
    ([0.0, 0.0], 0.0),
    ([0.0, 1.0], 1.0),
    ([1.0, 0.0], 1.0),
    ([1.0, 1.0], 0.0),
];

/// XOR fitness: `4 - squared error`, so 4.0 is a perfect solution.
struct XorFitness {
    inputs: Vec<NodeId>,
    outputs: Vec<NodeId>,
}

impl XorFitness {
    fn new() -> Self {
        Self {
            inputs: vec![NodeId(1), NodeId(2), NodeId(3)],
            outputs: vec![NodeId(4)],
        }
    }
}

impl FitnessFunction for XorFitness {
    fn input_ids(&self) -> &[NodeId] {
        &self.inputs
    }

    fn output_ids(&self) -> &[NodeId] {
        &self.outputs
    }

    fn calculate(&self, phenotype: &mut Phenotype) -> Result<Fitness, EvoError> {
        let mut error = 0.0;
        for ([a, b], expected) in CASES {
            phenotype.calculate(&[a, b, 1.0])?;
            error += (phenotype.outputs()[0] - expected).powi(2);
        }
        Ok(Fitness::new(4.0 - error))
    }
}

fn main() -> Result<(), EvoError> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    println!("EvoNet XOR Example");
    println!("==================\n");

    let config = EvolutionConfig {
        population_size: 150,
        generations_number: 300,
        tournament_size: 4,
        crossover_rate: 0.3,
        mutation_rate: 0.9,
        hidden_activation: Activation::Tanh,
        output_activation: Activation::Sigmoid,
        ..EvolutionConfig::default().with_seed(42)
    };

    println!("Population: {}", config.population_size);
    println!("Generations: {}", config.generations_number);
    println!();

    let mut population = Population::new(config, XorFitness::new())?;
    let executed = population.run_until(|stats| {
        if stats.generation % 10 == 0 {
            println!(
                "Gen {:3}: best = {:.4}, mean = {:.4}, hidden = {:.2}, edges = {:.2}{}",
                stats.generation,
                stats.best_fitness.value,
                stats.fitness_mean,
                stats.hidden_mean,
                stats.edges_mean,
                if stats.nodes_locked { " [locked]" } else { "" },
            );
        }
        stats.best_fitness.value > 3.9
    })?;

    println!("\nStopped after {} generations", executed);

    let held_out = population.test_best()?;
    let Some(best) = population.best() else {
        println!("No genome was evaluated");
        return Ok(());
    };

    println!("\nBest genome:");
    println!("  Fitness: {:?}", held_out.map(|f| f.value));
    println!("  Hidden nodes: {}", best.genome.hidden_count());
    println!("  Edges: {}", best.genome.edge_count());

    let mut genome = best.genome.clone();
    let phenotype = genome.phenotype()?;
    println!("\nXOR outputs:");
    for ([a, b], expected) in CASES {
        phenotype.calculate(&[a, b, 1.0])?;
        println!(
            "  ({}, {}) -> {:.4} (expected {})",
            a,
            b,
            phenotype.outputs()[0],
            expected
        );
    }

    Ok(())
}
