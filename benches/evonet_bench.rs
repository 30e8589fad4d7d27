//! Benchmarks for symbios-evonet.

use std::hint::black_box;

use criterion::{criterion_group, criterion_main, Criterion};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use symbios_evonet::{
    crossover, EvoError, EvolutionConfig, Fitness, FitnessFunction, Genome, GenomeConfig,
    MutationKind, NodeId, Phenotype, Population,
};

fn ids(raw: &[u32]) -> Vec<NodeId> {
    raw.iter().copied().map(NodeId).collect()
}

/// A 4-input, 2-output genome grown by a few structural mutations.
fn grown_genome(rng: &mut ChaCha8Rng) -> Genome {
    let mut genome =
        Genome::fully_connected(&ids(&[1, 2, 3, 4]), &ids(&[5, 6]), GenomeConfig::default(), rng);
    for _ in 0..6 {
        if let Ok(child) = genome.mutate_with(MutationKind::AddNode, rng) {
            genome = child;
        }
        if let Ok(child) = genome.mutate_with(MutationKind::AddConnection, rng) {
            genome = child;
        }
    }
    genome
}

fn bench_genome_creation(c: &mut Criterion) {
    c.bench_function("genome_fully_connected", |b| {
        let mut rng = ChaCha8Rng::seed_from_u64(42);
        let inputs = ids(&[1, 2, 3, 4]);
        let outputs = ids(&[5, 6]);
        b.iter(|| {
            black_box(Genome::fully_connected(
                &inputs,
                &outputs,
                GenomeConfig::default(),
                &mut rng,
            ));
        });
    });
}

fn bench_mutation(c: &mut Criterion) {
    let mut rng = ChaCha8Rng::seed_from_u64(42);
    let genome = grown_genome(&mut rng);

    c.bench_function("genome_mutation", |b| {
        b.iter(|| {
            black_box(genome.mutate_structure(&mut rng, false).ok());
        });
    });
}

fn bench_crossover(c: &mut Criterion) {
    let mut rng = ChaCha8Rng::seed_from_u64(42);
    let parent1 = grown_genome(&mut rng);
    let parent2 = grown_genome(&mut rng);

    c.bench_function("genome_crossover", |b| {
        b.iter(|| {
            black_box(crossover(&parent1, &parent2, &mut rng).ok());
        });
    });
}

fn bench_propagation(c: &mut Criterion) {
    let mut rng = ChaCha8Rng::seed_from_u64(42);
    let genome = grown_genome(&mut rng);
    let Ok(mut phenotype) = genome.build_phenotype() else {
        return;
    };

    c.bench_function("phenotype_build", |b| {
        b.iter(|| {
            black_box(genome.build_phenotype().ok());
        });
    });

    c.bench_function("phenotype_calculate", |b| {
        b.iter(|| {
            black_box(phenotype.calculate(&[0.5, -0.5, 0.25, 1.0]).ok());
        });
    });
}

struct Sum {
    inputs: Vec<NodeId>,
    outputs: Vec<NodeId>,
}

impl FitnessFunction for Sum {
    fn input_ids(&self) -> &[NodeId] {
        &self.inputs
    }

    fn output_ids(&self) -> &[NodeId] {
        &self.outputs
    }

    fn calculate(&self, phenotype: &mut Phenotype) -> Result<Fitness, EvoError> {
        phenotype.calculate(&[0.1, 0.2])?;
        Ok(Fitness::new(-(phenotype.outputs()[0] - 0.3).abs()))
    }
}

fn bench_generation(c: &mut Criterion) {
    let config = EvolutionConfig {
        population_size: 50,
        ..EvolutionConfig::default().with_seed(42)
    };
    let fitness = Sum {
        inputs: ids(&[1, 2]),
        outputs: ids(&[3]),
    };
    let Ok(mut population) = Population::new(config, fitness) else {
        return;
    };

    c.bench_function("population_step_50", |b| {
        b.iter(|| {
            black_box(population.step().ok());
        });
    });
}

criterion_group!(
    benches,
    bench_genome_creation,
    bench_mutation,
    bench_crossover,
    bench_propagation,
    bench_generation,
);
criterion_main!(benches);
