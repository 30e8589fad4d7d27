//! Per-generation statistics.

use serde::{Deserialize, Serialize};

use crate::fitness::Fitness;

/// Summary of one evaluated generation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationStats {
    /// Zero-based index of the generation.
    pub generation: usize,
    /// Best fitness of this generation.
    pub best_fitness: Fitness,
    /// Mean primary fitness over genomes whose score is finite.
    pub fitness_mean: f32,
    /// Population variance over the same finite scores.
    pub fitness_variance: f32,
    /// Mean number of registered hidden nodes per genome.
    pub hidden_mean: f32,
    /// Population variance of the hidden-node counts.
    pub hidden_variance: f32,
    /// Mean number of edges per genome.
    pub edges_mean: f32,
    /// Population variance of the edge counts.
    pub edges_variance: f32,
    /// Genomes whose propagation diverged and were assigned the worst fitness.
    pub divergent_count: usize,
    /// Whether node mutations were frozen while this generation was bred.
    pub nodes_locked: bool,
}

/// Mean and population variance; `(0, 0)` for an empty sample.
#[allow(clippy::cast_precision_loss)]
pub fn mean_variance(values: &[f32]) -> (f32, f32) {
    if values.is_empty() {
        return (0.0, 0.0);
    }
    let n = values.len() as f32;
    let mean = values.iter().sum::<f32>() / n;
    let variance = values.iter().map(|v| (v - mean) * (v - mean)).sum::<f32>() / n;
    (mean, variance)
}

/// [`mean_variance`] over counts.
#[allow(clippy::cast_precision_loss)]
pub fn count_mean_variance(counts: impl IntoIterator<Item = usize>) -> (f32, f32) {
    let values: Vec<f32> = counts.into_iter().map(|c| c as f32).collect();
    mean_variance(&values)
}
