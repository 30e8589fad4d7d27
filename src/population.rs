//! The generation loop.
//!
//! Each [`Population::step`] evaluates every genome, records a
//! [`GenerationStats`], feeds the mean hidden-node count to the
//! [`NodeMutationLock`], then breeds the next generation by tournament
//! selection, pairwise crossover and structural mutation.

use std::collections::{HashSet, VecDeque};

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
#[cfg(feature = "parallel")]
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::config::EvolutionConfig;
use crate::crossover::crossover;
use crate::error::{ConfigError, Result};
use crate::fitness::{Fitness, FitnessComparator, FitnessFunction};
use crate::gene::NodeId;
use crate::genome::Genome;
use crate::stats::{count_mean_variance, mean_variance, GenerationStats};

/// A genome and its most recent score.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Individual {
    pub genome: Genome,
    /// `None` until the genome has been evaluated.
    pub fitness: Option<Fitness>,
}

impl Individual {
    #[must_use]
    pub const fn new(genome: Genome) -> Self {
        Self {
            genome,
            fitness: None,
        }
    }
}

/// Hysteresis switch that freezes node-adding and node-removing mutations
/// once the mean hidden-node count stops moving.
///
/// The lock watches a sliding window of per-generation hidden-node means. When
/// the window average changes by less than `threshold` (relative to the
/// previous average) the lock engages for `lock_time` generations and the
/// window starts over.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeMutationLock {
    window_size: usize,
    lock_time: usize,
    threshold: f32,
    window: VecDeque<f32>,
    last_average: Option<f32>,
    remaining: usize,
}

impl NodeMutationLock {
    #[must_use]
    pub fn new(window_size: usize, lock_time: usize, threshold: f32) -> Self {
        Self {
            window_size,
            lock_time,
            threshold,
            window: VecDeque::with_capacity(window_size),
            last_average: None,
            remaining: 0,
        }
    }

    /// Whether node mutations are currently frozen.
    #[must_use]
    pub const fn is_locked(&self) -> bool {
        self.remaining > 0
    }

    /// Generations left before the lock releases.
    #[must_use]
    pub const fn remaining(&self) -> usize {
        self.remaining
    }

    /// Record one generation's mean hidden-node count.
    ///
    /// Returns `true` when this observation engaged the lock. Observations
    /// made while locked only count down the lock.
    pub fn observe(&mut self, hidden_mean: f32) -> bool {
        if self.remaining > 0 {
            self.remaining -= 1;
            if self.remaining == 0 {
                debug!("node mutation lock released");
            }
            return false;
        }

        self.window.push_back(hidden_mean);
        while self.window.len() > self.window_size {
            self.window.pop_front();
        }
        if self.window.len() < self.window_size {
            return false;
        }

        #[allow(clippy::cast_precision_loss)]
        let average = self.window.iter().sum::<f32>() / self.window.len() as f32;
        let engaged = self
            .last_average
            .is_some_and(|previous| relative_change(previous, average) < self.threshold);
        self.last_average = Some(average);

        if engaged {
            self.remaining = self.lock_time;
            self.window.clear();
            self.last_average = None;
            debug!(
                average,
                generations = self.lock_time,
                "node mutation lock engaged"
            );
        }
        engaged
    }
}

fn relative_change(previous: f32, current: f32) -> f32 {
    if previous == 0.0 {
        if current == 0.0 {
            0.0
        } else {
            f32::INFINITY
        }
    } else {
        ((current - previous) / previous).abs()
    }
}

/// A population of genomes evolving against one fitness function.
pub struct Population<F: FitnessFunction> {
    config: EvolutionConfig,
    fitness_fn: F,
    comparator: FitnessComparator,
    rng: ChaCha8Rng,
    members: Vec<Individual>,
    best: Option<Individual>,
    stats: Vec<GenerationStats>,
    lock: NodeMutationLock,
    generation: usize,
}

impl<F: FitnessFunction> Population<F> {
    /// Create a population of fully connected genomes wired to the fitness
    /// function's input and output ids.
    ///
    /// # Errors
    ///
    /// Returns [`EvoError::Configuration`](crate::EvoError::Configuration)
    /// if the configuration is invalid, or if the fitness function declares
    /// no inputs, no outputs, a repeated id or the reserved id `u32::MAX`.
    pub fn new(config: EvolutionConfig, fitness_fn: F) -> Result<Self> {
        config.validate()?;
        let seed = config.random_seed.ok_or(ConfigError::MissingRandomSource)?;

        let inputs = fitness_fn.input_ids();
        let outputs = fitness_fn.output_ids();
        if inputs.is_empty() {
            return Err(ConfigError::NoInputs.into());
        }
        if outputs.is_empty() {
            return Err(ConfigError::NoOutputs.into());
        }
        let mut seen = HashSet::with_capacity(inputs.len() + outputs.len());
        for &id in inputs.iter().chain(outputs) {
            if id == NodeId::MAX {
                return Err(ConfigError::ReservedSignalId(id.0).into());
            }
            if !seen.insert(id) {
                return Err(ConfigError::DuplicateSignalId(id.0).into());
            }
        }

        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        let genome_config = config.genome_config();
        let members = (0..config.population_size)
            .map(|_| {
                Individual::new(Genome::fully_connected(
                    inputs,
                    outputs,
                    genome_config.clone(),
                    &mut rng,
                ))
            })
            .collect();

        let lock = NodeMutationLock::new(
            config.nodes_window_size,
            config.nodes_mutation_lock_time,
            config.nodes_mutation_lock_threshold,
        );

        Ok(Self {
            comparator: config.comparator(),
            config,
            fitness_fn,
            rng,
            members,
            best: None,
            stats: Vec::new(),
            lock,
            generation: 0,
        })
    }

    /// Run one generation and return its statistics.
    ///
    /// # Errors
    ///
    /// Propagates any fitness-function error other than
    /// [`EvoError::PropagationDivergence`](crate::EvoError::PropagationDivergence),
    /// and structural errors from crossover or mutation. A mutation rejected
    /// with [`EvoError::OrphanedNodes`](crate::EvoError::OrphanedNodes) keeps
    /// the parent instead.
    pub fn step(&mut self) -> Result<&GenerationStats> {
        let divergent_count = self.evaluate()?;
        self.advance(divergent_count)
    }

    /// Record the evaluated generation and breed the next one.
    fn advance(&mut self, divergent_count: usize) -> Result<&GenerationStats> {
        let best_index = self.update_best();

        let hidden: Vec<usize> = self
            .members
            .iter()
            .map(|m| m.genome.hidden_count())
            .collect();
        let (hidden_mean, hidden_variance) = count_mean_variance(hidden);
        let (edges_mean, edges_variance) =
            count_mean_variance(self.members.iter().map(|m| m.genome.edge_count()));
        let finite: Vec<f32> = self
            .members
            .iter()
            .filter_map(|m| m.fitness.as_ref())
            .map(|f| f.value)
            .filter(|v| v.is_finite())
            .collect();
        let (fitness_mean, fitness_variance) = mean_variance(&finite);

        self.lock.observe(hidden_mean);
        let nodes_locked = self.lock.is_locked();

        let best_fitness = best_index
            .and_then(|i| self.members[i].fitness.clone())
            .unwrap_or_else(|| self.comparator.worst());
        info!(
            generation = self.generation,
            best = best_fitness.value,
            fitness_mean,
            hidden_mean,
            edges_mean,
            divergent_count,
            nodes_locked,
            "generation evaluated"
        );

        self.stats.push(GenerationStats {
            generation: self.generation,
            best_fitness,
            fitness_mean,
            fitness_variance,
            hidden_mean,
            hidden_variance,
            edges_mean,
            edges_variance,
            divergent_count,
            nodes_locked,
        });

        self.reproduce(nodes_locked)?;
        self.generation += 1;

        let last = self.stats.len() - 1;
        Ok(&self.stats[last])
    }

    /// Run `generations_number` generations.
    ///
    /// # Errors
    ///
    /// See [`Population::step`].
    pub fn run(&mut self) -> Result<Option<&Individual>> {
        self.run_until(|_| false)?;
        Ok(self.best())
    }

    /// Run up to `generations_number` generations, stopping early once
    /// `stop` returns `true` for a generation's statistics. Returns the number
    /// of generations executed.
    ///
    /// # Errors
    ///
    /// See [`Population::step`].
    pub fn run_until<P>(&mut self, mut stop: P) -> Result<usize>
    where
        P: FnMut(&GenerationStats) -> bool,
    {
        for executed in 1..=self.config.generations_number {
            let stats = self.step()?;
            if stop(stats) {
                debug!(generation = stats.generation, "stop condition reached");
                return Ok(executed);
            }
        }
        Ok(self.config.generations_number)
    }

    /// Best genome seen so far.
    #[must_use]
    pub const fn best(&self) -> Option<&Individual> {
        self.best.as_ref()
    }

    /// Current members. After a step these are the unevaluated offspring.
    #[must_use]
    pub fn members(&self) -> &[Individual] {
        &self.members
    }

    /// Statistics of every generation run so far.
    #[must_use]
    pub fn stats(&self) -> &[GenerationStats] {
        &self.stats
    }

    /// Number of generations completed.
    #[must_use]
    pub const fn generation(&self) -> usize {
        self.generation
    }

    #[must_use]
    pub const fn config(&self) -> &EvolutionConfig {
        &self.config
    }

    #[must_use]
    pub const fn fitness_function(&self) -> &F {
        &self.fitness_fn
    }

    #[must_use]
    pub const fn comparator(&self) -> FitnessComparator {
        self.comparator
    }

    /// Whether node mutations are frozen for the next breeding round.
    #[must_use]
    pub const fn is_node_mutation_locked(&self) -> bool {
        self.lock.is_locked()
    }

    /// Score the best genome on held-out data.
    ///
    /// # Errors
    ///
    /// Propagates errors from phenotype construction and
    /// [`FitnessFunction::test`].
    pub fn test_best(&mut self) -> Result<Option<Fitness>> {
        let Some(best) = self.best.as_mut() else {
            return Ok(None);
        };
        let phenotype = best.genome.phenotype()?;
        self.fitness_fn.test(phenotype).map(Some)
    }

    /// Evaluate every member; returns how many diverged.
    #[cfg(feature = "parallel")]
    fn evaluate(&mut self) -> Result<usize> {
        let fitness_fn = &self.fitness_fn;
        let worst = self.comparator.worst();
        let outcomes: Vec<Result<bool>> = self
            .members
            .par_iter_mut()
            .map(|member| evaluate_member(member, fitness_fn, &worst))
            .collect();
        count_divergent(outcomes)
    }

    #[cfg(not(feature = "parallel"))]
    fn evaluate(&mut self) -> Result<usize> {
        self.evaluate_sequential()
    }

    #[cfg_attr(feature = "parallel", allow(dead_code))]
    fn evaluate_sequential(&mut self) -> Result<usize> {
        let fitness_fn = &self.fitness_fn;
        let worst = self.comparator.worst();
        let outcomes: Vec<Result<bool>> = self
            .members
            .iter_mut()
            .map(|member| evaluate_member(member, fitness_fn, &worst))
            .collect();
        count_divergent(outcomes)
    }

    /// Track the best-ever individual; returns the index of this generation's best.
    fn update_best(&mut self) -> Option<usize> {
        let worst = self.comparator.worst();
        let index = self.comparator.best_of(
            self.members
                .iter()
                .map(|m| m.fitness.as_ref().unwrap_or(&worst)),
        )?;

        let candidate = &self.members[index];
        let improved = match (&self.best, &candidate.fitness) {
            (None, _) => true,
            (Some(best), Some(fitness)) => best
                .fitness
                .as_ref()
                .map_or(true, |current| self.comparator.is_better(fitness, current)),
            (Some(_), None) => false,
        };
        if improved {
            self.best = Some(candidate.clone());
        }
        Some(index)
    }

    fn reproduce(&mut self, nodes_locked: bool) -> Result<()> {
        let size = self.config.population_size;
        let mut offspring: Vec<Genome> = (0..size)
            .map(|_| {
                let winner = tournament(
                    &self.members,
                    self.comparator,
                    self.config.tournament_size,
                    &mut self.rng,
                );
                self.members[winner].genome.clone()
            })
            .collect();

        for pair in offspring.chunks_exact_mut(2) {
            if self.rng.random::<f32>() < self.config.crossover_rate {
                let (first, second) = crossover(&pair[0], &pair[1], &mut self.rng)?;
                pair[0] = first;
                pair[1] = second;
            }
        }

        for genome in &mut offspring {
            if self.rng.random::<f32>() >= self.config.mutation_rate {
                continue;
            }
            match genome.mutate_structure(&mut self.rng, nodes_locked) {
                Ok(child) => *genome = child,
                Err(err) if err.is_rejected_edit() => {
                    warn!(%err, "mutation rejected, keeping parent");
                }
                Err(err) => return Err(err),
            }
        }

        if self.config.use_elitism {
            if let (Some(best), Some(slot)) = (&self.best, offspring.first_mut()) {
                *slot = best.genome.clone();
            }
        }

        self.members = offspring.into_iter().map(Individual::new).collect();
        Ok(())
    }
}

fn count_divergent(outcomes: Vec<Result<bool>>) -> Result<usize> {
    let mut divergent = 0;
    for outcome in outcomes {
        if outcome? {
            divergent += 1;
        }
    }
    Ok(divergent)
}

fn evaluate_member<F: FitnessFunction>(
    member: &mut Individual,
    fitness_fn: &F,
    worst: &Fitness,
) -> Result<bool> {
    let phenotype = member.genome.phenotype()?;
    match fitness_fn.calculate(phenotype) {
        Ok(fitness) => {
            member.fitness = Some(fitness);
            Ok(false)
        }
        Err(err) if err.is_recoverable() => {
            debug!(%err, edges = member.genome.edge_count(), "genome diverged, assigning worst fitness");
            member.fitness = Some(worst.clone());
            Ok(true)
        }
        Err(err) => Err(err),
    }
}

/// Tournament with replacement; the first contestant wins ties.
fn tournament<R: Rng>(
    members: &[Individual],
    comparator: FitnessComparator,
    size: usize,
    rng: &mut R,
) -> usize {
    let worst = comparator.worst();
    let fitness = |i: usize| members[i].fitness.as_ref().unwrap_or(&worst);

    let mut winner = rng.random_range(0..members.len());
    for _ in 1..size {
        let contender = rng.random_range(0..members.len());
        if comparator.is_better(fitness(contender), fitness(winner)) {
            winner = contender;
        }
    }
    winner
}
