//! Fitness values, the mode-driven comparator and the fitness-function contract.

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::gene::NodeId;
use crate::phenotype::Phenotype;

/// The score assigned to one genome.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Fitness {
    /// Primary scalar score.
    pub value: f32,
    /// Ordered secondary metrics, compared lexicographically in
    /// multi-objective mode.
    #[serde(default)]
    pub extra: Vec<f32>,
}

impl Fitness {
    /// A single-objective fitness.
    #[must_use]
    pub const fn new(value: f32) -> Self {
        Self {
            value,
            extra: Vec::new(),
        }
    }

    /// A fitness carrying secondary metrics.
    #[must_use]
    pub const fn with_extra(value: f32, extra: Vec<f32>) -> Self {
        Self { value, extra }
    }
}

/// Orders fitness values according to the run's optimization mode.
///
/// The comparison is a pure function of the two fitness values and the two
/// mode flags carried by this value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct FitnessComparator {
    /// Lower values are better.
    pub minimize: bool,
    /// Compare the `extra` metrics lexicographically before the primary value.
    pub multiobjective: bool,
}

impl FitnessComparator {
    #[must_use]
    pub const fn new(minimize: bool, multiobjective: bool) -> Self {
        Self {
            minimize,
            multiobjective,
        }
    }

    /// `Ordering::Greater` when `a` is better than `b`.
    ///
    /// NaN scores and missing secondary metrics rank below everything else.
    #[must_use]
    pub fn compare(&self, a: &Fitness, b: &Fitness) -> Ordering {
        if self.multiobjective {
            let len = a.extra.len().max(b.extra.len());
            for i in 0..len {
                let x = a.extra.get(i).copied().unwrap_or(f32::NAN);
                let y = b.extra.get(i).copied().unwrap_or(f32::NAN);
                match self.compare_scalar(x, y) {
                    Ordering::Equal => {}
                    ord => return ord,
                }
            }
        }
        self.compare_scalar(a.value, b.value)
    }

    fn compare_scalar(&self, a: f32, b: f32) -> Ordering {
        match (a.is_nan(), b.is_nan()) {
            (true, true) => Ordering::Equal,
            (true, false) => Ordering::Less,
            (false, true) => Ordering::Greater,
            (false, false) => {
                let ord = a.partial_cmp(&b).unwrap_or(Ordering::Equal);
                if self.minimize {
                    ord.reverse()
                } else {
                    ord
                }
            }
        }
    }

    /// Whether `a` is strictly better than `b`.
    #[must_use]
    pub fn is_better(&self, a: &Fitness, b: &Fitness) -> bool {
        self.compare(a, b) == Ordering::Greater
    }

    /// A fitness no real evaluation can rank below.
    #[must_use]
    pub const fn worst(&self) -> Fitness {
        Fitness::new(if self.minimize {
            f32::INFINITY
        } else {
            f32::NEG_INFINITY
        })
    }

    /// Index of the best fitness; the first one wins ties.
    pub fn best_of<'a, I>(&self, fitnesses: I) -> Option<usize>
    where
        I: IntoIterator<Item = &'a Fitness>,
    {
        let mut best: Option<(usize, &Fitness)> = None;
        for (i, f) in fitnesses.into_iter().enumerate() {
            match best {
                Some((_, current)) if !self.is_better(f, current) => {}
                _ => best = Some((i, f)),
            }
        }
        best.map(|(i, _)| i)
    }
}

/// The problem being optimized.
///
/// The engine never looks inside a [`Fitness`] beyond the comparator; the
/// function only has to accept phenotypes wired to its declared ids.
///
/// # Example
///
/// ```rust
/// use symbios_evonet::{EvoError, Fitness, FitnessFunction, NodeId, Phenotype};
///
/// struct Doubler {
///     inputs: Vec<NodeId>,
///     outputs: Vec<NodeId>,
/// }
///
/// impl FitnessFunction for Doubler {
///     fn input_ids(&self) -> &[NodeId] {
///         &self.inputs
///     }
///     fn output_ids(&self) -> &[NodeId] {
///         &self.outputs
///     }
///     fn calculate(&self, phenotype: &mut Phenotype) -> Result<Fitness, EvoError> {
///         phenotype.calculate(&[0.5])?;
///         let error = (phenotype.outputs()[0] - 1.0).abs();
///         Ok(Fitness::new(-error))
///     }
/// }
/// ```
pub trait FitnessFunction: Send + Sync {
    /// Ordered ids of the signals fed into the network.
    fn input_ids(&self) -> &[NodeId];

    /// Ordered ids of the signals read back from the network.
    fn output_ids(&self) -> &[NodeId];

    /// Score a phenotype on the training problem.
    ///
    /// # Errors
    ///
    /// Propagation errors should be returned as-is; a
    /// [`PropagationDivergence`](crate::EvoError::PropagationDivergence) marks
    /// only this genome as failed.
    fn calculate(&self, phenotype: &mut Phenotype) -> Result<Fitness>;

    /// Score a phenotype on held-out data. Defaults to [`Self::calculate`].
    ///
    /// # Errors
    ///
    /// Same as [`Self::calculate`].
    fn test(&self, phenotype: &mut Phenotype) -> Result<Fitness> {
        self.calculate(phenotype)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_maximize_single_objective() {
        let cmp = FitnessComparator::new(false, false);
        assert!(cmp.is_better(&Fitness::new(2.0), &Fitness::new(1.0)));
        assert!(!cmp.is_better(&Fitness::new(1.0), &Fitness::new(2.0)));
        assert_eq!(
            cmp.compare(&Fitness::new(1.0), &Fitness::new(1.0)),
            Ordering::Equal
        );
    }

    #[test]
    fn test_minimize_single_objective() {
        let cmp = FitnessComparator::new(true, false);
        assert!(cmp.is_better(&Fitness::new(0.1), &Fitness::new(0.5)));
    }

    #[test]
    fn test_single_objective_ignores_extra() {
        let cmp = FitnessComparator::new(false, false);
        let a = Fitness::with_extra(1.0, vec![0.0]);
        let b = Fitness::with_extra(1.0, vec![9.0]);
        assert_eq!(cmp.compare(&a, &b), Ordering::Equal);
    }

    #[test]
    fn test_multiobjective_is_lexicographic() {
        let cmp = FitnessComparator::new(false, true);
        let a = Fitness::with_extra(0.0, vec![3.0, 1.0]);
        let b = Fitness::with_extra(10.0, vec![3.0, 0.5]);
        assert!(cmp.is_better(&a, &b));

        // Equal extras fall through to the primary value
        let c = Fitness::with_extra(1.0, vec![3.0, 1.0]);
        assert!(cmp.is_better(&c, &a));
    }

    #[test]
    fn test_multiobjective_minimize() {
        let cmp = FitnessComparator::new(true, true);
        let a = Fitness::with_extra(0.0, vec![1.0]);
        let b = Fitness::with_extra(0.0, vec![2.0]);
        assert!(cmp.is_better(&a, &b));
    }

    #[test]
    fn test_worst_ranks_last_in_every_mode() {
        for minimize in [false, true] {
            for multiobjective in [false, true] {
                let cmp = FitnessComparator::new(minimize, multiobjective);
                let real = Fitness::with_extra(1e30, vec![-1e30]);
                assert!(cmp.is_better(&real, &cmp.worst()), "{:?}", cmp);
                let nan = Fitness::new(f32::NAN);
                assert!(cmp.is_better(&real, &nan), "{:?}", cmp);
            }
        }
    }

    #[test]
    fn test_best_of_prefers_first_on_ties() {
        let cmp = FitnessComparator::new(false, false);
        let values = [Fitness::new(1.0), Fitness::new(3.0), Fitness::new(3.0)];
        assert_eq!(cmp.best_of(&values), Some(1));
        assert_eq!(cmp.best_of(std::iter::empty()), None);
    }
}
