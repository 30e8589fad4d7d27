//! Activity-biased roulette selection of mutation targets.
//!
//! Both samplers consume exactly one random draw and return an index into the
//! slice they were given, so results depend only on the random stream and the
//! ordering of the activities.

use rand::Rng;

/// Added to every activity so dormant nodes keep a small chance of selection.
pub const ACTIVITY_EPSILON: f32 = 1e-3;

/// Pick an index with probability proportional to `activity + ε`.
///
/// Returns `None` for an empty slice. Falls back to a uniform pick when the
/// total weight is not a positive finite number.
pub fn select_by_activity<R: Rng>(activities: &[f32], rng: &mut R) -> Option<usize> {
    let weights: Vec<f32> = activities
        .iter()
        .map(|&a| a.max(0.0) + ACTIVITY_EPSILON)
        .collect();
    roulette(&weights, rng)
}

/// Pick an index favouring low activity.
///
/// Each weight is `max - activity + min` over the slice, so the least active
/// node gets the largest share.
pub fn reverse_select_by_activity<R: Rng>(activities: &[f32], rng: &mut R) -> Option<usize> {
    let max = activities.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    let min = activities.iter().copied().fold(f32::INFINITY, f32::min);
    let weights: Vec<f32> = activities.iter().map(|&a| max - a + min).collect();
    roulette(&weights, rng)
}

/// Uniform pick over `len` items.
pub fn select_uniform<R: Rng>(len: usize, rng: &mut R) -> Option<usize> {
    (len > 0).then(|| rng.random_range(0..len))
}

fn roulette<R: Rng>(weights: &[f32], rng: &mut R) -> Option<usize> {
    if weights.is_empty() {
        return None;
    }

    let total: f32 = weights.iter().sum();
    if !total.is_finite() || total <= 0.0 || weights.iter().any(|w| !w.is_finite() || *w < 0.0) {
        return select_uniform(weights.len(), rng);
    }

    let target = rng.random::<f32>() * total;
    let mut cumulative = 0.0;
    for (i, &w) in weights.iter().enumerate() {
        cumulative += w;
        if target < cumulative {
            return Some(i);
        }
    }
    // Rounding can leave target just above the last partial sum
    weights.iter().rposition(|&w| w > 0.0)
}
