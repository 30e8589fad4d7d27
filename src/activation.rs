//! Activation functions for evolved networks.
//!
//! The set is closed: every variant has one pure evaluator in
//! [`Activation::apply`], so activations serialize as plain tags and
//! dispatch is an exhaustive `match`.

use serde::{Deserialize, Serialize};

/// Activation function types supported by phenotype nodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum Activation {
    /// Identity: f(x) = x. Input nodes always use it and ignore their bias.
    #[default]
    Identity,
    /// Saturating linear: f(x) = clamp(x, -1, 1)
    Linear,
    /// Sigmoid: f(x) = 1 / (1 + e^(-x))
    Sigmoid,
    /// Hyperbolic tangent: f(x) = tanh(x)
    Tanh,
    /// Gaussian: f(x) = e^(-x^2)
    Gaussian,
    /// Thresholded sigmoid: f(x) = 1 if sigmoid(x) >= 0.5 else 0
    SigmoidProbBinary,
    /// Quadratic: f(x) = x^2
    Quadratic,
    /// Rectified Linear Unit: f(x) = max(0, x)
    ReLU,
    /// Sine: f(x) = sin(x)
    Sine,
    /// Absolute value: f(x) = |x|
    Abs,
    /// Step function: f(x) = 1 if x > 0 else 0
    Step,
}

impl Activation {
    /// All available activation functions.
    pub const ALL: [Self; 11] = [
        Self::Identity,
        Self::Linear,
        Self::Sigmoid,
        Self::Tanh,
        Self::Gaussian,
        Self::SigmoidProbBinary,
        Self::Quadratic,
        Self::ReLU,
        Self::Sine,
        Self::Abs,
        Self::Step,
    ];

    /// Apply this activation function to an input value.
    ///
    /// NaN propagates unchanged. Infinite inputs map to the mathematical limit
    /// where one exists so that bounded activations stay bounded.
    #[inline]
    #[must_use]
    pub fn apply(self, x: f32) -> f32 {
        if x.is_nan() {
            return f32::NAN;
        }

        match self {
            Self::Identity => x,
            Self::Linear => x.clamp(-1.0, 1.0),
            Self::Sigmoid => sigmoid(x),
            Self::Tanh => {
                if x.is_infinite() {
                    return x.signum();
                }
                x.tanh()
            }
            Self::Gaussian => {
                // exp(-676) underflows f32 anyway
                if x.abs() > 26.0 {
                    0.0
                } else {
                    (-x * x).exp()
                }
            }
            Self::SigmoidProbBinary => {
                if sigmoid(x) >= 0.5 {
                    1.0
                } else {
                    0.0
                }
            }
            Self::Quadratic => x * x,
            Self::ReLU => x.max(0.0),
            Self::Sine => {
                if x.is_infinite() {
                    return 0.0;
                }
                x.sin()
            }
            Self::Abs => x.abs(),
            Self::Step => {
                if x > 0.0 {
                    1.0
                } else {
                    0.0
                }
            }
        }
    }
}

#[inline]
fn sigmoid(x: f32) -> f32 {
    if x == f32::INFINITY {
        return 1.0;
    }
    if x == f32::NEG_INFINITY {
        return 0.0;
    }
    // sigmoid(-88) and sigmoid(88) already saturate
    let clamped = x.clamp(-88.0, 88.0);
    1.0 / (1.0 + (-clamped).exp())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identity_and_linear() {
        assert!((Activation::Identity.apply(2.5) - 2.5).abs() < 1e-6);
        assert!((Activation::Linear.apply(0.5) - 0.5).abs() < 1e-6);
        assert!((Activation::Linear.apply(2.5) - 1.0).abs() < 1e-6);
        assert!((Activation::Linear.apply(-7.0) + 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_sigmoid() {
        assert!((Activation::Sigmoid.apply(0.0) - 0.5).abs() < 1e-6);
        assert!(Activation::Sigmoid.apply(10.0) > 0.99);
        assert!(Activation::Sigmoid.apply(-10.0) < 0.01);
        assert!((Activation::Sigmoid.apply(f32::INFINITY) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_tanh() {
        assert!(Activation::Tanh.apply(0.0).abs() < 1e-6);
        assert!((Activation::Tanh.apply(f32::NEG_INFINITY) + 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_gaussian() {
        assert!((Activation::Gaussian.apply(0.0) - 1.0).abs() < 1e-6);
        assert!(Activation::Gaussian.apply(3.0) < 0.001);
        assert_eq!(Activation::Gaussian.apply(f32::INFINITY), 0.0);
    }

    #[test]
    fn test_sigmoid_prob_binary() {
        assert_eq!(Activation::SigmoidProbBinary.apply(0.3), 1.0);
        assert_eq!(Activation::SigmoidProbBinary.apply(0.0), 1.0);
        assert_eq!(Activation::SigmoidProbBinary.apply(-0.3), 0.0);
    }

    #[test]
    fn test_quadratic_relu_abs_step() {
        assert!((Activation::Quadratic.apply(-3.0) - 9.0).abs() < 1e-6);
        assert_eq!(Activation::ReLU.apply(-0.5), 0.0);
        assert!((Activation::Abs.apply(-0.5) - 0.5).abs() < 1e-6);
        assert_eq!(Activation::Step.apply(0.1), 1.0);
        assert_eq!(Activation::Step.apply(-0.1), 0.0);
    }

    #[test]
    fn test_nan_propagates() {
        for activation in Activation::ALL {
            assert!(activation.apply(f32::NAN).is_nan(), "{:?}", activation);
        }
    }

    #[test]
    fn test_bounded_variants_stay_bounded() {
        let bounded = [
            Activation::Linear,
            Activation::Sigmoid,
            Activation::Tanh,
            Activation::Gaussian,
            Activation::SigmoidProbBinary,
            Activation::Sine,
            Activation::Step,
        ];
        for activation in bounded {
            for x in [-1e30_f32, -3.0, 0.0, 3.0, 1e30] {
                assert!(activation.apply(x).abs() <= 1.0, "{:?}({})", activation, x);
            }
        }
    }
}
