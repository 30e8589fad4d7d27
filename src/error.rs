//! Error types for the evolution engine.
//!
//! [`ConfigError`] and [`EvoError::StructuralInvariantViolation`] are fatal for
//! a run. [`EvoError::PropagationDivergence`] is raised per genome; the
//! population controller absorbs it by assigning the genome the worst fitness.
//! [`EvoError::OrphanedNodes`] rejects one edit and leaves the genome as it was.

use thiserror::Error;

use crate::gene::NodeId;

/// Invalid evolution parameters, detected before any generation runs.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    /// No random seed was configured.
    #[error("no random source configured")]
    MissingRandomSource,
    /// A size parameter that must be positive is zero.
    #[error("`{0}` must be positive")]
    NonPositive(&'static str),
    /// A probability lies outside `[0, 1]`.
    #[error("`{name}` must lie in [0, 1], got {value}")]
    InvalidRate {
        /// Name of the offending option.
        name: &'static str,
        /// The rejected value.
        value: f32,
    },
    /// A real-valued option is NaN or infinite.
    #[error("`{0}` must be finite")]
    NonFinite(&'static str),
    /// The fitness function declares no input ids.
    #[error("fitness function declares no input ids")]
    NoInputs,
    /// The fitness function declares no output ids.
    #[error("fitness function declares no output ids")]
    NoOutputs,
    /// A node id appears more than once across the input and output ids.
    #[error("node id {0} is declared more than once among inputs and outputs")]
    DuplicateSignalId(u32),
    /// `u32::MAX` leaves no room to allocate hidden ids after it.
    #[error("node id {0} is reserved")]
    ReservedSignalId(u32),
}

/// Errors raised by genome operators, propagation and the population loop.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EvoError {
    /// Invalid configuration.
    #[error("configuration error: {0}")]
    Configuration(#[from] ConfigError),
    /// A genome reached a state its invariants forbid.
    #[error("structural invariant violated: {0}")]
    StructuralInvariantViolation(String),
    /// Deleting one edge would leave more than one hidden node without edges.
    ///
    /// A structural invariant violation of the attempted edit only: the genome
    /// the edit was applied to is untouched and stays valid.
    #[error("deleting edge {begin} -> {end} would orphan {count} nodes")]
    OrphanedNodes {
        /// Source of the edge.
        begin: NodeId,
        /// Target of the edge.
        end: NodeId,
        /// Nodes the deletion would orphan.
        count: usize,
    },
    /// The distance between successive propagation environments became infinite.
    #[error("signal propagation diverged after {passes} passes")]
    PropagationDivergence {
        /// Pass at which divergence was detected.
        passes: usize,
    },
    /// The number of input values does not match the phenotype's input ids.
    #[error("expected {expected} input values, got {actual}")]
    InputMismatch {
        /// Number of declared input ids.
        expected: usize,
        /// Number of values supplied.
        actual: usize,
    },
}

impl EvoError {
    /// Whether this error only invalidates the evaluation of one genome.
    #[must_use]
    pub const fn is_recoverable(&self) -> bool {
        matches!(self, Self::PropagationDivergence { .. })
    }

    /// Whether this error rejects a single structural edit without putting
    /// the run at fault. The population loop keeps the parent genome instead.
    #[must_use]
    pub const fn is_rejected_edit(&self) -> bool {
        matches!(self, Self::OrphanedNodes { .. })
    }
}

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, EvoError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_error_converts() {
        let err: EvoError = ConfigError::MissingRandomSource.into();
        assert!(matches!(err, EvoError::Configuration(_)));
        assert!(err.to_string().contains("random source"));
    }

    #[test]
    fn test_only_divergence_is_recoverable() {
        assert!(EvoError::PropagationDivergence { passes: 3 }.is_recoverable());
        assert!(!EvoError::StructuralInvariantViolation("x".into()).is_recoverable());
        assert!(!EvoError::from(ConfigError::NoOutputs).is_recoverable());
    }

    #[test]
    fn test_only_orphaning_rejects_an_edit() {
        let orphaned = EvoError::OrphanedNodes {
            begin: NodeId(3),
            end: NodeId(4),
            count: 2,
        };
        assert!(orphaned.is_rejected_edit());
        assert!(!orphaned.is_recoverable());
        assert!(orphaned.to_string().contains("#3 -> #4"));
        assert!(!EvoError::StructuralInvariantViolation("x".into()).is_rejected_edit());
        assert!(!EvoError::PropagationDivergence { passes: 1 }.is_rejected_edit());
    }

    #[test]
    fn test_rate_message_names_option() {
        let err = ConfigError::InvalidRate {
            name: "mutation_rate",
            value: 1.5,
        };
        let msg = err.to_string();
        assert!(msg.contains("mutation_rate"), "{}", msg);
        assert!(msg.contains("1.5"), "{}", msg);
    }
}
