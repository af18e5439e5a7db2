use crate::engine::domain::DomainId;
use crate::engine::domain::DomainKind;

/// API-misuse errors surfaced by the network.
///
/// Emptiness is deliberately absent: an empty domain is a valid algebraic
/// outcome (the constraint system is infeasible in the explored region) and
/// is only ever reported as a warning.
#[derive(Clone, Debug, PartialEq, thiserror::Error)]
pub enum NetworkError {
    #[error("{0} is a free variable that has not been bound to a concrete domain")]
    UnboundVariable(DomainId),

    #[error("{0} cannot be rebound: it is not a free variable")]
    NotAVariable(DomainId),

    #[error("expected a domain of kind {expected:?}, got {actual:?}")]
    KindMismatch {
        expected: DomainKind,
        actual: DomainKind,
    },

    #[error("dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("tube domains do not share the same slicing")]
    SlicingMismatch,

    #[error("fixed-point ratio {0} is outside [0, 1]")]
    InvalidRatio(f64),

    #[error("data timestamps must be strictly increasing (got {0})")]
    DataOutOfOrder(f64),
}
