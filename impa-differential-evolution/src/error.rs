//! Error types for the differential evolution solver.
//!
//! Construction problems (bad bounds, a population too small for the chosen
//! strategy, malformed constraints) are reported as [`DEError`]. Failures of
//! the cost function itself are never absorbed into a cost value; they travel
//! out of `solve()` unchanged, wrapped in [`SolveError::Cost`] by the
//! convenience entry point.

use thiserror::Error;

/// Errors that can occur while configuring or constructing a solver.
#[derive(Debug, Error)]
pub enum DEError {
    /// Lower and upper bounds have different lengths.
    #[error("bounds mismatch: lower has {lower_len} elements, upper has {upper_len}")]
    BoundsMismatch {
        /// Length of the lower bounds array
        lower_len: usize,
        /// Length of the upper bounds array
        upper_len: usize,
    },

    /// A bound pair is not finite or its lower bound is not below the upper one.
    #[error("invalid bounds at index {index}: need finite lower ({lower}) < upper ({upper})")]
    InvalidBounds {
        /// Index of the invalid bound pair
        index: usize,
        /// The lower bound value
        lower: f64,
        /// The upper bound value
        upper: f64,
    },

    /// No bounds were supplied at all.
    #[error("at least one bounded dimension is required")]
    EmptyBounds,

    /// An integer-constrained dimension has no integer between its bounds.
    #[error("integral dimension {index} has no integer value in [{lower}, {upper}]")]
    NoIntegerInBounds {
        /// Index of the integral dimension
        index: usize,
        /// The lower bound value
        lower: f64,
        /// The upper bound value
        upper: f64,
    },

    /// Population would be smaller than the solver can work with.
    #[error("population size ({pop_size}) must be >= {required}")]
    InfeasiblePopulation {
        /// The population size that was requested
        pop_size: usize,
        /// The smallest usable population size
        required: usize,
    },

    /// Mutation factor is out of valid range [0, 2).
    #[error("invalid mutation factor: {factor} (must be in [0, 2))")]
    InvalidMutationFactor {
        /// The invalid mutation factor
        factor: f64,
    },

    /// Crossover rate is out of valid range [0, 1].
    #[error("invalid crossover rate: {rate} (must be in [0, 1])")]
    InvalidCrossoverRate {
        /// The invalid crossover rate
        rate: f64,
    },

    /// Strategy name could not be parsed.
    #[error("unknown strategy: {0}")]
    UnknownStrategy(String),

    /// Initial guess (x0) has wrong dimension.
    #[error("x0 dimension mismatch: expected {expected}, got {got}")]
    X0DimensionMismatch {
        /// Expected dimension
        expected: usize,
        /// Actual dimension provided
        got: usize,
    },

    /// Initial guess lies outside the bounds.
    #[error("x0 component {index} = {value} lies outside the bounds")]
    X0OutOfBounds {
        /// Offending component
        index: usize,
        /// Offending value
        value: f64,
    },

    /// Integrality mask has wrong dimension.
    #[error("integrality mask dimension mismatch: expected {expected}, got {got}")]
    IntegralityDimensionMismatch {
        /// Expected dimension
        expected: usize,
        /// Actual dimension provided
        got: usize,
    },

    /// A user supplied initial population has the wrong shape.
    #[error("initial population must have shape (M, {expected_cols}) with M >= 5, got ({rows}, {cols})")]
    InitPopulationShape {
        /// Rows supplied
        rows: usize,
        /// Columns supplied
        cols: usize,
        /// Expected number of columns (the dimension count)
        expected_cols: usize,
    },

    /// A constraint's residual and bound vectors disagree in length.
    #[error("constraint {index}: residual has {residual_len} components, bounds have {lb_len}/{ub_len}")]
    ConstraintShape {
        /// Index of the constraint in the configuration
        index: usize,
        /// Residual vector length
        residual_len: usize,
        /// Lower bound vector length
        lb_len: usize,
        /// Upper bound vector length
        ub_len: usize,
    },
}

/// A specialized `Result` type for DE operations.
pub type Result<T> = std::result::Result<T, DEError>;

impl DEError {
    /// Returns `true` if this is a bounds-related error.
    pub fn is_bounds_error(&self) -> bool {
        matches!(
            self,
            DEError::BoundsMismatch { .. }
                | DEError::InvalidBounds { .. }
                | DEError::EmptyBounds
                | DEError::NoIntegerInBounds { .. }
        )
    }

    /// Returns `true` if this is a configuration-related error.
    pub fn is_config_error(&self) -> bool {
        matches!(
            self,
            DEError::InfeasiblePopulation { .. }
                | DEError::InvalidMutationFactor { .. }
                | DEError::InvalidCrossoverRate { .. }
                | DEError::UnknownStrategy(_)
        )
    }

    /// Returns `true` if this is a dimension or shape mismatch error.
    pub fn is_dimension_error(&self) -> bool {
        matches!(
            self,
            DEError::X0DimensionMismatch { .. }
                | DEError::IntegralityDimensionMismatch { .. }
                | DEError::InitPopulationShape { .. }
                | DEError::ConstraintShape { .. }
        )
    }
}

/// Error returned by [`crate::differential_evolution`], which both builds and
/// runs a solver.
#[derive(Debug, Error)]
pub enum SolveError<E>
where
    E: std::error::Error + 'static,
{
    /// The solver could not be constructed.
    #[error(transparent)]
    Config(#[from] DEError),
    /// The cost function failed; the run was terminated.
    #[error("cost function failed: {0}")]
    Cost(#[source] E),
}
