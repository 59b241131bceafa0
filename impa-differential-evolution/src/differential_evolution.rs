use crate::cost_function::CostFunction;
use crate::error::SolveError;
use crate::{DEConfig, DEReport, DifferentialEvolution};

/// Runs Differential Evolution optimization on a cost function.
///
/// This is a convenience function that mirrors SciPy's `differential_evolution` API.
/// It creates a DE optimizer with the given bounds and configuration, then runs
/// the optimization to find the global minimum.
///
/// # Arguments
///
/// * `cost` - The objective to minimize; any `FnMut(&Array1<f64>) -> f64` works
/// * `bounds` - Slice of (lower, upper) bound pairs for each dimension
/// * `config` - DE configuration (use `DEConfigBuilder` to construct)
///
/// # Errors
///
/// Returns `SolveError::Config` if the solver cannot be built from `bounds`
/// and `config`, `SolveError::Cost` if the cost function fails.
///
/// # Example
///
/// ```rust
/// use impa_differential_evolution::{differential_evolution, DEConfigBuilder};
/// use ndarray::Array1;
///
/// let mut cost = |x: &Array1<f64>| x[0].powi(2) + x[1].powi(2);
/// let result = differential_evolution(
///     &mut cost,
///     &[(-5.0, 5.0), (-5.0, 5.0)],
///     DEConfigBuilder::new().maxiter(50).seed(42).build().unwrap(),
/// ).expect("optimization failed");
///
/// assert!(result.fun < 0.01);
/// ```
pub fn differential_evolution<C>(
    cost: &mut C,
    bounds: &[(f64, f64)],
    config: DEConfig,
) -> Result<DEReport, SolveError<C::Error>>
where
    C: CostFunction,
    C::Error: std::error::Error + 'static,
{
    let mut de = DifferentialEvolution::new(bounds, config)?;
    de.solve(cost).map_err(SolveError::Cost)
}
