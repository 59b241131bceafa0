//! Constraint-aware differential evolution for hardware-in-the-loop tuning.
//!
//! This crate provides a Differential Evolution (DE) global optimizer built for
//! objectives that are slow, noisy and driven by real instruments. Each
//! candidate is evaluated in order, one at a time, and the run can be aborted
//! from another thread between any two evaluations.
//!
//! # Features
//!
//! - Six mutation kinds (Best1, Rand1, RandToBest1, CurrentToBest1, Best2, Rand2)
//! - Binomial and exponential crossover
//! - Lampinen constraint handling (linear and nonlinear constraints)
//! - Adaptive population culling by an absolute energy threshold
//! - Mixed-integer dimensions
//! - Latin Hypercube initialization
//! - Projected-gradient polishing of the final result
//! - Cooperative cancellation through a [`CancellationToken`]
//!
//! # Example
//!
//! ```rust
//! use impa_differential_evolution::{differential_evolution, DEConfigBuilder};
//! use ndarray::Array1;
//!
//! // Minimize the sphere function: f(x) = sum(x_i^2)
//! let bounds = [(-5.0, 5.0), (-5.0, 5.0)];
//! let config = DEConfigBuilder::new()
//!     .maxiter(100)
//!     .std_conv(0.0)
//!     .seed(42)
//!     .build()
//!     .expect("invalid config");
//!
//! let mut sphere = |x: &Array1<f64>| x.iter().map(|&xi| xi * xi).sum::<f64>();
//! let result = differential_evolution(&mut sphere, &bounds, config)
//!     .expect("optimization should succeed");
//!
//! assert!(result.fun < 1e-6);
//! ```
#![doc = include_str!("../README.md")]
#![warn(missing_docs)]

pub mod error;
pub use error::{DEError, Result, SolveError};

use std::fmt;
use std::str::FromStr;

use ndarray::{Array1, Array2};
use rand::Rng;

/// Trial acceptance (Lampinen selection rule).
pub mod accept_trial;
/// Integer variable handling for mixed-integer optimization.
pub mod apply_integrality;
/// Cancellation token shared with the caller.
pub mod cancellation;
/// Linear and nonlinear constraints and their evaluator.
pub mod constraints;
/// The objective trait consumed by the solver.
pub mod cost_function;
/// Binomial and exponential crossover.
pub mod crossover;
/// Utilities for selecting distinct random indices from a population.
pub mod distinct_indices;
/// Latin Hypercube, random and explicit initialization.
pub mod init;
/// Mutation kinds and trial generation.
pub mod mutation_engine;
/// Normalized <-> physical coordinate mapping.
pub mod parameter_space;
/// Local refinement of the final best candidate.
pub mod polish;
/// Candidate table with energies, feasibility and violations.
pub mod population;
/// The solver and its generation loop.
pub mod solver;

/// Comprehensive tests for DE strategies and features.
#[cfg(test)]
mod de_tests;
/// Convenience entry point building and running a solver.
pub mod differential_evolution;
/// Internal helper functions for DE implementation.
pub mod impl_helpers;

pub use accept_trial::{Fitness, accept_trial};
pub use cancellation::{CancellationToken, Evaluation};
pub use constraints::{Constraint, ConstraintEvaluator, LinearConstraint, NonlinearConstraint};
pub use cost_function::CostFunction;
pub use crossover::Crossover;
pub use differential_evolution::differential_evolution;
pub use mutation_engine::{MutationEngine, MutationKind};
pub use parameter_space::ParameterSpace;
pub use population::Population;
pub use solver::DifferentialEvolution;

/// Callback function type
pub type CallbackFn = Box<dyn FnMut(&DEIntermediate) -> CallbackAction + Send>;

/// Differential Evolution mutation/crossover strategy.
///
/// The strategy name follows the pattern `{mutation}{n}{crossover}` where:
/// - `mutation`: Base vector selection (Best, Rand, CurrentToBest, RandToBest)
/// - `n`: Number of difference vectors (1 or 2)
/// - `crossover`: Crossover type (Bin = binomial, Exp = exponential)
///
/// In the variant formulas `b` is the promoted best, `x` the target and
/// `r*` distinct random members.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Strategy {
    /// `b + F(r0 - r1)`, uniform crossover (the default)
    #[default]
    Best1Bin,
    /// `b + F(r0 - r1)`, run-length crossover
    Best1Exp,
    /// `r0 + F(r1 - r2)`, uniform crossover
    Rand1Bin,
    /// `r0 + F(r1 - r2)`, run-length crossover
    Rand1Exp,
    /// `r0 + F(r1 + r2 - r3 - r4)`, uniform crossover
    Rand2Bin,
    /// `r0 + F(r1 + r2 - r3 - r4)`, run-length crossover
    Rand2Exp,
    /// `x + F(b - x) + F(r0 - r1)`, uniform crossover
    CurrentToBest1Bin,
    /// `x + F(b - x) + F(r0 - r1)`, run-length crossover
    CurrentToBest1Exp,
    /// `b + F(r0 + r1 - r2 - r3)`, uniform crossover
    Best2Bin,
    /// `b + F(r0 + r1 - r2 - r3)`, run-length crossover
    Best2Exp,
    /// `r0 + F(b - r0) + F(r1 - r2)`, uniform crossover
    RandToBest1Bin,
    /// `r0 + F(b - r0) + F(r1 - r2)`, run-length crossover
    RandToBest1Exp,
}

impl Strategy {
    /// Every strategy, binomial variants first.
    pub const ALL: [Strategy; 12] = [
        Strategy::Best1Bin,
        Strategy::Rand1Bin,
        Strategy::RandToBest1Bin,
        Strategy::CurrentToBest1Bin,
        Strategy::Best2Bin,
        Strategy::Rand2Bin,
        Strategy::Best1Exp,
        Strategy::Rand1Exp,
        Strategy::RandToBest1Exp,
        Strategy::CurrentToBest1Exp,
        Strategy::Best2Exp,
        Strategy::Rand2Exp,
    ];

    /// Mutation half of the strategy.
    pub fn mutation_kind(self) -> MutationKind {
        match self {
            Strategy::Best1Bin | Strategy::Best1Exp => MutationKind::Best1,
            Strategy::Rand1Bin | Strategy::Rand1Exp => MutationKind::Rand1,
            Strategy::Rand2Bin | Strategy::Rand2Exp => MutationKind::Rand2,
            Strategy::CurrentToBest1Bin | Strategy::CurrentToBest1Exp => {
                MutationKind::CurrentToBest1
            }
            Strategy::Best2Bin | Strategy::Best2Exp => MutationKind::Best2,
            Strategy::RandToBest1Bin | Strategy::RandToBest1Exp => MutationKind::RandToBest1,
        }
    }

    /// Crossover half of the strategy.
    pub fn crossover(self) -> Crossover {
        match self {
            Strategy::Best1Bin
            | Strategy::Rand1Bin
            | Strategy::Rand2Bin
            | Strategy::CurrentToBest1Bin
            | Strategy::Best2Bin
            | Strategy::RandToBest1Bin => Crossover::Binomial,
            _ => Crossover::Exponential,
        }
    }
}

impl FromStr for Strategy {
    type Err = DEError;
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let t = s.to_lowercase();
        match t.as_str() {
            "best1bin" | "best1" => Ok(Strategy::Best1Bin),
            "best1exp" => Ok(Strategy::Best1Exp),
            "rand1bin" | "rand1" => Ok(Strategy::Rand1Bin),
            "rand1exp" => Ok(Strategy::Rand1Exp),
            "rand2bin" | "rand2" => Ok(Strategy::Rand2Bin),
            "rand2exp" => Ok(Strategy::Rand2Exp),
            "currenttobest1bin" | "current-to-best1bin" | "current_to_best1bin" => {
                Ok(Strategy::CurrentToBest1Bin)
            }
            "currenttobest1exp" | "current-to-best1exp" | "current_to_best1exp" => {
                Ok(Strategy::CurrentToBest1Exp)
            }
            "best2bin" | "best2" => Ok(Strategy::Best2Bin),
            "best2exp" => Ok(Strategy::Best2Exp),
            "randtobest1bin" | "rand-to-best1bin" | "rand_to_best1bin" => {
                Ok(Strategy::RandToBest1Bin)
            }
            "randtobest1exp" | "rand-to-best1exp" | "rand_to_best1exp" => {
                Ok(Strategy::RandToBest1Exp)
            }
            _ => Err(DEError::UnknownStrategy(s.to_string())),
        }
    }
}

/// Mutation setting: either a fixed factor or a uniform range (dithering).
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Mutation {
    /// Fixed mutation factor F in [0, 2).
    Factor(f64),
    /// Dithering range [min, max) with 0 <= min < max <= 2, redrawn once per
    /// generation.
    Range {
        /// Minimum mutation factor.
        min: f64,
        /// Maximum mutation factor.
        max: f64,
    },
}

impl Default for Mutation {
    fn default() -> Self {
        Mutation::Range { min: 0.5, max: 1.0 }
    }
}

impl Mutation {
    pub(crate) fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> f64 {
        match *self {
            Mutation::Factor(f) => f,
            Mutation::Range { min, max } => rng.random_range(min..max),
        }
    }

    fn validate(&self) -> Result<()> {
        match *self {
            Mutation::Factor(f) if !(0.0..2.0).contains(&f) => {
                Err(DEError::InvalidMutationFactor { factor: f })
            }
            Mutation::Range { min, max } if !(0.0..=2.0).contains(&min) || min >= max => {
                Err(DEError::InvalidMutationFactor { factor: min })
            }
            Mutation::Range { max, .. } if max > 2.0 => {
                Err(DEError::InvalidMutationFactor { factor: max })
            }
            _ => Ok(()),
        }
    }
}

/// Initialization scheme for the population.
#[derive(Debug, Clone, Default)]
pub enum Init {
    /// Latin Hypercube Sampling for better space coverage.
    #[default]
    LatinHypercube,
    /// Uniform random initialization.
    Random,
    /// Explicit population in normalized coordinates (M x n, M >= 5),
    /// clipped into [0, 1].
    Population(Array2<f64>),
}

/// Polishing configuration.
#[derive(Debug, Clone)]
pub struct PolishConfig {
    /// Whether polishing is enabled.
    pub enabled: bool,
    /// Maximum function evaluations for polishing; `None` means `200 * n`.
    pub maxeval: Option<usize>,
}

impl Default for PolishConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            maxeval: None,
        }
    }
}

/// Configuration for the Differential Evolution optimizer.
///
/// This struct holds all parameters controlling the DE algorithm behavior,
/// including population size and culling, mutation/crossover settings,
/// constraints, and termination criteria.
pub struct DEConfig {
    /// Maximum number of generations (iterations).
    pub maxiter: usize,
    /// Generations the best energy may change by less than `tol` before the
    /// run is declared stalled.
    pub maxiter_conv: usize,
    /// Optional budget of cost evaluations.
    pub maxfun: Option<usize>,
    /// Population size multiplier (NP = max(popsize, minpopsize) * n).
    pub popsize: usize,
    /// Culling never shrinks the population below `minpopsize * n`.
    pub minpopsize: usize,
    /// Members with an energy above this value are culled after each
    /// generation.
    pub threshold: f64,
    /// Relative tolerance for convergence (population energy std dev).
    pub tol: f64,
    /// Absolute tolerance for convergence.
    pub atol: f64,
    /// Stop as soon as the energy std dev drops below this value.
    pub std_conv: f64,
    /// Mutation factor setting.
    pub mutation: Mutation,
    /// Crossover probability CR in [0, 1].
    pub recombination: f64,
    /// Mutation/crossover strategy.
    pub strategy: Strategy,
    /// Population initialization scheme.
    pub init: Init,
    /// Optional random seed for reproducibility.
    pub seed: Option<u64>,
    /// Optional integrality mask; true => variable is integer-constrained.
    pub integrality: Option<Vec<bool>>,
    /// Optional initial guess placed in population slot 0.
    pub x0: Option<Array1<f64>>,
    /// Log per-generation progress at `info` instead of `debug`.
    pub disp: bool,
    /// Optional per-iteration callback (may stop early).
    pub callback: Option<CallbackFn>,
    /// Constraints `lb <= residual(x) <= ub`.
    pub constraints: Vec<Box<dyn Constraint>>,
    /// Polishing configuration.
    pub polish: PolishConfig,
}

impl Default for DEConfig {
    fn default() -> Self {
        Self {
            maxiter: 1000,
            maxiter_conv: 10,
            maxfun: None,
            popsize: 15,
            minpopsize: 10,
            threshold: 150.0,
            tol: 1e-2,
            atol: 0.0,
            std_conv: 1.0,
            mutation: Mutation::default(),
            recombination: 0.7,
            strategy: Strategy::Best1Bin,
            init: Init::default(),
            seed: None,
            integrality: None,
            x0: None,
            disp: false,
            callback: None,
            constraints: Vec::new(),
            polish: PolishConfig::default(),
        }
    }
}

impl fmt::Debug for DEConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DEConfig")
            .field("maxiter", &self.maxiter)
            .field("maxiter_conv", &self.maxiter_conv)
            .field("maxfun", &self.maxfun)
            .field("popsize", &self.popsize)
            .field("minpopsize", &self.minpopsize)
            .field("threshold", &self.threshold)
            .field("tol", &self.tol)
            .field("atol", &self.atol)
            .field("std_conv", &self.std_conv)
            .field("mutation", &self.mutation)
            .field("recombination", &self.recombination)
            .field("strategy", &self.strategy)
            .field("seed", &self.seed)
            .field("constraints", &self.constraints.len())
            .field("polish", &self.polish)
            .finish_non_exhaustive()
    }
}

/// Fluent builder for `DEConfig` for ergonomic configuration.
///
/// # Example
///
/// ```rust
/// use impa_differential_evolution::{DEConfigBuilder, Strategy, Mutation};
///
/// let config = DEConfigBuilder::new()
///     .maxiter(500)
///     .popsize(20)
///     .strategy(Strategy::Best1Bin)
///     .mutation(Mutation::Factor(0.8))
///     .recombination(0.9)
///     .seed(42)
///     .build();
/// assert!(config.is_ok());
/// ```
pub struct DEConfigBuilder {
    cfg: DEConfig,
}
impl Default for DEConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl DEConfigBuilder {
    /// Creates a new builder with default configuration.
    pub fn new() -> Self {
        Self {
            cfg: DEConfig::default(),
        }
    }
    /// Sets the maximum number of iterations.
    pub fn maxiter(mut self, v: usize) -> Self {
        self.cfg.maxiter = v;
        self
    }
    /// Sets the number of stalled generations tolerated.
    pub fn maxiter_conv(mut self, v: usize) -> Self {
        self.cfg.maxiter_conv = v;
        self
    }
    /// Sets the cost evaluation budget.
    pub fn maxfun(mut self, v: usize) -> Self {
        self.cfg.maxfun = Some(v);
        self
    }
    /// Sets the population size multiplier.
    pub fn popsize(mut self, v: usize) -> Self {
        self.cfg.popsize = v;
        self
    }
    /// Sets the minimum population multiplier kept by culling.
    pub fn minpopsize(mut self, v: usize) -> Self {
        self.cfg.minpopsize = v;
        self
    }
    /// Sets the culling energy threshold.
    pub fn threshold(mut self, v: f64) -> Self {
        self.cfg.threshold = v;
        self
    }
    /// Sets the relative convergence tolerance.
    pub fn tol(mut self, v: f64) -> Self {
        self.cfg.tol = v;
        self
    }
    /// Sets the absolute convergence tolerance.
    pub fn atol(mut self, v: f64) -> Self {
        self.cfg.atol = v;
        self
    }
    /// Sets the early-exit energy spread.
    pub fn std_conv(mut self, v: f64) -> Self {
        self.cfg.std_conv = v;
        self
    }
    /// Sets the mutation factor configuration.
    pub fn mutation(mut self, v: Mutation) -> Self {
        self.cfg.mutation = v;
        self
    }
    /// Sets the crossover probability (CR).
    pub fn recombination(mut self, v: f64) -> Self {
        self.cfg.recombination = v;
        self
    }
    /// Sets the mutation/crossover strategy.
    pub fn strategy(mut self, v: Strategy) -> Self {
        self.cfg.strategy = v;
        self
    }
    /// Sets the population initialization scheme.
    pub fn init(mut self, v: Init) -> Self {
        self.cfg.init = v;
        self
    }
    /// Sets the random seed for reproducibility.
    pub fn seed(mut self, v: u64) -> Self {
        self.cfg.seed = Some(v);
        self
    }
    /// Sets the integrality mask for mixed-integer optimization.
    pub fn integrality(mut self, v: Vec<bool>) -> Self {
        self.cfg.integrality = Some(v);
        self
    }
    /// Sets an initial guess to seed the population.
    pub fn x0(mut self, v: Array1<f64>) -> Self {
        self.cfg.x0 = Some(v);
        self
    }
    /// Enables/disables progress display.
    pub fn disp(mut self, v: bool) -> Self {
        self.cfg.disp = v;
        self
    }
    /// Sets a per-iteration callback function.
    pub fn callback<F>(mut self, cb: F) -> Self
    where
        F: FnMut(&DEIntermediate) -> CallbackAction + Send + 'static,
    {
        self.cfg.callback = Some(Box::new(cb));
        self
    }
    /// Adds a constraint.
    pub fn constraint<C: Constraint + 'static>(mut self, c: C) -> Self {
        self.cfg.constraints.push(Box::new(c));
        self
    }
    /// Sets the polishing configuration.
    pub fn polish(mut self, pol: PolishConfig) -> Self {
        self.cfg.polish = pol;
        self
    }
    /// Builds and returns the configuration.
    ///
    /// # Errors
    ///
    /// Returns `DEError::InvalidMutationFactor` or
    /// `DEError::InvalidCrossoverRate` for out-of-range settings.
    pub fn build(self) -> error::Result<DEConfig> {
        self.cfg.mutation.validate()?;
        if !(0.0..=1.0).contains(&self.cfg.recombination) {
            return Err(DEError::InvalidCrossoverRate {
                rate: self.cfg.recombination,
            });
        }
        Ok(self.cfg)
    }
}

/// Solver lifecycle; the last four variants are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SolverState {
    /// Constructed, nothing evaluated yet.
    Uninitialized,
    /// Evaluating the initial population.
    EvaluatingInitial,
    /// Running a generation.
    Evolving,
    /// Removing weak members after a generation.
    Culling,
    /// Energy spread within `atol + tol * |mean|`.
    Converged,
    /// Best energy stopped moving, or the spread fell below `std_conv`.
    Stalled,
    /// Stopped through the cancellation token.
    Aborted,
    /// Iteration or evaluation budget used up.
    Exhausted,
    /// The callback asked to stop.
    Stopped,
}

impl SolverState {
    /// Whether the run has ended.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            SolverState::Converged
                | SolverState::Stalled
                | SolverState::Aborted
                | SolverState::Exhausted
                | SolverState::Stopped
        )
    }
}

/// Result/report of a DE optimization run.
///
/// Contains the optimal solution, termination status, and statistics.
#[derive(Clone)]
pub struct DEReport {
    /// The optimal solution vector, in physical units.
    pub x: Array1<f64>,
    /// The objective function value at the optimal solution.
    pub fun: f64,
    /// Whether the run ended on a tolerance and with a feasible result.
    pub success: bool,
    /// Human-readable status message.
    pub message: String,
    /// Terminal state of the solver.
    pub status: SolverState,
    /// Number of iterations (generations) performed.
    pub nit: usize,
    /// Number of function evaluations performed.
    pub nfev: usize,
    /// Final population in physical units (NP x n), after culling.
    pub population: Array2<f64>,
    /// Fitness values for each population member.
    pub population_energies: Array1<f64>,
    /// Largest constraint violation of `x` (0 when feasible).
    pub maxcv: f64,
}

impl fmt::Debug for DEReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DEReport")
            .field("x", &format!("len={}", self.x.len()))
            .field("fun", &self.fun)
            .field("success", &self.success)
            .field("message", &self.message)
            .field("status", &self.status)
            .field("nit", &self.nit)
            .field("nfev", &self.nfev)
            .field(
                "population",
                &format!("{}x{}", self.population.nrows(), self.population.ncols()),
            )
            .field(
                "population_energies",
                &format!("len={}", self.population_energies.len()),
            )
            .field("maxcv", &self.maxcv)
            .finish()
    }
}

/// Information passed to callback after each generation.
pub struct DEIntermediate {
    /// Current best solution vector (physical units).
    pub x: Array1<f64>,
    /// Current best objective value.
    pub fun: f64,
    /// Population energy std dev divided by |mean|; `inf` while any member
    /// is unevaluated.
    pub convergence: f64,
    /// Current iteration number.
    pub iter: usize,
    /// Current population in physical units.
    pub population: Array2<f64>,
}

/// Action returned by callback to control optimization flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallbackAction {
    /// Continue optimization.
    Continue,
    /// Stop optimization early.
    Stop,
}
