use log::{Level, debug, info, log};
use ndarray::Array1;
use rand::SeedableRng;
use rand::rngs::StdRng;

use crate::accept_trial::{Fitness, accept_trial};
use crate::cancellation::{CancellationToken, Evaluation};
use crate::constraints::ConstraintEvaluator;
use crate::cost_function::CostFunction;
use crate::error::{DEError, Result};
use crate::init::{MIN_POPULATION, init_from_array, init_latin_hypercube, init_random};
use crate::mutation_engine::MutationEngine;
use crate::parameter_space::ParameterSpace;
use crate::population::Population;
use crate::polish::polish;
use crate::{CallbackAction, DEConfig, DEIntermediate, DEReport, Init, SolverState};

/// How a pass over the population ended.
pub(crate) enum Step {
    Completed,
    Aborted,
    BudgetSpent,
}

/// Differential Evolution optimizer.
///
/// A population-based stochastic optimizer for bounded, optionally
/// constrained and mixed-integer problems. Use [`DifferentialEvolution::new`]
/// to create an instance, then call [`solve`](Self::solve) with a
/// [`CostFunction`]. The population is rebuilt at the start of every solve.
pub struct DifferentialEvolution {
    pub(crate) space: ParameterSpace,
    pub(crate) config: DEConfig,
    pub(crate) constraints: ConstraintEvaluator,
    pub(crate) engine: MutationEngine,
    pub(crate) population: Population,
    pub(crate) rng: StdRng,
    pub(crate) nfev: usize,
    pub(crate) min_population: usize,
    pub(crate) population_density: f64,
    pub(crate) token: CancellationToken,
    pub(crate) state: SolverState,
}

impl DifferentialEvolution {
    /// Creates a solver over `bounds` configured by `config`.
    ///
    /// # Errors
    ///
    /// Bounds errors from [`ParameterSpace::new`],
    /// `DEError::InfeasiblePopulation` when the population would be smaller
    /// than 5 or than the strategy needs, shape errors for `x0`, an explicit
    /// initial population or the constraints.
    pub fn new(bounds: &[(f64, f64)], mut config: DEConfig) -> Result<Self> {
        let space = ParameterSpace::new(bounds, config.integrality.as_deref())?;
        let n = space.dim();

        let probe = space.scale(Array1::from_elem(n, 0.5).view());
        let constraints =
            ConstraintEvaluator::new(std::mem::take(&mut config.constraints), probe.view())?;
        let engine = MutationEngine::new(config.strategy, config.mutation, config.recombination);

        let required = MIN_POPULATION.max(engine.kind().samples() + 1);
        let npop = config.popsize.max(config.minpopsize) * n;
        if !matches!(config.init, Init::Population(_)) && npop < required {
            return Err(DEError::InfeasiblePopulation {
                pop_size: npop,
                required,
            });
        }

        if let Some(x0) = &config.x0 {
            if x0.len() != n {
                return Err(DEError::X0DimensionMismatch {
                    expected: n,
                    got: x0.len(),
                });
            }
            if let Some(index) = (0..n).find(|&i| x0[i] < space.lower()[i] || x0[i] > space.upper()[i]) {
                return Err(DEError::X0OutOfBounds {
                    index,
                    value: x0[index],
                });
            }
        }

        let rng = match config.seed {
            Some(s) => StdRng::seed_from_u64(s),
            None => {
                let mut thread_rng = rand::rng();
                StdRng::from_rng(&mut thread_rng)
            }
        };

        let mut de = Self {
            min_population: (config.minpopsize * n).max(required),
            space,
            config,
            constraints,
            engine,
            population: Population::new(ndarray::Array2::zeros((0, n)), 0),
            rng,
            nfev: 0,
            population_density: 0.0,
            token: CancellationToken::new(),
            state: SolverState::Uninitialized,
        };
        de.population = de.initial_population()?;
        if de.population.len() < required {
            return Err(DEError::InfeasiblePopulation {
                pop_size: de.population.len(),
                required,
            });
        }
        de.population_density = de.population.len() as f64 / de.population.volume();
        debug!(
            "DE init: {} dimensions, population={}, floor={}, density={:.3e}",
            n,
            de.population.len(),
            de.min_population,
            de.population_density
        );
        Ok(de)
    }

    /// Replaces the internal cancellation token with a shared one.
    pub fn with_cancellation_token(mut self, token: CancellationToken) -> Self {
        self.token = token;
        self
    }

    /// Handle that aborts the running solve when cancelled.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// Requests an abort; the solve stops before its next cost evaluation.
    pub fn abort(&self) {
        self.token.cancel();
    }

    /// Current lifecycle state.
    pub fn state(&self) -> SolverState {
        self.state
    }

    /// The search space.
    pub fn space(&self) -> &ParameterSpace {
        &self.space
    }

    /// Current population.
    pub fn population(&self) -> &Population {
        &self.population
    }

    /// Members per unit volume of the initial population's bounding box.
    pub fn population_density(&self) -> f64 {
        self.population_density
    }

    /// Smallest population culling may leave.
    pub fn min_population(&self) -> usize {
        self.min_population
    }

    /// Mutable access to configuration
    pub fn config_mut(&mut self) -> &mut DEConfig {
        &mut self.config
    }

    fn initial_population(&mut self) -> Result<Population> {
        let n = self.space.dim();
        let npop = self.config.popsize.max(self.config.minpopsize) * n;
        let members = match &self.config.init {
            Init::LatinHypercube => init_latin_hypercube(npop, n, &mut self.rng),
            Init::Random => init_random(npop, n, &mut self.rng),
            Init::Population(p) => init_from_array(p.view(), n)?,
        };
        let mut population = Population::new(members, self.constraints.width());
        if let Some(x0) = &self.config.x0 {
            let u = self.space.unscale(x0.view()).mapv(|v| v.clamp(0.0, 1.0));
            population.set_member(0, u.view());
        }
        Ok(population)
    }

    /// Runs the optimization and returns a report.
    ///
    /// Errors of the cost function end the run immediately and are returned
    /// unchanged. Cancellation is not an error: the report then has
    /// `success == false` and `message == "aborted"`.
    pub fn solve<C: CostFunction>(
        &mut self,
        cost: &mut C,
    ) -> std::result::Result<DEReport, C::Error> {
        if self.state != SolverState::Uninitialized {
            // configuration was validated when the first population was built
            if let Ok(p) = self.initial_population() {
                self.population = p;
            }
            self.nfev = 0;
        }

        let level = if self.config.disp {
            Level::Info
        } else {
            Level::Debug
        };

        self.state = SolverState::EvaluatingInitial;
        match self.evaluate_initial(cost)? {
            Step::Completed => {}
            Step::Aborted => return Ok(self.finish_aborted(0)),
            Step::BudgetSpent => {
                self.state = SolverState::Exhausted;
                let msg = "Maximum number of function evaluations has been reached.";
                return Ok(self.finish_report(0, msg.to_string(), false));
            }
        }

        let (mean, std) = self.population.energy_stats();
        log!(
            level,
            "DE initial population: best={:.6e} mean={:.6e} std={:.3e}",
            self.population.energies()[0],
            mean,
            std
        );

        let mut nit = 0;
        let mut stalled_for = 0usize;
        let mut prev_best = self.population.energies()[0];
        let (status, message) = loop {
            if nit >= self.config.maxiter {
                break (
                    SolverState::Exhausted,
                    "Maximum number of iterations has been reached.".to_string(),
                );
            }
            nit += 1;

            self.state = SolverState::Evolving;
            match self.evolve_generation(cost)? {
                Step::Completed => {}
                Step::Aborted => return Ok(self.finish_aborted(nit)),
                Step::BudgetSpent => {
                    break (
                        SolverState::Exhausted,
                        "Maximum number of function evaluations has been reached.".to_string(),
                    );
                }
            }

            self.state = SolverState::Culling;
            let removed = self
                .population
                .cull(self.config.threshold, self.min_population);
            if removed > 0 {
                log!(
                    level,
                    "DE iter {:4}: culled {} members above {}, {} remain",
                    nit,
                    removed,
                    self.config.threshold,
                    self.population.len()
                );
            }

            let (_, std) = self.population.energy_stats();
            let best = self.population.energies()[0];
            log!(
                level,
                "DE iter {:4}  best_f={:.6e}  std={:.3e}  Np={}",
                nit,
                best,
                std,
                self.population.len()
            );

            if self.token.take() {
                return Ok(self.finish_aborted(nit));
            }

            if self.config.callback.is_some() {
                let intermediate = DEIntermediate {
                    x: self.best_x(),
                    fun: best,
                    convergence: self.convergence(),
                    iter: nit,
                    population: self.space.scale_population(self.population.members()),
                };
                let action = match self.config.callback.as_mut() {
                    Some(cb) => cb(&intermediate),
                    None => CallbackAction::Continue,
                };
                if action == CallbackAction::Stop {
                    break (
                        SolverState::Stopped,
                        "callback function requested stop early".to_string(),
                    );
                }
            }

            if self.converged() {
                break (
                    SolverState::Converged,
                    "Optimization terminated successfully.".to_string(),
                );
            }

            if (prev_best - best).abs() < self.config.tol {
                stalled_for += 1;
            } else {
                stalled_for = 0;
            }
            prev_best = best;
            if stalled_for >= self.config.maxiter_conv {
                break (
                    SolverState::Stalled,
                    format!(
                        "Best energy changed by less than {} for {} generations.",
                        self.config.tol, stalled_for
                    ),
                );
            }

            if std < self.config.std_conv {
                break (
                    SolverState::Stalled,
                    format!(
                        "Energy spread {:.3e} fell below {:.3e}.",
                        std, self.config.std_conv
                    ),
                );
            }
        };

        self.state = status;
        let success = matches!(status, SolverState::Converged | SolverState::Stalled);
        log!(level, "DE finished after {} generations: {}", nit, message);

        if self.config.polish.enabled
            && !self.space.all_integral()
            && matches!(
                status,
                SolverState::Converged | SolverState::Stalled | SolverState::Exhausted
            )
        {
            let budget = self.polish_budget();
            if budget > 0 {
                let x0 = self.best_x();
                let outcome = polish(
                    cost,
                    &x0,
                    self.population.energies()[0],
                    &self.space,
                    &self.constraints,
                    &self.token,
                    budget,
                )?;
                self.nfev += outcome.nfev;
                if outcome.cancelled {
                    return Ok(self.finish_aborted(nit));
                }
                if let Some((x, fun)) = outcome.improved {
                    info!(
                        "DE polish improved best from {:.6e} to {:.6e} in {} evaluations",
                        self.population.energies()[0],
                        fun,
                        outcome.nfev
                    );
                    return Ok(self.finish_polished(nit, message, success, x, fun));
                }
            }
        }

        Ok(self.finish_report(nit, message, success))
    }

    fn polish_budget(&self) -> usize {
        let n = self.space.dim();
        let budget = self.config.polish.maxeval.unwrap_or(200 * n);
        match self.config.maxfun {
            Some(maxfun) => budget.min(maxfun.saturating_sub(self.nfev)),
            None => budget,
        }
    }

    fn budget_spent(&self) -> bool {
        self.config.maxfun.is_some_and(|m| self.nfev >= m)
    }

    /// Feasibility of every member, then energies of the feasible ones;
    /// infeasible members keep `+inf`.
    fn evaluate_initial<C: CostFunction>(
        &mut self,
        cost: &mut C,
    ) -> std::result::Result<Step, C::Error> {
        let physical = self.space.scale_population(self.population.members());
        let (feasible, violations) = self.constraints.evaluate_population(physical.view());
        for i in 0..self.population.len() {
            self.population
                .set_feasibility(i, feasible[i], violations.row(i));
        }
        for (i, x) in physical.outer_iter().enumerate() {
            if !feasible[i] {
                continue;
            }
            if self.budget_spent() {
                self.population.promote_best();
                return Ok(Step::BudgetSpent);
            }
            match cost.evaluate(&x.to_owned(), &self.token)? {
                Evaluation::Done(e) => {
                    self.nfev += 1;
                    self.population.set_energy(i, e);
                }
                Evaluation::Cancelled => return Ok(Step::Aborted),
            }
        }
        self.population.promote_best();
        Ok(Step::Completed)
    }

    /// One pass over every slot: build a trial, evaluate it, keep it when
    /// the acceptance rule allows and promote it when it also beats slot 0.
    fn evolve_generation<C: CostFunction>(
        &mut self,
        cost: &mut C,
    ) -> std::result::Result<Step, C::Error> {
        let scale = self.engine.sample_scale(&mut self.rng);
        for candidate in 0..self.population.len() {
            if self.budget_spent() {
                return Ok(Step::BudgetSpent);
            }
            let trial =
                self.engine
                    .trial(self.population.members(), candidate, scale, &mut self.rng);
            let x = self.space.scale(trial.view());
            let check = self.constraints.evaluate(x.view());

            let energy = if check.feasible {
                match cost.evaluate(&x, &self.token)? {
                    Evaluation::Done(e) => {
                        self.nfev += 1;
                        e
                    }
                    Evaluation::Cancelled => return Ok(Step::Aborted),
                }
            } else if self.token.take() {
                return Ok(Step::Aborted);
            } else {
                f64::INFINITY
            };

            let fit = Fitness {
                energy,
                feasible: check.feasible,
                violation: check.violation.view(),
            };
            if accept_trial(&fit, &self.population.fitness(candidate)) {
                self.population.replace(
                    candidate,
                    trial.view(),
                    energy,
                    check.feasible,
                    check.violation.view(),
                );
                if candidate != 0 && accept_trial(&fit, &self.population.fitness(0)) {
                    self.population.promote_best();
                }
            }
        }
        Ok(Step::Completed)
    }
}
