use crate::{
    CallbackAction, CancellationToken, CostFunction, DEConfigBuilder, DEError, DifferentialEvolution,
    Evaluation, Init, LinearConstraint, PolishConfig, SolveError, SolverState, Strategy,
    differential_evolution,
};
use ndarray::{Array1, array};
use std::sync::{Arc, Mutex};

fn sphere(x: &Array1<f64>) -> f64 {
    x.iter().map(|&xi| xi * xi).sum::<f64>()
}

fn bowl(x: &Array1<f64>) -> f64 {
    (x[0] - 3.0).powi(2) + (x[1] + 2.0).powi(2)
}

#[cfg(test)]
mod strategy_tests {
    use super::*;

    #[test]
    fn test_every_strategy_converges_on_sphere() {
        for (k, strategy) in Strategy::ALL.into_iter().enumerate() {
            let config = DEConfigBuilder::new()
                .seed(100 + k as u64)
                .maxiter(300)
                .maxiter_conv(50)
                .tol(1e-8)
                .std_conv(0.0)
                .strategy(strategy)
                .polish(PolishConfig {
                    enabled: false,
                    maxeval: None,
                })
                .build()
                .expect("valid config");

            let mut f = sphere;
            let report = differential_evolution(&mut f, &[(-5.0, 5.0), (-5.0, 5.0)], config)
                .expect("solver builds");
            assert!(
                report.fun < 1e-3,
                "{strategy:?} should converge near origin: f={}",
                report.fun
            );
        }
    }

    #[test]
    fn test_same_seed_same_result() {
        let run = || {
            let config = DEConfigBuilder::new()
                .seed(9)
                .maxiter(40)
                .build()
                .unwrap();
            let mut f = bowl;
            differential_evolution(&mut f, &[(-10.0, 10.0), (-10.0, 10.0)], config).unwrap()
        };
        let a = run();
        let b = run();
        assert_eq!(a.x, b.x);
        assert_eq!(a.nfev, b.nfev);
        assert_eq!(a.nit, b.nit);
    }
}

#[cfg(test)]
mod scenario_tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn test_unconstrained_bowl() {
        let config = DEConfigBuilder::new()
            .seed(42)
            .maxiter(200)
            .build()
            .unwrap();
        let mut f = bowl;
        let report = differential_evolution(&mut f, &[(-10.0, 10.0), (-10.0, 10.0)], config).unwrap();

        assert!(report.success, "{}", report.message);
        assert!(report.nit <= 200);
        assert_abs_diff_eq!(report.x[0], 3.0, epsilon = 1e-2);
        assert_abs_diff_eq!(report.x[1], -2.0, epsilon = 1e-2);
    }

    #[test]
    fn test_unconstrained_bowl_without_polish() {
        let config = DEConfigBuilder::new()
            .seed(42)
            .maxiter(200)
            .maxiter_conv(1000)
            .tol(1e-6)
            .atol(1e-8)
            .std_conv(0.0)
            .polish(PolishConfig {
                enabled: false,
                maxeval: None,
            })
            .build()
            .unwrap();
        let mut f = bowl;
        let report = differential_evolution(&mut f, &[(-10.0, 10.0), (-10.0, 10.0)], config).unwrap();

        assert_abs_diff_eq!(report.x[0], 3.0, epsilon = 1e-2);
        assert_abs_diff_eq!(report.x[1], -2.0, epsilon = 1e-2);
    }

    #[test]
    fn test_linear_constraint_excludes_minimum() {
        // x + y >= 3 cuts off (3, -2); the closest feasible point is (4, -1)
        let config = DEConfigBuilder::new()
            .seed(7)
            .popsize(20)
            .maxiter(300)
            .maxiter_conv(1000)
            .tol(1e-10)
            .std_conv(0.0)
            .constraint(LinearConstraint::new(
                array![[1.0, 1.0]],
                array![3.0],
                array![f64::INFINITY],
            ))
            .build()
            .unwrap();
        let mut f = bowl;
        let report = differential_evolution(&mut f, &[(-10.0, 10.0), (-10.0, 10.0)], config).unwrap();

        assert_eq!(report.maxcv, 0.0);
        assert!(report.x[0] + report.x[1] >= 3.0);
        assert_abs_diff_eq!(report.x[0], 4.0, epsilon = 2e-2);
        assert_abs_diff_eq!(report.x[1], -1.0, epsilon = 2e-2);
        assert_abs_diff_eq!(report.fun, 2.0, epsilon = 5e-2);
    }

    #[test]
    fn test_integral_dimension_is_exact() {
        let config = DEConfigBuilder::new()
            .seed(11)
            .maxiter(200)
            .maxiter_conv(30)
            .std_conv(0.0)
            .integrality(vec![false, true])
            .build()
            .unwrap();
        let mut f = |x: &Array1<f64>| (x[0] - 3.0).powi(2) + (x[1] + 2.3).powi(2);
        let report = differential_evolution(&mut f, &[(-10.0, 10.0), (-10.0, 10.0)], config).unwrap();

        assert_eq!(report.x[1], -2.0);
        assert_abs_diff_eq!(report.x[0], 3.0, epsilon = 1e-3);
        for row in report.population.rows() {
            assert_eq!(row[1], row[1].round());
        }
    }

    #[test]
    fn test_all_integral_skips_polish() {
        let config = DEConfigBuilder::new()
            .seed(5)
            .maxiter(100)
            .integrality(vec![true, true])
            .build()
            .unwrap();
        let mut f = bowl;
        let report = differential_evolution(&mut f, &[(-10.0, 10.0), (-10.0, 10.0)], config).unwrap();
        assert_eq!(report.x, array![3.0, -2.0]);
        assert_eq!(report.fun, 0.0);
    }
}

#[cfg(test)]
mod termination_tests {
    use super::*;

    #[test]
    fn test_maxfun_limits_evaluations() {
        let config = DEConfigBuilder::new()
            .seed(1)
            .maxfun(50)
            .std_conv(0.0)
            .build()
            .unwrap();
        let mut f = bowl;
        let report = differential_evolution(&mut f, &[(-10.0, 10.0), (-10.0, 10.0)], config).unwrap();
        assert!(report.nfev <= 50);
        assert!(!report.success);
        assert_eq!(report.status, SolverState::Exhausted);
        assert!(report.message.contains("function evaluations"));
    }

    #[test]
    fn test_maxiter_zero_only_evaluates_initial_population() {
        let config = DEConfigBuilder::new()
            .seed(1)
            .maxiter(0)
            .polish(PolishConfig {
                enabled: false,
                maxeval: None,
            })
            .build()
            .unwrap();
        let mut f = bowl;
        let report = differential_evolution(&mut f, &[(-10.0, 10.0), (-10.0, 10.0)], config).unwrap();
        assert_eq!(report.nit, 0);
        assert_eq!(report.nfev, 30);
        assert!(!report.success);
        assert_eq!(report.status, SolverState::Exhausted);
    }

    #[test]
    fn test_callback_stop() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let config = DEConfigBuilder::new()
            .seed(3)
            .std_conv(0.0)
            .callback(move |it| {
                sink.lock().unwrap().push(it.iter);
                if it.iter == 3 {
                    CallbackAction::Stop
                } else {
                    CallbackAction::Continue
                }
            })
            .build()
            .unwrap();
        let mut f = bowl;
        let report = differential_evolution(&mut f, &[(-10.0, 10.0), (-10.0, 10.0)], config).unwrap();
        assert_eq!(report.nit, 3);
        assert!(!report.success);
        assert_eq!(report.status, SolverState::Stopped);
        assert_eq!(report.message, "callback function requested stop early");
        assert_eq!(*seen.lock().unwrap(), vec![1, 2, 3]);
    }

    #[test]
    fn test_culling_never_drops_below_floor() {
        let sizes = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&sizes);
        let config = DEConfigBuilder::new()
            .seed(21)
            .popsize(20)
            .minpopsize(5)
            .threshold(10.0)
            .maxiter(60)
            .std_conv(0.0)
            .callback(move |it| {
                sink.lock().unwrap().push(it.population.nrows());
                CallbackAction::Continue
            })
            .build()
            .unwrap();
        let mut f = bowl;
        let mut de = DifferentialEvolution::new(&[(-10.0, 10.0), (-10.0, 10.0)], config).unwrap();
        assert_eq!(de.population().len(), 40);
        assert_eq!(de.min_population(), 10);
        let report = de.solve(&mut f).unwrap();

        let sizes = sizes.lock().unwrap();
        assert!(sizes[0] < 40, "weak members should be culled after the first generation");
        assert!(sizes.windows(2).all(|w| w[1] <= w[0]));
        assert!(sizes.iter().all(|&s| s >= 10));
        assert_eq!(report.population.nrows(), report.population_energies.len());
    }
}

#[cfg(test)]
mod termination_order_tests {
    use super::*;

    const BOUNDS: [(f64, f64); 2] = [(-10.0, 10.0), (-10.0, 10.0)];

    fn no_polish() -> PolishConfig {
        PolishConfig {
            enabled: false,
            maxeval: None,
        }
    }

    /// Initial members score 1, 2, ..., n and every later trial scores worse,
    /// so the population never changes: best stays at 1 with a wide spread.
    fn frozen_population(n: usize) -> impl FnMut(&Array1<f64>) -> f64 {
        let mut calls = 0usize;
        move |_x: &Array1<f64>| {
            calls += 1;
            if calls <= n { calls as f64 } else { 1e9 }
        }
    }

    #[test]
    fn test_flat_energies_converge() {
        let config = DEConfigBuilder::new()
            .seed(2)
            .std_conv(0.0)
            .polish(no_polish())
            .build()
            .unwrap();
        let mut f = |_x: &Array1<f64>| 1.0;
        let report = differential_evolution(&mut f, &BOUNDS, config).unwrap();
        assert_eq!(report.status, SolverState::Converged);
        assert_eq!(report.message, "Optimization terminated successfully.");
        assert_eq!(report.nit, 1);
        assert!(report.success);
    }

    #[test]
    fn test_convergence_wins_over_stall_and_spread() {
        // all three tests fire after the first generation
        let config = DEConfigBuilder::new()
            .seed(2)
            .maxiter_conv(1)
            .std_conv(1.0)
            .polish(no_polish())
            .build()
            .unwrap();
        let mut f = |_x: &Array1<f64>| 1.0;
        let report = differential_evolution(&mut f, &BOUNDS, config).unwrap();
        assert_eq!(report.status, SolverState::Converged);
        assert_eq!(report.message, "Optimization terminated successfully.");
        assert_eq!(report.nit, 1);
    }

    #[test]
    fn test_abort_wins_over_convergence() {
        let config = DEConfigBuilder::new()
            .seed(2)
            .std_conv(0.0)
            .polish(no_polish())
            .build()
            .unwrap();
        let mut de = DifferentialEvolution::new(&BOUNDS, config).unwrap();
        let token = de.cancellation_token();
        let mut calls = 0usize;
        // the last trial of the first generation raises the flag
        let mut f = |_x: &Array1<f64>| {
            calls += 1;
            if calls == 60 {
                token.cancel();
            }
            1.0
        };
        let report = de.solve(&mut f).unwrap();
        assert_eq!(calls, 60);
        assert_eq!(report.status, SolverState::Aborted);
        assert_eq!(report.message, "aborted");
        assert!(!report.success);
    }

    #[test]
    fn test_unchanged_best_stalls() {
        let config = DEConfigBuilder::new()
            .seed(6)
            .maxiter_conv(5)
            .std_conv(0.0)
            .polish(no_polish())
            .build()
            .unwrap();
        let mut f = frozen_population(30);
        let report = differential_evolution(&mut f, &BOUNDS, config).unwrap();
        assert_eq!(report.status, SolverState::Stalled);
        assert!(
            report.message.starts_with("Best energy changed by less than"),
            "{}",
            report.message
        );
        assert_eq!(report.nit, 5);
        assert_eq!(report.nfev, 30 + 5 * 30);
        assert_eq!(report.fun, 1.0);
        assert!(report.success);
    }

    #[test]
    fn test_narrow_spread_exits_early() {
        // std of 1..=30 is about 8.66
        let config = DEConfigBuilder::new()
            .seed(6)
            .maxiter_conv(100)
            .std_conv(10.0)
            .polish(no_polish())
            .build()
            .unwrap();
        let mut f = frozen_population(30);
        let report = differential_evolution(&mut f, &BOUNDS, config).unwrap();
        assert_eq!(report.status, SolverState::Stalled);
        assert!(report.message.starts_with("Energy spread"), "{}", report.message);
        assert_eq!(report.nit, 1);
        assert!(report.success);
    }

    #[test]
    fn test_stall_wins_over_spread() {
        let config = DEConfigBuilder::new()
            .seed(6)
            .maxiter_conv(1)
            .std_conv(10.0)
            .polish(no_polish())
            .build()
            .unwrap();
        let mut f = frozen_population(30);
        let report = differential_evolution(&mut f, &BOUNDS, config).unwrap();
        assert_eq!(report.status, SolverState::Stalled);
        assert!(
            report.message.starts_with("Best energy changed by less than"),
            "{}",
            report.message
        );
        assert_eq!(report.nit, 1);
    }

    #[test]
    fn test_iteration_limit_is_checked_last() {
        let config = DEConfigBuilder::new()
            .seed(6)
            .maxiter(3)
            .maxiter_conv(100)
            .std_conv(0.0)
            .polish(no_polish())
            .build()
            .unwrap();
        let mut f = frozen_population(30);
        let report = differential_evolution(&mut f, &BOUNDS, config).unwrap();
        assert_eq!(report.status, SolverState::Exhausted);
        assert_eq!(report.message, "Maximum number of iterations has been reached.");
        assert_eq!(report.nit, 3);
        assert!(!report.success);
    }
}

#[cfg(test)]
mod abort_tests {
    use super::*;
    use std::convert::Infallible;

    #[test]
    fn test_abort_latency_is_one_evaluation() {
        for k in [1usize, 7, 31, 95] {
            let config = DEConfigBuilder::new().seed(4).std_conv(0.0).build().unwrap();
            let mut de = DifferentialEvolution::new(&[(-10.0, 10.0), (-10.0, 10.0)], config).unwrap();
            let token = de.cancellation_token();
            let mut calls = 0usize;
            let mut f = |x: &Array1<f64>| {
                calls += 1;
                if calls == k {
                    token.cancel();
                }
                bowl(x)
            };
            let report = de.solve(&mut f).unwrap();
            assert_eq!(calls, k, "the token is checked before every evaluation");
            assert!(!report.success);
            assert_eq!(report.message, "aborted");
            assert_eq!(report.status, SolverState::Aborted);
            assert!(!de.cancellation_token().is_cancelled());
        }
    }

    #[test]
    fn test_pre_cancelled_token_evaluates_nothing() {
        let token = CancellationToken::new();
        token.cancel();
        let config = DEConfigBuilder::new().seed(4).build().unwrap();
        let mut de = DifferentialEvolution::new(&[(-1.0, 1.0); 3], config)
            .unwrap()
            .with_cancellation_token(token.clone());
        let mut calls = 0;
        let mut f = |x: &Array1<f64>| {
            calls += 1;
            sphere(x)
        };
        let report = de.solve(&mut f).unwrap();
        assert_eq!(calls, 0);
        assert_eq!(report.status, SolverState::Aborted);
        assert!(!token.is_cancelled());
    }

    struct InterruptedSweep {
        calls: usize,
        interrupt_at: usize,
    }

    impl CostFunction for InterruptedSweep {
        type Error = Infallible;
        fn cost(&mut self, x: &Array1<f64>) -> Result<Evaluation<f64>, Infallible> {
            self.calls += 1;
            if self.calls == self.interrupt_at {
                return Ok(Evaluation::Cancelled);
            }
            Ok(Evaluation::Done(sphere(x)))
        }
    }

    #[test]
    fn test_cost_reported_cancellation_aborts() {
        let config = DEConfigBuilder::new().seed(8).std_conv(0.0).build().unwrap();
        let mut cost = InterruptedSweep {
            calls: 0,
            interrupt_at: 45,
        };
        let report = differential_evolution(&mut cost, &[(-1.0, 1.0), (-1.0, 1.0)], config).unwrap();
        assert_eq!(cost.calls, 45);
        assert_eq!(report.nfev, 44);
        assert_eq!(report.message, "aborted");
        // slot 0 still holds the best member seen
        let best = report
            .population_energies
            .iter()
            .cloned()
            .fold(f64::INFINITY, f64::min);
        assert_eq!(report.fun, best);
    }
}

#[cfg(test)]
mod error_tests {
    use super::*;
    use std::io;

    struct FlakyInstrument {
        calls: usize,
    }

    impl CostFunction for FlakyInstrument {
        type Error = io::Error;
        fn cost(&mut self, x: &Array1<f64>) -> Result<Evaluation<f64>, io::Error> {
            self.calls += 1;
            if self.calls == 5 {
                return Err(io::Error::new(io::ErrorKind::TimedOut, "trigger timeout"));
            }
            Ok(Evaluation::Done(sphere(x)))
        }
    }

    #[test]
    fn test_cost_errors_propagate_unchanged() {
        let config = DEConfigBuilder::new().seed(2).build().unwrap();
        let mut cost = FlakyInstrument { calls: 0 };
        let err = differential_evolution(&mut cost, &[(-1.0, 1.0), (-1.0, 1.0)], config).unwrap_err();
        match err {
            SolveError::Cost(e) => assert_eq!(e.kind(), io::ErrorKind::TimedOut),
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(cost.calls, 5);
    }

    #[test]
    fn test_population_too_small() {
        let config = DEConfigBuilder::new().popsize(1).minpopsize(1).build().unwrap();
        let err = DifferentialEvolution::new(&[(-1.0, 1.0), (-1.0, 1.0)], config).err();
        assert!(matches!(
            err,
            Some(DEError::InfeasiblePopulation {
                pop_size: 2,
                required: 5
            })
        ));

        let config = DEConfigBuilder::new()
            .popsize(5)
            .minpopsize(1)
            .strategy(Strategy::Rand2Bin)
            .build()
            .unwrap();
        let err = DifferentialEvolution::new(&[(-1.0, 1.0)], config).err();
        assert!(matches!(
            err,
            Some(DEError::InfeasiblePopulation { required: 6, .. })
        ));
    }

    #[test]
    fn test_invalid_bounds_rejected() {
        let config = DEConfigBuilder::new().build().unwrap();
        let err = DifferentialEvolution::new(&[(1.0, -1.0)], config).err();
        assert!(err.is_some_and(|e| e.is_bounds_error()));
    }

    #[test]
    fn test_x0_checked_against_bounds() {
        let config = DEConfigBuilder::new().x0(array![0.0, 2.0]).build().unwrap();
        assert!(matches!(
            DifferentialEvolution::new(&[(-1.0, 1.0), (-1.0, 1.0)], config).err(),
            Some(DEError::X0OutOfBounds { index: 1, .. })
        ));
        let config = DEConfigBuilder::new().x0(array![0.0]).build().unwrap();
        assert!(matches!(
            DifferentialEvolution::new(&[(-1.0, 1.0), (-1.0, 1.0)], config).err(),
            Some(DEError::X0DimensionMismatch { expected: 2, got: 1 })
        ));
    }
}

#[cfg(test)]
mod feature_tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn test_x0_seeds_slot_zero() {
        let config = DEConfigBuilder::new()
            .seed(6)
            .maxiter(0)
            .x0(array![3.0, -2.0])
            .polish(PolishConfig {
                enabled: false,
                maxeval: None,
            })
            .build()
            .unwrap();
        let mut f = bowl;
        let report = differential_evolution(&mut f, &[(-10.0, 10.0), (-10.0, 10.0)], config).unwrap();
        assert_abs_diff_eq!(report.x[0], 3.0, epsilon = 1e-12);
        assert_abs_diff_eq!(report.x[1], -2.0, epsilon = 1e-12);
    }

    #[test]
    fn test_explicit_initial_population() {
        let init = array![
            [0.1, 0.9],
            [0.2, 0.8],
            [0.3, 0.7],
            [0.4, 0.6],
            [0.5, 0.5],
            [0.6, 0.4],
        ];
        let config = DEConfigBuilder::new()
            .seed(6)
            .maxiter(0)
            .init(Init::Population(init))
            .polish(PolishConfig {
                enabled: false,
                maxeval: None,
            })
            .build()
            .unwrap();
        let mut f = sphere;
        let report = differential_evolution(&mut f, &[(-1.0, 1.0), (-1.0, 1.0)], config).unwrap();
        assert_eq!(report.population.nrows(), 6);
        assert_eq!(report.nfev, 6);
        assert_abs_diff_eq!(report.fun, 0.0, epsilon = 1e-12);
    }

    #[test]
    fn test_every_candidate_is_within_bounds() {
        let bounds = [(-2.0, 3.0), (10.0, 10.5), (-1e-3, 1e-3)];
        let config = DEConfigBuilder::new()
            .seed(13)
            .maxiter(30)
            .strategy(Strategy::Rand2Exp)
            .mutation(crate::Mutation::Factor(1.5))
            .build()
            .unwrap();
        let mut f = |x: &Array1<f64>| {
            for (v, (lo, hi)) in x.iter().zip(bounds.iter()) {
                assert!(v >= lo && v <= hi, "{v} outside [{lo}, {hi}]");
            }
            x.sum()
        };
        differential_evolution(&mut f, &bounds, config).unwrap();
    }

    #[test]
    fn test_solve_twice_rebuilds_population() {
        let config = DEConfigBuilder::new().seed(10).maxiter(20).build().unwrap();
        let mut de = DifferentialEvolution::new(&[(-10.0, 10.0), (-10.0, 10.0)], config).unwrap();
        let mut f = bowl;
        let first = de.solve(&mut f).unwrap();
        let second = de.solve(&mut f).unwrap();
        assert!(first.nfev > 0);
        // counters restart with the population
        assert!(second.nfev <= 30 * 21 + 400);
        assert_eq!(second.population.nrows(), second.population_energies.len());
        assert!(de.state().is_terminal());
    }
}
