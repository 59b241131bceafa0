//! Local refinement of the best DE candidate.
//!
//! Projected gradient descent inside the bounds. Gradients come from forward
//! finite differences with a step proportional to each dimension's width
//! (backward at the upper bound). Steps are taken along the negative gradient
//! scaled by the squared width, projected onto the box and accepted by an
//! Armijo test. With constraints present only feasible points are accepted.
//! Integral dimensions never move.

use ndarray::{Array1, Zip};

use crate::cancellation::{CancellationToken, Evaluation};
use crate::constraints::ConstraintEvaluator;
use crate::cost_function::CostFunction;
use crate::parameter_space::ParameterSpace;

const FD_STEP: f64 = 1.490_116_119_384_765_6e-8;
const ARMIJO_C: f64 = 1e-4;
const MAX_BACKTRACK: usize = 30;
const FTOL: f64 = 1e-12;

/// What the polishing pass found.
#[derive(Debug, Clone)]
pub(crate) struct PolishOutcome {
    /// Strictly better, feasible, in-bounds point and its cost.
    pub improved: Option<(Array1<f64>, f64)>,
    /// Cost evaluations spent.
    pub nfev: usize,
    /// The pass stopped on a cancellation request.
    pub cancelled: bool,
}

struct Polisher<'a, C: CostFunction> {
    cost: &'a mut C,
    space: &'a ParameterSpace,
    constraints: &'a ConstraintEvaluator,
    token: &'a CancellationToken,
    free: Vec<bool>,
    maxeval: usize,
    nfev: usize,
}

impl<C: CostFunction> Polisher<'_, C> {
    fn exhausted(&self) -> bool {
        self.nfev >= self.maxeval
    }

    fn eval(&mut self, x: &Array1<f64>) -> Result<Option<f64>, C::Error> {
        match self.cost.evaluate(x, self.token)? {
            Evaluation::Done(f) => {
                self.nfev += 1;
                Ok(Some(f))
            }
            Evaluation::Cancelled => Ok(None),
        }
    }

    fn project(&self, x: &mut Array1<f64>) {
        Zip::from(x)
            .and(self.space.lower())
            .and(self.space.upper())
            .for_each(|v, &lo, &hi| *v = v.clamp(lo, hi));
    }

    /// Forward-difference gradient; `None` if cancelled or out of budget.
    fn gradient(&mut self, x: &Array1<f64>, fx: f64) -> Result<Option<Array1<f64>>, C::Error> {
        let n = x.len();
        let mut g = Array1::zeros(n);
        for i in 0..n {
            if !self.free[i] {
                continue;
            }
            if self.exhausted() {
                return Ok(None);
            }
            let mut h = FD_STEP * self.space.width()[i];
            if x[i] + h > self.space.upper()[i] {
                h = -h;
            }
            let mut xh = x.clone();
            xh[i] += h;
            let Some(fh) = self.eval(&xh)? else {
                return Ok(None);
            };
            g[i] = (fh - fx) / h;
        }
        Ok(Some(g))
    }
}

/// Refines `x0` (cost `f0`) with at most `maxeval` evaluations.
pub(crate) fn polish<C: CostFunction>(
    cost: &mut C,
    x0: &Array1<f64>,
    f0: f64,
    space: &ParameterSpace,
    constraints: &ConstraintEvaluator,
    token: &CancellationToken,
    maxeval: usize,
) -> Result<PolishOutcome, C::Error> {
    let n = x0.len();
    let mut p = Polisher {
        cost,
        space,
        constraints,
        token,
        free: (0..n).map(|i| !space.is_integral(i)).collect(),
        maxeval,
        nfev: 0,
    };
    let constrained = !p.constraints.is_empty();

    let mut x = x0.clone();
    let mut fx = f0;
    if !fx.is_finite() {
        return Ok(PolishOutcome {
            improved: None,
            nfev: 0,
            cancelled: false,
        });
    }

    let width_sq = space.width().mapv(|w| w * w);
    let mut cancelled = false;
    'outer: while !p.exhausted() {
        let g = match p.gradient(&x, fx)? {
            Some(g) => g,
            None => {
                cancelled = !p.exhausted();
                break;
            }
        };
        // scaled steepest descent: unit step in normalized coordinates
        let d = -(&g * &width_sq);
        let dmax = d
            .iter()
            .zip(space.width().iter())
            .map(|(&v, &w)| (v / w).abs())
            .fold(0.0_f64, f64::max);
        if dmax == 0.0 || !dmax.is_finite() {
            break;
        }

        let mut alpha = 0.1 / dmax;
        let mut accepted = None;
        for _ in 0..MAX_BACKTRACK {
            if p.exhausted() {
                break 'outer;
            }
            let mut xt = &x + &(&d * alpha);
            p.project(&mut xt);
            if constrained && !p.constraints.evaluate(xt.view()).feasible {
                alpha *= 0.5;
                continue;
            }
            let decrease = g.dot(&(&xt - &x));
            let Some(ft) = p.eval(&xt)? else {
                cancelled = true;
                break 'outer;
            };
            if ft <= fx + ARMIJO_C * decrease && ft < fx {
                accepted = Some((xt, ft));
                break;
            }
            alpha *= 0.5;
        }

        match accepted {
            Some((xt, ft)) => {
                let small = fx - ft <= FTOL * (fx.abs() + ft.abs()).max(1.0);
                x = xt;
                fx = ft;
                if small {
                    break;
                }
            }
            None => break,
        }
    }

    let improved = (fx < f0
        && space.contains(x.view())
        && p.constraints.evaluate(x.view()).feasible)
        .then_some((x, fx));
    Ok(PolishOutcome {
        improved,
        nfev: p.nfev,
        cancelled,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constraints::LinearConstraint;
    use approx::assert_abs_diff_eq;
    use ndarray::array;

    #[test]
    fn test_polish_reaches_quadratic_minimum() {
        let space = ParameterSpace::new(&[(-10.0, 10.0), (-10.0, 10.0)], None).unwrap();
        let mut bowl = |x: &Array1<f64>| (x[0] - 3.0).powi(2) + (x[1] + 2.0).powi(2);
        let x0 = array![2.5, -1.0];
        let f0 = bowl(&x0);
        let token = CancellationToken::new();
        let out = polish(
            &mut bowl,
            &x0,
            f0,
            &space,
            &ConstraintEvaluator::unconstrained(),
            &token,
            400,
        )
        .unwrap();
        let (x, f) = out.improved.unwrap();
        assert_abs_diff_eq!(x[0], 3.0, epsilon = 1e-4);
        assert_abs_diff_eq!(x[1], -2.0, epsilon = 1e-4);
        assert!(f < 1e-7);
        assert!(out.nfev <= 400);
    }

    #[test]
    fn test_polish_stays_at_bound() {
        let space = ParameterSpace::new(&[(0.0, 1.0)], None).unwrap();
        let mut slope = |x: &Array1<f64>| -x[0];
        let x0 = array![0.5];
        let token = CancellationToken::new();
        let out = polish(
            &mut slope,
            &x0,
            -0.5,
            &space,
            &ConstraintEvaluator::unconstrained(),
            &token,
            100,
        )
        .unwrap();
        let (x, f) = out.improved.unwrap();
        assert_eq!(x[0], 1.0);
        assert_eq!(f, -1.0);
    }

    #[test]
    fn test_polish_freezes_integral_dimension() {
        let space = ParameterSpace::new(&[(-10.0, 10.0), (-10.0, 10.0)], Some(&[false, true])).unwrap();
        let mut bowl = |x: &Array1<f64>| (x[0] - 3.0).powi(2) + (x[1] + 2.3).powi(2);
        let x0 = array![1.0, -2.0];
        let f0 = bowl(&x0);
        let token = CancellationToken::new();
        let out = polish(
            &mut bowl,
            &x0,
            f0,
            &space,
            &ConstraintEvaluator::unconstrained(),
            &token,
            200,
        )
        .unwrap();
        let (x, _) = out.improved.unwrap();
        assert_eq!(x[1], -2.0);
        assert_abs_diff_eq!(x[0], 3.0, epsilon = 1e-4);
    }

    #[test]
    fn test_polish_rejects_infeasible_moves() {
        let space = ParameterSpace::new(&[(-10.0, 10.0), (-10.0, 10.0)], None).unwrap();
        let half_plane: Box<dyn crate::constraints::Constraint> = Box::new(LinearConstraint::new(
            array![[1.0, 1.0]],
            array![3.0],
            array![f64::INFINITY],
        ));
        let evaluator = ConstraintEvaluator::new(vec![half_plane], array![0.0, 0.0].view()).unwrap();
        let mut bowl = |x: &Array1<f64>| (x[0] - 3.0).powi(2) + (x[1] + 2.0).powi(2);
        let x0 = array![5.0, 0.0];
        let f0 = bowl(&x0);
        let token = CancellationToken::new();
        let out = polish(&mut bowl, &x0, f0, &space, &evaluator, &token, 400).unwrap();
        if let Some((x, f)) = out.improved {
            assert!(x[0] + x[1] >= 3.0);
            assert!(f < f0);
        }
    }

    #[test]
    fn test_polish_honours_cancellation() {
        let space = ParameterSpace::new(&[(-1.0, 1.0)], None).unwrap();
        let token = CancellationToken::new();
        token.cancel();
        let mut calls = 0;
        let mut f = |x: &Array1<f64>| {
            calls += 1;
            x[0] * x[0]
        };
        let out = polish(
            &mut f,
            &array![0.5],
            0.25,
            &space,
            &ConstraintEvaluator::unconstrained(),
            &token,
            100,
        )
        .unwrap();
        assert!(out.cancelled);
        assert!(out.improved.is_none());
        assert_eq!(calls, 0);
    }
}
