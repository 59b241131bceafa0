//! Constraints of the form `lb <= residual(x) <= ub`, evaluated in physical
//! units.

use std::fmt;
use std::sync::Arc;

use ndarray::{Array1, Array2, ArrayView1, ArrayView2, Axis, Zip};

use crate::error::{DEError, Result};

/// Vector constraint function type
pub type ResidualFn = Arc<dyn Fn(ArrayView1<'_, f64>) -> Array1<f64> + Send + Sync>;

/// A constraint `lb <= residual(x) <= ub`, componentwise.
pub trait Constraint: Send + Sync {
    /// Residual vector of the physical candidate `x`.
    fn residual(&self, x: ArrayView1<'_, f64>) -> Array1<f64>;
    /// Lower residual bounds (may contain `-inf`).
    fn lower(&self) -> ArrayView1<'_, f64>;
    /// Upper residual bounds (may contain `+inf`).
    fn upper(&self) -> ArrayView1<'_, f64>;

    /// `max(lb - r, 0) + max(r - ub, 0)` per component.
    fn violation(&self, x: ArrayView1<'_, f64>) -> Array1<f64> {
        let r = self.residual(x);
        Zip::from(&r)
            .and(self.lower())
            .and(self.upper())
            .map_collect(|&r, &lo, &hi| (lo - r).max(0.0) + (r - hi).max(0.0))
    }
}

/// `lb <= A x <= ub`.
#[derive(Debug, Clone)]
pub struct LinearConstraint {
    /// Constraint matrix A (m x n).
    pub a: Array2<f64>,
    /// Lower bounds vector (m elements).
    pub lb: Array1<f64>,
    /// Upper bounds vector (m elements).
    pub ub: Array1<f64>,
}

impl LinearConstraint {
    /// Creates a linear constraint.
    pub fn new(a: Array2<f64>, lb: Array1<f64>, ub: Array1<f64>) -> Self {
        Self { a, lb, ub }
    }
}

impl Constraint for LinearConstraint {
    fn residual(&self, x: ArrayView1<'_, f64>) -> Array1<f64> {
        self.a.dot(&x)
    }
    fn lower(&self) -> ArrayView1<'_, f64> {
        self.lb.view()
    }
    fn upper(&self) -> ArrayView1<'_, f64> {
        self.ub.view()
    }
}

/// `lb <= fun(x) <= ub` for an arbitrary vector-valued `fun`.
#[derive(Clone)]
pub struct NonlinearConstraint {
    /// Vector-valued constraint function.
    pub fun: ResidualFn,
    /// Lower bounds for each constraint component.
    pub lb: Array1<f64>,
    /// Upper bounds for each constraint component.
    pub ub: Array1<f64>,
}

impl NonlinearConstraint {
    /// Creates a nonlinear constraint from a closure.
    pub fn new<F>(fun: F, lb: Array1<f64>, ub: Array1<f64>) -> Self
    where
        F: Fn(ArrayView1<'_, f64>) -> Array1<f64> + Send + Sync + 'static,
    {
        Self {
            fun: Arc::new(fun),
            lb,
            ub,
        }
    }
}

impl fmt::Debug for NonlinearConstraint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NonlinearConstraint")
            .field("lb", &self.lb)
            .field("ub", &self.ub)
            .finish_non_exhaustive()
    }
}

impl Constraint for NonlinearConstraint {
    fn residual(&self, x: ArrayView1<'_, f64>) -> Array1<f64> {
        (self.fun)(x)
    }
    fn lower(&self) -> ArrayView1<'_, f64> {
        self.lb.view()
    }
    fn upper(&self) -> ArrayView1<'_, f64> {
        self.ub.view()
    }
}

/// Outcome of checking one candidate against every constraint.
#[derive(Debug, Clone)]
pub struct Feasibility {
    /// Whether the summed violation is zero.
    pub feasible: bool,
    /// Concatenated per-component violations of all constraints.
    pub violation: Array1<f64>,
}

/// Evaluates all configured constraints as one violation vector.
pub struct ConstraintEvaluator {
    constraints: Vec<Box<dyn Constraint>>,
    width: usize,
}

impl ConstraintEvaluator {
    /// Wraps `constraints`, checking their shapes on the physical point
    /// `probe` (any in-bounds candidate).
    ///
    /// # Errors
    ///
    /// [`DEError::ConstraintShape`] when a residual length disagrees with
    /// its bound vectors.
    pub fn new(constraints: Vec<Box<dyn Constraint>>, probe: ArrayView1<'_, f64>) -> Result<Self> {
        let mut width = 0;
        for (index, c) in constraints.iter().enumerate() {
            let residual_len = c.residual(probe).len();
            let (lb_len, ub_len) = (c.lower().len(), c.upper().len());
            if residual_len != lb_len || residual_len != ub_len {
                return Err(DEError::ConstraintShape {
                    index,
                    residual_len,
                    lb_len,
                    ub_len,
                });
            }
            width += residual_len;
        }
        Ok(Self { constraints, width })
    }

    /// No constraints at all.
    pub fn unconstrained() -> Self {
        Self {
            constraints: Vec::new(),
            width: 0,
        }
    }

    /// Whether any constraint is configured.
    pub fn is_empty(&self) -> bool {
        self.constraints.is_empty()
    }

    /// Length of the violation vector (at least 1).
    pub fn width(&self) -> usize {
        self.width.max(1)
    }

    /// Violation and feasibility of one physical candidate.
    pub fn evaluate(&self, x: ArrayView1<'_, f64>) -> Feasibility {
        if self.constraints.is_empty() {
            return Feasibility {
                feasible: true,
                violation: Array1::zeros(1),
            };
        }
        let mut violation = Array1::zeros(self.width);
        let mut offset = 0;
        for c in &self.constraints {
            let v = c.violation(x);
            violation
                .slice_mut(ndarray::s![offset..offset + v.len()])
                .assign(&v);
            offset += v.len();
        }
        Feasibility {
            feasible: violation.sum() == 0.0,
            violation,
        }
    }

    /// Violations of a batch of physical candidates, one row each.
    pub fn evaluate_population(&self, xs: ArrayView2<'_, f64>) -> (Vec<bool>, Array2<f64>) {
        let mut violations = Array2::zeros((xs.nrows(), self.width()));
        let mut feasible = Vec::with_capacity(xs.nrows());
        for (x, mut row) in xs.axis_iter(Axis(0)).zip(violations.axis_iter_mut(Axis(0))) {
            let f = self.evaluate(x);
            row.assign(&f.violation);
            feasible.push(f.feasible);
        }
        (feasible, violations)
    }
}

impl fmt::Debug for ConstraintEvaluator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConstraintEvaluator")
            .field("constraints", &self.constraints.len())
            .field("width", &self.width)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn half_plane() -> Box<dyn Constraint> {
        // x + y >= 3
        Box::new(LinearConstraint::new(
            array![[1.0, 1.0]],
            array![3.0],
            array![f64::INFINITY],
        ))
    }

    #[test]
    fn test_linear_violation() {
        let c = half_plane();
        assert_eq!(c.violation(array![1.0, 1.0].view()), array![1.0]);
        assert_eq!(c.violation(array![2.0, 2.0].view()), array![0.0]);
    }

    #[test]
    fn test_evaluator_concatenates_constraints() {
        let ring = NonlinearConstraint::new(
            |x: ArrayView1<'_, f64>| array![x[0] * x[0] + x[1] * x[1], x[0]],
            array![1.0, 0.0],
            array![9.0, 10.0],
        );
        let probe = array![0.0, 0.0];
        let eval = ConstraintEvaluator::new(vec![half_plane(), Box::new(ring)], probe.view()).unwrap();
        assert_eq!(eval.width(), 3);

        let f = eval.evaluate(array![-1.0, 0.0].view());
        assert!(!f.feasible);
        assert_eq!(f.violation, array![4.0, 0.0, 1.0]);

        let f = eval.evaluate(array![1.5, 1.5].view());
        assert!(f.feasible);
    }

    #[test]
    fn test_unconstrained_is_always_feasible() {
        let eval = ConstraintEvaluator::unconstrained();
        let xs = array![[0.0, 1.0], [1e9, -1e9]];
        let (feasible, cv) = eval.evaluate_population(xs.view());
        assert_eq!(feasible, vec![true, true]);
        assert_eq!(cv.dim(), (2, 1));
        assert_eq!(cv.sum(), 0.0);
    }

    #[test]
    fn test_shape_mismatch_is_reported() {
        let bad = LinearConstraint::new(array![[1.0, 0.0]], array![0.0, 0.0], array![1.0]);
        let err = ConstraintEvaluator::new(vec![Box::new(bad)], array![0.0, 0.0].view());
        assert!(matches!(
            err,
            Err(DEError::ConstraintShape { index: 0, residual_len: 1, lb_len: 2, ub_len: 1 })
        ));
    }
}
