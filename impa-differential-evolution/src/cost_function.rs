use std::convert::Infallible;

use ndarray::{Array1, ArrayView2, Axis};

use crate::cancellation::{CancellationToken, Evaluation};

/// Objective minimized by the solver.
///
/// `cost` receives a candidate in physical units. It may fail (hardware
/// faults, I/O errors); the error aborts the whole solve and is returned to
/// the caller untouched. It may also report [`Evaluation::Cancelled`] when
/// it notices an abort while blocked, e.g. an interrupted instrument sweep.
pub trait CostFunction {
    /// Failure type of a single evaluation.
    type Error;

    /// Evaluates one candidate.
    fn cost(&mut self, x: &Array1<f64>) -> Result<Evaluation<f64>, Self::Error>;

    /// Evaluates one candidate unless `token` is raised, in which case the
    /// flag is consumed and nothing is evaluated.
    fn evaluate(
        &mut self,
        x: &Array1<f64>,
        token: &CancellationToken,
    ) -> Result<Evaluation<f64>, Self::Error> {
        if token.take() {
            return Ok(Evaluation::Cancelled);
        }
        self.cost(x)
    }

    /// Evaluates candidates row by row, polling `token` before each one.
    /// Stops at the first cancellation; completed energies are discarded.
    fn evaluate_batch(
        &mut self,
        xs: ArrayView2<'_, f64>,
        token: &CancellationToken,
    ) -> Result<Evaluation<Array1<f64>>, Self::Error> {
        let mut energies = Array1::zeros(xs.nrows());
        for (i, x) in xs.axis_iter(Axis(0)).enumerate() {
            match self.evaluate(&x.to_owned(), token)? {
                Evaluation::Done(e) => energies[i] = e,
                Evaluation::Cancelled => return Ok(Evaluation::Cancelled),
            }
        }
        Ok(Evaluation::Done(energies))
    }
}

impl<F> CostFunction for F
where
    F: FnMut(&Array1<f64>) -> f64,
{
    type Error = Infallible;

    fn cost(&mut self, x: &Array1<f64>) -> Result<Evaluation<f64>, Infallible> {
        Ok(Evaluation::Done(self(x)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_closure_is_a_cost_function() {
        let mut sphere = |x: &Array1<f64>| x.dot(x);
        let token = CancellationToken::new();
        let e = sphere.evaluate(&array![3.0, 4.0], &token).unwrap();
        assert_eq!(e, Evaluation::Done(25.0));
    }

    #[test]
    fn test_batch_stops_at_cancellation() {
        let token = CancellationToken::new();
        let mut calls = 0;
        let remote = token.clone();
        let mut cost = |x: &Array1<f64>| {
            calls += 1;
            if calls == 2 {
                remote.cancel();
            }
            x.sum()
        };
        let xs = array![[1.0], [2.0], [3.0], [4.0]];
        let out = cost.evaluate_batch(xs.view(), &token).unwrap();
        assert!(out.is_cancelled());
        assert_eq!(calls, 2);
        assert!(!token.is_cancelled());
    }
}
