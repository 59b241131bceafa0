use ndarray::{ArrayView1, Zip};

/// Evaluation state of one candidate: energy, feasibility and per-constraint
/// violation.
#[derive(Debug, Clone, Copy)]
pub struct Fitness<'a> {
    /// Cost value, `+inf` when the candidate was never evaluated.
    pub energy: f64,
    /// Whether every constraint is satisfied.
    pub feasible: bool,
    /// Non-negative violation per constraint.
    pub violation: ArrayView1<'a, f64>,
}

/// Lampinen's constraint-aware selection: decides whether `trial` may replace
/// `incumbent`.
///
/// * both feasible: the trial must not be worse in energy;
/// * trial feasible, incumbent infeasible: always accepted;
/// * both infeasible: the trial must be no worse on every constraint;
/// * trial infeasible, incumbent feasible: never accepted.
pub fn accept_trial(trial: &Fitness<'_>, incumbent: &Fitness<'_>) -> bool {
    match (trial.feasible, incumbent.feasible) {
        (true, true) => trial.energy <= incumbent.energy,
        (true, false) => true,
        (false, false) => Zip::from(&trial.violation)
            .and(&incumbent.violation)
            .all(|&t, &o| t <= o),
        (false, true) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_both_feasible_compares_energy() {
        let zero = array![0.0];
        let better = Fitness { energy: 1.0, feasible: true, violation: zero.view() };
        let worse = Fitness { energy: 2.0, feasible: true, violation: zero.view() };
        assert!(accept_trial(&better, &worse));
        assert!(!accept_trial(&worse, &better));
        assert!(accept_trial(&better, &better));
    }

    #[test]
    fn test_feasible_trial_beats_infeasible_incumbent() {
        let zero = array![0.0, 0.0];
        let cv = array![0.5, 0.0];
        let trial = Fitness { energy: 1e9, feasible: true, violation: zero.view() };
        let incumbent = Fitness { energy: 0.0, feasible: false, violation: cv.view() };
        assert!(accept_trial(&trial, &incumbent));
    }

    #[test]
    fn test_infeasible_pair_requires_componentwise_dominance() {
        let a = array![0.2, 0.3];
        let b = array![0.3, 0.3];
        let c = array![0.1, 0.4];
        let fa = Fitness { energy: f64::INFINITY, feasible: false, violation: a.view() };
        let fb = Fitness { energy: f64::INFINITY, feasible: false, violation: b.view() };
        let fc = Fitness { energy: f64::INFINITY, feasible: false, violation: c.view() };
        assert!(accept_trial(&fa, &fb));
        assert!(!accept_trial(&fb, &fa));
        assert!(!accept_trial(&fc, &fa));
        assert!(!accept_trial(&fa, &fc));
    }

    #[test]
    fn test_infeasible_trial_never_replaces_feasible() {
        let zero = array![0.0];
        let cv = array![1e-12];
        let trial = Fitness { energy: -1e9, feasible: false, violation: cv.view() };
        let incumbent = Fitness { energy: 1e9, feasible: true, violation: zero.view() };
        assert!(!accept_trial(&trial, &incumbent));
    }
}
