//! Candidate table held by the solver.
//!
//! Row `i` of `members` is a normalized candidate; `energies[i]`,
//! `feasible[i]` and row `i` of `violations` describe it. Slot 0 always holds
//! the promoted (best known) candidate once [`Population::promote_best`] has
//! run.

use ndarray::{Array1, Array2, ArrayView1, ArrayView2, Axis};

use crate::accept_trial::Fitness;

/// Fixed-width table of normalized candidates and their evaluation state.
#[derive(Debug, Clone)]
pub struct Population {
    members: Array2<f64>,
    energies: Array1<f64>,
    feasible: Vec<bool>,
    violations: Array2<f64>,
}

impl Population {
    /// Wraps freshly initialized members. Energies start at `+inf`, every
    /// member is marked feasible with a zero violation vector of width
    /// `n_constraints` (at least one column).
    pub fn new(members: Array2<f64>, n_constraints: usize) -> Self {
        let n = members.nrows();
        Self {
            members,
            energies: Array1::from_elem(n, f64::INFINITY),
            feasible: vec![true; n],
            violations: Array2::zeros((n, n_constraints.max(1))),
        }
    }

    /// Number of members.
    pub fn len(&self) -> usize {
        self.members.nrows()
    }

    /// Whether the population has no members.
    pub fn is_empty(&self) -> bool {
        self.members.nrows() == 0
    }

    /// Number of dimensions per member.
    pub fn dim(&self) -> usize {
        self.members.ncols()
    }

    /// All members, one per row, in normalized coordinates.
    pub fn members(&self) -> ArrayView2<'_, f64> {
        self.members.view()
    }

    /// Member `i` in normalized coordinates.
    pub fn member(&self, i: usize) -> ArrayView1<'_, f64> {
        self.members.row(i)
    }

    /// Energies, `+inf` for members never evaluated.
    pub fn energies(&self) -> &Array1<f64> {
        &self.energies
    }

    /// Feasibility flags.
    pub fn feasible(&self) -> &[bool] {
        &self.feasible
    }

    /// Constraint violations, one row per member.
    pub fn violations(&self) -> ArrayView2<'_, f64> {
        self.violations.view()
    }

    /// Evaluation state of member `i` for the acceptance rule.
    pub fn fitness(&self, i: usize) -> Fitness<'_> {
        Fitness {
            energy: self.energies[i],
            feasible: self.feasible[i],
            violation: self.violations.row(i),
        }
    }

    /// Stores the constraint outcome of member `i`.
    pub(crate) fn set_feasibility(&mut self, i: usize, feasible: bool, violation: ArrayView1<'_, f64>) {
        self.feasible[i] = feasible;
        self.violations.row_mut(i).assign(&violation);
    }

    /// Stores the energy of member `i`.
    pub(crate) fn set_energy(&mut self, i: usize, energy: f64) {
        self.energies[i] = energy;
    }

    /// Replaces member `i` with an evaluated trial.
    pub(crate) fn replace(
        &mut self,
        i: usize,
        trial: ArrayView1<'_, f64>,
        energy: f64,
        feasible: bool,
        violation: ArrayView1<'_, f64>,
    ) {
        self.members.row_mut(i).assign(&trial);
        self.energies[i] = energy;
        self.feasible[i] = feasible;
        self.violations.row_mut(i).assign(&violation);
    }

    /// Overwrites the coordinates of member `i`; its evaluation state is left
    /// as is, so callers only use this before the first evaluation.
    pub(crate) fn set_member(&mut self, i: usize, x: ArrayView1<'_, f64>) {
        self.members.row_mut(i).assign(&x);
    }

    fn swap(&mut self, a: usize, b: usize) {
        if a == b {
            return;
        }
        let row_a = self.members.row(a).to_owned();
        let row_b = self.members.row(b).to_owned();
        self.members.row_mut(a).assign(&row_b);
        self.members.row_mut(b).assign(&row_a);

        let cv_a = self.violations.row(a).to_owned();
        let cv_b = self.violations.row(b).to_owned();
        self.violations.row_mut(a).assign(&cv_b);
        self.violations.row_mut(b).assign(&cv_a);

        self.energies.swap(a, b);
        self.feasible.swap(a, b);
    }

    /// Index of the member that should sit in slot 0: the lowest-energy
    /// feasible member, or the least-violating one when none is feasible.
    pub fn best_index(&self) -> usize {
        let feasible_best = (0..self.len())
            .filter(|&i| self.feasible[i])
            .fold(None::<usize>, |best, i| match best {
                Some(b) if self.energies[b] <= self.energies[i] => Some(b),
                _ => Some(i),
            });
        if let Some(i) = feasible_best {
            return i;
        }
        let total_violation = self.violations.sum_axis(Axis(1));
        let mut best = 0;
        for (i, &v) in total_violation.iter().enumerate() {
            if v < total_violation[best] {
                best = i;
            }
        }
        best
    }

    /// Swaps the best member into slot 0.
    pub fn promote_best(&mut self) {
        let best = self.best_index();
        self.swap(0, best);
    }

    /// Removes members whose energy exceeds `threshold`, worst first, until
    /// none remain above it or the population reaches `floor` members.
    /// Slot 0 is never removed. Returns the number of members removed.
    pub fn cull(&mut self, threshold: f64, floor: usize) -> usize {
        if self.len() <= floor {
            return 0;
        }
        let mut weak: Vec<usize> = (1..self.len())
            .filter(|&i| self.energies[i] > threshold)
            .collect();
        if weak.is_empty() {
            return 0;
        }
        weak.sort_by(|&a, &b| self.energies[b].total_cmp(&self.energies[a]));
        weak.truncate(self.len() - floor);

        let keep: Vec<usize> = (0..self.len()).filter(|i| !weak.contains(i)).collect();
        self.members = self.members.select(Axis(0), &keep);
        self.violations = self.violations.select(Axis(0), &keep);
        self.energies = self.energies.select(Axis(0), &keep);
        self.feasible = keep.iter().map(|&i| self.feasible[i]).collect();
        weak.len()
    }

    /// Whether every member has a finite energy.
    pub fn all_finite(&self) -> bool {
        self.energies.iter().all(|e| e.is_finite())
    }

    /// Mean and population standard deviation of the energies.
    pub fn energy_stats(&self) -> (f64, f64) {
        let mean = self.energies.mean().unwrap_or(f64::INFINITY);
        (mean, self.energies.std(0.0))
    }

    /// Volume of the axis-aligned box spanned by the members.
    pub fn volume(&self) -> f64 {
        self.members
            .axis_iter(Axis(1))
            .map(|col| {
                let (lo, hi) = col
                    .iter()
                    .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &v| {
                        (lo.min(v), hi.max(v))
                    });
                hi - lo
            })
            .product()
    }
}
