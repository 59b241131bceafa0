//! Trial-vector generation: mutation, crossover and boundary repair.
//!
//! Every mutation kind is a pure function of the population, the candidate
//! index, the sampled partner indices and the scale `F`. The population's
//! slot 0 is the promoted best member.

use ndarray::{Array1, ArrayView2, Zip};
use rand::Rng;

use crate::crossover::Crossover;
use crate::distinct_indices::distinct_indices;
use crate::{Mutation, Strategy};

/// Base-vector and difference-vector combination used to build a mutant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MutationKind {
    /// `best + F*(r0 - r1)`
    Best1,
    /// `r0 + F*(r1 - r2)`
    Rand1,
    /// `r0 + F*(best - r0) + F*(r1 - r2)`
    RandToBest1,
    /// `c + F*(best - c) + F*(r0 - r1)`
    CurrentToBest1,
    /// `best + F*(r0 + r1 - r2 - r3)`
    Best2,
    /// `r0 + F*(r1 + r2 - r3 - r4)`
    Rand2,
}

impl MutationKind {
    /// Number of distinct partner indices the kind consumes.
    pub fn samples(self) -> usize {
        match self {
            MutationKind::Best1 | MutationKind::CurrentToBest1 => 2,
            MutationKind::Rand1 | MutationKind::RandToBest1 => 3,
            MutationKind::Best2 => 4,
            MutationKind::Rand2 => 5,
        }
    }

    /// Builds the mutant for `candidate` from the sampled partner rows.
    pub fn mutant(
        self,
        pop: ArrayView2<'_, f64>,
        candidate: usize,
        samples: &[usize],
        f: f64,
    ) -> Array1<f64> {
        let best = pop.row(0);
        let row = |k: usize| pop.row(samples[k]);
        match self {
            MutationKind::Best1 => Zip::from(best)
                .and(row(0))
                .and(row(1))
                .map_collect(|&b, &x0, &x1| b + f * (x0 - x1)),
            MutationKind::Rand1 => Zip::from(row(0))
                .and(row(1))
                .and(row(2))
                .map_collect(|&x0, &x1, &x2| x0 + f * (x1 - x2)),
            MutationKind::RandToBest1 => Zip::from(row(0))
                .and(best)
                .and(row(1))
                .and(row(2))
                .map_collect(|&x0, &b, &x1, &x2| x0 + f * (b - x0) + f * (x1 - x2)),
            MutationKind::CurrentToBest1 => Zip::from(pop.row(candidate))
                .and(best)
                .and(row(0))
                .and(row(1))
                .map_collect(|&c, &b, &x0, &x1| c + f * (b - c) + f * (x0 - x1)),
            MutationKind::Best2 => Zip::from(best)
                .and(row(0))
                .and(row(1))
                .and(row(2))
                .and(row(3))
                .map_collect(|&b, &x0, &x1, &x2, &x3| b + f * (x0 + x1 - x2 - x3)),
            MutationKind::Rand2 => {
                let head = Zip::from(row(0))
                    .and(row(1))
                    .and(row(2))
                    .map_collect(|&x0, &x1, &x2| x0 + f * (x1 + x2));
                Zip::from(&head)
                    .and(row(3))
                    .and(row(4))
                    .map_collect(|&h, &x3, &x4| h - f * (x3 + x4))
            }
        }
    }
}

/// Produces repaired trial vectors for one strategy.
#[derive(Debug, Clone)]
pub struct MutationEngine {
    kind: MutationKind,
    crossover: Crossover,
    mutation: Mutation,
    recombination: f64,
}

impl MutationEngine {
    /// Engine for `strategy` with the given mutation setting and crossover
    /// probability.
    pub fn new(strategy: Strategy, mutation: Mutation, recombination: f64) -> Self {
        Self {
            kind: strategy.mutation_kind(),
            crossover: strategy.crossover(),
            mutation,
            recombination,
        }
    }

    /// Mutation kind in use.
    pub fn kind(&self) -> MutationKind {
        self.kind
    }

    /// Crossover scheme in use.
    pub fn crossover(&self) -> Crossover {
        self.crossover
    }

    /// Draws the scale `F` for the next generation (fixed or dithered).
    pub fn sample_scale<R: Rng + ?Sized>(&self, rng: &mut R) -> f64 {
        self.mutation.sample(rng)
    }

    /// Builds the repaired trial for `candidate`. Every component of the
    /// result lies in `[0, 1)`.
    pub fn trial<R: Rng + ?Sized>(
        &self,
        pop: ArrayView2<'_, f64>,
        candidate: usize,
        scale: f64,
        rng: &mut R,
    ) -> Array1<f64> {
        let samples = distinct_indices(candidate, self.kind.samples(), pop.nrows(), rng);
        let mutant = self.kind.mutant(pop, candidate, &samples, scale);
        let mut trial = self
            .crossover
            .apply(pop.row(candidate), &mutant, self.recombination, rng);
        repair(&mut trial, rng);
        trial
    }
}

/// Replaces every component outside `[0, 1)` with a fresh uniform draw.
pub(crate) fn repair<R: Rng + ?Sized>(trial: &mut Array1<f64>, rng: &mut R) {
    for v in trial.iter_mut() {
        if !(0.0..1.0).contains(v) {
            *v = rng.random::<f64>();
        }
    }
}
