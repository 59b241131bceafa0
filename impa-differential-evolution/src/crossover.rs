use ndarray::{Array1, ArrayView1};
use rand::Rng;

/// Recombination scheme mixing the mutant into the target vector.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Crossover {
    /// Binomial (uniform) crossover
    #[default]
    Binomial,
    /// Exponential (run-length) crossover
    Exponential,
}

impl Crossover {
    /// Builds the trial vector from `target` and `mutant`.
    pub(crate) fn apply<R: Rng + ?Sized>(
        self,
        target: ArrayView1<'_, f64>,
        mutant: &Array1<f64>,
        cr: f64,
        rng: &mut R,
    ) -> Array1<f64> {
        match self {
            Crossover::Binomial => binomial_crossover(target, mutant, cr, rng),
            Crossover::Exponential => exponential_crossover(target, mutant, cr, rng),
        }
    }
}

fn binomial_crossover<R: Rng + ?Sized>(
    target: ArrayView1<'_, f64>,
    mutant: &Array1<f64>,
    cr: f64,
    rng: &mut R,
) -> Array1<f64> {
    let n = target.len();
    let jrand = rng.random_range(0..n);
    let mut trial = target.to_owned();
    for j in 0..n {
        if j == jrand || rng.random::<f64>() < cr {
            trial[j] = mutant[j];
        }
    }
    trial
}

fn exponential_crossover<R: Rng + ?Sized>(
    target: ArrayView1<'_, f64>,
    mutant: &Array1<f64>,
    cr: f64,
    rng: &mut R,
) -> Array1<f64> {
    let n = target.len();
    let mut trial = target.to_owned();
    let mut j = rng.random_range(0..n);
    let mut copied = 0usize;
    // the first position always comes from the mutant
    loop {
        trial[j] = mutant[j];
        copied += 1;
        j = (j + 1) % n;
        if copied >= n || rng.random::<f64>() >= cr {
            break;
        }
    }
    trial
}
