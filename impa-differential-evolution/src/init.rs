//! Population initializers. All of them produce members in the normalized
//! unit cube.

use ndarray::{Array2, ArrayView2};
use rand::Rng;
use rand::seq::SliceRandom;

use crate::error::{DEError, Result};

/// Smallest population any initializer may produce.
pub const MIN_POPULATION: usize = 5;

/// Stratified sampling: each dimension's `[0, 1)` is cut into `npop` equal
/// segments, one point is drawn per segment and the segment order is
/// permuted independently per dimension.
pub(crate) fn init_latin_hypercube<R: Rng + ?Sized>(
    npop: usize,
    n: usize,
    rng: &mut R,
) -> Array2<f64> {
    let mut samples = Array2::<f64>::zeros((npop, n));
    let segsize = 1.0 / npop as f64;
    for mut col in samples.columns_mut() {
        let mut vals: Vec<f64> = (0..npop)
            .map(|k| (k as f64 + rng.random::<f64>()) * segsize)
            .collect();
        vals.shuffle(rng);
        for (dst, v) in col.iter_mut().zip(vals) {
            *dst = v;
        }
    }
    samples
}

/// Uniform sampling over the unit cube.
pub(crate) fn init_random<R: Rng + ?Sized>(npop: usize, n: usize, rng: &mut R) -> Array2<f64> {
    Array2::from_shape_simple_fn((npop, n), || rng.random::<f64>())
}

/// Takes an explicit normalized population, clipped into `[0, 1]`.
pub(crate) fn init_from_array(population: ArrayView2<'_, f64>, n: usize) -> Result<Array2<f64>> {
    if population.ncols() != n || population.nrows() < MIN_POPULATION {
        return Err(DEError::InitPopulationShape {
            rows: population.nrows(),
            cols: population.ncols(),
            expected_cols: n,
        });
    }
    Ok(population.mapv(|v| v.clamp(0.0, 1.0)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;
    use proptest::prelude::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    #[test]
    fn test_explicit_population_is_clipped() {
        let raw = array![
            [-0.5, 0.2],
            [1.5, 0.3],
            [0.1, 0.4],
            [0.2, 0.5],
            [0.3, 0.6],
        ];
        let pop = init_from_array(raw.view(), 2).unwrap();
        assert_eq!(pop[(0, 0)], 0.0);
        assert_eq!(pop[(1, 0)], 1.0);
        assert_eq!(pop[(2, 1)], 0.4);
    }

    #[test]
    fn test_explicit_population_shape_is_checked() {
        let raw = Array2::<f64>::zeros((4, 2));
        assert!(matches!(
            init_from_array(raw.view(), 2),
            Err(DEError::InitPopulationShape { rows: 4, .. })
        ));
        let raw = Array2::<f64>::zeros((6, 3));
        assert!(init_from_array(raw.view(), 2).is_err());
    }

    proptest! {
        #[test]
        fn prop_latin_hypercube_covers_every_segment(
            seed in any::<u64>(),
            npop in 5usize..40,
            n in 1usize..5,
        ) {
            let mut rng = StdRng::seed_from_u64(seed);
            let pop = init_latin_hypercube(npop, n, &mut rng);
            for col in pop.columns() {
                let mut segments: Vec<usize> =
                    col.iter().map(|&v| (v * npop as f64).floor() as usize).collect();
                segments.sort_unstable();
                prop_assert_eq!(segments, (0..npop).collect::<Vec<_>>());
                prop_assert!(col.iter().all(|&v| (0.0..1.0).contains(&v)));
            }
        }

        #[test]
        fn prop_random_init_in_unit_cube(seed in any::<u64>(), npop in 5usize..40) {
            let mut rng = StdRng::seed_from_u64(seed);
            let pop = init_random(npop, 3, &mut rng);
            prop_assert!(pop.iter().all(|&v| (0.0..1.0).contains(&v)));
        }
    }
}
