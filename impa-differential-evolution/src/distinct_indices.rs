use rand::Rng;
use rand::seq::SliceRandom;

/// Draws `count` distinct indices from `0..pool_size`, never returning
/// `exclude`.
pub(crate) fn distinct_indices<R: Rng + ?Sized>(
    exclude: usize,
    count: usize,
    pool_size: usize,
    rng: &mut R,
) -> Vec<usize> {
    debug_assert!(count < pool_size);
    let mut idxs: Vec<usize> = (0..pool_size).filter(|&i| i != exclude).collect();
    idxs.shuffle(rng);
    idxs.truncate(count);
    idxs
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    #[test]
    fn test_indices_are_distinct_and_exclude_candidate() {
        let mut rng = StdRng::seed_from_u64(7);
        for candidate in 0..6 {
            let idxs = distinct_indices(candidate, 5, 6, &mut rng);
            assert_eq!(idxs.len(), 5);
            assert!(!idxs.contains(&candidate));
            let mut sorted = idxs.clone();
            sorted.sort_unstable();
            sorted.dedup();
            assert_eq!(sorted.len(), 5);
        }
    }
}
