use ndarray::Array1;

/// Rounds the integer-constrained components of a physical vector and keeps
/// them inside the integers that lie within `[lower, upper]`.
pub(crate) fn apply_integrality(
    x: &mut Array1<f64>,
    mask: &[bool],
    lower: &Array1<f64>,
    upper: &Array1<f64>,
) {
    for (i, integral) in mask.iter().enumerate().take(x.len()) {
        if *integral {
            x[i] = x[i].round().clamp(lower[i].ceil(), upper[i].floor());
        }
    }
}

/// Widens the bounds of integral dimensions to `[ceil(lo) - 0.5, floor(hi) + 0.5)`
/// (pulled in by one rounding step) so every admissible integer owns an equal
/// share of the normalized interval.
pub(crate) fn widen_integral_limits(lower: f64, upper: f64) -> (f64, f64) {
    let lo = lower.ceil() - 0.5;
    let hi = upper.floor() + 0.5;
    (
        lo + f64::EPSILON * lo.abs().max(1.0),
        hi - f64::EPSILON * hi.abs().max(1.0),
    )
}
