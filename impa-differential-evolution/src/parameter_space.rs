//! Mapping between the normalized search cube and physical parameters.
//!
//! The solver keeps every candidate in `[0, 1)^n`. A normalized value `u` maps
//! to `center + (u - 0.5) * width`, where `center` and `width` come from the
//! bounds. Integer-constrained dimensions use bounds widened to
//! `[ceil(lo) - 0.5, floor(hi) + 0.5)` and are rounded after scaling, so each
//! admissible integer is equally likely. Normalized values are never rounded.

use ndarray::{Array1, Array2, ArrayView1, ArrayView2, Axis};

use crate::apply_integrality::{apply_integrality, widen_integral_limits};
use crate::error::{DEError, Result};

/// Per-dimension bounds plus an optional integrality mask.
#[derive(Debug, Clone)]
pub struct ParameterSpace {
    lower: Array1<f64>,
    upper: Array1<f64>,
    center: Array1<f64>,
    width: Array1<f64>,
    integrality: Option<Vec<bool>>,
}

impl ParameterSpace {
    /// Builds a space from `(low, high)` pairs.
    ///
    /// # Errors
    ///
    /// [`DEError::InvalidBounds`] if a pair is not finite or `low >= high`,
    /// [`DEError::NoIntegerInBounds`] if an integral dimension contains no
    /// integer, [`DEError::IntegralityDimensionMismatch`] if the mask length
    /// differs from the number of bounds.
    pub fn new(bounds: &[(f64, f64)], integrality: Option<&[bool]>) -> Result<Self> {
        let lower = Array1::from_iter(bounds.iter().map(|b| b.0));
        let upper = Array1::from_iter(bounds.iter().map(|b| b.1));
        Self::from_arrays(lower, upper, integrality)
    }

    /// Builds a space from separate lower and upper bound arrays.
    pub fn from_arrays(
        lower: Array1<f64>,
        upper: Array1<f64>,
        integrality: Option<&[bool]>,
    ) -> Result<Self> {
        if lower.len() != upper.len() {
            return Err(DEError::BoundsMismatch {
                lower_len: lower.len(),
                upper_len: upper.len(),
            });
        }
        if lower.is_empty() {
            return Err(DEError::EmptyBounds);
        }
        for (index, (&lo, &hi)) in lower.iter().zip(upper.iter()).enumerate() {
            if !lo.is_finite() || !hi.is_finite() || lo >= hi {
                return Err(DEError::InvalidBounds {
                    index,
                    lower: lo,
                    upper: hi,
                });
            }
        }

        let n = lower.len();
        let mask = match integrality {
            Some(mask) if mask.len() != n => {
                return Err(DEError::IntegralityDimensionMismatch {
                    expected: n,
                    got: mask.len(),
                });
            }
            Some(mask) if mask.iter().any(|&b| b) => Some(mask.to_vec()),
            _ => None,
        };

        let mut lim_lo = lower.clone();
        let mut lim_hi = upper.clone();
        if let Some(mask) = &mask {
            for (index, &integral) in mask.iter().enumerate() {
                if !integral {
                    continue;
                }
                if lower[index].ceil() > upper[index].floor() {
                    return Err(DEError::NoIntegerInBounds {
                        index,
                        lower: lower[index],
                        upper: upper[index],
                    });
                }
                let (lo, hi) = widen_integral_limits(lower[index], upper[index]);
                lim_lo[index] = lo;
                lim_hi[index] = hi;
            }
        }

        let center = (&lim_lo + &lim_hi) * 0.5;
        let width = (&lim_lo - &lim_hi).mapv(f64::abs);

        Ok(Self {
            lower,
            upper,
            center,
            width,
            integrality: mask,
        })
    }

    /// Number of dimensions.
    pub fn dim(&self) -> usize {
        self.lower.len()
    }

    /// Lower bounds as supplied.
    pub fn lower(&self) -> &Array1<f64> {
        &self.lower
    }

    /// Upper bounds as supplied.
    pub fn upper(&self) -> &Array1<f64> {
        &self.upper
    }

    /// Integrality mask, `None` when no dimension is integral.
    pub fn integrality(&self) -> Option<&[bool]> {
        self.integrality.as_deref()
    }

    /// Whether dimension `i` is integer-constrained.
    pub fn is_integral(&self, i: usize) -> bool {
        self.integrality.as_ref().is_some_and(|m| m[i])
    }

    /// Whether every dimension is integer-constrained.
    pub fn all_integral(&self) -> bool {
        self.integrality.as_ref().is_some_and(|m| m.iter().all(|&b| b))
    }

    /// Maps one normalized vector to physical units.
    pub fn scale(&self, normalized: ArrayView1<'_, f64>) -> Array1<f64> {
        let mut x = &self.center + &((&normalized - 0.5) * &self.width);
        x.zip_mut_with(&self.lower, |v, &lo| *v = v.max(lo));
        x.zip_mut_with(&self.upper, |v, &hi| *v = v.min(hi));
        if let Some(mask) = &self.integrality {
            apply_integrality(&mut x, mask, &self.lower, &self.upper);
        }
        x
    }

    /// Maps a batch of normalized vectors (one per row) to physical units.
    pub fn scale_population(&self, normalized: ArrayView2<'_, f64>) -> Array2<f64> {
        let mut out = Array2::zeros(normalized.raw_dim());
        for (mut dst, src) in out.axis_iter_mut(Axis(0)).zip(normalized.axis_iter(Axis(0))) {
            dst.assign(&self.scale(src));
        }
        out
    }

    /// Maps one physical vector to normalized coordinates (no clipping).
    pub fn unscale(&self, physical: ArrayView1<'_, f64>) -> Array1<f64> {
        (&physical - &self.center) / &self.width + 0.5
    }

    /// Maps a batch of physical vectors (one per row) to normalized coordinates.
    pub fn unscale_population(&self, physical: ArrayView2<'_, f64>) -> Array2<f64> {
        (&physical - &self.center) / &self.width + 0.5
    }

    /// Whether `x` lies inside the bounds, inclusive.
    pub fn contains(&self, x: ArrayView1<'_, f64>) -> bool {
        x.len() == self.dim()
            && x
                .iter()
                .zip(self.lower.iter().zip(self.upper.iter()))
                .all(|(&v, (&lo, &hi))| v >= lo && v <= hi)
    }

    /// Width of each dimension in physical units, widened for integral ones.
    pub(crate) fn width(&self) -> &Array1<f64> {
        &self.width
    }
}
