//! Dense inverses for the normal equations, on `ndarray-linalg`

use ndarray::{Array1, Array2, ArrayView1};
use ndarray_linalg::{Inverse, ReciprocalConditionNum};

/// Reciprocal condition number of the unit-diagonal matrix below which it
/// is treated as singular
const RCOND_TOLERANCE: f64 = 1e-12;

/// Invert a square matrix with a positive diagonal, such as `X'X` or a
/// parameter covariance block.
///
/// Rows and columns are scaled to a unit diagonal before the rank test and
/// the LAPACK inverse, so covariates measured in very different units do
/// not look singular. Returns `None` for a non-positive diagonal entry or a
/// singular scaled matrix.
pub fn invert(a: &Array2<f64>) -> Option<Array2<f64>> {
    let n = a.nrows();
    if n == 0 || n != a.ncols() {
        return None;
    }
    let scale: Array1<f64> = a.diag().mapv(f64::sqrt);
    if scale.iter().any(|s| !s.is_finite() || *s <= 0.0) {
        return None;
    }

    let scaled = Array2::from_shape_fn((n, n), |(i, j)| a[[i, j]] / (scale[i] * scale[j]));
    match scaled.rcond() {
        Ok(rcond) if rcond >= RCOND_TOLERANCE => {}
        _ => return None,
    }
    let inv = scaled.inv().ok()?;
    Some(Array2::from_shape_fn((n, n), |(i, j)| inv[[i, j]] / (scale[i] * scale[j])))
}

pub fn dot(a: ArrayView1<f64>, b: ArrayView1<f64>) -> f64 {
    a.dot(&b)
}
