//! Operators that depend on request parameters.
//!
//! Both builders are pure functions of their inputs and always return
//! [`Provenance::Derived`] operators.

use nalgebra::{DMatrix, DVector};
use tracing::debug;

use crate::core::error::ReferenceError;
use crate::operators::operator::{Provenance, ReferenceOperator};
use crate::utils::validation::all_finite;

/// Singular values below `tolerance * sigma_max` are treated as zero by the
/// REST pseudo-inverse
pub const DEFAULT_PINV_TOLERANCE: f64 = 1e-10;

/// Relative size of `P 1` below which the REST weighting is degenerate
const DEGENERACY_TOLERANCE: f64 = 1e-10;

/// Build a unipolar operator that subtracts one channel from every channel.
///
/// `reference` holds the 1-based reference channel; exactly one is allowed.
/// The result is `I` with 1 subtracted from column `k`, so row `k` of the
/// re-referenced data is identically zero.
///
/// # Errors
///
/// Returns `ReferenceError::InvalidParameter` if `reference` does not hold
/// exactly one index, or the index is outside `1..=channel_count`.
pub fn unipolar(
    channel_count: usize,
    reference: &[usize],
) -> Result<ReferenceOperator, ReferenceError> {
    let k = match reference {
        [k] => *k,
        [] => {
            return Err(ReferenceError::InvalidParameter(
                "Unipolar referencing needs a reference channel".to_string(),
            ))
        }
        _ => {
            return Err(ReferenceError::InvalidParameter(format!(
                "Only single-channel unipolar referencing is supported ({} channels given)",
                reference.len()
            )))
        }
    };

    if k == 0 || k > channel_count {
        return Err(ReferenceError::InvalidParameter(format!(
            "Unipolar reference channel {k} is outside 1..={channel_count}"
        )));
    }

    let mut matrix = DMatrix::identity(channel_count, channel_count);
    matrix.column_mut(k - 1).add_scalar_mut(-1.0);

    ReferenceOperator::new(format!("unipolar({k})"), matrix, Provenance::Derived)
}

/// REST channel weighting derived from a lead field
#[derive(Debug, Clone)]
pub struct RestWeights {
    /// `f = w / (1' w)` with `w = P' P 1`, `P = pinv(G)`; sums to one
    pub weights: DVector<f64>,

    /// Numerical rank of the lead field at the pseudo-inverse tolerance
    pub rank: usize,
}

/// Compute the REST weighting vector `f` for a lead field `G` (channels x sources).
///
/// # Errors
///
/// Returns `ReferenceError::InvalidParameter` if `G` is empty, non-finite,
/// numerically zero, or its range is orthogonal to the all-ones vector (so the
/// weighting cannot be normalized).
pub fn rest_weights(
    lead_field: &DMatrix<f64>,
    tolerance: f64,
) -> Result<RestWeights, ReferenceError> {
    let channels = lead_field.nrows();
    if channels == 0 || lead_field.ncols() == 0 {
        return Err(ReferenceError::InvalidParameter(
            "Lead field must have at least one channel and one source".to_string(),
        ));
    }
    if !all_finite(lead_field) {
        return Err(ReferenceError::InvalidParameter(
            "Lead field contains non-finite values".to_string(),
        ));
    }

    let svd = lead_field.clone().svd(true, true);
    let sigma_max = svd.singular_values.max();
    if sigma_max <= 0.0 {
        return Err(ReferenceError::InvalidParameter(
            "Lead field is numerically zero".to_string(),
        ));
    }

    let eps = tolerance.max(0.0) * sigma_max;
    let rank = svd.rank(eps);
    debug!(
        "Lead field {}x{}: rank {rank}, sigma_max {sigma_max:e}",
        channels,
        lead_field.ncols()
    );

    // sources x channels
    let pinv = svd
        .pseudo_inverse(eps)
        .map_err(|e| ReferenceError::InvalidParameter(format!("Pseudo-inverse failed: {e}")))?;

    let ones = DVector::from_element(channels, 1.0);
    let projected = &pinv * &ones;

    // P 1 vanishes exactly when 1 is orthogonal to the range of G
    if projected.norm() <= DEGENERACY_TOLERANCE * pinv.norm() * ones.norm() {
        return Err(ReferenceError::InvalidParameter(
            "Lead field yields a degenerate REST weighting (range orthogonal to constant)"
                .to_string(),
        ));
    }

    let w = pinv.transpose() * projected;
    let total = w.sum();
    if !total.is_finite() || total <= 0.0 {
        return Err(ReferenceError::InvalidParameter(format!(
            "REST weighting cannot be normalized (1'w = {total:e})"
        )));
    }

    Ok(RestWeights {
        weights: w / total,
        rank,
    })
}

/// Build a REST operator `R = I - 1 f'` from a lead field.
///
/// # Errors
///
/// Returns `ReferenceError::DimensionMismatch` if the lead field row count
/// differs from `channel_count`, or any error from [`rest_weights`].
pub fn rest(
    lead_field: &DMatrix<f64>,
    channel_count: usize,
    tolerance: f64,
) -> Result<ReferenceOperator, ReferenceError> {
    if lead_field.nrows() != channel_count {
        return Err(ReferenceError::dimension(
            "lead field",
            channel_count,
            lead_field.nrows(),
        ));
    }

    let RestWeights { weights, .. } = rest_weights(lead_field, tolerance)?;
    let ones = DVector::from_element(channel_count, 1.0);
    let matrix = DMatrix::identity(channel_count, channel_count) - ones * weights.transpose();

    ReferenceOperator::new("rest", matrix, Provenance::Derived)
}
