//! Centralized validation and helper functions.

use nalgebra::DMatrix;

/// Maximum number of channel rows accepted from a matrix file (DOS protection)
pub const MAX_CHANNELS: usize = 1024;

/// Helper function to convert usize count to f64 with explicit precision loss allowance
#[inline]
#[must_use]
pub fn count_to_f64(count: usize) -> f64 {
    #[allow(clippy::cast_precision_loss)]
    {
        count as f64
    }
}

/// Check whether every entry of a matrix is finite (no NaN or infinity).
///
/// # Examples
///
/// ```
/// use eeg_reref::utils::validation::all_finite;
/// use nalgebra::DMatrix;
///
/// assert!(all_finite(&DMatrix::from_row_slice(1, 2, &[1.0, -2.0])));
/// assert!(!all_finite(&DMatrix::from_row_slice(1, 2, &[1.0, f64::NAN])));
/// ```
#[must_use]
pub fn all_finite(matrix: &DMatrix<f64>) -> bool {
    matrix.iter().all(|v| v.is_finite())
}

/// Compute a provenance digest for a matrix.
///
/// The digest is the MD5 of:
/// 1. The shape as `"{rows}x{cols};"`
/// 2. Every value as little-endian f64 bytes, in column-major order
///
/// Identical matrices always produce the same digest; a transposed or
/// reshaped matrix does not.
#[must_use]
pub fn compute_matrix_digest(matrix: &DMatrix<f64>) -> String {
    let mut context = md5::Context::new();
    context.consume(format!("{}x{};", matrix.nrows(), matrix.ncols()).as_bytes());
    for value in matrix.iter() {
        context.consume(value.to_le_bytes());
    }
    format!("{:x}", context.compute())
}

/// Check if adding another channel row would exceed the maximum allowed.
///
/// Call this with the current count BEFORE adding a new row.
/// Returns an error message if adding would exceed the limit, None if safe to add.
#[must_use]
pub fn check_channel_limit(count: usize) -> Option<String> {
    if count >= MAX_CHANNELS {
        Some(format!(
            "Too many channels: adding another would exceed maximum of {MAX_CHANNELS}"
        ))
    } else {
        None
    }
}
