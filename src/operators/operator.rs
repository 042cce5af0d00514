use nalgebra::DMatrix;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::core::error::ReferenceError;
use crate::utils::validation::all_finite;

/// Row sums of a reference operator must vanish to within this tolerance,
/// scaled by the operator's infinity norm
pub const COMMON_MODE_TOLERANCE: f64 = 1e-9;

/// Default number of sample columns multiplied per chunk
pub const DEFAULT_CHUNK_COLUMNS: usize = 65_536;

/// Where an operator came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Provenance {
    /// Precomputed for a fixed layout
    Library,
    /// Built at request time from parameters
    Derived,
}

impl std::fmt::Display for Provenance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Library => write!(f, "library"),
            Self::Derived => write!(f, "derived"),
        }
    }
}

/// A square channels x channels matrix; left-multiplying data re-references it
#[derive(Debug, Clone, PartialEq)]
pub struct ReferenceOperator {
    name: String,
    matrix: DMatrix<f64>,
    provenance: Provenance,
}

impl ReferenceOperator {
    /// Wrap a matrix as an operator
    ///
    /// # Errors
    ///
    /// Returns `ReferenceError::InvalidOperator` if the matrix is empty, not
    /// square, or contains non-finite values.
    pub fn new(
        name: impl Into<String>,
        matrix: DMatrix<f64>,
        provenance: Provenance,
    ) -> Result<Self, ReferenceError> {
        let name = name.into();
        if matrix.is_empty() {
            return Err(ReferenceError::InvalidOperator(format!(
                "'{name}' operator is empty"
            )));
        }
        if !matrix.is_square() {
            return Err(ReferenceError::InvalidOperator(format!(
                "'{name}' operator is {}x{}, expected square",
                matrix.nrows(),
                matrix.ncols()
            )));
        }
        if !all_finite(&matrix) {
            return Err(ReferenceError::InvalidOperator(format!(
                "'{name}' operator contains non-finite values"
            )));
        }

        Ok(Self {
            name,
            matrix,
            provenance,
        })
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn matrix(&self) -> &DMatrix<f64> {
        &self.matrix
    }

    #[must_use]
    pub fn provenance(&self) -> Provenance {
        self.provenance
    }

    /// Number of channels the operator acts on
    #[must_use]
    pub fn channel_count(&self) -> usize {
        self.matrix.nrows()
    }

    /// Largest absolute row sum, i.e. how far `R * 1` is from zero
    #[must_use]
    pub fn common_mode_residual(&self) -> f64 {
        self.matrix
            .row_iter()
            .map(|row| row.sum().abs())
            .fold(0.0, f64::max)
    }

    /// Check that a constant offset on every channel is removed (`R * 1 = 0`)
    ///
    /// # Errors
    ///
    /// Returns `ReferenceError::InvalidOperator` if any row sum exceeds the
    /// tolerance.
    pub fn validate_common_mode(&self) -> Result<(), ReferenceError> {
        let scale = self
            .matrix
            .row_iter()
            .map(|row| row.abs().sum())
            .fold(1.0, f64::max);
        let residual = self.common_mode_residual();

        if residual > COMMON_MODE_TOLERANCE * scale {
            return Err(ReferenceError::InvalidOperator(format!(
                "'{}' operator does not reject common mode (max row sum {residual:e})",
                self.name
            )));
        }
        Ok(())
    }

    /// Compute `R * data`, working through `chunk_columns` samples at a time
    ///
    /// Every sample column is an independent matrix-vector product with the
    /// same kernel, so the result is bitwise identical for any chunk size.
    ///
    /// # Errors
    ///
    /// Returns `ReferenceError::DimensionMismatch` if the data row count differs
    /// from the operator size. Nothing is computed in that case.
    pub fn apply(
        &self,
        data: &DMatrix<f64>,
        chunk_columns: usize,
    ) -> Result<DMatrix<f64>, ReferenceError> {
        if data.nrows() != self.channel_count() {
            return Err(ReferenceError::dimension(
                format!("{} '{}' operator", self.provenance, self.name),
                self.channel_count(),
                data.nrows(),
            ));
        }

        let samples = data.ncols();
        let chunk = chunk_columns.max(1);
        if samples > chunk {
            debug!(
                "Applying '{}' operator in {} chunks of {} samples",
                self.name,
                samples.div_ceil(chunk),
                chunk
            );
        }

        let mut result = DMatrix::zeros(data.nrows(), samples);
        for start in (0..samples).step_by(chunk) {
            let end = (start + chunk).min(samples);
            for j in start..end {
                result
                    .column_mut(j)
                    .gemv(1.0, &self.matrix, &data.column(j), 0.0);
            }
        }
        Ok(result)
    }
}
