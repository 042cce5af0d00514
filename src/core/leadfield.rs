use nalgebra::DMatrix;

use crate::core::error::ReferenceError;
use crate::core::types::LeadFieldId;
use crate::utils::validation::{all_finite, compute_matrix_digest};

/// A lead-field matrix (channels x sources) used for subject-specific REST
#[derive(Debug, Clone, PartialEq)]
pub struct LeadField {
    matrix: DMatrix<f64>,
    id: LeadFieldId,
    source: Option<String>,
}

impl LeadField {
    /// Wrap a lead-field matrix, computing its provenance id
    ///
    /// # Errors
    ///
    /// Returns `ReferenceError::InvalidParameter` if the matrix is empty or
    /// contains non-finite values.
    pub fn new(matrix: DMatrix<f64>) -> Result<Self, ReferenceError> {
        if matrix.nrows() == 0 || matrix.ncols() == 0 {
            return Err(ReferenceError::InvalidParameter(format!(
                "Lead field must have at least one channel and one source (got {}x{})",
                matrix.nrows(),
                matrix.ncols()
            )));
        }
        if !all_finite(&matrix) {
            return Err(ReferenceError::InvalidParameter(
                "Lead field contains non-finite values".to_string(),
            ));
        }

        let id = LeadFieldId::new(compute_matrix_digest(&matrix));
        Ok(Self {
            matrix,
            id,
            source: None,
        })
    }

    #[must_use]
    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }

    #[must_use]
    pub fn matrix(&self) -> &DMatrix<f64> {
        &self.matrix
    }

    #[must_use]
    pub fn id(&self) -> &LeadFieldId {
        &self.id
    }

    /// Where the lead field came from (file path), if known
    #[must_use]
    pub fn source(&self) -> Option<&str> {
        self.source.as_deref()
    }

    #[must_use]
    pub fn channel_count(&self) -> usize {
        self.matrix.nrows()
    }

    #[must_use]
    pub fn source_count(&self) -> usize {
        self.matrix.ncols()
    }
}
