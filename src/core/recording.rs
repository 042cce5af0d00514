use nalgebra::DMatrix;
use std::collections::HashSet;

use crate::core::error::ReferenceError;
use crate::core::types::ReferenceState;

/// A multichannel recording: channel labels, the channel x sample matrix, and
/// the reference scheme the matrix is currently expressed in.
///
/// Recordings are immutable values. Re-referencing produces a new recording
/// rather than modifying this one.
#[derive(Debug, Clone, PartialEq)]
pub struct Recording {
    labels: Vec<String>,
    data: DMatrix<f64>,
    state: ReferenceState,
}

impl Recording {
    /// Create a recording in the `Unknown` reference state
    ///
    /// # Errors
    ///
    /// Returns `ReferenceError::DimensionMismatch` if the label count differs
    /// from the matrix row count, or `ReferenceError::InvalidParameter` if a
    /// label is empty or repeated.
    pub fn new(labels: Vec<String>, data: DMatrix<f64>) -> Result<Self, ReferenceError> {
        if labels.len() != data.nrows() {
            return Err(ReferenceError::dimension(
                "channel labels",
                data.nrows(),
                labels.len(),
            ));
        }

        let mut seen = HashSet::with_capacity(labels.len());
        for label in &labels {
            if label.trim().is_empty() {
                return Err(ReferenceError::InvalidParameter(
                    "Channel labels must not be empty".to_string(),
                ));
            }
            if !seen.insert(label.as_str()) {
                return Err(ReferenceError::InvalidParameter(format!(
                    "Duplicate channel label '{label}'"
                )));
            }
        }

        Ok(Self {
            labels,
            data,
            state: ReferenceState::Unknown,
        })
    }

    /// Create a recording from single-precision storage; samples are widened to f64
    ///
    /// # Errors
    ///
    /// Same as [`Recording::new`].
    pub fn from_single_precision(
        labels: Vec<String>,
        data: &DMatrix<f32>,
    ) -> Result<Self, ReferenceError> {
        Self::new(labels, data.map(f64::from))
    }

    /// Declare the scheme the data is already expressed in (e.g. from a loader)
    #[must_use]
    pub fn with_state(mut self, state: ReferenceState) -> Self {
        self.state = state;
        self
    }

    #[must_use]
    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    #[must_use]
    pub fn data(&self) -> &DMatrix<f64> {
        &self.data
    }

    #[must_use]
    pub fn state(&self) -> &ReferenceState {
        &self.state
    }

    #[must_use]
    pub fn channel_count(&self) -> usize {
        self.data.nrows()
    }

    #[must_use]
    pub fn sample_count(&self) -> usize {
        self.data.ncols()
    }

    /// 0-based row of the channel with this label
    #[must_use]
    pub fn position_of(&self, label: &str) -> Option<usize> {
        self.labels.iter().position(|l| l == label)
    }

    #[must_use]
    pub fn into_parts(self) -> (Vec<String>, DMatrix<f64>, ReferenceState) {
        (self.labels, self.data, self.state)
    }

    /// Same channels, new data and state
    pub(crate) fn rereferenced(&self, data: DMatrix<f64>, state: ReferenceState) -> Self {
        debug_assert_eq!(data.shape(), self.data.shape());
        Self {
            labels: self.labels.clone(),
            data,
            state,
        }
    }
}
