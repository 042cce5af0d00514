use nalgebra::{DMatrix, DVector};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::path::Path;
use std::sync::OnceLock;
use thiserror::Error;
use tracing::{debug, warn};

use crate::core::error::ReferenceError;
use crate::core::types::{Hemisphere, LibraryScheme};
use crate::layout::store::{ChannelLayout, LayoutError};
use crate::operators::builder::{self, DEFAULT_PINV_TOLERANCE};
use crate::operators::head_model::default_lead_field;
use crate::operators::operator::{Provenance, ReferenceOperator};
use crate::utils::validation::count_to_f64;

#[derive(Error, Debug)]
pub enum LibraryError {
    #[error(transparent)]
    Layout(#[from] LayoutError),

    #[error("Failed to read operator table: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("Failed to parse operator table: {0}")]
    ParseError(#[from] serde_json::Error),

    #[error("Invalid operator table: {0}")]
    Invalid(String),

    #[error(transparent)]
    Operator(#[from] ReferenceError),
}

/// Operator table version for compatibility checking
pub const TABLE_VERSION: &str = "1.0.0";

/// How library operators are derived from a layout
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LibraryConfig {
    /// Neighbours per channel in the Hjorth Laplacian
    pub laplacian_neighbors: usize,
    /// Dipole locations in the default head model
    pub source_count: usize,
    /// Radius of the default source shell (unit-sphere head)
    pub source_radius: f64,
    /// Relative singular value cutoff for the default REST pseudo-inverse
    pub pinv_tolerance: f64,
}

impl Default for LibraryConfig {
    fn default() -> Self {
        Self {
            laplacian_neighbors: 4,
            source_count: 200,
            source_radius: 0.6,
            pinv_tolerance: DEFAULT_PINV_TOLERANCE,
        }
    }
}

/// Serializable operator table format
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OperatorTable {
    pub version: String,
    pub created_at: String,
    pub layout: String,
    pub channel_count: usize,
    /// Canonical channel labels the operators are ordered by
    pub labels: Vec<String>,
    pub recording_reference: String,
    pub operators: Vec<OperatorEntry>,
}

/// One operator in a table, stored row by row
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OperatorEntry {
    pub scheme: LibraryScheme,
    pub rows: Vec<Vec<f64>>,
}

/// Default-lead-field REST is only built when first requested
#[derive(Debug)]
struct DeferredRest {
    lead_field: DMatrix<f64>,
    tolerance: f64,
    operator: OnceLock<Result<ReferenceOperator, ReferenceError>>,
}

impl DeferredRest {
    fn get(&self) -> Result<&ReferenceOperator, ReferenceError> {
        self.operator
            .get_or_init(|| {
                debug!(
                    "Building default-lead-field REST operator from {}x{} head model",
                    self.lead_field.nrows(),
                    self.lead_field.ncols()
                );
                let derived =
                    builder::rest(&self.lead_field, self.lead_field.nrows(), self.tolerance)?;
                library_operator(LibraryScheme::RestWithDefaultLeadField, derived.matrix().clone())
            })
            .as_ref()
            .map_err(ReferenceError::clone)
    }
}

/// Precomputed operators for the fixed schemes of one canonical layout
#[derive(Debug)]
pub struct OperatorLibrary {
    layout_name: String,
    channel_count: usize,
    labels: Vec<String>,
    recording_reference: String,
    operators: BTreeMap<LibraryScheme, ReferenceOperator>,
    deferred_rest: Option<DeferredRest>,
}

impl OperatorLibrary {
    /// Build the library for the embedded layout with default settings
    ///
    /// # Errors
    ///
    /// Returns `LibraryError` if the embedded layout fails to load.
    pub fn load_embedded() -> Result<Self, LibraryError> {
        let layout = ChannelLayout::load_embedded()?;
        Self::from_layout(&layout, &LibraryConfig::default())
    }

    /// Build every fixed-scheme operator for a layout
    ///
    /// # Errors
    ///
    /// Returns `LibraryError::Layout` if the layout is inconsistent (including
    /// a role channel removed after loading), or `LibraryError::Operator`
    /// wrapping `ReferenceError::InvalidParameter` if the configuration cannot
    /// be honoured by the layout (e.g. more Laplacian neighbours than channels).
    pub fn from_layout(
        layout: &ChannelLayout,
        config: &LibraryConfig,
    ) -> Result<Self, LibraryError> {
        layout.validate()?;

        let n = layout.channel_count();
        if config.laplacian_neighbors == 0 || config.laplacian_neighbors >= n {
            return Err(ReferenceError::InvalidParameter(format!(
                "Laplacian needs between 1 and {} neighbours, got {}",
                n.saturating_sub(1),
                config.laplacian_neighbors
            ))
            .into());
        }
        if config.source_count == 0
            || !(config.source_radius > 0.0 && config.source_radius < 1.0)
        {
            return Err(ReferenceError::InvalidParameter(format!(
                "Default head model needs sources inside the head (count {}, radius {})",
                config.source_count, config.source_radius
            ))
            .into());
        }

        let left = layout.left_mastoid_index()?;
        let right = layout.right_mastoid_index()?;
        let recording_reference = layout.recording_reference_index()?;
        let linked = (unit(n, left) + unit(n, right)) * 0.5;

        let matrices = [
            (LibraryScheme::AverageReference, average(n)),
            (
                LibraryScheme::RecordingReference,
                subtract_combination(&unit(n, recording_reference)),
            ),
            (LibraryScheme::LeftMastoid, subtract_combination(&unit(n, left))),
            (LibraryScheme::LinkedMastoid, subtract_combination(&linked)),
            (
                LibraryScheme::ContralateralMastoid,
                contralateral(layout, left, right),
            ),
            (
                LibraryScheme::Laplacian,
                laplacian(layout, config.laplacian_neighbors),
            ),
        ];

        let mut operators = BTreeMap::new();
        for (scheme, matrix) in matrices {
            operators.insert(scheme, library_operator(scheme, matrix)?);
        }

        debug!(
            "Built {} library operators for layout '{}' ({n} channels)",
            operators.len(),
            layout.name
        );

        Ok(Self {
            layout_name: layout.name.clone(),
            channel_count: n,
            labels: layout.labels().to_vec(),
            recording_reference: layout.recording_reference.clone(),
            operators,
            deferred_rest: Some(DeferredRest {
                lead_field: default_lead_field(layout, config.source_count, config.source_radius),
                tolerance: config.pinv_tolerance,
                operator: OnceLock::new(),
            }),
        })
    }

    /// Load a previously exported operator table
    ///
    /// # Errors
    ///
    /// Returns `LibraryError::ReadError` if the file cannot be read, or a parse
    /// or validation error for malformed content.
    pub fn load_from_file(path: &Path) -> Result<Self, LibraryError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_json(&content)
    }

    /// Parse an operator table from JSON, validating every operator
    ///
    /// # Errors
    ///
    /// Returns `LibraryError::ParseError` for malformed JSON,
    /// `LibraryError::Invalid` for inconsistent shapes or duplicate schemes, and
    /// `LibraryError::Operator` if an operator fails validation.
    pub fn from_json(json: &str) -> Result<Self, LibraryError> {
        let table: OperatorTable = serde_json::from_str(json)?;

        // Version check (warn but don't fail)
        if table.version != TABLE_VERSION {
            warn!(
                "Operator table version mismatch (expected {}, found {})",
                TABLE_VERSION, table.version
            );
        }

        let n = table.channel_count;
        validate_table_labels(&table)?;

        let mut operators = BTreeMap::new();
        for entry in table.operators {
            if entry.rows.len() != n || entry.rows.iter().any(|row| row.len() != n) {
                return Err(LibraryError::Invalid(format!(
                    "'{}' operator is not {n}x{n}",
                    entry.scheme
                )));
            }
            let matrix = DMatrix::from_fn(n, n, |i, j| entry.rows[i][j]);
            let operator = library_operator(entry.scheme, matrix)?;
            if operators.insert(entry.scheme, operator).is_some() {
                return Err(LibraryError::Invalid(format!(
                    "'{}' operator listed twice",
                    entry.scheme
                )));
            }
        }

        Ok(Self {
            layout_name: table.layout,
            channel_count: n,
            labels: table.labels,
            recording_reference: table.recording_reference,
            operators,
            deferred_rest: None,
        })
    }

    /// Export every operator as a JSON table
    ///
    /// # Errors
    ///
    /// Returns `LibraryError::Operator` if the deferred REST operator cannot
    /// be built, or `LibraryError::ParseError` if serialization fails.
    pub fn to_json(&self) -> Result<String, LibraryError> {
        let mut operators = Vec::new();
        for scheme in self.schemes() {
            let operator = self.operator(scheme)?;
            operators.push(OperatorEntry {
                scheme,
                rows: operator
                    .matrix()
                    .row_iter()
                    .map(|row| row.iter().copied().collect())
                    .collect(),
            });
        }

        let table = OperatorTable {
            version: TABLE_VERSION.to_string(),
            created_at: chrono::Utc::now().to_rfc3339(),
            layout: self.layout_name.clone(),
            channel_count: self.channel_count,
            labels: self.labels.clone(),
            recording_reference: self.recording_reference.clone(),
            operators,
        };
        Ok(serde_json::to_string_pretty(&table)?)
    }

    /// Look up the operator for a scheme at a given channel count
    ///
    /// # Errors
    ///
    /// Returns `ReferenceError::UnsupportedLayout` if the library holds no
    /// operator for this scheme at `channel_count`.
    pub fn lookup(
        &self,
        scheme: LibraryScheme,
        channel_count: usize,
    ) -> Result<&ReferenceOperator, ReferenceError> {
        if channel_count != self.channel_count {
            return Err(self.unsupported(scheme, channel_count));
        }
        self.operator(scheme)
    }

    /// The operator for a scheme at the library's own channel count
    ///
    /// # Errors
    ///
    /// Returns `ReferenceError::UnsupportedLayout` if the scheme is absent,
    /// or the error from building the deferred REST operator.
    pub fn operator(&self, scheme: LibraryScheme) -> Result<&ReferenceOperator, ReferenceError> {
        if let Some(operator) = self.operators.get(&scheme) {
            return Ok(operator);
        }
        match (&self.deferred_rest, scheme) {
            (Some(deferred), LibraryScheme::RestWithDefaultLeadField) => deferred.get(),
            _ => Err(self.unsupported(scheme, self.channel_count)),
        }
    }

    fn unsupported(&self, scheme: LibraryScheme, channel_count: usize) -> ReferenceError {
        ReferenceError::UnsupportedLayout {
            scheme: scheme.to_string(),
            channel_count,
            expected: self.channel_count,
        }
    }

    /// Schemes this library can serve
    pub fn schemes(&self) -> impl Iterator<Item = LibraryScheme> + '_ {
        LibraryScheme::ALL.into_iter().filter(|scheme| {
            self.operators.contains_key(scheme)
                || (*scheme == LibraryScheme::RestWithDefaultLeadField
                    && self.deferred_rest.is_some())
        })
    }

    #[must_use]
    pub fn channel_count(&self) -> usize {
        self.channel_count
    }

    /// Canonical channel labels, in operator row order
    #[must_use]
    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    #[must_use]
    pub fn layout_name(&self) -> &str {
        &self.layout_name
    }

    /// Label of the hardware reference the `RecordingReference` operator uses
    #[must_use]
    pub fn recording_reference(&self) -> &str {
        &self.recording_reference
    }
}

fn validate_table_labels(table: &OperatorTable) -> Result<(), LibraryError> {
    if table.labels.len() != table.channel_count {
        return Err(LibraryError::Invalid(format!(
            "{} labels for {} channels",
            table.labels.len(),
            table.channel_count
        )));
    }

    let unique: HashSet<&str> = table.labels.iter().map(String::as_str).collect();
    if unique.len() != table.labels.len() {
        return Err(LibraryError::Invalid("duplicate channel labels".to_string()));
    }

    if !unique.contains(table.recording_reference.as_str()) {
        return Err(LibraryError::Invalid(format!(
            "recording reference '{}' is not a table channel",
            table.recording_reference
        )));
    }
    Ok(())
}

fn library_operator(
    scheme: LibraryScheme,
    matrix: DMatrix<f64>,
) -> Result<ReferenceOperator, ReferenceError> {
    let operator = ReferenceOperator::new(scheme.to_string(), matrix, Provenance::Library)?;
    operator.validate_common_mode()?;
    Ok(operator)
}

fn unit(n: usize, index: usize) -> DVector<f64> {
    let mut v = DVector::zeros(n);
    v[index] = 1.0;
    v
}

/// `I - (1/n) 1 1'`
fn average(n: usize) -> DMatrix<f64> {
    DMatrix::identity(n, n) - DMatrix::from_element(n, n, 1.0 / count_to_f64(n))
}

/// `I - 1 c'`: every channel minus the same combination `c` of channels
fn subtract_combination(combination: &DVector<f64>) -> DMatrix<f64> {
    let n = combination.len();
    DMatrix::identity(n, n) - DVector::from_element(n, 1.0) * combination.transpose()
}

/// Left channels minus the right mastoid, right channels minus the left
/// mastoid, midline channels minus the linked mastoids
fn contralateral(layout: &ChannelLayout, left: usize, right: usize) -> DMatrix<f64> {
    let n = layout.channel_count();
    let mut matrix = DMatrix::identity(n, n);

    for (i, channel) in layout.channels.iter().enumerate() {
        match channel.hemisphere {
            Hemisphere::Left => matrix[(i, right)] -= 1.0,
            Hemisphere::Right => matrix[(i, left)] -= 1.0,
            Hemisphere::Midline => {
                matrix[(i, left)] -= 0.5;
                matrix[(i, right)] -= 0.5;
            }
        }
    }
    matrix
}

/// Hjorth Laplacian over the `k` nearest neighbours of each channel
fn laplacian(layout: &ChannelLayout, k: usize) -> DMatrix<f64> {
    let n = layout.channel_count();
    let weight = 1.0 / count_to_f64(k);
    let mut matrix = DMatrix::identity(n, n);

    for i in 0..n {
        for j in layout.nearest_neighbors(i, k) {
            matrix[(i, j)] -= weight;
        }
    }
    matrix
}
