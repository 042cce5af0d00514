use nalgebra::DMatrix;
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use tracing::{debug, info};

use crate::core::error::ReferenceError;
use crate::core::leadfield::LeadField;
use crate::core::recording::Recording;
use crate::core::types::{ChannelRef, LibraryScheme, ReferenceState, TargetScheme};
use crate::engine::alignment::{Alignment, ChannelAligner};
use crate::operators::builder::{self, DEFAULT_PINV_TOLERANCE};
use crate::operators::library::OperatorLibrary;
use crate::operators::operator::{ReferenceOperator, DEFAULT_CHUNK_COLUMNS};

/// Configuration for the reference engine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Sample columns multiplied per chunk
    pub chunk_columns: usize,
    /// Relative singular value cutoff for subject-specific REST
    pub pinv_tolerance: f64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            chunk_columns: DEFAULT_CHUNK_COLUMNS,
            pinv_tolerance: DEFAULT_PINV_TOLERANCE,
        }
    }
}

/// What a successful call did
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    /// An operator was applied and the state replaced
    Transformed,
    /// The data was already in the target scheme; returned unchanged
    AlreadyReferenced,
}

impl std::fmt::Display for Action {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Transformed => write!(f, "transformed"),
            Self::AlreadyReferenced => write!(f, "already_referenced"),
        }
    }
}

/// Result of re-referencing a recording
#[derive(Debug, Clone, PartialEq)]
pub struct Rereferenced {
    pub recording: Recording,
    pub action: Action,
}

/// Result of re-referencing a bare matrix
#[derive(Debug, Clone, PartialEq)]
pub struct RereferencedMatrix {
    pub data: DMatrix<f64>,
    pub state: ReferenceState,
    pub action: Action,
}

/// Which results a caller wants when passing a standalone matrix with a recording
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum StandaloneOutput {
    /// Re-reference both; their channel counts must agree
    #[default]
    Both,
    /// Re-reference only the standalone matrix; the recording is not returned
    StandaloneOnly,
}

/// Result of re-referencing a recording together with a standalone matrix
#[derive(Debug, Clone, PartialEq)]
pub struct RereferencedWithStandalone {
    /// `None` when only the standalone output was requested
    pub recording: Option<Recording>,
    pub standalone: DMatrix<f64>,
    pub state: ReferenceState,
    pub action: Action,
}

/// The scheme a recording is currently expressed in
#[must_use]
pub fn current_scheme(recording: &Recording) -> &ReferenceState {
    recording.state()
}

/// How the operator for a resolved target is obtained
enum Plan<'t> {
    Library(LibraryScheme),
    Unipolar(usize),
    Rest(&'t LeadField),
}

/// A target normalized to the state it produces
struct Resolved<'t> {
    state: ReferenceState,
    plan: Plan<'t>,
}

/// An operator ready to apply, with the row alignment it needs (if any)
struct Prepared<'l> {
    operator: Cow<'l, ReferenceOperator>,
    alignment: Option<Alignment>,
}

impl Prepared<'_> {
    fn apply(&self, data: &DMatrix<f64>, chunk_columns: usize) -> Result<DMatrix<f64>, ReferenceError> {
        match &self.alignment {
            Some(alignment) => {
                let canonical = self.operator.apply(&alignment.gather(data), chunk_columns)?;
                let mut result = data.clone();
                alignment.scatter(&canonical, &mut result);
                Ok(result)
            }
            None => self.operator.apply(data, chunk_columns),
        }
    }
}

/// Re-expresses recordings under a requested reference scheme.
///
/// The engine holds no per-recording state: every call borrows its inputs and
/// returns new values, so a failed call can never leave a recording partially
/// re-referenced. Callers that share one recording between threads must
/// serialize their own updates to it.
pub struct ReferenceEngine<'a> {
    library: &'a OperatorLibrary,
    config: EngineConfig,
}

impl<'a> ReferenceEngine<'a> {
    /// Create a new engine with default configuration
    pub fn new(library: &'a OperatorLibrary) -> Self {
        Self {
            library,
            config: EngineConfig::default(),
        }
    }

    /// Create a new engine with custom configuration
    pub fn with_config(library: &'a OperatorLibrary, config: EngineConfig) -> Self {
        Self { library, config }
    }

    #[must_use]
    pub fn library(&self) -> &OperatorLibrary {
        self.library
    }

    #[must_use]
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Re-reference a recording.
    ///
    /// Library schemes are applied to the recording's canonical channels
    /// (matched by label, in any order); other channels pass through. Unipolar
    /// and REST act on every row in the recording's own order.
    ///
    /// # Errors
    ///
    /// Any [`ReferenceError`]; the input recording is never modified.
    pub fn apply(
        &self,
        recording: &Recording,
        target: &TargetScheme,
    ) -> Result<Rereferenced, ReferenceError> {
        let labels = Some(recording.labels());
        let resolved = self.resolve(target, labels, recording.channel_count())?;

        if recording.state() == &resolved.state {
            info!(
                "Recording already referenced to {}; nothing to do",
                resolved.state
            );
            return Ok(Rereferenced {
                recording: recording.clone(),
                action: Action::AlreadyReferenced,
            });
        }

        let prepared = self.prepare(&resolved.plan, labels, recording.channel_count())?;
        self.log_transform(recording.data(), recording.state(), &resolved.state, &prepared);
        let data = prepared.apply(recording.data(), self.config.chunk_columns)?;

        Ok(Rereferenced {
            recording: recording.rereferenced(data, resolved.state),
            action: Action::Transformed,
        })
    }

    /// Re-reference a bare matrix whose rows are already in canonical order.
    ///
    /// Without labels, unipolar requests must name the channel by index.
    ///
    /// # Errors
    ///
    /// Any [`ReferenceError`]; a library operator whose size differs from the
    /// row count fails with `DimensionMismatch`.
    pub fn apply_matrix(
        &self,
        data: &DMatrix<f64>,
        current: &ReferenceState,
        target: &TargetScheme,
    ) -> Result<RereferencedMatrix, ReferenceError> {
        let resolved = self.resolve(target, None, data.nrows())?;

        if current == &resolved.state {
            info!("Matrix already referenced to {}; nothing to do", resolved.state);
            return Ok(RereferencedMatrix {
                data: data.clone(),
                state: resolved.state,
                action: Action::AlreadyReferenced,
            });
        }

        let prepared = self.prepare(&resolved.plan, None, data.nrows())?;
        self.log_transform(data, current, &resolved.state, &prepared);

        Ok(RereferencedMatrix {
            data: prepared.apply(data, self.config.chunk_columns)?,
            state: resolved.state,
            action: Action::Transformed,
        })
    }

    /// Re-reference a recording and a standalone matrix with the same operator.
    ///
    /// The standalone matrix's rows follow the recording's channel order. If
    /// the two disagree on channel count the call fails, unless only the
    /// standalone output is requested; then the standalone matrix is treated as
    /// a bare canonical-order matrix.
    ///
    /// # Errors
    ///
    /// `ReferenceError::ChannelCountMismatch` as described above, or any other
    /// [`ReferenceError`]. Nothing is returned unless both outputs succeed.
    pub fn apply_with_standalone(
        &self,
        recording: &Recording,
        standalone: &DMatrix<f64>,
        target: &TargetScheme,
        output: StandaloneOutput,
    ) -> Result<RereferencedWithStandalone, ReferenceError> {
        let rows_match = standalone.nrows() == recording.channel_count();

        match output {
            StandaloneOutput::Both => {
                if !rows_match {
                    return Err(ReferenceError::ChannelCountMismatch {
                        recording: recording.channel_count(),
                        standalone: standalone.nrows(),
                    });
                }

                let labels = Some(recording.labels());
                let resolved = self.resolve(target, labels, recording.channel_count())?;
                if recording.state() == &resolved.state {
                    info!(
                        "Recording already referenced to {}; nothing to do",
                        resolved.state
                    );
                    return Ok(RereferencedWithStandalone {
                        recording: Some(recording.clone()),
                        standalone: standalone.clone(),
                        state: resolved.state,
                        action: Action::AlreadyReferenced,
                    });
                }

                let prepared = self.prepare(&resolved.plan, labels, recording.channel_count())?;
                self.log_transform(recording.data(), recording.state(), &resolved.state, &prepared);
                let data = prepared.apply(recording.data(), self.config.chunk_columns)?;
                let standalone = prepared.apply(standalone, self.config.chunk_columns)?;

                Ok(RereferencedWithStandalone {
                    recording: Some(recording.rereferenced(data, resolved.state.clone())),
                    standalone,
                    state: resolved.state,
                    action: Action::Transformed,
                })
            }
            StandaloneOutput::StandaloneOnly => {
                let labels = rows_match.then(|| recording.labels());
                let resolved = self.resolve(target, labels, standalone.nrows())?;
                if recording.state() == &resolved.state {
                    info!("Matrix already referenced to {}; nothing to do", resolved.state);
                    return Ok(RereferencedWithStandalone {
                        recording: None,
                        standalone: standalone.clone(),
                        state: resolved.state,
                        action: Action::AlreadyReferenced,
                    });
                }

                let prepared = self.prepare(&resolved.plan, labels, standalone.nrows())?;
                self.log_transform(standalone, recording.state(), &resolved.state, &prepared);

                Ok(RereferencedWithStandalone {
                    recording: None,
                    standalone: prepared.apply(standalone, self.config.chunk_columns)?,
                    state: resolved.state,
                    action: Action::Transformed,
                })
            }
        }
    }

    /// Normalize a target into the state it will produce.
    ///
    /// Unipolar labels are resolved to 1-based indices here, before any
    /// idempotency comparison, so index and label requests for the same
    /// channel are equivalent.
    fn resolve<'t>(
        &self,
        target: &'t TargetScheme,
        labels: Option<&[String]>,
        channel_count: usize,
    ) -> Result<Resolved<'t>, ReferenceError> {
        let resolved = match target {
            TargetScheme::Unipolar(channels) => {
                let index = resolve_unipolar_channel(channels, labels, channel_count)?;
                Resolved {
                    state: ReferenceState::Unipolar(index),
                    plan: Plan::Unipolar(index),
                }
            }
            TargetScheme::Rest(lead_field) => Resolved {
                state: ReferenceState::Rest(lead_field.id().clone()),
                plan: Plan::Rest(lead_field),
            },
            _ => {
                // Every remaining target is a fixed library scheme
                let scheme = target.library_scheme().ok_or_else(|| {
                    ReferenceError::InvalidParameter(format!("Unsupported target {target:?}"))
                })?;
                Resolved {
                    state: library_state(scheme, self.library.recording_reference()),
                    plan: Plan::Library(scheme),
                }
            }
        };
        Ok(resolved)
    }

    fn prepare(
        &self,
        plan: &Plan<'_>,
        labels: Option<&[String]>,
        channel_count: usize,
    ) -> Result<Prepared<'a>, ReferenceError> {
        let library: &'a OperatorLibrary = self.library;
        let prepared = match plan {
            Plan::Library(scheme) => {
                let operator = library.lookup(*scheme, library.channel_count())?;
                let alignment = match labels {
                    Some(labels) => {
                        let alignment = ChannelAligner::new(library.labels()).align(labels)?;
                        if !alignment.unmapped().is_empty() {
                            debug!(
                                "Channels outside the '{}' layout pass through unchanged: {}",
                                library.layout_name(),
                                alignment.unmapped().join(", ")
                            );
                        }
                        Some(alignment)
                    }
                    None => None,
                };
                Prepared {
                    operator: Cow::Borrowed(operator),
                    alignment,
                }
            }
            Plan::Unipolar(index) => Prepared {
                operator: Cow::Owned(builder::unipolar(channel_count, &[*index])?),
                alignment: None,
            },
            Plan::Rest(lead_field) => Prepared {
                operator: Cow::Owned(builder::rest(
                    lead_field.matrix(),
                    channel_count,
                    self.config.pinv_tolerance,
                )?),
                alignment: None,
            },
        };
        Ok(prepared)
    }

    fn log_transform(
        &self,
        data: &DMatrix<f64>,
        from: &ReferenceState,
        to: &ReferenceState,
        prepared: &Prepared<'_>,
    ) {
        debug!(
            "Re-referencing {}x{} matrix from {from} to {to} with {} '{}' operator",
            data.nrows(),
            data.ncols(),
            prepared.operator.provenance(),
            prepared.operator.name()
        );
    }
}

fn library_state(scheme: LibraryScheme, recording_reference: &str) -> ReferenceState {
    match scheme {
        LibraryScheme::AverageReference => ReferenceState::AverageReference,
        LibraryScheme::RecordingReference => {
            ReferenceState::RecordingReference(recording_reference.to_string())
        }
        LibraryScheme::LeftMastoid => ReferenceState::LeftMastoid,
        LibraryScheme::LinkedMastoid => ReferenceState::LinkedMastoid,
        LibraryScheme::ContralateralMastoid => ReferenceState::ContralateralMastoid,
        LibraryScheme::Laplacian => ReferenceState::Laplacian,
        LibraryScheme::RestWithDefaultLeadField => ReferenceState::RestWithDefaultLeadField,
    }
}

/// The single 1-based reference index a unipolar request names
fn resolve_unipolar_channel(
    channels: &[ChannelRef],
    labels: Option<&[String]>,
    channel_count: usize,
) -> Result<usize, ReferenceError> {
    let channel = match channels {
        [channel] => channel,
        [] => {
            return Err(ReferenceError::InvalidParameter(
                "Unipolar referencing needs a reference channel".to_string(),
            ))
        }
        _ => {
            return Err(ReferenceError::InvalidParameter(format!(
                "Only single-channel unipolar referencing is supported ({} channels given)",
                channels.len()
            )))
        }
    };

    match channel {
        ChannelRef::Index(index) if (1..=channel_count).contains(index) => Ok(*index),
        ChannelRef::Index(index) => Err(ReferenceError::InvalidParameter(format!(
            "Unipolar reference channel {index} is outside 1..={channel_count}"
        ))),
        ChannelRef::Label(label) => {
            let labels = labels.ok_or_else(|| {
                ReferenceError::InvalidParameter(format!(
                    "Cannot resolve channel label '{label}' without channel labels"
                ))
            })?;
            labels
                .iter()
                .position(|l| l == label)
                .map(|row| row + 1)
                .ok_or_else(|| {
                    ReferenceError::InvalidParameter(format!(
                        "Unipolar reference channel '{label}' is not in the recording"
                    ))
                })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout::store::ChannelLayout;
    use crate::operators::library::LibraryConfig;

    const PAIR_TABLE: &str = r#"{
        "version": "1.0.0",
        "created_at": "2026-01-01T00:00:00Z",
        "layout": "triple",
        "channel_count": 3,
        "labels": ["A", "B", "C"],
        "recording_reference": "B",
        "operators": [
            {"scheme": "average_reference", "rows": [
                [0.6666666666666667, -0.3333333333333333, -0.3333333333333333],
                [-0.3333333333333333, 0.6666666666666667, -0.3333333333333333],
                [-0.3333333333333333, -0.3333333333333333, 0.6666666666666667]
            ]},
            {"scheme": "recording_reference", "rows": [
                [1.0, -1.0, 0.0],
                [0.0, 0.0, 0.0],
                [0.0, -1.0, 1.0]
            ]}
        ]
    }"#;

    fn labels(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| (*s).to_string()).collect()
    }

    fn triple_library() -> OperatorLibrary {
        OperatorLibrary::from_json(PAIR_TABLE).unwrap()
    }

    #[test]
    fn test_recording_reference_state_carries_label() {
        let library = triple_library();
        let engine = ReferenceEngine::new(&library);
        let rec = Recording::new(labels(&["A", "B", "C"]), DMatrix::from_element(3, 2, 1.0)).unwrap();

        let out = engine.apply(&rec, &TargetScheme::RecordingReference).unwrap();
        assert_eq!(
            current_scheme(&out.recording),
            &ReferenceState::RecordingReference("B".to_string())
        );
        assert_eq!(out.action, Action::Transformed);
    }

    #[test]
    fn test_library_scheme_on_reordered_recording() {
        let library = triple_library();
        let engine = ReferenceEngine::new(&library);
        // Rows: C, EOG, A, B
        let data = DMatrix::from_row_slice(4, 1, &[3.0, 100.0, 1.0, 2.0]);
        let rec = Recording::new(labels(&["C", "EOG", "A", "B"]), data).unwrap();

        let out = engine
            .apply(&rec, &TargetScheme::RecordingReference)
            .unwrap()
            .recording;
        assert_eq!(out.labels(), rec.labels());
        assert_eq!(
            out.data(),
            &DMatrix::from_row_slice(4, 1, &[1.0, 100.0, -1.0, 0.0])
        );
    }

    #[test]
    fn test_missing_canonical_channel() {
        let library = triple_library();
        let engine = ReferenceEngine::new(&library);
        let rec = Recording::new(labels(&["A", "C"]), DMatrix::zeros(2, 3)).unwrap();

        let result = engine.apply(&rec, &TargetScheme::AverageReference);
        assert_eq!(
            result,
            Err(ReferenceError::MissingChannels {
                missing: vec!["B".to_string()]
            })
        );
    }

    #[test]
    fn test_unipolar_label_and_index_are_equivalent() {
        let library = triple_library();
        let engine = ReferenceEngine::new(&library);
        let rec = Recording::new(labels(&["A", "B", "C"]), DMatrix::from_element(3, 2, 2.0)).unwrap();

        let by_label = engine.apply(&rec, &TargetScheme::unipolar_label("C")).unwrap();
        assert_eq!(by_label.recording.state(), &ReferenceState::Unipolar(3));

        let by_index = engine.apply(&by_label.recording, &TargetScheme::unipolar(3)).unwrap();
        assert_eq!(by_index.action, Action::AlreadyReferenced);
        assert_eq!(by_index.recording, by_label.recording);
    }

    #[test]
    fn test_unipolar_label_needs_labels() {
        let library = triple_library();
        let engine = ReferenceEngine::new(&library);
        let result = engine.apply_matrix(
            &DMatrix::zeros(3, 1),
            &ReferenceState::Unknown,
            &TargetScheme::unipolar_label("A"),
        );
        assert!(matches!(result, Err(ReferenceError::InvalidParameter(_))));
    }

    #[test]
    fn test_unipolar_unknown_label() {
        let library = triple_library();
        let engine = ReferenceEngine::new(&library);
        let rec = Recording::new(labels(&["A", "B", "C"]), DMatrix::zeros(3, 1)).unwrap();
        let result = engine.apply(&rec, &TargetScheme::unipolar_label("Cz"));
        assert!(matches!(result, Err(ReferenceError::InvalidParameter(_))));
    }

    #[test]
    fn test_unipolar_rejects_multiple_channels() {
        let library = triple_library();
        let engine = ReferenceEngine::new(&library);
        let target = TargetScheme::Unipolar(vec![ChannelRef::Index(1), ChannelRef::Index(2)]);
        let result = engine.apply_matrix(&DMatrix::zeros(3, 1), &ReferenceState::Unknown, &target);
        assert!(matches!(result, Err(ReferenceError::InvalidParameter(_))));
    }

    #[test]
    fn test_out_of_range_index_fails_even_if_state_matches() {
        let library = triple_library();
        let engine = ReferenceEngine::new(&library);
        let result = engine.apply_matrix(
            &DMatrix::zeros(3, 1),
            &ReferenceState::Unipolar(9),
            &TargetScheme::unipolar(9),
        );
        assert!(matches!(result, Err(ReferenceError::InvalidParameter(_))));
    }

    #[test]
    fn test_rest_state_tracks_lead_field() {
        let library = triple_library();
        let engine = ReferenceEngine::new(&library);
        let rec = Recording::new(labels(&["A", "B", "C"]), DMatrix::from_element(3, 4, 1.0)).unwrap();

        let g1 = LeadField::new(DMatrix::identity(3, 3)).unwrap();
        let g2 = LeadField::new(DMatrix::from_row_slice(3, 2, &[1.0, 0.0, 0.0, 1.0, 1.0, 1.0]))
            .unwrap();

        let first = engine.apply(&rec, &TargetScheme::Rest(g1.clone())).unwrap();
        assert_eq!(first.recording.state(), &ReferenceState::Rest(g1.id().clone()));

        let again = engine.apply(&first.recording, &TargetScheme::Rest(g1)).unwrap();
        assert_eq!(again.action, Action::AlreadyReferenced);

        let other = engine.apply(&first.recording, &TargetScheme::Rest(g2.clone())).unwrap();
        assert_eq!(other.action, Action::Transformed);
        assert_eq!(other.recording.state(), &ReferenceState::Rest(g2.id().clone()));
    }

    #[test]
    fn test_default_rest_is_tagged_distinctly() {
        let layout = ChannelLayout::load_embedded().unwrap();
        let library = OperatorLibrary::from_layout(
            &layout,
            &LibraryConfig {
                source_count: 60,
                ..LibraryConfig::default()
            },
        )
        .unwrap();
        let engine = ReferenceEngine::new(&library);
        let data = DMatrix::from_fn(128, 3, |i, j| (i + j) as f64);

        let out = engine
            .apply_matrix(&data, &ReferenceState::Unknown, &TargetScheme::RestWithDefaultLeadField)
            .unwrap();
        assert_eq!(out.state, ReferenceState::RestWithDefaultLeadField);
        assert!(!matches!(out.state, ReferenceState::Rest(_)));
    }

    #[test]
    fn test_standalone_mismatch_rejected() {
        let library = triple_library();
        let engine = ReferenceEngine::new(&library);
        let rec = Recording::new(labels(&["A", "B", "C"]), DMatrix::zeros(3, 2)).unwrap();
        let standalone = DMatrix::zeros(2, 2);

        let result = engine.apply_with_standalone(
            &rec,
            &standalone,
            &TargetScheme::unipolar(1),
            StandaloneOutput::Both,
        );
        assert_eq!(
            result,
            Err(ReferenceError::ChannelCountMismatch {
                recording: 3,
                standalone: 2
            })
        );
    }

    #[test]
    fn test_standalone_only_allows_mismatch() {
        let library = triple_library();
        let engine = ReferenceEngine::new(&library);
        let rec = Recording::new(labels(&["A", "B", "C"]), DMatrix::zeros(3, 2)).unwrap();
        let standalone = DMatrix::from_row_slice(2, 1, &[5.0, 3.0]);

        let out = engine
            .apply_with_standalone(
                &rec,
                &standalone,
                &TargetScheme::unipolar(2),
                StandaloneOutput::StandaloneOnly,
            )
            .unwrap();
        assert!(out.recording.is_none());
        assert_eq!(out.standalone, DMatrix::from_row_slice(2, 1, &[2.0, 0.0]));
        assert_eq!(out.state, ReferenceState::Unipolar(2));
    }

    #[test]
    fn test_standalone_both_uses_same_operator() {
        let library = triple_library();
        let engine = ReferenceEngine::new(&library);
        let data = DMatrix::from_row_slice(3, 1, &[1.0, 2.0, 3.0]);
        let rec = Recording::new(labels(&["A", "B", "C"]), data.clone()).unwrap();

        let out = engine
            .apply_with_standalone(
                &rec,
                &(data * 2.0),
                &TargetScheme::RecordingReference,
                StandaloneOutput::Both,
            )
            .unwrap();
        let recording = out.recording.unwrap();
        assert_eq!(recording.data(), &DMatrix::from_row_slice(3, 1, &[-1.0, 0.0, 1.0]));
        assert_eq!(out.standalone, DMatrix::from_row_slice(3, 1, &[-2.0, 0.0, 2.0]));
        assert_eq!(recording.state(), &out.state);
    }
}
