//! End-to-end properties of the re-referencing engine on the embedded
//! 128-channel layout.

use eeg_reref::core::types::ChannelRef;
use eeg_reref::engine::alignment::ChannelAligner;
use eeg_reref::engine::reference::{RereferencedWithStandalone, StandaloneOutput};
use eeg_reref::operators::builder::{rest_weights, DEFAULT_PINV_TOLERANCE};
use eeg_reref::operators::head_model::default_lead_field;
use eeg_reref::{
    current_scheme, Action, ChannelLayout, EngineConfig, LeadField, LibraryConfig, LibraryScheme,
    OperatorLibrary, Recording, ReferenceEngine, ReferenceError, ReferenceState, TargetScheme,
};
use nalgebra::DMatrix;

fn library() -> OperatorLibrary {
    OperatorLibrary::load_embedded().unwrap()
}

/// Library with a coarser default head model, to keep debug-mode SVDs short
fn light_library() -> OperatorLibrary {
    let layout = ChannelLayout::load_embedded().unwrap();
    let config = LibraryConfig {
        source_count: 40,
        ..LibraryConfig::default()
    };
    OperatorLibrary::from_layout(&layout, &config).unwrap()
}

fn sample_data(rows: usize, cols: usize) -> DMatrix<f64> {
    DMatrix::from_fn(rows, cols, |i, j| ((i * 7 + j * 3) % 11) as f64 - 5.0 + 0.01 * i as f64)
}

fn canonical_recording(library: &OperatorLibrary, samples: usize) -> Recording {
    Recording::new(
        library.labels().to_vec(),
        sample_data(library.channel_count(), samples),
    )
    .unwrap()
    .with_state(ReferenceState::RecordingReference("Z3".to_string()))
}

#[test]
fn test_reapplying_a_scheme_is_byte_identical() {
    let library = light_library();
    let engine = ReferenceEngine::new(&library);
    let recording = Recording::new(library.labels().to_vec(), sample_data(128, 16)).unwrap();

    let layout = ChannelLayout::load_embedded().unwrap();
    let lead_field = LeadField::new(default_lead_field(&layout, 12, 0.5)).unwrap();

    let schemes = [
        TargetScheme::AverageReference,
        TargetScheme::RecordingReference,
        TargetScheme::LeftMastoid,
        TargetScheme::LinkedMastoid,
        TargetScheme::ContralateralMastoid,
        TargetScheme::Laplacian,
        TargetScheme::RestWithDefaultLeadField,
        TargetScheme::Rest(lead_field),
        TargetScheme::unipolar(5),
    ];

    for target in &schemes {
        let once = engine.apply(&recording, target).unwrap();
        assert_eq!(once.action, Action::Transformed, "{target:?}");

        let twice = engine.apply(&once.recording, target).unwrap();
        assert_eq!(twice.action, Action::AlreadyReferenced, "{target:?}");
        assert_eq!(twice.recording, once.recording, "{target:?}");
    }
}

#[test]
fn test_unipolar_example() {
    let library = library();
    let engine = ReferenceEngine::new(&library);
    let data = DMatrix::from_row_slice(4, 2, &[1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0]);

    let out = engine
        .apply_matrix(&data, &ReferenceState::Unknown, &TargetScheme::unipolar(2))
        .unwrap();

    assert_eq!(
        out.data,
        DMatrix::from_row_slice(4, 2, &[-2.0, -2.0, 0.0, 0.0, 2.0, 2.0, 4.0, 4.0])
    );
    assert_eq!(out.state, ReferenceState::Unipolar(2));
}

#[test]
fn test_average_reference_columns_sum_to_zero() {
    let library = library();
    let engine = ReferenceEngine::new(&library);
    let recording = canonical_recording(&library, 32);

    let out = engine
        .apply(&recording, &TargetScheme::AverageReference)
        .unwrap()
        .recording;

    for column in out.data().column_iter() {
        assert!(column.sum().abs() < 1e-9, "column sum {}", column.sum());
    }
    assert_eq!(current_scheme(&out), &ReferenceState::AverageReference);
}

#[test]
fn test_rest_weights_sum_to_one() {
    let g = DMatrix::from_fn(6, 10, |i, j| ((i + 1) as f64 * (j + 2) as f64).sin());
    let weights = rest_weights(&g, DEFAULT_PINV_TOLERANCE).unwrap();

    assert!((weights.weights.sum() - 1.0).abs() < 1e-6);
    assert_eq!(weights.rank, 6);
}

#[test]
fn test_missing_channel_is_named() {
    let canonical = vec!["A".to_string(), "B".to_string(), "C".to_string()];
    let source = vec!["A".to_string(), "C".to_string()];

    let result = ChannelAligner::new(&canonical).align(&source);
    assert_eq!(
        result,
        Err(ReferenceError::MissingChannels {
            missing: vec!["B".to_string()]
        })
    );
}

#[test]
fn test_recording_missing_layout_channels_fails_without_side_effects() {
    let library = library();
    let engine = ReferenceEngine::new(&library);

    // Drop Lm and Rm
    let labels: Vec<String> = library.labels()[..126].to_vec();
    let recording = Recording::new(labels, sample_data(126, 4)).unwrap();
    let before = recording.clone();

    match engine.apply(&recording, &TargetScheme::LinkedMastoid) {
        Err(ReferenceError::MissingChannels { missing }) => {
            assert_eq!(missing, vec!["Lm".to_string(), "Rm".to_string()]);
        }
        other => panic!("expected MissingChannels, got {other:?}"),
    }
    assert_eq!(recording, before);
}

#[test]
fn test_library_operator_on_wrong_channel_count() {
    let library = library();
    let engine = ReferenceEngine::new(&library);
    let data = sample_data(64, 10);
    let before = data.clone();

    let result = engine.apply_matrix(&data, &ReferenceState::Unknown, &TargetScheme::AverageReference);
    assert!(matches!(
        result,
        Err(ReferenceError::DimensionMismatch {
            expected: 128,
            actual: 64,
            ..
        })
    ));
    assert_eq!(data, before);
}

#[test]
fn test_lookup_at_unsupported_channel_count() {
    let library = library();
    let result = library.lookup(LibraryScheme::Laplacian, 64);
    assert!(matches!(result, Err(ReferenceError::UnsupportedLayout { .. })));
}

#[test]
fn test_unipolar_scheme_round_trip() {
    let library = library();
    let engine = ReferenceEngine::new(&library);
    let recording = canonical_recording(&library, 8);

    let out = engine.apply(&recording, &TargetScheme::unipolar(3)).unwrap();
    assert_eq!(current_scheme(&out.recording), &ReferenceState::Unipolar(3));

    // The reference channel itself becomes flat zero
    assert!(out.recording.data().row(2).iter().all(|v| *v == 0.0));
}

#[test]
fn test_recording_reference_state() {
    let library = library();
    let engine = ReferenceEngine::new(&library);
    let recording = canonical_recording(&library, 8).with_state(ReferenceState::AverageReference);

    let out = engine.apply(&recording, &TargetScheme::RecordingReference).unwrap();
    assert_eq!(
        out.recording.state(),
        &ReferenceState::RecordingReference("Z3".to_string())
    );
    let z3 = out.recording.position_of("Z3").unwrap();
    assert!(out.recording.data().row(z3).iter().all(|v| v.abs() < 1e-12));
}

#[test]
fn test_every_library_operator_rejects_common_mode() {
    let library = light_library();
    for scheme in library.schemes() {
        let operator = library.operator(scheme).unwrap();
        assert!(
            operator.validate_common_mode().is_ok(),
            "{scheme} residual {}",
            operator.common_mode_residual()
        );
        assert_eq!(operator.channel_count(), 128);
    }
    assert_eq!(library.schemes().count(), LibraryScheme::ALL.len());
}

#[test]
fn test_default_rest_on_recording() {
    let library = light_library();
    let engine = ReferenceEngine::new(&library);
    let recording = canonical_recording(&library, 4);

    let out = engine
        .apply(&recording, &TargetScheme::RestWithDefaultLeadField)
        .unwrap();
    assert_eq!(out.recording.state(), &ReferenceState::RestWithDefaultLeadField);

    // A constant added to every channel is removed
    let shifted = Recording::new(
        recording.labels().to_vec(),
        recording.data().add_scalar(250.0),
    )
    .unwrap();
    let shifted_out = engine
        .apply(&shifted, &TargetScheme::RestWithDefaultLeadField)
        .unwrap();
    let diff = (shifted_out.recording.data() - out.recording.data()).abs().max();
    assert!(diff < 1e-6, "difference {diff}");
}

#[test]
fn test_label_and_index_unipolar_requests_are_equivalent() {
    let library = library();
    let engine = ReferenceEngine::new(&library);
    let recording = canonical_recording(&library, 8);

    let by_label = engine
        .apply(&recording, &TargetScheme::unipolar_label("Z5"))
        .unwrap();
    let by_index = engine.apply(&recording, &TargetScheme::unipolar(5)).unwrap();
    assert_eq!(by_label.recording, by_index.recording);

    let again = engine
        .apply(
            &by_index.recording,
            &TargetScheme::Unipolar(vec![ChannelRef::Label("Z5".to_string())]),
        )
        .unwrap();
    assert_eq!(again.action, Action::AlreadyReferenced);
}

#[test]
fn test_eog_row_passes_through_library_operators() {
    let library = library();
    let engine = ReferenceEngine::new(&library);

    let mut labels = vec!["VEOGL".to_string()];
    labels.extend(library.labels().iter().rev().cloned());
    let data = sample_data(129, 6);
    let eog_row = data.row(0).clone_owned();
    let recording = Recording::new(labels, data).unwrap();

    for target in [
        TargetScheme::AverageReference,
        TargetScheme::LinkedMastoid,
        TargetScheme::ContralateralMastoid,
        TargetScheme::Laplacian,
    ] {
        let out = engine.apply(&recording, &target).unwrap().recording;
        assert_eq!(out.labels(), recording.labels());
        assert_eq!(out.data().row(0), eog_row, "{target:?}");
    }
}

#[test]
fn test_reordered_recording_matches_canonical_order() {
    let library = library();
    let engine = ReferenceEngine::new(&library);
    let canonical = canonical_recording(&library, 5);

    let reversed_labels: Vec<String> = canonical.labels().iter().rev().cloned().collect();
    let reversed_data = DMatrix::from_fn(128, 5, |i, j| canonical.data()[(127 - i, j)]);
    let reversed = Recording::new(reversed_labels, reversed_data)
        .unwrap()
        .with_state(canonical.state().clone());

    let a = engine.apply(&canonical, &TargetScheme::Laplacian).unwrap().recording;
    let b = engine.apply(&reversed, &TargetScheme::Laplacian).unwrap().recording;

    for (row, label) in a.labels().iter().enumerate() {
        let other = b.position_of(label).unwrap();
        let diff = (a.data().row(row) - b.data().row(other)).abs().max();
        assert!(diff < 1e-12, "{label}: {diff}");
    }
}

#[test]
fn test_chunked_matches_dense() {
    let library = library();
    let dense = ReferenceEngine::new(&library);
    let chunked = ReferenceEngine::with_config(
        &library,
        EngineConfig {
            chunk_columns: 7,
            ..EngineConfig::default()
        },
    );
    let recording = canonical_recording(&library, 50);

    for target in [
        TargetScheme::AverageReference,
        TargetScheme::LinkedMastoid,
        TargetScheme::Laplacian,
    ] {
        let a = dense.apply(&recording, &target).unwrap();
        let b = chunked.apply(&recording, &target).unwrap();
        assert_eq!(a.recording.data(), b.recording.data(), "{target:?}");
    }
}

#[test]
fn test_standalone_matrix_follows_recording() {
    let library = library();
    let engine = ReferenceEngine::new(&library);
    let recording = canonical_recording(&library, 6);
    let standalone = sample_data(128, 3) * 0.5;

    let RereferencedWithStandalone {
        recording: out,
        standalone: out_standalone,
        state,
        action,
    } = engine
        .apply_with_standalone(
            &recording,
            &standalone,
            &TargetScheme::AverageReference,
            StandaloneOutput::Both,
        )
        .unwrap();

    assert_eq!(action, Action::Transformed);
    assert_eq!(state, ReferenceState::AverageReference);
    assert_eq!(out.unwrap().state(), &ReferenceState::AverageReference);
    for column in out_standalone.column_iter() {
        assert!(column.sum().abs() < 1e-9);
    }
}

#[test]
fn test_standalone_channel_count_mismatch() {
    let library = library();
    let engine = ReferenceEngine::new(&library);
    let recording = canonical_recording(&library, 6);
    let standalone = sample_data(64, 3);

    let result = engine.apply_with_standalone(
        &recording,
        &standalone,
        &TargetScheme::AverageReference,
        StandaloneOutput::Both,
    );
    assert_eq!(
        result,
        Err(ReferenceError::ChannelCountMismatch {
            recording: 128,
            standalone: 64
        })
    );

    // Standalone-only treats it as a bare matrix; 64 rows still do not fit
    // the 128-channel library operator
    let result = engine.apply_with_standalone(
        &recording,
        &standalone,
        &TargetScheme::AverageReference,
        StandaloneOutput::StandaloneOnly,
    );
    assert!(matches!(result, Err(ReferenceError::DimensionMismatch { .. })));

    let out = engine
        .apply_with_standalone(
            &recording,
            &standalone,
            &TargetScheme::unipolar(1),
            StandaloneOutput::StandaloneOnly,
        )
        .unwrap();
    assert!(out.recording.is_none());
    assert!(out.standalone.row(0).iter().all(|v| *v == 0.0));
}

#[test]
fn test_operator_table_round_trip() {
    let library = light_library();
    let json = library.to_json().unwrap();
    let reloaded = OperatorLibrary::from_json(&json).unwrap();

    assert_eq!(reloaded.labels(), library.labels());
    assert_eq!(reloaded.recording_reference(), "Z3");
    for scheme in library.schemes() {
        let a = library.operator(scheme).unwrap();
        let b = reloaded.operator(scheme).unwrap();
        let diff = (a.matrix() - b.matrix()).abs().max();
        assert!(diff < 1e-12, "{scheme}: {diff}");
    }
}

#[test]
fn test_layout_round_trip() {
    let layout = ChannelLayout::load_embedded().unwrap();
    let reloaded = ChannelLayout::from_json(&layout.to_json().unwrap()).unwrap();

    assert_eq!(reloaded.labels(), layout.labels());
    assert_eq!(reloaded.non_signal, vec!["VEOGL".to_string()]);
    assert_eq!(reloaded.index_of("Rm"), Some(127));
}
