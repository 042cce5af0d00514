//! # eeg-reref
//!
//! A library for re-expressing EEG recordings under a different reference scheme.
//!
//! Every EEG channel is a voltage difference against some reference. The
//! hardware reference chosen at recording time is rarely the one an analysis
//! wants: average reference, linked mastoids, a surface Laplacian, or the
//! reference-at-infinity estimate REST are all common. Each of these is a
//! linear map, so switching scheme is a single matrix product `R * data`.
//!
//! `eeg-reref` keeps track of which scheme a recording is in, so repeated
//! requests are no-ops and every result is tagged with its new scheme.
//!
//! ## Features
//!
//! - **Library operators**: precomputed for the 128-channel layout (average,
//!   recording, left/linked/contralateral mastoid, Laplacian, default REST)
//! - **Derived operators**: unipolar and subject-specific REST built on demand
//! - **Label alignment**: recordings are matched to the canonical channel
//!   order by label; extra channels such as EOG pass through unchanged
//! - **Idempotency**: re-applying the current scheme returns the input unchanged
//! - **All-or-nothing**: inputs are never modified; failures produce nothing
//!
//! ## Example
//!
//! ```rust,no_run
//! use eeg_reref::{OperatorLibrary, Recording, ReferenceEngine, ReferenceState, TargetScheme};
//! use nalgebra::DMatrix;
//!
//! // Build the operator library for the embedded layout
//! let library = OperatorLibrary::load_embedded().unwrap();
//! let engine = ReferenceEngine::new(&library);
//!
//! // A recording in the hardware reference
//! let labels = library.labels().to_vec();
//! let recording = Recording::new(labels, DMatrix::zeros(128, 500))
//!     .unwrap()
//!     .with_state(ReferenceState::RecordingReference("Z3".to_string()));
//!
//! let out = engine.apply(&recording, &TargetScheme::LinkedMastoid).unwrap();
//! println!("{} -> {}", recording.state(), out.recording.state());
//! ```
//!
//! ## Modules
//!
//! - [`core`]: Recording, lead field, reference state and error types
//! - [`layout`]: The canonical channel layout
//! - [`operators`]: Operator type, library, and builders for derived operators
//! - [`engine`]: The re-referencing engine and channel alignment
//! - [`parsing`]: Matrix text files
//! - [`cli`]: Command-line interface implementation

pub mod cli;
pub mod core;
pub mod engine;
pub mod layout;
pub mod operators;
pub mod parsing;
pub mod utils;

// Re-export commonly used types for convenience
pub use core::error::ReferenceError;
pub use core::leadfield::LeadField;
pub use core::recording::Recording;
pub use core::types::*;
pub use engine::reference::{current_scheme, Action, EngineConfig, ReferenceEngine};
pub use layout::store::ChannelLayout;
pub use operators::library::{LibraryConfig, OperatorLibrary};
pub use operators::operator::ReferenceOperator;
