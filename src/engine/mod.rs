//! The re-referencing engine and channel alignment.
//!
//! - [`ReferenceEngine`]: decides no-op vs. transform, obtains the operator
//!   (library or builder), applies it and returns the new (matrix, state) pair
//! - [`ChannelAligner`]: matches recording labels to the library's canonical order
//!
//! ## Algorithm
//!
//! For every `apply` call:
//!
//! 1. **Resolve**: normalize the target into the state it would produce
//!    (unipolar labels become 1-based indices, REST carries its lead-field id)
//! 2. **Idempotency**: if the current state already equals it, return the
//!    input unchanged
//! 3. **Operator**: library lookup for fixed schemes, builder for unipolar
//!    and subject-specific REST
//! 4. **Align**: with a labelled recording and a library scheme, gather the
//!    canonical rows, apply, and scatter back; other rows pass through
//! 5. **Apply**: `R * data`, chunked over samples, after checking sizes
//!
//! Every failure returns before anything is produced, so there is no partial
//! application.
//!
//! ## Example
//!
//! ```rust,no_run
//! use eeg_reref::{OperatorLibrary, Recording, ReferenceEngine, ReferenceState, TargetScheme};
//! use nalgebra::DMatrix;
//!
//! let library = OperatorLibrary::load_embedded().unwrap();
//! let engine = ReferenceEngine::new(&library);
//!
//! let labels: Vec<String> = library.labels().to_vec();
//! let recording = Recording::new(labels, DMatrix::zeros(128, 1000)).unwrap();
//!
//! let out = engine.apply(&recording, &TargetScheme::unipolar(3)).unwrap();
//! assert_eq!(out.recording.state(), &ReferenceState::Unipolar(3));
//! ```

pub mod alignment;
pub mod reference;

pub use alignment::{Alignment, ChannelAligner};
pub use reference::{
    current_scheme, Action, EngineConfig, ReferenceEngine, Rereferenced, RereferencedMatrix,
    RereferencedWithStandalone, StandaloneOutput,
};
