//! Core data types for re-referencing.
//!
//! - [`Recording`]: channel labels, the channel x sample matrix, and its [`ReferenceState`]
//! - [`ReferenceState`]: the scheme a recording is currently expressed in
//! - [`TargetScheme`]: the scheme a caller asks for
//! - [`LeadField`]: a channels x sources matrix for subject-specific REST
//! - [`ReferenceError`]: the failure taxonomy shared by every component
//!
//! ## Scheme identity
//!
//! Schemes are a closed enum, never strings. Parameterized schemes carry their
//! parameters so two states compare equal only when they describe the same
//! reference:
//!
//! | State | Parameter | Equal when |
//! |-------|-----------|------------|
//! | `Unipolar` | 1-based channel index | same index |
//! | `Rest` | lead-field id (MD5) | same lead-field values and shape |
//! | `RecordingReference` | hardware reference label | same label |

pub mod error;
pub mod leadfield;
pub mod recording;
pub mod types;

pub use error::ReferenceError;
pub use leadfield::LeadField;
pub use recording::Recording;
pub use types::{ChannelRef, Hemisphere, LeadFieldId, LibraryScheme, ReferenceState, TargetScheme};
