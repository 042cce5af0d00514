//! Reference operators: the fixed-scheme library and request-time builders.
//!
//! Every operator is a square channels x channels matrix `R`; re-referenced
//! data is `R * data`. All operators reject common mode (`R * 1 = 0`), so a
//! constant offset on every channel disappears after re-referencing.
//!
//! - [`library::OperatorLibrary`]: average, recording reference, mastoid
//!   variants, Hjorth Laplacian and default-lead-field REST for one layout
//! - [`builder`]: unipolar and subject-specific REST operators
//! - [`head_model`]: the spherical dipole model behind default REST
//!
//! ## Example
//!
//! ```rust,no_run
//! use eeg_reref::operators::builder;
//! use eeg_reref::{LibraryScheme, OperatorLibrary};
//!
//! let library = OperatorLibrary::load_embedded().unwrap();
//! let average = library.lookup(LibraryScheme::AverageReference, 128).unwrap();
//! assert_eq!(average.channel_count(), 128);
//!
//! let unipolar = builder::unipolar(4, &[2]).unwrap();
//! assert_eq!(unipolar.matrix()[(1, 1)], 0.0);
//! ```

pub mod builder;
pub mod head_model;
pub mod library;
pub mod operator;
