//! Canonical channel layouts.
//!
//! A layout is the static reference data the operator library is built from:
//! the signal channels in canonical order, their hemisphere and unit-sphere
//! position, the hardware recording reference, the mastoid electrodes, and
//! any non-signal channels (e.g. EOG) a recording may carry alongside them.
//!
//! ## Embedded Layout
//!
//! The default layout is a Duke-style 128-channel waveguard cap (labels `Z*`
//! midline, `L*`/`R*` hemispheres, `Lm`/`Rm` mastoids) recorded against `Z3`,
//! plus a vertical EOG channel `VEOGL`. It is compiled into the binary and
//! validated by `build.rs`.
//!
//! ## Example
//!
//! ```rust
//! use eeg_reref::ChannelLayout;
//!
//! let layout = ChannelLayout::load_embedded().unwrap();
//! assert_eq!(layout.channel_count(), 128);
//! assert_eq!(layout.index_of("Lm"), Some(layout.left_mastoid_index().unwrap()));
//! ```

pub mod store;
