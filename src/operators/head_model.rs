//! Default head model for REST when no subject-specific lead field exists.
//!
//! Electrodes sit on the unit sphere at their layout positions. Sources are
//! dipoles at Fibonacci-distributed points on a concentric shell, each with
//! three orthogonal moments, in an infinite homogeneous conductor (sigma = 1):
//!
//! ```text
//! V(r) = p . (r - r0) / (4 pi |r - r0|^3)
//! ```
//!
//! This is a coarse, non-subject-specific approximation; states built from it
//! are tagged `RestWithDefaultLeadField` so consumers can tell.

use nalgebra::{DMatrix, Vector3};
use std::f64::consts::PI;

use crate::layout::store::ChannelLayout;
use crate::utils::validation::count_to_f64;

/// Unit-sphere source points on a shell of the given radius
#[must_use]
pub fn source_positions(count: usize, radius: f64) -> Vec<Vector3<f64>> {
    let golden_angle = PI * (3.0 - 5.0_f64.sqrt());
    let n = count_to_f64(count);

    (0..count)
        .map(|i| {
            let i = count_to_f64(i);
            let z = 1.0 - 2.0 * (i + 0.5) / n;
            let ring = (1.0 - z * z).sqrt();
            let theta = golden_angle * i;
            Vector3::new(ring * theta.cos(), ring * theta.sin(), z) * radius
        })
        .collect()
}

/// Lead field (channels x 3*sources) for the layout's electrodes.
///
/// Column `3 * s + c` is source `s` with a unit moment along axis `c`.
/// `source_radius` must lie strictly inside the head (0 < radius < 1).
#[must_use]
pub fn default_lead_field(
    layout: &ChannelLayout,
    source_count: usize,
    source_radius: f64,
) -> DMatrix<f64> {
    let sources = source_positions(source_count, source_radius);
    let mut lead_field = DMatrix::zeros(layout.channel_count(), 3 * sources.len());

    for (e, channel) in layout.channels.iter().enumerate() {
        let [x, y, z] = channel.position;
        let electrode = Vector3::new(x, y, z).normalize();

        for (s, source) in sources.iter().enumerate() {
            let d = electrode - source;
            let scale = 4.0 * PI * d.norm().powi(3);
            for c in 0..3 {
                lead_field[(e, 3 * s + c)] = d[c] / scale;
            }
        }
    }

    lead_field
}
