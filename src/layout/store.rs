use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::path::Path;
use thiserror::Error;
use tracing::warn;

use crate::core::types::Hemisphere;

#[derive(Error, Debug)]
pub enum LayoutError {
    #[error("Failed to read layout: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("Failed to parse layout: {0}")]
    ParseError(#[from] serde_json::Error),

    #[error("Invalid layout: {0}")]
    Invalid(String),
}

/// Layout version for compatibility checking
pub const LAYOUT_VERSION: &str = "1.0.0";

fn default_version() -> String {
    LAYOUT_VERSION.to_string()
}

/// A signal electrode in the canonical ordering
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LayoutChannel {
    pub label: String,
    pub hemisphere: Hemisphere,
    /// Unit-sphere position (x right, y anterior, z superior)
    pub position: [f64; 3],
}

/// The canonical channel layout the operator library is defined over
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelLayout {
    #[serde(default = "default_version")]
    pub version: String,

    /// Short identifier, e.g. `duke_waveguard_128`
    pub name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// Label of the hardware reference electrode used during acquisition
    pub recording_reference: String,

    pub left_mastoid: String,

    pub right_mastoid: String,

    /// Channels a recording may carry that are never re-referenced (e.g. EOG)
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub non_signal: Vec<String>,

    /// Signal channels in canonical order
    pub channels: Vec<LayoutChannel>,

    // === Pre-computed on load ===
    #[serde(skip)]
    labels: Vec<String>,

    #[serde(skip)]
    label_to_index: HashMap<String, usize>,
}

impl ChannelLayout {
    /// Load the embedded default layout
    ///
    /// # Errors
    ///
    /// Returns `LayoutError` if the embedded JSON fails to parse or validate.
    pub fn load_embedded() -> Result<Self, LayoutError> {
        // Validated at compile time by build.rs
        const EMBEDDED_LAYOUT: &str = include_str!("../../layouts/duke128.json");
        Self::from_json(EMBEDDED_LAYOUT)
    }

    /// Load a layout from a JSON file
    ///
    /// # Errors
    ///
    /// Returns `LayoutError::ReadError` if the file cannot be read, or a parse
    /// or validation error for malformed content.
    pub fn load_from_file(path: &Path) -> Result<Self, LayoutError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_json(&content)
    }

    /// Parse a layout from a JSON string
    ///
    /// # Errors
    ///
    /// Returns `LayoutError::ParseError` for malformed JSON or
    /// `LayoutError::Invalid` if the layout is inconsistent.
    pub fn from_json(json: &str) -> Result<Self, LayoutError> {
        let mut layout: Self = serde_json::from_str(json)?;

        // Version check (warn but don't fail)
        if layout.version != LAYOUT_VERSION {
            warn!(
                "Layout version mismatch (expected {}, found {})",
                LAYOUT_VERSION, layout.version
            );
        }

        layout.rebuild_indexes();
        layout.validate()?;
        Ok(layout)
    }

    /// Export the layout to JSON
    ///
    /// # Errors
    ///
    /// Returns `LayoutError::ParseError` if serialization fails.
    pub fn to_json(&self) -> Result<String, LayoutError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Rebuild the label index after modifying channels
    pub fn rebuild_indexes(&mut self) {
        self.labels = self.channels.iter().map(|c| c.label.clone()).collect();
        self.label_to_index = self
            .labels
            .iter()
            .enumerate()
            .map(|(i, label)| (label.clone(), i))
            .collect();
    }

    /// Check the layout is internally consistent and its indexes are current
    ///
    /// # Errors
    ///
    /// Returns `LayoutError::Invalid` for duplicate labels, unusable positions,
    /// role labels that are not channels, overlapping non-signal labels, or
    /// indexes not rebuilt since `channels` changed.
    pub fn validate(&self) -> Result<(), LayoutError> {
        if self.channels.is_empty() {
            return Err(LayoutError::Invalid("layout has no channels".to_string()));
        }

        if self.labels.len() != self.channels.len()
            || self.label_to_index.len() != self.channels.len()
            || self
                .channels
                .iter()
                .zip(&self.labels)
                .any(|(c, label)| &c.label != label)
        {
            return Err(LayoutError::Invalid(
                "channel indexes are stale; call rebuild_indexes after modifying channels"
                    .to_string(),
            ));
        }

        let mut seen = HashSet::new();
        for channel in &self.channels {
            if !seen.insert(channel.label.as_str()) {
                return Err(LayoutError::Invalid(format!(
                    "duplicate channel label '{}'",
                    channel.label
                )));
            }
            if !channel.position.iter().all(|c| c.is_finite())
                || channel.position.iter().all(|c| *c == 0.0)
            {
                return Err(LayoutError::Invalid(format!(
                    "channel '{}' has no usable position",
                    channel.label
                )));
            }
        }

        for (role, label) in [
            ("recording reference", &self.recording_reference),
            ("left mastoid", &self.left_mastoid),
            ("right mastoid", &self.right_mastoid),
        ] {
            if !self.label_to_index.contains_key(label) {
                return Err(LayoutError::Invalid(format!(
                    "{role} '{label}' is not a layout channel"
                )));
            }
        }

        if self.left_mastoid == self.right_mastoid {
            return Err(LayoutError::Invalid(
                "left and right mastoid must be different channels".to_string(),
            ));
        }

        if let Some(label) = self
            .non_signal
            .iter()
            .find(|l| self.label_to_index.contains_key(*l))
        {
            return Err(LayoutError::Invalid(format!(
                "non-signal channel '{label}' is also a signal channel"
            )));
        }

        Ok(())
    }

    /// Canonical signal-channel labels in order
    #[must_use]
    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    /// Number of canonical signal channels
    #[must_use]
    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }

    /// Canonical (0-based) position of a label
    #[must_use]
    pub fn index_of(&self, label: &str) -> Option<usize> {
        self.label_to_index.get(label).copied()
    }

    #[must_use]
    pub fn is_non_signal(&self, label: &str) -> bool {
        self.non_signal.iter().any(|l| l == label)
    }

    fn role_index(&self, role: &str, label: &str) -> Result<usize, LayoutError> {
        self.index_of(label).ok_or_else(|| {
            LayoutError::Invalid(format!("{role} '{label}' is not a layout channel"))
        })
    }

    /// Canonical index of the hardware recording reference
    ///
    /// # Errors
    ///
    /// Returns `LayoutError::Invalid` if the label is not a layout channel.
    pub fn recording_reference_index(&self) -> Result<usize, LayoutError> {
        self.role_index("recording reference", &self.recording_reference)
    }

    /// # Errors
    ///
    /// Returns `LayoutError::Invalid` if the label is not a layout channel.
    pub fn left_mastoid_index(&self) -> Result<usize, LayoutError> {
        self.role_index("left mastoid", &self.left_mastoid)
    }

    /// # Errors
    ///
    /// Returns `LayoutError::Invalid` if the label is not a layout channel.
    pub fn right_mastoid_index(&self) -> Result<usize, LayoutError> {
        self.role_index("right mastoid", &self.right_mastoid)
    }

    /// The `k` channels closest to channel `index` (Euclidean distance, ties by
    /// canonical index), excluding the channel itself
    #[must_use]
    pub fn nearest_neighbors(&self, index: usize, k: usize) -> Vec<usize> {
        let origin = self.channels[index].position;
        let mut others: Vec<(f64, usize)> = self
            .channels
            .iter()
            .enumerate()
            .filter(|(j, _)| *j != index)
            .map(|(j, c)| (squared_distance(&origin, &c.position), j))
            .collect();

        others.sort_by(|a, b| a.0.total_cmp(&b.0).then(a.1.cmp(&b.1)));
        others.into_iter().take(k).map(|(_, j)| j).collect()
    }

    /// Count channels per hemisphere (left, right, midline)
    #[must_use]
    pub fn hemisphere_counts(&self) -> (usize, usize, usize) {
        self.channels
            .iter()
            .fold((0, 0, 0), |(l, r, m), c| match c.hemisphere {
                Hemisphere::Left => (l + 1, r, m),
                Hemisphere::Right => (l, r + 1, m),
                Hemisphere::Midline => (l, r, m + 1),
            })
    }
}

fn squared_distance(a: &[f64; 3], b: &[f64; 3]) -> f64 {
    a.iter().zip(b).map(|(x, y)| (x - y).powi(2)).sum()
}
