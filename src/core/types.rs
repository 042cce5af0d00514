use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::core::leadfield::LeadField;

/// Provenance id of a lead-field matrix (MD5 over its shape and values)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LeadFieldId(pub String);

impl LeadFieldId {
    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into())
    }
}

impl std::fmt::Display for LeadFieldId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The reference scheme a recording is currently expressed in
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "scheme", content = "param", rename_all = "snake_case")]
pub enum ReferenceState {
    /// Nothing is known about the reference (fresh recording)
    #[default]
    Unknown,
    AverageReference,
    /// Referenced to the hardware reference electrode with this label
    RecordingReference(String),
    LeftMastoid,
    LinkedMastoid,
    ContralateralMastoid,
    Laplacian,
    /// Subject-specific REST with the identified lead field
    Rest(LeadFieldId),
    /// REST with the library's default head model
    RestWithDefaultLeadField,
    /// Single-channel reference, 1-based row index
    Unipolar(usize),
}

impl std::fmt::Display for ReferenceState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Unknown => write!(f, "unknown"),
            Self::AverageReference => write!(f, "average"),
            Self::RecordingReference(label) => write!(f, "recording({label})"),
            Self::LeftMastoid => write!(f, "left_mastoid"),
            Self::LinkedMastoid => write!(f, "linked_mastoid"),
            Self::ContralateralMastoid => write!(f, "contralateral_mastoid"),
            Self::Laplacian => write!(f, "laplacian"),
            Self::Rest(id) => write!(f, "rest({id})"),
            Self::RestWithDefaultLeadField => write!(f, "rest_default"),
            Self::Unipolar(index) => write!(f, "unipolar({index})"),
        }
    }
}

impl FromStr for ReferenceState {
    type Err = String;

    /// Parse the form produced by `Display`, e.g. `unipolar(3)` or `recording(Z3)`
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let (name, param) = match s.find('(') {
            Some(open) => {
                let param = s[open + 1..]
                    .strip_suffix(')')
                    .ok_or_else(|| format!("Unbalanced parentheses in reference state '{s}'"))?
                    .trim();
                (&s[..open], Some(param))
            }
            None => (s, None),
        };

        let state = match (name.to_lowercase().as_str(), param) {
            ("unknown", None) => Self::Unknown,
            ("average" | "average_reference", None) => Self::AverageReference,
            ("recording" | "recording_reference", Some(label)) if !label.is_empty() => {
                Self::RecordingReference(label.to_string())
            }
            ("left_mastoid", None) => Self::LeftMastoid,
            ("linked_mastoid", None) => Self::LinkedMastoid,
            ("contralateral_mastoid", None) => Self::ContralateralMastoid,
            ("laplacian", None) => Self::Laplacian,
            ("rest", Some(id)) if !id.is_empty() => Self::Rest(LeadFieldId::new(id)),
            ("rest_default", None) => Self::RestWithDefaultLeadField,
            ("unipolar", Some(index)) => {
                let index: usize = index
                    .parse()
                    .map_err(|_| format!("Invalid unipolar channel index '{index}'"))?;
                if index == 0 {
                    return Err("Unipolar channel index is 1-based".to_string());
                }
                Self::Unipolar(index)
            }
            _ => return Err(format!("Unrecognized reference state '{s}'")),
        };

        Ok(state)
    }
}

/// Fixed, non-parametric schemes served by the operator library
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LibraryScheme {
    AverageReference,
    RecordingReference,
    LeftMastoid,
    LinkedMastoid,
    ContralateralMastoid,
    Laplacian,
    RestWithDefaultLeadField,
}

impl LibraryScheme {
    pub const ALL: [Self; 7] = [
        Self::AverageReference,
        Self::RecordingReference,
        Self::LeftMastoid,
        Self::LinkedMastoid,
        Self::ContralateralMastoid,
        Self::Laplacian,
        Self::RestWithDefaultLeadField,
    ];
}

impl std::fmt::Display for LibraryScheme {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::AverageReference => write!(f, "average"),
            Self::RecordingReference => write!(f, "recording"),
            Self::LeftMastoid => write!(f, "left_mastoid"),
            Self::LinkedMastoid => write!(f, "linked_mastoid"),
            Self::ContralateralMastoid => write!(f, "contralateral_mastoid"),
            Self::Laplacian => write!(f, "laplacian"),
            Self::RestWithDefaultLeadField => write!(f, "rest_default"),
        }
    }
}

/// Which side of the head an electrode sits on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Hemisphere {
    Left,
    Right,
    Midline,
}

impl std::fmt::Display for Hemisphere {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Left => write!(f, "left"),
            Self::Right => write!(f, "right"),
            Self::Midline => write!(f, "midline"),
        }
    }
}

/// A reference channel named either by 1-based row index or by label
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelRef {
    Index(usize),
    Label(String),
}

impl FromStr for ChannelRef {
    type Err = std::convert::Infallible;

    /// Numeric strings are indices; everything else is a label
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        Ok(s.parse::<usize>()
            .map_or_else(|_| Self::Label(s.to_string()), Self::Index))
    }
}

impl std::fmt::Display for ChannelRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Index(index) => write!(f, "#{index}"),
            Self::Label(label) => write!(f, "{label}"),
        }
    }
}

/// A re-referencing request: the scheme the caller wants the data expressed in
#[derive(Debug, Clone)]
pub enum TargetScheme {
    AverageReference,
    RecordingReference,
    LeftMastoid,
    LinkedMastoid,
    ContralateralMastoid,
    Laplacian,
    /// Subject-specific REST from a caller-supplied lead field
    Rest(LeadField),
    RestWithDefaultLeadField,
    /// Single-channel reference; exactly one channel must be given
    Unipolar(Vec<ChannelRef>),
}

impl TargetScheme {
    /// Single-channel unipolar request by 1-based index
    #[must_use]
    pub fn unipolar(index: usize) -> Self {
        Self::Unipolar(vec![ChannelRef::Index(index)])
    }

    /// Single-channel unipolar request by label
    #[must_use]
    pub fn unipolar_label(label: impl Into<String>) -> Self {
        Self::Unipolar(vec![ChannelRef::Label(label.into())])
    }

    /// The library scheme serving this target, if it is a fixed scheme
    #[must_use]
    pub fn library_scheme(&self) -> Option<LibraryScheme> {
        match self {
            Self::AverageReference => Some(LibraryScheme::AverageReference),
            Self::RecordingReference => Some(LibraryScheme::RecordingReference),
            Self::LeftMastoid => Some(LibraryScheme::LeftMastoid),
            Self::LinkedMastoid => Some(LibraryScheme::LinkedMastoid),
            Self::ContralateralMastoid => Some(LibraryScheme::ContralateralMastoid),
            Self::Laplacian => Some(LibraryScheme::Laplacian),
            Self::RestWithDefaultLeadField => Some(LibraryScheme::RestWithDefaultLeadField),
            Self::Rest(_) | Self::Unipolar(_) => None,
        }
    }
}

impl From<LibraryScheme> for TargetScheme {
    fn from(scheme: LibraryScheme) -> Self {
        match scheme {
            LibraryScheme::AverageReference => Self::AverageReference,
            LibraryScheme::RecordingReference => Self::RecordingReference,
            LibraryScheme::LeftMastoid => Self::LeftMastoid,
            LibraryScheme::LinkedMastoid => Self::LinkedMastoid,
            LibraryScheme::ContralateralMastoid => Self::ContralateralMastoid,
            LibraryScheme::Laplacian => Self::Laplacian,
            LibraryScheme::RestWithDefaultLeadField => Self::RestWithDefaultLeadField,
        }
    }
}
