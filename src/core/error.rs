use thiserror::Error;

/// Failures raised by re-referencing.
///
/// Every variant is terminal for the request: nothing is retried and no
/// partially transformed data is ever returned.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ReferenceError {
    #[error("Missing canonical channels: {}", .missing.join(", "))]
    MissingChannels { missing: Vec<String> },

    #[error(
        "No precomputed '{scheme}' operator for {channel_count} channels (library layout has {expected})"
    )]
    UnsupportedLayout {
        scheme: String,
        channel_count: usize,
        expected: usize,
    },

    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("Dimension mismatch: {context} expects {expected} channels, got {actual}")]
    DimensionMismatch {
        context: String,
        expected: usize,
        actual: usize,
    },

    #[error(
        "Channel count mismatch: recording has {recording} channels but standalone matrix has {standalone}"
    )]
    ChannelCountMismatch { recording: usize, standalone: usize },

    /// Reserved for electrode digitization; never raised by re-referencing
    #[error("Electrode geometry outside tolerance: {0}")]
    GeometryTolerance(String),

    #[error("Invalid reference operator: {0}")]
    InvalidOperator(String),
}

impl ReferenceError {
    pub(crate) fn dimension(context: impl Into<String>, expected: usize, actual: usize) -> Self {
        Self::DimensionMismatch {
            context: context.into(),
            expected,
            actual,
        }
    }
}
