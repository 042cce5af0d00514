use nalgebra::DMatrix;
use std::collections::{HashMap, HashSet};

use crate::core::error::ReferenceError;

/// Mapping from canonical channel positions to rows of a recording
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Alignment {
    /// `indices[canonical_position] = source_row`
    indices: Vec<usize>,

    /// Source labels outside the canonical set, in source order
    unmapped: Vec<String>,
}

impl Alignment {
    #[must_use]
    pub fn indices(&self) -> &[usize] {
        &self.indices
    }

    /// Source channels the canonical layout does not use (passed through untouched)
    #[must_use]
    pub fn unmapped(&self) -> &[String] {
        &self.unmapped
    }

    /// Select the canonical rows of `data`, in canonical order
    #[must_use]
    pub fn gather(&self, data: &DMatrix<f64>) -> DMatrix<f64> {
        data.select_rows(self.indices.iter())
    }

    /// Write canonical rows back into their source positions; other rows of
    /// `target` are left as they are
    pub fn scatter(&self, canonical: &DMatrix<f64>, target: &mut DMatrix<f64>) {
        for (position, &row) in self.indices.iter().enumerate() {
            target.row_mut(row).copy_from(&canonical.row(position));
        }
    }
}

/// Matches recording channel labels against a canonical label ordering
pub struct ChannelAligner<'a> {
    canonical: &'a [String],
}

impl<'a> ChannelAligner<'a> {
    pub fn new(canonical: &'a [String]) -> Self {
        Self { canonical }
    }

    /// Map every canonical label to its row in `source` (exact, case-sensitive)
    ///
    /// # Errors
    ///
    /// Returns `ReferenceError::MissingChannels` naming every canonical label
    /// absent from `source`, or `ReferenceError::InvalidParameter` if `source`
    /// repeats a label.
    pub fn align(&self, source: &[String]) -> Result<Alignment, ReferenceError> {
        let mut source_index: HashMap<&str, usize> = HashMap::with_capacity(source.len());
        for (row, label) in source.iter().enumerate() {
            if source_index.insert(label.as_str(), row).is_some() {
                return Err(ReferenceError::InvalidParameter(format!(
                    "Duplicate channel label '{label}'"
                )));
            }
        }

        let mut indices = Vec::with_capacity(self.canonical.len());
        let mut missing = Vec::new();
        for label in self.canonical {
            match source_index.get(label.as_str()) {
                Some(&row) => indices.push(row),
                None => missing.push(label.clone()),
            }
        }

        if !missing.is_empty() {
            return Err(ReferenceError::MissingChannels { missing });
        }

        let canonical: HashSet<&str> = self.canonical.iter().map(String::as_str).collect();
        let unmapped = source
            .iter()
            .filter(|label| !canonical.contains(label.as_str()))
            .cloned()
            .collect();

        Ok(Alignment { indices, unmapped })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn labels(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| (*s).to_string()).collect()
    }

    #[test]
    fn test_align_reordered() {
        let canonical = labels(&["A", "B", "C"]);
        let source = labels(&["C", "EOG", "A", "B"]);
        let alignment = ChannelAligner::new(&canonical).align(&source).unwrap();
        assert_eq!(alignment.indices(), &[2, 3, 0]);
        assert_eq!(alignment.unmapped(), &["EOG"]);
    }

    #[test]
    fn test_missing_channel_named() {
        let canonical = labels(&["A", "B", "C"]);
        let source = labels(&["A", "C"]);
        let result = ChannelAligner::new(&canonical).align(&source);
        assert_eq!(
            result,
            Err(ReferenceError::MissingChannels {
                missing: vec!["B".to_string()]
            })
        );
    }

    #[test]
    fn test_every_missing_channel_named() {
        let canonical = labels(&["A", "B", "C", "D"]);
        let source = labels(&["c", "A"]);
        match ChannelAligner::new(&canonical).align(&source) {
            Err(ReferenceError::MissingChannels { missing }) => {
                assert_eq!(missing, labels(&["B", "C", "D"]));
            }
            other => panic!("expected MissingChannels, got {other:?}"),
        }
    }

    #[test]
    fn test_duplicate_source_label() {
        let canonical = labels(&["A"]);
        let source = labels(&["A", "A"]);
        assert!(matches!(
            ChannelAligner::new(&canonical).align(&source),
            Err(ReferenceError::InvalidParameter(_))
        ));
    }

    #[test]
    fn test_gather_scatter_roundtrip() {
        let canonical = labels(&["A", "B"]);
        let source = labels(&["B", "X", "A"]);
        let alignment = ChannelAligner::new(&canonical).align(&source).unwrap();

        let data = DMatrix::from_row_slice(3, 2, &[2.0, 2.5, 9.0, 9.5, 1.0, 1.5]);
        let gathered = alignment.gather(&data);
        assert_eq!(gathered, DMatrix::from_row_slice(2, 2, &[1.0, 1.5, 2.0, 2.5]));

        let mut target = data.clone();
        alignment.scatter(&(gathered * 10.0), &mut target);
        assert_eq!(
            target,
            DMatrix::from_row_slice(3, 2, &[20.0, 25.0, 9.0, 9.5, 10.0, 15.0])
        );
    }
}
