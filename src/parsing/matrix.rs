use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use nalgebra::DMatrix;
use std::fmt::Write as _;
use std::fs::File;
use std::io::{Read, Write};
use std::path::Path;
use thiserror::Error;

use crate::core::error::ReferenceError;
use crate::core::leadfield::LeadField;
use crate::core::recording::Recording;
use crate::core::types::ReferenceState;
use crate::utils::validation::check_channel_limit;

/// Errors from reading or writing matrix text files
#[derive(Error, Debug)]
pub enum ParseError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid matrix format: {0}")]
    InvalidFormat(String),

    #[error("Unsupported file format: {0}")]
    UnsupportedFormat(String),

    #[error("Too many channels: {0} exceeds maximum allowed (1024)")]
    TooManyChannels(usize),

    #[error(transparent)]
    Reference(#[from] ReferenceError),
}

/// A channel-by-sample matrix read from text
#[derive(Debug, Clone, PartialEq)]
pub struct MatrixFile {
    /// Row labels, when every row carried one
    pub labels: Option<Vec<String>>,
    pub data: DMatrix<f64>,
    /// State declared by a `# reference: <state>` line
    pub state: Option<ReferenceState>,
}

impl MatrixFile {
    /// The declared state, or `Unknown`
    #[must_use]
    pub fn state_or_unknown(&self) -> ReferenceState {
        self.state.clone().unwrap_or_default()
    }

    /// Convert to a [`Recording`], if the rows are labelled
    ///
    /// # Errors
    ///
    /// Returns `ParseError::InvalidFormat` for an unlabelled matrix, or the
    /// recording's own validation error.
    pub fn into_recording(self) -> Result<Recording, ParseError> {
        let state = self.state_or_unknown();
        let labels = self.labels.ok_or_else(|| {
            ParseError::InvalidFormat("matrix rows carry no channel labels".to_string())
        })?;
        Ok(Recording::new(labels, self.data)?.with_state(state))
    }
}

/// Pick the field delimiter from a file name, looking through a `.gz` suffix
///
/// # Errors
///
/// Returns `ParseError::UnsupportedFormat` for anything other than
/// `.tsv`, `.txt`, or `.csv` (optionally gzipped).
pub fn delimiter_for_path(path: &Path) -> Result<char, ParseError> {
    let name = path
        .file_name()
        .and_then(|n| n.to_str())
        .map(str::to_lowercase)
        .unwrap_or_default();
    let name = name.strip_suffix(".gz").unwrap_or(&name);

    if name.ends_with(".tsv") || name.ends_with(".txt") {
        Ok('\t')
    } else if name.ends_with(".csv") {
        Ok(',')
    } else {
        Err(ParseError::UnsupportedFormat(format!(
            "{} (expected .tsv, .txt or .csv, optionally .gz)",
            path.display()
        )))
    }
}

fn is_gzipped(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("gz"))
}

/// Read a matrix file, decompressing `.gz` input
///
/// # Errors
///
/// Returns `ParseError::Io` if the file cannot be read, or other parse errors
/// if the content is invalid.
pub fn parse_matrix_file(path: &Path) -> Result<MatrixFile, ParseError> {
    let delimiter = delimiter_for_path(path)?;
    let mut content = String::new();
    if is_gzipped(path) {
        GzDecoder::new(File::open(path)?).read_to_string(&mut content)?;
    } else {
        File::open(path)?.read_to_string(&mut content)?;
    }
    parse_matrix_text(&content, delimiter)
}

/// Parse matrix text: one channel per line, optional leading label field
///
/// # Errors
///
/// Returns `ParseError::InvalidFormat` for ragged rows, non-finite or
/// non-numeric samples, mixed labelled and unlabelled rows, an unreadable
/// `# reference:` line, or empty input; `ParseError::TooManyChannels` if the
/// channel limit is exceeded.
pub fn parse_matrix_text(text: &str, delimiter: char) -> Result<MatrixFile, ParseError> {
    let mut labels: Vec<Option<String>> = Vec::new();
    let mut rows: Vec<Vec<f64>> = Vec::new();
    let mut state = None;
    let mut first_data_line = true;

    for (i, line) in text.lines().enumerate() {
        let line_num = i + 1;
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if let Some(comment) = line.strip_prefix('#') {
            if let Some(declared) = comment.trim().strip_prefix("reference:") {
                let parsed = declared.parse::<ReferenceState>().map_err(|e| {
                    ParseError::InvalidFormat(format!("Line {line_num}: {e}"))
                })?;
                state = Some(parsed);
            }
            continue;
        }

        let fields: Vec<&str> = line.split(delimiter).map(str::trim).collect();

        if first_data_line {
            first_data_line = false;
            let first = fields.first().map(|s| s.to_lowercase()).unwrap_or_default();
            if first == "label" || first == "channel" {
                continue;
            }
        }

        let (label, samples) = match fields.split_first() {
            Some((first, rest)) if first.parse::<f64>().is_err() => {
                (Some((*first).to_string()), rest)
            }
            _ => (None, fields.as_slice()),
        };

        let mut row = Vec::with_capacity(samples.len());
        for field in samples {
            let value: f64 = field.parse().map_err(|_| {
                ParseError::InvalidFormat(format!("Invalid sample on line {line_num}: '{field}'"))
            })?;
            if !value.is_finite() {
                return Err(ParseError::InvalidFormat(format!(
                    "Non-finite sample on line {line_num}: '{field}'"
                )));
            }
            row.push(value);
        }

        if row.is_empty() {
            return Err(ParseError::InvalidFormat(format!(
                "Line {line_num} has no samples"
            )));
        }
        if let Some(width) = rows.first().map(Vec::len) {
            if row.len() != width {
                return Err(ParseError::InvalidFormat(format!(
                    "Line {line_num} has {} samples, expected {width}",
                    row.len()
                )));
            }
        }

        if check_channel_limit(rows.len()).is_some() {
            return Err(ParseError::TooManyChannels(rows.len() + 1));
        }

        labels.push(label);
        rows.push(row);
    }

    if rows.is_empty() {
        return Err(ParseError::InvalidFormat(
            "No channels found in input".to_string(),
        ));
    }

    let labels = if labels.iter().all(Option::is_some) {
        Some(labels.into_iter().flatten().collect())
    } else if labels.iter().all(Option::is_none) {
        None
    } else {
        return Err(ParseError::InvalidFormat(
            "Either every row or no row may carry a label".to_string(),
        ));
    };

    let width = rows[0].len();
    let data = DMatrix::from_fn(rows.len(), width, |r, c| rows[r][c]);

    Ok(MatrixFile {
        labels,
        data,
        state,
    })
}

/// Labels that would not read back as the same label
fn check_label(label: &str, delimiter: char) -> Result<(), ParseError> {
    let lower = label.to_lowercase();
    if label.is_empty()
        || label.trim() != label
        || label.contains(delimiter)
        || label.contains('\n')
        || label.starts_with('#')
        || lower == "label"
        || lower == "channel"
        || label.parse::<f64>().is_ok()
    {
        return Err(ParseError::InvalidFormat(format!(
            "Channel label '{label}' cannot be written as matrix text"
        )));
    }
    Ok(())
}

/// Render a matrix as text, with a `# reference:` line when a state is given
///
/// # Errors
///
/// Returns `ParseError::InvalidFormat` for a label that would read back
/// differently: empty, numeric (e.g. `1`, `inf`), containing the delimiter,
/// starting with `#`, or spelled like a header (`label`, `channel`).
pub fn format_matrix_text(
    labels: Option<&[String]>,
    data: &DMatrix<f64>,
    state: Option<&ReferenceState>,
    delimiter: char,
) -> Result<String, ParseError> {
    if let Some(labels) = labels {
        for label in labels {
            check_label(label, delimiter)?;
        }
    }

    let mut out = String::new();
    if let Some(state) = state {
        let _ = writeln!(out, "# reference: {state}");
    }
    for (r, row) in data.row_iter().enumerate() {
        let mut fields: Vec<String> = Vec::with_capacity(row.len() + 1);
        if let Some(label) = labels.and_then(|l| l.get(r)) {
            fields.push(label.clone());
        }
        fields.extend(row.iter().map(f64::to_string));
        let _ = writeln!(out, "{}", fields.join(&delimiter.to_string()));
    }
    Ok(out)
}

/// Write a matrix file, compressing when the name ends in `.gz`
///
/// # Errors
///
/// Returns `ParseError::UnsupportedFormat` for an unknown extension or
/// `ParseError::Io` if writing fails.
pub fn write_matrix_file(
    path: &Path,
    labels: Option<&[String]>,
    data: &DMatrix<f64>,
    state: Option<&ReferenceState>,
) -> Result<(), ParseError> {
    let text = format_matrix_text(labels, data, state, delimiter_for_path(path)?)?;
    let file = File::create(path)?;
    if is_gzipped(path) {
        let mut encoder = GzEncoder::new(file, Compression::default());
        encoder.write_all(text.as_bytes())?;
        encoder.finish()?;
    } else {
        let mut file = file;
        file.write_all(text.as_bytes())?;
    }
    Ok(())
}

/// Read a lead-field matrix (channels x sources); row labels are ignored
///
/// # Errors
///
/// Any `ParseError` from reading, or `ParseError::Reference` if the matrix
/// is not a usable lead field.
pub fn parse_lead_field_file(path: &Path) -> Result<LeadField, ParseError> {
    let parsed = parse_matrix_file(path)?;
    Ok(LeadField::new(parsed.data)?.with_source(path.display().to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_parse_labelled_tsv() {
        let text = "# reference: unipolar(2)\nlabel\ts1\ts2\nFz\t1\t2\nCz\t3.5\t-4\n";
        let parsed = parse_matrix_text(text, '\t').unwrap();

        assert_eq!(
            parsed.labels,
            Some(vec!["Fz".to_string(), "Cz".to_string()])
        );
        assert_eq!(parsed.data, DMatrix::from_row_slice(2, 2, &[1.0, 2.0, 3.5, -4.0]));
        assert_eq!(parsed.state, Some(ReferenceState::Unipolar(2)));
    }

    #[test]
    fn test_parse_unlabelled_csv() {
        let text = "# plain comment\n1,2,3\n4,5,6\n";
        let parsed = parse_matrix_text(text, ',').unwrap();
        assert!(parsed.labels.is_none());
        assert!(parsed.state.is_none());
        assert_eq!(parsed.state_or_unknown(), ReferenceState::Unknown);
        assert_eq!(parsed.data.shape(), (2, 3));
    }

    #[test]
    fn test_parse_rejects_ragged_rows() {
        let result = parse_matrix_text("1\t2\n3\n", '\t');
        assert!(matches!(result, Err(ParseError::InvalidFormat(_))));
    }

    #[test]
    fn test_parse_rejects_non_finite() {
        let result = parse_matrix_text("A\t1\tNaN\n", '\t');
        assert!(matches!(result, Err(ParseError::InvalidFormat(_))));
    }

    #[test]
    fn test_parse_rejects_mixed_labels() {
        let result = parse_matrix_text("A\t1\n2\n", '\t');
        assert!(matches!(result, Err(ParseError::InvalidFormat(_))));
    }

    #[test]
    fn test_parse_rejects_empty_and_bad_state() {
        assert!(matches!(
            parse_matrix_text("# only comments\n\n", '\t'),
            Err(ParseError::InvalidFormat(_))
        ));
        assert!(matches!(
            parse_matrix_text("# reference: sideways\n1\t2\n", '\t'),
            Err(ParseError::InvalidFormat(_))
        ));
    }

    #[test]
    fn test_parse_channel_limit() {
        let text = "0\n".repeat(1025);
        let result = parse_matrix_text(&text, '\t');
        assert!(matches!(result, Err(ParseError::TooManyChannels(1025))));
    }

    #[test]
    fn test_delimiter_for_path() {
        assert_eq!(delimiter_for_path(Path::new("a.tsv")).unwrap(), '\t');
        assert_eq!(delimiter_for_path(Path::new("a.CSV.gz")).unwrap(), ',');
        assert!(delimiter_for_path(Path::new("a.edf")).is_err());
    }

    #[test]
    fn test_format_then_parse_preserves_values() {
        let labels = vec!["A".to_string(), "B".to_string()];
        let data = DMatrix::from_row_slice(2, 2, &[0.1, -1.0e-7, 1.0 / 3.0, 2.0]);
        let state = ReferenceState::RecordingReference("B".to_string());

        let text = format_matrix_text(Some(&labels), &data, Some(&state), ',').unwrap();
        assert!(text.starts_with("# reference: recording(B)\n"));

        let parsed = parse_matrix_text(&text, ',').unwrap();
        assert_eq!(parsed.labels, Some(labels));
        assert_eq!(parsed.data, data);
        assert_eq!(parsed.state, Some(state));
    }

    #[test]
    fn test_format_rejects_labels_that_would_not_read_back() {
        let data = DMatrix::from_element(1, 2, 1.0);
        for label in ["1", "inf", "nan", "", "a,b", "#x", "Label", " Cz"] {
            let labels = vec![label.to_string()];
            assert!(
                matches!(
                    format_matrix_text(Some(&labels), &data, None, ','),
                    Err(ParseError::InvalidFormat(_))
                ),
                "label {label:?}"
            );
        }

        // Ordinary labels still round-trip
        let labels = vec!["Fp1".to_string()];
        let text = format_matrix_text(Some(&labels), &data, None, '\t').unwrap();
        assert_eq!(parse_matrix_text(&text, '\t').unwrap().labels, Some(labels));
    }

    #[test]
    fn test_gzip_file() {
        let dir = tempfile::tempdir().unwrap();
        let path: PathBuf = dir.path().join("rec.tsv.gz");
        let data = DMatrix::from_row_slice(2, 3, &[1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);

        write_matrix_file(&path, None, &data, Some(&ReferenceState::AverageReference)).unwrap();
        let parsed = parse_matrix_file(&path).unwrap();
        assert_eq!(parsed.data, data);
        assert_eq!(parsed.state, Some(ReferenceState::AverageReference));
    }

    #[test]
    fn test_into_recording_needs_labels() {
        let parsed = parse_matrix_text("1\t2\n", '\t').unwrap();
        assert!(matches!(
            parsed.into_recording(),
            Err(ParseError::InvalidFormat(_))
        ));

        let parsed = parse_matrix_text("# reference: average\nA\t1\nB\t2\n", '\t').unwrap();
        let recording = parsed.into_recording().unwrap();
        assert_eq!(recording.state(), &ReferenceState::AverageReference);
    }

    #[test]
    fn test_lead_field_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("g.csv");
        std::fs::write(&path, "A,1,0\nB,0,1\nC,1,1\n").unwrap();

        let lead_field = parse_lead_field_file(&path).unwrap();
        assert_eq!(lead_field.channel_count(), 3);
        assert_eq!(lead_field.source_count(), 2);
        assert!(lead_field.source().is_some());
    }
}
