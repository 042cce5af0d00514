//! Reading and writing channel-by-sample matrices as delimited text.
//!
//! ## Format
//!
//! ```text
//! # reference: recording(Z3)
//! label   s1      s2      s3
//! Z1      12.5    13.0    11.75
//! Z2      -3.0    -2.5    -2.0
//! ```
//!
//! - One channel per line; the first field is the channel label unless it
//!   parses as a number. Either every row is labelled or none is. Labels that
//!   would read back differently (numeric such as `1` or `inf`, containing the
//!   delimiter, starting with `#`, or `label`/`channel`) are refused on write.
//! - Blank lines and `#` comments are skipped. `# reference: <state>` declares
//!   the state the data is currently in (same syntax `ReferenceState` prints).
//! - A first line starting with `label` or `channel` is a header and skipped.
//! - Tab-delimited for `.tsv`/`.txt`, comma-delimited for `.csv`; a trailing
//!   `.gz` is decompressed on read and compressed on write.
//!
//! ## Example
//!
//! ```rust
//! use eeg_reref::parsing::matrix::parse_matrix_text;
//!
//! let parsed = parse_matrix_text("# reference: average\nFz\t1\t2\nCz\t3\t4\n", '\t').unwrap();
//! assert_eq!(parsed.data.shape(), (2, 2));
//! assert_eq!(parsed.state.unwrap().to_string(), "average");
//! ```

pub mod matrix;
