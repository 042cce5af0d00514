//! Command-line interface for eeg-reref.
//!
//! This module implements the CLI using clap. Available commands:
//!
//! - **apply**: Re-reference a matrix file to a target scheme
//! - **operators**: List, show, or export reference operators
//! - **layout**: Show or export the canonical channel layout
//!
//! ## Usage
//!
//! ```text
//! # Average-reference a labelled recording
//! eeg-reref apply rec.tsv --scheme average --output rec_ar.tsv
//!
//! # Unipolar reference to channel Z1, declaring the current state
//! eeg-reref apply rec.csv --scheme unipolar --channel Z1 --current "recording(Z3)"
//!
//! # Subject-specific REST with a lead field
//! eeg-reref apply rec.tsv.gz --scheme rest --lead-field leadfield.csv --format json
//!
//! # Inspect operators
//! eeg-reref operators list
//! eeg-reref operators show linked-mastoid --format tsv
//! ```

use std::path::Path;

use anyhow::bail;
use clap::{Parser, Subcommand};

use crate::core::types::{ChannelRef, TargetScheme};
use crate::layout::store::ChannelLayout;
use crate::operators::library::{LibraryConfig, OperatorLibrary};
use crate::parsing::matrix::parse_lead_field_file;

pub mod apply;
pub mod layout;
pub mod operators;

#[derive(Parser)]
#[command(name = "eeg-reref")]
#[command(author = "Fulcrum Genomics")]
#[command(version)]
#[command(about = "Re-express EEG recordings under a different reference scheme")]
#[command(
    long_about = "eeg-reref converts channel-by-time EEG matrices between reference schemes.\n\nIt tracks which scheme the data is currently in and provides:\n- Library operators for average, recording, mastoid, contralateral, Laplacian and default REST references\n- Derived operators for unipolar and subject-specific REST references\n- Label-based alignment of recordings to the canonical channel layout"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Output format
    #[arg(short, long, global = true, default_value = "text")]
    pub format: OutputFormat,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Re-reference a matrix file
    Apply(apply::ApplyArgs),

    /// Inspect or export reference operators
    Operators(operators::OperatorsArgs),

    /// Inspect or export the channel layout
    Layout(layout::LayoutArgs),
}

#[derive(Clone, Copy, Debug, clap::ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
    Tsv,
}

/// Reference scheme argument for CLI
#[derive(Clone, Copy, Debug, PartialEq, Eq, clap::ValueEnum)]
pub enum SchemeArg {
    Average,
    Recording,
    LeftMastoid,
    LinkedMastoid,
    Contralateral,
    Laplacian,
    /// Subject-specific REST (needs --lead-field)
    Rest,
    /// REST with the built-in head model
    RestDefault,
    /// Single-channel reference (needs --channel)
    Unipolar,
}

/// Turn scheme arguments into an engine target
///
/// # Errors
///
/// Fails if a parameter the scheme needs is missing, one it does not take is
/// given, or the lead field cannot be read.
pub fn target_scheme(
    scheme: SchemeArg,
    channel: Option<&str>,
    lead_field: Option<&Path>,
) -> anyhow::Result<TargetScheme> {
    if channel.is_some() && scheme != SchemeArg::Unipolar {
        bail!("--channel only applies to --scheme unipolar");
    }
    if lead_field.is_some() && scheme != SchemeArg::Rest {
        bail!("--lead-field only applies to --scheme rest");
    }

    let target = match scheme {
        SchemeArg::Average => TargetScheme::AverageReference,
        SchemeArg::Recording => TargetScheme::RecordingReference,
        SchemeArg::LeftMastoid => TargetScheme::LeftMastoid,
        SchemeArg::LinkedMastoid => TargetScheme::LinkedMastoid,
        SchemeArg::Contralateral => TargetScheme::ContralateralMastoid,
        SchemeArg::Laplacian => TargetScheme::Laplacian,
        SchemeArg::RestDefault => TargetScheme::RestWithDefaultLeadField,
        SchemeArg::Rest => {
            let Some(path) = lead_field else {
                bail!("--scheme rest needs --lead-field");
            };
            TargetScheme::Rest(parse_lead_field_file(path)?)
        }
        SchemeArg::Unipolar => {
            let Some(channel) = channel else {
                bail!("--scheme unipolar needs --channel <label|index>");
            };
            let channel: ChannelRef = match channel.parse() {
                Ok(channel) => channel,
                Err(never) => match never {},
            };
            TargetScheme::Unipolar(vec![channel])
        }
    };
    Ok(target)
}

/// Load the operator library from an exported table, a layout file, or the
/// embedded layout
///
/// # Errors
///
/// Fails if both sources are given or loading fails.
pub fn load_library(
    layout: Option<&Path>,
    operators: Option<&Path>,
    config: &LibraryConfig,
) -> anyhow::Result<OperatorLibrary> {
    let library = match (layout, operators) {
        (Some(_), Some(_)) => bail!("--layout and --operators are mutually exclusive"),
        (None, Some(path)) => OperatorLibrary::load_from_file(path)?,
        (Some(path), None) => {
            OperatorLibrary::from_layout(&ChannelLayout::load_from_file(path)?, config)?
        }
        (None, None) => OperatorLibrary::from_layout(&ChannelLayout::load_embedded()?, config)?,
    };
    Ok(library)
}

/// Load a layout file, or the embedded layout
///
/// # Errors
///
/// Fails if the layout cannot be read or is invalid.
pub fn load_layout(path: Option<&Path>) -> anyhow::Result<ChannelLayout> {
    Ok(match path {
        Some(path) => ChannelLayout::load_from_file(path)?,
        None => ChannelLayout::load_embedded()?,
    })
}
