use std::path::PathBuf;

use anyhow::bail;
use clap::Args;

use crate::cli::{load_library, target_scheme, OutputFormat, SchemeArg};
use crate::core::recording::Recording;
use crate::core::types::ReferenceState;
use crate::engine::reference::{EngineConfig, ReferenceEngine};
use crate::operators::builder::DEFAULT_PINV_TOLERANCE;
use crate::operators::library::LibraryConfig;
use crate::operators::operator::DEFAULT_CHUNK_COLUMNS;
use crate::parsing::matrix::{format_matrix_text, parse_matrix_file, write_matrix_file};

#[derive(Args)]
pub struct ApplyArgs {
    /// Input matrix (.tsv, .txt or .csv, optionally .gz)
    #[arg(required = true)]
    pub input: PathBuf,

    /// Target reference scheme
    #[arg(short, long, value_enum)]
    pub scheme: SchemeArg,

    /// Reference channel for unipolar (label or 1-based index)
    #[arg(long)]
    pub channel: Option<String>,

    /// Lead-field matrix for subject-specific REST (channels x sources)
    #[arg(long)]
    pub lead_field: Option<PathBuf>,

    /// Current reference state, overriding any `# reference:` line (e.g. "recording(Z3)")
    #[arg(long)]
    pub current: Option<String>,

    /// Path to custom layout file
    #[arg(long)]
    pub layout: Option<PathBuf>,

    /// Path to an exported operator table
    #[arg(long)]
    pub operators: Option<PathBuf>,

    /// Output file; the matrix goes to stdout if not specified
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Sample columns multiplied per chunk
    #[arg(long, default_value_t = DEFAULT_CHUNK_COLUMNS)]
    pub chunk_columns: usize,

    /// Relative singular value cutoff for REST pseudo-inverses
    #[arg(long, default_value_t = DEFAULT_PINV_TOLERANCE)]
    pub pinv_tolerance: f64,
}

pub fn run(args: ApplyArgs, format: OutputFormat, verbose: bool) -> anyhow::Result<()> {
    if args.chunk_columns == 0 {
        bail!("--chunk-columns must be at least 1");
    }
    if !(args.pinv_tolerance.is_finite() && args.pinv_tolerance >= 0.0) {
        bail!("--pinv-tolerance must be a non-negative number");
    }

    let target = target_scheme(args.scheme, args.channel.as_deref(), args.lead_field.as_deref())?;

    let parsed = parse_matrix_file(&args.input)?;
    let current = match &args.current {
        Some(state) => state
            .parse::<ReferenceState>()
            .map_err(|e| anyhow::anyhow!("Invalid --current: {e}"))?,
        None => parsed.state_or_unknown(),
    };

    if verbose {
        eprintln!(
            "Read {}x{} matrix from {} (current reference: {current})",
            parsed.data.nrows(),
            parsed.data.ncols(),
            args.input.display()
        );
    }

    let library_config = LibraryConfig {
        pinv_tolerance: args.pinv_tolerance,
        ..LibraryConfig::default()
    };
    let library = load_library(
        args.layout.as_deref(),
        args.operators.as_deref(),
        &library_config,
    )?;
    let engine = ReferenceEngine::with_config(
        &library,
        EngineConfig {
            chunk_columns: args.chunk_columns,
            pinv_tolerance: args.pinv_tolerance,
        },
    );

    let (labels, data, state, action) = if let Some(labels) = parsed.labels {
        let recording = Recording::new(labels, parsed.data)?.with_state(current);
        let out = engine.apply(&recording, &target)?;
        let (labels, data, state) = out.recording.into_parts();
        (Some(labels), data, state, out.action)
    } else {
        let out = engine.apply_matrix(&parsed.data, &current, &target)?;
        (None, out.data, out.state, out.action)
    };

    let report_to_stderr = args.output.is_none();
    match &args.output {
        Some(path) => write_matrix_file(path, labels.as_deref(), &data, Some(&state))?,
        None => print!(
            "{}",
            format_matrix_text(labels.as_deref(), &data, Some(&state), '\t')?
        ),
    }

    let report = match format {
        OutputFormat::Text => format!(
            "Action:    {action}\nReference: {state}\nChannels:  {}\nSamples:   {}",
            data.nrows(),
            data.ncols()
        ),
        OutputFormat::Json => serde_json::to_string_pretty(&serde_json::json!({
            "action": action,
            "reference": state.to_string(),
            "state": state,
            "channels": data.nrows(),
            "samples": data.ncols(),
            "output": args.output.as_ref().map(|p| p.display().to_string()),
        }))?,
        OutputFormat::Tsv => format!(
            "action\treference\tchannels\tsamples\n{action}\t{state}\t{}\t{}",
            data.nrows(),
            data.ncols()
        ),
    };

    if report_to_stderr {
        eprintln!("{report}");
    } else {
        println!("{report}");
    }

    Ok(())
}
