use std::path::PathBuf;

use anyhow::bail;
use clap::{Args, Subcommand};

use crate::cli::{load_library, target_scheme, OutputFormat, SchemeArg};
use crate::core::types::{ChannelRef, TargetScheme};
use crate::operators::builder::{self, DEFAULT_PINV_TOLERANCE};
use crate::operators::library::{LibraryConfig, OperatorLibrary};
use crate::operators::operator::ReferenceOperator;

#[derive(Args)]
pub struct OperatorsArgs {
    #[command(subcommand)]
    pub command: OperatorsCommands,
}

#[derive(Subcommand)]
pub enum OperatorsCommands {
    /// List the library's operators
    List {
        /// Path to custom layout file
        #[arg(long)]
        layout: Option<PathBuf>,

        /// Path to an exported operator table
        #[arg(long)]
        operators: Option<PathBuf>,
    },

    /// Show one operator (library or derived)
    Show {
        /// Reference scheme
        #[arg(required = true, value_enum)]
        scheme: SchemeArg,

        /// Channel count for unipolar (defaults to the layout's)
        #[arg(long)]
        channels: Option<usize>,

        /// Reference channel for unipolar (label or 1-based index)
        #[arg(long)]
        channel: Option<String>,

        /// Lead-field matrix for subject-specific REST
        #[arg(long)]
        lead_field: Option<PathBuf>,

        /// Relative singular value cutoff for REST pseudo-inverses
        #[arg(long, default_value_t = DEFAULT_PINV_TOLERANCE)]
        pinv_tolerance: f64,

        /// Path to custom layout file
        #[arg(long)]
        layout: Option<PathBuf>,

        /// Path to an exported operator table
        #[arg(long)]
        operators: Option<PathBuf>,
    },

    /// Export the library's operator table as JSON
    Export {
        /// Output file path
        #[arg(required = true)]
        output: PathBuf,

        /// Path to custom layout file (defaults to embedded)
        #[arg(long)]
        layout: Option<PathBuf>,
    },
}

pub fn run(args: OperatorsArgs, format: OutputFormat, verbose: bool) -> anyhow::Result<()> {
    match args.command {
        OperatorsCommands::List { layout, operators } => {
            let library = load_library(
                layout.as_deref(),
                operators.as_deref(),
                &LibraryConfig::default(),
            )?;
            run_list(&library, format, verbose)
        }
        OperatorsCommands::Show {
            scheme,
            channels,
            channel,
            lead_field,
            pinv_tolerance,
            layout,
            operators,
        } => {
            let config = LibraryConfig {
                pinv_tolerance,
                ..LibraryConfig::default()
            };
            let library = load_library(layout.as_deref(), operators.as_deref(), &config)?;
            let target = target_scheme(scheme, channel.as_deref(), lead_field.as_deref())?;
            let operator = resolve_operator(&library, &target, channels, pinv_tolerance)?;
            run_show(&operator, format)
        }
        OperatorsCommands::Export { output, layout } => run_export(output, layout),
    }
}

fn resolve_operator(
    library: &OperatorLibrary,
    target: &TargetScheme,
    channels: Option<usize>,
    pinv_tolerance: f64,
) -> anyhow::Result<ReferenceOperator> {
    if channels.is_some() && !matches!(target, TargetScheme::Unipolar(_)) {
        bail!("--channels only applies to --scheme unipolar");
    }

    let operator = match target {
        TargetScheme::Unipolar(refs) => {
            let n = channels.unwrap_or_else(|| library.channel_count());
            let index = match refs.as_slice() {
                [ChannelRef::Index(index)] => *index,
                [ChannelRef::Label(label)] => library
                    .labels()
                    .iter()
                    .position(|l| l == label)
                    .map(|i| i + 1)
                    .ok_or_else(|| {
                        anyhow::anyhow!("Channel '{label}' is not in the '{}' layout", library.layout_name())
                    })?,
                _ => bail!("Exactly one reference channel is needed"),
            };
            builder::unipolar(n, &[index])?
        }
        TargetScheme::Rest(lead_field) => {
            builder::rest(lead_field.matrix(), lead_field.channel_count(), pinv_tolerance)?
        }
        _ => {
            let Some(scheme) = target.library_scheme() else {
                bail!("Unsupported scheme");
            };
            library.operator(scheme)?.clone()
        }
    };
    Ok(operator)
}

fn run_list(library: &OperatorLibrary, format: OutputFormat, verbose: bool) -> anyhow::Result<()> {
    if verbose {
        eprintln!(
            "Loaded operator library for layout '{}' ({} channels)",
            library.layout_name(),
            library.channel_count()
        );
    }

    let mut rows = Vec::new();
    for scheme in library.schemes() {
        let operator = library.operator(scheme)?;
        rows.push((scheme, operator));
    }

    match format {
        OutputFormat::Text => {
            let name_width = rows
                .iter()
                .map(|(scheme, _)| scheme.to_string().len())
                .max()
                .unwrap_or(6)
                .max(6);

            println!(
                "Operator Library '{}' ({} channels, {} operators)\n",
                library.layout_name(),
                library.channel_count(),
                rows.len()
            );
            println!(
                "{:<name_w$} {:>8} {:>10} {:>14}",
                "Scheme",
                "Channels",
                "Provenance",
                "Common mode",
                name_w = name_width
            );
            println!("{}", "-".repeat(name_width + 8 + 10 + 14 + 3));
            for (scheme, operator) in &rows {
                println!(
                    "{:<name_w$} {:>8} {:>10} {:>14.3e}",
                    scheme.to_string(),
                    operator.channel_count(),
                    operator.provenance().to_string(),
                    operator.common_mode_residual(),
                    name_w = name_width
                );
            }
        }
        OutputFormat::Json => {
            let output: Vec<serde_json::Value> = rows
                .iter()
                .map(|(scheme, operator)| {
                    serde_json::json!({
                        "scheme": scheme.to_string(),
                        "channel_count": operator.channel_count(),
                        "provenance": operator.provenance(),
                        "common_mode_residual": operator.common_mode_residual(),
                    })
                })
                .collect();
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
        OutputFormat::Tsv => {
            println!("scheme\tchannel_count\tprovenance\tcommon_mode_residual");
            for (scheme, operator) in &rows {
                println!(
                    "{}\t{}\t{}\t{:e}",
                    scheme,
                    operator.channel_count(),
                    operator.provenance(),
                    operator.common_mode_residual()
                );
            }
        }
    }

    Ok(())
}

fn run_show(operator: &ReferenceOperator, format: OutputFormat) -> anyhow::Result<()> {
    let n = operator.channel_count();

    match format {
        OutputFormat::Text => {
            println!("Operator: {}\n", operator.name());
            println!("Provenance:  {}", operator.provenance());
            println!("Size:        {n}x{n}");
            println!("Common mode: {:.3e}", operator.common_mode_residual());

            let shown = n.min(8);
            println!("\nTop-left {shown}x{shown} block:");
            for row in operator.matrix().rows(0, shown).row_iter() {
                let cells: Vec<String> = row
                    .iter()
                    .take(shown)
                    .map(|v| format!("{v:>8.4}"))
                    .collect();
                println!("{}", cells.join(" "));
            }
            if n > shown {
                println!("\n... {} more rows (use --format tsv for the full matrix)", n - shown);
            }
        }
        OutputFormat::Json => {
            let rows: Vec<Vec<f64>> = operator
                .matrix()
                .row_iter()
                .map(|row| row.iter().copied().collect())
                .collect();
            let output = serde_json::json!({
                "name": operator.name(),
                "provenance": operator.provenance(),
                "channel_count": n,
                "common_mode_residual": operator.common_mode_residual(),
                "rows": rows,
            });
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
        OutputFormat::Tsv => {
            for row in operator.matrix().row_iter() {
                let cells: Vec<String> = row.iter().map(f64::to_string).collect();
                println!("{}", cells.join("\t"));
            }
        }
    }

    Ok(())
}

fn run_export(output: PathBuf, layout: Option<PathBuf>) -> anyhow::Result<()> {
    let library = load_library(layout.as_deref(), None, &LibraryConfig::default())?;

    let json = library.to_json()?;
    std::fs::write(&output, json)?;

    println!(
        "Exported {} operators to {}",
        library.schemes().count(),
        output.display()
    );

    Ok(())
}
