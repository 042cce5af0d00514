use std::path::PathBuf;

use clap::{Args, Subcommand};

use crate::cli::{load_layout, OutputFormat};

#[derive(Args)]
pub struct LayoutArgs {
    #[command(subcommand)]
    pub command: LayoutCommands,
}

#[derive(Subcommand)]
pub enum LayoutCommands {
    /// Show the channel layout
    Show {
        /// Path to custom layout file
        #[arg(long)]
        layout: Option<PathBuf>,

        /// Show all channels
        #[arg(long)]
        all_channels: bool,
    },

    /// Export the channel layout to a file
    Export {
        /// Output file path
        #[arg(required = true)]
        output: PathBuf,

        /// Path to custom layout file to export (defaults to embedded)
        #[arg(long)]
        layout: Option<PathBuf>,
    },
}

pub fn run(args: LayoutArgs, format: OutputFormat, verbose: bool) -> anyhow::Result<()> {
    match args.command {
        LayoutCommands::Show {
            layout,
            all_channels,
        } => run_show(layout, all_channels, format, verbose),
        LayoutCommands::Export { output, layout } => run_export(output, layout),
    }
}

fn run_show(
    layout_path: Option<PathBuf>,
    all_channels: bool,
    format: OutputFormat,
    verbose: bool,
) -> anyhow::Result<()> {
    let layout = load_layout(layout_path.as_deref())?;

    if verbose {
        eprintln!("Loaded layout '{}' v{}", layout.name, layout.version);
    }

    match format {
        OutputFormat::Text => {
            let (left, right, midline) = layout.hemisphere_counts();
            println!("Layout: {}\n", layout.name);
            if let Some(desc) = &layout.description {
                println!("Description: {desc}");
            }
            println!("Channels:    {}", layout.channel_count());
            println!("Hemispheres: {left} left, {right} right, {midline} midline");
            println!("Recording reference: {}", layout.recording_reference);
            println!(
                "Mastoids:    {} (left), {} (right)",
                layout.left_mastoid, layout.right_mastoid
            );
            if !layout.non_signal.is_empty() {
                println!("Non-signal:  {}", layout.non_signal.join(", "));
            }

            let shown = if all_channels {
                &layout.channels[..]
            } else {
                &layout.channels[..layout.channels.len().min(20)]
            };

            println!("\n{:<8} {:<10} {:>8} {:>8} {:>8}", "Label", "Hemisphere", "x", "y", "z");
            println!("{}", "-".repeat(46));
            for channel in shown {
                let [x, y, z] = channel.position;
                println!(
                    "{:<8} {:<10} {:>8.4} {:>8.4} {:>8.4}",
                    channel.label,
                    channel.hemisphere.to_string(),
                    x,
                    y,
                    z
                );
            }

            if !all_channels && layout.channels.len() > 20 {
                println!(
                    "\n... and {} more channels (use --all-channels to show all)",
                    layout.channels.len() - 20
                );
            }
        }
        OutputFormat::Json => {
            println!("{}", layout.to_json()?);
        }
        OutputFormat::Tsv => {
            println!("label\themisphere\tx\ty\tz");
            for channel in &layout.channels {
                let [x, y, z] = channel.position;
                println!("{}\t{}\t{x}\t{y}\t{z}", channel.label, channel.hemisphere);
            }
        }
    }

    Ok(())
}

fn run_export(output: PathBuf, layout_path: Option<PathBuf>) -> anyhow::Result<()> {
    let layout = load_layout(layout_path.as_deref())?;

    let json = layout.to_json()?;
    std::fs::write(&output, json)?;

    println!(
        "Exported {} channels to {}",
        layout.channel_count(),
        output.display()
    );

    Ok(())
}
