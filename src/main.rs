use clap::Parser;
use tracing_subscriber::EnvFilter;

use eeg_reref::cli;

fn main() -> anyhow::Result<()> {
    let cli = cli::Cli::parse();

    // Initialize logging based on verbosity flag
    let filter = if cli.verbose {
        EnvFilter::new("eeg_reref=debug,info")
    } else {
        EnvFilter::new("eeg_reref=warn")
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .without_time()
        .init();

    match cli.command {
        cli::Commands::Apply(args) => {
            cli::apply::run(args, cli.format, cli.verbose)?;
        }
        cli::Commands::Operators(args) => {
            cli::operators::run(args, cli.format, cli.verbose)?;
        }
        cli::Commands::Layout(args) => {
            cli::layout::run(args, cli.format, cli.verbose)?;
        }
    }

    Ok(())
}
