//! ami-kernel CLI: parse, resolve and run IBIS-AMI models.
//!
//! This is the main entry point for the ami-kernel tool.

mod config;
mod orchestrator;
mod output;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use lib_ibis::{parse_ami_path, parse_ibs_path, resolve, FsSource};
use lib_types::ami::Corner;
use rayon::prelude::*;
use std::path::{Path, PathBuf};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "ami-kernel")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Output format
    #[arg(short, long, default_value = "text")]
    format: OutputFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, Debug, Default, clap::ValueEnum)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

/// Corner selection for `resolve`.
#[derive(Clone, Copy, Debug, clap::ValueEnum)]
enum CornerArg {
    Typ,
    Min,
    Max,
    All,
}

#[derive(Subcommand)]
enum Commands {
    /// Parse and validate an IBIS file
    ParseIbis {
        /// Path to the .ibs file
        file: PathBuf,
    },

    /// Parse and validate an AMI file
    ParseAmi {
        /// Path to the .ami file
        file: PathBuf,
    },

    /// Resolve an AMI file's parameters at one or all corners
    Resolve {
        /// Path to the .ami file
        file: PathBuf,

        /// Corner to resolve
        #[arg(short, long, default_value = "typ")]
        corner: CornerArg,
    },

    /// Load a model and run Init (and GetWave) against it
    Run {
        /// Path to the run configuration file
        #[arg(short, long)]
        config: PathBuf,

        /// Directory for CSV and JSON result files
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = match cli.verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)))
        .init();

    match cli.command {
        Commands::ParseIbis { file } => parse_ibis(&file, cli.format)?,
        Commands::ParseAmi { file } => parse_ami(&file, cli.format)?,
        Commands::Resolve { file, corner } => resolve_ami(&file, corner, cli.format)?,
        Commands::Run { config, output } => run_model(&config, output.as_deref(), cli.format)?,
    }

    Ok(())
}

fn parse_ibis(file: &Path, format: OutputFormat) -> Result<()> {
    tracing::info!("Parsing IBIS file: {:?}", file);
    let ibis = parse_ibs_path(&FsSource, file)?;
    print!("{}", output::render_ibis(&ibis, format)?);
    Ok(())
}

fn parse_ami(file: &Path, format: OutputFormat) -> Result<()> {
    tracing::info!("Parsing AMI file: {:?}", file);
    let ami = parse_ami_path(&FsSource, file)?;
    print!("{}", output::render_ami(&ami, format)?);
    Ok(())
}

fn resolve_ami(file: &Path, corner: CornerArg, format: OutputFormat) -> Result<()> {
    let ami = parse_ami_path(&FsSource, file)?;
    let results: Vec<_> = match corner {
        CornerArg::All => Corner::ALL
            .par_iter()
            .map(|&c| (c, resolve(&ami.tree, c)))
            .collect(),
        CornerArg::Typ => vec![(Corner::Typ, resolve(&ami.tree, Corner::Typ))],
        CornerArg::Min => vec![(Corner::Min, resolve(&ami.tree, Corner::Min))],
        CornerArg::Max => vec![(Corner::Max, resolve(&ami.tree, Corner::Max))],
    };
    print!("{}", output::render_resolved(&results, format)?);

    if let Some((c, Err(e))) = results.iter().find(|(_, r)| r.is_err()) {
        anyhow::bail!("Resolution failed at corner {c}: {e}");
    }
    Ok(())
}

fn run_model(config_path: &Path, output_dir: Option<&Path>, format: OutputFormat) -> Result<()> {
    tracing::info!("Loading configuration from {:?}", config_path);

    let config = config::load_config(config_path)?;
    let orchestrator = orchestrator::Orchestrator::new(config);
    let results = orchestrator.run()?;

    print!("{}", output::render_results(&results, format)?);
    if let Some(dir) = output_dir {
        output::write_results(&results, dir)
            .with_context(|| format!("Failed to write results to {:?}", dir))?;
        tracing::info!("Results written to {:?}", dir);
    }
    Ok(())
}
