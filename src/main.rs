//! Aggcombine CLI - combine wide per-year extracts into long-format files
//!
//! # Main Commands
//!
//! ```bash
//! aggcombine run [ROOT]             # Combine and publish every pending partition
//! aggcombine status [ROOT]          # Show the publisher state per output partition
//! ```
//!
//! # Debug Commands (for development)
//!
//! ```bash
//! aggcombine catalog [ROOT] --json  # Build and print the input manifest
//! aggcombine melt input.csv.gz      # Melt one wide file to long CSV
//! ```
//!
//! The data root defaults to `output`, overridable with the
//! `AGGCOMBINE_ROOT` environment variable (a `.env` file is honored) or a
//! positional argument. Diagnostics go to stderr, controlled by `RUST_LOG`.

use clap::{Parser, Subcommand};
use std::env;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

use aggcombine::{
    catalog, partition_states, run, Aggregation, AggregationFilter, PartitionState, RunOptions,
    WideFile,
};

/// Environment variable naming the default data root.
const ROOT_ENV_VAR: &str = "AGGCOMBINE_ROOT";

#[derive(Parser)]
#[command(name = "aggcombine")]
#[command(about = "Combine wide per-year aggregation extracts into long-format files", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the full combine pipeline
    Run {
        /// Data root containing the aggregated/ tree
        root: Option<PathBuf>,

        /// Only combine this geography
        #[arg(short, long)]
        geography: Option<String>,

        /// Only combine this measure
        #[arg(short, long)]
        measure: Option<String>,

        /// Hide progress bars
        #[arg(short, long)]
        quiet: bool,
    },

    /// Build and print the input manifest
    Catalog {
        /// Data root containing the aggregated/ tree
        root: Option<PathBuf>,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show the publisher state of every output partition
    Status {
        /// Data root containing the aggregated/ tree
        root: Option<PathBuf>,
    },

    /// Melt one wide file to long CSV
    Melt {
        /// Input wide file (.csv or .csv.gz)
        input: PathBuf,

        /// Restrict to one aggregation kind (min, max or mean)
        #[arg(short, long)]
        aggregation: Option<Aggregation>,

        /// Output file (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

fn main() {
    // Load .env file (if present)
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Run {
            root,
            geography,
            measure,
            quiet,
        } => cmd_run(&resolve_root(root), geography, measure, quiet),

        Commands::Catalog { root, json } => cmd_catalog(&resolve_root(root), json),

        Commands::Status { root } => cmd_status(&resolve_root(root)),

        Commands::Melt {
            input,
            aggregation,
            output,
        } => cmd_melt(&input, aggregation, output.as_deref()),
    };

    if let Err(e) = result {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

/// Positional root, else `AGGCOMBINE_ROOT`, else `output`.
fn resolve_root(root: Option<PathBuf>) -> PathBuf {
    root.or_else(|| env::var(ROOT_ENV_VAR).ok().map(PathBuf::from))
        .unwrap_or_else(|| PathBuf::from("output"))
}

fn cmd_run(
    root: &Path,
    geography: Option<String>,
    measure: Option<String>,
    quiet: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    eprintln!("Combining extracts under: {}", root.display());

    let options = RunOptions {
        geography,
        measure,
        quiet,
    };
    let stats = run(root, &options)?;

    eprintln!("Partitions: {}", stats.partitions);
    eprintln!("  Published: {} ({} rows)", stats.published, stats.rows_written);
    eprintln!("  Skipped:   {}", stats.skipped);
    if stats.failed > 0 {
        eprintln!("  Failed:    {}", stats.failed);
        return Err(format!("{} partitions failed; re-run to retry", stats.failed).into());
    }

    Ok(())
}

fn cmd_catalog(root: &Path, json: bool) -> Result<(), Box<dyn std::error::Error>> {
    let manifest = catalog::scan(root)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&manifest)?);
        return Ok(());
    }

    for entry in manifest.iter() {
        println!(
            "{}/{} {}  {}",
            entry.key.geography,
            entry.key.measure,
            entry.key.year,
            entry.path.display()
        );
    }
    eprintln!("{} finished input files", manifest.len());

    Ok(())
}

fn cmd_status(root: &Path) -> Result<(), Box<dyn std::error::Error>> {
    let states = partition_states(root)?;

    let mut done = 0;
    for (key, state) in &states {
        println!("{:<10} {}", state.as_str(), key);
        if *state == PartitionState::Done {
            done += 1;
        }
    }
    eprintln!("{}/{} partitions published", done, states.len());

    Ok(())
}

fn cmd_melt(
    input: &Path,
    aggregation: Option<Aggregation>,
    output: Option<&Path>,
) -> Result<(), Box<dyn std::error::Error>> {
    eprintln!("Melting: {}", input.display());

    let wide = WideFile::read(input)?;
    eprintln!(
        "  {} rows, {} value columns, id column '{}'",
        wide.row_count(),
        wide.value_columns().len(),
        wide.id_column()
    );

    let writer: Box<dyn Write> = match output {
        Some(path) => Box::new(fs::File::create(path)?),
        None => Box::new(std::io::stdout()),
    };
    let mut csv_writer = csv::Writer::from_writer(writer);

    match aggregation {
        Some(kind) => {
            csv_writer.write_record([wide.id_column(), "date", "value"])?;
            for row in wide.melt(AggregationFilter::Only(kind)) {
                csv_writer.write_record([row.id, row.date.to_string().as_str(), row.value])?;
            }
        }
        None => {
            csv_writer.write_record([wide.id_column(), "aggregation", "date", "value"])?;
            for row in wide.melt(AggregationFilter::All) {
                csv_writer.write_record([
                    row.id,
                    row.aggregation.as_str(),
                    row.date.to_string().as_str(),
                    row.value,
                ])?;
            }
        }
    }
    csv_writer.flush()?;

    if let Some(path) = output {
        eprintln!("Output written to: {}", path.display());
    }

    Ok(())
}
