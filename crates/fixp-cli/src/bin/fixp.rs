//! fixp CLI binary: runs the float-to-fixed conversion pass over a
//! serialized module.
//!
//! # Usage
//!
//! ```bash
//! # Convert a module in place of its float arithmetic
//! fixp convert input.json -o output.json
//!
//! # Also emit per-instruction conversion records and statistics
//! fixp convert input.json -o output.json --annotation-file conv.txt --stats
//!
//! # Inspect a module
//! fixp print input.json
//! ```

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Args, Parser, Subcommand};
use console::style;
use tracing_subscriber::EnvFilter;

use fixp_cli::{load_module, save_module, write_annotation_file};
use fixp_conv::{FloatToFixed, PassInfo};

#[derive(Parser)]
#[command(
    name = "fixp",
    version = env!("CARGO_PKG_VERSION"),
    about = "Floating point to fixed point conversion for annotated IR modules"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Suppress non-error output
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    quiet: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the conversion pass over a module
    Convert(ConvertArgs),

    /// Pretty-print a serialized module
    Print(PrintArgs),
}

#[derive(Args)]
struct ConvertArgs {
    /// Input module (JSON)
    input: PathBuf,

    /// Output path for the converted module
    #[arg(short, long)]
    output: PathBuf,

    /// Write one diagnostic line per converted instruction to this file
    #[arg(long)]
    annotation_file: Option<PathBuf>,

    /// Print conversion statistics
    #[arg(long)]
    stats: bool,
}

#[derive(Args)]
struct PrintArgs {
    /// Input module (JSON)
    input: PathBuf,
}

fn init_tracing(verbose: bool, quiet: bool) {
    let default = if verbose {
        "debug"
    } else if quiet {
        "error"
    } else {
        "info"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn run(cli: Cli) -> fixp_core::Result<()> {
    match cli.command {
        Commands::Convert(args) => {
            let info: PassInfo = fixp_conv::pass::PASS_INFO;
            tracing::debug!(
                "running pass '{}' (cfg-only: {}, preserves-all: {}, requires: {:?})",
                info.name,
                info.cfg_only,
                info.preserves_all,
                info.required_analyses
            );

            let mut module = load_module(&args.input)?;
            let outcome = FloatToFixed::new(&mut module).run();
            save_module(&args.output, &module)?;

            if let Some(path) = &args.annotation_file {
                write_annotation_file(path, &outcome.records)?;
            }
            if args.stats {
                println!("{}", outcome.stats);
            }
            eprintln!(
                "{} converted {} of {} annotated values",
                style("fixp:").green().bold(),
                outcome.records.len(),
                outcome.stats.metadata_count
            );
            Ok(())
        }
        Commands::Print(args) => {
            let module = load_module(&args.input)?;
            print!("{}", module);
            Ok(())
        }
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.quiet);
    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("{} {}", style("error:").red().bold(), err);
            ExitCode::FAILURE
        }
    }
}
