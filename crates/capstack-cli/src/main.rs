mod commands;
mod input;
mod output;

use clap::{Parser, Subcommand, ValueEnum};
use colored::Colorize;
use std::process;

use commands::waterfall::{AllocateArgs, BacksolveArgs, BreakpointsArgs};

/// Equity waterfall and OPM valuation for private-company cap tables
#[derive(Parser)]
#[command(
    name = "capstack",
    version,
    about = "Cap-table waterfall breakpoints, OPM allocation, and backsolve",
    long_about = "Derives the breakpoint structure of a capital-structure waterfall \
                  with decimal precision, allocates equity value across it under the \
                  option pricing model, and backsolves equity value or implied \
                  volatility from an observed share price."
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Output format
    #[arg(long, default_value = "json", global = true)]
    output: OutputFormat,
}

#[derive(Subcommand)]
enum Commands {
    /// Derive waterfall breakpoints from a cap table
    Breakpoints(BreakpointsArgs),
    /// Allocate an equity value across the waterfall (OPM)
    Allocate(AllocateArgs),
    /// Backsolve equity value or volatility from an observed share price
    Backsolve(BacksolveArgs),
    /// Print version information
    Version,
}

#[derive(Debug, Clone, ValueEnum)]
pub enum OutputFormat {
    Json,
    Table,
    Csv,
    Minimal,
}

fn main() {
    let cli = Cli::parse();

    let result: Result<serde_json::Value, Box<dyn std::error::Error>> = match cli.command {
        Commands::Breakpoints(args) => commands::waterfall::run_breakpoints(args),
        Commands::Allocate(args) => commands::waterfall::run_allocate(args),
        Commands::Backsolve(args) => commands::waterfall::run_backsolve(args),
        Commands::Version => {
            println!("capstack {}", env!("CARGO_PKG_VERSION"));
            return;
        }
    };

    match result {
        Ok(value) => {
            output::format_output(&cli.output, &value);
            process::exit(0);
        }
        Err(e) => {
            eprintln!("{}: {}", "error".red().bold(), e);
            process::exit(1);
        }
    }
}
