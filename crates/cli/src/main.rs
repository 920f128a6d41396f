//! Rubric CLI - Main Entry Point
//!
//! Grades a running web application against a rubric of black-box
//! scenarios and prints a weighted score.
//!
//! Exit status: 0 when every point was earned, 1 when points were missed
//! (including an application that never became ready), 2 when grading could
//! not run (store unreachable, invalid catalog).

use clap::{Parser, Subcommand};

mod commands;
mod output;

use commands::{list, run};

/// Rubric - black-box grading for web applications
#[derive(Parser)]
#[command(name = "rubric")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Output format
    #[arg(long, default_value = "table", global = true)]
    format: output::OutputFormat,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Grade the application
    Run(run::RunArgs),

    /// List the scenarios of a catalog
    List(list::ListArgs),

    /// Show version information
    Version,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let log_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level)),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let result = match cli.command {
        Commands::Run(args) => run::execute(args, cli.format).await,
        Commands::List(args) => list::execute(args, cli.format).map(|()| 0),
        Commands::Version => {
            println!("rubric v{}", rubric_common::VERSION);
            Ok(0)
        }
    };

    match result {
        Ok(0) => Ok(()),
        Ok(code) => std::process::exit(code),
        Err(e) => {
            output::print_error(&format!("{:#}", e));
            std::process::exit(2);
        }
    }
}
