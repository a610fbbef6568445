mod cli;
mod manifest;
mod report;
mod results;
mod run;

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "batch", version, about = "Run many patchloop repair tasks")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run every task in a manifest.
    Run {
        manifest: PathBuf,
        /// Tasks executed concurrently.
        #[arg(long, default_value_t = 1)]
        jobs: usize,
        /// Results directory.
        #[arg(long, default_value = "batch-results")]
        out: PathBuf,
    },
    /// Summarize the results of one batch run.
    Report { results_dir: PathBuf },
}

fn main() -> Result<()> {
    patchloop::logging::init();
    let cli = Cli::parse();
    match cli.command {
        Command::Run {
            manifest,
            jobs,
            out,
        } => cli::run_manifest(&manifest, jobs, &out),
        Command::Report { results_dir } => cli::report_results(&results_dir),
    }
}
