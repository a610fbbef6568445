//! `patchloop`: drive a text generator through a code repair session.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use serde::Serialize;

use patchloop::core::parser::parse;
use patchloop::core::patch_apply::{Loaded, PatchOptions, apply};
use patchloop::core::types::DoneReason;
use patchloop::exit_codes;
use patchloop::io::config::{SessionConfig, load_config, write_config};
use patchloop::io::file_store::{DirFileStore, FileStore};
use patchloop::io::generator::CommandGenerator;
use patchloop::logging;
use patchloop::session::Session;

/// Config file looked up in the working directory when `--config` is absent.
const DEFAULT_CONFIG_NAME: &str = "patchloop.toml";

#[derive(Parser)]
#[command(
    name = "patchloop",
    version,
    about = "Multi-turn code repair driven by an external text generator"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run a repair session against a working directory.
    Run {
        #[arg(long)]
        workdir: PathBuf,
        /// File holding the initial user prompt.
        #[arg(long)]
        prompt: PathBuf,
        /// Session config (defaults to `<workdir>/patchloop.toml` if present).
        #[arg(long)]
        config: Option<PathBuf>,
        #[arg(long)]
        max_turns: Option<u32>,
    },
    /// Parse one response file and print the structured turn as JSON.
    Parse { file: PathBuf },
    /// Apply a patch file to a working directory (dry run unless `--write`).
    Apply {
        #[arg(long)]
        workdir: PathBuf,
        #[arg(long)]
        patch: PathBuf,
        /// Persist the patched files.
        #[arg(long)]
        write: bool,
        /// Reject context and removal lines that do not match.
        #[arg(long)]
        strict: bool,
    },
    /// Write a config file with default settings.
    InitConfig {
        path: PathBuf,
        /// Overwrite an existing file.
        #[arg(short, long)]
        force: bool,
    },
}

#[derive(Serialize)]
struct RunSummary<'a> {
    session_id: &'a str,
    reason: DoneReason,
    turns: u32,
    files_written: &'a [String],
}

fn main() {
    logging::init();
    match run() {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("{err:#}");
            std::process::exit(exit_codes::ERROR);
        }
    }
}

fn run() -> Result<i32> {
    let cli = Cli::parse();
    match cli.command {
        Command::Run {
            workdir,
            prompt,
            config,
            max_turns,
        } => cmd_run(&workdir, &prompt, config.as_deref(), max_turns),
        Command::Parse { file } => cmd_parse(&file),
        Command::Apply {
            workdir,
            patch,
            write,
            strict,
        } => cmd_apply(&workdir, &patch, write, strict),
        Command::InitConfig { path, force } => cmd_init_config(&path, force),
    }
}

fn cmd_run(
    workdir: &Path,
    prompt_path: &Path,
    config_path: Option<&Path>,
    max_turns: Option<u32>,
) -> Result<i32> {
    if !workdir.is_dir() {
        bail!("working directory {} does not exist", workdir.display());
    }
    let config_path = config_path
        .map(Path::to_path_buf)
        .unwrap_or_else(|| workdir.join(DEFAULT_CONFIG_NAME));
    let mut config = load_config(&config_path)?;
    if let Some(max_turns) = max_turns {
        config.max_turns = max_turns;
        config.validate()?;
    }
    let prompt = fs::read_to_string(prompt_path)
        .with_context(|| format!("read {}", prompt_path.display()))?;

    let generator = CommandGenerator::from_config(&config.generator)?.with_workdir(workdir);
    let store = DirFileStore::new(workdir, config.max_file_bytes);
    let outcome = Session::new(generator, store, config).run(&prompt)?;

    let summary = RunSummary {
        session_id: &outcome.session_id,
        reason: outcome.reason,
        turns: outcome.turns,
        files_written: &outcome.files_written,
    };
    println!(
        "{}",
        serde_json::to_string_pretty(&summary).context("serialize summary")?
    );
    Ok(exit_codes::for_reason(outcome.reason))
}

fn cmd_parse(file: &Path) -> Result<i32> {
    let raw = fs::read_to_string(file).with_context(|| format!("read {}", file.display()))?;
    let turn = parse(&raw);
    println!(
        "{}",
        serde_json::to_string_pretty(&turn).context("serialize parsed turn")?
    );
    Ok(exit_codes::OK)
}

fn cmd_apply(workdir: &Path, patch_path: &Path, write: bool, strict: bool) -> Result<i32> {
    let patch_text = fs::read_to_string(patch_path)
        .with_context(|| format!("read {}", patch_path.display()))?;
    let store = DirFileStore::new(workdir, u64::MAX);
    let applied = apply(
        &patch_text,
        |path: &str| match store.read(path) {
            Ok(content) => Loaded::from(content),
            Err(err) => Loaded::Unreadable(format!("{err:#}")),
        },
        PatchOptions {
            strict_context: strict,
        },
    );
    let result = match applied {
        Ok(result) => result,
        Err(err) => {
            eprintln!("{}: {err}", err.kind());
            return Ok(exit_codes::ERROR);
        }
    };

    for warning in &result.warnings {
        eprintln!("warning: {warning}");
    }
    if write {
        for file in &result.files {
            store.write(&file.path, &file.content)?;
        }
        eprintln!("wrote {} file(s)", result.files.len());
    } else {
        println!("{}", result.rendered());
    }
    Ok(exit_codes::OK)
}

fn cmd_init_config(path: &Path, force: bool) -> Result<i32> {
    if path.exists() && !force {
        bail!("{} already exists (use --force to overwrite)", path.display());
    }
    write_config(path, &SessionConfig::default())?;
    Ok(exit_codes::OK)
}
