//! `spine` – command line front end of the intent-to-execution pipeline.
//!
//! ```text
//! spine run job.intent            # parse, authorize, issue, execute, archive
//! spine check job.intent          # parse and authorize only
//! spine hash job.intent           # canonical SHA-256 of the intent
//! spine render job.intent         # canonical source form
//! spine schema                    # JSON Schema of the intent AST
//! spine ledger verify             # re-check every archived hash chain
//! spine ledger export             # archived events as JSON
//! spine config show | init        # inspect or write ~/.spine/config.toml
//! ```
//!
//! `-` as a file name reads the intent from stdin.

mod config;

use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use colored::Colorize;
use spine_kernel::AuthorizationEngine;
use spine_lang::{Intent, intent_hash, intent_schema, parse, render};
use spine_ledger::{EventLog, LedgerArchive, verify_events};
use spine_runtime::{Pipeline, Submission, init_tracing};
use spine_types::SpineError;
use tracing::{debug, info};

use crate::config::Config;

type CliResult<T> = Result<T, String>;

#[derive(Parser, Debug)]
#[command(name = "spine", version, about = "Intent-to-execution pipeline")]
struct Cli {
    /// Config file (default `~/.spine/config.toml`).
    #[arg(long, value_name = "PATH", global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run an intent through the whole pipeline and archive its events.
    Run {
        /// Intent source file, or `-` for stdin.
        file: PathBuf,
        /// Print the execution result as JSON.
        #[arg(long)]
        json: bool,
    },
    /// Parse and authorize an intent without issuing contracts.
    Check { file: PathBuf },
    /// Print the canonical SHA-256 hash of an intent.
    Hash { file: PathBuf },
    /// Print an intent in canonical source form.
    Render { file: PathBuf },
    /// Print the JSON Schema of the intent AST.
    Schema,
    /// Inspect the archived ledger.
    Ledger {
        #[command(subcommand)]
        command: LedgerCommand,
    },
    /// Inspect or create the config file.
    Config {
        #[command(subcommand)]
        command: ConfigCommand,
    },
}

#[derive(Subcommand, Debug)]
enum LedgerCommand {
    /// Verify every hash chain, or only that of `--contract`.
    Verify {
        #[arg(long, value_name = "ID")]
        contract: Option<String>,
    },
    /// Print archived events as pretty JSON.
    Export {
        #[arg(long, value_name = "ID")]
        contract: Option<String>,
    },
}

#[derive(Subcommand, Debug)]
enum ConfigCommand {
    /// Print the effective configuration.
    Show,
    /// Write a default config file unless one exists.
    Init,
}

fn main() -> ExitCode {
    let _guard = init_tracing("spine");
    let cli = Cli::parse();
    match dispatch(cli) {
        Ok(code) => code,
        Err(message) => {
            eprintln!("{} {}", "error:".red().bold(), message);
            ExitCode::FAILURE
        }
    }
}

fn dispatch(cli: Cli) -> CliResult<ExitCode> {
    let config_file = cli.config.clone().unwrap_or_else(config::config_path);
    match cli.command {
        Command::Run { file, json } => {
            let cfg = config::load(&config_file)?;
            command_run(&cfg, &read_source(&file)?, json)
        }
        Command::Check { file } => {
            let cfg = config::load(&config_file)?;
            command_check(&cfg, &read_source(&file)?)
        }
        Command::Hash { file } => {
            let intent = parse_source(&read_source(&file)?)?;
            println!("{}", intent_hash(&intent).map_err(|e| e.to_string())?);
            Ok(ExitCode::SUCCESS)
        }
        Command::Render { file } => {
            print!("{}", render(&parse_source(&read_source(&file)?)?));
            Ok(ExitCode::SUCCESS)
        }
        Command::Schema => {
            let schema = serde_json::to_string_pretty(&intent_schema())
                .map_err(|e| format!("Failed to serialize schema: {e}"))?;
            println!("{schema}");
            Ok(ExitCode::SUCCESS)
        }
        Command::Ledger { command } => {
            let cfg = config::load(&config_file)?;
            command_ledger(&cfg, command)
        }
        Command::Config { command } => command_config(&config_file, command),
    }
}

fn read_source(path: &Path) -> CliResult<String> {
    if path == Path::new("-") {
        let mut source = String::new();
        std::io::stdin()
            .read_to_string(&mut source)
            .map_err(|e| format!("Failed to read stdin: {e}"))?;
        return Ok(source);
    }
    std::fs::read_to_string(path).map_err(|e| format!("Failed to read {}: {e}", path.display()))
}

fn parse_source(source: &str) -> CliResult<Intent> {
    parse(source).map_err(|e| format!("parse error at {e}"))
}

/// Open the archive at `path`, creating its directory if needed.
fn open_archive(path: &Path) -> CliResult<LedgerArchive> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent)
            .map_err(|e| format!("Failed to create {}: {e}", parent.display()))?;
    }
    LedgerArchive::open(path).map_err(|e| format!("Failed to open ledger {}: {e}", path.display()))
}

/// Submit `source` against the ledger archived in `cfg.ledger_path`, then
/// archive every new event, including failure events.
///
/// Returns the submission outcome and the number of newly archived events.
fn submit_archived(
    cfg: &Config,
    source: &str,
) -> CliResult<(Result<Submission, SpineError>, usize)> {
    let archive = open_archive(&cfg.ledger_path)?;
    let history = archive.load_all().map_err(|e| e.to_string())?;
    debug!(events = history.len(), path = %cfg.ledger_path.display(), "ledger restored");
    let ledger = EventLog::restore(history).map_err(|e| format!("archived ledger rejected: {e}"))?;

    let pipeline = Pipeline::with_ledger(&cfg.pipeline(), Arc::new(ledger));
    let outcome = pipeline.submit(source);
    let persisted = archive
        .persist(&pipeline.ledger().export())
        .map_err(|e| format!("Failed to archive events: {e}"))?;
    info!(persisted, "ledger archived");
    Ok((outcome, persisted))
}

/// Prefix for a failed submission; non-fatal errors need an edited resubmit.
fn failure_label(e: &SpineError) -> &'static str {
    if e.is_fatal() { "failed:" } else { "rejected (fix and resubmit):" }
}

fn command_run(cfg: &Config, source: &str, json: bool) -> CliResult<ExitCode> {
    let (outcome, persisted) = submit_archived(cfg, source)?;
    let submission = match outcome {
        Ok(submission) => submission,
        Err(e) => {
            eprintln!("{} {} ({})", failure_label(&e).red().bold(), e, e.kind());
            eprintln!("  {} event(s) archived", persisted);
            return Ok(ExitCode::FAILURE);
        }
    };

    if json {
        let out = serde_json::to_string_pretty(&submission.result)
            .map_err(|e| format!("Failed to serialize result: {e}"))?;
        println!("{out}");
        return Ok(ExitCode::SUCCESS);
    }

    let result = &submission.result;
    println!("{} {}", "✓".green().bold(), submission.intent.name().bold());
    println!("  contract   {}", submission.bundle.anchor_id());
    println!("  cluster    {}", result.cluster_type.to_string().cyan());
    let capabilities: Vec<&str> = submission
        .capabilities
        .iter()
        .map(|c| c.name.as_str())
        .collect();
    println!("  resolved   {}", capabilities.join(", "));
    println!(
        "  deadline   {}s",
        submission.bundle.temporal.deadline_seconds
    );
    println!("  proof      {}", result.proof_token().dimmed());
    for warning in &submission.authorization.warnings {
        println!("  {} {}", "warning:".yellow(), warning);
    }
    for warning in &submission.sequence_warnings {
        println!("  {} {}", "sequence:".yellow(), warning);
    }
    println!("  {} event(s) archived to {}", persisted, cfg.ledger_path.display());
    Ok(ExitCode::SUCCESS)
}

fn command_check(cfg: &Config, source: &str) -> CliResult<ExitCode> {
    let intent = parse_source(source)?;
    let engine = AuthorizationEngine::new(cfg.pipeline().policy());
    println!("{} {}", "intent".bold(), intent.name());
    println!("  hash  {}", intent_hash(&intent).map_err(|e| e.to_string())?);
    match engine.authorize(&intent) {
        Ok(result) => {
            println!("  {} {}", "authorized".green().bold(), result.reason);
            for warning in &result.warnings {
                println!("  {} {}", "warning:".yellow(), warning);
            }
            Ok(ExitCode::SUCCESS)
        }
        Err(SpineError::AuthorizationDenied { violations, .. }) => {
            println!("  {}", "denied".red().bold());
            for violation in &violations {
                println!("  - {violation}");
            }
            Ok(ExitCode::FAILURE)
        }
        Err(e) => Err(e.to_string()),
    }
}

fn command_ledger(cfg: &Config, command: LedgerCommand) -> CliResult<ExitCode> {
    let archive = open_archive(&cfg.ledger_path)?;
    let load = |contract: &Option<String>| match contract {
        Some(id) => archive.load_contract(id),
        None => archive.load_all(),
    };
    match command {
        LedgerCommand::Verify { contract } => {
            let events = load(&contract).map_err(|e| e.to_string())?;
            match verify_events(&events) {
                Ok(()) => {
                    println!(
                        "{} {} event(s) verified",
                        "✓".green().bold(),
                        events.len()
                    );
                    Ok(ExitCode::SUCCESS)
                }
                Err(e) => {
                    println!("{} {}", "✗".red().bold(), e);
                    Ok(ExitCode::FAILURE)
                }
            }
        }
        LedgerCommand::Export { contract } => {
            let events = load(&contract).map_err(|e| e.to_string())?;
            let out = serde_json::to_string_pretty(&events)
                .map_err(|e| format!("Failed to serialize events: {e}"))?;
            println!("{out}");
            Ok(ExitCode::SUCCESS)
        }
    }
}

fn command_config(path: &Path, command: ConfigCommand) -> CliResult<ExitCode> {
    match command {
        ConfigCommand::Show => {
            let cfg = config::load(path)?;
            println!("{} {}", "config".bold(), path.display().to_string().dimmed());
            let raw = toml::to_string_pretty(&cfg)
                .map_err(|e| format!("Failed to serialize config: {e}"))?;
            print!("{raw}");
        }
        ConfigCommand::Init => {
            if path.exists() {
                println!("{} already exists", path.display());
            } else {
                config::save_to(&Config::default(), path)?;
                println!("{} wrote {}", "✓".green().bold(), path.display());
            }
        }
    }
    Ok(ExitCode::SUCCESS)
}
