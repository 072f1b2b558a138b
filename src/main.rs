//! Tally - answer statistics for interactive explorations
//!
//! CLI entry point with global panic handler.

use std::io::Write;
use std::path::Path;
use std::process::ExitCode;

use clap::{Parser, Subcommand, ValueEnum};
use tracing_subscriber::EnvFilter;

use tally::cli::event::{EventKind, EventOptions};
use tally::cli::open_file_service;
use tally::config::{tally_home, Config};
use tally::error::exit_codes;
use tally::stats::EventLocation;

// =============================================================================
// CLI Definition
// =============================================================================

/// Tally - answer statistics for interactive explorations
#[derive(Parser)]
#[command(name = "tally")]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// [Learner] Record an answer submitted in a state
    Record {
        /// Exploration ID
        exploration: String,
        /// Exploration version
        version: u32,
        /// State the answer was submitted in
        state: String,
        /// The answer (JSON, or plain text)
        answer: String,
        /// Learner session ID
        #[arg(long)]
        session_id: String,
        /// Seconds spent in the exploration so far
        #[arg(long)]
        time_spent: f64,
        /// Rule the answer was classified under
        #[arg(long, default_value = "Default")]
        rule: String,
        /// Parameter in name=value form (repeatable)
        #[arg(long = "param")]
        params: Vec<String>,
        /// Output as JSON
        #[arg(long, short)]
        json: bool,
        /// Suppress output
        #[arg(long, short)]
        quiet: bool,
    },

    /// [Learner] Log a playthrough event
    Event {
        /// Event kind
        #[arg(value_enum)]
        kind: EventArg,
        /// Exploration ID
        exploration: String,
        /// Exploration version
        version: u32,
        /// State the event happened in
        state: String,
        /// Learner session ID
        #[arg(long)]
        session_id: String,
        /// Seconds spent in the exploration so far (leave, complete)
        #[arg(long)]
        time_spent: Option<f64>,
        /// Output as JSON
        #[arg(long, short)]
        json: bool,
        /// Suppress output
        #[arg(long, short)]
        quiet: bool,
    },

    /// [Creator] Mark answers as resolved
    Resolve {
        /// Exploration ID
        exploration: String,
        /// State name
        state: String,
        /// Answers to resolve
        #[arg(required = true)]
        answers: Vec<String>,
        /// Rule to resolve in (defaults to the default rule)
        #[arg(long)]
        rule: Option<String>,
        /// Output as JSON
        #[arg(long, short)]
        json: bool,
        /// Suppress output
        #[arg(long, short)]
        quiet: bool,
    },

    /// [Creator] Show answer counts for a state
    Answers {
        /// Exploration ID
        exploration: String,
        /// State name
        state: String,
        /// Also count stored records for this version
        #[arg(long)]
        version: Option<u32>,
        /// Output as JSON
        #[arg(long, short)]
        json: bool,
        /// Suppress output
        #[arg(long, short)]
        quiet: bool,
    },

    /// [Creator] List states that need improvement
    Improvements {
        /// Exploration ID
        exploration: String,
        /// Exploration version
        version: u32,
        /// Fail when statistics cannot be read
        #[arg(long)]
        strict: bool,
        /// Output as JSON
        #[arg(long, short)]
        json: bool,
        /// Suppress output
        #[arg(long, short)]
        quiet: bool,
    },

    /// [Creator] Display the statistics report for an exploration
    Stats {
        /// Exploration ID
        exploration: String,
        /// Exploration version
        version: u32,
        /// Fail when statistics cannot be read
        #[arg(long)]
        strict: bool,
        /// Output as JSON
        #[arg(long, short)]
        json: bool,
        /// Suppress output
        #[arg(long, short)]
        quiet: bool,
    },
}

#[derive(Clone, ValueEnum)]
enum EventArg {
    Start,
    Hit,
    Leave,
    Complete,
}

impl From<EventArg> for EventKind {
    fn from(arg: EventArg) -> Self {
        match arg {
            EventArg::Start => EventKind::Start,
            EventArg::Hit => EventKind::Hit,
            EventArg::Leave => EventKind::Leave,
            EventArg::Complete => EventKind::Complete,
        }
    }
}

// =============================================================================
// Main Entry Point
// =============================================================================

fn main() -> ExitCode {
    setup_panic_handler();
    setup_logging();

    match run() {
        Ok(code) => code,
        Err(e) => {
            eprintln!("tally error: {}", e);
            ExitCode::from(exit_codes::ERROR as u8)
        }
    }
}

fn setup_logging() {
    let filter = EnvFilter::try_from_env("TALLY_LOG").unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

fn setup_panic_handler() {
    std::panic::set_hook(Box::new(|info| {
        eprintln!("tally panic: {}", info);

        if let Some(home) = tally_home() {
            let _ = std::fs::create_dir_all(&home);
            let crash_log = home.join("crash.log");
            if let Ok(mut file) = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(&crash_log)
            {
                let timestamp = chrono::Utc::now().format("%Y-%m-%d %H:%M:%S UTC");
                let _ = writeln!(file, "[{}] {}", timestamp, info);
            }
        }

        std::process::exit(exit_codes::CRASH);
    }));
}

fn run() -> Result<ExitCode, Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let cwd = std::env::current_dir()?;

    match cli.command {
        Commands::Record {
            exploration,
            version,
            state,
            answer,
            session_id,
            time_spent,
            rule,
            params,
            json,
            quiet,
        } => {
            let input = tally::cli::record::RecordInput {
                exploration_id: exploration,
                exploration_version: version,
                state_name: state,
                rule_str: rule,
                session_id,
                time_spent_in_sec: time_spent,
                params,
                answer,
            };
            run_record(&input, json, quiet, &cwd)
        }
        Commands::Event {
            kind,
            exploration,
            version,
            state,
            session_id,
            time_spent,
            json,
            quiet,
        } => {
            let options = EventOptions {
                json,
                quiet,
                time_spent_in_sec: time_spent,
            };
            let at = EventLocation::new(exploration, version, state);
            run_event(kind.into(), at, &session_id, &options, &cwd)
        }
        Commands::Resolve {
            exploration,
            state,
            answers,
            rule,
            json,
            quiet,
        } => run_resolve(&exploration, &state, &answers, rule, json, quiet, &cwd),
        Commands::Answers {
            exploration,
            state,
            version,
            json,
            quiet,
        } => run_answers(&exploration, &state, version, json, quiet, &cwd),
        Commands::Improvements {
            exploration,
            version,
            strict,
            json,
            quiet,
        } => run_improvements(&exploration, version, strict, json, quiet, &cwd),
        Commands::Stats {
            exploration,
            version,
            strict,
            json,
            quiet,
        } => run_stats(&exploration, version, strict, json, quiet, &cwd),
    }
}

// =============================================================================
// Command Implementations
// =============================================================================

fn success_to_exit_code(success: bool) -> ExitCode {
    if success {
        ExitCode::from(exit_codes::SUCCESS as u8)
    } else {
        ExitCode::from(exit_codes::ERROR as u8)
    }
}

fn print_formatted(formatted: &str) {
    if !formatted.is_empty() {
        println!("{}", formatted);
    }
}

fn run_record(
    input: &tally::cli::record::RecordInput,
    json: bool,
    quiet: bool,
    cwd: &Path,
) -> Result<ExitCode, Box<dyn std::error::Error>> {
    use tally::cli::record::{RecordCommand, RecordOptions};

    let service = open_file_service(cwd, Config::load_from_cwd(cwd))?;
    let cmd = RecordCommand::new(service);
    let options = RecordOptions { json, quiet };

    let output = cmd.run(input, &options);
    print_formatted(&cmd.format_output(&output, &options));

    if output.invalid {
        return Ok(ExitCode::from(exit_codes::INVALID as u8));
    }
    Ok(success_to_exit_code(output.success))
}

fn run_event(
    kind: EventKind,
    at: EventLocation,
    session_id: &str,
    options: &EventOptions,
    cwd: &Path,
) -> Result<ExitCode, Box<dyn std::error::Error>> {
    use tally::cli::EventCommand;

    let service = open_file_service(cwd, Config::load_from_cwd(cwd))?;
    let cmd = EventCommand::new(service);

    let output = cmd.run(kind, at, session_id, options);
    print_formatted(&cmd.format_output(&output, options));

    Ok(success_to_exit_code(output.success))
}

fn run_resolve(
    exploration_id: &str,
    state_name: &str,
    answers: &[String],
    rule: Option<String>,
    json: bool,
    quiet: bool,
    cwd: &Path,
) -> Result<ExitCode, Box<dyn std::error::Error>> {
    use tally::cli::resolve::{ResolveCommand, ResolveOptions};

    let service = open_file_service(cwd, Config::load_from_cwd(cwd))?;
    let cmd = ResolveCommand::new(service);
    let options = ResolveOptions { json, quiet, rule };

    let output = cmd.run(exploration_id, state_name, answers, &options);
    print_formatted(&cmd.format_output(&output, &options));

    Ok(success_to_exit_code(output.success))
}

fn run_answers(
    exploration_id: &str,
    state_name: &str,
    version: Option<u32>,
    json: bool,
    quiet: bool,
    cwd: &Path,
) -> Result<ExitCode, Box<dyn std::error::Error>> {
    use tally::cli::answers::{AnswersCommand, AnswersOptions};

    let service = open_file_service(cwd, Config::load_from_cwd(cwd))?;
    let cmd = AnswersCommand::new(service);
    let options = AnswersOptions {
        json,
        quiet,
        version,
    };

    let output = cmd.run(exploration_id, state_name, &options);
    print_formatted(&cmd.format_output(&output, &options));

    Ok(success_to_exit_code(output.success))
}

fn run_improvements(
    exploration_id: &str,
    version: u32,
    strict: bool,
    json: bool,
    quiet: bool,
    cwd: &Path,
) -> Result<ExitCode, Box<dyn std::error::Error>> {
    use tally::cli::improvements::{ImprovementsCommand, ImprovementsOptions};

    let service = open_file_service(cwd, Config::load_from_cwd(cwd))?;
    let cmd = ImprovementsCommand::new(service);
    let options = ImprovementsOptions {
        json,
        quiet,
        strict,
    };

    let output = cmd.run(exploration_id, version, &options);
    print_formatted(&cmd.format_output(&output, &options));

    Ok(success_to_exit_code(output.success))
}

fn run_stats(
    exploration_id: &str,
    version: u32,
    strict: bool,
    json: bool,
    quiet: bool,
    cwd: &Path,
) -> Result<ExitCode, Box<dyn std::error::Error>> {
    use tally::cli::stats::{StatsCommand, StatsOptions};

    let service = open_file_service(cwd, Config::load_from_cwd(cwd))?;
    let cmd = StatsCommand::new(service);
    let options = StatsOptions {
        json,
        quiet,
        strict,
    };

    let output = cmd.run(exploration_id, version, &options);
    print_formatted(&cmd.format_output(&output, &options));

    Ok(success_to_exit_code(output.success))
}
