mod completer;
mod report;
mod state;

use std::fs;
use std::io::{self, IsTerminal, Read};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::Parser;
use log::{LevelFilter, debug, info};
use lox::{Lox, LoxError, Options, Outcome, Runner};
use rustyline::Editor;
use rustyline::error::ReadlineError;

use completer::LoxHelper;
use report::{report_error, report_warning};
use state::ReplState;

/// Static errors and unreadable scripts
const EXIT_DATA_ERROR: u8 = 65;
/// Runtime errors
const EXIT_SOFTWARE_ERROR: u8 = 70;

#[derive(Parser, Debug)]
#[command(name = "lox", version, about = "Tree-walking Lox interpreter")]
struct Cli {
    /// Script to run. Starts the REPL when omitted.
    script: Option<PathBuf>,

    /// Don't warn about local variables that are never read
    #[arg(long)]
    allow_unused: bool,

    /// Print each parsed top-level statement before running it
    #[arg(long)]
    print_ast: bool,

    /// More logging on stderr (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn init_logger(verbose: u8) {
    let level = match verbose {
        0 => LevelFilter::Warn,
        1 => LevelFilter::Info,
        2 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    };

    // RUST_LOG, when set, wins over the flags.
    env_logger::Builder::new()
        .filter_level(level)
        .parse_default_env()
        .init();
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logger(cli.verbose);
    debug!("CLI arguments: {:?}", cli);

    let mut lox = Lox::with_options(Options {
        report_unused: !cli.allow_unused,
    });

    match &cli.script {
        Some(path) => run_file(&mut lox, path, cli.print_ast),
        None if io::stdin().is_terminal() => run_repl(&mut lox, cli.print_ast),
        None => run_piped(&mut lox, cli.print_ast),
    }
}

fn run_file<R: Runner>(runner: &mut R, path: &Path, print_ast: bool) -> ExitCode {
    info!("Reading {}", path.display());
    let source = match fs::read_to_string(path) {
        Ok(source) => source,
        Err(e) => {
            report_error(&LoxError::from(e), "", None, io::stderr());
            return ExitCode::from(EXIT_DATA_ERROR);
        }
    };
    let filename = path.to_string_lossy();
    run_source(runner, &source, Some(&filename), print_ast)
}

/// Piped stdin runs as one script: no prompts, no auto-print, real exit codes.
fn run_piped<R: Runner>(runner: &mut R, print_ast: bool) -> ExitCode {
    let mut source = String::new();
    if let Err(e) = io::stdin().read_to_string(&mut source) {
        report_error(&LoxError::from(e), "", None, io::stderr());
        return ExitCode::from(EXIT_DATA_ERROR);
    }
    run_source(runner, &source, None, print_ast)
}

fn run_source<R: Runner>(
    runner: &mut R,
    source: &str,
    filename: Option<&str>,
    print_ast: bool,
) -> ExitCode {
    if print_ast {
        print_statements(source);
    }
    let outcome = runner.run(source, io::stdout());
    report_outcome(&outcome, source, filename);
    exit_code(&outcome)
}

/// Parse errors are left for the run that follows to report.
fn print_statements(source: &str) {
    if let Ok(statements) = lox::parse(source) {
        for statement in &statements {
            println!("{}", statement);
        }
    }
}

fn report_outcome(outcome: &Outcome, source: &str, filename: Option<&str>) {
    let mut stderr = io::stderr();
    for warning in &outcome.warnings {
        report_warning(warning, source, filename, &mut stderr);
    }
    for error in &outcome.errors {
        report_error(error, source, filename, &mut stderr);
    }
}

fn exit_code(outcome: &Outcome) -> ExitCode {
    if outcome.has_runtime_error() {
        ExitCode::from(EXIT_SOFTWARE_ERROR)
    } else if !outcome.is_ok() {
        ExitCode::from(EXIT_DATA_ERROR)
    } else {
        ExitCode::SUCCESS
    }
}

fn run_repl<R: Runner>(runner: &mut R, print_ast: bool) -> ExitCode {
    let mut rl: Editor<LoxHelper, _> = match Editor::with_config(rustyline::Config::default()) {
        Ok(rl) => rl,
        Err(err) => {
            eprintln!("Could not start the REPL: {}", err);
            return ExitCode::FAILURE;
        }
    };
    let helper = LoxHelper::new();
    helper.set_variables(runner.variable_names());
    rl.set_helper(Some(helper));
    let mut state = ReplState::new();

    loop {
        match rl.readline(&state.prompt()) {
            Ok(line) => {
                let _ = rl.add_history_entry(&line);
                if !state.process_line(&line) {
                    continue;
                }

                let buffer = state.take_buffer();
                let auto_print = ReplState::should_auto_print(&buffer);
                let source = if auto_print {
                    ReplState::complete_statement(&buffer)
                } else {
                    buffer
                };

                if print_ast {
                    print_statements(&source);
                }
                let outcome = runner.run(&source, io::stdout());
                report_outcome(&outcome, &source, None);
                if auto_print
                    && outcome.is_ok()
                    && let Some(value) = &outcome.value
                {
                    println!("{}", value);
                }

                if let Some(helper) = rl.helper() {
                    helper.set_variables(runner.variable_names());
                }
            }
            Err(ReadlineError::Interrupted) => {
                if state.is_empty() {
                    break;
                }
                state.cancel();
                println!();
            }
            Err(ReadlineError::Eof) => break,
            Err(err) => {
                eprintln!("REPL error: {:?}", err);
                return ExitCode::FAILURE;
            }
        }
    }

    ExitCode::SUCCESS
}
