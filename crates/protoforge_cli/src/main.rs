//! Protoforge CLI, the command-line front end of the schema code-generation
//! pipeline.
//!
//! Provides `protoforge generate` to run the compiler for every out-of-date
//! unit, `protoforge plan` to show what would run, `protoforge check` to
//! verify the expectation manifest, and `protoforge clean` to drop generated
//! output and caches.

#![warn(missing_docs)]

mod check;
mod clean;
mod generate;
mod pipeline;
mod plan;

use std::process;

use clap::{Parser, Subcommand, ValueEnum};
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::EnvFilter;

/// Protoforge: build-time schema code generation.
#[derive(Parser, Debug)]
#[command(name = "protoforge", version, about = "Schema code generation orchestrator")]
pub struct Cli {
    /// Suppress all output except errors.
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Enable verbose (debug-level) output.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Control colored output.
    #[arg(long, global = true, value_enum, default_value_t = ColorChoice::Auto)]
    pub color: ColorChoice,

    /// Path to a custom `protoforge.toml` configuration file.
    #[arg(long, global = true)]
    pub config: Option<String>,

    /// The subcommand to run.
    #[command(subcommand)]
    pub command: Command,
}

/// Available CLI commands.
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Generate code for out-of-date units.
    Generate(GenerateArgs),
    /// Show the planned compiler invocations without running them.
    Plan(PlanArgs),
    /// Generate and verify the `[[expect]]` manifest.
    Check(CheckArgs),
    /// Remove generated output, extracted archives and cache records.
    Clean,
}

/// Arguments for `protoforge generate`.
#[derive(Parser, Debug)]
pub struct GenerateArgs {
    /// Units to generate (default: all). Their base units are resolved too.
    pub units: Vec<String>,

    /// Run the compiler even for up-to-date units.
    #[arg(long)]
    pub force: bool,

    /// Maximum number of parallel jobs.
    #[arg(short, long)]
    pub jobs: Option<usize>,

    /// Output format for diagnostics.
    #[arg(short, long, value_enum, default_value_t = ReportFormat::Text)]
    pub format: ReportFormat,
}

/// Arguments for `protoforge plan`.
#[derive(Parser, Debug)]
pub struct PlanArgs {
    /// Units to plan (default: all).
    pub units: Vec<String>,

    /// Output format.
    #[arg(short, long, value_enum, default_value_t = ReportFormat::Text)]
    pub format: ReportFormat,
}

/// Arguments for `protoforge check`.
#[derive(Parser, Debug)]
pub struct CheckArgs {
    /// Maximum number of parallel jobs.
    #[arg(short, long)]
    pub jobs: Option<usize>,
}

/// Controls whether colored output is produced.
#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum ColorChoice {
    /// Detect from terminal capabilities.
    Auto,
    /// Always produce colored output.
    Always,
    /// Never produce colored output.
    Never,
}

/// Report output format.
#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum ReportFormat {
    /// Human-readable terminal output.
    Text,
    /// Machine-readable JSON output.
    Json,
}

/// Global settings derived from CLI flags.
pub struct GlobalArgs {
    /// Whether to suppress non-error output.
    pub quiet: bool,
    /// Whether to print verbose/debug information.
    pub verbose: bool,
    /// Whether to use colored output.
    pub color: bool,
    /// Optional path to a custom config file.
    pub config: Option<String>,
}

fn main() {
    let cli = Cli::parse();

    let color = match cli.color {
        ColorChoice::Auto => atty_is_terminal(),
        ColorChoice::Always => true,
        ColorChoice::Never => false,
    };

    let global = GlobalArgs {
        quiet: cli.quiet,
        verbose: cli.verbose,
        color,
        config: cli.config,
    };
    init_logging(&global);

    let result = match cli.command {
        Command::Generate(ref args) => generate::run(args, &global),
        Command::Plan(ref args) => plan::run(args, &global),
        Command::Check(ref args) => check::run(args, &global),
        Command::Clean => clean::run(&global),
    };

    match result {
        Ok(code) => process::exit(code),
        Err(e) => {
            eprintln!("error: {e}");
            process::exit(1);
        }
    }
}

/// Installs the log subscriber. `RUST_LOG` applies on top of the level
/// chosen by `--quiet` / `--verbose`.
fn init_logging(global: &GlobalArgs) {
    let level = if global.verbose {
        LevelFilter::DEBUG
    } else if global.quiet {
        LevelFilter::ERROR
    } else {
        LevelFilter::WARN
    };
    let filter = EnvFilter::builder()
        .with_default_directive(level.into())
        .from_env_lossy();

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_ansi(global.color)
        .with_target(false)
        .init();
}

/// Rough terminal detection: checks the TERM env var.
fn atty_is_terminal() -> bool {
    std::env::var("TERM").is_ok()
}
