//! Shared helpers for CLI commands.
//!
//! Project root discovery, configuration loading, interrupt handling and
//! the progress/diagnostic output used by `generate` and `check`.

use std::path::{Path, PathBuf};

use protoforge_build::{BuildReport, Freshness};
use protoforge_codegen::CancelToken;
use protoforge_config::{load_config_file, ProjectConfig, CONFIG_FILE};
use protoforge_diagnostics::{Diagnostic, DiagnosticRenderer, JsonRenderer, TerminalRenderer};

use crate::{GlobalArgs, ReportFormat};

/// Walks up from `start` looking for the nearest directory containing `protoforge.toml`.
///
/// Returns the directory containing `protoforge.toml`, or an error if none is found.
pub fn find_project_root(start: &Path) -> Result<PathBuf, Box<dyn std::error::Error>> {
    let mut current = start.to_path_buf();
    loop {
        if current.join(CONFIG_FILE).exists() {
            return Ok(current);
        }
        if !current.pop() {
            return Err(format!(
                "could not find {CONFIG_FILE} in {} or any parent directory",
                start.display()
            )
            .into());
        }
    }
}

/// Locates the configuration file and the project root it belongs to.
///
/// `--config` may name the file itself or the directory holding it; without
/// it the current directory and its parents are searched.
pub fn resolve_config_path(
    global: &GlobalArgs,
) -> Result<(PathBuf, PathBuf), Box<dyn std::error::Error>> {
    if let Some(ref config_path) = global.config {
        let p = PathBuf::from(config_path);
        if p.is_dir() {
            return Ok((p.clone(), p.join(CONFIG_FILE)));
        }
        let dir = match p.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        Ok((dir, p))
    } else {
        let root = find_project_root(&std::env::current_dir()?)?;
        let file = root.join(CONFIG_FILE);
        Ok((root, file))
    }
}

/// Loads the project configuration. Returns the project root and the config.
pub fn load_project(
    global: &GlobalArgs,
) -> Result<(PathBuf, ProjectConfig), Box<dyn std::error::Error>> {
    let (project_dir, file) = resolve_config_path(global)?;
    let config = load_config_file(&file)?;
    Ok((project_dir, config))
}

/// Cancels `token` on Ctrl-C so in-flight compiler runs are stopped and no
/// partial output is published.
pub fn cancel_on_interrupt(token: &CancelToken) {
    let token = token.clone();
    if let Err(e) = ctrlc::set_handler(move || {
        tracing::warn!("interrupted, cancelling");
        token.cancel();
    }) {
        tracing::debug!("cannot install interrupt handler: {e}");
    }
}

/// Prints one status line per unit to stderr, cargo style.
pub fn print_unit_status(report: &BuildReport) {
    for (unit, unit_report) in &report.units {
        let line = match &unit_report.outcome {
            Ok(Some(output)) if output.freshness == Freshness::Generated => format!(
                "  Generated {unit} ({} files from {} schemas)",
                output.generated_files,
                unit_report.compiled_files.len()
            ),
            Ok(Some(_)) => format!("    Skipped {unit} (up to date)"),
            Ok(None) => format!("    Skipped {unit} (nothing to generate)"),
            Err(e) => format!("     Failed {unit} ({})", e.kind()),
        };
        eprintln!("{line}");
    }
}

/// Renders diagnostics to stderr (text) or stdout (JSON lines).
///
/// Returns the number of diagnostics rendered.
pub fn render_diagnostics(diagnostics: &[&Diagnostic], format: ReportFormat, color: bool) -> usize {
    match format {
        ReportFormat::Text => {
            let renderer = TerminalRenderer::new(color);
            for diag in diagnostics {
                eprint!("{}", renderer.render(diag));
            }
        }
        ReportFormat::Json => {
            let renderer = JsonRenderer;
            for diag in diagnostics {
                println!("{}", renderer.render(diag));
            }
        }
    }
    diagnostics.len()
}

/// Prints every unit failure that carries no compiler diagnostics.
///
/// Compiler failures are shown through their parsed diagnostics instead;
/// when the compiler printed nothing parseable the raw error is shown.
pub fn print_failures(report: &BuildReport) {
    for (_, err) in report.failures() {
        if err.diagnostics().is_empty() {
            eprintln!("error: {err}");
        }
    }
}
