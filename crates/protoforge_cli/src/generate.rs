//! The `protoforge generate` command.

use protoforge_build::{Build, BuildOptions, BuildReport, Freshness};
use serde_json::json;

use crate::pipeline::{
    cancel_on_interrupt, load_project, print_failures, print_unit_status, render_diagnostics,
};
use crate::{GenerateArgs, GlobalArgs, ReportFormat};

/// Runs the compiler for every out-of-date unit.
///
/// Returns exit code 0 when every selected unit succeeded, 1 otherwise.
pub fn run(args: &GenerateArgs, global: &GlobalArgs) -> Result<i32, Box<dyn std::error::Error>> {
    let (project_dir, config) = load_project(global)?;
    let options = BuildOptions {
        workers: args.jobs,
        units: args.units.clone(),
        force: args.force,
        ..BuildOptions::default()
    };
    cancel_on_interrupt(&options.cancel);

    let build = Build::new(config, &project_dir, options)?;
    tracing::debug!(compiler = %build.compiler().version, "starting generation");
    let report = build.run();

    match args.format {
        ReportFormat::Text => {
            if !global.quiet {
                print_unit_status(&report);
            }
            render_diagnostics(&report.diagnostics(), ReportFormat::Text, global.color);
            print_failures(&report);
        }
        ReportFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&report_json(&report))?);
        }
    }

    Ok(if report.is_success() { 0 } else { 1 })
}

/// Machine-readable summary of a build.
fn report_json(report: &BuildReport) -> serde_json::Value {
    let units: Vec<_> = report
        .units
        .values()
        .map(|unit| {
            let (status, generated, output_dirs, error) = match &unit.outcome {
                Ok(Some(output)) => (
                    match output.freshness {
                        Freshness::Generated => "generated",
                        Freshness::UpToDate => "up-to-date",
                    },
                    Some(output.generated_files),
                    output.output_dirs.clone(),
                    None,
                ),
                Ok(None) => ("empty", None, Vec::new(), None),
                Err(e) => {
                    let error = json!({ "kind": e.kind(), "message": e.to_string() });
                    ("failed", None, Vec::new(), Some(error))
                }
            };
            json!({
                "unit": unit.unit,
                "status": status,
                "compiled_files": unit.compiled_files.len(),
                "generated_files": generated,
                "output_dirs": output_dirs,
                "sources": report.registry.sources_of(&unit.unit),
                "classpath": report.registry.classpath_of(&unit.unit),
                "error": error,
            })
        })
        .collect();

    json!({
        "success": report.is_success(),
        "extractions": report.extractions,
        "units": units,
        "diagnostics": report.diagnostics(),
    })
}
