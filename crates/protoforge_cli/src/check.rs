//! The `protoforge check` command: generates, then verifies the
//! `[[expect]]` manifest against what each unit actually compiled.

use protoforge_build::{check_expectations, Build, BuildOptions};

use crate::pipeline::{cancel_on_interrupt, load_project, print_failures, render_diagnostics};
use crate::{CheckArgs, GlobalArgs, ReportFormat};

/// Returns exit code 0 when the build succeeded and every expectation held.
pub fn run(args: &CheckArgs, global: &GlobalArgs) -> Result<i32, Box<dyn std::error::Error>> {
    let (project_dir, config) = load_project(global)?;
    let expectations = config.expect.clone();
    let options = BuildOptions {
        workers: args.jobs,
        ..BuildOptions::default()
    };
    cancel_on_interrupt(&options.cancel);

    let report = Build::new(config, &project_dir, options)?.run();
    render_diagnostics(&report.diagnostics(), ReportFormat::Text, global.color);
    print_failures(&report);

    let failures = check_expectations(&expectations, &report);
    for failure in &failures {
        eprintln!("error: {failure}");
    }

    if report.is_success() && failures.is_empty() {
        if !global.quiet {
            eprintln!(
                "    Checked {} units, {} expectations",
                report.units.len(),
                expectations.len()
            );
        }
        Ok(0)
    } else {
        Ok(1)
    }
}
