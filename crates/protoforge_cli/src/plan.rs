//! The `protoforge plan` command: shows the compiler invocations a build
//! would make, without running any of them.

use protoforge_build::{Build, BuildOptions};
use protoforge_codegen::{build_command, GenerationTaskDescriptor};
use serde_json::json;

use crate::pipeline::load_project;
use crate::{GlobalArgs, PlanArgs, ReportFormat};

/// Resolves and plans the selected units and prints their batches.
///
/// Archives are still extracted, since planning needs their file lists.
pub fn run(args: &PlanArgs, global: &GlobalArgs) -> Result<i32, Box<dyn std::error::Error>> {
    let (project_dir, config) = load_project(global)?;
    let options = BuildOptions {
        units: args.units.clone(),
        ..BuildOptions::default()
    };
    let build = Build::new(config, &project_dir, options)?;
    let plans = build.plan_only();

    let mut failed = false;
    match args.format {
        ReportFormat::Text => {
            for (unit, plan) in &plans {
                match plan {
                    Ok(batches) if batches.is_empty() => println!("{unit}: nothing to compile"),
                    Ok(batches) => {
                        for descriptor in batches {
                            print_batch(&build, descriptor);
                        }
                    }
                    Err(e) => {
                        failed = true;
                        eprintln!("{unit}: {e}");
                    }
                }
            }
        }
        ReportFormat::Json => {
            let mut units = Vec::new();
            for (unit, plan) in &plans {
                units.push(match plan {
                    Ok(batches) => json!({
                        "unit": unit,
                        "batches": batches.iter().map(|d| batch_json(&build, d)).collect::<Vec<_>>(),
                    }),
                    Err(e) => {
                        failed = true;
                        json!({ "unit": unit, "error": e.to_string() })
                    }
                });
            }
            println!("{}", serde_json::to_string_pretty(&units)?);
        }
    }
    Ok(if failed { 1 } else { 0 })
}

fn command_line(build: &Build, descriptor: &GenerationTaskDescriptor) -> Vec<String> {
    build_command(build.compiler(), descriptor, &descriptor.output_root)
        .iter()
        .map(|arg| arg.to_string_lossy().into_owned())
        .collect()
}

fn print_batch(build: &Build, descriptor: &GenerationTaskDescriptor) {
    println!(
        "{} (batch {}/{}) -> {}",
        descriptor.unit,
        descriptor.batch + 1,
        descriptor.batches,
        descriptor.output_root.display()
    );
    for root in &descriptor.include_roots {
        println!("  include {}", root.path.display());
    }
    for file in &descriptor.compiled_files {
        println!("  compile {}", file.relative.display());
    }
    println!("  $ {}", command_line(build, descriptor).join(" "));
}

fn batch_json(build: &Build, descriptor: &GenerationTaskDescriptor) -> serde_json::Value {
    json!({
        "batch": descriptor.batch,
        "batches": descriptor.batches,
        "output_root": descriptor.output_root,
        "include_roots": descriptor.include_roots.iter().map(|r| &r.path).collect::<Vec<_>>(),
        "compiled_files": descriptor.compiled_files.iter().map(|f| &f.relative).collect::<Vec<_>>(),
        "command": command_line(build, descriptor),
    })
}
