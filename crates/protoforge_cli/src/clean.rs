//! The `protoforge clean` command.

use crate::pipeline::load_project;
use crate::GlobalArgs;

/// Removes generated output, extracted archives and cache records.
pub fn run(global: &GlobalArgs) -> Result<i32, Box<dyn std::error::Error>> {
    let (project_dir, config) = load_project(global)?;
    let removed = protoforge_build::clean(&config, &project_dir)?;
    if !global.quiet {
        for dir in &removed {
            eprintln!("    Removed {}", dir.display());
        }
        if removed.is_empty() {
            eprintln!("    Nothing to clean");
        }
    }
    Ok(0)
}
