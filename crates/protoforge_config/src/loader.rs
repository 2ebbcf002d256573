//! Configuration file loading and validation.

use crate::error::ConfigError;
use crate::types::{ProjectConfig, UnitConfig};
use std::collections::BTreeSet;
use std::path::Path;

/// File name of the project configuration.
pub const CONFIG_FILE: &str = "protoforge.toml";

/// Loads and validates `protoforge.toml` from a project directory.
pub fn load_config(project_dir: &Path) -> Result<ProjectConfig, ConfigError> {
    load_config_file(&project_dir.join(CONFIG_FILE))
}

/// Loads and validates a configuration from an explicit file path.
pub fn load_config_file(path: &Path) -> Result<ProjectConfig, ConfigError> {
    let content = std::fs::read_to_string(path)?;
    load_config_from_str(&content)
}

/// Parses and validates a configuration from a string.
///
/// Useful for testing without filesystem dependencies.
pub fn load_config_from_str(content: &str) -> Result<ProjectConfig, ConfigError> {
    let config: ProjectConfig =
        toml::from_str(content).map_err(|e| ConfigError::ParseError(e.to_string()))?;
    validate_config(&config)?;
    Ok(config)
}

/// Validates names, cross references and output layout.
///
/// Cycles through `bases` are not rejected here; they are a resolution
/// failure scoped to the units involved.
fn validate_config(config: &ProjectConfig) -> Result<(), ConfigError> {
    if config.project.name.is_empty() {
        return Err(ConfigError::MissingField("project.name".to_string()));
    }
    if config.compiler.path.is_empty() {
        return Err(ConfigError::MissingField("compiler.path".to_string()));
    }
    if config.compiler.extension.is_empty() || config.compiler.extension.starts_with('.') {
        return Err(ConfigError::ValidationError(format!(
            "compiler.extension must be a bare extension, got '{}'",
            config.compiler.extension
        )));
    }
    if config.workers.limit == Some(0) {
        return Err(ConfigError::ValidationError(
            "workers.limit must be at least 1".to_string(),
        ));
    }

    for (name, unit) in &config.units {
        if !is_valid_unit_name(name) {
            return Err(ConfigError::ValidationError(format!(
                "unit name '{name}' may only contain letters, digits, '_' and '-'"
            )));
        }
        validate_unit(config, name, unit)?;
    }

    for expectation in &config.expect {
        if !config.units.contains_key(&expectation.unit) {
            return Err(ConfigError::UnknownUnit(expectation.unit.clone()));
        }
    }
    Ok(())
}

fn validate_unit(config: &ProjectConfig, name: &str, unit: &UnitConfig) -> Result<(), ConfigError> {
    for base in &unit.bases {
        if base == name {
            return Err(ConfigError::ValidationError(format!(
                "unit '{name}' lists itself as a base"
            )));
        }
        if !config.units.contains_key(base) {
            return Err(ConfigError::UnknownUnit(base.clone()));
        }
    }

    for plugin in unit.plugins.keys() {
        if !config.plugins.contains_key(plugin) {
            return Err(ConfigError::UnknownPlugin {
                unit: name.to_string(),
                plugin: plugin.clone(),
            });
        }
    }

    if let Some(path) = unit.descriptor_set.as_ref().and_then(|d| d.path.as_deref()) {
        if !is_contained_relative(path) {
            return Err(ConfigError::ValidationError(format!(
                "unit '{name}': descriptor set path '{path}' must be relative to the unit output"
            )));
        }
    }

    let mut subdirs = BTreeSet::new();
    let requests = unit.builtins.iter().chain(unit.plugins.iter());
    for (output, request) in requests {
        let subdir = request.out_subdir.as_deref().unwrap_or(output);
        if !is_single_component(subdir) {
            return Err(ConfigError::ValidationError(format!(
                "unit '{name}': output directory '{subdir}' must be a single path component"
            )));
        }
        if !subdirs.insert(subdir.to_string()) {
            return Err(ConfigError::ValidationError(format!(
                "unit '{name}': output directory '{subdir}' is used by more than one generator"
            )));
        }
    }
    Ok(())
}

fn is_valid_unit_name(name: &str) -> bool {
    !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}

fn is_single_component(s: &str) -> bool {
    !s.is_empty() && s != "." && s != ".." && !s.contains(['/', '\\'])
}

fn is_contained_relative(s: &str) -> bool {
    let path = Path::new(s);
    !s.is_empty()
        && path
            .components()
            .all(|c| matches!(c, std::path::Component::Normal(_)))
}
