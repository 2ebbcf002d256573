//! Error types for configuration loading and validation.

/// Errors that can occur when loading or validating a `protoforge.toml` configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// An I/O error occurred while reading the configuration file.
    #[error("failed to read configuration: {0}")]
    IoError(#[from] std::io::Error),

    /// The TOML content could not be parsed.
    #[error("failed to parse configuration: {0}")]
    ParseError(String),

    /// A referenced unit name does not exist in the configuration.
    #[error("unknown unit '{0}'")]
    UnknownUnit(String),

    /// A unit requests a plugin that has no `[plugins.*]` declaration.
    #[error("unit '{unit}' requests undeclared plugin '{plugin}'")]
    UnknownPlugin {
        /// The requesting unit.
        unit: String,
        /// The undeclared plugin id.
        plugin: String,
    },

    /// A required field is missing from the configuration.
    #[error("missing required field: {0}")]
    MissingField(String),

    /// A configuration value failed validation.
    #[error("validation error: {0}")]
    ValidationError(String),
}
