//! Parsing and validation of `protoforge.toml` project configuration files.
//!
//! This crate reads the project configuration and produces a strongly-typed
//! [`ProjectConfig`] describing compilation units, their schema sources and
//! inheritance, the schema compiler, and the generator outputs per unit.

#![warn(missing_docs)]

pub mod error;
pub mod loader;
pub mod resolve;
pub mod types;

pub use error::ConfigError;
pub use loader::{load_config, load_config_file, load_config_from_str, CONFIG_FILE};
pub use resolve::{resolve_outputs, resolve_tool_path, OutputPlugin, PluginKind};
pub use types::*;
