//! Generation planning and compiler invocation.
//!
//! The [`Planner`] turns a resolved unit into [`GenerationTaskDescriptor`]s,
//! [`build_command`] renders a descriptor as a compiler command line, and the
//! [`CompilerInvoker`] runs it, collecting diagnostics and publishing the
//! generated tree only once every batch of a unit has succeeded.

#![warn(missing_docs)]

pub mod cancel;
pub mod command;
pub mod compiler;
pub mod descriptor;
pub mod error;
pub mod invoker;
pub mod planner;

pub use cancel::CancelToken;
pub use command::build_command;
pub use compiler::Compiler;
pub use descriptor::{DescriptorSetOutput, GenerationTaskDescriptor, PluginOutput};
pub use error::InvokeError;
pub use invoker::{CompilerInvoker, Invocation, InvokerSettings};
pub use planner::{Planner, PlannerSettings, UnitRequest, GENERATED_DIR};
