//! provision - ordered, idempotent VM provisioning driven by a YAML step list

pub mod action;
pub mod cli;
pub mod core;
pub mod execution;
pub mod persistence;
pub mod template;

// Re-export commonly used types
pub use action::{Action, ActionError, CommandRunner, CommandSpec, ProcessRunner};
pub use core::{ExecutionStatus, Pipeline, ProvisionContext, Step, StepState};
pub use execution::{ExecutionEngine, ExecutionEvent, ProvisionError, StepExecutor};
