//! Provisioning execution engine

pub mod engine;
pub mod executor;
pub mod installer;

pub use engine::{EventHandler, ExecutionEngine, ExecutionEvent, ProvisionError};
pub use executor::{ExecutionResult, StepExecutor, DEFAULT_RETRY_DELAY};
pub use installer::{ensure, Ensured};
