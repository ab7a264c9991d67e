//! Core domain models for provisioning
//!
//! This module defines the fundamental data structures that represent
//! pipelines, steps, their preconditions and configuration.

pub mod condition;
pub mod config;
pub mod context;
pub mod pipeline;
pub mod state;
pub mod step;

pub use condition::*;
pub use context::*;
pub use pipeline::*;
pub use state::*;
pub use step::*;
