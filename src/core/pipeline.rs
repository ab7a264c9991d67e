//! Pipeline domain model

use crate::core::{
    config::ProvisionConfig,
    state::{ExecutionStatus, PipelineState, StepState},
    step::{Step, StepDefaults},
};
use std::collections::BTreeMap;

/// An ordered provisioning pipeline
#[derive(Debug, Clone)]
pub struct Pipeline {
    /// Pipeline name
    pub name: String,

    /// Global variables available to all steps
    pub variables: BTreeMap<String, String>,

    /// Steps in declared order, which is also execution order
    pub steps: Vec<Step>,

    /// Execution state
    pub state: PipelineState,
}

impl Pipeline {
    /// Create a pipeline from configuration
    pub fn from_config(config: &ProvisionConfig) -> Self {
        let fallback = StepDefaults::default();
        let defaults = StepDefaults {
            retries: config.defaults.retries.unwrap_or(fallback.retries),
            timeout_secs: config.defaults.timeout_secs.unwrap_or(fallback.timeout_secs),
        };

        Pipeline {
            name: config.name.clone(),
            variables: config.variables.clone(),
            steps: config
                .steps
                .iter()
                .map(|step_config| Step::from_config(step_config, &defaults))
                .collect(),
            state: PipelineState::new(),
        }
    }

    /// Get a step by ID
    pub fn step(&self, id: &str) -> Option<&Step> {
        self.steps.iter().find(|s| s.id == id)
    }

    /// Get a mutable step by ID
    pub fn step_mut(&mut self, id: &str) -> Option<&mut Step> {
        self.steps.iter_mut().find(|s| s.id == id)
    }

    /// Step ids in the order they run
    pub fn execution_order(&self) -> Vec<&str> {
        self.steps.iter().map(|s| s.id.as_str()).collect()
    }

    /// Check if every step reached a terminal state
    pub fn is_complete(&self) -> bool {
        self.steps.iter().all(|s| s.state.is_terminal())
    }

    /// Check if pipeline has failed
    pub fn has_failed(&self) -> bool {
        self.state.status == ExecutionStatus::Failed
    }

    /// Recount completed, skipped and warned steps
    pub fn update_counts(&mut self) {
        let mut completed = 0;
        let mut skipped = 0;
        let mut warned = 0;

        for step in &self.steps {
            match &step.state {
                StepState::Completed { .. } => completed += 1,
                StepState::Skipped { .. } => skipped += 1,
                StepState::Warned { .. } => warned += 1,
                _ => {}
            }
        }

        self.state.completed_steps = completed;
        self.state.skipped_steps = skipped;
        self.state.warned_steps = warned;
    }
}
