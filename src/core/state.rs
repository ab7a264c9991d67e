//! Execution state models

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Overall provisioning run status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExecutionStatus {
    /// Run has not started
    Pending,
    /// Run is in progress
    Running,
    /// Every step completed, was skipped, or only warned
    Completed,
    /// A step failed hard and the run stopped
    Failed,
    /// The operator interrupted the run
    Cancelled,
}

/// State of a single step
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum StepState {
    /// Step has not run yet
    Pending,
    /// Step action is currently running
    Running {
        started_at: DateTime<Utc>,
        attempt: usize,
    },
    /// Step action completed successfully
    Completed {
        output: String,
        attempts: usize,
        started_at: DateTime<Utc>,
        completed_at: DateTime<Utc>,
    },
    /// Precondition held, so the action never ran
    Skipped {
        reason: String,
    },
    /// Step failed softly; the run continued past it
    Warned {
        warning: String,
        attempts: usize,
        completed_at: DateTime<Utc>,
    },
    /// Step failed hard (retry budget exhausted)
    Failed {
        error: String,
        attempts: usize,
        last_started_at: DateTime<Utc>,
        failed_at: DateTime<Utc>,
    },
}

impl StepState {
    /// Check if step is in a terminal state
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            StepState::Completed { .. }
                | StepState::Skipped { .. }
                | StepState::Warned { .. }
                | StepState::Failed { .. }
        )
    }

    /// Whether the action actually ran (successfully or not)
    pub fn did_run(&self) -> bool {
        matches!(
            self,
            StepState::Completed { .. } | StepState::Warned { .. } | StepState::Failed { .. }
        )
    }
}

/// Overall run state
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineState {
    /// Unique execution ID
    pub execution_id: Uuid,

    /// Current execution status
    pub status: ExecutionStatus,

    /// When execution started
    pub started_at: Option<DateTime<Utc>>,

    /// When execution completed/failed
    pub completed_at: Option<DateTime<Utc>>,

    /// Total number of steps
    pub total_steps: usize,

    /// Number of steps whose action completed
    pub completed_steps: usize,

    /// Number of steps skipped by their precondition
    pub skipped_steps: usize,

    /// Number of steps that failed softly
    pub warned_steps: usize,

    /// Id of the step that stopped the run, if any
    pub failed_step: Option<String>,
}

impl PipelineState {
    /// Create a new run state
    pub fn new() -> Self {
        Self {
            execution_id: Uuid::new_v4(),
            status: ExecutionStatus::Pending,
            started_at: None,
            completed_at: None,
            total_steps: 0,
            completed_steps: 0,
            skipped_steps: 0,
            warned_steps: 0,
            failed_step: None,
        }
    }

    /// Mark run as started
    pub fn start(&mut self, total_steps: usize) {
        self.status = ExecutionStatus::Running;
        self.started_at = Some(Utc::now());
        self.total_steps = total_steps;
    }

    /// Mark run as completed
    pub fn complete(&mut self) {
        self.status = ExecutionStatus::Completed;
        self.completed_at = Some(Utc::now());
    }

    /// Mark run as failed at the given step
    pub fn fail(&mut self, step_id: &str) {
        self.status = ExecutionStatus::Failed;
        self.failed_step = Some(step_id.to_string());
        self.completed_at = Some(Utc::now());
    }

    /// Mark run as cancelled by the operator
    pub fn cancel(&mut self) {
        self.status = ExecutionStatus::Cancelled;
        self.completed_at = Some(Utc::now());
    }

    /// Calculate progress (0.0 to 1.0) over steps that reached a terminal state
    pub fn progress(&self) -> f64 {
        if self.total_steps == 0 {
            return 0.0;
        }
        let done = self.completed_steps
            + self.skipped_steps
            + self.warned_steps
            + usize::from(self.failed_step.is_some());
        done as f64 / self.total_steps as f64
    }
}

impl Default for PipelineState {
    fn default() -> Self {
        Self::new()
    }
}
