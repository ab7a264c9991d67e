//! Main execution engine - runs a provisioning pipeline in order

use crate::{
    action::{ActionError, CommandRunner},
    core::{ExecutionStatus, Pipeline, ProvisionContext, StepState},
    execution::{ExecutionResult, StepExecutor},
};
use chrono::Utc;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{error, info, warn};
use uuid::Uuid;

/// Events that can occur during a provisioning run
#[derive(Debug, Clone)]
pub enum ExecutionEvent {
    PipelineStarted {
        execution_id: Uuid,
        pipeline_name: String,
        total_steps: usize,
    },
    StepStarted {
        step_id: String,
        name: String,
        index: usize,
        total: usize,
    },
    StepRetrying {
        step_id: String,
        attempt: usize,
        max_attempts: usize,
        error: String,
    },
    StepSkipped {
        step_id: String,
        reason: String,
    },
    StepCompleted {
        step_id: String,
        output: String,
    },
    StepWarned {
        step_id: String,
        warning: String,
    },
    StepFailed {
        step_id: String,
        error: String,
    },
    PipelineCompleted {
        execution_id: Uuid,
        status: ExecutionStatus,
    },
}

/// Type for event handlers
pub type EventHandler = Arc<dyn Fn(ExecutionEvent) + Send + Sync>;

/// A run that stopped on a hard failure
#[derive(Debug, Error)]
pub enum ProvisionError {
    #[error("Step '{name}' ({id}) failed: {source}")]
    StepFailed {
        id: String,
        name: String,
        #[source]
        source: ActionError,
    },
}

impl ProvisionError {
    /// Id of the step that stopped the run
    pub fn step_id(&self) -> &str {
        match self {
            ProvisionError::StepFailed { id, .. } => id,
        }
    }
}

/// Main provisioning engine
///
/// Steps run strictly in declared order. The first hard failure stops the
/// run; later steps stay pending and nothing already done is rolled back.
pub struct ExecutionEngine<R> {
    executor: Arc<StepExecutor<R>>,
    event_handlers: Arc<Mutex<Vec<EventHandler>>>,
}

impl<R: CommandRunner> ExecutionEngine<R> {
    pub fn new(runner: R) -> Self {
        Self::with_executor(StepExecutor::new(runner))
    }

    pub fn with_executor(executor: StepExecutor<R>) -> Self {
        Self {
            executor: Arc::new(executor),
            event_handlers: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn executor(&self) -> &StepExecutor<R> {
        &self.executor
    }

    /// Add an event handler
    pub async fn add_event_handler<F>(&self, handler: F)
    where
        F: Fn(ExecutionEvent) + Send + Sync + 'static,
    {
        self.event_handlers.lock().await.push(Arc::new(handler));
    }

    /// Execute the entire pipeline
    pub async fn execute(
        &self,
        pipeline: &mut Pipeline,
        ctx: &mut ProvisionContext,
    ) -> Result<(), ProvisionError> {
        let handlers = self.event_handlers.lock().await.clone();
        let emit = |event: ExecutionEvent| {
            for handler in &handlers {
                handler(event.clone());
            }
        };

        let execution_id = pipeline.state.execution_id;
        let total = pipeline.steps.len();

        info!("Starting provisioning run: {} ({})", pipeline.name, execution_id);
        emit(ExecutionEvent::PipelineStarted {
            execution_id,
            pipeline_name: pipeline.name.clone(),
            total_steps: total,
        });

        pipeline.state.start(total);
        ctx.variables.extend(pipeline.variables.clone());

        for index in 0..total {
            let step = pipeline.steps[index].clone();
            let started_at = Utc::now();

            emit(ExecutionEvent::StepStarted {
                step_id: step.id.clone(),
                name: step.name.clone(),
                index,
                total,
            });
            pipeline.steps[index].state = StepState::Running {
                started_at,
                attempt: 1,
            };

            let max_attempts = step.max_attempts();
            let on_retry = |attempt: usize, e: &ActionError| {
                emit(ExecutionEvent::StepRetrying {
                    step_id: step.id.clone(),
                    attempt,
                    max_attempts,
                    error: e.to_string(),
                });
            };

            let result = self.executor.execute(&step, ctx, Some(&on_retry)).await;

            let (state, event) = match result {
                ExecutionResult::Skipped { reason } => {
                    info!("Step {} skipped: {}", step.id, reason);
                    (
                        StepState::Skipped {
                            reason: reason.clone(),
                        },
                        ExecutionEvent::StepSkipped {
                            step_id: step.id.clone(),
                            reason,
                        },
                    )
                }
                ExecutionResult::Success { output, attempts } => (
                    StepState::Completed {
                        output: output.clone(),
                        attempts,
                        started_at,
                        completed_at: Utc::now(),
                    },
                    ExecutionEvent::StepCompleted {
                        step_id: step.id.clone(),
                        output,
                    },
                ),
                ExecutionResult::Warned { warning, attempts } => {
                    warn!("Step {} finished with a warning: {}", step.id, warning);
                    (
                        StepState::Warned {
                            warning: warning.clone(),
                            attempts,
                            completed_at: Utc::now(),
                        },
                        ExecutionEvent::StepWarned {
                            step_id: step.id.clone(),
                            warning,
                        },
                    )
                }
                ExecutionResult::Failed { error, attempts } => {
                    error!("Step {} failed, stopping the run", step.id);
                    pipeline.steps[index].state = StepState::Failed {
                        error: error.to_string(),
                        attempts,
                        last_started_at: started_at,
                        failed_at: Utc::now(),
                    };
                    pipeline.state.fail(&step.id);
                    pipeline.update_counts();

                    emit(ExecutionEvent::StepFailed {
                        step_id: step.id.clone(),
                        error: error.to_string(),
                    });
                    emit(ExecutionEvent::PipelineCompleted {
                        execution_id,
                        status: ExecutionStatus::Failed,
                    });

                    return Err(ProvisionError::StepFailed {
                        id: step.id.clone(),
                        name: step.name.clone(),
                        source: error,
                    });
                }
            };

            pipeline.steps[index].state = state;
            pipeline.update_counts();
            emit(event);
        }

        pipeline.state.complete();
        info!(
            "Provisioning run finished: {} completed, {} skipped, {} warned",
            pipeline.state.completed_steps, pipeline.state.skipped_steps, pipeline.state.warned_steps
        );
        emit(ExecutionEvent::PipelineCompleted {
            execution_id,
            status: ExecutionStatus::Completed,
        });

        Ok(())
    }
}
