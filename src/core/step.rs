//! Step domain model

use crate::action::Action;
use crate::core::{
    condition::Precondition,
    config::{FailurePolicy, StepConfig},
    context::ProvisionContext,
    state::StepState,
};

/// A single provisioning step
#[derive(Debug, Clone)]
pub struct Step {
    /// Unique step identifier
    pub id: String,

    /// Human-readable step name (used in errors and console output)
    pub name: String,

    pub description: Option<String>,

    /// The action, with placeholders still unrendered
    pub action: Action,

    /// Skip the action when this holds
    pub precondition: Option<Precondition>,

    /// Whether a failure stops the run
    pub on_failure: FailurePolicy,

    /// Retries after the first attempt
    pub retries: usize,

    /// Timeout for one attempt in seconds
    pub timeout_secs: u64,

    /// Expected version stamp
    pub stamp: Option<String>,

    /// Runtime state
    pub state: StepState,
}

/// Values used when a step doesn't set its own
#[derive(Debug, Clone)]
pub struct StepDefaults {
    pub retries: usize,
    pub timeout_secs: u64,
}

impl Default for StepDefaults {
    fn default() -> Self {
        Self {
            retries: 0,
            timeout_secs: 600, // 10 minutes
        }
    }
}

impl Step {
    /// Create a step from its configuration
    ///
    /// A stamped step is only considered done when its stamp is current
    /// and its explicit precondition holds. Without `skip_if`, an action
    /// that checks itself still probes its target under a current stamp.
    pub fn from_config(config: &StepConfig, defaults: &StepDefaults) -> Self {
        let explicit = config.skip_if.as_ref().map(Precondition::from_config);

        let precondition = match (&config.stamp, explicit) {
            (Some(_), None) if config.action.checks_itself() => None,
            (Some(stamp), explicit) => {
                let mut all = vec![Precondition::StampMatches {
                    step_id: config.id.clone(),
                    value: stamp.clone(),
                }];
                all.extend(explicit);
                Some(Precondition::All(all))
            }
            (None, explicit) => explicit,
        };

        Step {
            id: config.id.clone(),
            name: config.name.clone(),
            description: config.description.clone(),
            action: config.action.clone(),
            precondition,
            on_failure: config.on_failure,
            retries: config.retries.unwrap_or(defaults.retries),
            timeout_secs: config.timeout_secs.unwrap_or(defaults.timeout_secs),
            stamp: config.stamp.clone(),
            state: StepState::Pending,
        }
    }

    /// Total attempts allowed
    pub fn max_attempts(&self) -> usize {
        self.retries + 1
    }

    /// A stamp is declared but the stored one differs
    ///
    /// Outdated steps bypass the actions' own existence checks.
    pub fn stamp_outdated(&self, ctx: &ProvisionContext) -> bool {
        match &self.stamp {
            Some(stamp) => ctx.read_stamp(&self.id).as_deref() != Some(stamp.as_str()),
            None => false,
        }
    }
}
