mod causation;
mod policy;
mod threshold;

pub use causation::Causation;

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::domain::{Action, AffectedApplications, ApplicationId, StepResultId};
use crate::config::ReconciliationConfig;

/// Tuning for the calculator.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EffectConfig {
    /// Largest rounded minute gap that still links a step result failure to a rejection.
    /// Zero means both transitions must land in the same minute.
    pub causation_tolerance_minutes: u32,
}

impl From<&ReconciliationConfig> for EffectConfig {
    fn from(config: &ReconciliationConfig) -> Self {
        Self {
            causation_tolerance_minutes: config.causation_tolerance_minutes,
        }
    }
}

/// Stateless calculator that decides what a corrected score means for each affected
/// application.
#[derive(Debug, Clone, Default)]
pub struct EffectCalculator {
    config: EffectConfig,
}

impl EffectCalculator {
    pub fn new(config: EffectConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> EffectConfig {
        self.config
    }

    pub fn calculate(&self, affected: &AffectedApplications, new_score: f64) -> StepResultEffect {
        let step_result = &affected.step_result;
        let applications = affected
            .applications
            .iter()
            .map(|application| policy::decide(step_result, application, new_score, &self.config))
            .inspect(|effect| {
                debug!(
                    step_result_id = %step_result.id,
                    application_id = %effect.application_id,
                    action = %effect.action,
                    reason = %effect.reason,
                    "calculated application effect"
                )
            })
            .collect();

        StepResultEffect {
            step_result_id: step_result.id.clone(),
            previous_score: step_result.score,
            new_score,
            applications,
        }
    }
}

/// Decision for a single application.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApplicationEffect {
    pub application_id: ApplicationId,
    pub stage_name: String,
    pub action: Action,
    pub reason: String,
    /// Restore target when `action` is `Restore`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hint: Option<String>,
    /// Score versus threshold comparison, absent for ignored stages.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub causation: Option<Causation>,
}

/// Calculator output for one corrected step result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepResultEffect {
    pub step_result_id: StepResultId,
    pub previous_score: Option<f64>,
    pub new_score: f64,
    pub applications: Vec<ApplicationEffect>,
}

impl StepResultEffect {
    pub fn actionable(&self) -> impl Iterator<Item = &ApplicationEffect> {
        self.applications
            .iter()
            .filter(|effect| effect.action != Action::None)
    }
}
