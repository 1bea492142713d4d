use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use super::domain::{Action, AffectedApplication, ApplicationId, StepResultId};
use super::effect::{ApplicationEffect, EffectCalculator, StepResultEffect};
use super::finder::{AffectedApplicationFinder, FinderError};
use super::gateway::CrmQueries;

/// Corrected score for one step result. Without a score the step result's stored score
/// is used, which assumes the record itself has already been repaired.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "CorrectionEntry")]
pub struct ScoreCorrection {
    pub step_result_id: StepResultId,
    pub score: Option<f64>,
}

impl ScoreCorrection {
    pub fn stored(id: impl Into<String>) -> Self {
        Self {
            step_result_id: StepResultId(id.into()),
            score: None,
        }
    }

    pub fn corrected(id: impl Into<String>, score: f64) -> Self {
        Self {
            step_result_id: StepResultId(id.into()),
            score: Some(score),
        }
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum CorrectionEntry {
    Id(String),
    Detailed {
        step_result_id: String,
        #[serde(default)]
        score: Option<f64>,
    },
}

impl From<CorrectionEntry> for ScoreCorrection {
    fn from(entry: CorrectionEntry) -> Self {
        match entry {
            CorrectionEntry::Id(id) => ScoreCorrection::stored(id),
            CorrectionEntry::Detailed {
                step_result_id,
                score,
            } => ScoreCorrection {
                step_result_id: StepResultId(step_result_id),
                score,
            },
        }
    }
}

/// Candidate details copied onto a planned action for the operator report.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CandidateSummary {
    pub name: Option<String>,
    pub email: Option<String>,
    pub title: Option<String>,
}

/// A non-trivial decision waiting to be applied against the CRM.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlannedAction {
    pub action: Action,
    pub application_id: ApplicationId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hint: Option<String>,
    pub candidate: CandidateSummary,
}

impl PlannedAction {
    fn from_effect(effect: &ApplicationEffect, affected: &AffectedApplication) -> Self {
        let application = &affected.application;
        Self {
            action: effect.action,
            application_id: effect.application_id.clone(),
            hint: effect.hint.clone(),
            candidate: CandidateSummary {
                name: application.account.name.clone(),
                email: application.account.email.clone(),
                title: application.advertised_title.clone(),
            },
        }
    }
}

/// Result of a planning run: every decision for review plus the actions to apply.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FixPlan {
    pub effects: Vec<StepResultEffect>,
    pub actions: Vec<PlannedAction>,
    /// Step results with neither a supplied nor a stored score.
    pub unscored: Vec<StepResultId>,
    /// Step results corrected more than once with different scores. The first supplied
    /// score is used.
    #[serde(default)]
    pub conflicting: Vec<StepResultId>,
}

/// Service composing the finder and the calculator.
pub struct FixPlanner<Q> {
    finder: AffectedApplicationFinder<Q>,
    calculator: EffectCalculator,
}

impl<Q> FixPlanner<Q>
where
    Q: CrmQueries,
{
    pub fn new(queries: Arc<Q>, batch_size: usize, calculator: EffectCalculator) -> Self {
        Self {
            finder: AffectedApplicationFinder::with_batch_size(queries, batch_size),
            calculator,
        }
    }

    pub fn plan(&self, corrections: &[ScoreCorrection]) -> Result<FixPlan, PlannerError> {
        let ids: Vec<StepResultId> = corrections
            .iter()
            .map(|correction| correction.step_result_id.clone())
            .collect();
        let found = self.finder.find(&ids)?;

        let mut plan = FixPlan {
            conflicting: conflicting_scores(corrections),
            ..FixPlan::default()
        };
        let total = found.len();
        for (index, affected) in found.iter().enumerate() {
            let step_result = &affected.step_result;
            let supplied = corrections
                .iter()
                .filter(|correction| correction.step_result_id == step_result.id)
                .find_map(|correction| correction.score);
            let Some(new_score) = supplied.or(step_result.score) else {
                warn!(step_result_id = %step_result.id, "no score available, skipping");
                plan.unscored.push(step_result.id.clone());
                continue;
            };

            let effect = self.calculator.calculate(affected, new_score);
            info!(
                "[{}/{}] step result {} score update: {} => {} (raw: {}, state: {})",
                index + 1,
                total,
                step_result.id,
                display_score(step_result.score),
                new_score,
                display_score(step_result.raw_score),
                step_result.state.as_deref().unwrap_or("unknown"),
            );

            for (decision, application) in effect.applications.iter().zip(&affected.applications) {
                info!(
                    "  affected application [{}; {}]: {} :: {}",
                    decision.application_id, decision.stage_name, decision.action, decision.reason
                );
                if decision.action != Action::None {
                    plan.actions
                        .push(PlannedAction::from_effect(decision, application));
                }
            }

            plan.effects.push(effect);
        }

        info!(actions = plan.actions.len(), "planning finished");
        Ok(plan)
    }
}

/// Ids supplied twice with different scores, in first-seen order.
fn conflicting_scores(corrections: &[ScoreCorrection]) -> Vec<StepResultId> {
    let mut first: HashMap<&StepResultId, f64> = HashMap::new();
    let mut conflicting = Vec::new();
    for correction in corrections {
        let Some(score) = correction.score else {
            continue;
        };
        let id = &correction.step_result_id;
        match first.get(id) {
            None => {
                first.insert(id, score);
            }
            Some(&kept) if kept != score => {
                warn!(
                    step_result_id = %id,
                    kept,
                    ignored = score,
                    "conflicting score corrections, using the first"
                );
                if !conflicting.contains(id) {
                    conflicting.push(id.clone());
                }
            }
            Some(_) => {}
        }
    }
    conflicting
}

fn display_score(score: Option<f64>) -> String {
    score.map_or_else(|| "n/a".to_string(), |value| value.to_string())
}

/// Error raised by the planner.
#[derive(Debug, thiserror::Error)]
pub enum PlannerError {
    #[error(transparent)]
    Finder(#[from] FinderError),
}
