use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::super::domain::FieldHistoryRecord;

const STEP_RESULT_STATE_FIELD: &str = "State__c";
const STEP_RESULT_FAILED_STATE: &str = "Result_Failed";
const STEP_RESULT_STATE_PREFIX: &str = "Result_";
const APPLICATION_STAGE_FIELD: &str = "StageName";
const REJECTED_STAGE: &str = "Rejected";

/// Verdict on whether a step result's failure is what rejected an application.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Causation {
    Caused { minutes_apart: i64 },
    NotCaused { minutes_apart: i64 },
    MissingApplicationTransition,
    MissingStepResultTransition,
}

impl Causation {
    pub fn is_caused(&self) -> bool {
        matches!(self, Causation::Caused { .. })
    }

    pub fn summary(&self) -> String {
        match self {
            Causation::Caused { minutes_apart } => {
                format!("step result failed {minutes_apart} min from the rejection")
            }
            Causation::NotCaused { minutes_apart } => {
                format!("step result failed {minutes_apart} min away from the rejection")
            }
            Causation::MissingApplicationTransition => {
                "Cannot identify history for application transition to rejected".to_string()
            }
            Causation::MissingStepResultTransition => {
                "Cannot identify history for step result transition to a result state"
                    .to_string()
            }
        }
    }
}

/// Correlates the step result's move into a result state with the application's move to
/// `Rejected`. Both transitions must round to within `tolerance_minutes` of each other.
pub(crate) fn assess(
    step_result_history: &[FieldHistoryRecord],
    application_history: &[FieldHistoryRecord],
    tolerance_minutes: u32,
) -> Causation {
    let Some(rejected_at) = latest(application_history, APPLICATION_STAGE_FIELD, |value| {
        value == REJECTED_STAGE
    }) else {
        return Causation::MissingApplicationTransition;
    };

    let failed_at = latest(step_result_history, STEP_RESULT_STATE_FIELD, |value| {
        value == STEP_RESULT_FAILED_STATE
    })
    .or_else(|| {
        latest(step_result_history, STEP_RESULT_STATE_FIELD, |value| {
            value.starts_with(STEP_RESULT_STATE_PREFIX)
        })
    });
    let Some(failed_at) = failed_at else {
        return Causation::MissingStepResultTransition;
    };

    let minutes_apart = rounded_minutes_between(failed_at, rejected_at);
    if minutes_apart <= i64::from(tolerance_minutes) {
        Causation::Caused { minutes_apart }
    } else {
        Causation::NotCaused { minutes_apart }
    }
}

fn latest(
    history: &[FieldHistoryRecord],
    field: &str,
    predicate: impl Fn(&str) -> bool,
) -> Option<DateTime<Utc>> {
    history
        .iter()
        .filter(|record| record.is_transition(field, &predicate))
        .map(|record| record.created_at)
        .max()
}

/// Absolute gap in whole minutes, rounding half up.
fn rounded_minutes_between(a: DateTime<Utc>, b: DateTime<Utc>) -> i64 {
    let millis = (a - b).num_milliseconds().abs();
    (millis as f64 / 60_000.0).round() as i64
}
