use super::super::domain::{ApplicationStepResult, StepPipelineMapping};

pub(crate) struct ScoreCheck {
    pub passed: bool,
    pub comment: String,
}

/// Approximates the CRM's badge-state calculation: retries are ignored and only the badge
/// and threshold comparison is made. A failed step result does not always reject the
/// application in the CRM (scores between the pass and reject thresholds), so only the
/// reject threshold matters here.
pub(crate) fn check_score(
    step_result: &ApplicationStepResult,
    mapping: &StepPipelineMapping,
    new_score: f64,
) -> ScoreCheck {
    if let (Some(false), Some(badge)) = (step_result.badge_simulated, mapping.minimum_proficiency) {
        return ScoreCheck {
            passed: new_score >= badge.pass_threshold,
            comment: format!(
                "New score ({new_score}) vs required Badge Proficiency ({})",
                badge.pass_threshold
            ),
        };
    }

    match mapping.reject_threshold {
        Some(threshold) => ScoreCheck {
            passed: new_score >= threshold,
            comment: format!("New score ({new_score}) vs required Threshold ({threshold})"),
        },
        None => ScoreCheck {
            passed: true,
            comment: format!("New score ({new_score}) vs required Threshold (none)"),
        },
    }
}
