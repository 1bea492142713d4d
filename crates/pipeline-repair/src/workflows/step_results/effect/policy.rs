use super::super::domain::{Action, AffectedApplication, ApplicationStepResult, Stage};
use super::causation::{self, Causation};
use super::threshold::check_score;
use super::{ApplicationEffect, EffectConfig};

pub(crate) fn decide(
    step_result: &ApplicationStepResult,
    affected: &AffectedApplication,
    new_score: f64,
    config: &EffectConfig,
) -> ApplicationEffect {
    let application = &affected.application;
    let stage = Stage::parse(&application.stage_name);
    let mut effect = ApplicationEffect {
        application_id: application.id.clone(),
        stage_name: application.stage_name.clone(),
        action: Action::None,
        reason: String::new(),
        hint: None,
        comment: None,
        causation: None,
    };

    if let Some(stage) = stage.filter(|stage| stage.is_ignored()) {
        effect.reason = format!("Application is {stage}");
        return effect;
    }

    let check = check_score(step_result, &affected.mapping, new_score);
    let comment = check.comment.clone();
    effect.comment = Some(check.comment);

    match stage {
        Some(Stage::Rejected) => {
            let verdict = causation::assess(
                &step_result.history,
                &affected.history,
                config.causation_tolerance_minutes,
            );
            if verdict == Causation::MissingApplicationTransition {
                effect.reason = format!("Rejection not caused by this ASR ({})", verdict.summary());
                effect.comment = Some(verdict.summary());
            } else if !verdict.is_caused() {
                effect.reason = format!("Rejection not caused by this ASR ({})", verdict.summary());
            } else if check.passed {
                match &application.last_active_stage {
                    Some(previous) => {
                        effect.action = Action::Restore;
                        effect.reason = format!("The new score is above threshold: {comment}");
                        effect.hint = Some(previous.clone());
                    }
                    None => {
                        effect.action = Action::Error;
                        effect.reason = "Cannot determine the step we should restore application to, last active stage is unknown".to_string();
                    }
                }
            } else {
                effect.reason = format!("The new score is still below threshold: {comment}");
            }
            effect.causation = Some(verdict);
        }
        _ if check.passed => {
            effect.reason = format!("The new score is still above threshold: {comment}");
        }
        Some(stage) if stage.position() >= Stage::Interview.position() => {
            effect.action = Action::NotifyHm;
            effect.reason = format!(
                "Application should be rejected, but already past Review (the new score is below threshold: {comment})"
            );
        }
        Some(_) => {
            effect.action = Action::Reject;
            effect.reason = format!("The new score is below threshold: {comment}");
        }
        None => {
            effect.action = Action::Error;
            effect.reason = format!(
                "Unknown application stage '{}' (the new score is below threshold: {comment})",
                application.stage_name
            );
        }
    }

    effect
}
