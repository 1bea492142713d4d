use crate::infra::{SampleCrm, CCAT_RESULT, ENGLISH_RESULT};
use clap::Args;
use pipeline_repair::error::AppError;
use pipeline_repair::workflows::step_results::{
    files, ActionExecutor, EffectCalculator, EffectConfig, FixPlanner, ScoreCorrection,
    SettleDelays, DEFAULT_BATCH_SIZE,
};
use std::sync::Arc;

#[derive(Args, Debug)]
pub(crate) struct DemoArgs {
    /// Corrected score for the mis-scored CCAT result
    #[arg(long, default_value_t = 78.0)]
    pub(crate) ccat_score: f64,
    /// Causation tolerance in minutes
    #[arg(long, default_value_t = 0)]
    pub(crate) tolerance_minutes: u32,
    /// Stop after planning
    #[arg(long)]
    pub(crate) plan_only: bool,
}

pub(crate) fn run_demo(args: DemoArgs) -> Result<(), AppError> {
    let DemoArgs {
        ccat_score,
        tolerance_minutes,
        plan_only,
    } = args;

    let crm = Arc::new(SampleCrm::seeded());
    let corrections = vec![
        ScoreCorrection::corrected(CCAT_RESULT, ccat_score),
        ScoreCorrection::stored(ENGLISH_RESULT),
    ];

    println!("Step result repair demo (sample CRM snapshot)");
    let planner = FixPlanner::new(
        crm.clone(),
        DEFAULT_BATCH_SIZE,
        EffectCalculator::new(EffectConfig {
            causation_tolerance_minutes: tolerance_minutes,
        }),
    );
    let plan = planner.plan(&corrections)?;

    for effect in &plan.effects {
        println!(
            "\nStep result {}: {} => {}",
            effect.step_result_id,
            effect
                .previous_score
                .map_or_else(|| "n/a".to_string(), |score| score.to_string()),
            effect.new_score
        );
        if effect.applications.is_empty() {
            println!("  no affected applications");
        }
        for decision in &effect.applications {
            println!(
                "  - {} [{}] -> {}",
                decision.application_id, decision.stage_name, decision.action
            );
            println!("    {}", decision.reason);
            if let Some(causation) = &decision.causation {
                println!("    causation: {}", causation.summary());
            }
        }
    }
    for id in &plan.unscored {
        println!("  step result {id} has no score and was skipped");
    }
    for id in &plan.conflicting {
        println!("  step result {id} was corrected twice with different scores, first one used");
    }

    if plan.actions.is_empty() {
        println!("\nNo actions required");
        return Ok(());
    }
    if plan_only {
        match serde_json::to_string_pretty(&plan.actions) {
            Ok(json) => println!("\nPlanned actions:\n{json}"),
            Err(err) => println!("\nPlanned actions unavailable: {err}"),
        }
        return Ok(());
    }

    let executor = ActionExecutor::new(crm.clone(), SettleDelays::NONE);
    let rows = executor.apply(&plan.actions)?;

    println!("\nExecution report");
    files::write_report_csv(std::io::stdout().lock(), &rows)?;

    println!("\nStages after repair");
    for action in &plan.actions {
        let stage = crm.stage_of(&action.application_id)?;
        println!(
            "  - {}: {}",
            action.application_id,
            stage.as_deref().unwrap_or("unknown")
        );
    }

    Ok(())
}
