use clap::Args;
use pipeline_repair::config::AppConfig;
use pipeline_repair::error::AppError;
use pipeline_repair::telemetry;
use pipeline_repair::workflows::step_results::{
    files, ActionExecutor, CrmWriter, EffectCalculator, EffectConfig, ExecutionReportRow,
    FixPlanner, PlannedAction, SalesforceClient, ScoreCorrection, SettleDelays,
};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};

#[derive(Args, Debug)]
pub(crate) struct PlanArgs {
    /// JSON array of step result ids or {"step_result_id", "score"} objects
    #[arg(long)]
    pub(crate) corrections: PathBuf,
    /// Where to write the planned actions
    #[arg(long, default_value = "actions.json")]
    pub(crate) actions_out: PathBuf,
    /// Also write every calculated effect, including no-op decisions, for review
    #[arg(long)]
    pub(crate) effects_out: Option<PathBuf>,
    /// Override ASR_QUERY_BATCH_SIZE
    #[arg(long)]
    pub(crate) batch_size: Option<usize>,
    /// Override ASR_CAUSATION_TOLERANCE_MINUTES
    #[arg(long)]
    pub(crate) tolerance_minutes: Option<u32>,
}

#[derive(Args, Debug)]
pub(crate) struct ApplyArgs {
    /// Action plan written by `plan`
    #[arg(long, default_value = "actions.json")]
    pub(crate) actions: PathBuf,
    #[arg(long, default_value = "report.csv")]
    pub(crate) report_csv: PathBuf,
    #[arg(long, default_value = "report.json")]
    pub(crate) report_json: PathBuf,
    /// Do not wait for CRM automation between stage writes
    #[arg(long)]
    pub(crate) no_settle: bool,
}

pub(crate) async fn run_plan(args: PlanArgs) -> Result<(), AppError> {
    let mut config = load_config()?;
    if let Some(batch_size) = args.batch_size {
        config.reconciliation.query_batch_size = batch_size;
    }
    if let Some(tolerance) = args.tolerance_minutes {
        config.reconciliation.causation_tolerance_minutes = tolerance;
    }

    // The Salesforce client blocks, so it must live outside the async runtime.
    in_background(move || plan(&config, &args)).await
}

pub(crate) async fn run_apply(args: ApplyArgs) -> Result<(), AppError> {
    let config = load_config()?;
    in_background(move || apply(&config, &args)).await
}

fn plan(config: &AppConfig, args: &PlanArgs) -> Result<(), AppError> {
    let corrections: Vec<ScoreCorrection> = files::load(&args.corrections)?;
    info!(
        corrections = corrections.len(),
        path = %args.corrections.display(),
        "loaded score corrections"
    );

    let calculator = EffectCalculator::new(EffectConfig::from(&config.reconciliation));
    let planner = FixPlanner::new(
        Arc::new(connect(config)?),
        config.reconciliation.query_batch_size,
        calculator,
    );
    let plan = planner.plan(&corrections)?;

    write_json(&args.actions_out, &plan.actions)?;
    if let Some(path) = &args.effects_out {
        write_json(path, &plan.effects)?;
    }

    info!(
        actions = plan.actions.len(),
        unscored = plan.unscored.len(),
        conflicting = plan.conflicting.len(),
        path = %args.actions_out.display(),
        "action plan written"
    );
    Ok(())
}

fn apply(config: &AppConfig, args: &ApplyArgs) -> Result<(), AppError> {
    let actions: Vec<PlannedAction> = files::load(&args.actions)?;
    let delays = if args.no_settle {
        SettleDelays::NONE
    } else {
        SettleDelays::from(&config.reconciliation)
    };

    let executor = ActionExecutor::new(Arc::new(connect(config)?), delays);
    execute_and_report(&executor, &actions, args)
}

/// Writes the report even when the run aborts, so every write already made is recorded.
fn execute_and_report<W: CrmWriter>(
    executor: &ActionExecutor<W>,
    actions: &[PlannedAction],
    args: &ApplyArgs,
) -> Result<(), AppError> {
    match executor.apply(actions) {
        Ok(rows) => {
            write_report(args, &rows)?;
            info!(
                processed = rows.len(),
                planned = actions.len(),
                csv = %args.report_csv.display(),
                json = %args.report_json.display(),
                "execution report written"
            );
            Ok(())
        }
        Err(err) => {
            write_report(args, err.completed())?;
            warn!(
                processed = err.completed().len(),
                planned = actions.len(),
                csv = %args.report_csv.display(),
                "partial execution report written"
            );
            Err(err.into())
        }
    }
}

fn write_report(args: &ApplyArgs, rows: &[ExecutionReportRow]) -> Result<(), AppError> {
    let mut csv = files::create(&args.report_csv)?;
    files::write_report_csv(&mut csv, rows)?;
    csv.flush()?;
    write_json(&args.report_json, rows)
}

fn load_config() -> Result<AppConfig, AppError> {
    let config = AppConfig::load()?;
    telemetry::init(&config.telemetry)?;
    Ok(config)
}

fn connect(config: &AppConfig) -> Result<SalesforceClient, AppError> {
    let (instance_url, access_token) = config.salesforce.credentials()?;
    Ok(SalesforceClient::new(
        instance_url,
        access_token,
        &config.salesforce.api_version,
    )?)
}

fn write_json<T: serde::Serialize + ?Sized>(path: &Path, value: &T) -> Result<(), AppError> {
    let mut writer = files::create(path)?;
    files::write_json(&mut writer, value)?;
    writer.flush()?;
    Ok(())
}

async fn in_background<F>(task: F) -> Result<(), AppError>
where
    F: FnOnce() -> Result<(), AppError> + Send + 'static,
{
    tokio::task::spawn_blocking(task)
        .await
        .map_err(|err| AppError::Task(err.to_string()))?
}
