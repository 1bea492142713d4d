//! Application Step Result correction workflow.
//!
//! The finder gathers each corrected step result with the applications it can affect,
//! the effect calculator decides what the corrected score means for each of them, the
//! planner turns decisions into actions and the executor applies those actions to the
//! CRM.

pub mod domain;
pub(crate) mod effect;
pub mod executor;
pub mod files;
pub mod finder;
pub mod gateway;
pub mod planner;
pub mod router;
pub mod salesforce;

#[cfg(test)]
mod tests;

pub use domain::{
    Action, AffectedApplication, AffectedApplications, Application, ApplicationId,
    ApplicationStepResult, CandidateAccount, FieldHistoryRecord, ProficiencyRequirement, Stage,
    StepPipelineMapping, StepResultId,
};
pub use effect::{ApplicationEffect, Causation, EffectCalculator, EffectConfig, StepResultEffect};
pub use executor::{ActionExecutor, ExecutionReportRow, ExecutorError, SettleDelays};
pub use files::FileError;
pub use finder::{AffectedApplicationFinder, FinderError, DEFAULT_BATCH_SIZE};
pub use gateway::{CrmQueries, CrmWriter, GatewayError};
pub use planner::{
    CandidateSummary, FixPlan, FixPlanner, PlannedAction, PlannerError, ScoreCorrection,
};
pub use router::{effect_router, EffectRequest};
pub use salesforce::SalesforceClient;
