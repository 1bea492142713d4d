use super::domain::{
    Application, ApplicationId, ApplicationStepResult, FieldHistoryRecord, StepPipelineMapping,
    StepResultId,
};

/// Read side of the CRM. Every method is a single batched query keyed by an id set.
///
/// Implementations must answer an empty id set with an empty result.
pub trait CrmQueries: Send + Sync {
    fn step_results(&self, ids: &[StepResultId])
        -> Result<Vec<ApplicationStepResult>, GatewayError>;
    fn applications_for_candidates(
        &self,
        candidate_ids: &[String],
    ) -> Result<Vec<Application>, GatewayError>;
    fn mappings_for_steps(&self, step_ids: &[String])
        -> Result<Vec<StepPipelineMapping>, GatewayError>;
    /// Step result history, newest first.
    fn step_result_history(
        &self,
        ids: &[StepResultId],
    ) -> Result<Vec<FieldHistoryRecord>, GatewayError>;
    /// Application field history, newest first.
    fn application_history(
        &self,
        ids: &[ApplicationId],
    ) -> Result<Vec<FieldHistoryRecord>, GatewayError>;
}

/// Write side of the CRM used when applying planned actions.
pub trait CrmWriter: Send + Sync {
    fn current_stage(&self, id: &ApplicationId) -> Result<Option<String>, GatewayError>;
    fn update_stage(&self, id: &ApplicationId, stage: &str) -> Result<(), GatewayError>;
    /// Runs the CRM procedure that works out which assessment stage the application
    /// belongs in. `None` when the procedure reports no answer.
    fn next_assessment_stage(&self, id: &ApplicationId) -> Result<Option<String>, GatewayError>;
}

/// Error enumeration for CRM failures.
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("crm request failed: {0}")]
    Transport(String),
    #[error("crm rejected the request ({status}): {body}")]
    Rejected { status: u16, body: String },
    #[error("unexpected crm payload: {0}")]
    Payload(String),
}
