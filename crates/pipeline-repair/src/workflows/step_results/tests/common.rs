use std::collections::HashMap;
use std::sync::Mutex;

use axum::response::Response;
use chrono::{DateTime, Duration, TimeZone, Utc};
use serde_json::Value;

use crate::workflows::step_results::domain::{
    AffectedApplication, AffectedApplications, Application, ApplicationId, ApplicationStepResult,
    CandidateAccount, FieldHistoryRecord, ProficiencyRequirement, StepPipelineMapping,
    StepResultId,
};
use crate::workflows::step_results::gateway::{CrmQueries, CrmWriter, GatewayError};

pub(super) const CANDIDATE: &str = "001-candidate";
pub(super) const STEP: &str = "a0S-ccat";
pub(super) const PIPELINE: &str = "a0P-engineering";

pub(super) fn at(seconds: i64) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 5, 14, 9, 30, 0)
        .single()
        .expect("valid timestamp")
        + Duration::seconds(seconds)
}

pub(super) fn step_result(id: &str) -> ApplicationStepResult {
    ApplicationStepResult {
        id: StepResultId(id.to_string()),
        candidate_id: CANDIDATE.to_string(),
        application_id: Some(ApplicationId("006-primary".to_string())),
        score: Some(60.0),
        raw_score: Some(24.0),
        step_id: STEP.to_string(),
        step_name: Some("CCAT".to_string()),
        stage: Some("CCAT".to_string()),
        threshold: Some(90.0),
        reject_threshold: Some(75.0),
        state: Some("Result_Failed".to_string()),
        badge_simulated: Some(true),
        history: Vec::new(),
    }
}

pub(super) fn application(id: &str, stage: &str) -> Application {
    Application {
        id: ApplicationId(id.to_string()),
        stage_name: stage.to_string(),
        pipeline_id: PIPELINE.to_string(),
        advertised_title: Some("Senior Software Engineer".to_string()),
        account_id: CANDIDATE.to_string(),
        last_active_stage: Some("CCAT".to_string()),
        account: CandidateAccount {
            name: Some("Grace Hopper".to_string()),
            email: Some("grace@example.com".to_string()),
        },
    }
}

pub(super) fn mapping(reject_threshold: f64) -> StepPipelineMapping {
    StepPipelineMapping {
        pipeline_id: PIPELINE.to_string(),
        step_id: STEP.to_string(),
        pass_threshold: Some(90.0),
        reject_threshold: Some(reject_threshold),
        retry_threshold: None,
        minimum_proficiency: None,
    }
}

pub(super) fn badge_mapping(reject_threshold: f64, badge_pass: f64) -> StepPipelineMapping {
    StepPipelineMapping {
        minimum_proficiency: Some(ProficiencyRequirement {
            stars: 3.0,
            pass_threshold: badge_pass,
        }),
        ..mapping(reject_threshold)
    }
}

pub(super) fn transition(
    parent: &str,
    field: &str,
    value: &str,
    seconds: i64,
) -> FieldHistoryRecord {
    FieldHistoryRecord {
        created_at: at(seconds),
        field: field.to_string(),
        old_value: None,
        new_value: Some(value.to_string()),
        parent_id: parent.to_string(),
    }
}

pub(super) fn failed_at(step_result_id: &str, seconds: i64) -> FieldHistoryRecord {
    transition(step_result_id, "State__c", "Result_Failed", seconds)
}

pub(super) fn rejected_at(application_id: &str, seconds: i64) -> FieldHistoryRecord {
    transition(application_id, "StageName", "Rejected", seconds)
}

/// A single step result with one affected application at `stage`.
pub(super) fn affected(stage: &str, mapping: StepPipelineMapping) -> AffectedApplications {
    AffectedApplications {
        step_result: step_result("a0X-1"),
        applications: vec![AffectedApplication {
            application: application("006-primary", stage),
            mapping,
            history: Vec::new(),
        }],
    }
}

/// A rejected application whose rejection landed `gap_seconds` after the step result failed.
pub(super) fn rejected_with_gap(
    mapping: StepPipelineMapping,
    badge_simulated: Option<bool>,
    gap_seconds: i64,
) -> AffectedApplications {
    let mut data = affected("Rejected", mapping);
    data.step_result.badge_simulated = badge_simulated;
    data.step_result.history = vec![failed_at("a0X-1", 0)];
    data.applications[0].history = vec![
        rejected_at("006-primary", gap_seconds),
        transition("006-primary", "StageName", "CCAT", -3600),
    ];
    data
}

pub(super) async fn read_json_body(response: Response) -> Value {
    let body = axum::body::to_bytes(response.into_body(), 64 * 1024)
        .await
        .expect("read body");
    serde_json::from_slice(&body).expect("json payload")
}

/// In-memory CRM double recording every call it receives.
#[derive(Default)]
pub(super) struct MemoryCrm {
    pub(super) step_results: Vec<ApplicationStepResult>,
    pub(super) applications: Vec<Application>,
    pub(super) mappings: Vec<StepPipelineMapping>,
    pub(super) step_history: Vec<FieldHistoryRecord>,
    pub(super) application_history: Vec<FieldHistoryRecord>,
    pub(super) next_stages: HashMap<ApplicationId, String>,
    pub(super) stages: Mutex<HashMap<ApplicationId, String>>,
    pub(super) calls: Mutex<Vec<String>>,
}

impl MemoryCrm {
    pub(super) fn calls(&self) -> Vec<String> {
        self.calls.lock().expect("calls mutex poisoned").clone()
    }

    pub(super) fn stage_of(&self, id: &str) -> Option<String> {
        self.current_stage(&ApplicationId(id.to_string()))
            .expect("memory crm never fails")
    }

    fn record(&self, call: String) {
        self.calls.lock().expect("calls mutex poisoned").push(call);
    }
}

impl CrmQueries for MemoryCrm {
    fn step_results(
        &self,
        ids: &[StepResultId],
    ) -> Result<Vec<ApplicationStepResult>, GatewayError> {
        self.record(format!("step_results:{}", ids.len()));
        Ok(self
            .step_results
            .iter()
            .filter(|record| ids.contains(&record.id))
            .cloned()
            .collect())
    }

    fn applications_for_candidates(
        &self,
        candidate_ids: &[String],
    ) -> Result<Vec<Application>, GatewayError> {
        self.record(format!("applications:{}", candidate_ids.len()));
        Ok(self
            .applications
            .iter()
            .filter(|application| candidate_ids.contains(&application.account_id))
            .cloned()
            .collect())
    }

    fn mappings_for_steps(
        &self,
        step_ids: &[String],
    ) -> Result<Vec<StepPipelineMapping>, GatewayError> {
        self.record(format!("mappings:{}", step_ids.len()));
        Ok(self
            .mappings
            .iter()
            .filter(|mapping| step_ids.contains(&mapping.step_id))
            .cloned()
            .collect())
    }

    fn step_result_history(
        &self,
        ids: &[StepResultId],
    ) -> Result<Vec<FieldHistoryRecord>, GatewayError> {
        self.record(format!("step_history:{}", ids.len()));
        Ok(self
            .step_history
            .iter()
            .filter(|record| ids.iter().any(|id| id.0 == record.parent_id))
            .cloned()
            .collect())
    }

    fn application_history(
        &self,
        ids: &[ApplicationId],
    ) -> Result<Vec<FieldHistoryRecord>, GatewayError> {
        self.record(format!("application_history:{}", ids.len()));
        Ok(self
            .application_history
            .iter()
            .filter(|record| ids.iter().any(|id| id.0 == record.parent_id))
            .cloned()
            .collect())
    }
}

impl CrmWriter for MemoryCrm {
    fn current_stage(&self, id: &ApplicationId) -> Result<Option<String>, GatewayError> {
        let written = self
            .stages
            .lock()
            .expect("stages mutex poisoned")
            .get(id)
            .cloned();
        Ok(written.or_else(|| {
            self.applications
                .iter()
                .find(|application| &application.id == id)
                .map(|application| application.stage_name.clone())
        }))
    }

    fn update_stage(&self, id: &ApplicationId, stage: &str) -> Result<(), GatewayError> {
        self.record(format!("update:{}:{}", id, stage));
        self.stages
            .lock()
            .expect("stages mutex poisoned")
            .insert(id.clone(), stage.to_string());
        Ok(())
    }

    fn next_assessment_stage(&self, id: &ApplicationId) -> Result<Option<String>, GatewayError> {
        self.record(format!("next:{}", id));
        Ok(self.next_stages.get(id).cloned())
    }
}

/// Gateway whose every call fails, for abort-on-error checks.
pub(super) struct OfflineCrm;

fn offline<T>() -> Result<T, GatewayError> {
    Err(GatewayError::Transport("crm offline".to_string()))
}

impl CrmQueries for OfflineCrm {
    fn step_results(
        &self,
        _ids: &[StepResultId],
    ) -> Result<Vec<ApplicationStepResult>, GatewayError> {
        offline()
    }

    fn applications_for_candidates(
        &self,
        _ids: &[String],
    ) -> Result<Vec<Application>, GatewayError> {
        offline()
    }

    fn mappings_for_steps(
        &self,
        _ids: &[String],
    ) -> Result<Vec<StepPipelineMapping>, GatewayError> {
        offline()
    }

    fn step_result_history(
        &self,
        _ids: &[StepResultId],
    ) -> Result<Vec<FieldHistoryRecord>, GatewayError> {
        offline()
    }

    fn application_history(
        &self,
        _ids: &[ApplicationId],
    ) -> Result<Vec<FieldHistoryRecord>, GatewayError> {
        offline()
    }
}

impl CrmWriter for OfflineCrm {
    fn current_stage(&self, _id: &ApplicationId) -> Result<Option<String>, GatewayError> {
        offline()
    }

    fn update_stage(&self, _id: &ApplicationId, _stage: &str) -> Result<(), GatewayError> {
        offline()
    }

    fn next_assessment_stage(&self, _id: &ApplicationId) -> Result<Option<String>, GatewayError> {
        offline()
    }
}

/// Writer that accepts `healthy_writes` stage updates and times out afterwards.
pub(super) struct FlakyWriter {
    healthy_writes: usize,
    pub(super) written: Mutex<Vec<String>>,
}

impl FlakyWriter {
    pub(super) fn failing_after(healthy_writes: usize) -> Self {
        Self {
            healthy_writes,
            written: Mutex::new(Vec::new()),
        }
    }

    pub(super) fn written(&self) -> Vec<String> {
        self.written.lock().expect("writes mutex poisoned").clone()
    }
}

impl CrmWriter for FlakyWriter {
    fn current_stage(&self, _id: &ApplicationId) -> Result<Option<String>, GatewayError> {
        Ok(Some("Rejected".to_string()))
    }

    fn update_stage(&self, id: &ApplicationId, stage: &str) -> Result<(), GatewayError> {
        let mut written = self.written.lock().expect("writes mutex poisoned");
        if written.len() >= self.healthy_writes {
            return Err(GatewayError::Transport("timeout".to_string()));
        }
        written.push(format!("{id}:{stage}"));
        Ok(())
    }

    fn next_assessment_stage(&self, _id: &ApplicationId) -> Result<Option<String>, GatewayError> {
        Ok(None)
    }
}
