use chrono::{DateTime, TimeZone, Utc};
use metrics_exporter_prometheus::PrometheusHandle;
use pipeline_repair::workflows::step_results::{
    Application, ApplicationId, ApplicationStepResult, CandidateAccount, CrmQueries, CrmWriter,
    FieldHistoryRecord, GatewayError, ProficiencyRequirement, StepPipelineMapping, StepResultId,
};
use std::collections::HashMap;
use std::sync::atomic::AtomicBool;
use std::sync::{Arc, Mutex, MutexGuard};

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) readiness: Arc<AtomicBool>,
    pub(crate) metrics: Arc<PrometheusHandle>,
}

pub(crate) const CCAT_RESULT: &str = "a0XA0000ASR1";
pub(crate) const ENGLISH_RESULT: &str = "a0XA0000ASR2";

const ENGINEERING: &str = "a0PA000ENG";
const SUPPORT: &str = "a0PA000SUP";
const CCAT_STEP: &str = "a0SA000CCAT";
const ENGLISH_STEP: &str = "a0SA000ENGL";

/// CRM snapshot held in memory for the demo and the service tests.
pub(crate) struct SampleCrm {
    step_results: Vec<ApplicationStepResult>,
    applications: Vec<Application>,
    mappings: Vec<StepPipelineMapping>,
    history: Vec<FieldHistoryRecord>,
    next_stages: HashMap<ApplicationId, String>,
    stages: Mutex<HashMap<ApplicationId, String>>,
}

impl SampleCrm {
    /// Two candidates: one wrongly rejected by a mis-scored CCAT and one whose graded
    /// English badge falls short of the required proficiency.
    pub(crate) fn seeded() -> Self {
        let applications = vec![
            application("006A000APP1", "Rejected", ENGINEERING, ada()),
            application("006A000APP2", "Interview", SUPPORT, ada()),
            application("006A000APP3", "English", ENGINEERING, lin()),
        ];
        let stages = applications
            .iter()
            .map(|application| (application.id.clone(), application.stage_name.clone()))
            .collect();

        Self {
            step_results: vec![
                step_result(CCAT_RESULT, "001A000001ADA", CCAT_STEP, "CCAT", 52.0, None),
                step_result(
                    ENGLISH_RESULT,
                    "001A000002LIN",
                    ENGLISH_STEP,
                    "English",
                    71.0,
                    Some(false),
                ),
            ],
            applications,
            mappings: vec![
                mapping(ENGINEERING, CCAT_STEP, 60.0, None),
                mapping(SUPPORT, CCAT_STEP, 60.0, None),
                mapping(
                    ENGINEERING,
                    ENGLISH_STEP,
                    65.0,
                    Some(ProficiencyRequirement {
                        stars: 4.0,
                        pass_threshold: 80.0,
                    }),
                ),
            ],
            history: vec![
                record(CCAT_RESULT, "State__c", "Result_Failed", at(10, 15, 2)),
                record("006A000APP1", "StageName", "CCAT", at(9, 58, 40)),
                record("006A000APP1", "StageName", "Rejected", at(10, 15, 31)),
                record(ENGLISH_RESULT, "State__c", "Result_Failed", at(11, 2, 0)),
            ],
            next_stages: HashMap::from([(
                ApplicationId("006A000APP1".to_string()),
                "English".to_string(),
            )]),
            stages: Mutex::new(stages),
        }
    }

    pub(crate) fn stage_of(&self, id: &ApplicationId) -> Result<Option<String>, GatewayError> {
        Ok(self.lock_stages()?.get(id).cloned())
    }

    fn lock_stages(&self) -> Result<MutexGuard<'_, HashMap<ApplicationId, String>>, GatewayError> {
        self.stages
            .lock()
            .map_err(|_| GatewayError::Transport("sample crm state poisoned".to_string()))
    }

    fn history_for(&self, parents: &[&str]) -> Vec<FieldHistoryRecord> {
        self.history
            .iter()
            .filter(|record| parents.contains(&record.parent_id.as_str()))
            .cloned()
            .collect()
    }
}

impl CrmQueries for SampleCrm {
    fn step_results(
        &self,
        ids: &[StepResultId],
    ) -> Result<Vec<ApplicationStepResult>, GatewayError> {
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
        let stages = self.lock_stages()?;
        Ok(self
            .applications
            .iter()
            .filter(|application| candidate_ids.contains(&application.account_id))
            .map(|application| {
                let mut current = application.clone();
                if let Some(stage) = stages.get(&application.id) {
                    current.stage_name = stage.clone();
                }
                current
            })
            .collect())
    }

    fn mappings_for_steps(
        &self,
        step_ids: &[String],
    ) -> Result<Vec<StepPipelineMapping>, GatewayError> {
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
        let parents: Vec<&str> = ids.iter().map(|id| id.0.as_str()).collect();
        Ok(self.history_for(&parents))
    }

    fn application_history(
        &self,
        ids: &[ApplicationId],
    ) -> Result<Vec<FieldHistoryRecord>, GatewayError> {
        let parents: Vec<&str> = ids.iter().map(|id| id.0.as_str()).collect();
        Ok(self.history_for(&parents))
    }
}

impl CrmWriter for SampleCrm {
    fn current_stage(&self, id: &ApplicationId) -> Result<Option<String>, GatewayError> {
        self.stage_of(id)
    }

    fn update_stage(&self, id: &ApplicationId, stage: &str) -> Result<(), GatewayError> {
        let mut stages = self.lock_stages()?;
        match stages.get_mut(id) {
            Some(current) => {
                *current = stage.to_string();
                Ok(())
            }
            None => Err(GatewayError::Rejected {
                status: 404,
                body: format!("no application {id}"),
            }),
        }
    }

    fn next_assessment_stage(&self, id: &ApplicationId) -> Result<Option<String>, GatewayError> {
        match self.next_stages.get(id) {
            Some(next) => Ok(Some(next.clone())),
            None => self.stage_of(id),
        }
    }
}

fn at(hour: u32, minute: u32, second: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 5, 14, hour, minute, second)
        .single()
        .unwrap_or_default()
}

fn ada() -> (&'static str, CandidateAccount) {
    (
        "001A000001ADA",
        CandidateAccount {
            name: Some("Ada Okafor".to_string()),
            email: Some("ada.okafor@example.com".to_string()),
        },
    )
}

fn lin() -> (&'static str, CandidateAccount) {
    (
        "001A000002LIN",
        CandidateAccount {
            name: Some("Lin Park".to_string()),
            email: Some("lin.park@example.com".to_string()),
        },
    )
}

fn application(
    id: &str,
    stage: &str,
    pipeline: &str,
    (account_id, account): (&str, CandidateAccount),
) -> Application {
    let title = if pipeline == SUPPORT {
        "Support Engineer"
    } else {
        "Backend Engineer"
    };
    Application {
        id: ApplicationId(id.to_string()),
        stage_name: stage.to_string(),
        pipeline_id: pipeline.to_string(),
        advertised_title: Some(title.to_string()),
        account_id: account_id.to_string(),
        last_active_stage: Some("CCAT".to_string()),
        account,
    }
}

fn step_result(
    id: &str,
    candidate: &str,
    step: &str,
    stage: &str,
    score: f64,
    badge_simulated: Option<bool>,
) -> ApplicationStepResult {
    ApplicationStepResult {
        id: StepResultId(id.to_string()),
        candidate_id: candidate.to_string(),
        application_id: None,
        score: Some(score),
        raw_score: None,
        step_id: step.to_string(),
        step_name: Some(stage.to_string()),
        stage: Some(stage.to_string()),
        threshold: None,
        reject_threshold: None,
        state: Some("Result_Failed".to_string()),
        badge_simulated,
        history: Vec::new(),
    }
}

fn mapping(
    pipeline: &str,
    step: &str,
    reject_threshold: f64,
    minimum_proficiency: Option<ProficiencyRequirement>,
) -> StepPipelineMapping {
    StepPipelineMapping {
        pipeline_id: pipeline.to_string(),
        step_id: step.to_string(),
        pass_threshold: None,
        reject_threshold: Some(reject_threshold),
        retry_threshold: None,
        minimum_proficiency,
    }
}

fn record(
    parent: &str,
    field: &str,
    value: &str,
    created_at: DateTime<Utc>,
) -> FieldHistoryRecord {
    FieldHistoryRecord {
        created_at,
        field: field.to_string(),
        old_value: None,
        new_value: Some(value.to_string()),
        parent_id: parent.to_string(),
    }
}
