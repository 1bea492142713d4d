use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, TimeZone, Utc};
use pipeline_repair::workflows::step_results::{
    files, Action, ActionExecutor, Application, ApplicationId, ApplicationStepResult,
    CandidateAccount, CrmQueries, CrmWriter, EffectCalculator, FieldHistoryRecord, FixPlanner,
    GatewayError, PlannedAction, SettleDelays, StepPipelineMapping, StepResultId,
    DEFAULT_BATCH_SIZE,
};

fn at(hour: u32, minute: u32, second: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, 2, hour, minute, second)
        .single()
        .expect("valid timestamp")
}

fn history(
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

fn application(id: &str, stage: &str, name: &str) -> Application {
    Application {
        id: ApplicationId(id.to_string()),
        stage_name: stage.to_string(),
        pipeline_id: "pipe-ops".to_string(),
        advertised_title: Some("Operations Lead".to_string()),
        account_id: "acc-ada".to_string(),
        last_active_stage: Some("English".to_string()),
        account: CandidateAccount {
            name: Some(name.to_string()),
            email: Some("ada@example.com".to_string()),
        },
    }
}

/// Small CRM snapshot: one graded English result with three applications.
struct SnapshotCrm {
    step_result: ApplicationStepResult,
    applications: Vec<Application>,
    mapping: StepPipelineMapping,
    history: Vec<FieldHistoryRecord>,
    stages: Mutex<HashMap<ApplicationId, String>>,
}

impl SnapshotCrm {
    fn new() -> Self {
        let applications = vec![
            application("opp-rejected", "Rejected", "Ada Lovelace"),
            application("opp-active", "English", "Ada Lovelace"),
            application("opp-late", "Offer", "Ada Lovelace"),
        ];
        let stages = applications
            .iter()
            .map(|application| (application.id.clone(), application.stage_name.clone()))
            .collect();

        Self {
            step_result: ApplicationStepResult {
                id: StepResultId("asr-english".to_string()),
                candidate_id: "acc-ada".to_string(),
                application_id: Some(ApplicationId("opp-rejected".to_string())),
                score: Some(41.0),
                raw_score: None,
                step_id: "step-english".to_string(),
                step_name: Some("English".to_string()),
                stage: Some("English".to_string()),
                threshold: Some(70.0),
                reject_threshold: Some(55.0),
                state: Some("Result_Failed".to_string()),
                badge_simulated: None,
                history: Vec::new(),
            },
            applications,
            mapping: StepPipelineMapping {
                pipeline_id: "pipe-ops".to_string(),
                step_id: "step-english".to_string(),
                pass_threshold: Some(70.0),
                reject_threshold: Some(55.0),
                retry_threshold: None,
                minimum_proficiency: None,
            },
            history: vec![
                history("asr-english", "State__c", "Result_Failed", at(14, 0, 5)),
                history("opp-rejected", "StageName", "Rejected", at(14, 0, 25)),
                history("opp-late", "StageName", "Offer", at(9, 12, 0)),
            ],
            stages: Mutex::new(stages),
        }
    }

    fn stage(&self, id: &str) -> Option<String> {
        self.stages
            .lock()
            .expect("stages mutex poisoned")
            .get(&ApplicationId(id.to_string()))
            .cloned()
    }
}

impl CrmQueries for SnapshotCrm {
    fn step_results(
        &self,
        ids: &[StepResultId],
    ) -> Result<Vec<ApplicationStepResult>, GatewayError> {
        Ok(ids
            .iter()
            .filter(|id| **id == self.step_result.id)
            .map(|_| self.step_result.clone())
            .collect())
    }

    fn applications_for_candidates(
        &self,
        ids: &[String],
    ) -> Result<Vec<Application>, GatewayError> {
        Ok(self
            .applications
            .iter()
            .filter(|application| ids.contains(&application.account_id))
            .cloned()
            .collect())
    }

    fn mappings_for_steps(
        &self,
        ids: &[String],
    ) -> Result<Vec<StepPipelineMapping>, GatewayError> {
        Ok(ids
            .iter()
            .filter(|id| **id == self.mapping.step_id)
            .map(|_| self.mapping.clone())
            .collect())
    }

    fn step_result_history(
        &self,
        ids: &[StepResultId],
    ) -> Result<Vec<FieldHistoryRecord>, GatewayError> {
        Ok(self
            .history
            .iter()
            .filter(|record| ids.iter().any(|id| id.0 == record.parent_id))
            .cloned()
            .collect())
    }

    fn application_history(
        &self,
        ids: &[ApplicationId],
    ) -> Result<Vec<FieldHistoryRecord>, GatewayError> {
        Ok(self
            .history
            .iter()
            .filter(|record| ids.iter().any(|id| id.0 == record.parent_id))
            .cloned()
            .collect())
    }
}

impl CrmWriter for SnapshotCrm {
    fn current_stage(&self, id: &ApplicationId) -> Result<Option<String>, GatewayError> {
        Ok(self.stage(&id.0))
    }

    fn update_stage(&self, id: &ApplicationId, stage: &str) -> Result<(), GatewayError> {
        self.stages
            .lock()
            .expect("stages mutex poisoned")
            .insert(id.clone(), stage.to_string());
        Ok(())
    }

    fn next_assessment_stage(&self, id: &ApplicationId) -> Result<Option<String>, GatewayError> {
        Ok(self.stage(&id.0))
    }
}

#[test]
fn corrected_english_score_restores_the_wrongly_rejected_application() {
    let crm = Arc::new(SnapshotCrm::new());
    let corrections = files::read_corrections(
        r#"[{"step_result_id": "asr-english", "score": 63}]"#.as_bytes(),
    )
    .expect("corrections parse");

    let planner = FixPlanner::new(crm.clone(), DEFAULT_BATCH_SIZE, EffectCalculator::default());
    let plan = planner.plan(&corrections).expect("planning succeeds");

    let decisions: Vec<(String, Action)> = plan.effects[0]
        .applications
        .iter()
        .map(|effect| (effect.application_id.0.clone(), effect.action))
        .collect();
    assert_eq!(
        decisions,
        vec![
            ("opp-rejected".to_string(), Action::Restore),
            ("opp-active".to_string(), Action::None),
            ("opp-late".to_string(), Action::None),
        ]
    );

    let mut actions_json = Vec::new();
    files::write_json(&mut actions_json, &plan.actions).expect("actions serialize");
    let actions: Vec<PlannedAction> =
        serde_json::from_slice(&actions_json).expect("actions round trip");

    let executor = ActionExecutor::new(crm.clone(), SettleDelays::NONE);
    let rows = executor.apply(&actions).expect("apply succeeds");
    assert_eq!(crm.stage("opp-rejected").as_deref(), Some("English"));

    let mut report = Vec::new();
    files::write_report_csv(&mut report, &rows).expect("report writes");
    let report = String::from_utf8(report).expect("utf8 report");
    assert_eq!(
        report,
        "action,application_id,title,candidate_email,candidate_name,outcome\n\
Restore,opp-rejected,Operations Lead,ada@example.com,Ada Lovelace,restored to English\n"
    );
}

#[test]
fn lower_score_rejects_early_applications_and_flags_late_ones() {
    let crm = Arc::new(SnapshotCrm::new());
    let planner = FixPlanner::new(crm.clone(), DEFAULT_BATCH_SIZE, EffectCalculator::default());

    let corrections = files::read_corrections(r#"["asr-english"]"#.as_bytes())
        .expect("corrections parse");
    let plan = planner.plan(&corrections).expect("planning succeeds");

    let planned: Vec<(&str, Action)> = plan
        .actions
        .iter()
        .map(|action| (action.application_id.0.as_str(), action.action))
        .collect();
    assert_eq!(
        planned,
        vec![("opp-active", Action::Reject), ("opp-late", Action::NotifyHm)]
    );

    let executor = ActionExecutor::new(crm.clone(), SettleDelays::NONE);
    let rows = executor.apply(&plan.actions).expect("apply succeeds");

    assert_eq!(crm.stage("opp-active").as_deref(), Some("Rejected"));
    assert_eq!(crm.stage("opp-late").as_deref(), Some("Offer"));
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[1].outcome, "hiring manager to decide");
}
