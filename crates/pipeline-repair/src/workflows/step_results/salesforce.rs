//! Salesforce REST adapter for the CRM gateway traits.
//!
//! Queries go through the SOQL `query` endpoint and follow `nextRecordsUrl` until the
//! result set is exhausted. Stage writes patch the Opportunity record and the next
//! assessment stage comes from an autolaunched flow.

use std::time::Duration;

use chrono::{DateTime, Utc};
use reqwest::blocking::{Client, RequestBuilder};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};

use super::domain::{
    Application, ApplicationId, ApplicationStepResult, CandidateAccount, FieldHistoryRecord,
    ProficiencyRequirement, StepPipelineMapping, StepResultId,
};
use super::gateway::{CrmQueries, CrmWriter, GatewayError};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);
const NEXT_STAGE_FLOW: &str = "GetNextApplicationAssessmentStage_subflow";

/// Thin blocking client over the Salesforce REST API.
#[derive(Debug, Clone)]
pub struct SalesforceClient {
    client: Client,
    instance_url: String,
    api_version: String,
    access_token: String,
}

impl SalesforceClient {
    pub fn new(
        instance_url: &str,
        access_token: &str,
        api_version: &str,
    ) -> Result<Self, GatewayError> {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|err| GatewayError::Transport(err.to_string()))?;
        Ok(Self {
            client,
            instance_url: instance_url.trim_end_matches('/').to_string(),
            api_version: api_version.trim_start_matches('v').to_string(),
            access_token: access_token.to_string(),
        })
    }

    fn data_url(&self, path: &str) -> String {
        format!(
            "{}/services/data/v{}/{}",
            self.instance_url, self.api_version, path
        )
    }

    fn query<T: DeserializeOwned>(&self, soql: &str) -> Result<Vec<T>, GatewayError> {
        let request = self.client.get(self.data_url("query")).query(&[("q", soql)]);
        let mut page: QueryPage<T> = self.send(request)?;
        let mut records = std::mem::take(&mut page.records);

        while let (false, Some(next)) = (page.done, page.next_records_url.take()) {
            let request = self.client.get(format!("{}{}", self.instance_url, next));
            page = self.send(request)?;
            records.append(&mut page.records);
        }

        Ok(records)
    }

    fn send<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T, GatewayError> {
        let body = self.execute(request)?;
        serde_json::from_str(&body).map_err(|err| GatewayError::Payload(err.to_string()))
    }

    fn execute(&self, request: RequestBuilder) -> Result<String, GatewayError> {
        let response = request
            .bearer_auth(&self.access_token)
            .send()
            .map_err(|err| GatewayError::Transport(err.to_string()))?;
        let status = response.status();
        let body = response
            .text()
            .map_err(|err| GatewayError::Transport(err.to_string()))?;
        if !status.is_success() {
            return Err(GatewayError::Rejected {
                status: status.as_u16(),
                body,
            });
        }
        Ok(body)
    }
}

impl CrmQueries for SalesforceClient {
    fn step_results(
        &self,
        ids: &[StepResultId],
    ) -> Result<Vec<ApplicationStepResult>, GatewayError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let rows: Vec<StepResultRow> =
            self.query(&soql::step_results(ids.iter().map(|id| id.0.as_str())))?;
        Ok(rows.into_iter().map(StepResultRow::into_domain).collect())
    }

    fn applications_for_candidates(
        &self,
        candidate_ids: &[String],
    ) -> Result<Vec<Application>, GatewayError> {
        if candidate_ids.is_empty() {
            return Ok(Vec::new());
        }
        let rows: Vec<ApplicationRow> = self.query(&soql::applications_for_candidates(
            candidate_ids.iter().map(String::as_str),
        ))?;
        Ok(rows.into_iter().map(ApplicationRow::into_domain).collect())
    }

    fn mappings_for_steps(
        &self,
        step_ids: &[String],
    ) -> Result<Vec<StepPipelineMapping>, GatewayError> {
        if step_ids.is_empty() {
            return Ok(Vec::new());
        }
        let rows: Vec<MappingRow> =
            self.query(&soql::mappings_for_steps(step_ids.iter().map(String::as_str)))?;
        Ok(rows.into_iter().map(MappingRow::into_domain).collect())
    }

    fn step_result_history(
        &self,
        ids: &[StepResultId],
    ) -> Result<Vec<FieldHistoryRecord>, GatewayError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let rows: Vec<HistoryRow> =
            self.query(&soql::step_result_history(ids.iter().map(|id| id.0.as_str())))?;
        rows.into_iter().map(HistoryRow::into_domain).collect()
    }

    fn application_history(
        &self,
        ids: &[ApplicationId],
    ) -> Result<Vec<FieldHistoryRecord>, GatewayError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let rows: Vec<HistoryRow> =
            self.query(&soql::application_history(ids.iter().map(|id| id.0.as_str())))?;
        rows.into_iter().map(HistoryRow::into_domain).collect()
    }
}

impl CrmWriter for SalesforceClient {
    fn current_stage(&self, id: &ApplicationId) -> Result<Option<String>, GatewayError> {
        let rows: Vec<StageRow> = self.query(&soql::current_stage(&id.0))?;
        Ok(rows.into_iter().next().and_then(|row| row.stage_name))
    }

    fn update_stage(&self, id: &ApplicationId, stage: &str) -> Result<(), GatewayError> {
        let url = self.data_url(&format!("sobjects/Opportunity/{}", id.0));
        self.execute(self.client.patch(url).json(&json!({ "StageName": stage })))?;
        Ok(())
    }

    fn next_assessment_stage(&self, id: &ApplicationId) -> Result<Option<String>, GatewayError> {
        let url = self.data_url(&format!("actions/custom/flow/{NEXT_STAGE_FLOW}"));
        let request = self
            .client
            .post(url)
            .json(&json!({ "inputs": [{ "iVarT_ApplicationId": id.0 }] }));
        let outputs: Vec<FlowOutput> = self.send(request)?;
        Ok(outputs
            .into_iter()
            .next()
            .filter(|output| output.is_success)
            .and_then(|output| output.output_values)
            .and_then(|values| values.application_stage))
    }
}

pub(crate) mod soql {
    /// Quotes ids for a SOQL `IN (...)` list.
    pub(crate) fn id_list<'a>(ids: impl Iterator<Item = &'a str>) -> String {
        ids.map(quote).collect::<Vec<_>>().join(",")
    }

    pub(crate) fn quote(value: &str) -> String {
        format!("'{}'", value.replace('\\', "\\\\").replace('\'', "\\'"))
    }

    pub(crate) fn step_results<'a>(ids: impl Iterator<Item = &'a str>) -> String {
        format!(
            "SELECT Id, Candidate__c, ApplicationId__c, Score__c, Raw_Score__c, \
             Application_Step_Id__c, Application_Step_Id__r.Name, Application_Stage__c, \
             Threshold__c, Reject_Threshold__c, State__c, Badge_Simulated__c \
             FROM Application_Step_Result__c WHERE Id IN ({})",
            id_list(ids)
        )
    }

    pub(crate) fn applications_for_candidates<'a>(ids: impl Iterator<Item = &'a str>) -> String {
        format!(
            "SELECT Id, StageName, Pipeline__c, Advertised_Title__c, AccountId, \
             Last_Active_Stage__c, Account.Name, Account.PersonEmail \
             FROM Opportunity WHERE AccountId IN ({})",
            id_list(ids)
        )
    }

    pub(crate) fn mappings_for_steps<'a>(ids: impl Iterator<Item = &'a str>) -> String {
        format!(
            "SELECT ApplicationStepId__c, PipelineId__c, Pass_Threshold__c, \
             Reject_Threshold__c, Retry_Threshold__c, Minimum_Proficiency__r.Stars__c, \
             Minimum_Proficiency__r.Pass_Threshold__c \
             FROM ApplicationStepPipelineMapping__c WHERE ApplicationStepId__c IN ({})",
            id_list(ids)
        )
    }

    pub(crate) fn step_result_history<'a>(ids: impl Iterator<Item = &'a str>) -> String {
        format!(
            "SELECT CreatedDate, ParentId, Field, OldValue, NewValue \
             FROM Application_Step_Result__History WHERE ParentId IN ({}) \
             ORDER BY CreatedDate DESC",
            id_list(ids)
        )
    }

    pub(crate) fn application_history<'a>(ids: impl Iterator<Item = &'a str>) -> String {
        format!(
            "SELECT CreatedDate, OpportunityId, Field, OldValue, NewValue \
             FROM OpportunityFieldHistory WHERE OpportunityId IN ({}) \
             ORDER BY CreatedDate DESC",
            id_list(ids)
        )
    }

    pub(crate) fn current_stage(id: &str) -> String {
        format!("SELECT StageName FROM Opportunity WHERE Id = {}", quote(id))
    }
}

#[derive(Debug, Deserialize)]
#[serde(bound(deserialize = "T: DeserializeOwned"))]
struct QueryPage<T> {
    #[serde(default = "Vec::new")]
    records: Vec<T>,
    #[serde(default = "default_done")]
    done: bool,
    #[serde(rename = "nextRecordsUrl")]
    next_records_url: Option<String>,
}

fn default_done() -> bool {
    true
}

#[derive(Debug, Deserialize)]
struct NameRef {
    #[serde(rename = "Name")]
    name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct StepResultRow {
    #[serde(rename = "Id")]
    id: String,
    #[serde(rename = "Candidate__c")]
    candidate: Option<String>,
    #[serde(rename = "ApplicationId__c")]
    application: Option<String>,
    #[serde(rename = "Score__c")]
    score: Option<f64>,
    #[serde(rename = "Raw_Score__c")]
    raw_score: Option<f64>,
    #[serde(rename = "Application_Step_Id__c")]
    step: Option<String>,
    #[serde(rename = "Application_Step_Id__r")]
    step_ref: Option<NameRef>,
    #[serde(rename = "Application_Stage__c")]
    stage: Option<String>,
    #[serde(rename = "Threshold__c")]
    threshold: Option<f64>,
    #[serde(rename = "Reject_Threshold__c")]
    reject_threshold: Option<f64>,
    #[serde(rename = "State__c")]
    state: Option<String>,
    #[serde(rename = "Badge_Simulated__c")]
    badge_simulated: Option<String>,
}

impl StepResultRow {
    fn into_domain(self) -> ApplicationStepResult {
        ApplicationStepResult {
            id: StepResultId(self.id),
            candidate_id: self.candidate.unwrap_or_default(),
            application_id: self.application.map(ApplicationId),
            score: self.score,
            raw_score: self.raw_score,
            step_id: self.step.unwrap_or_default(),
            step_name: self.step_ref.and_then(|step| step.name),
            stage: self.stage,
            threshold: self.threshold,
            reject_threshold: self.reject_threshold,
            state: self.state,
            badge_simulated: match self.badge_simulated.as_deref() {
                Some("Yes") => Some(true),
                Some("No") => Some(false),
                _ => None,
            },
            history: Vec::new(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct AccountRef {
    #[serde(rename = "Name")]
    name: Option<String>,
    #[serde(rename = "PersonEmail")]
    email: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApplicationRow {
    #[serde(rename = "Id")]
    id: String,
    #[serde(rename = "StageName")]
    stage_name: Option<String>,
    #[serde(rename = "Pipeline__c")]
    pipeline: Option<String>,
    #[serde(rename = "Advertised_Title__c")]
    advertised_title: Option<String>,
    #[serde(rename = "AccountId")]
    account_id: Option<String>,
    #[serde(rename = "Last_Active_Stage__c")]
    last_active_stage: Option<String>,
    #[serde(rename = "Account")]
    account: Option<AccountRef>,
}

impl ApplicationRow {
    fn into_domain(self) -> Application {
        let account = self
            .account
            .map(|account| CandidateAccount {
                name: account.name,
                email: account.email,
            })
            .unwrap_or_default();
        Application {
            id: ApplicationId(self.id),
            stage_name: self.stage_name.unwrap_or_default(),
            pipeline_id: self.pipeline.unwrap_or_default(),
            advertised_title: self.advertised_title,
            account_id: self.account_id.unwrap_or_default(),
            last_active_stage: self.last_active_stage,
            account,
        }
    }
}

#[derive(Debug, Deserialize)]
struct ProficiencyRef {
    #[serde(rename = "Stars__c")]
    stars: Option<f64>,
    #[serde(rename = "Pass_Threshold__c")]
    pass_threshold: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct MappingRow {
    #[serde(rename = "ApplicationStepId__c")]
    step: Option<String>,
    #[serde(rename = "PipelineId__c")]
    pipeline: Option<String>,
    #[serde(rename = "Pass_Threshold__c")]
    pass_threshold: Option<f64>,
    #[serde(rename = "Reject_Threshold__c")]
    reject_threshold: Option<f64>,
    #[serde(rename = "Retry_Threshold__c")]
    retry_threshold: Option<f64>,
    #[serde(rename = "Minimum_Proficiency__r")]
    minimum_proficiency: Option<ProficiencyRef>,
}

impl MappingRow {
    fn into_domain(self) -> StepPipelineMapping {
        // A badge without a pass threshold cannot be compared against.
        let minimum_proficiency = self.minimum_proficiency.and_then(|badge| {
            Some(ProficiencyRequirement {
                stars: badge.stars?,
                pass_threshold: badge.pass_threshold?,
            })
        });
        StepPipelineMapping {
            pipeline_id: self.pipeline.unwrap_or_default(),
            step_id: self.step.unwrap_or_default(),
            pass_threshold: self.pass_threshold,
            reject_threshold: self.reject_threshold,
            retry_threshold: self.retry_threshold,
            minimum_proficiency,
        }
    }
}

#[derive(Debug, Deserialize)]
struct HistoryRow {
    #[serde(rename = "CreatedDate")]
    created_date: String,
    #[serde(rename = "Field")]
    field: String,
    #[serde(rename = "OldValue", default)]
    old_value: Value,
    #[serde(rename = "NewValue", default)]
    new_value: Value,
    #[serde(rename = "ParentId")]
    parent_id: Option<String>,
    #[serde(rename = "OpportunityId")]
    opportunity_id: Option<String>,
}

impl HistoryRow {
    fn into_domain(self) -> Result<FieldHistoryRecord, GatewayError> {
        Ok(FieldHistoryRecord {
            created_at: parse_created_date(&self.created_date)?,
            field: self.field,
            old_value: value_to_string(self.old_value),
            new_value: value_to_string(self.new_value),
            parent_id: self
                .parent_id
                .or(self.opportunity_id)
                .unwrap_or_default(),
        })
    }
}

#[derive(Debug, Deserialize)]
struct StageRow {
    #[serde(rename = "StageName")]
    stage_name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct FlowOutput {
    #[serde(rename = "isSuccess", default)]
    is_success: bool,
    #[serde(rename = "outputValues")]
    output_values: Option<FlowValues>,
}

#[derive(Debug, Deserialize)]
struct FlowValues {
    #[serde(rename = "oVarT_ApplicationStage")]
    application_stage: Option<String>,
}

/// Accepts Salesforce's `2024-03-04T10:00:00.000+0000` as well as RFC 3339.
pub(crate) fn parse_created_date(raw: &str) -> Result<DateTime<Utc>, GatewayError> {
    let raw = raw.trim();
    DateTime::parse_from_rfc3339(raw)
        .or_else(|_| DateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f%z"))
        .map(|parsed| parsed.with_timezone(&Utc))
        .map_err(|err| GatewayError::Payload(format!("invalid CreatedDate '{raw}': {err}")))
}

fn value_to_string(value: Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(text) => Some(text),
        other => Some(other.to_string()),
    }
}
