use std::collections::BTreeSet;
use std::sync::Arc;

use tracing::debug;

use super::domain::{
    AffectedApplication, AffectedApplications, Application, ApplicationStepResult,
    FieldHistoryRecord, StepPipelineMapping, StepResultId,
};
use super::gateway::{CrmQueries, GatewayError};

pub const DEFAULT_BATCH_SIZE: usize = 20;

/// Collects step results together with the applications their correction can affect.
pub struct AffectedApplicationFinder<Q> {
    queries: Arc<Q>,
    batch_size: usize,
}

impl<Q> AffectedApplicationFinder<Q>
where
    Q: CrmQueries,
{
    pub fn new(queries: Arc<Q>) -> Self {
        Self::with_batch_size(queries, DEFAULT_BATCH_SIZE)
    }

    /// A zero batch size is treated as one.
    pub fn with_batch_size(queries: Arc<Q>, batch_size: usize) -> Self {
        Self {
            queries,
            batch_size: batch_size.max(1),
        }
    }

    /// Resolves every id, chunk by chunk. Ids without a step result are dropped.
    pub fn find(&self, ids: &[StepResultId]) -> Result<Vec<AffectedApplications>, FinderError> {
        let mut found = Vec::with_capacity(ids.len());

        for (index, chunk) in ids.chunks(self.batch_size).enumerate() {
            let first = index * self.batch_size + 1;
            debug!(
                from = first,
                to = first + chunk.len() - 1,
                total = ids.len(),
                "querying step result batch"
            );
            found.extend(self.find_chunk(chunk)?);
        }

        Ok(found)
    }

    fn find_chunk(&self, chunk: &[StepResultId]) -> Result<Vec<AffectedApplications>, FinderError> {
        let requested = distinct(chunk.iter().cloned());
        let resolved: Vec<ApplicationStepResult> = self
            .queries
            .step_results(&requested)?
            .into_iter()
            .filter(|record| requested.contains(&record.id))
            .collect();

        for id in &requested {
            if !resolved.iter().any(|record| &record.id == id) {
                debug!(step_result_id = %id, "step result not found, skipping");
            }
        }

        let candidates = distinct(resolved.iter().map(|record| record.candidate_id.clone()));
        let applications = self.queries.applications_for_candidates(&candidates)?;
        let steps = distinct(resolved.iter().map(|record| record.step_id.clone()));
        let mappings = self.queries.mappings_for_steps(&steps)?;

        let mut data: Vec<AffectedApplications> = resolved
            .into_iter()
            .map(|step_result| {
                let applications = match_applications(&step_result, &applications, &mappings);
                AffectedApplications {
                    step_result,
                    applications,
                }
            })
            .collect();

        let history_ids = distinct(data.iter().map(|entry| entry.step_result.id.clone()));
        let step_history = self.queries.step_result_history(&history_ids)?;
        for entry in &mut data {
            entry.step_result.history = history_for(&step_history, &entry.step_result.id.0);
        }

        let application_ids = distinct(
            data.iter()
                .flat_map(|entry| entry.applications.iter())
                .map(|affected| affected.application.id.clone()),
        );
        let application_history = self.queries.application_history(&application_ids)?;
        for affected in data.iter_mut().flat_map(|entry| entry.applications.iter_mut()) {
            affected.history = history_for(&application_history, &affected.application.id.0);
        }

        Ok(data)
    }
}

/// Applications owned by the step result's candidate whose pipeline maps the same step.
/// When several mappings qualify the first one in query order is attached.
pub(crate) fn match_applications(
    step_result: &ApplicationStepResult,
    applications: &[Application],
    mappings: &[StepPipelineMapping],
) -> Vec<AffectedApplication> {
    applications
        .iter()
        .filter(|application| application.account_id == step_result.candidate_id)
        .filter_map(|application| {
            mappings
                .iter()
                .find(|mapping| {
                    mapping.pipeline_id == application.pipeline_id
                        && mapping.step_id == step_result.step_id
                })
                .map(|mapping| AffectedApplication {
                    application: application.clone(),
                    mapping: mapping.clone(),
                    history: Vec::new(),
                })
        })
        .collect()
}

fn history_for(history: &[FieldHistoryRecord], parent_id: &str) -> Vec<FieldHistoryRecord> {
    history
        .iter()
        .filter(|record| record.parent_id == parent_id)
        .cloned()
        .collect()
}

fn distinct<T: Ord + Clone>(values: impl Iterator<Item = T>) -> Vec<T> {
    let mut seen = BTreeSet::new();
    values.filter(|value| seen.insert(value.clone())).collect()
}

/// Error raised while gathering affected applications. Any failure aborts the run.
#[derive(Debug, thiserror::Error)]
pub enum FinderError {
    #[error(transparent)]
    Gateway(#[from] GatewayError),
}
