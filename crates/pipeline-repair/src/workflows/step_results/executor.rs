use std::sync::Arc;
use std::thread;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use super::domain::{Action, ApplicationId, Stage};
use super::gateway::{CrmWriter, GatewayError};
use super::planner::PlannedAction;
use crate::config::ReconciliationConfig;

/// Pauses that let CRM automation finish after each stage write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SettleDelays {
    pub restore: Duration,
    pub reject: Duration,
}

impl SettleDelays {
    pub const NONE: Self = Self {
        restore: Duration::ZERO,
        reject: Duration::ZERO,
    };
}

impl From<&ReconciliationConfig> for SettleDelays {
    fn from(config: &ReconciliationConfig) -> Self {
        Self {
            restore: config.restore_settle,
            reject: config.reject_settle,
        }
    }
}

/// Row written to the operator report for each processed action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionReportRow {
    pub action: Action,
    pub application_id: ApplicationId,
    pub title: Option<String>,
    pub candidate_email: Option<String>,
    pub candidate_name: Option<String>,
    pub outcome: String,
}

/// Applies planned actions one at a time against the CRM.
pub struct ActionExecutor<W> {
    writer: Arc<W>,
    delays: SettleDelays,
}

impl<W> ActionExecutor<W>
where
    W: CrmWriter,
{
    pub fn new(writer: Arc<W>, delays: SettleDelays) -> Self {
        Self { writer, delays }
    }

    /// Stops at the first gateway failure. The error carries the rows of every action
    /// completed before it so the partial run can still be reported.
    pub fn apply(
        &self,
        actions: &[PlannedAction],
    ) -> Result<Vec<ExecutionReportRow>, ExecutorError> {
        let mut rows = Vec::with_capacity(actions.len());
        let total = actions.len();

        for (index, planned) in actions.iter().enumerate() {
            match self.apply_one(index + 1, total, planned) {
                Ok(Some(row)) => rows.push(row),
                Ok(None) => {}
                Err(source) => {
                    warn!(
                        application_id = %planned.application_id,
                        completed = rows.len(),
                        error = %source,
                        "stopping after crm failure"
                    );
                    return Err(ExecutorError::Aborted {
                        completed: rows,
                        source,
                    });
                }
            }
        }

        Ok(rows)
    }

    fn apply_one(
        &self,
        position: usize,
        total: usize,
        planned: &PlannedAction,
    ) -> Result<Option<ExecutionReportRow>, GatewayError> {
        let outcome = match planned.action {
            Action::Restore => match planned.hint.as_deref() {
                Some(target) => {
                    match self.restore(position, total, &planned.application_id, target)? {
                        Some(outcome) => outcome,
                        None => return Ok(None),
                    }
                }
                None => "no restore target, check manually".to_string(),
            },
            Action::Reject => {
                info!(
                    "[{position}/{total}] rejecting application {}",
                    planned.application_id
                );
                self.writer
                    .update_stage(&planned.application_id, Stage::Rejected.label())?;
                settle(self.delays.reject);
                "rejected".to_string()
            }
            Action::NotifyHm => "hiring manager to decide".to_string(),
            Action::Error => "check manually".to_string(),
            Action::None => return Ok(None),
        };

        Ok(Some(ExecutionReportRow {
            action: planned.action,
            application_id: planned.application_id.clone(),
            title: planned.candidate.title.clone(),
            candidate_email: planned.candidate.email.clone(),
            candidate_name: planned.candidate.name.clone(),
            outcome,
        }))
    }

    /// `None` when the application already sits in the target stage.
    fn restore(
        &self,
        position: usize,
        total: usize,
        id: &ApplicationId,
        target: &str,
    ) -> Result<Option<String>, GatewayError> {
        info!("[{position}/{total}] restoring application {id} to stage {target}");
        if self.writer.current_stage(id)?.as_deref() == Some(target) {
            info!("    application is already in {target}");
            return Ok(None);
        }

        self.writer.update_stage(id, target)?;
        settle(self.delays.restore);

        // Every assessment of the restored stage may already be complete, which would
        // leave the application stuck; let the CRM move it forward.
        match self.writer.next_assessment_stage(id)? {
            Some(next) if next != target => {
                info!("    moving to {next} as computed by the CRM");
                self.writer.update_stage(id, &next)?;
                settle(self.delays.restore);
                Ok(Some(format!("restored to {target}, moved to {next}")))
            }
            _ => Ok(Some(format!("restored to {target}"))),
        }
    }
}

fn settle(delay: Duration) {
    if !delay.is_zero() {
        thread::sleep(delay);
    }
}

/// Error raised while applying actions. Any failure aborts the run.
#[derive(Debug, thiserror::Error)]
pub enum ExecutorError {
    #[error("stopped after {} completed action(s): {source}", .completed.len())]
    Aborted {
        completed: Vec<ExecutionReportRow>,
        source: GatewayError,
    },
}

impl ExecutorError {
    /// Rows for the actions that finished before the failure.
    pub fn completed(&self) -> &[ExecutionReportRow] {
        match self {
            ExecutorError::Aborted { completed, .. } => completed,
        }
    }
}
