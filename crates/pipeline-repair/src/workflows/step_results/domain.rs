use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Identifier wrapper for Application Step Result records.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct StepResultId(pub String);

/// Identifier wrapper for pipeline applications.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ApplicationId(pub String);

impl fmt::Display for StepResultId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Display for ApplicationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Named pipeline stages in their fixed progression order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Stage {
    #[serde(rename = "BFQ")]
    Bfq,
    Commitment,
    #[serde(rename = "CCAT")]
    Ccat,
    English,
    #[serde(rename = "SMQ")]
    Smq,
    #[serde(rename = "FRQ")]
    Frq,
    Review,
    Interview,
    Marketplace,
    Offer,
    Onboarding,
    #[serde(rename = "Fraud-check")]
    FraudCheck,
    Hired,
    Rejected,
    Canceled,
    Expired,
}

impl Stage {
    pub const fn ordered() -> [Self; 16] {
        [
            Self::Bfq,
            Self::Commitment,
            Self::Ccat,
            Self::English,
            Self::Smq,
            Self::Frq,
            Self::Review,
            Self::Interview,
            Self::Marketplace,
            Self::Offer,
            Self::Onboarding,
            Self::FraudCheck,
            Self::Hired,
            Self::Rejected,
            Self::Canceled,
            Self::Expired,
        ]
    }

    pub const fn label(self) -> &'static str {
        match self {
            Self::Bfq => "BFQ",
            Self::Commitment => "Commitment",
            Self::Ccat => "CCAT",
            Self::English => "English",
            Self::Smq => "SMQ",
            Self::Frq => "FRQ",
            Self::Review => "Review",
            Self::Interview => "Interview",
            Self::Marketplace => "Marketplace",
            Self::Offer => "Offer",
            Self::Onboarding => "Onboarding",
            Self::FraudCheck => "Fraud-check",
            Self::Hired => "Hired",
            Self::Rejected => "Rejected",
            Self::Canceled => "Canceled",
            Self::Expired => "Expired",
        }
    }

    pub fn parse(label: &str) -> Option<Self> {
        Self::ordered()
            .into_iter()
            .find(|stage| stage.label() == label)
    }

    /// Position within [`Stage::ordered`].
    pub fn position(self) -> usize {
        self as usize
    }

    /// Terminal stages a correction never touches.
    pub const fn is_ignored(self) -> bool {
        matches!(self, Self::Canceled | Self::Expired)
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Corrective action decided for one affected application.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Action {
    /// Nothing to do.
    None,
    /// Move the application back to the stage named by the hint.
    Restore,
    /// Reject the application.
    Reject,
    /// Too late in the pipeline to reject automatically; the hiring manager decides.
    #[serde(rename = "NotifyHM")]
    NotifyHm,
    /// Investigate manually.
    Error,
}

impl Action {
    pub const fn label(self) -> &'static str {
        match self {
            Action::None => "None",
            Action::Restore => "Restore",
            Action::Reject => "Reject",
            Action::NotifyHm => "NotifyHM",
            Action::Error => "Error",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// One audit-trail entry from a CRM field history table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldHistoryRecord {
    pub created_at: DateTime<Utc>,
    pub field: String,
    pub old_value: Option<String>,
    pub new_value: Option<String>,
    pub parent_id: String,
}

impl FieldHistoryRecord {
    pub fn is_transition(&self, field: &str, predicate: impl Fn(&str) -> bool) -> bool {
        self.field == field && self.new_value.as_deref().is_some_and(predicate)
    }
}

/// Scoring record for one candidate at one pipeline step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApplicationStepResult {
    pub id: StepResultId,
    pub candidate_id: String,
    pub application_id: Option<ApplicationId>,
    pub score: Option<f64>,
    pub raw_score: Option<f64>,
    pub step_id: String,
    pub step_name: Option<String>,
    pub stage: Option<String>,
    pub threshold: Option<f64>,
    pub reject_threshold: Option<f64>,
    pub state: Option<String>,
    /// `Some(true)` when the badge was simulated, `Some(false)` when graded by badge.
    pub badge_simulated: Option<bool>,
    /// Newest-first audit trail.
    #[serde(default)]
    pub history: Vec<FieldHistoryRecord>,
}

/// Candidate account summary carried on the application.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CandidateAccount {
    pub name: Option<String>,
    pub email: Option<String>,
}

/// A candidate's pipeline application as read from the CRM.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Application {
    pub id: ApplicationId,
    pub stage_name: String,
    pub pipeline_id: String,
    pub advertised_title: Option<String>,
    pub account_id: String,
    pub last_active_stage: Option<String>,
    #[serde(default)]
    pub account: CandidateAccount,
}

/// Badge requirement that can substitute for the raw score threshold.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ProficiencyRequirement {
    pub stars: f64,
    pub pass_threshold: f64,
}

/// Per-pipeline, per-step threshold configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepPipelineMapping {
    pub pipeline_id: String,
    pub step_id: String,
    pub pass_threshold: Option<f64>,
    pub reject_threshold: Option<f64>,
    pub retry_threshold: Option<f64>,
    pub minimum_proficiency: Option<ProficiencyRequirement>,
}

/// Application matched to a step result through a pipeline mapping.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AffectedApplication {
    pub application: Application,
    pub mapping: StepPipelineMapping,
    /// Newest-first audit trail of the application.
    #[serde(default)]
    pub history: Vec<FieldHistoryRecord>,
}

/// Everything the effect calculator needs for one corrected step result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AffectedApplications {
    pub step_result: ApplicationStepResult,
    pub applications: Vec<AffectedApplication>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ordered_positions_match_discriminants() {
        for (index, stage) in Stage::ordered().into_iter().enumerate() {
            assert_eq!(stage.position(), index, "{stage} out of order");
        }
    }

    #[test]
    fn labels_round_trip_through_parse() {
        assert_eq!(Stage::parse("Fraud-check"), Some(Stage::FraudCheck));
        assert_eq!(Stage::parse("CCAT"), Some(Stage::Ccat));
        assert_eq!(Stage::parse("ccat"), None);
        assert_eq!(Stage::parse("Screening"), None);
    }

    #[test]
    fn action_serializes_with_crm_labels() {
        let json = serde_json::to_string(&Action::NotifyHm).expect("serialize");
        assert_eq!(json, "\"NotifyHM\"");
        let parsed: Action = serde_json::from_str("\"Restore\"").expect("deserialize");
        assert_eq!(parsed, Action::Restore);
    }
}
