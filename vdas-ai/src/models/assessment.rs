//! Assessment job record and state
//!
//! States: PENDING → IN_PROGRESS → COMPLETED | FAILED
//!
//! A job is created PENDING by the upload flow and mutated only by the
//! orchestrator. IN_PROGRESS → PENDING never happens; a restart is only possible
//! from PENDING.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use super::{Detection, Side};

/// Assessment job status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssessmentStatus {
    /// Created, waiting for a run
    Pending,
    /// A run holds the job
    InProgress,
    /// Results and summary available
    Completed,
    /// Run failed or timed out; `error` is set
    Failed,
}

impl AssessmentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AssessmentStatus::Pending => "pending",
            AssessmentStatus::InProgress => "in_progress",
            AssessmentStatus::Completed => "completed",
            AssessmentStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, AssessmentStatus::Completed | AssessmentStatus::Failed)
    }
}

impl fmt::Display for AssessmentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AssessmentStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(AssessmentStatus::Pending),
            "in_progress" => Ok(AssessmentStatus::InProgress),
            "completed" => Ok(AssessmentStatus::Completed),
            "failed" => Ok(AssessmentStatus::Failed),
            other => Err(format!("unknown assessment status: {}", other)),
        }
    }
}

/// Per-side assessment output
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SideAssessment {
    pub side: Side,
    /// URL of the pickup photo
    pub pickup_image: String,
    /// URL of the return photo
    pub return_image: String,
    /// URL of the return photo with new damages drawn in, when rendering succeeded
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub annotated_return_image: Option<String>,
    pub new_damages: Vec<Detection>,
    pub existing_damages: Vec<Detection>,
    pub resolved_damages: Vec<Detection>,
}

/// Results keyed by side, iterated in side order
pub type AssessmentResults = BTreeMap<Side, SideAssessment>;

/// Persisted assessment record
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AssessmentJob {
    pub id: String,
    pub status: AssessmentStatus,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub results: Option<AssessmentResults>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Incremented by every start; identifies the run allowed to finish the job
    #[serde(skip)]
    pub run_token: i64,
    /// Hard deletion deadline
    #[serde(skip)]
    pub expires_at: DateTime<Utc>,
}

/// Partial write to an assessment record
///
/// `None` fields leave the stored value untouched.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AssessmentUpdate {
    pub status: Option<AssessmentStatus>,
    pub created_at: Option<DateTime<Utc>>,
    pub started_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub results: Option<AssessmentResults>,
    pub summary: Option<String>,
    pub error: Option<String>,
}

impl AssessmentUpdate {
    /// New PENDING record created at `now`
    pub fn pending(now: DateTime<Utc>) -> Self {
        Self {
            status: Some(AssessmentStatus::Pending),
            created_at: Some(now),
            updated_at: Some(now),
            ..Default::default()
        }
    }

    pub fn completed(now: DateTime<Utc>, results: AssessmentResults, summary: String) -> Self {
        Self {
            status: Some(AssessmentStatus::Completed),
            updated_at: Some(now),
            completed_at: Some(now),
            results: Some(results),
            summary: Some(summary),
            ..Default::default()
        }
    }

    pub fn failed(now: DateTime<Utc>, error: impl Into<String>) -> Self {
        Self {
            status: Some(AssessmentStatus::Failed),
            updated_at: Some(now),
            error: Some(error.into()),
            ..Default::default()
        }
    }
}
