use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use uuid::Uuid;

use crate::models::status::CanonicalStatus;

/// External profile platform an analysis runs against.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Display, EnumString)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Platform {
    Github,
    Linkedin,
}

impl Platform {
    /// Member name this platform's result occupies in the social_profiles blob.
    pub fn cache_member(self) -> &'static str {
        match self {
            Platform::Github => "githubData",
            Platform::Linkedin => "linkedInData",
        }
    }
}

/// One outstanding or completed asynchronous enrichment request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisJob {
    pub id: Uuid,
    pub user_id: Option<String>,
    pub platform: Platform,
    pub username: String,
    /// Opaque token assigned by the remote queue; reassigned on restart.
    pub job_id: Option<String>,
    pub status: CanonicalStatus,
    pub result: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl AnalysisJob {
    /// Result payload, if the job already carries a non-empty one.
    pub fn stored_result(&self) -> Option<&serde_json::Value> {
        self.result.as_ref().filter(|v| !v.is_null())
    }

    /// True when the row reports a finished job with its payload in place.
    pub fn is_resolved(&self) -> bool {
        self.status == CanonicalStatus::Completed && self.stored_result().is_some()
    }
}

/// Partial update applied to an analysis row. Unset fields are left alone;
/// every applied patch stamps `updated_at`.
#[derive(Debug, Clone, Default)]
pub struct AnalysisPatch {
    pub status: Option<CanonicalStatus>,
    pub result: Option<serde_json::Value>,
    pub job_id: Option<String>,
}

impl AnalysisPatch {
    pub fn status(status: CanonicalStatus) -> Self {
        Self {
            status: Some(status),
            ..Self::default()
        }
    }

    pub fn outcome(status: CanonicalStatus, result: serde_json::Value) -> Self {
        Self {
            status: Some(status),
            result: Some(result),
            ..Self::default()
        }
    }

    pub fn job_assignment(job_id: String, status: CanonicalStatus) -> Self {
        Self {
            status: Some(status),
            job_id: Some(job_id),
            ..Self::default()
        }
    }
}
