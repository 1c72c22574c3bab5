use garde::Validate;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::analysis::Platform;
use crate::models::status::CanonicalStatus;

/// Request to start tracking a profile analysis.
#[derive(Debug, Deserialize, Validate)]
pub struct StartAnalysisRequest {
    #[garde(skip)]
    pub platform: Platform,

    #[garde(length(min = 1, max = 100))]
    pub username: String,

    #[garde(inner(length(min = 1, max = 100)))]
    pub user_id: Option<String>,
}

/// Response after an analysis has been submitted and tracking started.
#[derive(Debug, Serialize, Deserialize)]
pub struct StartAnalysisResponse {
    pub analysis_id: Uuid,
    pub job_id: String,
    pub status: CanonicalStatus,
}

/// Response for querying an analysis row.
#[derive(Debug, Serialize, Deserialize)]
pub struct AnalysisResponse {
    pub analysis_id: Uuid,
    pub platform: Platform,
    pub username: String,
    pub job_id: Option<String>,
    pub status: CanonicalStatus,
    pub result: Option<serde_json::Value>,
    pub updated_at: chrono::DateTime<chrono::Utc>,
}

impl From<crate::models::analysis::AnalysisJob> for AnalysisResponse {
    fn from(job: crate::models::analysis::AnalysisJob) -> Self {
        Self {
            analysis_id: job.id,
            platform: job.platform,
            username: job.username,
            job_id: job.job_id,
            status: job.status,
            result: job.result,
            updated_at: job.updated_at,
        }
    }
}
