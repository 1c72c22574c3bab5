use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;

use crate::models::analysis::Platform;

/// Remote analysis API, as consumed by the poller and the submission path.
#[async_trait]
pub trait EnrichmentApi: Send + Sync {
    /// Check the state of a queued analysis job.
    async fn job_status(
        &self,
        platform: Platform,
        job_id: &str,
    ) -> Result<StatusCheck, EnrichmentError>;

    /// Submit (or re-submit) a profile for analysis, obtaining a job token.
    async fn submit_profile(
        &self,
        platform: Platform,
        username: &str,
    ) -> Result<SubmissionReceipt, EnrichmentError>;
}

/// Status-endpoint payload, decoded into its two meanings at the boundary:
/// the queue either knows the job or reports it gone.
#[derive(Debug, Clone, PartialEq)]
pub enum StatusCheck {
    /// The remote queue has no record of the job id.
    NotFound,
    Report(StatusReport),
}

#[derive(Debug, Clone, PartialEq)]
pub struct StatusReport {
    /// Upstream wording, not yet canonical.
    pub raw_status: String,
    pub result: Option<serde_json::Value>,
    pub error: Option<String>,
}

/// Submission-endpoint payload.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct SubmissionReceipt {
    pub job_id: String,
    pub status: String,
}

#[derive(Debug, Deserialize)]
struct StatusPayload {
    status: String,
    result: Option<serde_json::Value>,
    error: Option<String>,
}

/// Client for the hosted profile-analysis API.
pub struct EnrichmentClient {
    http: Client,
    base_url: String,
}

impl EnrichmentClient {
    pub fn new(base_url: &str) -> Result<Self, EnrichmentError> {
        let http = Client::builder()
            .user_agent(concat!("profile-enrich/", env!("CARGO_PKG_VERSION")))
            .timeout(std::time::Duration::from_secs(30))
            .build()?;

        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl EnrichmentApi for EnrichmentClient {
    async fn job_status(
        &self,
        platform: Platform,
        job_id: &str,
    ) -> Result<StatusCheck, EnrichmentError> {
        let url = format!("{}/api/v1/{}/job/{}", self.base_url, platform, job_id);

        let body = self
            .http
            .get(&url)
            .send()
            .await?
            .error_for_status()?
            .text()
            .await?;

        let payload: StatusPayload =
            serde_json::from_str(&body).map_err(EnrichmentError::Parse)?;

        if payload.status.eq_ignore_ascii_case("not_found") {
            return Ok(StatusCheck::NotFound);
        }

        Ok(StatusCheck::Report(StatusReport {
            raw_status: payload.status,
            result: payload.result,
            error: payload.error,
        }))
    }

    async fn submit_profile(
        &self,
        platform: Platform,
        username: &str,
    ) -> Result<SubmissionReceipt, EnrichmentError> {
        let url = format!("{}/api/v1/{}/profile/{}", self.base_url, platform, username);

        let body = self
            .http
            .get(&url)
            .send()
            .await?
            .error_for_status()?
            .text()
            .await?;

        serde_json::from_str(&body).map_err(EnrichmentError::Parse)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum EnrichmentError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Failed to parse analysis API response: {0}")]
    Parse(#[from] serde_json::Error),
}
