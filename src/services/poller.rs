use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Value};
use tokio::time::{sleep, Instant};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::db::store::{AnalysisStore, StoreError};
use crate::models::analysis::{AnalysisPatch, Platform};
use crate::models::status::CanonicalStatus;
use crate::services::cache::ProfileCache;
use crate::services::enrichment::{EnrichmentApi, EnrichmentError, StatusCheck};
use crate::services::notify::Notifier;

const POLL_INTERVAL_MS: u64 = 5000;
const MAX_POLL_DURATION_MS: u64 = 120_000;
const MAX_NOT_FOUND_RETRIES: u32 = 3;

const MSG_CHECK_FAILED: &str = "Failed to check status";
const MSG_TIMED_OUT: &str = "Analysis timed out";
const MSG_MAX_RETRIES: &str = "Max retries reached";

/// Timing and retry ceilings for one poll loop.
#[derive(Debug, Clone)]
pub struct PollerConfig {
    pub interval: Duration,
    pub max_duration: Duration,
    /// Consecutive "job not found" responses tolerated before giving up.
    pub max_not_found_retries: u32,
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_millis(POLL_INTERVAL_MS),
            max_duration: Duration::from_millis(MAX_POLL_DURATION_MS),
            max_not_found_retries: MAX_NOT_FOUND_RETRIES,
        }
    }
}

/// How a poll loop ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollExit {
    /// Never started: the job reference was absent (a no-op, not an error).
    Idle,
    Completed,
    Failed,
    Cancelled,
}

/// Outcome of the restart sub-procedure.
enum Restart {
    /// Fresh job id obtained; polling resumes against it.
    Resubmitted(String),
    /// The result arrived through another path; polling stops, already done.
    AlreadyCompleted,
    /// Cancellation tripped mid-restart; no further writes were made.
    Cancelled,
}

/// Drives one analysis job from submission to a terminal state.
///
/// Each tick: short-circuit against the row-store, otherwise ask the remote
/// queue, normalize the answer, persist it, and decide whether to stop,
/// restart with a fresh job id, or re-arm the timer. The cancellation token
/// is consulted before every persistence write so a late in-flight response
/// cannot resurrect a cancelled poll.
pub struct StatusPoller {
    store: Arc<dyn AnalysisStore>,
    api: Arc<dyn EnrichmentApi>,
    cache: Arc<dyn ProfileCache>,
    notifier: Arc<dyn Notifier>,
    config: PollerConfig,
}

impl StatusPoller {
    pub fn new(
        store: Arc<dyn AnalysisStore>,
        api: Arc<dyn EnrichmentApi>,
        cache: Arc<dyn ProfileCache>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self::with_config(store, api, cache, notifier, PollerConfig::default())
    }

    pub fn with_config(
        store: Arc<dyn AnalysisStore>,
        api: Arc<dyn EnrichmentApi>,
        cache: Arc<dyn ProfileCache>,
        notifier: Arc<dyn Notifier>,
        config: PollerConfig,
    ) -> Self {
        Self {
            store,
            api,
            cache,
            notifier,
            config,
        }
    }

    /// Poll until the job reaches a terminal state. A missing analysis id or
    /// job id is a no-op.
    pub async fn run(
        &self,
        analysis_id: Option<Uuid>,
        platform: Platform,
        job_id: Option<String>,
        cancel: &CancellationToken,
    ) -> PollExit {
        let (Some(analysis_id), Some(job_id)) = (analysis_id, job_id) else {
            return PollExit::Idle;
        };
        if job_id.is_empty() {
            return PollExit::Idle;
        }

        metrics::gauge!("enrichment_active_pollers").increment(1.0);
        let exit = self.poll_loop(analysis_id, platform, job_id, cancel).await;
        metrics::gauge!("enrichment_active_pollers").decrement(1.0);

        tracing::info!(
            analysis_id = %analysis_id,
            platform = %platform,
            exit = ?exit,
            "Poll loop finished"
        );
        exit
    }

    async fn poll_loop(
        &self,
        analysis_id: Uuid,
        platform: Platform,
        mut job_id: String,
        cancel: &CancellationToken,
    ) -> PollExit {
        let started = Instant::now();
        let mut not_found_retries: u32 = 0;

        // The first check runs immediately; the interval only spaces
        // subsequent ticks.
        loop {
            if cancel.is_cancelled() {
                return PollExit::Cancelled;
            }

            // Past the ceiling the tick fails terminally no matter what the
            // remote endpoint would have answered.
            if started.elapsed() > self.config.max_duration {
                return self.fail(analysis_id, platform, MSG_TIMED_OUT, cancel).await;
            }

            // Another path (a second tab, the restart sub-procedure of an
            // earlier loop) may already have resolved the job; skip the
            // remote call entirely in that case.
            match self.store.read_job(analysis_id).await {
                Ok(Some(job)) if job.is_resolved() => {
                    if let Some(result) = job.stored_result() {
                        self.cache_best_effort(platform, result).await;
                    }
                    metrics::counter!("enrichment_jobs_completed").increment(1);
                    return PollExit::Completed;
                }
                Ok(_) => {}
                Err(e) => {
                    // The pre-check is an optimization; the remote call below
                    // still decides the tick.
                    tracing::warn!(analysis_id = %analysis_id, error = %e, "Pre-check read failed");
                }
            }

            match self.api.job_status(platform, &job_id).await {
                Err(e) => {
                    tracing::warn!(
                        analysis_id = %analysis_id,
                        job_id = %job_id,
                        error = %e,
                        "Status check failed"
                    );
                    return self.fail(analysis_id, platform, MSG_CHECK_FAILED, cancel).await;
                }

                Ok(StatusCheck::NotFound) => {
                    not_found_retries += 1;
                    if not_found_retries > self.config.max_not_found_retries {
                        return self.fail(analysis_id, platform, MSG_MAX_RETRIES, cancel).await;
                    }

                    tracing::info!(
                        analysis_id = %analysis_id,
                        job_id = %job_id,
                        attempt = not_found_retries,
                        "Remote queue lost the job, restarting"
                    );

                    match self.restart(analysis_id, platform, cancel).await {
                        Ok(Restart::Resubmitted(new_job_id)) => {
                            job_id = new_job_id;
                        }
                        Ok(Restart::AlreadyCompleted) => return PollExit::Completed,
                        Ok(Restart::Cancelled) => return PollExit::Cancelled,
                        Err(PollerError::RecordNotFound(id)) => {
                            // The row itself vanished; there is nothing left
                            // to patch, so fail without a persistence write.
                            tracing::error!(analysis_id = %id, "Analysis record disappeared during restart");
                            self.notifier.failure(platform, MSG_CHECK_FAILED).await;
                            metrics::counter!("enrichment_jobs_failed").increment(1);
                            return PollExit::Failed;
                        }
                        Err(e) => {
                            // Submission failure: keep polling the old id and
                            // let the consecutive not-found counter exhaust
                            // the retries.
                            tracing::warn!(analysis_id = %analysis_id, error = %e, "Restart submission failed");
                        }
                    }
                }

                Ok(StatusCheck::Report(report)) => {
                    // Only consecutive not-found responses count.
                    not_found_retries = 0;

                    let failed_upstream = report.error.is_some();
                    let mapped = if failed_upstream {
                        CanonicalStatus::Failed
                    } else {
                        CanonicalStatus::from_upstream(&report.raw_status)
                    };

                    match mapped {
                        CanonicalStatus::Completed => {
                            let mut patch = AnalysisPatch::status(CanonicalStatus::Completed);
                            patch.result = report.result.clone();
                            if !self.write_guarded(analysis_id, patch, cancel).await {
                                return PollExit::Cancelled;
                            }
                            if let Some(result) = &report.result {
                                self.cache_best_effort(platform, result).await;
                            }
                            self.notifier.success(platform, "Analysis completed").await;
                            metrics::counter!("enrichment_jobs_completed").increment(1);
                            return PollExit::Completed;
                        }
                        CanonicalStatus::Failed => {
                            let message = report
                                .error
                                .unwrap_or_else(|| "Analysis failed".to_string());
                            return self.fail(analysis_id, platform, &message, cancel).await;
                        }
                        CanonicalStatus::Queued | CanonicalStatus::Processing => {
                            // Stamping the row every tick doubles as the
                            // liveness heartbeat the recovery worker reads.
                            let mut patch = AnalysisPatch::status(mapped);
                            patch.result = report.result.clone();
                            if !self.write_guarded(analysis_id, patch, cancel).await {
                                return PollExit::Cancelled;
                            }
                        }
                    }
                }
            }

            tokio::select! {
                _ = cancel.cancelled() => return PollExit::Cancelled,
                _ = sleep(self.config.interval) => {}
            }
        }
    }

    /// Recover from the remote queue losing track of the job: re-issue the
    /// original submission and resume polling against the fresh job id.
    async fn restart(
        &self,
        analysis_id: Uuid,
        platform: Platform,
        cancel: &CancellationToken,
    ) -> Result<Restart, PollerError> {
        let job = self
            .store
            .read_job(analysis_id)
            .await?
            .ok_or(PollerError::RecordNotFound(analysis_id))?;

        // A non-empty stored result means the answer arrived through another
        // path while the queue forgot the job: mark done instead of
        // resubmitting.
        if let Some(result) = job.stored_result() {
            let result = result.clone();
            if cancel.is_cancelled() {
                return Ok(Restart::Cancelled);
            }
            self.write_logged(analysis_id, AnalysisPatch::status(CanonicalStatus::Completed))
                .await;
            self.cache_best_effort(platform, &result).await;
            self.notifier.success(platform, "Analysis completed").await;
            metrics::counter!("enrichment_jobs_completed").increment(1);
            return Ok(Restart::AlreadyCompleted);
        }

        let receipt = self.api.submit_profile(platform, &job.username).await?;
        let status = CanonicalStatus::from_upstream(&receipt.status);

        if cancel.is_cancelled() {
            return Ok(Restart::Cancelled);
        }
        self.write_logged(
            analysis_id,
            AnalysisPatch::job_assignment(receipt.job_id.clone(), status),
        )
        .await;

        metrics::counter!("enrichment_job_restarts").increment(1);
        Ok(Restart::Resubmitted(receipt.job_id))
    }

    /// Terminal failure: persist the error descriptor, notify, count.
    async fn fail(
        &self,
        analysis_id: Uuid,
        platform: Platform,
        message: &str,
        cancel: &CancellationToken,
    ) -> PollExit {
        if cancel.is_cancelled() {
            return PollExit::Cancelled;
        }
        self.write_logged(
            analysis_id,
            AnalysisPatch::outcome(CanonicalStatus::Failed, json!({ "error": message })),
        )
        .await;
        self.notifier.failure(platform, message).await;
        metrics::counter!("enrichment_jobs_failed").increment(1);
        PollExit::Failed
    }

    /// Persist a patch unless cancellation already occurred. Returns false
    /// when the write was suppressed by cancellation.
    async fn write_guarded(
        &self,
        analysis_id: Uuid,
        patch: AnalysisPatch,
        cancel: &CancellationToken,
    ) -> bool {
        if cancel.is_cancelled() {
            return false;
        }
        self.write_logged(analysis_id, patch).await;
        true
    }

    async fn write_logged(&self, analysis_id: Uuid, patch: AnalysisPatch) {
        if let Err(e) = self.store.update_job(analysis_id, patch).await {
            tracing::warn!(analysis_id = %analysis_id, error = %e, "Row-store write failed");
        }
    }

    /// Cache writes are best-effort; a failure never affects the poll state.
    async fn cache_best_effort(&self, platform: Platform, result: &Value) {
        if let Err(e) = self.cache.merge_result(platform, result).await {
            tracing::warn!(platform = %platform, error = %e, "Failed to cache enrichment result");
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum PollerError {
    #[error("analysis record {0} not found")]
    RecordNotFound(Uuid),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Api(#[from] EnrichmentError),
}
