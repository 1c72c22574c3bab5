//! Test doubles for poller scenario tests

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::Utc;
use serde_json::{Map, Value};
use uuid::Uuid;

use profile_enrich::db::store::{AnalysisStore, StoreError};
use profile_enrich::models::analysis::{AnalysisJob, AnalysisPatch, Platform};
use profile_enrich::models::status::CanonicalStatus;
use profile_enrich::services::cache::{CacheError, ProfileCache};
use profile_enrich::services::enrichment::{
    EnrichmentApi, EnrichmentError, StatusCheck, SubmissionReceipt,
};
use profile_enrich::services::notify::Notifier;

/// Build an analysis row in a given state.
pub fn analysis_row(
    id: Uuid,
    platform: Platform,
    username: &str,
    job_id: Option<&str>,
    status: CanonicalStatus,
    result: Option<Value>,
) -> AnalysisJob {
    AnalysisJob {
        id,
        user_id: Some("test-user".to_string()),
        platform,
        username: username.to_string(),
        job_id: job_id.map(str::to_string),
        status,
        result,
        created_at: Utc::now(),
        updated_at: Utc::now(),
    }
}

/// In-memory analysis store recording every applied patch.
#[derive(Default)]
pub struct MemoryStore {
    jobs: Mutex<HashMap<Uuid, AnalysisJob>>,
    pub writes: Mutex<Vec<AnalysisPatch>>,
}

impl MemoryStore {
    pub fn with_row(row: AnalysisJob) -> Self {
        let store = Self::default();
        store.jobs.lock().unwrap().insert(row.id, row);
        store
    }

    pub fn row(&self, id: Uuid) -> Option<AnalysisJob> {
        self.jobs.lock().unwrap().get(&id).cloned()
    }

    pub fn write_count(&self) -> usize {
        self.writes.lock().unwrap().len()
    }
}

#[async_trait]
impl AnalysisStore for MemoryStore {
    async fn read_job(&self, id: Uuid) -> Result<Option<AnalysisJob>, StoreError> {
        Ok(self.jobs.lock().unwrap().get(&id).cloned())
    }

    async fn update_job(&self, id: Uuid, patch: AnalysisPatch) -> Result<(), StoreError> {
        self.writes.lock().unwrap().push(patch.clone());
        if let Some(job) = self.jobs.lock().unwrap().get_mut(&id) {
            if let Some(status) = patch.status {
                job.status = status;
            }
            if let Some(result) = patch.result {
                job.result = Some(result);
            }
            if let Some(job_id) = patch.job_id {
                job.job_id = Some(job_id);
            }
            job.updated_at = Utc::now();
        }
        Ok(())
    }
}

/// Scripted remote API: queued responses first, then an optional repeating
/// fallback. An unscripted call is a test bug and panics.
#[derive(Default)]
pub struct ScriptedApi {
    statuses: Mutex<VecDeque<Result<StatusCheck, ()>>>,
    fallback: Mutex<Option<Result<StatusCheck, ()>>>,
    submissions: Mutex<VecDeque<Result<SubmissionReceipt, ()>>>,
    pub status_calls: Mutex<Vec<String>>,
    pub submission_calls: Mutex<Vec<String>>,
}

impl ScriptedApi {
    pub fn push_status(&self, check: StatusCheck) {
        self.statuses.lock().unwrap().push_back(Ok(check));
    }

    pub fn push_status_error(&self) {
        self.statuses.lock().unwrap().push_back(Err(()));
    }

    pub fn set_status_fallback(&self, check: StatusCheck) {
        *self.fallback.lock().unwrap() = Some(Ok(check));
    }

    pub fn push_submission(&self, receipt: SubmissionReceipt) {
        self.submissions.lock().unwrap().push_back(Ok(receipt));
    }

    pub fn push_submission_error(&self) {
        self.submissions.lock().unwrap().push_back(Err(()));
    }

    pub fn status_call_count(&self) -> usize {
        self.status_calls.lock().unwrap().len()
    }

    pub fn submission_call_count(&self) -> usize {
        self.submission_calls.lock().unwrap().len()
    }
}

fn scripted_error() -> EnrichmentError {
    EnrichmentError::Parse(serde_json::from_str::<Value>("scripted failure").unwrap_err())
}

#[async_trait]
impl EnrichmentApi for ScriptedApi {
    async fn job_status(
        &self,
        _platform: Platform,
        job_id: &str,
    ) -> Result<StatusCheck, EnrichmentError> {
        self.status_calls.lock().unwrap().push(job_id.to_string());

        let next = self
            .statuses
            .lock()
            .unwrap()
            .pop_front()
            .or_else(|| self.fallback.lock().unwrap().clone());

        match next {
            Some(Ok(check)) => Ok(check),
            Some(Err(())) => Err(scripted_error()),
            None => panic!("unscripted status call for job {job_id}"),
        }
    }

    async fn submit_profile(
        &self,
        _platform: Platform,
        username: &str,
    ) -> Result<SubmissionReceipt, EnrichmentError> {
        self.submission_calls
            .lock()
            .unwrap()
            .push(username.to_string());

        match self.submissions.lock().unwrap().pop_front() {
            Some(Ok(receipt)) => Ok(receipt),
            Some(Err(())) => Err(scripted_error()),
            None => panic!("unscripted submission for {username}"),
        }
    }
}

/// In-memory profile cache blob.
#[derive(Default)]
pub struct MemoryCache {
    blob: Mutex<Map<String, Value>>,
}

impl MemoryCache {
    pub fn member(&self, name: &str) -> Option<Value> {
        self.blob.lock().unwrap().get(name).cloned()
    }
}

#[async_trait]
impl ProfileCache for MemoryCache {
    async fn merge_result(&self, platform: Platform, result: &Value) -> Result<(), CacheError> {
        self.blob
            .lock()
            .unwrap()
            .insert(platform.cache_member().to_string(), result.clone());
        Ok(())
    }

    async fn snapshot(&self) -> Result<Value, CacheError> {
        Ok(Value::Object(self.blob.lock().unwrap().clone()))
    }
}

/// Notifier recording every message it was asked to surface.
#[derive(Default)]
pub struct RecordingNotifier {
    pub successes: Mutex<Vec<String>>,
    pub failures: Mutex<Vec<String>>,
}

impl RecordingNotifier {
    pub fn failure_messages(&self) -> Vec<String> {
        self.failures.lock().unwrap().clone()
    }

    pub fn success_count(&self) -> usize {
        self.successes.lock().unwrap().len()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn success(&self, _platform: Platform, message: &str) {
        self.successes.lock().unwrap().push(message.to_string());
    }

    async fn failure(&self, _platform: Platform, message: &str) {
        self.failures.lock().unwrap().push(message.to_string());
    }
}
