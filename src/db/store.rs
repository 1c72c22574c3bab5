use async_trait::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

use crate::db::queries;
use crate::models::analysis::{AnalysisJob, AnalysisPatch};

/// Row-store face of the persistence adapter.
///
/// Failures are not retried here; retry policy belongs to the caller.
#[async_trait]
pub trait AnalysisStore: Send + Sync {
    async fn read_job(&self, id: Uuid) -> Result<Option<AnalysisJob>, StoreError>;

    /// Apply a partial update, stamping updated_at.
    async fn update_job(&self, id: Uuid, patch: AnalysisPatch) -> Result<(), StoreError>;
}

/// PostgreSQL-backed analysis store.
pub struct PgAnalysisStore {
    pool: PgPool,
}

impl PgAnalysisStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl AnalysisStore for PgAnalysisStore {
    async fn read_job(&self, id: Uuid) -> Result<Option<AnalysisJob>, StoreError> {
        Ok(queries::get_analysis(&self.pool, id).await?)
    }

    async fn update_job(&self, id: Uuid, patch: AnalysisPatch) -> Result<(), StoreError> {
        Ok(queries::update_analysis(&self.pool, id, &patch).await?)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("database operation failed: {0}")]
    Database(#[from] sqlx::Error),
}
