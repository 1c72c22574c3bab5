use profile_enrich::{
    config::AppConfig,
    db::{self, queries, store::PgAnalysisStore},
    models::analysis::{AnalysisJob, AnalysisPatch},
    models::status::CanonicalStatus,
    services::{
        cache::FileProfileCache,
        enrichment::{EnrichmentApi, EnrichmentClient},
        notify::LogNotifier,
        poller::StatusPoller,
    },
};
use sqlx::PgPool;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

const SCAN_INTERVAL_MS: u64 = 30_000;
const BATCH_SIZE: i64 = 8;

// A live poller stamps its row every poll interval (5 s); a row untouched
// for this long has no owner.
const STALE_AFTER_SECS: i64 = 60;

#[tokio::main]
async fn main() {
    // Initialize structured logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .json()
        .init();

    tracing::info!("Starting enrichment recovery worker");

    // Load configuration
    let config = AppConfig::from_env().expect("Failed to load configuration");

    // Initialize database
    tracing::info!("Connecting to PostgreSQL");
    let db_pool = db::init_pool(&config.database_url)
        .await
        .expect("Failed to connect to database");

    // Initialize services
    tracing::info!("Initializing services");
    let enrichment: Arc<dyn EnrichmentApi> = Arc::new(
        EnrichmentClient::new(&config.enrichment_api_url)
            .expect("Failed to initialize enrichment API client"),
    );

    let poller = StatusPoller::new(
        Arc::new(PgAnalysisStore::new(db_pool.clone())),
        enrichment.clone(),
        Arc::new(FileProfileCache::new(Path::new(&config.cache_dir))),
        Arc::new(LogNotifier),
    );

    tracing::info!("Worker ready, scanning for orphaned analyses");

    // Main processing loop
    loop {
        match adopt_orphans(&db_pool, enrichment.as_ref(), &poller).await {
            Ok(0) => {
                tracing::trace!("No orphaned analyses, sleeping");
                sleep(Duration::from_millis(SCAN_INTERVAL_MS)).await;
            }
            Ok(adopted) => {
                tracing::debug!(adopted, "Batch finished, rescanning");
            }
            Err(e) => {
                tracing::error!(error = %e, "Error scanning for orphans, will retry");
                sleep(Duration::from_millis(SCAN_INTERVAL_MS)).await;
            }
        }
    }
}

/// Find in-flight analyses no live poller has stamped recently and drive
/// each to a terminal state. Returns the number of analyses adopted.
async fn adopt_orphans(
    pool: &PgPool,
    enrichment: &dyn EnrichmentApi,
    poller: &StatusPoller,
) -> Result<usize, Box<dyn std::error::Error>> {
    let orphans = queries::orphaned_analyses(pool, STALE_AFTER_SECS, BATCH_SIZE).await?;
    let adopted = orphans.len();

    for analysis in orphans {
        tracing::info!(
            analysis_id = %analysis.id,
            platform = %analysis.platform,
            username = %analysis.username,
            "Adopting orphaned analysis"
        );

        let job_id = match ensure_job_id(pool, enrichment, &analysis).await {
            Ok(job_id) => job_id,
            Err(e) => {
                tracing::warn!(analysis_id = %analysis.id, error = %e, "Could not obtain a job id");
                continue;
            }
        };

        // The worker owns this poll to termination; nothing cancels it.
        let cancel = CancellationToken::new();
        let exit = poller
            .run(Some(analysis.id), analysis.platform, Some(job_id), &cancel)
            .await;

        tracing::info!(analysis_id = %analysis.id, exit = ?exit, "Orphan resolved");
    }

    Ok(adopted)
}

/// Rows orphaned before the submission round-trip finished have no job id
/// yet; re-issue the submission for those before polling.
async fn ensure_job_id(
    pool: &PgPool,
    enrichment: &dyn EnrichmentApi,
    analysis: &AnalysisJob,
) -> Result<String, Box<dyn std::error::Error>> {
    if let Some(job_id) = analysis.job_id.as_ref().filter(|id| !id.is_empty()) {
        return Ok(job_id.clone());
    }

    let receipt = enrichment
        .submit_profile(analysis.platform, &analysis.username)
        .await?;

    let status = CanonicalStatus::from_upstream(&receipt.status);
    let patch = AnalysisPatch::job_assignment(receipt.job_id.clone(), status);
    queries::update_analysis(pool, analysis.id, &patch).await?;

    Ok(receipt.job_id)
}
