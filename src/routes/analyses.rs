use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use garde::Validate;
use serde::Deserialize;
use serde_json::json;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::app_state::AppState;
use crate::db::queries;
use crate::models::analysis::{AnalysisPatch, Platform};
use crate::models::api::{AnalysisResponse, StartAnalysisRequest, StartAnalysisResponse};
use crate::models::status::CanonicalStatus;

/// POST /api/v1/analyses — Submit a profile for analysis and start tracking.
pub async fn start_analysis(
    State(state): State<AppState>,
    Json(req): Json<StartAnalysisRequest>,
) -> Result<(StatusCode, Json<StartAnalysisResponse>), StatusCode> {
    req.validate().map_err(|_| StatusCode::BAD_REQUEST)?;

    let analysis = queries::create_analysis(
        &state.db,
        req.user_id.as_deref(),
        req.platform,
        &req.username,
    )
    .await
    .map_err(|e| {
        tracing::error!(error = %e, "Failed to create analysis row");
        StatusCode::INTERNAL_SERVER_ERROR
    })?;

    metrics::counter!("enrichment_jobs_total").increment(1);

    let receipt = match state.enrichment.submit_profile(req.platform, &req.username).await {
        Ok(receipt) => receipt,
        Err(e) => {
            tracing::warn!(
                analysis_id = %analysis.id,
                username = %req.username,
                error = %e,
                "Profile submission failed"
            );
            let patch = AnalysisPatch::outcome(
                CanonicalStatus::Failed,
                json!({ "error": "Failed to submit analysis" }),
            );
            if let Err(e) = queries::update_analysis(&state.db, analysis.id, &patch).await {
                tracing::error!(analysis_id = %analysis.id, error = %e, "Failed to record submission failure");
            }
            return Err(StatusCode::BAD_GATEWAY);
        }
    };

    let status = CanonicalStatus::from_upstream(&receipt.status);
    let patch = AnalysisPatch::job_assignment(receipt.job_id.clone(), status);
    queries::update_analysis(&state.db, analysis.id, &patch)
        .await
        .map_err(|e| {
            tracing::error!(analysis_id = %analysis.id, error = %e, "Failed to store job id");
            StatusCode::INTERNAL_SERVER_ERROR
        })?;

    spawn_poller(&state, analysis.id, req.platform, receipt.job_id.clone()).await;

    tracing::info!(
        analysis_id = %analysis.id,
        platform = %req.platform,
        job_id = %receipt.job_id,
        "Analysis submitted, tracking started"
    );

    Ok((
        StatusCode::ACCEPTED,
        Json(StartAnalysisResponse {
            analysis_id: analysis.id,
            job_id: receipt.job_id,
            status,
        }),
    ))
}

/// GET /api/v1/analyses/{id} — Read an analysis row.
pub async fn get_analysis(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<AnalysisResponse>, StatusCode> {
    let analysis = queries::get_analysis(&state.db, id)
        .await
        .map_err(|e| {
            tracing::error!(analysis_id = %id, error = %e, "Failed to read analysis");
            StatusCode::INTERNAL_SERVER_ERROR
        })?
        .ok_or(StatusCode::NOT_FOUND)?;

    Ok(Json(analysis.into()))
}

#[derive(Debug, Deserialize)]
pub struct LatestParams {
    pub user_id: String,
    pub platform: Platform,
}

/// GET /api/v1/analyses/latest — Most recent analysis for a (user, platform)
/// pair. Superseded rows are never deleted; the newest one wins.
pub async fn latest_analysis(
    State(state): State<AppState>,
    Query(params): Query<LatestParams>,
) -> Result<Json<AnalysisResponse>, StatusCode> {
    let analysis = queries::latest_analysis(&state.db, &params.user_id, params.platform)
        .await
        .map_err(|e| {
            tracing::error!(user_id = %params.user_id, error = %e, "Latest-analysis lookup failed");
            StatusCode::INTERNAL_SERVER_ERROR
        })?
        .ok_or(StatusCode::NOT_FOUND)?;

    Ok(Json(analysis.into()))
}

/// POST /api/v1/analyses/{id}/cancel — Stop the poller owning this analysis.
/// The row is left as-is; only the tracking loop is torn down.
pub async fn cancel_analysis(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> StatusCode {
    match state.active_polls.write().await.remove(&id) {
        Some(token) => {
            token.cancel();
            tracing::info!(analysis_id = %id, "Poll cancelled");
            StatusCode::NO_CONTENT
        }
        None => StatusCode::NOT_FOUND,
    }
}

/// Run the poller for a freshly submitted analysis on a background task,
/// tracking its cancellation token for the cancel endpoint.
async fn spawn_poller(state: &AppState, analysis_id: Uuid, platform: Platform, job_id: String) {
    let token = CancellationToken::new();
    state
        .active_polls
        .write()
        .await
        .insert(analysis_id, token.clone());

    let state = state.clone();
    tokio::spawn(async move {
        state
            .poller
            .run(Some(analysis_id), platform, Some(job_id), &token)
            .await;
        state.active_polls.write().await.remove(&analysis_id);
    });
}
