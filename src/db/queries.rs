use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use uuid::Uuid;

use crate::models::analysis::{AnalysisJob, AnalysisPatch, Platform};
use crate::models::status::CanonicalStatus;

fn row_to_analysis(row: &PgRow) -> Result<AnalysisJob, sqlx::Error> {
    let platform_str: String = row.try_get("platform")?;
    let platform = platform_str
        .parse::<Platform>()
        .map_err(|e| sqlx::Error::Decode(Box::new(e)))?;

    // Stored values are canonical; the fail-closed mapper also covers any
    // row written before the vocabulary settled.
    let status_str: String = row.try_get("status")?;
    let status = CanonicalStatus::from_upstream(&status_str);

    Ok(AnalysisJob {
        id: row.try_get("id")?,
        user_id: row.try_get("user_id")?,
        platform,
        username: row.try_get("username")?,
        job_id: row.try_get("job_id")?,
        status,
        result: row.try_get("result")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

/// Insert a new analysis row. The job starts out `processing` with no job_id;
/// the queue token is patched in once the remote submission returns.
pub async fn create_analysis(
    pool: &PgPool,
    user_id: Option<&str>,
    platform: Platform,
    username: &str,
) -> Result<AnalysisJob, sqlx::Error> {
    let row = sqlx::query(
        r#"
        INSERT INTO analysis_states (user_id, platform, username, status)
        VALUES ($1, $2, $3, 'processing')
        RETURNING id, user_id, platform, username, job_id, status, result,
                  created_at, updated_at
        "#,
    )
    .bind(user_id)
    .bind(platform.to_string())
    .bind(username)
    .fetch_one(pool)
    .await?;

    row_to_analysis(&row)
}

/// Get an analysis row by ID
pub async fn get_analysis(pool: &PgPool, id: Uuid) -> Result<Option<AnalysisJob>, sqlx::Error> {
    let row = sqlx::query(
        r#"
        SELECT id, user_id, platform, username, job_id, status, result,
               created_at, updated_at
        FROM analysis_states
        WHERE id = $1
        "#,
    )
    .bind(id)
    .fetch_optional(pool)
    .await?;

    row.as_ref().map(row_to_analysis).transpose()
}

/// Apply a partial update. Unset patch fields keep their current value;
/// updated_at is stamped on every call.
pub async fn update_analysis(
    pool: &PgPool,
    id: Uuid,
    patch: &AnalysisPatch,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        UPDATE analysis_states
        SET status = COALESCE($1, status),
            result = COALESCE($2, result),
            job_id = COALESCE($3, job_id),
            updated_at = NOW()
        WHERE id = $4
        "#,
    )
    .bind(patch.status.map(|s| s.to_string()))
    .bind(patch.result.as_ref())
    .bind(patch.job_id.as_deref())
    .bind(id)
    .execute(pool)
    .await?;

    Ok(())
}

/// Most recent analysis for a (user, platform) pair. Rows are never deleted,
/// so the latest created_at wins.
pub async fn latest_analysis(
    pool: &PgPool,
    user_id: &str,
    platform: Platform,
) -> Result<Option<AnalysisJob>, sqlx::Error> {
    let row = sqlx::query(
        r#"
        SELECT id, user_id, platform, username, job_id, status, result,
               created_at, updated_at
        FROM analysis_states
        WHERE user_id = $1 AND platform = $2
        ORDER BY created_at DESC
        LIMIT 1
        "#,
    )
    .bind(user_id)
    .bind(platform.to_string())
    .fetch_optional(pool)
    .await?;

    row.as_ref().map(row_to_analysis).transpose()
}

/// In-flight rows no live poller has touched for `stale_secs` (for the
/// recovery worker). An active poller stamps updated_at every tick.
pub async fn orphaned_analyses(
    pool: &PgPool,
    stale_secs: i64,
    limit: i64,
) -> Result<Vec<AnalysisJob>, sqlx::Error> {
    let rows = sqlx::query(
        r#"
        SELECT id, user_id, platform, username, job_id, status, result,
               created_at, updated_at
        FROM analysis_states
        WHERE status IN ('queued', 'processing')
          AND updated_at < NOW() - ($1 * INTERVAL '1 second')
        ORDER BY updated_at ASC
        LIMIT $2
        "#,
    )
    .bind(stale_secs)
    .bind(limit)
    .fetch_all(pool)
    .await?;

    rows.iter().map(row_to_analysis).collect()
}
