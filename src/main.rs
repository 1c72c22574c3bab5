mod app_state;
mod config;
mod db;
mod models;
mod routes;
mod services;

use axum::{routing::get, routing::post, Router};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::path::Path;
use std::sync::Arc;
use tower_http::compression::CompressionLayer;
use tower_http::cors::CorsLayer;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use app_state::AppState;
use config::AppConfig;
use db::store::PgAnalysisStore;
use services::{cache::FileProfileCache, enrichment::EnrichmentClient, notify::LogNotifier};

#[tokio::main]
async fn main() {
    // Initialize structured logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .json()
        .init();

    // Load configuration from environment
    let config = AppConfig::from_env().expect("Failed to load configuration from environment");

    tracing::info!("Initializing profile-enrich server");

    // Initialize Prometheus metrics recorder
    let prometheus_handle = PrometheusBuilder::new()
        .install_recorder()
        .expect("Failed to install Prometheus metrics recorder");
    let prometheus_handle = Arc::new(prometheus_handle);

    // Register application metrics
    metrics::describe_counter!("enrichment_jobs_total", "Total analysis jobs submitted");
    metrics::describe_counter!(
        "enrichment_jobs_completed",
        "Total analysis jobs that reached completed"
    );
    metrics::describe_counter!(
        "enrichment_jobs_failed",
        "Total analysis jobs that reached failed"
    );
    metrics::describe_counter!(
        "enrichment_job_restarts",
        "Total restarts after the remote queue lost a job"
    );
    metrics::describe_gauge!(
        "enrichment_active_pollers",
        "Poll loops currently tracking a job"
    );

    // Initialize database connection pool
    tracing::info!("Connecting to PostgreSQL database");
    let db_pool = db::init_pool(&config.database_url)
        .await
        .expect("Failed to connect to database");

    // Run database migrations
    tracing::info!("Running database migrations");
    db::run_migrations(&db_pool)
        .await
        .expect("Failed to run database migrations");

    // Initialize remote analysis API client
    tracing::info!("Initializing enrichment API client");
    let enrichment = EnrichmentClient::new(&config.enrichment_api_url)
        .expect("Failed to initialize enrichment API client");

    // Create shared application state
    let state = AppState::new(
        db_pool.clone(),
        Arc::new(PgAnalysisStore::new(db_pool)),
        Arc::new(enrichment),
        Arc::new(FileProfileCache::new(Path::new(&config.cache_dir))),
        Arc::new(LogNotifier),
    );

    // Build API routes
    let app = Router::new()
        .route("/health", get(routes::health::health_check))
        .route("/api/v1/analyses", post(routes::analyses::start_analysis))
        .route(
            "/api/v1/analyses/latest",
            get(routes::analyses::latest_analysis),
        )
        .route("/api/v1/analyses/{id}", get(routes::analyses::get_analysis))
        .route(
            "/api/v1/analyses/{id}/cancel",
            post(routes::analyses::cancel_analysis),
        )
        .with_state(state)
        // Prometheus metrics endpoint (separate state)
        .route(
            "/metrics",
            get(routes::metrics::prometheus_metrics).with_state(prometheus_handle),
        )
        .layer(TraceLayer::new_for_http())
        .layer(CompressionLayer::new())
        .layer(CorsLayer::permissive())
        .layer(RequestBodyLimitLayer::new(64 * 1024)); // 64 KB limit

    tracing::info!("Starting profile-enrich on {}", config.bind_addr);

    let listener = tokio::net::TcpListener::bind(&config.bind_addr)
        .await
        .expect("Failed to bind to address");

    tracing::info!("Server listening on {}", config.bind_addr);

    axum::serve(listener, app).await.expect("Server error");
}
