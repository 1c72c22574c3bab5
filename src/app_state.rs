use sqlx::PgPool;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::db::store::AnalysisStore;
use crate::services::{
    cache::ProfileCache, enrichment::EnrichmentApi, notify::Notifier, poller::StatusPoller,
};

/// Shared application state passed to all route handlers.
#[derive(Clone)]
pub struct AppState {
    pub db: PgPool,
    pub store: Arc<dyn AnalysisStore>,
    pub enrichment: Arc<dyn EnrichmentApi>,
    pub cache: Arc<dyn ProfileCache>,
    pub notifier: Arc<dyn Notifier>,
    pub poller: Arc<StatusPoller>,
    /// Cancellation tokens for the pollers this process currently owns.
    pub active_polls: Arc<RwLock<HashMap<Uuid, CancellationToken>>>,
}

impl AppState {
    pub fn new(
        db: PgPool,
        store: Arc<dyn AnalysisStore>,
        enrichment: Arc<dyn EnrichmentApi>,
        cache: Arc<dyn ProfileCache>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        let poller = Arc::new(StatusPoller::new(
            store.clone(),
            enrichment.clone(),
            cache.clone(),
            notifier.clone(),
        ));

        Self {
            db,
            store,
            enrichment,
            cache,
            notifier,
            poller,
            active_polls: Arc::new(RwLock::new(HashMap::new())),
        }
    }
}
