pub mod handlers;
pub mod queries;
pub mod types;

use axum::{routing::get, Router};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::pipeline::AlertPipeline;
use crate::tasks::{Executor, SchedulerStats};

#[derive(Clone)]
pub struct AppState {
    pub pipeline: Arc<AlertPipeline>,
    pub executor: Option<Arc<dyn Executor>>,
}

impl AppState {
    fn scheduler_stats(&self) -> Option<SchedulerStats> {
        self.executor.as_ref().map(|e| e.stats())
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/v1/health", get(handlers::health))
        .route("/api/v1/stats", get(handlers::stats))
        .route("/api/v1/alerts", get(handlers::recent_alerts))
        .route("/api/v1/patterns", get(handlers::patterns))
        .with_state(Arc::new(state))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}

pub async fn serve(state: AppState, host: &str, port: u16) -> eyre::Result<()> {
    let app = router(state);
    let addr = format!("{}:{}", host, port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!(%addr, "API server listening");
    axum::serve(listener, app).await?;
    Ok(())
}
