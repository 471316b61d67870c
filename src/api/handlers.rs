use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::Json;
use std::sync::Arc;

use super::queries;
use super::types::*;
use super::AppState;

type ApiResult<T> = Result<Json<T>, (StatusCode, Json<ErrorResponse>)>;

fn api_error(status: StatusCode, msg: impl Into<String>) -> (StatusCode, Json<ErrorResponse>) {
    (
        status,
        Json(ErrorResponse {
            error: msg.into(),
        }),
    )
}

// ============================================================
// Health & Stats
// ============================================================

pub async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(queries::get_health(&state.pipeline, state.scheduler_stats()))
}

pub async fn stats(State(state): State<Arc<AppState>>) -> Json<StatsResponse> {
    let now = state.pipeline.now_ms();
    Json(queries::get_stats(
        &state.pipeline,
        now,
        &queries::default_periods(),
        state.scheduler_stats(),
    ))
}

// ============================================================
// Alerts & Patterns
// ============================================================

pub async fn recent_alerts(
    State(state): State<Arc<AppState>>,
    Query(params): Query<AlertParams>,
) -> ApiResult<RecentAlertsResponse> {
    let max_age_ms = params.max_age_ms.unwrap_or(queries::DEFAULT_MAX_AGE_MS);
    if max_age_ms <= 0 {
        return Err(api_error(StatusCode::BAD_REQUEST, "max_age_ms must be positive"));
    }
    let limit = params
        .limit
        .unwrap_or(queries::DEFAULT_ALERT_LIMIT)
        .min(queries::MAX_ALERT_LIMIT);

    let now = state.pipeline.now_ms();
    Ok(Json(queries::get_recent_alerts(
        &state.pipeline,
        now,
        max_age_ms,
        limit,
    )))
}

pub async fn patterns(State(state): State<Arc<AppState>>) -> Json<PatternsResponse> {
    Json(queries::list_patterns(&state.pipeline))
}
