use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::anomaly::{AnomalyAlert, PatternInfo};
use crate::tasks::SchedulerStats;

// ============================================================
// Query params
// ============================================================

#[derive(Debug, Default, Deserialize)]
pub struct AlertParams {
    pub max_age_ms: Option<i64>,
    pub limit: Option<usize>,
}

// ============================================================
// Responses
// ============================================================

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

#[derive(Debug, Serialize)]
pub struct RecentAlertsResponse {
    /// Newest first, truncated to the requested limit.
    pub alerts: Vec<AnomalyAlert>,
    /// Matches inside the age window, before the limit is applied.
    pub total: usize,
    pub by_severity: BTreeMap<String, usize>,
    pub by_type: BTreeMap<String, usize>,
}

/// Named trailing window for `get_stats`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Period {
    pub name: String,
    pub duration_ms: i64,
}

impl Period {
    pub fn new(name: impl Into<String>, duration_ms: i64) -> Self {
        Self {
            name: name.into(),
            duration_ms,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct PeriodStats {
    pub name: String,
    pub duration_ms: i64,
    pub total: usize,
    pub by_severity: BTreeMap<String, usize>,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub pattern_count: usize,
    pub event_store_size: usize,
    pub event_store_capacity: usize,
    pub alert_store_size: usize,
    pub alert_store_capacity: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scheduler: Option<SchedulerStats>,
}

#[derive(Debug, Serialize)]
pub struct StatsResponse {
    pub periods: Vec<PeriodStats>,
    pub health: HealthResponse,
}

#[derive(Debug, Serialize)]
pub struct PatternsResponse {
    pub patterns: Vec<PatternInfo>,
}
