use std::collections::BTreeMap;

use crate::anomaly::{AnomalyAlert, Severity};
use crate::pipeline::AlertPipeline;
use crate::tasks::SchedulerStats;

use super::types::*;

pub const HOUR_MS: i64 = 60 * 60 * 1000;
pub const DEFAULT_MAX_AGE_MS: i64 = HOUR_MS;
pub const DEFAULT_ALERT_LIMIT: usize = 50;
pub const MAX_ALERT_LIMIT: usize = 100;

pub fn default_periods() -> Vec<Period> {
    vec![
        Period::new("last_hour", HOUR_MS),
        Period::new("last_24h", 24 * HOUR_MS),
        Period::new("last_7d", 7 * 24 * HOUR_MS),
    ]
}

fn within(alert: &AnomalyAlert, now_ms: i64, max_age_ms: i64) -> bool {
    alert.timestamp > now_ms.saturating_sub(max_age_ms)
}

/// Every severity present with a zero count, so clients see a stable shape.
fn severity_counts<'a>(alerts: impl IntoIterator<Item = &'a AnomalyAlert>) -> BTreeMap<String, usize> {
    let mut counts: BTreeMap<String, usize> =
        Severity::ALL.iter().map(|s| (s.as_str().to_string(), 0)).collect();
    for alert in alerts {
        *counts.entry(alert.severity.as_str().to_string()).or_default() += 1;
    }
    counts
}

// ============================================================
// Alerts
// ============================================================

pub fn get_recent_alerts(
    pipeline: &AlertPipeline,
    now_ms: i64,
    max_age_ms: i64,
    limit: usize,
) -> RecentAlertsResponse {
    let mut recent: Vec<AnomalyAlert> = pipeline
        .alerts()
        .snapshot()
        .into_iter()
        .filter(|a| within(a, now_ms, max_age_ms))
        .collect();
    recent.reverse();

    let by_severity = severity_counts(&recent);
    let mut by_type = BTreeMap::new();
    for alert in &recent {
        *by_type.entry(alert.alert_type.clone()).or_insert(0) += 1;
    }

    let total = recent.len();
    recent.truncate(limit);

    RecentAlertsResponse {
        alerts: recent,
        total,
        by_severity,
        by_type,
    }
}

// ============================================================
// Health & Stats
// ============================================================

pub fn get_health(pipeline: &AlertPipeline, scheduler: Option<SchedulerStats>) -> HealthResponse {
    let healthy = scheduler
        .as_ref()
        .is_none_or(|s| s.mode == crate::tasks::ExecutionMode::Inline || s.healthy_workers > 0);

    HealthResponse {
        status: if healthy { "ok" } else { "degraded" }.to_string(),
        pattern_count: pipeline.registry().len(),
        event_store_size: pipeline.events().len(),
        event_store_capacity: pipeline.events().capacity(),
        alert_store_size: pipeline.alerts().len(),
        alert_store_capacity: pipeline.alerts().capacity(),
        scheduler,
    }
}

pub fn get_stats(
    pipeline: &AlertPipeline,
    now_ms: i64,
    periods: &[Period],
    scheduler: Option<SchedulerStats>,
) -> StatsResponse {
    let alerts = pipeline.alerts().snapshot();

    let periods = periods
        .iter()
        .map(|period| {
            let matching: Vec<&AnomalyAlert> = alerts
                .iter()
                .filter(|a| within(a, now_ms, period.duration_ms))
                .collect();
            PeriodStats {
                name: period.name.clone(),
                duration_ms: period.duration_ms,
                total: matching.len(),
                by_severity: severity_counts(matching),
            }
        })
        .collect();

    StatsResponse {
        periods,
        health: get_health(pipeline, scheduler),
    }
}

// ============================================================
// Patterns
// ============================================================

pub fn list_patterns(pipeline: &AlertPipeline) -> PatternsResponse {
    PatternsResponse {
        patterns: pipeline.registry().catalogue(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::anomaly::{AnomalyContext, AnomalyEngine, AnomalyPattern, PatternRegistry, SeverityClassifier};
    use crate::broadcast::NullSink;
    use crate::config::DetectorConfig;
    use crate::error::PatternEvaluationError;
    use crate::events::Event;
    use serde_json::json;
    use std::sync::atomic::{AtomicI64, Ordering};
    use std::sync::Arc;

    const T0: i64 = 1_700_000_000_000;

    fn setup() -> (AlertPipeline, Arc<AtomicI64>) {
        let mut registry = PatternRegistry::new();
        registry
            .register(AnomalyPattern::new(
                "any_fee",
                "any positive fee",
                "fees",
                0.0,
                |e: &Event, _: &AnomalyContext| -> Result<bool, PatternEvaluationError> {
                    Ok(e.fee().is_some_and(|f| f > 0.0))
                },
            ))
            .unwrap();
        registry
            .register(
                AnomalyPattern::new(
                    "dust",
                    "tiny amount",
                    "structuring",
                    1.0,
                    |e: &Event, _: &AnomalyContext| -> Result<bool, PatternEvaluationError> {
                        Ok(e.amount().is_some_and(|a| a < 1.0))
                    },
                )
                .with_confidence(0.4),
            )
            .unwrap();

        let clock = Arc::new(AtomicI64::new(T0));
        let engine = AnomalyEngine::new(Arc::new(registry), SeverityClassifier::default());
        let detector = DetectorConfig {
            event_capacity: 50,
            alert_capacity: 50,
            window_ms: 60_000,
        };
        let now = clock.clone();
        let pipeline = AlertPipeline::new(&detector, engine, Arc::new(NullSink))
            .with_clock(Arc::new(move || now.load(Ordering::SeqCst)));
        (pipeline, clock)
    }

    fn emit(pipeline: &AlertPipeline, clock: &AtomicI64, at: i64, data: serde_json::Value) {
        clock.store(at, Ordering::SeqCst);
        pipeline.process(Event::transaction(at, data));
    }

    #[test]
    fn test_recent_alerts_newest_first_with_counts() {
        let (pipeline, clock) = setup();
        emit(&pipeline, &clock, T0 - 2 * HOUR_MS, json!({"fee": 1}));
        emit(&pipeline, &clock, T0 - 1_000, json!({"fee": 1, "amount": 0.5}));
        emit(&pipeline, &clock, T0, json!({"fee": 2}));

        let recent = get_recent_alerts(&pipeline, T0, DEFAULT_MAX_AGE_MS, 2);
        assert_eq!(recent.total, 3);
        assert_eq!(recent.alerts.len(), 2);
        assert_eq!(recent.alerts[0].timestamp, T0);
        assert_eq!(recent.by_type["any_fee"], 2);
        assert_eq!(recent.by_type["dust"], 1);
        assert_eq!(recent.by_severity["high"], 2);
        assert_eq!(recent.by_severity["low"], 1);
        assert_eq!(recent.by_severity["critical"], 0);
    }

    #[test]
    fn test_stats_per_period() {
        let (pipeline, clock) = setup();
        emit(&pipeline, &clock, T0 - 3 * 24 * HOUR_MS, json!({"fee": 1}));
        emit(&pipeline, &clock, T0 - 5 * HOUR_MS, json!({"fee": 1}));
        emit(&pipeline, &clock, T0 - 10, json!({"fee": 1}));

        let stats = get_stats(&pipeline, T0, &default_periods(), None);
        let totals: Vec<usize> = stats.periods.iter().map(|p| p.total).collect();
        assert_eq!(totals, vec![1, 2, 3]);
        assert_eq!(stats.health.pattern_count, 2);
        assert_eq!(stats.health.event_store_size, 3);
        assert_eq!(stats.health.alert_store_size, 3);
        assert_eq!(stats.health.status, "ok");
    }

    #[test]
    fn test_list_patterns() {
        let (pipeline, _) = setup();
        let types: Vec<String> = list_patterns(&pipeline)
            .patterns
            .into_iter()
            .map(|p| p.pattern_type)
            .collect();
        assert_eq!(types, vec!["any_fee", "dust"]);
    }
}
