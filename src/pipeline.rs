use serde_json::Value as JsonValue;
use std::sync::Arc;
use uuid::Uuid;

use crate::anomaly::context;
use crate::anomaly::{AnomalyAlert, AnomalyEngine, PatternRegistry};
use crate::broadcast::AlertSink;
use crate::config::{Config, DetectorConfig};
use crate::error::BroadcastError;
use crate::events::Event;
use crate::store::BoundedStore;

/// Source of "now" in ms since the Unix epoch.
pub type Clock = Arc<dyn Fn() -> i64 + Send + Sync>;

pub fn system_clock() -> Clock {
    Arc::new(|| chrono::Utc::now().timestamp_millis())
}

/// Synchronous detection entry point:
/// 1. Validate and store the event
/// 2. Build the trailing-window context
/// 3. Match and classify patterns
/// 4. Store and broadcast one alert per match
pub struct AlertPipeline {
    events: BoundedStore<Event>,
    alerts: BoundedStore<AnomalyAlert>,
    engine: AnomalyEngine,
    sink: Arc<dyn AlertSink>,
    window_ms: i64,
    clock: Clock,
}

impl AlertPipeline {
    pub fn new(detector: &DetectorConfig, engine: AnomalyEngine, sink: Arc<dyn AlertSink>) -> Self {
        Self {
            events: BoundedStore::new(detector.event_capacity),
            alerts: BoundedStore::new(detector.alert_capacity),
            engine,
            sink,
            window_ms: detector.window_ms,
            clock: system_clock(),
        }
    }

    /// Initialize the pipeline with the built-in rule table.
    pub fn from_config(config: &Config, sink: Arc<dyn AlertSink>) -> eyre::Result<Self> {
        let engine = AnomalyEngine::from_config(&config.patterns, &config.severity)?;
        Ok(Self::new(&config.detector, engine, sink))
    }

    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    pub fn now_ms(&self) -> i64 {
        (self.clock)()
    }

    /// Run detection for one event and return every alert it produced.
    /// Never fails: invalid events and broken rules degrade to no alerts.
    pub fn process(&self, event: Event) -> Vec<AnomalyAlert> {
        if let Err(e) = event.validate() {
            tracing::warn!(error = %e, kind = event.kind.as_str(), "Dropping invalid event");
            return Vec::new();
        }

        self.events.push(event.clone());

        let now = self.now_ms();
        let context = context::build(&self.events, now, self.window_ms);
        let detections = self.engine.detect(&event, &context);

        let mut alerts = Vec::with_capacity(detections.len());
        for detection in detections {
            let alert = AnomalyAlert {
                id: Uuid::new_v4(),
                alert_type: detection.pattern.pattern_type.clone(),
                severity: detection.severity,
                description: detection.pattern.description.clone(),
                event: event.clone(),
                context: context.clone(),
                timestamp: now,
                confidence: detection.confidence,
                category: detection.pattern.category.clone(),
            };

            self.alerts.push(alert.clone());

            tracing::warn!(
                alert_id = %alert.id,
                alert_type = %alert.alert_type,
                severity = alert.severity.as_str(),
                confidence = alert.confidence,
                "ANOMALY DETECTED"
            );

            match self.sink.publish(&alert) {
                Ok(()) => {}
                Err(BroadcastError::NoSubscribers) => {
                    tracing::debug!(alert_id = %alert.id, "No subscribers for alert");
                }
                Err(e) => {
                    tracing::warn!(alert_id = %alert.id, error = %e, "Failed to broadcast alert");
                }
            }

            alerts.push(alert);
        }

        alerts
    }

    /// Validate untyped input and run detection on it.
    pub fn process_json(&self, raw: &JsonValue) -> Vec<AnomalyAlert> {
        match Event::from_json(raw) {
            Ok(event) => self.process(event),
            Err(e) => {
                tracing::warn!(error = %e, "Dropping malformed event");
                Vec::new()
            }
        }
    }

    pub fn events(&self) -> &BoundedStore<Event> {
        &self.events
    }

    pub fn alerts(&self) -> &BoundedStore<AnomalyAlert> {
        &self.alerts
    }

    pub fn registry(&self) -> &Arc<PatternRegistry> {
        self.engine.registry()
    }

    pub fn window_ms(&self) -> i64 {
        self.window_ms
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::anomaly::{AnomalyContext, AnomalyPattern, SeverityClassifier};
    use crate::broadcast::ChannelSink;
    use crate::error::PatternEvaluationError;
    use serde_json::json;

    const NOW: i64 = 1_700_000_000_000;

    struct FailingSink;

    impl AlertSink for FailingSink {
        fn publish(&self, _alert: &AnomalyAlert) -> Result<(), BroadcastError> {
            Err(BroadcastError::Rejected("subscriber gone".to_string()))
        }
    }

    fn pipeline_with(patterns: Vec<AnomalyPattern>, sink: Arc<dyn AlertSink>) -> AlertPipeline {
        let mut registry = PatternRegistry::new();
        for p in patterns {
            registry.register(p).unwrap();
        }
        let engine = AnomalyEngine::new(Arc::new(registry), SeverityClassifier::default());
        let detector = DetectorConfig {
            event_capacity: 5,
            alert_capacity: 3,
            window_ms: 60_000,
        };
        AlertPipeline::new(&detector, engine, sink).with_clock(Arc::new(|| NOW))
    }

    fn fee_above(limit: f64) -> AnomalyPattern {
        AnomalyPattern::new(
            "fee_above",
            "fee above limit",
            "fees",
            limit,
            move |e: &Event, _: &AnomalyContext| -> Result<bool, PatternEvaluationError> {
                Ok(e.fee().is_some_and(|f| f > limit))
            },
        )
    }

    #[test]
    fn test_process_stores_and_alerts() {
        let sink = Arc::new(ChannelSink::new(8));
        let mut rx = sink.subscribe();
        let pipeline = pipeline_with(vec![fee_above(50.0)], sink);

        assert!(pipeline.process(Event::transaction(NOW, json!({"fee": 10}))).is_empty());
        let alerts = pipeline.process(Event::transaction(NOW, json!({"fee": 60})));
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].alert_type, "fee_above");
        assert_eq!(alerts[0].timestamp, NOW);
        assert_eq!(alerts[0].context.transaction_volume, 2);

        assert_eq!(pipeline.events().len(), 2);
        assert_eq!(pipeline.alerts().snapshot()[0].id, alerts[0].id);
        assert_eq!(rx.try_recv().unwrap().id, alerts[0].id);
    }

    #[test]
    fn test_broadcast_failure_is_not_fatal() {
        let pipeline = pipeline_with(vec![fee_above(1.0)], Arc::new(FailingSink));
        let alerts = pipeline.process(Event::transaction(NOW, json!({"fee": 5})));
        assert_eq!(alerts.len(), 1);
        assert_eq!(pipeline.alerts().len(), 1);
    }

    #[test]
    fn test_alert_store_is_bounded() {
        let pipeline = pipeline_with(vec![fee_above(1.0)], Arc::new(ChannelSink::new(1)));
        let mut ids = Vec::new();
        for _ in 0..5 {
            ids.extend(pipeline.process(Event::transaction(NOW, json!({"fee": 5}))).into_iter().map(|a| a.id));
        }
        let stored: Vec<_> = pipeline.alerts().snapshot().into_iter().map(|a| a.id).collect();
        assert_eq!(stored, ids[2..].to_vec());
    }

    #[test]
    fn test_invalid_events_are_dropped() {
        let pipeline = pipeline_with(vec![fee_above(0.0)], Arc::new(ChannelSink::new(1)));
        assert!(pipeline.process(Event::transaction(NOW, json!(null))).is_empty());
        assert!(pipeline
            .process_json(&json!({"type": "transaction", "timestamp": "now", "data": {"fee": 9}}))
            .is_empty());
        assert!(pipeline.events().is_empty());
    }
}
