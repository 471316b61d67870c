use crate::config::SeverityConfig;
use crate::events::Event;

use super::context::AnomalyContext;
use super::types::{category, AnomalyPattern, Severity};

/// Maps a matched pattern to a severity tier. Total and side-effect free.
#[derive(Debug, Clone, Default)]
pub struct SeverityClassifier {
    config: SeverityConfig,
}

impl SeverityClassifier {
    pub fn new(config: SeverityConfig) -> Self {
        Self { config }
    }

    pub fn classify(
        &self,
        pattern: &AnomalyPattern,
        event: &Event,
        context: &AnomalyContext,
        confidence: f64,
    ) -> Severity {
        let base = match pattern.category.as_str() {
            category::ERRORS => {
                if context.error_rate > self.config.critical_error_rate {
                    Severity::Critical
                } else {
                    Severity::High
                }
            }
            category::FEES | category::FREQUENCY | category::VOLUME | category::SECURITY => {
                Severity::High
            }
            category::VALUE => {
                let escalate_at = pattern.threshold * self.config.value_escalation_multiplier;
                if event.amount().is_some_and(|a| a >= escalate_at) {
                    Severity::High
                } else {
                    Severity::Medium
                }
            }
            category::STRUCTURING => Severity::Low,
            _ => Severity::Medium,
        };

        // NaN confidence is treated as low confidence.
        if confidence >= self.config.low_confidence_cutoff {
            base
        } else {
            base.min(Severity::Medium)
        }
    }
}
