use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use crate::config::{PatternConfig, SeverityConfig};
use crate::error::PatternEvaluationError;
use crate::events::Event;

use super::context::AnomalyContext;
use super::registry::PatternRegistry;
use super::severity::SeverityClassifier;
use super::types::{AnomalyPattern, Severity};

/// Evaluates every registered pattern against an event, isolating failures
/// so one misbehaving rule cannot block the others.
pub struct PatternMatcher {
    registry: Arc<PatternRegistry>,
}

impl PatternMatcher {
    pub fn new(registry: Arc<PatternRegistry>) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &Arc<PatternRegistry> {
        &self.registry
    }

    /// Patterns that match `event`, in registration order. Returns nothing
    /// without consulting any pattern if the event fails validation.
    pub fn match_all(&self, event: &Event, context: &AnomalyContext) -> Vec<Arc<AnomalyPattern>> {
        if let Err(e) = event.validate() {
            tracing::warn!(error = %e, kind = event.kind.as_str(), "Skipping invalid event");
            return Vec::new();
        }

        let mut matches = Vec::new();
        for pattern in self.registry.iter() {
            match evaluate(pattern, event, context) {
                Ok(true) => matches.push(pattern.clone()),
                Ok(false) => {}
                Err(e) => {
                    tracing::warn!(
                        pattern = %pattern.pattern_type,
                        error = %e,
                        "Pattern evaluation failed, treating as no match"
                    );
                }
            }
        }
        matches
    }
}

/// Run one pattern's check, converting a panic into an evaluation error.
pub fn evaluate(
    pattern: &AnomalyPattern,
    event: &Event,
    context: &AnomalyContext,
) -> Result<bool, PatternEvaluationError> {
    panic::catch_unwind(AssertUnwindSafe(|| pattern.check(event, context))).unwrap_or_else(|_| {
        Err(PatternEvaluationError::Panicked {
            pattern: pattern.pattern_type.clone(),
        })
    })
}

/// A matched pattern with its classified severity.
#[derive(Debug, Clone)]
pub struct Detection {
    pub pattern: Arc<AnomalyPattern>,
    pub severity: Severity,
    pub confidence: f64,
}

/// The anomaly detection engine: pattern matching plus severity classification.
pub struct AnomalyEngine {
    matcher: PatternMatcher,
    classifier: SeverityClassifier,
}

impl AnomalyEngine {
    pub fn new(registry: Arc<PatternRegistry>, classifier: SeverityClassifier) -> Self {
        Self {
            matcher: PatternMatcher::new(registry),
            classifier,
        }
    }

    /// Engine loaded with the built-in rule table.
    pub fn from_config(patterns: &PatternConfig, severity: &SeverityConfig) -> eyre::Result<Self> {
        let registry = PatternRegistry::with_defaults(patterns)?;
        Ok(Self::new(
            Arc::new(registry),
            SeverityClassifier::new(severity.clone()),
        ))
    }

    pub fn registry(&self) -> &Arc<PatternRegistry> {
        self.matcher.registry()
    }

    pub fn detect(&self, event: &Event, context: &AnomalyContext) -> Vec<Detection> {
        self.matcher
            .match_all(event, context)
            .into_iter()
            .map(|pattern| {
                let confidence = pattern.metadata.confidence;
                let severity = self.classifier.classify(&pattern, event, context, confidence);
                Detection {
                    pattern,
                    severity,
                    confidence,
                }
            })
            .collect()
    }
}
