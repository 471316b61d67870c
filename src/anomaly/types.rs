use serde::Serialize;
use uuid::Uuid;

use crate::error::PatternEvaluationError;
use crate::events::Event;

use super::context::AnomalyContext;

/// Pattern categories understood by the severity classifier.
pub mod category {
    pub const FREQUENCY: &str = "frequency";
    pub const FEES: &str = "fees";
    pub const ERRORS: &str = "errors";
    pub const VALUE: &str = "value";
    pub const VOLUME: &str = "volume";
    pub const SECURITY: &str = "security";
    pub const NETWORK: &str = "network";
    pub const STRUCTURING: &str = "structuring";
}

/// Coarse urgency tier attached to an alert.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    pub const ALL: [Severity; 4] = [Self::Low, Self::Medium, Self::High, Self::Critical];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Critical => "critical",
        }
    }
}

/// A detection rule: a predicate over an event and the recent-window context.
///
/// Implementations should be total, but the matcher still guards every call:
/// an `Err` or a panic counts as "no match" for that event only.
pub trait PatternCheck: Send + Sync {
    fn check(&self, event: &Event, context: &AnomalyContext)
        -> Result<bool, PatternEvaluationError>;
}

impl<F> PatternCheck for F
where
    F: Fn(&Event, &AnomalyContext) -> Result<bool, PatternEvaluationError> + Send + Sync,
{
    fn check(
        &self,
        event: &Event,
        context: &AnomalyContext,
    ) -> Result<bool, PatternEvaluationError> {
        self(event, context)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PatternMetadata {
    pub confidence: f64,
}

impl Default for PatternMetadata {
    fn default() -> Self {
        Self { confidence: 1.0 }
    }
}

/// A named, immutable detection rule held by the registry.
pub struct AnomalyPattern {
    pub pattern_type: String,
    pub description: String,
    pub category: String,
    pub threshold: f64,
    pub metadata: PatternMetadata,
    check: Box<dyn PatternCheck>,
}

impl AnomalyPattern {
    pub fn new(
        pattern_type: impl Into<String>,
        description: impl Into<String>,
        category: impl Into<String>,
        threshold: f64,
        check: impl PatternCheck + 'static,
    ) -> Self {
        Self {
            pattern_type: pattern_type.into(),
            description: description.into(),
            category: category.into(),
            threshold,
            metadata: PatternMetadata::default(),
            check: Box::new(check),
        }
    }

    pub fn with_confidence(mut self, confidence: f64) -> Self {
        self.metadata.confidence = confidence;
        self
    }

    pub fn check(
        &self,
        event: &Event,
        context: &AnomalyContext,
    ) -> Result<bool, PatternEvaluationError> {
        self.check.check(event, context)
    }

    pub fn info(&self) -> PatternInfo {
        PatternInfo {
            pattern_type: self.pattern_type.clone(),
            description: self.description.clone(),
            threshold: self.threshold,
            category: self.category.clone(),
        }
    }
}

impl std::fmt::Debug for AnomalyPattern {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnomalyPattern")
            .field("pattern_type", &self.pattern_type)
            .field("category", &self.category)
            .field("threshold", &self.threshold)
            .field("metadata", &self.metadata)
            .finish_non_exhaustive()
    }
}

/// Read-only catalogue entry for a registered pattern.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PatternInfo {
    #[serde(rename = "type")]
    pub pattern_type: String,
    pub description: String,
    pub threshold: f64,
    pub category: String,
}

/// Output record for one (event, matching pattern) pair.
#[derive(Debug, Clone, Serialize)]
pub struct AnomalyAlert {
    pub id: Uuid,
    #[serde(rename = "type")]
    pub alert_type: String,
    pub severity: Severity,
    pub description: String,
    pub event: Event,
    pub context: AnomalyContext,
    /// Creation time in ms since the Unix epoch.
    pub timestamp: i64,
    pub confidence: f64,
    pub category: String,
}
