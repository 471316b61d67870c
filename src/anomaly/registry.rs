use std::sync::Arc;

use crate::config::PatternConfig;

use super::rules;
use super::types::{AnomalyPattern, PatternInfo};

/// Flat, ordered collection of detection rules. Populated once at startup;
/// iteration follows registration order.
#[derive(Debug, Default)]
pub struct PatternRegistry {
    patterns: Vec<Arc<AnomalyPattern>>,
}

impl PatternRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding the built-in rule table.
    pub fn with_defaults(config: &PatternConfig) -> eyre::Result<Self> {
        let mut registry = Self::new();
        for pattern in rules::default_patterns(config) {
            registry.register(pattern)?;
        }
        tracing::info!(patterns = registry.len(), "Pattern registry loaded");
        Ok(registry)
    }

    /// Add a pattern. Pattern types must be unique.
    pub fn register(&mut self, pattern: AnomalyPattern) -> eyre::Result<()> {
        if self.get(&pattern.pattern_type).is_some() {
            return Err(eyre::eyre!(
                "Pattern '{}' is already registered",
                pattern.pattern_type
            ));
        }
        self.patterns.push(Arc::new(pattern));
        Ok(())
    }

    pub fn get(&self, pattern_type: &str) -> Option<&Arc<AnomalyPattern>> {
        self.patterns.iter().find(|p| p.pattern_type == pattern_type)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<AnomalyPattern>> {
        self.patterns.iter()
    }

    pub fn len(&self) -> usize {
        self.patterns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }

    pub fn catalogue(&self) -> Vec<PatternInfo> {
        self.patterns.iter().map(|p| p.info()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::anomaly::context::AnomalyContext;
    use crate::error::PatternEvaluationError;
    use crate::events::Event;

    fn never(_: &Event, _: &AnomalyContext) -> Result<bool, PatternEvaluationError> {
        Ok(false)
    }

    #[test]
    fn test_duplicate_rejected() {
        let mut registry = PatternRegistry::new();
        registry
            .register(AnomalyPattern::new("a", "first", "misc", 1.0, never))
            .unwrap();
        assert!(registry
            .register(AnomalyPattern::new("a", "again", "misc", 2.0, never))
            .is_err());
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.get("a").unwrap().description, "first");
    }

    #[test]
    fn test_catalogue_preserves_order() {
        let registry = PatternRegistry::with_defaults(&PatternConfig::default()).unwrap();
        let catalogue = registry.catalogue();
        assert_eq!(catalogue.len(), registry.len());
        assert_eq!(catalogue[0].pattern_type, "rapid_burst");
        assert_eq!(catalogue[1].pattern_type, "fee_spike");
        assert_eq!(catalogue[1].category, "fees");
    }
}
