pub mod context;
pub mod engine;
pub mod registry;
pub mod rules;
pub mod severity;
pub mod types;

pub use context::AnomalyContext;
pub use engine::{AnomalyEngine, Detection, PatternMatcher};
pub use registry::PatternRegistry;
pub use severity::SeverityClassifier;
pub use types::{AnomalyAlert, AnomalyPattern, PatternCheck, PatternInfo, Severity};
