pub mod anomaly;
pub mod api;
pub mod broadcast;
pub mod config;
pub mod error;
pub mod events;
pub mod pipeline;
pub mod store;
pub mod tasks;
pub mod telemetry;

pub use anomaly::{AnomalyAlert, AnomalyContext, AnomalyPattern, PatternRegistry, Severity};
pub use config::Config;
pub use events::{Event, EventKind};
pub use pipeline::AlertPipeline;
pub use store::BoundedStore;
pub use tasks::{build_executor, Executor, TaskKind, TaskPriority, TaskReport};
