pub mod metrics;
pub mod orchestrator;

pub use metrics::Metrics;
pub use orchestrator::{CycleOrchestrator, CycleReport};
