//! G-code understanding: plan model, annotating scanner, emitted-code stats.

mod parser;
mod plan;
mod stats;

pub use parser::parse;
pub use plan::{Checkpoint, CheckpointKind, Layer, Plan, PlanPosition, PlanStats, ToolChange};
pub use stats::{analyze, GcodeStats};
