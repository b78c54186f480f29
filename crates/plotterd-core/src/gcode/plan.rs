//! Structured view of a G-code program: layers, checkpoints, stats.

use serde::{Deserialize, Serialize};

/// Tracked coordinate while scanning a program, millimetres.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct PlanPosition {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

/// Aggregate counts over a scanned program.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlanStats {
    /// Every line of the input, including comments and blanks.
    pub total_lines: usize,
    /// G0 plus G1 lines.
    pub movement_commands: usize,
    pub rapid_count: usize,
    pub linear_count: usize,
    /// Contiguous pen-down spans.
    pub shapes: usize,
    pub estimated_time_ms: u64,
}

/// A logical grouping of lines between markers, tool changes, or pauses.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Layer {
    pub index: i64,
    /// 1-based, inclusive.
    pub start_line: usize,
    /// 1-based, inclusive; `>= start_line`.
    pub end_line: usize,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
    /// Tool active when the layer began.
    pub tool: i64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolChange {
    pub line: usize,
    pub tool: i64,
    pub previous_tool: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CheckpointKind {
    Layer,
    ToolChange,
    Pause,
    ZChange,
}

/// A line the scheduler can safely resume from.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Checkpoint {
    pub line: usize,
    pub position: PlanPosition,
    #[serde(rename = "type")]
    pub kind: CheckpointKind,
}

/// Output of the G-code scanner, ready to drive the scheduler and the UI.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Plan {
    pub stats: PlanStats,
    /// Never empty: a `Main` layer is synthesized when no markers exist.
    pub layers: Vec<Layer>,
    pub tool_changes: Vec<ToolChange>,
    pub checkpoints: Vec<Checkpoint>,
    /// Original text, retained for execution. Not part of the wire surface.
    #[serde(skip)]
    pub content: String,
}

impl Plan {
    /// Layer containing `line`, if any.
    pub fn layer_at(&self, line: usize) -> Option<&Layer> {
        self.layers
            .iter()
            .find(|l| l.start_line <= line && line <= l.end_line)
    }
}
