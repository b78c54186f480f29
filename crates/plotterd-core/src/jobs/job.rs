//! The scheduler entity: identity, state, progress, history.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::bus::unix_ms;
use crate::gcode::Plan;
use crate::transport::MachinePosition;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobState {
    Pending,
    Running,
    Paused,
    Cancelled,
    Error,
    Completed,
}

impl JobState {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            JobState::Cancelled | JobState::Error | JobState::Completed
        )
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobProgress {
    /// Lines completed (sent or skipped), 1-based count.
    pub current_line: usize,
    pub total_lines: usize,
    /// Rounded, always within 0..=100.
    pub percentage: u32,
    pub current_layer: i64,
    pub total_layers: usize,
    pub elapsed_ms: u64,
    pub estimated_remaining_ms: u64,
    pub current_position: MachinePosition,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HistoryAction {
    Pause,
    Resume,
}

/// Append-only log entry for pause/resume.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryEntry {
    pub timestamp: u64,
    pub line: usize,
    pub action: HistoryAction,
}

/// Failure details stamped by the execution loop.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobError {
    pub message: String,
    pub line: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Job {
    pub id: Uuid,
    pub state: JobState,
    pub created_at: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<u64>,
    pub plan: Plan,
    pub progress: JobProgress,
    pub history: Vec<HistoryEntry>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<JobError>,
}

impl Job {
    pub fn new(plan: Plan) -> Self {
        let progress = JobProgress {
            current_line: 0,
            total_lines: plan.stats.total_lines,
            percentage: 0,
            current_layer: plan.layers.first().map(|l| l.index).unwrap_or(0),
            total_layers: plan.layers.len(),
            elapsed_ms: 0,
            estimated_remaining_ms: plan.stats.estimated_time_ms,
            current_position: MachinePosition::default(),
        };
        Self {
            id: Uuid::new_v4(),
            state: JobState::Pending,
            created_at: unix_ms(),
            started_at: None,
            completed_at: None,
            plan,
            progress,
            history: Vec::new(),
            error: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gcode;

    #[test]
    fn new_job_is_pending_with_plan_totals() {
        let plan = gcode::parse("G0 X1\nG1 X2\nG1 X3\n");
        let job = Job::new(plan);
        assert_eq!(job.state, JobState::Pending);
        assert_eq!(job.progress.total_lines, 3);
        assert_eq!(job.progress.total_layers, 1);
        assert_eq!(job.progress.current_line, 0);
        assert!(job.created_at > 0);
        assert!(job.started_at.is_none());
    }

    #[test]
    fn job_ids_are_unique() {
        let a = Job::new(gcode::parse(""));
        let b = Job::new(gcode::parse(""));
        assert_ne!(a.id, b.id);
    }

    #[test]
    fn terminal_states() {
        assert!(JobState::Completed.is_terminal());
        assert!(JobState::Cancelled.is_terminal());
        assert!(JobState::Error.is_terminal());
        assert!(!JobState::Paused.is_terminal());
        assert!(!JobState::Running.is_terminal());
    }
}
