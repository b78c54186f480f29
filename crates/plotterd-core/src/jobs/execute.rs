//! The execution loop: stream plan lines to the controller in file order.
//!
//! Each iteration checks the abort token and the job state before sending,
//! so a pause exits cleanly with `current_line` preserved and a cancel wakes
//! an in-flight command wait. Empty and comment-only lines are skipped but
//! still advance the line counter.

use std::sync::Arc;
use std::time::Instant;

use uuid::Uuid;

use crate::error::CoreError;

use super::control::CancelToken;
use super::job::{JobError, JobState};
use super::manager::JobManager;

pub(super) async fn run(manager: Arc<JobManager>, id: Uuid, token: Arc<CancelToken>) {
    let Some((lines, start_line, prior_elapsed_ms)) = manager.execution_snapshot(id) else {
        manager.release_active(id);
        return;
    };

    let run_started = Instant::now();
    let mut advanced_this_run: u64 = 0;
    let mut last_emit: Option<Instant> = None;

    for idx in start_line..lines.len() {
        if token.is_cancelled() {
            manager.finish_cancelled(id);
            return;
        }
        match manager.job_state(id) {
            Some(JobState::Running) => {}
            Some(JobState::Paused) => return,
            Some(JobState::Cancelled) | None => {
                manager.finish_cancelled(id);
                return;
            }
            Some(other) => {
                tracing::warn!(job = %id, state = ?other, "execution loop found unexpected state");
                return;
            }
        }

        let trimmed = lines[idx].trim();
        let sendable = !trimmed.is_empty() && !trimmed.starts_with(';');
        if sendable {
            let send = manager.transport.send_command(trimmed, None);
            tokio::select! {
                _ = token.cancelled() => {
                    manager.finish_cancelled(id);
                    return;
                }
                result = send => {
                    if let Err(e) = result {
                        if matches!(e, CoreError::Cancelled) {
                            manager.finish_cancelled(id);
                            return;
                        }
                        // a pause that raced the failure wins: exit silently
                        if manager.job_state(id) == Some(JobState::Paused) {
                            return;
                        }
                        manager.finish_error(
                            id,
                            JobError {
                                message: e.to_string(),
                                line: idx + 1,
                                command: Some(trimmed.to_string()),
                            },
                        );
                        return;
                    }
                }
            }
        }

        advanced_this_run += 1;
        manager.advance(
            id,
            idx + 1,
            prior_elapsed_ms,
            run_started,
            advanced_this_run,
            &mut last_emit,
        );
    }

    manager.finish_completed(id);
}
