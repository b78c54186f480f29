//! Job admission, lifecycle and supervision.
//!
//! At most one job is active at a time; the active id is held until the job
//! reaches a terminal state, so a paused job keeps its claim on the machine.
//! All job mutation happens here; readers get snapshots.

use std::collections::HashMap;
use std::sync::{Arc, Mutex as StdMutex, RwLock};
use std::time::{Duration, Instant};

use uuid::Uuid;

use crate::bus::{unix_ms, Event, EventBus, EventType};
use crate::config::JobsConfig;
use crate::error::{CoreError, CoreResult};
use crate::gcode;
use crate::transport::{Controller, TransportEvent};

use super::control::JobControl;
use super::execute;
use super::job::{HistoryAction, HistoryEntry, Job, JobError, JobProgress, JobState};

pub struct JobManager {
    jobs: RwLock<HashMap<Uuid, Job>>,
    active: StdMutex<Option<Uuid>>,
    control: JobControl,
    pub(super) transport: Arc<Controller>,
    bus: Arc<EventBus>,
    progress_interval: Duration,
}

impl JobManager {
    pub fn new(transport: Arc<Controller>, bus: Arc<EventBus>, cfg: &JobsConfig) -> Arc<Self> {
        Arc::new(Self {
            jobs: RwLock::new(HashMap::new()),
            active: StdMutex::new(None),
            control: JobControl::new(),
            transport,
            bus,
            progress_interval: Duration::from_millis(cfg.progress_update_interval_ms),
        })
    }

    /// Parse `content` into a plan and admit it as a pending job.
    pub fn create_job(&self, content: &str) -> Job {
        let plan = gcode::parse(content);
        let job = Job::new(plan);
        tracing::info!(job = %job.id, lines = job.progress.total_lines, "job created");
        self.bus.broadcast(Event::new(
            EventType::JobCreated,
            serde_json::to_value(&job).unwrap_or_default(),
        ));
        self.jobs.write().unwrap().insert(job.id, job.clone());
        job
    }

    /// Snapshot of one job.
    pub fn get(&self, id: Uuid) -> CoreResult<Job> {
        self.jobs
            .read()
            .unwrap()
            .get(&id)
            .cloned()
            .ok_or_else(|| CoreError::NotFound(format!("job {id}")))
    }

    /// Snapshot of every job, newest first.
    pub fn list(&self) -> Vec<Job> {
        let mut jobs: Vec<Job> = self.jobs.read().unwrap().values().cloned().collect();
        jobs.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        jobs
    }

    /// Remove a job. Deleting a running job is refused.
    pub fn delete(&self, id: Uuid) -> CoreResult<()> {
        let mut jobs = self.jobs.write().unwrap();
        let Some(job) = jobs.get(&id) else {
            return Err(CoreError::NotFound(format!("job {id}")));
        };
        if job.state == JobState::Running {
            return Err(CoreError::InvalidState(
                "cannot delete a running job".to_string(),
            ));
        }
        jobs.remove(&id);
        drop(jobs);
        self.release_active(id);
        self.control.unregister(id);
        Ok(())
    }

    pub fn active_job(&self) -> Option<Uuid> {
        *self.active.lock().unwrap()
    }

    /// Start (or re-enter after pause) the execution loop for a job.
    pub fn start(self: &Arc<Self>, id: Uuid) -> CoreResult<()> {
        {
            let mut active = self.active.lock().unwrap();
            match *active {
                Some(other) if other != id => {
                    return Err(CoreError::InvalidState(format!(
                        "job {other} is already active"
                    )));
                }
                _ => *active = Some(id),
            }
        }

        let started = {
            let mut jobs = self.jobs.write().unwrap();
            let Some(job) = jobs.get_mut(&id) else {
                self.release_active(id);
                return Err(CoreError::NotFound(format!("job {id}")));
            };
            if !matches!(job.state, JobState::Pending | JobState::Paused) {
                let state = job.state;
                drop(jobs);
                // a fresh pending start that lost the race keeps its claim,
                // anything else releases it
                if state.is_terminal() {
                    self.release_active(id);
                }
                return Err(CoreError::InvalidState(format!(
                    "start requires a pending or paused job, found {state:?}"
                )));
            }
            job.state = JobState::Running;
            if job.started_at.is_none() {
                job.started_at = Some(unix_ms());
            }
            job.started_at.unwrap_or_default()
        };

        let token = self.control.register(id);
        self.bus.emit_for_job(
            id,
            Event::new(
                EventType::JobStarted,
                serde_json::json!({ "jobId": id, "startedAt": started }),
            ),
        );
        tracing::info!(job = %id, "job started");

        let manager = Arc::clone(self);
        tokio::spawn(async move {
            execute::run(manager, id, token).await;
        });
        Ok(())
    }

    /// Pause a running job and issue the controller pause. The loop exits
    /// cleanly at its next check, preserving `current_line`.
    pub async fn pause(&self, id: Uuid) -> CoreResult<()> {
        let progress = {
            let mut jobs = self.jobs.write().unwrap();
            let Some(job) = jobs.get_mut(&id) else {
                return Err(CoreError::NotFound(format!("job {id}")));
            };
            if job.state != JobState::Running {
                return Err(CoreError::InvalidState(format!(
                    "pause requires a running job, found {:?}",
                    job.state
                )));
            }
            job.state = JobState::Paused;
            job.history.push(HistoryEntry {
                timestamp: unix_ms(),
                line: job.progress.current_line,
                action: HistoryAction::Pause,
            });
            job.progress
        };

        self.emit_progress_now(id, progress);
        self.bus.emit_for_job(
            id,
            Event::new(
                EventType::JobPaused,
                serde_json::json!({ "jobId": id, "line": progress.current_line }),
            ),
        );
        tracing::info!(job = %id, line = progress.current_line, "job paused");

        if let Err(e) = self.transport.pause().await {
            tracing::warn!(job = %id, "controller pause failed: {}", e);
        }
        Ok(())
    }

    /// Resume a paused job from its `current_line`.
    pub fn resume(self: &Arc<Self>, id: Uuid) -> CoreResult<()> {
        let line = {
            let mut jobs = self.jobs.write().unwrap();
            let Some(job) = jobs.get_mut(&id) else {
                return Err(CoreError::NotFound(format!("job {id}")));
            };
            if job.state != JobState::Paused {
                return Err(CoreError::InvalidState(format!(
                    "resume requires a paused job, found {:?}",
                    job.state
                )));
            }
            job.history.push(HistoryEntry {
                timestamp: unix_ms(),
                line: job.progress.current_line,
                action: HistoryAction::Resume,
            });
            job.progress.current_line
        };

        self.bus.emit_for_job(
            id,
            Event::new(
                EventType::JobResumed,
                serde_json::json!({ "jobId": id, "line": line }),
            ),
        );
        tracing::info!(job = %id, line, "job resumed");
        self.start(id)
    }

    /// Cancel a running or paused job: flip the abort token (waking any
    /// in-flight command wait) and issue the controller stop. No further
    /// progress events are emitted for the job.
    pub async fn cancel(&self, id: Uuid) -> CoreResult<()> {
        {
            let mut jobs = self.jobs.write().unwrap();
            let Some(job) = jobs.get_mut(&id) else {
                return Err(CoreError::NotFound(format!("job {id}")));
            };
            if !matches!(job.state, JobState::Running | JobState::Paused) {
                return Err(CoreError::InvalidState(format!(
                    "cancel requires a running or paused job, found {:?}",
                    job.state
                )));
            }
            job.state = JobState::Cancelled;
            job.completed_at = Some(unix_ms());
        }

        self.control.request_cancel(id);
        self.release_active(id);
        tracing::info!(job = %id, "job cancelled");

        if let Err(e) = self.transport.stop().await {
            tracing::warn!(job = %id, "controller stop failed: {}", e);
        }
        Ok(())
    }

    /// Forward transport events to the bus, and position samples into the
    /// active job's progress.
    pub fn spawn_event_forwarder(self: &Arc<Self>) -> tokio::task::JoinHandle<()> {
        let manager = Arc::clone(self);
        let mut events = self.transport.subscribe();
        tokio::spawn(async move {
            loop {
                match events.recv().await {
                    Ok(TransportEvent::Position(position)) => {
                        manager.bus.broadcast(Event::new(
                            EventType::PositionUpdate,
                            serde_json::to_value(position).unwrap_or_default(),
                        ));
                        if let Some(id) = manager.active_job() {
                            if let Some(job) = manager.jobs.write().unwrap().get_mut(&id) {
                                job.progress.current_position = position;
                            }
                        }
                    }
                    Ok(TransportEvent::Ready) => {
                        manager.bus.broadcast(Event::new(
                            EventType::MachineStatus,
                            serde_json::json!({ "status": "ready" }),
                        ));
                    }
                    Ok(TransportEvent::Closed) => {
                        manager.bus.broadcast(Event::new(
                            EventType::MachineStatus,
                            serde_json::json!({ "status": "disconnected" }),
                        ));
                    }
                    Ok(TransportEvent::Error(message)) => {
                        manager.bus.broadcast(Event::new(
                            EventType::MachineStatus,
                            serde_json::json!({ "status": "error", "message": message }),
                        ));
                    }
                    Ok(TransportEvent::Data(_)) => {}
                    Err(tokio::sync::broadcast::error::RecvError::Lagged(skipped)) => {
                        tracing::debug!(skipped, "event forwarder lagged");
                    }
                    Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
                }
            }
        })
    }

    /// Poll the controller position while no job is active; response-driven
    /// updates subsume this during a run.
    pub fn spawn_position_poller(
        self: &Arc<Self>,
        interval: Duration,
    ) -> tokio::task::JoinHandle<()> {
        let manager = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                if manager.active_job().is_none() && manager.transport.is_ready() {
                    if let Err(e) = manager.transport.get_position().await {
                        tracing::debug!("idle position poll failed: {}", e);
                    }
                }
            }
        })
    }

    // ----- hooks for the execution loop -----

    pub(super) fn job_state(&self, id: Uuid) -> Option<JobState> {
        self.jobs.read().unwrap().get(&id).map(|j| j.state)
    }

    /// Lines to execute, the resume point, and elapsed time from previous
    /// runs of this job.
    pub(super) fn execution_snapshot(&self, id: Uuid) -> Option<(Vec<String>, usize, u64)> {
        let jobs = self.jobs.read().unwrap();
        let job = jobs.get(&id)?;
        let lines: Vec<String> = job.plan.content.lines().map(|l| l.to_string()).collect();
        Some((lines, job.progress.current_line, job.progress.elapsed_ms))
    }

    /// Record one completed (sent or skipped) line: progress arithmetic,
    /// layer-change detection, throttled emission.
    pub(super) fn advance(
        &self,
        id: Uuid,
        new_line: usize,
        prior_elapsed_ms: u64,
        run_started: Instant,
        advanced_this_run: u64,
        last_emit: &mut Option<Instant>,
    ) {
        let (progress, layer_event) = {
            let mut jobs = self.jobs.write().unwrap();
            let Some(job) = jobs.get_mut(&id) else { return };

            job.progress.current_line = new_line;
            let run_elapsed = run_started.elapsed().as_millis() as u64;
            job.progress.elapsed_ms = prior_elapsed_ms + run_elapsed;
            let total = job.progress.total_lines.max(1);
            job.progress.percentage =
                ((new_line as f64 / total as f64) * 100.0).round() as u32;
            let ms_per_line = run_elapsed as f64 / advanced_this_run as f64;
            let remaining = job.progress.total_lines.saturating_sub(new_line);
            job.progress.estimated_remaining_ms =
                (remaining as f64 * ms_per_line).round() as u64;

            let mut layer_event = None;
            if let Some(layer) = job.plan.layer_at(new_line) {
                // a boundary crossing is exactly when the containing layer
                // starts at the line just completed
                if layer.start_line == new_line && layer.index != job.progress.current_layer
                {
                    job.progress.current_layer = layer.index;
                    layer_event =
                        Some((layer.index, layer.name.clone(), layer.start_line));
                }
            }
            (job.progress, layer_event)
        };

        let force = layer_event.is_some();
        if let Some((layer, name, start_line)) = layer_event {
            tracing::debug!(job = %id, layer, "layer change");
            self.bus.emit_for_job(
                id,
                Event::new(
                    EventType::JobLayerChange,
                    serde_json::json!({
                        "jobId": id,
                        "layer": layer,
                        "name": name,
                        "startLine": start_line,
                    }),
                ),
            );
        }

        let due = last_emit.map_or(true, |t| t.elapsed() >= self.progress_interval);
        if force || due {
            *last_emit = Some(Instant::now());
            self.emit_progress_now(id, progress);
        }
    }

    pub(super) fn emit_progress_now(&self, id: Uuid, progress: JobProgress) {
        self.bus.emit_for_job(
            id,
            Event::new(
                EventType::JobProgress,
                serde_json::json!({ "jobId": id, "progress": progress }),
            ),
        );
    }

    pub(super) fn finish_completed(&self, id: Uuid) {
        let progress = {
            let mut jobs = self.jobs.write().unwrap();
            let Some(job) = jobs.get_mut(&id) else { return };
            if job.state != JobState::Running {
                // cancelled (or otherwise redirected) on the last line
                return;
            }
            job.state = JobState::Completed;
            job.completed_at = Some(unix_ms());
            job.progress.percentage = 100;
            job.progress.estimated_remaining_ms = 0;
            job.progress
        };

        self.emit_progress_now(id, progress);
        self.bus.emit_for_job(
            id,
            Event::new(
                EventType::JobCompleted,
                serde_json::json!({ "jobId": id, "elapsedMs": progress.elapsed_ms }),
            ),
        );
        tracing::info!(job = %id, elapsed_ms = progress.elapsed_ms, "job completed");
        self.release_active(id);
        self.control.unregister(id);
    }

    pub(super) fn finish_cancelled(&self, id: Uuid) {
        {
            let mut jobs = self.jobs.write().unwrap();
            if let Some(job) = jobs.get_mut(&id) {
                if job.state != JobState::Cancelled {
                    job.state = JobState::Cancelled;
                    job.completed_at = Some(unix_ms());
                }
            }
        }
        self.release_active(id);
        self.control.unregister(id);
    }

    pub(super) fn finish_error(&self, id: Uuid, error: JobError) {
        {
            let mut jobs = self.jobs.write().unwrap();
            if let Some(job) = jobs.get_mut(&id) {
                job.state = JobState::Error;
                job.completed_at = Some(unix_ms());
                job.error = Some(error.clone());
            }
        }
        tracing::error!(job = %id, line = error.line, "job failed: {}", error.message);
        self.bus.emit_for_job(
            id,
            Event::new(
                EventType::JobError,
                serde_json::json!({ "jobId": id, "error": error }),
            ),
        );
        self.release_active(id);
        self.control.unregister(id);
    }

    pub(super) fn release_active(&self, id: Uuid) {
        let mut active = self.active.lock().unwrap();
        if *active == Some(id) {
            *active = None;
        }
    }
}
