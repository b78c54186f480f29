//! Integration tests: job lifecycle against the simulated controller.
//!
//! The simulator answers with a short delay so full runs stay fast; the
//! framing, event and progress paths are the same ones the serial link uses.

mod common;

use std::sync::Arc;
use std::time::Duration;

use plotterd_core::bus::{BusFrame, EventBus, EventType};
use plotterd_core::config::JobsConfig;
use plotterd_core::error::CoreError;
use plotterd_core::jobs::{JobManager, JobState};
use plotterd_core::transport::Controller;

fn setup(progress_interval_ms: u64) -> (Arc<EventBus>, Arc<JobManager>) {
    let transport = Controller::simulated_with_delay(Duration::from_millis(1));
    let bus = Arc::new(EventBus::new());
    let cfg = JobsConfig {
        progress_update_interval_ms: progress_interval_ms,
    };
    let manager = JobManager::new(transport, Arc::clone(&bus), &cfg);
    (bus, manager)
}

async fn wait_for<F: Fn(&plotterd_core::jobs::Job) -> bool>(
    manager: &JobManager,
    id: uuid::Uuid,
    what: &str,
    predicate: F,
) -> plotterd_core::jobs::Job {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(30);
    loop {
        let job = manager.get(id).expect("job exists");
        if predicate(&job) {
            return job;
        }
        assert!(
            tokio::time::Instant::now() < deadline,
            "timed out waiting for {what}; job: state={:?} line={}",
            job.state,
            job.progress.current_line
        );
        tokio::time::sleep(Duration::from_millis(2)).await;
    }
}

fn drained_events(
    rx: &mut tokio::sync::mpsc::UnboundedReceiver<BusFrame>,
) -> Vec<plotterd_core::bus::Event> {
    let mut events = Vec::new();
    while let Ok(frame) = rx.try_recv() {
        if let BusFrame::Event(event) = frame {
            events.push(event);
        }
    }
    events
}

#[tokio::test]
async fn short_job_runs_to_completion() {
    let (_bus, manager) = setup(50);
    let job = manager.create_job("G21\nG90\nG1 X10 Y10 F3000\nG1 X20 Y10\n");
    manager.start(job.id).unwrap();

    let done = wait_for(&manager, job.id, "completion", |j| j.state.is_terminal()).await;
    assert_eq!(done.state, JobState::Completed);
    assert_eq!(done.progress.current_line, 4);
    assert_eq!(done.progress.percentage, 100);
    assert!(done.completed_at.is_some());
    assert!(manager.active_job().is_none());
}

#[tokio::test]
async fn pause_preserves_line_and_resume_completes() {
    let (_bus, manager) = setup(100);
    let job = manager.create_job(&common::line_program(1000));
    assert_eq!(job.progress.total_lines, 1000);
    manager.start(job.id).unwrap();

    wait_for(&manager, job.id, "halfway", |j| j.progress.current_line >= 500).await;
    manager.pause(job.id).await.unwrap();

    let paused = manager.get(job.id).unwrap();
    assert_eq!(paused.state, JobState::Paused);
    assert!(paused.progress.current_line >= 500);
    assert_eq!(paused.history.len(), 1);

    // the loop exits after at most the line that was in flight
    tokio::time::sleep(Duration::from_millis(100)).await;
    let settled = manager.get(job.id).unwrap();
    assert!(settled.progress.current_line <= paused.progress.current_line + 1);
    tokio::time::sleep(Duration::from_millis(100)).await;
    let still = manager.get(job.id).unwrap();
    assert_eq!(still.progress.current_line, settled.progress.current_line);

    manager.resume(job.id).unwrap();
    let done = wait_for(&manager, job.id, "completion", |j| j.state.is_terminal()).await;
    assert_eq!(done.state, JobState::Completed);
    assert_eq!(done.progress.current_line, 1000);
    assert_eq!(done.progress.percentage, 100);
    assert_eq!(done.history.len(), 2);
}

#[tokio::test]
async fn cancel_mid_run_emits_no_completion() {
    let (bus, manager) = setup(10);
    let (client, mut rx) = bus.register();
    let job = manager.create_job(&common::line_program(500));
    bus.subscribe(client, job.id);
    manager.start(job.id).unwrap();

    tokio::time::sleep(Duration::from_millis(20)).await;
    manager.cancel(job.id).await.unwrap();

    let cancelled = manager.get(job.id).unwrap();
    assert_eq!(cancelled.state, JobState::Cancelled);
    assert!(manager.active_job().is_none());
    assert!(cancelled.progress.current_line < 500);

    // let any in-flight work drain, then make sure no completion ever came
    tokio::time::sleep(Duration::from_millis(300)).await;
    let events = drained_events(&mut rx);
    assert!(events
        .iter()
        .all(|e| e.kind != EventType::JobCompleted));
    let final_state = manager.get(job.id).unwrap();
    assert_eq!(final_state.state, JobState::Cancelled);
}

#[tokio::test]
async fn layer_boundary_emits_exactly_one_change() {
    let (bus, manager) = setup(1);
    let (client, mut rx) = bus.register();
    let job = manager.create_job(";LAYER:0\nG1 X1 F1000\nG1 X2\n;LAYER:1\nG1 X3\nG1 X4\n");
    assert_eq!(job.plan.layers.len(), 2);
    bus.subscribe(client, job.id);
    manager.start(job.id).unwrap();

    wait_for(&manager, job.id, "completion", |j| j.state.is_terminal()).await;
    let events = drained_events(&mut rx);
    let changes: Vec<_> = events
        .iter()
        .filter(|e| e.kind == EventType::JobLayerChange)
        .collect();
    assert_eq!(changes.len(), 1);
    assert_eq!(changes[0].data["layer"], 1);
}

#[tokio::test]
async fn three_star_fixture_parses_and_completes() {
    let (_bus, manager) = setup(50);
    let job = manager.create_job(&common::three_star_gcode());

    assert_eq!(job.plan.layers.len(), 1);
    assert_eq!(job.plan.layers[0].name, "Main");
    assert_eq!(job.plan.stats.shapes, 3);
    assert!(
        (26..=30).contains(&job.plan.stats.movement_commands),
        "movement commands: {}",
        job.plan.stats.movement_commands
    );

    manager.start(job.id).unwrap();
    let done = wait_for(&manager, job.id, "completion", |j| j.state.is_terminal()).await;
    assert_eq!(done.state, JobState::Completed);
    assert_eq!(done.progress.percentage, 100);
    assert_eq!(done.progress.current_line, done.progress.total_lines);
}

#[tokio::test]
async fn only_one_job_runs_at_a_time() {
    let (_bus, manager) = setup(50);
    let first = manager.create_job(&common::line_program(300));
    let second = manager.create_job(&common::line_program(10));
    manager.start(first.id).unwrap();

    let err = manager.start(second.id).unwrap_err();
    assert!(matches!(err, CoreError::InvalidState(_)));
    assert_eq!(manager.active_job(), Some(first.id));

    manager.cancel(first.id).await.unwrap();
    manager.start(second.id).unwrap();
    let done = wait_for(&manager, second.id, "completion", |j| j.state.is_terminal()).await;
    assert_eq!(done.state, JobState::Completed);
}

#[tokio::test]
async fn paused_job_keeps_the_machine_claim() {
    let (_bus, manager) = setup(50);
    let first = manager.create_job(&common::line_program(400));
    let second = manager.create_job(&common::line_program(10));
    manager.start(first.id).unwrap();
    wait_for(&manager, first.id, "some progress", |j| {
        j.progress.current_line >= 5
    })
    .await;
    manager.pause(first.id).await.unwrap();

    assert!(matches!(
        manager.start(second.id),
        Err(CoreError::InvalidState(_))
    ));
    manager.cancel(first.id).await.unwrap();
}

#[tokio::test]
async fn deleting_a_running_job_is_refused() {
    let (_bus, manager) = setup(50);
    let job = manager.create_job(&common::line_program(300));
    manager.start(job.id).unwrap();

    assert!(matches!(
        manager.delete(job.id),
        Err(CoreError::InvalidState(_))
    ));
    manager.cancel(job.id).await.unwrap();
    manager.delete(job.id).unwrap();
}

#[tokio::test]
async fn events_arrive_in_lifecycle_order() {
    let (bus, manager) = setup(1);
    let (client, mut rx) = bus.register();
    let job = manager.create_job("G1 X1 F1000\nG1 X2\nG1 X3\n");
    bus.subscribe(client, job.id);
    manager.start(job.id).unwrap();
    wait_for(&manager, job.id, "completion", |j| j.state.is_terminal()).await;

    let kinds: Vec<EventType> = drained_events(&mut rx)
        .into_iter()
        .map(|e| e.kind)
        .filter(|k| {
            matches!(
                k,
                EventType::JobCreated
                    | EventType::JobStarted
                    | EventType::JobProgress
                    | EventType::JobCompleted
            )
        })
        .collect();

    let created = kinds.iter().position(|k| *k == EventType::JobCreated);
    let started = kinds.iter().position(|k| *k == EventType::JobStarted);
    let first_progress = kinds.iter().position(|k| *k == EventType::JobProgress);
    let completed = kinds.iter().position(|k| *k == EventType::JobCompleted);

    let created = created.expect("created event");
    let started = started.expect("started event");
    let completed = completed.expect("completed event");
    assert!(created < started);
    if let Some(progress) = first_progress {
        assert!(started < progress);
        assert!(progress < completed);
    }
    assert_eq!(completed, kinds.len() - 1, "completed is the final event");
}

#[tokio::test]
async fn position_updates_flow_to_the_bus() {
    let (bus, manager) = setup(50);
    let _forwarder = manager.spawn_event_forwarder();
    let (_client, mut rx) = bus.register();

    // an M114 inside the program makes the simulator report a position;
    // the filler lines give the forwarder time to route it while the job
    // is still the active one
    let mut program = String::from("M114\n");
    program.push_str(&common::line_program(10));
    let job = manager.create_job(&program);
    manager.start(job.id).unwrap();
    let done = wait_for(&manager, job.id, "completion", |j| j.state.is_terminal()).await;

    assert_eq!(done.progress.current_position.x, 100.0);
    assert_eq!(done.progress.current_position.y, 50.0);
    assert_eq!(done.progress.current_position.z, 10.0);

    tokio::time::sleep(Duration::from_millis(50)).await;
    let events = drained_events(&mut rx);
    assert!(events
        .iter()
        .any(|e| e.kind == EventType::PositionUpdate && e.data["x"] == 100.0));
}
