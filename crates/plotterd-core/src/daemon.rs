//! Singleton wiring: transport, bus and job manager built once at startup
//! and injected into each other; no hidden globals.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use axum::routing::get;
use axum::Router;

use crate::bus::{ws, EventBus};
use crate::config::PlotterdConfig;
use crate::jobs::JobManager;
use crate::transport::Controller;

/// Idle position poll cadence; response-driven updates subsume it while a
/// job is running.
const POSITION_POLL_INTERVAL: Duration = Duration::from_millis(500);

pub struct Daemon {
    pub config: PlotterdConfig,
    pub transport: Arc<Controller>,
    pub bus: Arc<EventBus>,
    pub jobs: Arc<JobManager>,
}

impl Daemon {
    /// Construct the singletons. A failed serial open leaves the transport
    /// not-ready rather than failing the build.
    pub fn build(config: PlotterdConfig) -> Result<Self> {
        config.validate()?;
        let transport = Controller::connect(&config.serial);
        let bus = Arc::new(EventBus::new());
        let jobs = JobManager::new(Arc::clone(&transport), Arc::clone(&bus), &config.jobs);
        Ok(Self {
            config,
            transport,
            bus,
            jobs,
        })
    }

    pub fn router(&self) -> Router {
        Router::new()
            .route("/ws", get(ws::ws_handler))
            .with_state(Arc::clone(&self.bus))
    }

    /// Serve the WebSocket bus until Ctrl-C. The active job, if any, is
    /// cancelled (controller stop included) before exit.
    pub async fn serve(self) -> Result<()> {
        let _forwarder = self.jobs.spawn_event_forwarder();
        let _poller = self.jobs.spawn_position_poller(POSITION_POLL_INTERVAL);
        let _heartbeat = ws::spawn_heartbeat(
            Arc::clone(&self.bus),
            Duration::from_secs(self.config.bus.heartbeat_interval_secs),
        );

        let listener = tokio::net::TcpListener::bind(&self.config.bus.listen_addr)
            .await
            .with_context(|| format!("bind {}", self.config.bus.listen_addr))?;
        tracing::info!("listening on ws://{}/ws", self.config.bus.listen_addr);

        let jobs = Arc::clone(&self.jobs);
        axum::serve(listener, self.router())
            .with_graceful_shutdown(shutdown(jobs))
            .await?;
        Ok(())
    }
}

async fn shutdown(jobs: Arc<JobManager>) {
    let _ = tokio::signal::ctrl_c().await;
    tracing::info!("shutting down");
    if let Some(id) = jobs.active_job() {
        if let Err(e) = jobs.cancel(id).await {
            tracing::warn!("cancel active job on shutdown: {}", e);
        }
    }
}
