//! Controller transport: the one serial link to the motion controller.
//!
//! Exactly one command is in flight at a time; callers contend on a FIFO
//! mutex. A response is complete when a line carries `ok`, `Done` or
//! `Error`; `Error` surfaces as a failure, everything else accumulates into
//! the response body. Position reports (`X:… Y:…`) update the tracked
//! machine state and emit a position event whenever they are seen.
//!
//! In simulation mode the link is replaced by a deterministic prefix-table
//! responder with a small delay, so the framing and event paths are
//! exercised identically.

mod events;
mod protocol;
mod sim;

pub use events::TransportEvent;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, ReadHalf, WriteHalf};
use tokio::sync::{broadcast, oneshot, Mutex};
use tokio_serial::{SerialPortBuilderExt, SerialStream};

use crate::bus::unix_ms;
use crate::config::SerialConfig;
use crate::error::{CoreError, CoreResult};

/// Default per-command response timeout.
pub const DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_millis(5_000);

/// Response delay of the simulated controller.
const SIM_RESPONSE_DELAY: Duration = Duration::from_millis(100);

/// Tracked machine coordinates, millimetres (extrusion axis included for
/// controllers that report one).
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct MachinePosition {
    pub x: f64,
    pub y: f64,
    pub z: f64,
    pub e: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ControllerStatus {
    Disconnected,
    Ready,
}

/// Snapshot of what the transport knows about the machine.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MachineState {
    pub position: MachinePosition,
    pub status: ControllerStatus,
    /// Unix milliseconds of the last position report.
    pub last_update: Option<u64>,
}

struct Pending {
    lines: Vec<String>,
    done: oneshot::Sender<CoreResult<String>>,
}

struct Shared {
    pending: StdMutex<Option<Pending>>,
    state: StdMutex<MachineState>,
    events: broadcast::Sender<TransportEvent>,
    ready: AtomicBool,
}

impl Shared {
    /// Route one incoming line: surface it, track position, and complete the
    /// pending command when a terminator arrives.
    fn route_line(&self, line: &str) {
        let line = line.trim_end();
        let _ = self.events.send(TransportEvent::Data(line.to_string()));

        {
            let mut state = self.state.lock().unwrap();
            if protocol::update_position(line, &mut state.position) {
                state.last_update = Some(unix_ms());
                let position = state.position;
                drop(state);
                let _ = self.events.send(TransportEvent::Position(position));
            }
        }

        let mut pending = self.pending.lock().unwrap();
        if let Some(p) = pending.as_mut() {
            if protocol::is_error_line(line) {
                let p = pending.take().unwrap();
                let _ = p.done.send(Err(CoreError::Controller(line.to_string())));
            } else if protocol::is_terminated(line) {
                let p = pending.take().unwrap();
                let _ = p.done.send(Ok(p.lines.join("\n")));
            } else {
                p.lines.push(line.to_string());
            }
        }
    }
}

enum Mode {
    Serial,
    Simulation { delay: Duration },
}

/// Owns the bidirectional line-oriented channel to the controller.
pub struct Controller {
    mode: Mode,
    command_gate: Mutex<()>,
    writer: Option<Mutex<WriteHalf<SerialStream>>>,
    shared: Arc<Shared>,
    command_timeout: Duration,
}

impl Controller {
    /// Simulation mode with the standard ~100 ms response delay.
    pub fn simulated() -> Arc<Self> {
        Self::simulated_with_delay(SIM_RESPONSE_DELAY)
    }

    /// Simulation mode with a caller-chosen delay (tests use a short one).
    pub fn simulated_with_delay(delay: Duration) -> Arc<Self> {
        let controller = Arc::new(Self {
            mode: Mode::Simulation { delay },
            command_gate: Mutex::new(()),
            writer: None,
            shared: Arc::new(Shared {
                pending: StdMutex::new(None),
                state: StdMutex::new(MachineState {
                    position: MachinePosition::default(),
                    status: ControllerStatus::Ready,
                    last_update: None,
                }),
                events: broadcast::channel(256).0,
                ready: AtomicBool::new(true),
            }),
            command_timeout: DEFAULT_COMMAND_TIMEOUT,
        });
        let _ = controller.shared.events.send(TransportEvent::Ready);
        controller
    }

    /// Open the serial link, or fall back to simulation when `dev_mode` is
    /// set. An open failure leaves the transport not-ready (and surfaced as
    /// an error event) rather than failing construction; commands then
    /// return [`CoreError::NotReady`].
    pub fn connect(cfg: &SerialConfig) -> Arc<Self> {
        if cfg.dev_mode {
            tracing::info!("dev mode: using simulated controller");
            return Self::simulated();
        }

        let shared = Arc::new(Shared {
            pending: StdMutex::new(None),
            state: StdMutex::new(MachineState {
                position: MachinePosition::default(),
                status: ControllerStatus::Disconnected,
                last_update: None,
            }),
            events: broadcast::channel(256).0,
            ready: AtomicBool::new(false),
        });

        let stream = tokio_serial::new(&cfg.serial_path, cfg.baud_rate).open_native_async();
        let writer = match stream {
            Ok(stream) => {
                let (read_half, write_half) = tokio::io::split(stream);
                spawn_reader(Arc::clone(&shared), read_half);
                shared.ready.store(true, Ordering::SeqCst);
                shared.state.lock().unwrap().status = ControllerStatus::Ready;
                let _ = shared.events.send(TransportEvent::Ready);
                tracing::info!(path = %cfg.serial_path, baud = cfg.baud_rate, "serial link open");
                Some(Mutex::new(write_half))
            }
            Err(e) => {
                tracing::error!(path = %cfg.serial_path, "serial open failed: {}", e);
                let _ = shared
                    .events
                    .send(TransportEvent::Error(format!("serial open failed: {e}")));
                None
            }
        };

        Arc::new(Self {
            mode: Mode::Serial,
            command_gate: Mutex::new(()),
            writer,
            shared,
            command_timeout: Duration::from_millis(cfg.command_timeout_ms),
        })
    }

    pub fn is_ready(&self) -> bool {
        self.shared.ready.load(Ordering::SeqCst)
    }

    /// Observe `ready`/`error`/`close`/`position`/`data` events.
    pub fn subscribe(&self) -> broadcast::Receiver<TransportEvent> {
        self.shared.events.subscribe()
    }

    /// Last known machine position.
    pub fn position(&self) -> MachinePosition {
        self.shared.state.lock().unwrap().position
    }

    pub fn state(&self) -> MachineState {
        self.shared.state.lock().unwrap().clone()
    }

    /// Send one line and await its terminated response. At most one command
    /// is outstanding per transport; callers queue on a FIFO mutex.
    pub async fn send_command(
        &self,
        command: &str,
        timeout: Option<Duration>,
    ) -> CoreResult<String> {
        let timeout = timeout.unwrap_or(self.command_timeout);
        let _gate = self.command_gate.lock().await;

        match &self.mode {
            Mode::Simulation { delay } => {
                tokio::time::sleep(*delay).await;
                let mut body = Vec::new();
                for line in sim::respond(command).lines() {
                    let line = line.trim_end();
                    let _ = self
                        .shared
                        .events
                        .send(TransportEvent::Data(line.to_string()));
                    {
                        let mut state = self.shared.state.lock().unwrap();
                        if protocol::update_position(line, &mut state.position) {
                            state.last_update = Some(unix_ms());
                            let position = state.position;
                            drop(state);
                            let _ = self
                                .shared
                                .events
                                .send(TransportEvent::Position(position));
                        }
                    }
                    if protocol::is_error_line(line) {
                        return Err(CoreError::Controller(line.to_string()));
                    }
                    if protocol::is_terminated(line) {
                        return Ok(body.join("\n"));
                    }
                    body.push(line.to_string());
                }
                Ok(body.join("\n"))
            }
            Mode::Serial => {
                if !self.is_ready() {
                    return Err(CoreError::NotReady);
                }
                let writer = self.writer.as_ref().ok_or(CoreError::NotReady)?;

                let (tx, rx) = oneshot::channel();
                *self.shared.pending.lock().unwrap() = Some(Pending {
                    lines: Vec::new(),
                    done: tx,
                });

                {
                    let mut w = writer.lock().await;
                    let write = async {
                        w.write_all(command.as_bytes()).await?;
                        w.write_all(b"\n").await?;
                        w.flush().await
                    };
                    if let Err(e) = write.await {
                        self.shared.pending.lock().unwrap().take();
                        return Err(CoreError::Io(e));
                    }
                }

                match tokio::time::timeout(timeout, rx).await {
                    Ok(Ok(result)) => result,
                    Ok(Err(_)) => Err(CoreError::Protocol(
                        "link closed before the response terminated".to_string(),
                    )),
                    Err(_) => {
                        self.shared.pending.lock().unwrap().take();
                        tracing::warn!(command, "command timed out");
                        Err(CoreError::Timeout(timeout.as_millis() as u64))
                    }
                }
            }
        }
    }

    /// Query the controller position (`M114`) and parse the report.
    pub async fn get_position(&self) -> CoreResult<MachinePosition> {
        let response = self.send_command("M114", None).await?;
        let mut pos = MachinePosition::default();
        for line in response.lines() {
            if protocol::update_position(line, &mut pos) {
                return Ok(pos);
            }
        }
        Err(CoreError::Protocol(format!(
            "no position in M114 response: {response:?}"
        )))
    }

    /// List files on controller storage (`M20`).
    pub async fn list_files(&self) -> CoreResult<Vec<String>> {
        let response = self.send_command("M20", None).await?;
        let mut files = Vec::new();
        let mut in_listing = false;
        for line in response.lines() {
            let line = line.trim();
            if line.starts_with("Begin file list") {
                in_listing = true;
                continue;
            }
            if line.starts_with("End file list") {
                break;
            }
            if in_listing {
                if let Some(name) = line.split_whitespace().next() {
                    files.push(name.to_string());
                }
            }
        }
        Ok(files)
    }

    /// Controller storage report (`M39`), returned verbatim.
    pub async fn storage_info(&self) -> CoreResult<String> {
        self.send_command("M39", None).await
    }

    /// Select and start a stored file (`M23` + `M24`). Playback is
    /// controller-side; the job manager does not track it.
    pub async fn run_file(&self, name: &str) -> CoreResult<()> {
        self.send_command(&format!("M23 {name}"), None).await?;
        self.send_command("M24", None).await?;
        Ok(())
    }

    /// Write `content` to controller storage, bracketed by begin/end write
    /// (`M28`/`M29`). Each non-empty line is sent as its own command and
    /// must acknowledge before the next is sent.
    pub async fn upload_file(&self, name: &str, content: &str) -> CoreResult<()> {
        self.send_command(&format!("M28 {name}"), None).await?;
        for line in content.lines() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            self.send_command(line, None).await?;
        }
        self.send_command("M29", None).await?;
        Ok(())
    }

    pub async fn pause(&self) -> CoreResult<()> {
        self.send_command("M25", None).await.map(|_| ())
    }

    pub async fn stop(&self) -> CoreResult<()> {
        self.send_command("M0", None).await.map(|_| ())
    }

    pub async fn emergency_stop(&self) -> CoreResult<()> {
        self.send_command("M112", None).await.map(|_| ())
    }

    /// Home all axes, or only the ones named (e.g. `"X Y"`).
    pub async fn home_all(&self, axes: Option<&str>) -> CoreResult<()> {
        let command = match axes {
            Some(axes) if !axes.trim().is_empty() => format!("G28 {}", axes.trim()),
            _ => "G28".to_string(),
        };
        self.send_command(&command, None).await.map(|_| ())
    }

    pub async fn move_rapid(
        &self,
        x: Option<f64>,
        y: Option<f64>,
        z: Option<f64>,
    ) -> CoreResult<()> {
        let command = motion_command("G0", x, y, z, None);
        self.send_command(&command, None).await.map(|_| ())
    }

    pub async fn move_linear(
        &self,
        x: Option<f64>,
        y: Option<f64>,
        z: Option<f64>,
        feed_rate: Option<u32>,
    ) -> CoreResult<()> {
        let command = motion_command("G1", x, y, z, feed_rate);
        self.send_command(&command, None).await.map(|_| ())
    }

    pub async fn set_pin(&self, pin: u8, value: u16) -> CoreResult<()> {
        self.send_command(&format!("M42 P{pin} S{value}"), None)
            .await
            .map(|_| ())
    }

    pub async fn read_pin(&self, pin: u8) -> CoreResult<String> {
        self.send_command(&format!("M43 P{pin}"), None).await
    }

    /// Block until the controller drains its motion queue (`M400`).
    pub async fn wait_for_idle(&self) -> CoreResult<()> {
        self.send_command("M400", None).await.map(|_| ())
    }
}

fn motion_command(
    code: &str,
    x: Option<f64>,
    y: Option<f64>,
    z: Option<f64>,
    feed_rate: Option<u32>,
) -> String {
    let mut command = code.to_string();
    if let Some(x) = x {
        command.push_str(&format!(" X{x:.3}"));
    }
    if let Some(y) = y {
        command.push_str(&format!(" Y{y:.3}"));
    }
    if let Some(z) = z {
        command.push_str(&format!(" Z{z:.3}"));
    }
    if let Some(f) = feed_rate {
        command.push_str(&format!(" F{f}"));
    }
    command
}

/// Continually drain the serial stream, routing each line. EOF or a read
/// error marks the transport not-ready and surfaces a close event; the
/// process keeps running.
fn spawn_reader(shared: Arc<Shared>, read_half: ReadHalf<SerialStream>) {
    tokio::spawn(async move {
        let mut lines = BufReader::new(read_half).lines();
        loop {
            match lines.next_line().await {
                Ok(Some(line)) => shared.route_line(&line),
                Ok(None) => break,
                Err(e) => {
                    let _ = shared
                        .events
                        .send(TransportEvent::Error(format!("serial read: {e}")));
                    break;
                }
            }
        }
        shared.ready.store(false, Ordering::SeqCst);
        shared.state.lock().unwrap().status = ControllerStatus::Disconnected;
        let _ = shared.events.send(TransportEvent::Closed);
        tracing::warn!("serial link closed");
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sim() -> Arc<Controller> {
        Controller::simulated_with_delay(Duration::from_millis(1))
    }

    #[tokio::test]
    async fn simulated_position_query() {
        let controller = sim();
        let mut events = controller.subscribe();
        let pos = controller.get_position().await.unwrap();
        assert_eq!(pos.x, 100.0);
        assert_eq!(pos.y, 50.0);
        assert_eq!(pos.z, 10.0);
        assert_eq!(pos.e, 0.0);

        // the report also updated tracked state and emitted a position event
        assert_eq!(controller.position(), pos);
        let mut saw_position = false;
        while let Ok(event) = events.try_recv() {
            if let TransportEvent::Position(p) = event {
                assert_eq!(p, pos);
                saw_position = true;
            }
        }
        assert!(saw_position);
    }

    #[tokio::test]
    async fn unknown_command_acknowledges() {
        let controller = sim();
        let body = controller.send_command("M999", None).await.unwrap();
        assert_eq!(body, "");
    }

    #[tokio::test]
    async fn file_listing_parses_names() {
        let controller = sim();
        let files = controller.list_files().await.unwrap();
        assert_eq!(files, ["STAR.GCO", "GRID.GCO"]);
    }

    #[tokio::test]
    async fn upload_brackets_and_sends_each_line() {
        let controller = sim();
        let mut events = controller.subscribe();
        controller
            .upload_file("TEST.GCO", "G21\n\nG90\nG0 X1\n")
            .await
            .unwrap();
        // M28, three payload lines, M29 -> five responses were routed
        let mut data_lines = 0;
        while let Ok(event) = events.try_recv() {
            if matches!(event, TransportEvent::Data(_)) {
                data_lines += 1;
            }
        }
        assert!(data_lines >= 5);
    }

    #[tokio::test]
    async fn run_file_selects_then_starts() {
        let controller = sim();
        controller.run_file("STAR.GCO").await.unwrap();
    }

    #[tokio::test]
    async fn homing_resets_tracked_position() {
        let controller = sim();
        controller.get_position().await.unwrap();
        controller.home_all(None).await.unwrap();
        assert_eq!(controller.position().x, 0.0);
    }

    #[test]
    fn motion_command_formatting() {
        assert_eq!(
            motion_command("G0", Some(1.0), Some(2.5), None, None),
            "G0 X1.000 Y2.500"
        );
        assert_eq!(
            motion_command("G1", Some(0.0), None, Some(5.0), Some(3000)),
            "G1 X0.000 Z5.000 F3000"
        );
    }
}
