//! Global configuration loaded from `~/.config/plotterd/config.toml`.
//!
//! A default file is written on first run. Unknown keys are rejected at parse
//! time so typos surface immediately instead of silently falling back to
//! defaults.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;

use crate::compiler::{CanvasOptions, PenSettings};

/// Machine geometry and pen servo wiring.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MachineConfig {
    /// Canvas extent along X, millimetres.
    pub x_dimension: f64,
    /// Canvas extent along Y, millimetres.
    pub y_dimension: f64,
    /// Controller pin driving the pen servo.
    pub pen_pin: u8,
    /// Servo value for the raised pen.
    pub pen_up_value: u16,
    /// Servo value for the lowered pen.
    pub pen_down_value: u16,
}

impl Default for MachineConfig {
    fn default() -> Self {
        Self {
            x_dimension: 480.0,
            y_dimension: 480.0,
            pen_pin: 4,
            pen_up_value: 0,
            pen_down_value: 90,
        }
    }
}

impl From<&MachineConfig> for PenSettings {
    fn from(machine: &MachineConfig) -> Self {
        Self {
            pin: machine.pen_pin,
            up_value: machine.pen_up_value,
            down_value: machine.pen_down_value,
        }
    }
}

/// Serial link settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SerialConfig {
    /// Device path of the controller link.
    pub serial_path: String,
    pub baud_rate: u32,
    /// Per-command response timeout in milliseconds.
    pub command_timeout_ms: u64,
    /// Replace the serial link with the deterministic simulator.
    pub dev_mode: bool,
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            serial_path: "/dev/ttyUSB0".to_string(),
            baud_rate: 115_200,
            command_timeout_ms: 5_000,
            dev_mode: false,
        }
    }
}

/// Job scheduler tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct JobsConfig {
    /// Minimum interval between `job:progress` emissions, milliseconds.
    pub progress_update_interval_ms: u64,
}

impl Default for JobsConfig {
    fn default() -> Self {
        Self {
            progress_update_interval_ms: 500,
        }
    }
}

/// WebSocket bus settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BusConfig {
    /// Address the daemon binds for the `/ws` endpoint.
    pub listen_addr: String,
    /// Liveness probe interval, seconds.
    pub heartbeat_interval_secs: u64,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            listen_addr: "127.0.0.1:8380".to_string(),
            heartbeat_interval_secs: 30,
        }
    }
}

/// Logging destination and verbosity.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LoggingConfig {
    /// Filter directives used when `RUST_LOG` is unset.
    pub filter: String,
    /// Log file path; the XDG state dir is used when unset.
    pub file: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: "info,plotterd=debug".to_string(),
            file: None,
        }
    }
}

/// Top-level configuration: one section per subsystem.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PlotterdConfig {
    pub machine: MachineConfig,
    pub serial: SerialConfig,
    /// Default compile options; requests may override any field.
    pub canvas: CanvasOptions,
    pub jobs: JobsConfig,
    pub bus: BusConfig,
    pub logging: LoggingConfig,
}

impl PlotterdConfig {
    /// Reject geometry the compiler and scheduler cannot work with.
    pub fn validate(&self) -> Result<()> {
        if self.machine.x_dimension <= 0.0 || self.machine.y_dimension <= 0.0 {
            anyhow::bail!("machine dimensions must be positive");
        }
        if self.canvas.canvas_width <= 0.0 || self.canvas.canvas_height <= 0.0 {
            anyhow::bail!("canvas dimensions must be positive");
        }
        if self.canvas.margin < 0.0 {
            anyhow::bail!("margin must not be negative");
        }
        if self.canvas.canvas_width - 2.0 * self.canvas.margin <= 0.0
            || self.canvas.canvas_height - 2.0 * self.canvas.margin <= 0.0
        {
            anyhow::bail!("margin leaves no drawable area");
        }
        if self.canvas.travel_speed <= 0.0 || self.canvas.draw_speed <= 0.0 {
            anyhow::bail!("feed rates must be positive");
        }
        if self.serial.baud_rate == 0 {
            anyhow::bail!("baud_rate must be positive");
        }
        if self.jobs.progress_update_interval_ms == 0 {
            anyhow::bail!("progress_update_interval_ms must be positive");
        }
        if self.logging.filter.trim().is_empty() {
            anyhow::bail!("logging filter must not be empty");
        }
        Ok(())
    }
}

pub fn config_path() -> Result<PathBuf> {
    let xdg_dirs = xdg::BaseDirectories::with_prefix("plotterd")?;
    Ok(xdg_dirs.place_config_file("config.toml")?)
}

/// Load configuration from disk, creating a default file if none exists.
pub fn load_or_init() -> Result<PlotterdConfig> {
    let path = config_path()?;
    if !path.exists() {
        let default_cfg = PlotterdConfig::default();
        let toml = toml::to_string_pretty(&default_cfg)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&path, toml)?;
        tracing::info!("created default config at {}", path.display());
        return Ok(default_cfg);
    }

    let data = fs::read_to_string(&path)?;
    let cfg: PlotterdConfig =
        toml::from_str(&data).with_context(|| format!("parse {}", path.display()))?;
    cfg.validate()?;
    Ok(cfg)
}
