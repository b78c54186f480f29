use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use plotterd_core::bus::{BusFrame, EventBus, EventType};
use plotterd_core::compiler::{self, AlignX, AlignY, CanvasOptions, PenSettings, ScaleMode};
use plotterd_core::config::PlotterdConfig;
use plotterd_core::daemon::Daemon;
use plotterd_core::gcode;
use plotterd_core::jobs::JobManager;
use plotterd_core::transport::Controller;

/// Top-level CLI for the plotterd pen-plotter daemon.
#[derive(Debug, Parser)]
#[command(name = "plotterd")]
#[command(about = "plotterd: pen-plotter control daemon", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: CliCommand,
}

#[derive(Debug, Subcommand)]
pub enum CliCommand {
    /// Run the daemon: WebSocket bus, transport, job manager.
    Serve,

    /// Compile an SVG file to G-code.
    Compile {
        /// Input SVG file.
        input: PathBuf,

        /// Output path; stdout when omitted.
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Canvas width in mm (default from config).
        #[arg(long)]
        width: Option<f64>,

        /// Canvas height in mm (default from config).
        #[arg(long)]
        height: Option<f64>,

        /// Uniform margin in mm.
        #[arg(long)]
        margin: Option<f64>,

        /// fit, contain, or none.
        #[arg(long)]
        scale_mode: Option<String>,

        /// left, center, or right.
        #[arg(long)]
        align_x: Option<String>,

        /// front, center, or back.
        #[arg(long)]
        align_y: Option<String>,

        /// Run the external optimizer (linemerge/linesort).
        #[arg(long)]
        optimize: bool,

        /// Simplify polylines (implies a tolerance; see --tolerance).
        #[arg(long)]
        simplify: bool,

        /// Simplify tolerance in mm.
        #[arg(long)]
        tolerance: Option<f64>,
    },

    /// Parse a G-code file and print its plan as JSON.
    Plan {
        /// Input G-code file.
        input: PathBuf,
    },

    /// Execute a G-code file as a job, printing progress. Ctrl-C cancels.
    Print {
        /// Input G-code file.
        input: PathBuf,

        /// Use the simulated controller instead of the serial link.
        #[arg(long)]
        sim: bool,
    },

    /// Query the controller position once.
    Position {
        /// Use the simulated controller instead of the serial link.
        #[arg(long)]
        sim: bool,
    },
}

/// Dispatch the parsed command line against an already-loaded config.
pub async fn run(cfg: PlotterdConfig) -> Result<()> {
    let cli = Cli::parse();
    tracing::debug!(command = ?cli.command, "dispatching");

    match cli.command {
        CliCommand::Serve => {
            Daemon::build(cfg)?.serve().await?;
        }
        CliCommand::Compile {
            input,
            output,
            width,
            height,
            margin,
            scale_mode,
            align_x,
            align_y,
            optimize,
            simplify,
            tolerance,
        } => {
            let mut opts = cfg.canvas.clone();
            apply_overrides(
                &mut opts, width, height, margin, scale_mode, align_x, align_y,
                optimize, simplify, tolerance,
            )?;
            let pen = PenSettings::from(&cfg.machine);
            let svg = tokio::fs::read_to_string(&input)
                .await
                .with_context(|| format!("read {}", input.display()))?;
            let result = compiler::compile(&svg, &opts, &pen).await?;
            match output {
                Some(path) => {
                    tokio::fs::write(&path, &result.gcode)
                        .await
                        .with_context(|| format!("write {}", path.display()))?;
                    println!(
                        "{}: {} paths, {} draw moves, {:.0} mm drawn, ~{} s",
                        path.display(),
                        result.path_count,
                        result.stats.draw_moves,
                        result.stats.draw_distance,
                        result.stats.estimated_time_ms / 1000
                    );
                }
                None => print!("{}", result.gcode),
            }
        }
        CliCommand::Plan { input } => {
            let content = tokio::fs::read_to_string(&input)
                .await
                .with_context(|| format!("read {}", input.display()))?;
            let plan = gcode::parse(&content);
            println!("{}", serde_json::to_string_pretty(&plan)?);
        }
        CliCommand::Print { input, sim } => {
            print_file(&cfg, &input, sim).await?;
        }
        CliCommand::Position { sim } => {
            let mut serial = cfg.serial.clone();
            serial.dev_mode = serial.dev_mode || sim;
            let transport = Controller::connect(&serial);
            let pos = transport.get_position().await?;
            println!(
                "X:{:.2} Y:{:.2} Z:{:.2} E:{:.2}",
                pos.x, pos.y, pos.z, pos.e
            );
        }
    }

    Ok(())
}

#[allow(clippy::too_many_arguments)]
fn apply_overrides(
    opts: &mut CanvasOptions,
    width: Option<f64>,
    height: Option<f64>,
    margin: Option<f64>,
    scale_mode: Option<String>,
    align_x: Option<String>,
    align_y: Option<String>,
    optimize: bool,
    simplify: bool,
    tolerance: Option<f64>,
) -> Result<()> {
    if let Some(w) = width {
        opts.canvas_width = w;
    }
    if let Some(h) = height {
        opts.canvas_height = h;
    }
    if let Some(m) = margin {
        opts.margin = m;
    }
    if let Some(mode) = scale_mode {
        opts.scale_mode = parse_scale_mode(&mode)?;
    }
    if let Some(align) = align_x {
        opts.align_x = parse_align_x(&align)?;
    }
    if let Some(align) = align_y {
        opts.align_y = parse_align_y(&align)?;
    }
    if optimize {
        opts.optimize = true;
    }
    if simplify {
        opts.simplify = true;
    }
    if let Some(t) = tolerance {
        opts.simplify_tolerance = t;
    }
    Ok(())
}

fn parse_scale_mode(s: &str) -> Result<ScaleMode> {
    match s {
        "fit" => Ok(ScaleMode::Fit),
        "contain" => Ok(ScaleMode::Contain),
        "none" => Ok(ScaleMode::None),
        other => anyhow::bail!("unknown scale mode '{other}' (fit, contain, none)"),
    }
}

fn parse_align_x(s: &str) -> Result<AlignX> {
    match s {
        "left" => Ok(AlignX::Left),
        "center" => Ok(AlignX::Center),
        "right" => Ok(AlignX::Right),
        other => anyhow::bail!("unknown x alignment '{other}' (left, center, right)"),
    }
}

fn parse_align_y(s: &str) -> Result<AlignY> {
    match s {
        "front" => Ok(AlignY::Front),
        "center" => Ok(AlignY::Center),
        "back" => Ok(AlignY::Back),
        other => anyhow::bail!("unknown y alignment '{other}' (front, center, back)"),
    }
}

/// Run a file as a job against the controller, rendering throttled progress
/// the same way a bus subscriber sees it.
async fn print_file(cfg: &PlotterdConfig, input: &PathBuf, sim: bool) -> Result<()> {
    let mut serial = cfg.serial.clone();
    serial.dev_mode = serial.dev_mode || sim;

    let transport = Controller::connect(&serial);
    let bus = Arc::new(EventBus::new());
    let manager = JobManager::new(transport, Arc::clone(&bus), &cfg.jobs);
    let _forwarder = manager.spawn_event_forwarder();

    let content = tokio::fs::read_to_string(input)
        .await
        .with_context(|| format!("read {}", input.display()))?;

    let (client, mut frames) = bus.register();
    let job = manager.create_job(&content);
    bus.subscribe(client, job.id);
    manager.start(job.id)?;
    println!(
        "job {} started: {} lines, {} layers",
        job.id, job.progress.total_lines, job.progress.total_layers
    );

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                manager.cancel(job.id).await.ok();
                println!("\ncancelled");
                break;
            }
            frame = frames.recv() => {
                match frame {
                    Some(BusFrame::Event(event)) => match event.kind {
                        EventType::JobProgress => {
                            let p = &event.data["progress"];
                            println!(
                                "line {}/{} ({}%), ~{} s remaining",
                                p["currentLine"], p["totalLines"], p["percentage"],
                                p["estimatedRemainingMs"].as_u64().unwrap_or(0) / 1000
                            );
                        }
                        EventType::JobLayerChange => {
                            println!("layer {} ({})", event.data["layer"], event.data["name"]);
                        }
                        EventType::JobCompleted => {
                            println!("completed in {} ms", event.data["elapsedMs"]);
                            break;
                        }
                        EventType::JobError => {
                            println!("failed: {}", event.data["error"]["message"]);
                            break;
                        }
                        _ => {}
                    },
                    Some(BusFrame::Ping) => {}
                    None => break,
                }
            }
        }
    }
    Ok(())
}
