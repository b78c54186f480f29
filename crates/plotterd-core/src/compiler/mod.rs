//! SVG-to-G-code compiler.
//!
//! Pipeline: optional external optimizer pass → SVG subset parse →
//! polyline flattening → layout onto the machine canvas → G-code emission.
//! A statistics pass over the emitted program reports move counts,
//! distances and a time estimate.

mod emit;
mod layout;
mod optimize;
mod path_data;
mod svg;

pub use svg::ViewBox;

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, CoreResult};
use crate::gcode::{self, GcodeStats};

/// A coordinate on the machine canvas, millimetres. Origin is front-left;
/// +Y is away from the operator.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

/// How source geometry is scaled to the drawable area.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScaleMode {
    /// Min of the axis ratios, enlarging or shrinking as needed.
    #[default]
    Fit,
    /// Like `fit` but capped at 1x: never enlarge.
    Contain,
    /// SVG units are assumed to be millimetres already.
    None,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlignX {
    Left,
    #[default]
    Center,
    Right,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlignY {
    Front,
    #[default]
    Center,
    Back,
}

/// Compile options; also the `[canvas]` config section. Field names follow
/// the client request schema, and unknown keys are rejected.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default, deny_unknown_fields)]
pub struct CanvasOptions {
    /// Machine extents, millimetres.
    pub canvas_width: f64,
    pub canvas_height: f64,
    /// Uniform inset, millimetres.
    pub margin: f64,
    /// Rapid (G0) feed rate, mm/min.
    pub travel_speed: f64,
    /// Drawing (G1) feed rate, mm/min.
    pub draw_speed: f64,
    /// Dwell after lowering the pen, milliseconds.
    pub pen_down_delay: u64,
    /// Dwell after raising the pen, milliseconds.
    pub pen_up_delay: u64,
    /// Run the external linemerge/linesort optimizer when present.
    pub optimize: bool,
    pub simplify: bool,
    /// Millimetres, only meaningful with `simplify`.
    pub simplify_tolerance: f64,
    pub scale_mode: ScaleMode,
    pub align_x: AlignX,
    pub align_y: AlignY,
}

impl Default for CanvasOptions {
    fn default() -> Self {
        Self {
            canvas_width: 480.0,
            canvas_height: 480.0,
            margin: 10.0,
            travel_speed: 6_000.0,
            draw_speed: 3_000.0,
            pen_down_delay: 150,
            pen_up_delay: 100,
            optimize: false,
            simplify: false,
            simplify_tolerance: 0.1,
            scale_mode: ScaleMode::Fit,
            align_x: AlignX::Center,
            align_y: AlignY::Center,
        }
    }
}

/// Pen servo wiring used by the emitter.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct PenSettings {
    pub pin: u8,
    pub up_value: u16,
    pub down_value: u16,
}

impl Default for PenSettings {
    fn default() -> Self {
        Self {
            pin: 4,
            up_value: 0,
            down_value: 90,
        }
    }
}

/// A compiled program plus the statistics pass over it.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CompileResult {
    pub gcode: String,
    pub stats: GcodeStats,
    /// Paths that survived flattening (single-point paths are dropped).
    pub path_count: usize,
}

/// Compile an SVG document to a G-code program for the machine canvas.
///
/// Parse failures come back as [`CoreError::Parse`]; an absent optimizer is
/// not an error (the original document is used).
pub async fn compile(
    svg_text: &str,
    opts: &CanvasOptions,
    pen: &PenSettings,
) -> CoreResult<CompileResult> {
    if opts.canvas_width - 2.0 * opts.margin <= 0.0
        || opts.canvas_height - 2.0 * opts.margin <= 0.0
    {
        return Err(CoreError::Parse(
            "margin leaves no drawable area on the canvas".to_string(),
        ));
    }

    let optimized;
    let source = if opts.optimize {
        optimized = optimize::run(svg_text, opts).await?;
        optimized.as_deref().unwrap_or(svg_text)
    } else {
        svg_text
    };

    let document = svg::parse_document(source)?;
    let mut paths = document.paths;
    let placement = layout::place(&mut paths, opts)?;
    tracing::debug!(
        paths = paths.len(),
        view_box = ?document.view_box,
        scale = placement.scale,
        offset_x = placement.offset_x,
        offset_y = placement.offset_y,
        "laid out svg geometry"
    );

    let gcode = emit::emit(&paths, opts, pen);
    let stats = gcode::analyze(&gcode);
    Ok(CompileResult {
        path_count: paths.len(),
        gcode,
        stats,
    })
}
