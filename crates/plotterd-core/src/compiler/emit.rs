//! G-code emission for laid-out paths.
//!
//! Header sets metric units and absolute positioning with the pen raised;
//! each path is a rapid to its first point, pen down, linear moves, pen up;
//! the footer raises the pen and returns to the origin. Coordinates carry
//! three decimals, feed rates are integer `F` words, dwells are `G4 P<ms>`.

use std::fmt::Write;

use super::{CanvasOptions, PenSettings, Point};

pub(super) fn emit(paths: &[Vec<Point>], opts: &CanvasOptions, pen: &PenSettings) -> String {
    let travel = opts.travel_speed.round() as i64;
    let draw = opts.draw_speed.round() as i64;
    let mut out = String::new();

    out.push_str("G21\n");
    out.push_str("G90\n");
    pen_up(&mut out, opts, pen);

    for path in paths {
        let Some((first, rest)) = path.split_first() else {
            continue;
        };
        if rest.is_empty() {
            continue;
        }
        let _ = writeln!(out, "G0 X{:.3} Y{:.3} F{travel}", first.x, first.y);
        pen_down(&mut out, opts, pen);
        for p in rest {
            let _ = writeln!(out, "G1 X{:.3} Y{:.3} F{draw}", p.x, p.y);
        }
        pen_up(&mut out, opts, pen);
    }

    pen_up(&mut out, opts, pen);
    let _ = writeln!(out, "G0 X0.000 Y0.000 F{travel}");
    out
}

fn pen_down(out: &mut String, opts: &CanvasOptions, pen: &PenSettings) {
    let _ = writeln!(out, "M42 P{} S{}", pen.pin, pen.down_value);
    if opts.pen_down_delay > 0 {
        let _ = writeln!(out, "G4 P{}", opts.pen_down_delay);
    }
}

fn pen_up(out: &mut String, opts: &CanvasOptions, pen: &PenSettings) {
    let _ = writeln!(out, "M42 P{} S{}", pen.pin, pen.up_value);
    if opts.pen_up_delay > 0 {
        let _ = writeln!(out, "G4 P{}", opts.pen_up_delay);
    }
}
