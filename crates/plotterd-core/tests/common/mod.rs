//! Shared fixtures for integration tests.

use std::fmt::Write;

/// Reference program: three five-point stars centered on a 480x480 mm
/// canvas, pen actuated by Z moves. Parses to a single `Main` layer with
/// three shapes and 27 movement commands.
pub fn three_star_gcode() -> String {
    let mut out = String::new();
    out.push_str("; three stars, 480 x 480 bed\n");
    out.push_str("G21\n");
    out.push_str("G90\n");
    out.push_str("G1 Z5.000 F3000\n");
    out.push_str("G0 X0.000 Y0.000 F6000\n");

    for &cx in &[120.0f64, 240.0, 360.0] {
        let cy = 240.0f64;
        let r = 50.0f64;
        // pentagram: visit the outer points in star order
        let order = [0usize, 2, 4, 1, 3];
        let point = |i: usize| {
            let angle = std::f64::consts::FRAC_PI_2
                + i as f64 * std::f64::consts::TAU / 5.0;
            (cx + r * angle.cos(), cy + r * angle.sin())
        };
        let (sx, sy) = point(order[0]);
        let _ = writeln!(out, "G0 X{sx:.3} Y{sy:.3} F6000");
        out.push_str("G1 Z0.000 F1500\n");
        for &i in order.iter().skip(1) {
            let (x, y) = point(i);
            let _ = writeln!(out, "G1 X{x:.3} Y{y:.3} F3000");
        }
        let _ = writeln!(out, "G1 X{sx:.3} Y{sy:.3} F3000");
        out.push_str("G1 Z5.000 F3000\n");
    }

    out.push_str("G0 X0.000 Y0.000 F6000\n");
    out
}

/// A program of `n` drawing moves, one per line.
pub fn line_program(n: usize) -> String {
    let mut out = String::new();
    for i in 0..n {
        let _ = writeln!(out, "G1 X{}.0 Y{}.0 F3000", i % 100, (i / 100) % 100);
    }
    out
}
