//! Statistics pass over emitted G-code.
//!
//! Walks the program the way the controller would: tracks position, feed
//! rate and pen state, tallies moves and distances, and sums move durations
//! plus `G4 P<ms>` dwells into a time estimate.

use serde::{Deserialize, Serialize};

use super::parser::{collect_words, word_value};

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GcodeStats {
    pub rapid_moves: usize,
    pub draw_moves: usize,
    pub pen_ups: usize,
    pub pen_downs: usize,
    /// Millimetres, Euclidean between consecutive coordinates.
    pub total_distance: f64,
    pub draw_distance: f64,
    pub travel_distance: f64,
    pub estimated_time_ms: u64,
}

/// Analyze an emitted program. Moves before the first `F` word contribute
/// distance but no time (there is no feed rate to divide by).
pub fn analyze(gcode: &str) -> GcodeStats {
    let mut stats = GcodeStats::default();
    let mut x = 0.0f64;
    let mut y = 0.0f64;
    let mut z = 0.0f64;
    let mut feed_mm_min: Option<f64> = None;
    let mut pen_down = false;
    let mut time_ms = 0.0f64;

    for raw in gcode.lines() {
        let code = raw.split(';').next().unwrap_or("");
        let words = collect_words(code);
        if words.is_empty() {
            continue;
        }

        if let Some(f) = word_value(&words, 'F') {
            if f > 0.0 {
                feed_mm_min = Some(f);
            }
        }

        for &(letter, value) in &words {
            match (letter, value as i64) {
                ('G', 0) | ('G', 1) => {
                    let nx = word_value(&words, 'X').unwrap_or(x);
                    let ny = word_value(&words, 'Y').unwrap_or(y);
                    let nz = word_value(&words, 'Z').unwrap_or(z);
                    let dist =
                        ((nx - x).powi(2) + (ny - y).powi(2) + (nz - z).powi(2)).sqrt();
                    x = nx;
                    y = ny;
                    z = nz;

                    if value as i64 == 0 {
                        stats.rapid_moves += 1;
                    } else {
                        stats.draw_moves += 1;
                    }
                    stats.total_distance += dist;
                    if pen_down {
                        stats.draw_distance += dist;
                    } else {
                        stats.travel_distance += dist;
                    }
                    if let Some(feed) = feed_mm_min {
                        time_ms += dist / feed * 60_000.0;
                    }
                }
                ('G', 4) => {
                    if let Some(p) = word_value(&words, 'P') {
                        time_ms += p.max(0.0);
                    }
                }
                ('M', 3) => {
                    stats.pen_downs += 1;
                    pen_down = true;
                }
                ('M', 5) => {
                    stats.pen_ups += 1;
                    pen_down = false;
                }
                ('M', 42) => {
                    if let Some(s) = word_value(&words, 'S') {
                        if s > 0.0 {
                            stats.pen_downs += 1;
                            pen_down = true;
                        } else {
                            stats.pen_ups += 1;
                            pen_down = false;
                        }
                    }
                }
                _ => {}
            }
        }
    }

    stats.estimated_time_ms = time_ms.round() as u64;
    stats
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counts_moves_and_pen_events() {
        let gcode = "G21\nG90\nM42 P4 S0\nG0 X10 Y0 F6000\nM42 P4 S90\nG1 X20 Y0 F3000\nM42 P4 S0\n";
        let s = analyze(gcode);
        assert_eq!(s.rapid_moves, 1);
        assert_eq!(s.draw_moves, 1);
        assert_eq!(s.pen_downs, 1);
        assert_eq!(s.pen_ups, 2);
    }

    #[test]
    fn splits_draw_and_travel_distance() {
        let gcode = "G0 X10 Y0 F6000\nM42 P4 S90\nG1 X10 Y10 F3000\nM42 P4 S0\n";
        let s = analyze(gcode);
        assert!((s.travel_distance - 10.0).abs() < 1e-9);
        assert!((s.draw_distance - 10.0).abs() < 1e-9);
        assert!((s.total_distance - 20.0).abs() < 1e-9);
    }

    #[test]
    fn time_uses_feed_rate_and_dwells() {
        // 60 mm at 3600 mm/min = 1 s, plus a 500 ms dwell
        let gcode = "G1 X60 F3600\nG4 P500\n";
        let s = analyze(gcode);
        assert_eq!(s.estimated_time_ms, 1500);
    }

    #[test]
    fn moves_before_any_feed_rate_add_no_time() {
        let s = analyze("G0 X100\n");
        assert_eq!(s.estimated_time_ms, 0);
        assert!((s.total_distance - 100.0).abs() < 1e-9);
    }
}
