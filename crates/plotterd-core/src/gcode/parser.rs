//! Linear scan of a G-code program into a [`Plan`].
//!
//! Layer markers (`LAYER:<n>`, `LAYER_CHANGE`), tool changes (`T<n>`,
//! `M6 T<n>`) and pauses (`M0`/`M1`) partition the program into layers;
//! motion lines feed the tracked position and the pen heuristics. When no
//! markers exist at all a single `Main` layer is synthesized, so the result
//! always has at least one layer.

use super::plan::{
    Checkpoint, CheckpointKind, Layer, Plan, PlanPosition, PlanStats, ToolChange,
};

/// Z travel beyond this, while the pen is up, is treated as a layer move.
const Z_LAYER_THRESHOLD_MM: f64 = 0.5;

/// Rough per-move cost used for the static estimate; the scheduler refines
/// this at runtime from observed throughput.
const MS_PER_MOVEMENT: u64 = 100;

/// Scan `content` and produce its plan. Never fails: unparseable lines are
/// counted but otherwise ignored.
pub fn parse(content: &str) -> Plan {
    let mut scanner = Scanner::default();
    for (idx, line) in content.lines().enumerate() {
        scanner.line(idx + 1, line);
    }
    scanner.finish(content)
}

struct OpenLayer {
    index: i64,
    start_line: usize,
    name: String,
    color: Option<String>,
    tool: i64,
}

#[derive(Default)]
struct Scanner {
    layers: Vec<Layer>,
    open: Option<OpenLayer>,
    tool_changes: Vec<ToolChange>,
    checkpoints: Vec<Checkpoint>,

    total_lines: usize,
    rapid_count: usize,
    linear_count: usize,
    shapes: usize,

    position: PlanPosition,
    pen_down: bool,
    tool: i64,
    explicit_markers: bool,
    pending_color: Option<String>,
    section_counter: usize,
}

impl Scanner {
    fn line(&mut self, line_no: usize, raw: &str) {
        self.total_lines = line_no;

        let (code, comment) = match raw.find(';') {
            Some(i) => (&raw[..i], Some(&raw[i + 1..])),
            None => (raw, None),
        };

        if let Some(comment) = comment {
            self.comment(line_no, comment);
        }

        let words = collect_words(code);
        if words.is_empty() {
            return;
        }

        if let Some(tool) = tool_word(&words) {
            self.tool_change(line_no, tool);
        }

        for &(letter, value) in &words {
            match letter {
                'G' => match value as i64 {
                    0 => self.motion(line_no, &words, true),
                    1 => self.motion(line_no, &words, false),
                    _ => {}
                },
                'M' => match value as i64 {
                    0 | 1 => self.pause(line_no),
                    3 => self.set_pen(true),
                    5 => self.set_pen(false),
                    42 => {
                        if let Some(s) = word_value(&words, 'S') {
                            self.set_pen(s > 0.0);
                        }
                    }
                    _ => {}
                },
                _ => {}
            }
        }
    }

    fn comment(&mut self, line_no: usize, comment: &str) {
        let upper = comment.trim().to_ascii_uppercase();

        if upper.contains("LAYER_CHANGE") {
            let index = self.next_ordinal();
            self.begin_layer(line_no, index, format!("Layer {index}"), true);
            return;
        }

        if let Some(pos) = upper.find("LAYER") {
            let after = upper[pos + "LAYER".len()..]
                .trim_start_matches([':', ' ', '\t']);
            if let Some(n) = leading_int(after) {
                self.begin_layer(line_no, n, format!("Layer {n}"), true);
                return;
            }
        }

        if upper.starts_with("COLOR") || upper.starts_with("PEN") {
            let value = comment
                .trim()
                .split_once([':', '='])
                .map(|(_, v)| v.trim().to_string())
                .filter(|v| !v.is_empty());
            if let Some(value) = value {
                match self.open.as_mut() {
                    Some(open) => open.color = Some(value),
                    None => self.pending_color = Some(value),
                }
            }
        }
    }

    fn motion(&mut self, line_no: usize, words: &[(char, f64)], rapid: bool) {
        if rapid {
            self.rapid_count += 1;
        } else {
            self.linear_count += 1;
        }

        let mut next = self.position;
        if let Some(x) = word_value(words, 'X') {
            next.x = x;
        }
        if let Some(y) = word_value(words, 'Y') {
            next.y = y;
        }
        if let Some(z) = word_value(words, 'Z') {
            next.z = z;
        }

        let dz = next.z - self.position.z;
        let pen_was_down = self.pen_down;
        self.position = next;

        if !self.explicit_markers && !pen_was_down && dz.abs() > Z_LAYER_THRESHOLD_MM {
            self.checkpoint(line_no, CheckpointKind::ZChange);
        }

        if dz <= -Z_LAYER_THRESHOLD_MM {
            self.set_pen(true);
        } else if dz >= Z_LAYER_THRESHOLD_MM {
            self.set_pen(false);
        }
    }

    fn pause(&mut self, line_no: usize) {
        self.checkpoint(line_no, CheckpointKind::Pause);
        if !self.explicit_markers {
            if self.open.is_none() && self.layers.is_empty() {
                self.open = Some(OpenLayer {
                    index: 0,
                    start_line: 1,
                    name: "Main".to_string(),
                    color: self.pending_color.take(),
                    tool: self.tool,
                });
            }
            // the pause line itself belongs to the closing section
            self.close_open(line_no + 1);
            self.section_counter += 1;
            let index = self.next_ordinal();
            self.open = Some(OpenLayer {
                index,
                start_line: line_no + 1,
                name: format!("Section {}", self.section_counter),
                color: self.pending_color.take(),
                tool: self.tool,
            });
        }
    }

    fn tool_change(&mut self, line_no: usize, tool: i64) {
        if tool == self.tool {
            return;
        }
        self.tool_changes.push(ToolChange {
            line: line_no,
            tool,
            previous_tool: self.tool,
        });
        self.checkpoint(line_no, CheckpointKind::ToolChange);
        self.tool = tool;
        if !self.explicit_markers {
            let index = self.next_ordinal();
            self.begin_layer(line_no, index, format!("Tool {tool}"), false);
        }
    }

    fn set_pen(&mut self, down: bool) {
        if down && !self.pen_down {
            self.shapes += 1;
        }
        self.pen_down = down;
    }

    fn checkpoint(&mut self, line_no: usize, kind: CheckpointKind) {
        self.checkpoints.push(Checkpoint {
            line: line_no,
            position: self.position,
            kind,
        });
    }

    /// Close the running layer and open a new one at `line_no`. The very
    /// first layer stretches back to line 1 so the layer ranges cover every
    /// counted line.
    fn begin_layer(&mut self, line_no: usize, index: i64, name: String, explicit: bool) {
        if explicit {
            self.explicit_markers = true;
            self.checkpoint(line_no, CheckpointKind::Layer);
        }
        let start_line = if self.layers.is_empty() && self.open.is_none() {
            1
        } else {
            self.close_open(line_no);
            line_no
        };
        self.open = Some(OpenLayer {
            index,
            start_line,
            name,
            color: self.pending_color.take(),
            tool: self.tool,
        });
    }

    /// Push the open layer, ending just before `line_no`. An open layer that
    /// never covered a line (back-to-back markers) is dropped.
    fn close_open(&mut self, line_no: usize) {
        if let Some(open) = self.open.take() {
            if open.start_line < line_no {
                self.layers.push(Layer {
                    index: open.index,
                    start_line: open.start_line,
                    end_line: line_no - 1,
                    name: open.name,
                    color: open.color,
                    tool: open.tool,
                });
            }
        }
    }

    fn next_ordinal(&self) -> i64 {
        self.layers.len() as i64 + if self.open.is_some() { 1 } else { 0 }
    }

    fn finish(mut self, content: &str) -> Plan {
        let total = self.total_lines;

        if let Some(open) = self.open.take() {
            if open.start_line <= total {
                self.layers.push(Layer {
                    index: open.index,
                    start_line: open.start_line,
                    end_line: total,
                    name: open.name,
                    color: open.color,
                    tool: open.tool,
                });
            }
        }

        if self.layers.is_empty() {
            self.layers.push(Layer {
                index: 0,
                start_line: if total == 0 { 0 } else { 1 },
                end_line: total,
                name: "Main".to_string(),
                color: self.pending_color.take(),
                tool: self.tool,
            });
        } else if let Some(last) = self.layers.last_mut() {
            if last.end_line < total {
                last.end_line = total;
            }
        }

        let movement_commands = self.rapid_count + self.linear_count;
        Plan {
            stats: PlanStats {
                total_lines: total,
                movement_commands,
                rapid_count: self.rapid_count,
                linear_count: self.linear_count,
                shapes: self.shapes,
                estimated_time_ms: movement_commands as u64 * MS_PER_MOVEMENT,
            },
            layers: self.layers,
            tool_changes: self.tool_changes,
            checkpoints: self.checkpoints,
            content: content.to_string(),
        }
    }
}

/// Split a code fragment into `(address, value)` words. Tokens without a
/// parseable number (bare letters, line numbers with junk) are skipped.
pub(super) fn collect_words(code: &str) -> Vec<(char, f64)> {
    let mut words = Vec::new();
    for token in code.split_whitespace() {
        let mut chars = token.chars();
        let Some(letter) = chars.next() else { continue };
        if !letter.is_ascii_alphabetic() {
            continue;
        }
        let rest = chars.as_str();
        if let Ok(value) = rest.parse::<f64>() {
            words.push((letter.to_ascii_uppercase(), value));
        }
    }
    words
}

pub(super) fn word_value(words: &[(char, f64)], letter: char) -> Option<f64> {
    words.iter().find(|(l, _)| *l == letter).map(|(_, v)| *v)
}

/// Tool number from a `T` word, standalone or alongside `M6`.
fn tool_word(words: &[(char, f64)]) -> Option<i64> {
    word_value(words, 'T').map(|v| v as i64)
}

fn leading_int(s: &str) -> Option<i64> {
    let digits: String = s.chars().take_while(|c| c.is_ascii_digit()).collect();
    digits.parse().ok()
}
