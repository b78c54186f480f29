//! Tokenizer and evaluator for the SVG path `d` attribute.
//!
//! Supported commands: M/m, L/l, H/h, V/v, C/c, Q/q, Z/z. Curves are
//! flattened to fixed-count polyline segments. Subpaths with fewer than two
//! points are dropped.

use crate::error::{CoreError, CoreResult};

use super::Point;

/// Polyline segments per Bezier span.
const CURVE_SEGMENTS: usize = 10;

/// Parse a `d` attribute into flattened subpaths.
pub(super) fn parse_path(d: &str) -> CoreResult<Vec<Vec<Point>>> {
    let mut tokens = Tokenizer::new(d);
    let mut subpaths: Vec<Vec<Point>> = Vec::new();
    let mut current: Vec<Point> = Vec::new();
    let mut pos = Point::default();
    let mut cmd: Option<char> = None;

    loop {
        match tokens.next_command_or_number()? {
            Token::End => break,
            Token::Command(c) => {
                if !matches!(
                    c,
                    'M' | 'm' | 'L' | 'l' | 'H' | 'h' | 'V' | 'v' | 'C' | 'c' | 'Q' | 'q'
                        | 'Z' | 'z'
                ) {
                    return Err(CoreError::Parse(format!(
                        "unsupported path command '{c}'"
                    )));
                }
                cmd = Some(c);
            }
            Token::Number(first) => {
                // numbers without a preceding command repeat the last one;
                // after M/m the implicit command is L/l
                let Some(active) = cmd else {
                    return Err(CoreError::Parse(
                        "path data must start with a command".to_string(),
                    ));
                };
                tokens.push_back(first);
                match active {
                    'M' | 'm' => {
                        let p = tokens.point(pos, active == 'm')?;
                        flush(&mut subpaths, &mut current);
                        pos = p;
                        current.push(p);
                        cmd = Some(if active == 'm' { 'l' } else { 'L' });
                    }
                    'L' | 'l' => {
                        pos = tokens.point(pos, active == 'l')?;
                        current.push(pos);
                    }
                    'H' | 'h' => {
                        let v = tokens.number()?;
                        pos.x = if active == 'h' { pos.x + v } else { v };
                        current.push(pos);
                    }
                    'V' | 'v' => {
                        let v = tokens.number()?;
                        pos.y = if active == 'v' { pos.y + v } else { v };
                        current.push(pos);
                    }
                    'C' | 'c' => {
                        let rel = active == 'c';
                        let c1 = tokens.point(pos, rel)?;
                        let c2 = tokens.point(pos, rel)?;
                        let end = tokens.point(pos, rel)?;
                        flatten_cubic(pos, c1, c2, end, &mut current);
                        pos = end;
                    }
                    'Q' | 'q' => {
                        let rel = active == 'q';
                        let c = tokens.point(pos, rel)?;
                        let end = tokens.point(pos, rel)?;
                        flatten_quadratic(pos, c, end, &mut current);
                        pos = end;
                    }
                    other => {
                        return Err(CoreError::Parse(format!(
                            "unsupported path command '{other}'"
                        )));
                    }
                }
            }
        }

        // Z takes no arguments, so it is handled as soon as it is seen
        if let Some('Z' | 'z') = cmd {
            if let Some(&first) = current.first() {
                if current.last() != Some(&first) {
                    current.push(first);
                }
                pos = first;
            }
            cmd = None;
        }
    }

    flush(&mut subpaths, &mut current);
    Ok(subpaths)
}

fn flush(subpaths: &mut Vec<Vec<Point>>, current: &mut Vec<Point>) {
    if current.len() >= 2 {
        subpaths.push(std::mem::take(current));
    } else {
        current.clear();
    }
}

fn flatten_cubic(p0: Point, c1: Point, c2: Point, p1: Point, out: &mut Vec<Point>) {
    for i in 1..=CURVE_SEGMENTS {
        let t = i as f64 / CURVE_SEGMENTS as f64;
        let u = 1.0 - t;
        let x = u * u * u * p0.x
            + 3.0 * u * u * t * c1.x
            + 3.0 * u * t * t * c2.x
            + t * t * t * p1.x;
        let y = u * u * u * p0.y
            + 3.0 * u * u * t * c1.y
            + 3.0 * u * t * t * c2.y
            + t * t * t * p1.y;
        out.push(Point::new(x, y));
    }
}

fn flatten_quadratic(p0: Point, c: Point, p1: Point, out: &mut Vec<Point>) {
    for i in 1..=CURVE_SEGMENTS {
        let t = i as f64 / CURVE_SEGMENTS as f64;
        let u = 1.0 - t;
        let x = u * u * p0.x + 2.0 * u * t * c.x + t * t * p1.x;
        let y = u * u * p0.y + 2.0 * u * t * c.y + t * t * p1.y;
        out.push(Point::new(x, y));
    }
}

enum Token {
    Command(char),
    Number(f64),
    End,
}

struct Tokenizer<'a> {
    bytes: &'a [u8],
    pos: usize,
    pushed: Option<f64>,
}

impl<'a> Tokenizer<'a> {
    fn new(d: &'a str) -> Self {
        Self {
            bytes: d.as_bytes(),
            pos: 0,
            pushed: None,
        }
    }

    fn push_back(&mut self, n: f64) {
        self.pushed = Some(n);
    }

    fn skip_separators(&mut self) {
        while self.pos < self.bytes.len() {
            let b = self.bytes[self.pos];
            if b.is_ascii_whitespace() || b == b',' {
                self.pos += 1;
            } else {
                break;
            }
        }
    }

    fn next_command_or_number(&mut self) -> CoreResult<Token> {
        if let Some(n) = self.pushed.take() {
            return Ok(Token::Number(n));
        }
        self.skip_separators();
        if self.pos >= self.bytes.len() {
            return Ok(Token::End);
        }
        let b = self.bytes[self.pos];
        if b.is_ascii_alphabetic() {
            self.pos += 1;
            return Ok(Token::Command(b as char));
        }
        Ok(Token::Number(self.read_number()?))
    }

    /// Next token as a number; fails on a command letter or end of input.
    fn number(&mut self) -> CoreResult<f64> {
        match self.next_command_or_number()? {
            Token::Number(n) => Ok(n),
            Token::Command(c) => Err(CoreError::Parse(format!(
                "expected number in path data, found '{c}'"
            ))),
            Token::End => Err(CoreError::Parse(
                "unexpected end of path data".to_string(),
            )),
        }
    }

    fn point(&mut self, origin: Point, relative: bool) -> CoreResult<Point> {
        let x = self.number()?;
        let y = self.number()?;
        if relative {
            Ok(Point::new(origin.x + x, origin.y + y))
        } else {
            Ok(Point::new(x, y))
        }
    }

    fn read_number(&mut self) -> CoreResult<f64> {
        let start = self.pos;
        if self.pos < self.bytes.len() && matches!(self.bytes[self.pos], b'+' | b'-') {
            self.pos += 1;
        }
        let mut seen_dot = false;
        let mut seen_exp = false;
        while self.pos < self.bytes.len() {
            match self.bytes[self.pos] {
                b'0'..=b'9' => self.pos += 1,
                b'.' if !seen_dot && !seen_exp => {
                    seen_dot = true;
                    self.pos += 1;
                }
                b'e' | b'E' if !seen_exp => {
                    seen_exp = true;
                    self.pos += 1;
                    if self.pos < self.bytes.len()
                        && matches!(self.bytes[self.pos], b'+' | b'-')
                    {
                        self.pos += 1;
                    }
                }
                _ => break,
            }
        }
        let text = std::str::from_utf8(&self.bytes[start..self.pos]).unwrap_or("");
        text.parse::<f64>()
            .map_err(|_| CoreError::Parse(format!("bad number in path data: '{text}'")))
    }
}
