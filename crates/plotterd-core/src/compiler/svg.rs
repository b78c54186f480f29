//! SVG subset parsing: element walk and polyline extraction.
//!
//! Supported elements: `path`, `polyline`, `polygon`, `line`, `circle`,
//! `rect`. Everything else (groups pass their children through) is silently
//! ignored. `viewBox` is preferred over `width`/`height`.

use crate::error::{CoreError, CoreResult};

use super::path_data;
use super::Point;

/// Segments used to polygonalize a circle.
const CIRCLE_SEGMENTS: usize = 36;

/// SVG-local coordinate box used during parsing.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ViewBox {
    pub min_x: f64,
    pub min_y: f64,
    pub width: f64,
    pub height: f64,
}

#[derive(Debug)]
pub(super) struct SvgDocument {
    pub paths: Vec<Vec<Point>>,
    pub view_box: ViewBox,
}

/// Parse an SVG document into flattened paths. Paths with fewer than two
/// points are dropped here, so every returned path is drawable.
pub(super) fn parse_document(text: &str) -> CoreResult<SvgDocument> {
    let doc = roxmltree::Document::parse(text)
        .map_err(|e| CoreError::Parse(format!("svg: {e}")))?;
    let root = doc.root_element();
    if root.tag_name().name() != "svg" {
        return Err(CoreError::Parse(format!(
            "expected <svg> root, found <{}>",
            root.tag_name().name()
        )));
    }

    let view_box = parse_view_box(&root);
    let mut paths: Vec<Vec<Point>> = Vec::new();

    for node in doc.descendants().filter(|n| n.is_element()) {
        match node.tag_name().name() {
            "path" => {
                if let Some(d) = node.attribute("d") {
                    for subpath in path_data::parse_path(d)? {
                        push_path(&mut paths, subpath);
                    }
                }
            }
            "polyline" => {
                let points = parse_points(node.attribute("points").unwrap_or(""));
                push_path(&mut paths, points);
            }
            "polygon" => {
                let mut points = parse_points(node.attribute("points").unwrap_or(""));
                if let Some(&first) = points.first() {
                    if points.last() != Some(&first) {
                        points.push(first);
                    }
                }
                push_path(&mut paths, points);
            }
            "line" => {
                let p1 = Point::new(float_attr(&node, "x1"), float_attr(&node, "y1"));
                let p2 = Point::new(float_attr(&node, "x2"), float_attr(&node, "y2"));
                push_path(&mut paths, vec![p1, p2]);
            }
            "circle" => {
                let r = float_attr(&node, "r");
                if r > 0.0 {
                    let cx = float_attr(&node, "cx");
                    let cy = float_attr(&node, "cy");
                    push_path(&mut paths, polygonalize_circle(cx, cy, r));
                }
            }
            "rect" => {
                let w = float_attr(&node, "width");
                let h = float_attr(&node, "height");
                if w > 0.0 && h > 0.0 {
                    let x = float_attr(&node, "x");
                    let y = float_attr(&node, "y");
                    push_path(
                        &mut paths,
                        vec![
                            Point::new(x, y),
                            Point::new(x + w, y),
                            Point::new(x + w, y + h),
                            Point::new(x, y + h),
                            Point::new(x, y),
                        ],
                    );
                }
            }
            _ => {}
        }
    }

    Ok(SvgDocument { paths, view_box })
}

fn push_path(paths: &mut Vec<Vec<Point>>, path: Vec<Point>) {
    if path.len() >= 2 {
        paths.push(path);
    }
}

fn polygonalize_circle(cx: f64, cy: f64, r: f64) -> Vec<Point> {
    let mut points = Vec::with_capacity(CIRCLE_SEGMENTS + 1);
    for i in 0..CIRCLE_SEGMENTS {
        let angle = i as f64 / CIRCLE_SEGMENTS as f64 * std::f64::consts::TAU;
        points.push(Point::new(cx + r * angle.cos(), cy + r * angle.sin()));
    }
    points.push(points[0]);
    points
}

fn parse_view_box(root: &roxmltree::Node<'_, '_>) -> ViewBox {
    if let Some(vb) = root.attribute("viewBox") {
        let parts: Vec<f64> = vb
            .split([' ', ',', '\t', '\n'])
            .filter(|s| !s.is_empty())
            .filter_map(|s| s.parse().ok())
            .collect();
        if parts.len() == 4 && parts[2] > 0.0 && parts[3] > 0.0 {
            return ViewBox {
                min_x: parts[0],
                min_y: parts[1],
                width: parts[2],
                height: parts[3],
            };
        }
    }

    let width = root.attribute("width").and_then(parse_length);
    let height = root.attribute("height").and_then(parse_length);
    match (width, height) {
        (Some(w), Some(h)) if w > 0.0 && h > 0.0 => ViewBox {
            min_x: 0.0,
            min_y: 0.0,
            width: w,
            height: h,
        },
        _ => ViewBox {
            min_x: 0.0,
            min_y: 0.0,
            width: 1.0,
            height: 1.0,
        },
    }
}

/// Parse a length attribute, tolerating a unit suffix like `mm` or `px`.
fn parse_length(value: &str) -> Option<f64> {
    let trimmed = value.trim();
    let end = trimmed
        .find(|c: char| !c.is_ascii_digit() && c != '.' && c != '-' && c != '+')
        .unwrap_or(trimmed.len());
    trimmed[..end].parse().ok()
}

fn float_attr(node: &roxmltree::Node<'_, '_>, name: &str) -> f64 {
    node.attribute(name)
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(0.0)
}

fn parse_points(value: &str) -> Vec<Point> {
    let numbers: Vec<f64> = value
        .split([' ', ',', '\t', '\n', '\r'])
        .filter(|s| !s.is_empty())
        .filter_map(|s| s.parse().ok())
        .collect();
    numbers
        .chunks_exact(2)
        .map(|pair| Point::new(pair[0], pair[1]))
        .collect()
}
