//! Scaling and placement of parsed geometry onto the machine canvas.
//!
//! The drawable area is the canvas minus the uniform margin on every side.
//! A uniform scale is chosen per scale mode, then offsets derived from the
//! alignment options place the scaled bounds inside the drawable area:
//! `x' = (x - min_x) * scale + offset_x`, likewise for y.

use crate::error::{CoreError, CoreResult};

use super::{AlignX, AlignY, CanvasOptions, Point, ScaleMode};

#[derive(Debug, Clone, Copy)]
pub(super) struct Placement {
    pub scale: f64,
    pub offset_x: f64,
    pub offset_y: f64,
}

/// Transform `paths` in place. Degenerate geometry (zero width or height)
/// passes through unscaled; alignment offsets still apply.
pub(super) fn place(paths: &mut [Vec<Point>], opts: &CanvasOptions) -> CoreResult<Placement> {
    let avail_w = opts.canvas_width - 2.0 * opts.margin;
    let avail_h = opts.canvas_height - 2.0 * opts.margin;
    if avail_w <= 0.0 || avail_h <= 0.0 {
        return Err(CoreError::Parse(
            "margin leaves no drawable area on the canvas".to_string(),
        ));
    }

    let Some(bounds) = bounds(paths) else {
        return Ok(Placement {
            scale: 1.0,
            offset_x: opts.margin,
            offset_y: opts.margin,
        });
    };
    let (min_x, min_y, width, height) = bounds;

    let degenerate = width <= f64::EPSILON || height <= f64::EPSILON;
    let scale = if degenerate {
        1.0
    } else {
        match opts.scale_mode {
            ScaleMode::Fit => (avail_w / width).min(avail_h / height),
            ScaleMode::Contain => (avail_w / width).min(avail_h / height).min(1.0),
            ScaleMode::None => 1.0,
        }
    };

    let scaled_w = width * scale;
    let scaled_h = height * scale;
    let offset_x = opts.margin
        + match opts.align_x {
            AlignX::Left => 0.0,
            AlignX::Center => (avail_w - scaled_w) / 2.0,
            AlignX::Right => avail_w - scaled_w,
        };
    let offset_y = opts.margin
        + match opts.align_y {
            AlignY::Front => 0.0,
            AlignY::Center => (avail_h - scaled_h) / 2.0,
            AlignY::Back => avail_h - scaled_h,
        };

    for path in paths.iter_mut() {
        for p in path.iter_mut() {
            p.x = (p.x - min_x) * scale + offset_x;
            p.y = (p.y - min_y) * scale + offset_y;
        }
    }

    Ok(Placement {
        scale,
        offset_x,
        offset_y,
    })
}

/// Bounding box of every point: `(min_x, min_y, width, height)`.
fn bounds(paths: &[Vec<Point>]) -> Option<(f64, f64, f64, f64)> {
    let mut min_x = f64::INFINITY;
    let mut min_y = f64::INFINITY;
    let mut max_x = f64::NEG_INFINITY;
    let mut max_y = f64::NEG_INFINITY;
    for p in paths.iter().flatten() {
        min_x = min_x.min(p.x);
        min_y = min_y.min(p.y);
        max_x = max_x.max(p.x);
        max_y = max_y.max(p.y);
    }
    if min_x.is_finite() {
        Some((min_x, min_y, max_x - min_x, max_y - min_y))
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn square(size: f64) -> Vec<Vec<Point>> {
        vec![vec![
            Point::new(0.0, 0.0),
            Point::new(size, 0.0),
            Point::new(size, size),
            Point::new(0.0, size),
            Point::new(0.0, 0.0),
        ]]
    }

    fn opts(mode: ScaleMode) -> CanvasOptions {
        CanvasOptions {
            canvas_width: 200.0,
            canvas_height: 200.0,
            margin: 10.0,
            scale_mode: mode,
            ..CanvasOptions::default()
        }
    }

    #[test]
    fn fit_scales_up_to_the_drawable_area() {
        let mut paths = square(10.0);
        let placement = place(&mut paths, &opts(ScaleMode::Fit)).unwrap();
        assert!((placement.scale - 18.0).abs() < 1e-9);
        assert_eq!(paths[0][0], Point::new(10.0, 10.0));
        assert_eq!(paths[0][2], Point::new(190.0, 190.0));
    }

    #[test]
    fn fit_scales_down_oversized_geometry() {
        let mut paths = square(360.0);
        let placement = place(&mut paths, &opts(ScaleMode::Fit)).unwrap();
        assert!((placement.scale - 0.5).abs() < 1e-9);
    }

    #[test]
    fn contain_never_enlarges() {
        let mut paths = square(10.0);
        let placement = place(&mut paths, &opts(ScaleMode::Contain)).unwrap();
        assert_eq!(placement.scale, 1.0);
        // centered in the 180x180 drawable area
        assert_eq!(paths[0][0], Point::new(95.0, 95.0));

        let mut paths = square(360.0);
        let placement = place(&mut paths, &opts(ScaleMode::Contain)).unwrap();
        assert!((placement.scale - 0.5).abs() < 1e-9);
    }

    #[test]
    fn none_mode_keeps_millimetre_units() {
        let mut paths = square(50.0);
        let placement = place(&mut paths, &opts(ScaleMode::None)).unwrap();
        assert_eq!(placement.scale, 1.0);
    }

    #[test]
    fn alignment_corners() {
        let base = opts(ScaleMode::Contain);
        let mut paths = square(10.0);
        let o = CanvasOptions {
            align_x: AlignX::Left,
            align_y: AlignY::Front,
            ..base.clone()
        };
        place(&mut paths, &o).unwrap();
        assert_eq!(paths[0][0], Point::new(10.0, 10.0));

        let mut paths = square(10.0);
        let o = CanvasOptions {
            align_x: AlignX::Right,
            align_y: AlignY::Back,
            ..base
        };
        place(&mut paths, &o).unwrap();
        assert_eq!(paths[0][2], Point::new(190.0, 190.0));
    }

    #[test]
    fn degenerate_height_passes_through_unscaled() {
        let mut paths = vec![vec![Point::new(0.0, 0.0), Point::new(100.0, 0.0)]];
        let placement = place(&mut paths, &opts(ScaleMode::Contain)).unwrap();
        assert_eq!(placement.scale, 1.0);
        assert_eq!(paths[0][0], Point::new(50.0, 100.0));
        assert_eq!(paths[0][1], Point::new(150.0, 100.0));
    }

    #[test]
    fn placing_twice_is_idempotent_when_input_fits() {
        let mut paths = square(50.0);
        let o = opts(ScaleMode::Contain);
        place(&mut paths, &o).unwrap();
        let first = paths.clone();
        place(&mut paths, &o).unwrap();
        assert_eq!(paths, first);
    }

    #[test]
    fn consuming_margin_is_a_parse_error() {
        let mut paths = square(10.0);
        let o = CanvasOptions {
            canvas_width: 20.0,
            canvas_height: 20.0,
            margin: 10.0,
            ..CanvasOptions::default()
        };
        assert!(place(&mut paths, &o).is_err());
    }

    #[test]
    fn empty_geometry_is_fine() {
        let mut paths: Vec<Vec<Point>> = Vec::new();
        let placement = place(&mut paths, &opts(ScaleMode::Fit)).unwrap();
        assert_eq!(placement.scale, 1.0);
    }
}
