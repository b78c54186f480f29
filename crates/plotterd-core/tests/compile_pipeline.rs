//! Integration tests: SVG compilation end to end, and the consistency law
//! between the compiler's stats pass and the G-code parser.

use plotterd_core::compiler::{
    self, AlignX, AlignY, CanvasOptions, PenSettings, ScaleMode,
};
use plotterd_core::error::CoreError;
use plotterd_core::gcode;

fn scenario_options() -> CanvasOptions {
    CanvasOptions {
        canvas_width: 200.0,
        canvas_height: 200.0,
        margin: 10.0,
        travel_speed: 6_000.0,
        draw_speed: 3_000.0,
        pen_down_delay: 150,
        pen_up_delay: 100,
        scale_mode: ScaleMode::Contain,
        align_x: AlignX::Center,
        align_y: AlignY::Center,
        ..CanvasOptions::default()
    }
}

#[tokio::test]
async fn single_line_compiles_to_one_pen_cycle() {
    let svg = r#"<svg xmlns="http://www.w3.org/2000/svg"><line x1="0" y1="0" x2="100" y2="0"/></svg>"#;
    let result = compiler::compile(svg, &scenario_options(), &PenSettings::default())
        .await
        .unwrap();

    // 100 mm wide, zero-height line under contain: unscaled, centered in
    // the 180x180 drawable area
    assert!(result.gcode.contains("G0 X50.000 Y100.000 F6000"));
    assert!(result.gcode.contains("G1 X150.000 Y100.000 F3000"));
    assert_eq!(result.path_count, 1);
    assert_eq!(result.stats.draw_moves, 1);
    assert_eq!(result.stats.pen_downs, 1);
    assert!(result.gcode.contains("G4 P150"));
    assert!(result.gcode.contains("G4 P100"));

    // the parser agrees: one pen-down span
    let plan = gcode::parse(&result.gcode);
    assert_eq!(plan.stats.shapes, 1);
}

#[tokio::test]
async fn empty_svg_yields_header_and_footer_only() {
    let result = compiler::compile("<svg/>", &scenario_options(), &PenSettings::default())
        .await
        .unwrap();
    assert_eq!(result.path_count, 0);
    assert_eq!(result.stats.draw_moves, 0);
    assert_eq!(result.stats.pen_downs, 0);
    assert!(result.gcode.starts_with("G21\nG90\n"));
    assert!(result.gcode.contains("G0 X0.000 Y0.000"));
}

#[tokio::test]
async fn single_point_path_is_dropped() {
    let svg = r#"<svg><path d="M 5 5"/></svg>"#;
    let result = compiler::compile(svg, &scenario_options(), &PenSettings::default())
        .await
        .unwrap();
    assert_eq!(result.path_count, 0);
    assert_eq!(result.stats.pen_downs, 0);
}

#[tokio::test]
async fn consuming_margin_fails_with_parse_error() {
    let svg = r#"<svg><line x1="0" y1="0" x2="1" y2="1"/></svg>"#;
    let opts = CanvasOptions {
        canvas_width: 20.0,
        canvas_height: 20.0,
        margin: 10.0,
        ..CanvasOptions::default()
    };
    let err = compiler::compile(svg, &opts, &PenSettings::default())
        .await
        .unwrap_err();
    assert!(matches!(err, CoreError::Parse(_)));
}

#[tokio::test]
async fn malformed_svg_fails_with_parse_error() {
    let err = compiler::compile("<svg><path d=", &scenario_options(), &PenSettings::default())
        .await
        .unwrap_err();
    assert!(matches!(err, CoreError::Parse(_)));
}

#[tokio::test]
async fn parser_and_stats_pass_agree_on_movement_counts() {
    let svg = r#"<svg viewBox="0 0 100 100">
        <circle cx="30" cy="30" r="20"/>
        <rect x="60" y="60" width="30" height="20"/>
        <polyline points="0,90 10,95 20,90"/>
        <path d="M 50 10 C 60 20 70 20 80 10 Z"/>
    </svg>"#;
    let result = compiler::compile(svg, &scenario_options(), &PenSettings::default())
        .await
        .unwrap();

    let plan = gcode::parse(&result.gcode);
    assert_eq!(
        plan.stats.movement_commands,
        result.stats.rapid_moves + result.stats.draw_moves
    );
    assert_eq!(plan.stats.rapid_count, result.stats.rapid_moves);
    assert_eq!(plan.stats.linear_count, result.stats.draw_moves);
    // one shape per drawable path, as both passes see it
    assert_eq!(result.stats.pen_downs, result.path_count);
    assert_eq!(plan.stats.shapes, result.path_count);
}

#[tokio::test]
async fn fit_mode_fills_the_drawable_area() {
    let svg = r#"<svg><rect x="0" y="0" width="10" height="10"/></svg>"#;
    let opts = CanvasOptions {
        scale_mode: ScaleMode::Fit,
        align_x: AlignX::Left,
        align_y: AlignY::Front,
        ..scenario_options()
    };
    let result = compiler::compile(svg, &opts, &PenSettings::default())
        .await
        .unwrap();
    // 10 mm square scaled 18x into the 180 mm drawable area at the margin
    assert!(result.gcode.contains("G0 X10.000 Y10.000 F6000"));
    assert!(result.gcode.contains("G1 X190.000 Y190.000 F3000"));
}

#[tokio::test]
async fn compiled_output_drives_the_scheduler() {
    use plotterd_core::bus::EventBus;
    use plotterd_core::config::JobsConfig;
    use plotterd_core::jobs::{JobManager, JobState};
    use plotterd_core::transport::Controller;
    use std::sync::Arc;
    use std::time::Duration;

    let svg = r#"<svg><circle cx="50" cy="50" r="40"/></svg>"#;
    let result = compiler::compile(svg, &scenario_options(), &PenSettings::default())
        .await
        .unwrap();

    let transport = Controller::simulated_with_delay(Duration::from_millis(1));
    let bus = Arc::new(EventBus::new());
    let manager = JobManager::new(transport, bus, &JobsConfig::default());
    let job = manager.create_job(&result.gcode);
    assert_eq!(job.plan.stats.shapes, 1);
    manager.start(job.id).unwrap();

    let deadline = tokio::time::Instant::now() + Duration::from_secs(30);
    loop {
        let job = manager.get(job.id).unwrap();
        if job.state.is_terminal() {
            assert_eq!(job.state, JobState::Completed);
            assert_eq!(job.progress.percentage, 100);
            break;
        }
        assert!(tokio::time::Instant::now() < deadline, "run timed out");
        tokio::time::sleep(Duration::from_millis(2)).await;
    }
}
