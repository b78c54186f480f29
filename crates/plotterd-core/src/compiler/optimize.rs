//! External optimizer pass: linemerge, linesort, optional simplify.
//!
//! The document is written to a temp file and rewritten through the
//! optimizer pipeline. For `fit` mode the optimizer also lays the drawing
//! out to the drawable area; the compiler's own scaler owns layout for the
//! other modes. A missing optimizer binary is not an error: the original
//! document is used.

use tokio::process::Command;

use crate::error::CoreResult;

use super::{CanvasOptions, ScaleMode};

/// Tolerance for joining near-collinear path ends.
const MERGE_TOLERANCE_MM: f64 = 0.5;

const DEFAULT_OPTIMIZER: &str = "vpype";

fn optimizer_bin() -> String {
    std::env::var("PLOTTERD_OPTIMIZER").unwrap_or_else(|_| DEFAULT_OPTIMIZER.to_string())
}

/// Rewrite `svg_text` through the optimizer. `Ok(None)` means the optimizer
/// is unavailable or failed and the caller should use the original document.
pub(super) async fn run(svg_text: &str, opts: &CanvasOptions) -> CoreResult<Option<String>> {
    let dir = tempfile::tempdir()?;
    let in_path = dir.path().join("in.svg");
    let out_path = dir.path().join("out.svg");
    tokio::fs::write(&in_path, svg_text).await?;

    let bin = optimizer_bin();
    let mut cmd = Command::new(&bin);
    cmd.arg("read").arg(&in_path);
    cmd.args(["linemerge", "--tolerance", &format!("{MERGE_TOLERANCE_MM}mm")]);
    cmd.arg("linesort");
    if opts.simplify {
        cmd.args([
            "linesimplify",
            "--tolerance",
            &format!("{}mm", opts.simplify_tolerance),
        ]);
    }
    if opts.scale_mode == ScaleMode::Fit {
        cmd.args([
            "layout",
            "--fit-to-margins",
            &format!("{}mm", opts.margin),
            &format!("{}x{}mm", opts.canvas_width, opts.canvas_height),
        ]);
    }
    cmd.arg("write").arg(&out_path);

    let output = match cmd.output().await {
        Ok(o) => o,
        Err(e) => {
            tracing::warn!("optimizer '{}' unavailable: {}", bin, e);
            return Ok(None);
        }
    };
    if !output.status.success() {
        tracing::warn!(
            "optimizer '{}' failed ({}): {}",
            bin,
            output.status,
            String::from_utf8_lossy(&output.stderr).trim()
        );
        return Ok(None);
    }

    match tokio::fs::read_to_string(&out_path).await {
        Ok(text) => Ok(Some(text)),
        Err(e) => {
            tracing::warn!("optimizer wrote no output: {}", e);
            Ok(None)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn missing_binary_falls_back_to_original() {
        std::env::set_var("PLOTTERD_OPTIMIZER", "plotterd-no-such-optimizer");
        let opts = CanvasOptions {
            optimize: true,
            ..CanvasOptions::default()
        };
        let result = run("<svg/>", &opts).await.unwrap();
        assert!(result.is_none());
        std::env::remove_var("PLOTTERD_OPTIMIZER");
    }
}
