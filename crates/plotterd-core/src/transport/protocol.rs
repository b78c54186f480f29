//! Response framing and position capture for the controller line protocol.

use super::MachinePosition;

/// A response is complete when a line carries one of the termination markers.
pub(super) fn is_terminated(line: &str) -> bool {
    line.contains("ok") || line.contains("Done") || line.contains("Error")
}

/// `Error` markers surface as failures.
pub(super) fn is_error_line(line: &str) -> bool {
    line.contains("Error")
}

/// Update `pos` from a `X:… Y:… Z:… E:…` report. Each axis is parsed
/// independently; axes missing from the line keep their previous value.
/// Returns true when the line carried a position (an `X:` tag).
pub(super) fn update_position(line: &str, pos: &mut MachinePosition) -> bool {
    if !line.contains("X:") {
        return false;
    }
    if let Some(v) = axis_value(line, "X:") {
        pos.x = v;
    }
    if let Some(v) = axis_value(line, "Y:") {
        pos.y = v;
    }
    if let Some(v) = axis_value(line, "Z:") {
        pos.z = v;
    }
    if let Some(v) = axis_value(line, "E:") {
        pos.e = v;
    }
    true
}

/// Signed decimal immediately following `tag` (spaces tolerated).
fn axis_value(line: &str, tag: &str) -> Option<f64> {
    let start = line.find(tag)? + tag.len();
    let rest = line[start..].trim_start();
    let end = rest
        .find(|c: char| !c.is_ascii_digit() && c != '.' && c != '-' && c != '+')
        .unwrap_or(rest.len());
    rest[..end].parse().ok()
}
