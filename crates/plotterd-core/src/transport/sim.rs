//! Deterministic responder used in place of the serial link.
//!
//! Responses are chosen from a command-prefix table; unknown commands
//! acknowledge with `ok`. Every response terminates the way a real
//! controller would, so the framing layer is exercised identically.

/// Synthetic response for `command`, newline-separated.
pub(super) fn respond(command: &str) -> &'static str {
    let word = command
        .split_whitespace()
        .next()
        .unwrap_or("")
        .to_ascii_uppercase();
    match word.as_str() {
        "M114" => "X:100.00 Y:50.00 Z:10.00 E:0.00 Count X:0 Y:0 Z:0\nok",
        "M20" => "Begin file list\nSTAR.GCO 4096\nGRID.GCO 2048\nEnd file list\nok",
        "M39" => "SD card ok\nVolume capacity: 3965845504\nUsage: 65536\nok",
        "M23" => "File opened\nFile selected\nok",
        "M28" => "Writing to file\nok",
        "M29" => "Done saving file",
        "G28" => "X:0.00 Y:0.00 Z:0.00 E:0.00\nok",
        "M43" => "PIN: 4 STATE: 1\nok",
        // M24/M25/M0/M112, motion, pin writes, queue drain, and anything
        // unrecognized all acknowledge plainly
        _ => "ok",
    }
}
