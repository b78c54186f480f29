//! Observable transport events, delivered on a broadcast channel.

use super::MachinePosition;

#[derive(Debug, Clone)]
pub enum TransportEvent {
    /// The link opened (or simulation started).
    Ready,
    /// A link-level failure; the transport stays alive.
    Error(String),
    /// The link went away. Commands now return `NotReady`.
    Closed,
    /// The tracked position changed after a controller report.
    Position(MachinePosition),
    /// A raw response line, surfaced for diagnostics.
    Data(String),
}
