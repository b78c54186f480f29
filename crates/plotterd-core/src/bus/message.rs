//! Wire schema for the WebSocket bus: `{type, data, timestamp}`.

use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};
use uuid::Uuid;

/// Unix milliseconds; every payload carries one.
pub fn unix_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// Every outbound event name the bus emits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EventType {
    #[serde(rename = "job:created")]
    JobCreated,
    #[serde(rename = "job:started")]
    JobStarted,
    #[serde(rename = "job:progress")]
    JobProgress,
    #[serde(rename = "job:layer-change")]
    JobLayerChange,
    #[serde(rename = "job:paused")]
    JobPaused,
    #[serde(rename = "job:resumed")]
    JobResumed,
    #[serde(rename = "job:completed")]
    JobCompleted,
    #[serde(rename = "job:error")]
    JobError,
    #[serde(rename = "position:update")]
    PositionUpdate,
    #[serde(rename = "machine:status")]
    MachineStatus,
    #[serde(rename = "connected")]
    Connected,
    #[serde(rename = "subscribed")]
    Subscribed,
    #[serde(rename = "unsubscribed")]
    Unsubscribed,
    #[serde(rename = "pong")]
    Pong,
    #[serde(rename = "error")]
    Error,
}

/// One bus message as delivered to a client.
#[derive(Debug, Clone, Serialize)]
pub struct Event {
    #[serde(rename = "type")]
    pub kind: EventType,
    pub data: serde_json::Value,
    pub timestamp: u64,
}

impl Event {
    pub fn new(kind: EventType, data: serde_json::Value) -> Self {
        Self {
            kind,
            data,
            timestamp: unix_ms(),
        }
    }
}

/// Inbound requests the bus understands.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ClientMessage {
    Subscribe {
        #[serde(rename = "jobId")]
        job_id: Uuid,
    },
    Unsubscribe {
        #[serde(rename = "jobId")]
        job_id: Uuid,
    },
    Ping,
}
