//! Subscription-keyed broadcast bus.
//!
//! Three delivery modes: broadcast to every client, fan-out to the
//! subscribers of a job id, and unicast back to one client. The registry is
//! guarded so subscribe/unsubscribe/broadcast are safe under concurrent
//! modification; events to a single client arrive in emission order, with
//! no cross-client guarantee.

mod message;
pub mod ws;

pub use message::{unix_ms, ClientMessage, Event, EventType};

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::RwLock;

use tokio::sync::mpsc;
use uuid::Uuid;

pub type ClientId = u64;

/// What the socket task receives: an event to serialize, or a liveness
/// probe to forward as a WebSocket ping frame.
#[derive(Debug, Clone)]
pub enum BusFrame {
    Event(Event),
    Ping,
}

struct Client {
    tx: mpsc::UnboundedSender<BusFrame>,
    subscriptions: HashSet<Uuid>,
    /// Cleared by the heartbeat sweep, set again by any pong.
    alive: bool,
}

#[derive(Default)]
pub struct EventBus {
    clients: RwLock<HashMap<ClientId, Client>>,
    next_id: AtomicU64,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a connection. The returned receiver is the client's ordered
    /// event stream; a `connected` acknowledgement is already queued on it.
    pub fn register(&self) -> (ClientId, mpsc::UnboundedReceiver<BusFrame>) {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = mpsc::unbounded_channel();
        let _ = tx.send(BusFrame::Event(Event::new(
            EventType::Connected,
            serde_json::json!({ "clientId": id }),
        )));
        self.clients.write().unwrap().insert(
            id,
            Client {
                tx,
                subscriptions: HashSet::new(),
                alive: true,
            },
        );
        tracing::debug!(client = id, "bus client connected");
        (id, rx)
    }

    /// Drop a connection and all of its subscriptions.
    pub fn remove(&self, id: ClientId) {
        if self.clients.write().unwrap().remove(&id).is_some() {
            tracing::debug!(client = id, "bus client removed");
        }
    }

    pub fn client_count(&self) -> usize {
        self.clients.read().unwrap().len()
    }

    pub fn subscribe(&self, id: ClientId, job_id: Uuid) {
        let mut clients = self.clients.write().unwrap();
        if let Some(client) = clients.get_mut(&id) {
            client.subscriptions.insert(job_id);
            let _ = client.tx.send(BusFrame::Event(Event::new(
                EventType::Subscribed,
                serde_json::json!({ "jobId": job_id }),
            )));
        }
    }

    pub fn unsubscribe(&self, id: ClientId, job_id: Uuid) {
        let mut clients = self.clients.write().unwrap();
        if let Some(client) = clients.get_mut(&id) {
            client.subscriptions.remove(&job_id);
            let _ = client.tx.send(BusFrame::Event(Event::new(
                EventType::Unsubscribed,
                serde_json::json!({ "jobId": job_id }),
            )));
        }
    }

    /// Mark a client live again (any pong counts).
    pub fn touch(&self, id: ClientId) {
        if let Some(client) = self.clients.write().unwrap().get_mut(&id) {
            client.alive = true;
        }
    }

    /// Unicast to one client.
    pub fn send_to(&self, id: ClientId, event: Event) {
        if let Some(client) = self.clients.read().unwrap().get(&id) {
            let _ = client.tx.send(BusFrame::Event(event));
        }
    }

    /// Deliver to every connected client.
    pub fn broadcast(&self, event: Event) {
        self.deliver(|_| true, event);
    }

    /// Deliver to the subscribers of `job_id`.
    pub fn emit_for_job(&self, job_id: Uuid, event: Event) {
        self.deliver(|client| client.subscriptions.contains(&job_id), event);
    }

    fn deliver(&self, want: impl Fn(&Client) -> bool, event: Event) {
        let mut dead = Vec::new();
        {
            let clients = self.clients.read().unwrap();
            for (id, client) in clients.iter() {
                if want(client) && client.tx.send(BusFrame::Event(event.clone())).is_err() {
                    dead.push(*id);
                }
            }
        }
        if !dead.is_empty() {
            let mut clients = self.clients.write().unwrap();
            for id in dead {
                clients.remove(&id);
            }
        }
    }

    /// One heartbeat round: terminate clients that never answered the
    /// previous probe, then probe the rest.
    pub fn sweep(&self) -> usize {
        let mut clients = self.clients.write().unwrap();
        let before = clients.len();
        clients.retain(|id, client| {
            if !client.alive {
                tracing::info!(client = id, "dropping silent bus client");
                return false;
            }
            client.alive = false;
            client.tx.send(BusFrame::Ping).is_ok()
        });
        before - clients.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn drain(rx: &mut mpsc::UnboundedReceiver<BusFrame>) -> Vec<BusFrame> {
        let mut out = Vec::new();
        while let Ok(frame) = rx.try_recv() {
            out.push(frame);
        }
        out
    }

    fn event_kinds(frames: &[BusFrame]) -> Vec<EventType> {
        frames
            .iter()
            .filter_map(|f| match f {
                BusFrame::Event(e) => Some(e.kind),
                BusFrame::Ping => None,
            })
            .collect()
    }

    #[test]
    fn register_acknowledges_connection() {
        let bus = EventBus::new();
        let (_id, mut rx) = bus.register();
        let kinds = event_kinds(&drain(&mut rx));
        assert_eq!(kinds, [EventType::Connected]);
    }

    #[test]
    fn job_events_reach_only_subscribers() {
        let bus = EventBus::new();
        let job = Uuid::new_v4();
        let (a, mut rx_a) = bus.register();
        let (_b, mut rx_b) = bus.register();
        bus.subscribe(a, job);
        drain(&mut rx_a);
        drain(&mut rx_b);

        bus.emit_for_job(job, Event::new(EventType::JobProgress, serde_json::json!({})));
        assert_eq!(event_kinds(&drain(&mut rx_a)), [EventType::JobProgress]);
        assert!(event_kinds(&drain(&mut rx_b)).is_empty());
    }

    #[test]
    fn unsubscribe_stops_delivery() {
        let bus = EventBus::new();
        let job = Uuid::new_v4();
        let (a, mut rx_a) = bus.register();
        bus.subscribe(a, job);
        bus.unsubscribe(a, job);
        drain(&mut rx_a);

        bus.emit_for_job(job, Event::new(EventType::JobProgress, serde_json::json!({})));
        assert!(event_kinds(&drain(&mut rx_a)).is_empty());
    }

    #[test]
    fn broadcast_reaches_everyone() {
        let bus = EventBus::new();
        let (_a, mut rx_a) = bus.register();
        let (_b, mut rx_b) = bus.register();
        drain(&mut rx_a);
        drain(&mut rx_b);

        bus.broadcast(Event::new(EventType::MachineStatus, serde_json::json!({})));
        assert_eq!(event_kinds(&drain(&mut rx_a)), [EventType::MachineStatus]);
        assert_eq!(event_kinds(&drain(&mut rx_b)), [EventType::MachineStatus]);
    }

    #[test]
    fn sweep_drops_silent_clients_after_two_rounds() {
        let bus = EventBus::new();
        let (_a, _rx) = bus.register();
        assert_eq!(bus.sweep(), 0);
        assert_eq!(bus.client_count(), 1);

        // no pong between probes: second sweep terminates
        assert_eq!(bus.sweep(), 1);
        assert_eq!(bus.client_count(), 0);
    }

    #[test]
    fn pong_keeps_a_client_alive() {
        let bus = EventBus::new();
        let (a, _rx) = bus.register();
        bus.sweep();
        bus.touch(a);
        assert_eq!(bus.sweep(), 0);
        assert_eq!(bus.client_count(), 1);
    }

    #[test]
    fn dropped_receiver_is_pruned_on_delivery() {
        let bus = EventBus::new();
        let (_a, rx) = bus.register();
        drop(rx);
        bus.broadcast(Event::new(EventType::MachineStatus, serde_json::json!({})));
        assert_eq!(bus.client_count(), 0);
    }
}
