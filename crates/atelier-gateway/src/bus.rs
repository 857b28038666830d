use tokio::sync::broadcast;
use uuid::Uuid;

use atelier_types::events::GatewayEvent;

/// Where an envelope should land.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scope {
    /// Every chat connection subscribed to the room.
    Room(Uuid),
    /// Every notifications connection of one user.
    User(Uuid),
    /// Exactly one connection; used for command acks and inline errors.
    Connection(Uuid),
}

#[derive(Debug, Clone)]
pub struct Envelope {
    pub scope: Scope,
    /// Connection to skip within the scope; reproduces a sender-excluding
    /// room broadcast (typing, read receipts).
    pub except_conn: Option<Uuid>,
    pub event: GatewayEvent,
}

/// Publish side of the fan-out. Single-process deployments dispatch locally;
/// a multi-instance deployment backs this with a shared message bus that
/// feeds every process's `LocalBus` — call sites never change.
pub trait EventBus: Send + Sync {
    fn publish(&self, envelope: Envelope);
}

const BUS_CAPACITY: usize = 1024;

/// In-process fan-out over a broadcast channel. Every connection task
/// subscribes once and filters envelopes by its own scope. Receivers that lag
/// past the channel capacity drop events; the client reconciles by re-fetch.
#[derive(Clone)]
pub struct LocalBus {
    tx: broadcast::Sender<Envelope>,
}

impl LocalBus {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(BUS_CAPACITY);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Envelope> {
        self.tx.subscribe()
    }
}

impl Default for LocalBus {
    fn default() -> Self {
        Self::new()
    }
}

impl EventBus for LocalBus {
    fn publish(&self, envelope: Envelope) {
        // send() errs only when there are no receivers — that's fine.
        let _ = self.tx.send(envelope);
    }
}
