use std::sync::Arc;

use tokio::sync::broadcast;
use uuid::Uuid;

use atelier_types::events::GatewayEvent;

use crate::bus::{Envelope, EventBus, LocalBus, Scope};
use crate::registry::ConnectionRegistry;

/// Fan-out entry point for the rest of the system. Routes every event
/// through the `EventBus`, so the delivery backbone can be swapped without
/// touching call sites, and owns the per-process connection registry.
#[derive(Clone)]
pub struct Dispatcher {
    registry: ConnectionRegistry,
    local: LocalBus,
    bus: Arc<dyn EventBus>,
}

impl Dispatcher {
    /// Single-process wiring: publishes dispatch directly into the local bus.
    pub fn new() -> Self {
        let local = LocalBus::new();
        Self {
            registry: ConnectionRegistry::new(),
            bus: Arc::new(local.clone()),
            local,
        }
    }

    /// Multi-instance wiring: `bus` carries publishes to a shared backbone,
    /// which must feed `local` on every process (including this one).
    pub fn with_bus(local: LocalBus, bus: Arc<dyn EventBus>) -> Self {
        Self {
            registry: ConnectionRegistry::new(),
            local,
            bus,
        }
    }

    pub fn registry(&self) -> &ConnectionRegistry {
        &self.registry
    }

    /// Subscribe this connection task to the local delivery stream.
    pub fn subscribe(&self) -> broadcast::Receiver<Envelope> {
        self.local.subscribe()
    }

    pub fn to_room(&self, room_id: Uuid, event: GatewayEvent) {
        self.bus.publish(Envelope {
            scope: Scope::Room(room_id),
            except_conn: None,
            event,
        });
    }

    /// Room broadcast that skips the originating connection.
    pub fn to_room_except(&self, room_id: Uuid, conn_id: Uuid, event: GatewayEvent) {
        self.bus.publish(Envelope {
            scope: Scope::Room(room_id),
            except_conn: Some(conn_id),
            event,
        });
    }

    pub fn to_user(&self, user_id: Uuid, event: GatewayEvent) {
        self.bus.publish(Envelope {
            scope: Scope::User(user_id),
            except_conn: None,
            event,
        });
    }

    pub fn to_connection(&self, conn_id: Uuid, event: GatewayEvent) {
        self.bus.publish(Envelope {
            scope: Scope::Connection(conn_id),
            except_conn: None,
            event,
        });
    }
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::new()
    }
}
