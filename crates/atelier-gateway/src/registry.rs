use std::collections::{HashMap, HashSet};
use std::sync::{Arc, RwLock};

use uuid::Uuid;

/// Tracks live connections per authenticated user. A user may hold several
/// concurrent connections (multi-device); presence is keyed on map presence,
/// so `is_online` is O(1). Purely in-memory, one instance per server process,
/// mutated only through these operations.
#[derive(Clone, Default)]
pub struct ConnectionRegistry {
    inner: Arc<RwLock<RegistryInner>>,
}

#[derive(Default)]
struct RegistryInner {
    by_user: HashMap<Uuid, HashSet<Uuid>>,
    by_conn: HashMap<Uuid, Uuid>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, user_id: Uuid, conn_id: Uuid) {
        let mut inner = self.inner.write().expect("registry lock poisoned");
        inner.by_user.entry(user_id).or_default().insert(conn_id);
        inner.by_conn.insert(conn_id, user_id);
    }

    /// Unknown connection ids are a no-op. When a user's last connection
    /// goes away the user entry is removed entirely.
    pub fn unregister(&self, conn_id: Uuid) {
        let mut inner = self.inner.write().expect("registry lock poisoned");
        let Some(user_id) = inner.by_conn.remove(&conn_id) else {
            return;
        };
        if let Some(conns) = inner.by_user.get_mut(&user_id) {
            conns.remove(&conn_id);
            if conns.is_empty() {
                inner.by_user.remove(&user_id);
            }
        }
    }

    pub fn connections_of(&self, user_id: Uuid) -> HashSet<Uuid> {
        self.inner
            .read()
            .expect("registry lock poisoned")
            .by_user
            .get(&user_id)
            .cloned()
            .unwrap_or_default()
    }

    pub fn is_online(&self, user_id: Uuid) -> bool {
        self.inner
            .read()
            .expect("registry lock poisoned")
            .by_user
            .contains_key(&user_id)
    }
}
