use std::collections::HashMap;
use std::sync::Mutex;

use crate::hub::ConnId;

/// Chat-namespace presence: which user is behind each live connection.
/// Source of truth for "who is connected where"; rebuilt empty on restart.
#[derive(Default)]
pub struct PresenceRegistry {
    inner: Mutex<HashMap<ConnId, i64>>,
}

impl PresenceRegistry {
    pub fn register(&self, conn: ConnId, user_id: i64) {
        self.inner.lock().unwrap().insert(conn, user_id);
    }

    /// `None` means the connection never registered (or was evicted); the
    /// caller drops the event as unauthorized.
    pub fn resolve(&self, conn: ConnId) -> Option<i64> {
        self.inner.lock().unwrap().get(&conn).copied()
    }

    /// No-op when the connection is already gone; disconnects race with
    /// duplicate events.
    pub fn unregister(&self, conn: ConnId) {
        self.inner.lock().unwrap().remove(&conn);
    }

    pub fn snapshot(&self) -> Vec<(ConnId, i64)> {
        self.inner
            .lock()
            .unwrap()
            .iter()
            .map(|(conn, user)| (*conn, *user))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn resolve_and_double_unregister() {
        let reg = PresenceRegistry::default();
        let conn = Uuid::now_v7();
        assert_eq!(reg.resolve(conn), None);
        reg.register(conn, 42);
        assert_eq!(reg.resolve(conn), Some(42));
        reg.unregister(conn);
        reg.unregister(conn);
        assert_eq!(reg.resolve(conn), None);
    }
}
