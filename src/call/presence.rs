use std::collections::HashMap;
use std::sync::Mutex;

use crate::hub::ConnId;

use super::event::FriendEntry;

/// Call-namespace presence for one connection. Direct calls move it through
/// idle -> calling -> connected and back.
#[derive(Debug, Clone)]
pub struct CallPresence {
    pub user_id: i64,
    pub name: String,
    pub is_call: bool,
    pub peer: Option<ConnId>,
}

#[derive(Default)]
pub struct CallRegistry {
    inner: Mutex<HashMap<ConnId, CallPresence>>,
}

impl CallRegistry {
    /// Registers fresh presence. A user holds at most one call connection:
    /// any stale entry for the same user is evicted first.
    pub fn connect(&self, conn: ConnId, user_id: i64, name: String) {
        let mut inner = self.inner.lock().unwrap();
        inner.retain(|_, p| p.user_id != user_id);
        inner.insert(
            conn,
            CallPresence {
                user_id,
                name,
                is_call: false,
                peer: None,
            },
        );
    }

    pub fn resolve(&self, conn: ConnId) -> Option<CallPresence> {
        self.inner.lock().unwrap().get(&conn).cloned()
    }

    /// No-op when already gone.
    pub fn remove(&self, conn: ConnId) {
        self.inner.lock().unwrap().remove(&conn);
    }

    /// Connections whose user is in the given friends set; feeds both the
    /// initial roster and the per-friend online/offline pings.
    pub fn friends_online(&self, friend_ids: &[i64]) -> Vec<FriendEntry> {
        self.inner
            .lock()
            .unwrap()
            .iter()
            .filter(|(_, p)| friend_ids.contains(&p.user_id))
            .map(|(conn, p)| FriendEntry {
                sid: *conn,
                name: p.name.clone(),
            })
            .collect()
    }

    pub fn set_calling(&self, conn: ConnId) {
        if let Some(p) = self.inner.lock().unwrap().get_mut(&conn) {
            p.is_call = true;
        }
    }

    /// Marks both ends connected to each other after an answered call.
    pub fn set_connected(&self, a: ConnId, b: ConnId) {
        let mut inner = self.inner.lock().unwrap();
        if let Some(p) = inner.get_mut(&a) {
            p.is_call = true;
            p.peer = Some(b);
        }
        if let Some(p) = inner.get_mut(&b) {
            p.is_call = true;
            p.peer = Some(a);
        }
    }

    pub fn clear_call(&self, conn: ConnId) {
        let mut inner = self.inner.lock().unwrap();
        let peer = inner.get_mut(&conn).and_then(|p| {
            p.is_call = false;
            p.peer.take()
        });
        if let Some(peer) = peer {
            if let Some(p) = inner.get_mut(&peer) {
                p.is_call = false;
                p.peer = None;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn reconnect_evicts_the_stale_entry() {
        let reg = CallRegistry::default();
        let (c1, c2) = (Uuid::now_v7(), Uuid::now_v7());
        reg.connect(c1, 7, "u".into());
        reg.connect(c2, 7, "u".into());
        assert!(reg.resolve(c1).is_none());
        assert!(reg.resolve(c2).is_some());
    }

    #[test]
    fn answered_call_links_both_ends() {
        let reg = CallRegistry::default();
        let (a, b) = (Uuid::now_v7(), Uuid::now_v7());
        reg.connect(a, 1, "a".into());
        reg.connect(b, 2, "b".into());
        reg.set_calling(a);
        reg.set_connected(b, a);
        assert_eq!(reg.resolve(a).unwrap().peer, Some(b));
        assert_eq!(reg.resolve(b).unwrap().peer, Some(a));
        reg.clear_call(a);
        assert!(!reg.resolve(b).unwrap().is_call);
    }

    #[test]
    fn friends_filter() {
        let reg = CallRegistry::default();
        let (a, b) = (Uuid::now_v7(), Uuid::now_v7());
        reg.connect(a, 1, "a".into());
        reg.connect(b, 2, "b".into());
        let online = reg.friends_online(&[2]);
        assert_eq!(online.len(), 1);
        assert_eq!(online[0].sid, b);
    }
}
